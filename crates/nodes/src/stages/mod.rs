//! Concrete stages.
//!
//! Every stage reaches the outside world only through the port traits in
//! [`pipeline::ports`]. Each one owns its prompt text and the parsing of the
//! model's answer; none of them decides what runs next.

pub mod evaluate;
pub mod faq;
pub mod finalize;
pub mod humanizer;
pub mod keywords;
pub mod linking;
pub mod planner;
pub mod research;
pub mod writer;

use std::sync::OnceLock;

use pipeline::{FaqItem, KeywordReport, LinkingReport};
use regex::Regex;

/// Output of one SEO analysis branch.
///
/// The three SEO stages share a fan-out, so they share an output type; the
/// executor copies each variant into the matching run-state field.
#[derive(Debug, Clone, PartialEq)]
pub enum SeoFinding {
    /// Validated FAQ items.
    Faq(Vec<FaqItem>),
    /// Keyword extraction and density analysis.
    Keywords(KeywordReport),
    /// Internal and external link suggestions.
    Linking(LinkingReport),
}

/// The first `max_chars` characters of `text`.
pub(crate) fn head(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

/// The last `max_chars` characters of `text`.
pub(crate) fn tail(text: &str, max_chars: usize) -> &str {
    let total = text.chars().count();
    if total <= max_chars {
        return text;
    }
    match text.char_indices().nth(total - max_chars) {
        Some((index, _)) => &text[index..],
        None => text,
    }
}

fn word_regex() -> &'static Regex {
    static WORD: OnceLock<Regex> = OnceLock::new();
    WORD.get_or_init(|| Regex::new(r"\b\w+\b").expect("static regex"))
}

/// Number of words in `text`.
pub(crate) fn count_words(text: &str) -> usize {
    word_regex().find_iter(text).count()
}

/// Renders a JSON scalar as plain text; strings lose their quotes.
pub(crate) fn value_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn head_and_tail_respect_char_boundaries() {
        let text = "héllo wörld";
        assert_eq!(head(text, 5), "héllo");
        assert_eq!(tail(text, 5), "wörld");
        assert_eq!(head(text, 100), text);
        assert_eq!(tail(text, 100), text);
    }

    #[test]
    fn counts_words() {
        assert_eq!(count_words("Brew green tea at 80 degrees."), 6);
        assert_eq!(count_words(""), 0);
    }

    #[test]
    fn value_text_unquotes_strings() {
        assert_eq!(value_text(&serde_json::json!("hi")), "hi");
        assert_eq!(value_text(&serde_json::json!(3)), "3");
    }
}
