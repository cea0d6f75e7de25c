//! Finalize stage: assembles `final_article.md`.
//!
//! Pure over the run state apart from the timestamp, which the caller
//! supplies.

use std::fmt::Write as _;

use pipeline::{names, Metadata, RunState, Timestamp};

use super::count_words;

/// Builds the final article text.
///
/// Layout: a front-matter header, the draft, then the FAQ section and the
/// keyword and linking reports when those documents exist.
pub fn assemble_final_article(state: &RunState, draft_name: &str, generated_at: Timestamp) -> String {
    let store = state.store();
    let inputs = state.inputs();
    let draft = store.read_or_empty(draft_name).trim();

    let mut article = String::from("---\n");
    let _ = writeln!(article, "title: {:?}", inputs.topic);
    let _ = writeln!(article, "language: {}", inputs.language);
    let _ = writeln!(article, "target_word_count: {}", inputs.word_count);
    let _ = writeln!(article, "word_count: {}", count_words(draft));
    if !state.keyword_report.primary_keyword.is_empty() {
        let _ = writeln!(
            article,
            "primary_keyword: {:?}",
            state.keyword_report.primary_keyword
        );
    }
    let _ = writeln!(article, "generated_at: {generated_at}");
    article.push_str("---\n\n");
    article.push_str(draft);
    article.push('\n');

    if let Ok(faq) = store.read(names::FAQ_SECTION) {
        article.push_str(faq);
    }
    for report in [names::KEYWORD_REPORT, names::LINKING_REPORT] {
        if let Ok(text) = store.read(report) {
            article.push_str("\n\n---\n\n");
            article.push_str(text.trim_end());
            article.push('\n');
        }
    }
    article
}

/// Writes the final article into the run's store.
pub fn finalize(state: &mut RunState, draft_name: &str, generated_at: Timestamp) {
    let article = assemble_final_article(state, draft_name, generated_at);
    let inputs = state.inputs();
    let metadata = Metadata::from([
        ("topic".to_string(), inputs.topic.clone()),
        ("language".to_string(), inputs.language.clone()),
        ("generated_at".to_string(), generated_at.to_string()),
    ]);
    state
        .store_mut()
        .write_with_metadata(names::FINAL_ARTICLE, article, metadata);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline::{JobRequest, KeywordReport};

    fn state() -> RunState {
        RunState::new(JobRequest::new("green tea").validate().unwrap())
    }

    #[test]
    fn header_then_draft_then_sections() {
        let mut state = state();
        state.store_mut().write(names::DRAFT, "\n\n## Tea\nTea is nice.");
        state.store_mut().write(names::FAQ_SECTION, "\n\n---\n\n## Frequently Asked Questions\n\n");
        state.store_mut().write(names::LINKING_REPORT, "## Linking Strategy Report\n");
        state.keyword_report = KeywordReport {
            primary_keyword: "green tea".into(),
            ..KeywordReport::default()
        };

        let article = assemble_final_article(&state, names::DRAFT, Timestamp::now());

        assert!(article.starts_with("---\ntitle: \"green tea\"\nlanguage: English\n"));
        assert!(article.contains("target_word_count: 1500\nword_count: 4\n"));
        assert!(article.contains("primary_keyword: \"green tea\"\n"));
        let draft_at = article.find("## Tea").unwrap();
        let faq_at = article.find("## Frequently Asked Questions").unwrap();
        let linking_at = article.find("## Linking Strategy Report").unwrap();
        assert!(draft_at < faq_at && faq_at < linking_at);
        assert!(!article.contains("Keyword Analysis Report"));
    }

    #[test]
    fn finalize_writes_final_article() {
        let mut state = state();
        state.store_mut().write(names::DRAFT, "Body.");

        finalize(&mut state, names::DRAFT, Timestamp::now());

        let doc = state.store().get(names::FINAL_ARTICLE).unwrap();
        assert!(doc.content.contains("Body."));
        assert_eq!(doc.metadata.get("topic").map(String::as_str), Some("green tea"));
    }
}
