//! Pulling structured payloads out of free-form model output.
//!
//! Models wrap JSON in markdown fences and prefix prose with chatter such as
//! "Here is the rewritten article:". [`extract_payload`] finds the payload by
//! looking, in order, for:
//!
//! 1. a fenced block tagged `json`;
//! 2. any other fenced block;
//! 3. the outermost JSON array or object in the text.
//!
//! If none is found the whole text, trimmed, is the payload
//! ([`PayloadSource::WholeText`]).

use std::sync::OnceLock;

use regex::Regex;
use serde::de::DeserializeOwned;

use crate::PipelineError;

/// Where [`extract_payload`] found its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadSource {
    /// A fenced block tagged `json`.
    JsonFence,
    /// An untagged (or otherwise tagged) fenced block.
    Fence,
    /// A bracketed JSON span embedded in prose.
    Embedded,
    /// No structure detected; the whole text was used.
    WholeText,
}

/// A payload located inside model output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Payload<'a> {
    /// The payload text, trimmed.
    pub text: &'a str,
    /// How it was located.
    pub source: PayloadSource,
}

fn json_fence() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)```[ \t]*json[ \t]*\r?\n?(.*?)```").expect("static regex")
    })
}

fn any_fence() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)```[^\n`]*\r?\n?(.*?)```").expect("static regex")
    })
}

fn preamble() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(here is|here's|sure[,!]|certainly[,!])").expect("static regex")
    })
}

/// Locates the structured payload in `text`.
pub fn extract_payload(text: &str) -> Payload<'_> {
    if let Some(body) = json_fence().captures(text).and_then(|c| c.get(1)) {
        return Payload {
            text: body.as_str().trim(),
            source: PayloadSource::JsonFence,
        };
    }
    if let Some(body) = any_fence().captures(text).and_then(|c| c.get(1)) {
        return Payload {
            text: body.as_str().trim(),
            source: PayloadSource::Fence,
        };
    }
    if let Some(span) = embedded_json(text) {
        return Payload {
            text: span,
            source: PayloadSource::Embedded,
        };
    }
    Payload {
        text: text.trim(),
        source: PayloadSource::WholeText,
    }
}

/// The span from the first `[` or `{` to the last matching closer, if both exist.
fn embedded_json(text: &str) -> Option<&str> {
    let start = text.find(['[', '{'])?;
    let closer = if text[start..].starts_with('[') { ']' } else { '}' };
    let end = text.rfind(closer)?;
    (end > start).then(|| text[start..=end].trim())
}

/// Extracts the payload from `text` and deserialises it as `T`.
///
/// # Errors
///
/// [`PipelineError::ValidationFailure`] tagged with `stage` if the payload is
/// not valid JSON for `T`.
pub fn parse_json<T: DeserializeOwned>(stage: &str, text: &str) -> Result<T, PipelineError> {
    let payload = extract_payload(text);
    serde_json::from_str(payload.text).map_err(|e| PipelineError::validation(stage, e))
}

/// Removes a leading chat preamble line ("Here is the article:") from prose output.
///
/// Text without a preamble is returned unchanged apart from trimming.
pub fn strip_preamble(text: &str) -> &str {
    let trimmed = text.trim();
    if preamble().is_match(trimmed) {
        trimmed
            .split_once('\n')
            .map(|(_, rest)| rest.trim_start())
            .unwrap_or("")
    } else {
        trimmed
    }
}
