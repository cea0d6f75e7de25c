//! Structured outputs of the post-processing stages.
//!
//! Every type here has fixed fields. Types that are deserialised from model
//! output reject unknown fields so that malformed payloads surface as
//! validation failures at the stage boundary instead of flowing onward as
//! opaque maps.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::ArtifactScore;

// ---------------------------------------------------------------------------
// FAQ
// ---------------------------------------------------------------------------

/// One question/answer pair for the article's FAQ section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaqItem {
    /// The question as a reader would search for it.
    pub question: String,
    /// A short, direct answer.
    pub answer: String,
}

impl FaqItem {
    /// Creates a new pair.
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Keywords
// ---------------------------------------------------------------------------

/// Keyword analysis of the final draft.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeywordReport {
    /// The phrase the article should rank for.
    pub primary_keyword: String,
    /// Supporting keywords.
    #[serde(default)]
    pub secondary_keywords: BTreeSet<String>,
    /// Semantically related terms.
    #[serde(default)]
    pub lsi_keywords: BTreeSet<String>,
    /// Percentage density per analysed keyword, rounded to two places.
    #[serde(default)]
    pub keyword_density: BTreeMap<String, f64>,
    /// Human-readable SEO recommendations, in the order they were raised.
    #[serde(default)]
    pub recommendations: Vec<String>,
    /// Word tokens counted in the draft.
    #[serde(default)]
    pub total_words: usize,
}

// ---------------------------------------------------------------------------
// Linking
// ---------------------------------------------------------------------------

/// A suggested link to another page on the same site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InternalLink {
    /// Phrase in the article to make clickable.
    pub anchor_text: String,
    /// Title of the page the link should point at.
    #[serde(default)]
    pub suggested_target: String,
    /// Where in the article the link belongs.
    #[serde(default)]
    pub context: String,
}

/// A suggested citation of an authoritative outside source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExternalLink {
    /// Name of the source.
    pub source_name: String,
    /// Source URL.
    #[serde(default)]
    pub url: String,
    /// Anchor text to use.
    #[serde(default)]
    pub anchor_text: String,
    /// Where and why to cite it.
    #[serde(default)]
    pub placement_context: String,
}

/// Internal and external link suggestions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkingReport {
    /// Same-site link suggestions.
    pub internal_links: Vec<InternalLink>,
    /// Outside citations.
    pub external_links: Vec<ExternalLink>,
}

// ---------------------------------------------------------------------------
// Humanizer critique
// ---------------------------------------------------------------------------

/// The humanizer critic's structured verdict on a draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HumanizerCritique {
    /// Hedging phrases found ("arguably", "it is important to note").
    #[serde(default)]
    pub hedging_issues: Vec<String>,
    /// Overused connectors ("Moreover", "Furthermore").
    #[serde(default)]
    pub connector_issues: Vec<String>,
    /// Actions turned into nouns.
    #[serde(default)]
    pub nominalization_issues: Vec<String>,
    /// Sections with no concrete, sensory detail.
    #[serde(default)]
    pub sensory_vacuum_issues: Vec<String>,
    /// Sentence-length variety, 1 (uniform) to 10 (jagged).
    #[serde(default)]
    pub burstiness_score: Option<u8>,
    /// The loop's exit metric.
    pub ai_artifact_score: ArtifactScore,
    /// Free-text summary.
    #[serde(default)]
    pub general_feedback: String,
}

impl HumanizerCritique {
    /// A critique carrying only a score and a note, used when the controller
    /// has to synthesise one.
    pub fn synthetic(score: ArtifactScore, feedback: impl Into<String>) -> Self {
        Self {
            hedging_issues: Vec::new(),
            connector_issues: Vec::new(),
            nominalization_issues: Vec::new(),
            sensory_vacuum_issues: Vec::new(),
            burstiness_score: None,
            ai_artifact_score: score,
            general_feedback: feedback.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn critique_rejects_unknown_fields() {
        let json = r#"{"ai_artifact_score": 4, "mood": "grumpy"}"#;
        assert!(serde_json::from_str::<HumanizerCritique>(json).is_err());
    }

    #[test]
    fn critique_defaults_missing_lists() {
        let json = r#"{"ai_artifact_score": 7, "general_feedback": "stiff"}"#;
        let critique: HumanizerCritique = serde_json::from_str(json).unwrap();
        assert_eq!(critique.ai_artifact_score.as_u8(), 7);
        assert!(critique.hedging_issues.is_empty());
        assert_eq!(critique.burstiness_score, None);
    }

    #[test]
    fn critique_requires_a_score() {
        let json = r#"{"general_feedback": "no score"}"#;
        assert!(serde_json::from_str::<HumanizerCritique>(json).is_err());
    }
}
