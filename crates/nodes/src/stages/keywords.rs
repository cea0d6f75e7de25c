//! Keyword branch of SEO analysis.
//!
//! Extraction is delegated to the model; density and recommendations are
//! computed here so that the same draft always yields the same numbers.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use pipeline::{
    names, parse_json, ContentTransform, DocumentStore, KeywordReport, ModelRole, PipelineError,
    Stage, StageContext, StageOutcome, TransformRequest,
};
use regex::Regex;
use serde::Deserialize;
use tracing::{info, warn};

use super::{count_words, head, SeoFinding};

const STAGE: &str = "seo_keywords";
const DRAFT_EXCERPT_CHARS: usize = 6_000;
const INTRO_CHARS: usize = 500;
const MAX_SECONDARY_ANALYSED: usize = 5;
const EXTRACTION_FAILED: &str = "Unable to extract keywords automatically";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExtractedKeywords {
    #[serde(default)]
    primary_keyword: Option<String>,
    #[serde(default)]
    secondary_keywords: Vec<String>,
    #[serde(default)]
    lsi_keywords: Vec<String>,
}

fn h2_regex() -> &'static Regex {
    static H2: OnceLock<Regex> = OnceLock::new();
    H2.get_or_init(|| Regex::new(r"(?m)^##\s+(.+)$").expect("static regex"))
}

/// Percentage of `total_words` taken up by occurrences of `phrase`.
fn phrase_density(haystack: &str, phrase: &str, total_words: usize) -> f64 {
    let occurrences = haystack.matches(phrase).count();
    let phrase_words = phrase.split_whitespace().count();
    (occurrences * phrase_words) as f64 / total_words as f64 * 100.0
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Fills in density, recommendations and word count for `draft`.
///
/// A draft without words leaves the report as extracted.
pub fn analyze_density(mut report: KeywordReport, draft: &str) -> KeywordReport {
    let lowered = draft.to_lowercase();
    let total_words = count_words(&lowered);
    if total_words == 0 {
        return report;
    }

    let primary = report.primary_keyword.trim().to_lowercase();
    let mut density = BTreeMap::new();
    let mut recommendations: Vec<String> = report
        .recommendations
        .iter()
        .filter(|r| r.as_str() == EXTRACTION_FAILED)
        .cloned()
        .collect();

    if !primary.is_empty() {
        let primary_density = phrase_density(&lowered, &primary, total_words);
        density.insert(primary.clone(), round2(primary_density));
        if primary_density < 0.5 {
            recommendations.push(format!(
                "Warning: primary keyword '{primary}' density is low ({primary_density:.1}%). Aim for 1-2%."
            ));
        } else if primary_density > 3.0 {
            recommendations.push(format!(
                "Warning: primary keyword '{primary}' may be over-optimized ({primary_density:.1}%). Reduce to 1-2%."
            ));
        } else {
            recommendations.push(format!(
                "OK: primary keyword '{primary}' density is optimal ({primary_density:.1}%)."
            ));
        }
    }

    for keyword in report
        .secondary_keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .take(MAX_SECONDARY_ANALYSED)
    {
        let value = round2(phrase_density(&lowered, &keyword, total_words));
        density.insert(keyword, value);
    }

    if !primary.is_empty() {
        if !head(&lowered, INTRO_CHARS).contains(&primary) {
            recommendations.push(
                "Warning: primary keyword not found in the introduction. Add it to the first paragraph."
                    .to_string(),
            );
        }
        let in_heading = h2_regex()
            .captures_iter(draft)
            .filter_map(|c| c.get(1))
            .any(|h| h.as_str().to_lowercase().contains(&primary));
        if !in_heading {
            recommendations
                .push("Tip: add the primary keyword to at least one H2 heading.".to_string());
        }
    }

    report.keyword_density = density;
    report.recommendations = recommendations;
    report.total_words = total_words;
    report
}

/// Renders the report as a markdown section.
pub fn format_keyword_report(report: &KeywordReport) -> String {
    let mut md = String::from("## Keyword Analysis Report\n\n");
    let _ = write!(md, "**Total Word Count:** {}\n\n", report.total_words);
    let _ = write!(md, "### Primary Keyword\n`{}`\n\n", report.primary_keyword);
    md.push_str("### Secondary Keywords\n");
    for keyword in &report.secondary_keywords {
        let _ = writeln!(md, "- {keyword}");
    }
    md.push_str("\n### LSI Keywords (Semantically Related)\n");
    for keyword in &report.lsi_keywords {
        let _ = writeln!(md, "- {keyword}");
    }
    md.push_str("\n### Keyword Density\n| Keyword | Density |\n|---------|--------|\n");
    for (keyword, density) in &report.keyword_density {
        let _ = writeln!(md, "| {keyword} | {density}% |");
    }
    md.push_str("\n### SEO Recommendations\n");
    for recommendation in &report.recommendations {
        let _ = writeln!(md, "- {recommendation}");
    }
    md
}

/// Report used when extraction fails: the topic stands in as primary keyword.
fn unextracted(topic: &str) -> KeywordReport {
    KeywordReport {
        primary_keyword: topic.to_string(),
        recommendations: vec![EXTRACTION_FAILED.to_string()],
        ..KeywordReport::default()
    }
}

pub struct KeywordStage {
    transform: Arc<dyn ContentTransform>,
}

impl KeywordStage {
    pub fn new(transform: Arc<dyn ContentTransform>) -> Self {
        Self { transform }
    }

    async fn extract(&self, topic: &str, draft: &str) -> Result<KeywordReport, PipelineError> {
        let prompt = format!(
            "You are an SEO keyword analyst. Analyze the article below and extract keywords.\n\n\
             TOPIC: {topic}\n\nARTICLE:\n{excerpt}\n\n\
             Extract:\n\
             1. PRIMARY KEYWORD: the main phrase the article should rank for (2-4 words)\n\
             2. SECONDARY KEYWORDS: 5-7 supporting keywords\n\
             3. LSI KEYWORDS: 5-7 semantically related terms\n\n\
             Return ONLY valid JSON:\n\
             {{\"primary_keyword\": \"...\", \"secondary_keywords\": [\"...\"], \"lsi_keywords\": [\"...\"]}}",
            excerpt = head(draft, DRAFT_EXCERPT_CHARS),
        );
        let answer = self
            .transform
            .transform(TransformRequest::new(ModelRole::Researcher, prompt))
            .await?;
        let extracted: ExtractedKeywords = parse_json(STAGE, &answer)?;
        Ok(KeywordReport {
            primary_keyword: extracted
                .primary_keyword
                .filter(|k| !k.trim().is_empty())
                .unwrap_or_else(|| topic.to_string()),
            secondary_keywords: extracted.secondary_keywords.into_iter().collect(),
            lsi_keywords: extracted.lsi_keywords.into_iter().collect(),
            ..KeywordReport::default()
        })
    }
}

#[async_trait]
impl Stage for KeywordStage {
    type Output = SeoFinding;

    fn name(&self) -> &str {
        STAGE
    }

    async fn run(
        &self,
        store: &mut DocumentStore,
        ctx: &StageContext,
    ) -> Result<SeoFinding, PipelineError> {
        let draft = store.read_or_empty(&ctx.draft_name).to_string();
        let extracted = match self.extract(&ctx.inputs.topic, &draft).await {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "keyword extraction failed, using topic");
                unextracted(&ctx.inputs.topic)
            }
        };
        let report = analyze_density(extracted, &draft);
        if report.total_words > 0 {
            store.write(names::KEYWORD_REPORT, format_keyword_report(&report));
        }
        info!(total_words = report.total_words, "keyword analysis complete");
        Ok(SeoFinding::Keywords(report))
    }

    fn fallback(&self, _snapshot: &DocumentStore, ctx: &StageContext) -> StageOutcome<SeoFinding> {
        StageOutcome::without_writes(SeoFinding::Keywords(unextracted(&ctx.inputs.topic)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransform;
    use pipeline::JobRequest;

    fn report(primary: &str, secondary: &[&str]) -> KeywordReport {
        KeywordReport {
            primary_keyword: primary.to_string(),
            secondary_keywords: secondary.iter().map(|s| s.to_string()).collect(),
            ..KeywordReport::default()
        }
    }

    #[test]
    fn density_counts_phrase_words() {
        // 10 words, "green tea" appears twice: 2 * 2 / 10 = 40%.
        let draft = "Green tea is calm. Green tea is bright and warm.";
        let analysed = analyze_density(report("green tea", &[]), draft);

        assert_eq!(analysed.total_words, 10);
        assert_eq!(analysed.keyword_density.get("green tea"), Some(&40.0));
        assert!(analysed.recommendations[0].contains("over-optimized"));
    }

    #[test]
    fn low_density_and_missing_placement_are_flagged() {
        let filler = "word ".repeat(600);
        let draft = format!("## Intro\n{filler} matcha");
        let analysed = analyze_density(report("matcha", &["sencha"]), &draft);

        assert!(analysed.recommendations[0].contains("density is low"));
        assert!(analysed
            .recommendations
            .iter()
            .any(|r| r.contains("not found in the introduction")));
        assert!(analysed.recommendations.iter().any(|r| r.contains("H2 heading")));
        assert_eq!(analysed.keyword_density.get("sencha"), Some(&0.0));
    }

    #[test]
    fn optimal_density_with_heading_raises_no_warnings() {
        let filler = "word ".repeat(97);
        let draft = format!("## Matcha basics\nmatcha {filler} matcha");
        let analysed = analyze_density(report("matcha", &[]), &draft);

        // 101 words, 2 occurrences.
        assert_eq!(analysed.keyword_density.get("matcha"), Some(&1.98));
        assert_eq!(analysed.recommendations.len(), 1);
        assert!(analysed.recommendations[0].starts_with("OK:"));
    }

    #[test]
    fn empty_draft_leaves_report_unanalysed() {
        let analysed = analyze_density(report("tea", &[]), "");
        assert_eq!(analysed.total_words, 0);
        assert!(analysed.keyword_density.is_empty());
    }

    #[test]
    fn markdown_report_lists_density_table() {
        let analysed = analyze_density(report("tea", &[]), "tea tea tea tea");
        let md = format_keyword_report(&analysed);
        assert!(md.starts_with("## Keyword Analysis Report\n\n**Total Word Count:** 4"));
        assert!(md.contains("| tea | 100% |"));
    }

    #[tokio::test]
    async fn extraction_failure_uses_topic_and_still_analyses() {
        let transform = ScriptedTransform::new().respond(ModelRole::Researcher, "not json");
        let stage = KeywordStage::new(Arc::new(transform));
        let ctx = StageContext::new(JobRequest::new("oolong").validate().unwrap(), names::DRAFT);
        let mut store = DocumentStore::new();
        store.write(names::DRAFT, "Oolong is a partly oxidised tea.");

        let SeoFinding::Keywords(report) = stage.run(&mut store, &ctx).await.unwrap() else {
            panic!("expected keyword finding");
        };

        assert_eq!(report.primary_keyword, "oolong");
        assert_eq!(report.recommendations[0], EXTRACTION_FAILED);
        assert_eq!(report.total_words, 6);
        assert!(store.exists(names::KEYWORD_REPORT));
    }
}
