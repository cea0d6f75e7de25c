//! Linking branch of SEO analysis.
//!
//! Two model calls: internal link suggestions, then external citations. The
//! research sources actually used are always offered as citations, so the
//! report is useful even when both calls fail.

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use pipeline::{
    names, parse_json, ContentTransform, DocumentStore, ExternalLink, InternalLink,
    LinkingReport, ModelRole, PipelineError, Stage, StageContext, StageOutcome,
    TransformRequest,
};
use serde::de::DeserializeOwned;
use tracing::{info, warn};

use super::{head, SeoFinding};

const STAGE: &str = "seo_linking";
const MAX_INTERNAL: usize = 5;
const MAX_EXTERNAL: usize = 4;
const MAX_RESEARCH_CITATIONS: usize = 2;
const MAX_URL_DISPLAY_CHARS: usize = 50;

/// Topic-derived internal suggestions used when the model cannot help.
pub fn fallback_internal_links(topic: &str) -> Vec<InternalLink> {
    let lead = topic.split_whitespace().next().unwrap_or(topic);
    vec![
        InternalLink {
            anchor_text: format!("{lead} guide"),
            suggested_target: format!("Complete Guide to {topic}"),
            context: "Link from introduction to comprehensive guide".into(),
        },
        InternalLink {
            anchor_text: "best practices".into(),
            suggested_target: format!("{topic} Best Practices"),
            context: "Link from practical tips section".into(),
        },
        InternalLink {
            anchor_text: "getting started".into(),
            suggested_target: format!("{topic} for Beginners"),
            context: "Link for newcomers to the topic".into(),
        },
    ]
}

fn research_citation(url: &str) -> ExternalLink {
    ExternalLink {
        source_name: "Research Source".into(),
        url: url.to_string(),
        anchor_text: "according to research".into(),
        placement_context: "Primary research source used for this article".into(),
    }
}

/// URLs of research summaries, in store order.
fn research_sources(store: &DocumentStore) -> Vec<String> {
    store
        .with_prefix(names::RESEARCH_PREFIX)
        .filter_map(|doc| doc.metadata.get("url"))
        .filter(|url| !url.is_empty() && url.as_str() != "unknown")
        .cloned()
        .collect()
}

/// Adds research sources not already cited, then caps the list.
fn with_research_citations(mut links: Vec<ExternalLink>, sources: &[String]) -> Vec<ExternalLink> {
    for url in sources.iter().take(MAX_RESEARCH_CITATIONS) {
        if !links.iter().any(|link| &link.url == url) {
            links.push(research_citation(url));
        }
    }
    links.truncate(MAX_EXTERNAL);
    links
}

/// Items under `key` that deserialize as `T`; anything else is dropped.
fn valid_items<T: DeserializeOwned>(payload: &serde_json::Value, key: &str, max: usize) -> Vec<T> {
    payload
        .get(key)
        .and_then(serde_json::Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value(item.clone()).ok())
                .take(max)
                .collect()
        })
        .unwrap_or_default()
}

fn shorten_url(url: &str) -> String {
    if url.chars().count() > MAX_URL_DISPLAY_CHARS {
        format!("{}...", head(url, MAX_URL_DISPLAY_CHARS))
    } else {
        url.to_string()
    }
}

/// Renders the report as two markdown tables.
pub fn format_linking_report(report: &LinkingReport) -> String {
    let mut md = String::from("## Linking Strategy Report\n\n");
    md.push_str("### Internal Links\n\n");
    md.push_str("| Anchor Text | Suggested Target Page | Context |\n");
    md.push_str("|-------------|----------------------|----------|\n");
    for link in &report.internal_links {
        let _ = writeln!(
            md,
            "| {} | {} | {} |",
            link.anchor_text, link.suggested_target, link.context
        );
    }
    md.push_str("\n### External Links (Authoritative Sources)\n\n");
    md.push_str("| Source | URL | Anchor Text | Placement |\n");
    md.push_str("|--------|-----|-------------|----------|\n");
    for link in &report.external_links {
        let _ = writeln!(
            md,
            "| {} | {} | {} | {} |",
            link.source_name,
            shorten_url(&link.url),
            link.anchor_text,
            link.placement_context
        );
    }
    md
}

pub struct LinkingStage {
    transform: Arc<dyn ContentTransform>,
}

impl LinkingStage {
    pub fn new(transform: Arc<dyn ContentTransform>) -> Self {
        Self { transform }
    }

    async fn ask(&self, prompt: String) -> Result<serde_json::Value, PipelineError> {
        let answer = self
            .transform
            .transform(TransformRequest::new(ModelRole::Researcher, prompt))
            .await?;
        parse_json(STAGE, &answer)
    }

    async fn internal_links(&self, topic: &str, draft: &str) -> Vec<InternalLink> {
        let prompt = format!(
            "You are an SEO linking strategist. Suggest 3-5 internal linking opportunities.\n\n\
             TOPIC: {topic}\n\nARTICLE:\n{excerpt}\n\n\
             For each: a phrase in the article to link, the related page it should link to, \
             and where in the article the link fits.\n\n\
             Return ONLY valid JSON:\n\
             {{\"internal_links\": [{{\"anchor_text\": \"...\", \"suggested_target\": \"...\", \"context\": \"...\"}}]}}",
            excerpt = head(draft, 5_000),
        );
        match self.ask(prompt).await {
            Ok(payload) => valid_items(&payload, "internal_links", MAX_INTERNAL),
            Err(e) => {
                warn!(error = %e, "internal link suggestions failed, using topic defaults");
                fallback_internal_links(topic)
            }
        }
    }

    async fn external_links(&self, topic: &str, draft: &str, sources: &[String]) -> Vec<ExternalLink> {
        let listed: Vec<&String> = sources.iter().take(5).collect();
        let prompt = format!(
            "You are an SEO linking strategist. Suggest 2-4 authoritative external sources to cite.\n\n\
             TOPIC: {topic}\n\nRESEARCH SOURCES USED:\n{listed:#?}\n\n\
             ARTICLE EXCERPT:\n{excerpt}\n\n\
             For each: the source name, its URL (prefer the research sources), the anchor text, \
             and where and why to cite it. Prefer academic studies, industry reports, government \
             data and established publications.\n\n\
             Return ONLY valid JSON:\n\
             {{\"external_links\": [{{\"source_name\": \"...\", \"url\": \"...\", \"anchor_text\": \"...\", \"placement_context\": \"...\"}}]}}",
            excerpt = head(draft, 3_000),
        );
        match self.ask(prompt).await {
            Ok(payload) => {
                with_research_citations(valid_items(&payload, "external_links", MAX_EXTERNAL), sources)
            }
            Err(e) => {
                warn!(error = %e, "external link suggestions failed, citing research only");
                with_research_citations(Vec::new(), sources)
            }
        }
    }
}

#[async_trait]
impl Stage for LinkingStage {
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
        let sources = research_sources(store);
        let report = LinkingReport {
            internal_links: self.internal_links(&ctx.inputs.topic, &draft).await,
            external_links: self.external_links(&ctx.inputs.topic, &draft, &sources).await,
        };
        info!(
            internal = report.internal_links.len(),
            external = report.external_links.len(),
            "link suggestions ready"
        );
        store.write(names::LINKING_REPORT, format_linking_report(&report));
        Ok(SeoFinding::Linking(report))
    }

    fn fallback(&self, snapshot: &DocumentStore, ctx: &StageContext) -> StageOutcome<SeoFinding> {
        let report = LinkingReport {
            internal_links: fallback_internal_links(&ctx.inputs.topic),
            external_links: with_research_citations(Vec::new(), &research_sources(snapshot)),
        };
        let mut work = snapshot.clone();
        work.write(names::LINKING_REPORT, format_linking_report(&report));
        StageOutcome {
            delta: work.diff(snapshot),
            output: SeoFinding::Linking(report),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransform;
    use pipeline::{JobRequest, Metadata};

    fn ctx() -> StageContext {
        StageContext::new(JobRequest::new("green tea").validate().unwrap(), names::DRAFT)
    }

    fn store_with_sources(urls: &[&str]) -> DocumentStore {
        let mut store = DocumentStore::new();
        for (i, url) in urls.iter().enumerate() {
            store.write_with_metadata(
                format!("research/summary_{i}.md"),
                "facts",
                Metadata::from([("url".to_string(), url.to_string())]),
            );
        }
        store
    }

    #[tokio::test]
    async fn model_links_are_validated_and_research_cited() {
        let transform = ScriptedTransform::new()
            .respond(
                ModelRole::Researcher,
                r#"{"internal_links": [{"anchor_text": "brewing", "suggested_target": "Brewing 101", "context": "intro"}, {"suggested_target": "no anchor"}]}"#,
            )
            .respond(
                ModelRole::Researcher,
                r#"{"external_links": [{"source_name": "Tea Board", "url": "https://a.org", "anchor_text": "per the board", "placement_context": "stats"}]}"#,
            );
        let stage = LinkingStage::new(Arc::new(transform));
        let mut store = store_with_sources(&["https://a.org", "https://b.org", "https://c.org"]);

        let SeoFinding::Linking(report) = stage.run(&mut store, &ctx()).await.unwrap() else {
            panic!("expected linking finding");
        };

        assert_eq!(report.internal_links.len(), 1);
        assert_eq!(report.internal_links[0].anchor_text, "brewing");
        let urls: Vec<&str> = report.external_links.iter().map(|l| l.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a.org", "https://b.org"]);
        assert!(store.exists(names::LINKING_REPORT));
    }

    #[tokio::test]
    async fn failures_fall_back_to_topic_and_research() {
        let transform = ScriptedTransform::new().fail(ModelRole::Researcher, "down");
        let stage = LinkingStage::new(Arc::new(transform));
        let mut store = store_with_sources(&["https://a.org"]);

        let SeoFinding::Linking(report) = stage.run(&mut store, &ctx()).await.unwrap() else {
            panic!("expected linking finding");
        };

        assert_eq!(report.internal_links, fallback_internal_links("green tea"));
        assert_eq!(report.internal_links[0].anchor_text, "green guide");
        assert_eq!(report.external_links, vec![research_citation("https://a.org")]);
    }

    #[test]
    fn long_urls_are_shortened_in_markdown() {
        let long = format!("https://example.com/{}", "a".repeat(60));
        let report = LinkingReport {
            internal_links: Vec::new(),
            external_links: vec![research_citation(&long)],
        };
        let md = format_linking_report(&report);
        assert!(md.contains(&format!("{}...", &long[..50])));
        assert!(!md.contains(&long));
    }
}
