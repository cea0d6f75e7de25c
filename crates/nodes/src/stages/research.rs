//! Research stage: search, pick sources, scrape, summarize.
//!
//! Each summary lands in the store under `research/summary_<hash>.md` with
//! `url` and `query` metadata. A source that cannot be scraped or summarized
//! is skipped; the stage itself only fails if nothing at all can be searched.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use pipeline::{
    names, ContentTransform, DocumentStore, Metadata, ModelRole, PageScraper, PipelineError,
    SearchProvider, SearchResult, Stage, StageContext, StageOutcome, TransformRequest,
};
use regex::Regex;
use tracing::{debug, info, warn};

use super::head;

const STAGE: &str = "research";
const MAX_SEARCH_RESULTS: usize = 5;
const MAX_SELECTED_URLS: usize = 2;
const MAX_SCRAPED_CHARS: usize = 10_000;

// ---------------------------------------------------------------------------
// Offline collaborators
// ---------------------------------------------------------------------------

/// Deterministic search provider used when no live search is available.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineSearchProvider;

#[async_trait]
impl SearchProvider for OfflineSearchProvider {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, PipelineError> {
        let results = vec![
            SearchResult {
                url: "https://mock-example.com/best-tools".into(),
                title: format!("Best Tools for {query}"),
                snippet: format!("An offline snippet for {query}. It talks about productivity."),
                rank: 1,
            },
            SearchResult {
                url: "https://mock-competitor.com/top-10".into(),
                title: format!("Top 10 Things regarding {query}"),
                snippet: "Another offline resource.".into(),
                rank: 2,
            },
        ];
        Ok(results.into_iter().take(max_results.max(1)).collect())
    }
}

/// Deterministic scraper for offline and `example.com` hosts.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineScraper;

impl OfflineScraper {
    /// Returns `true` for URLs this scraper answers instead of the network.
    pub fn handles(url: &str) -> bool {
        url.contains("mock") || url.contains("example.com")
    }
}

#[async_trait]
impl PageScraper for OfflineScraper {
    async fn scrape(&self, url: &str) -> Result<Option<String>, PipelineError> {
        Ok(Some(format!(
            "Scraped content from {url}. This is an offline article about the topic. \
             It contains headers and paragraphs relevant to the search."
        )))
    }
}

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

fn url_regex() -> &'static Regex {
    static URL: OnceLock<Regex> = OnceLock::new();
    URL.get_or_init(|| Regex::new(r#"https?://[^\s",]+"#).expect("static regex"))
}

/// Stable document name for the summary of `url`.
pub fn summary_name(url: &str) -> String {
    let hash = blake3::hash(url.as_bytes()).to_hex();
    format!("{}summary_{}.md", names::RESEARCH_PREFIX, &hash.as_str()[..16])
}

/// Pulls up to two URLs out of a free-text model answer.
fn urls_in(answer: &str) -> Vec<String> {
    url_regex()
        .find_iter(answer)
        .map(|m| m.as_str().trim_matches(|c| matches!(c, '"' | ',' | '[' | ']')).to_string())
        .filter(|url| !url.is_empty())
        .take(MAX_SELECTED_URLS)
        .collect()
}

pub struct ResearchStage {
    transform: Arc<dyn ContentTransform>,
    search: Arc<dyn SearchProvider>,
    scraper: Arc<dyn PageScraper>,
}

impl ResearchStage {
    pub fn new(
        transform: Arc<dyn ContentTransform>,
        search: Arc<dyn SearchProvider>,
        scraper: Arc<dyn PageScraper>,
    ) -> Self {
        Self {
            transform,
            search,
            scraper,
        }
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, PipelineError> {
        match self.search.search(query, MAX_SEARCH_RESULTS).await {
            Ok(results) if !results.is_empty() => Ok(results),
            Ok(_) => {
                warn!(query, "search returned nothing, using offline provider");
                OfflineSearchProvider.search(query, MAX_SEARCH_RESULTS).await
            }
            Err(e) => {
                warn!(query, error = %e, "search failed, using offline provider");
                OfflineSearchProvider.search(query, MAX_SEARCH_RESULTS).await
            }
        }
    }

    async fn select(&self, query: &str, results: &[SearchResult]) -> Vec<String> {
        let first_results = || {
            results
                .iter()
                .take(MAX_SELECTED_URLS)
                .map(|r| r.url.clone())
                .collect::<Vec<_>>()
        };
        let listing = match serde_json::to_string_pretty(&results[..results.len().min(5)]) {
            Ok(listing) => listing,
            Err(_) => return first_results(),
        };
        let prompt = format!(
            "Here are search results for \"{query}\":\n{listing}\n\n\
             Return ONLY a JSON list of the top {MAX_SELECTED_URLS} URLs that seem most \
             information-rich and relevant.\n\
             Example: [\"http://site.com/a\", \"http://site.com/b\"]"
        );
        match self
            .transform
            .transform(TransformRequest::new(ModelRole::Researcher, prompt))
            .await
        {
            Ok(answer) => {
                let urls = urls_in(&answer);
                if urls.is_empty() {
                    first_results()
                } else {
                    urls
                }
            }
            Err(e) => {
                warn!(error = %e, "source selection failed, taking top results");
                first_results()
            }
        }
    }

    async fn scrape(&self, url: &str) -> Result<Option<String>, PipelineError> {
        if OfflineScraper::handles(url) {
            OfflineScraper.scrape(url).await
        } else {
            self.scraper.scrape(url).await
        }
    }

    async fn summarize(&self, query: &str, content: &str) -> Result<String, PipelineError> {
        let prompt = format!(
            "Summarize the following text related to \"{query}\".\n\
             Extract key facts, statistics, and definitions.\n\n\
             Text:\n{}",
            head(content, MAX_SCRAPED_CHARS)
        );
        self.transform
            .transform(TransformRequest::new(ModelRole::Researcher, prompt))
            .await
    }
}

#[async_trait]
impl Stage for ResearchStage {
    type Output = ();

    fn name(&self) -> &str {
        STAGE
    }

    async fn run(&self, store: &mut DocumentStore, ctx: &StageContext) -> Result<(), PipelineError> {
        let query = ctx
            .task
            .as_ref()
            .map(|task| task.description.clone())
            .unwrap_or_else(|| ctx.inputs.topic.clone());

        let results = self.search(&query).await?;
        let urls = self.select(&query, &results).await;
        info!(query = %query, selected = ?urls, "sources selected");

        for url in urls {
            let content = match self.scrape(&url).await {
                Ok(Some(content)) if !content.trim().is_empty() => content,
                Ok(_) => {
                    warn!(url = %url, "nothing extracted, skipping source");
                    continue;
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "scrape failed, skipping source");
                    continue;
                }
            };
            let summary = match self.summarize(&query, &content).await {
                Ok(summary) => summary,
                Err(e) => {
                    warn!(url = %url, error = %e, "summarization failed, skipping source");
                    continue;
                }
            };
            let name = summary_name(&url);
            debug!(document = %name, bytes = summary.len(), "research summary written");
            let metadata = Metadata::from([
                ("url".to_string(), url),
                ("query".to_string(), query.clone()),
            ]);
            store.write_with_metadata(name, summary, metadata);
        }
        Ok(())
    }

    fn fallback(&self, _snapshot: &DocumentStore, _ctx: &StageContext) -> StageOutcome<()> {
        StageOutcome::without_writes(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransform;
    use pipeline::{JobRequest, Plan, TaskDraft, TaskKind};

    struct FailingSearch;

    #[async_trait]
    impl SearchProvider for FailingSearch {
        async fn search(&self, _: &str, _: usize) -> Result<Vec<SearchResult>, PipelineError> {
            Err(PipelineError::collaborator("search", "offline"))
        }
    }

    struct NoScrape;

    #[async_trait]
    impl PageScraper for NoScrape {
        async fn scrape(&self, _: &str) -> Result<Option<String>, PipelineError> {
            Ok(None)
        }
    }

    fn ctx() -> StageContext {
        let inputs = JobRequest::new("green tea").validate().unwrap();
        let plan = Plan::from_drafts(vec![TaskDraft::new(TaskKind::Research, "tea benefits")]);
        StageContext::new(inputs, names::DRAFT).for_task(plan.get(0).unwrap().clone())
    }

    #[test]
    fn summary_names_are_stable_and_prefixed() {
        let a = summary_name("https://example.com/a");
        assert_eq!(a, summary_name("https://example.com/a"));
        assert_ne!(a, summary_name("https://example.com/b"));
        assert!(a.starts_with("research/summary_"));
        assert_eq!(a.len(), "research/summary_".len() + 16 + ".md".len());
    }

    #[test]
    fn urls_are_pulled_from_json_answer() {
        let urls = urls_in(r#"["https://a.example.com/x", "https://b.example.com/y", "https://c.io"]"#);
        assert_eq!(urls, vec!["https://a.example.com/x", "https://b.example.com/y"]);
    }

    #[tokio::test]
    async fn failed_search_falls_back_to_offline_sources() {
        let transform = ScriptedTransform::new()
            .respond(ModelRole::Researcher, "no links here")
            .respond(ModelRole::Researcher, "A summary.");
        let stage = ResearchStage::new(Arc::new(transform), Arc::new(FailingSearch), Arc::new(NoScrape));
        let mut store = DocumentStore::new();

        stage.run(&mut store, &ctx()).await.unwrap();

        let summaries: Vec<_> = store.with_prefix(names::RESEARCH_PREFIX).collect();
        assert_eq!(summaries.len(), 2);
        for doc in summaries {
            assert_eq!(doc.content, "A summary.");
            assert_eq!(doc.metadata.get("query").map(String::as_str), Some("tea benefits"));
            assert!(doc.metadata.get("url").unwrap().starts_with("https://mock-"));
        }
    }

    #[tokio::test]
    async fn unscrapable_sources_are_skipped() {
        let transform = ScriptedTransform::new()
            .respond(ModelRole::Researcher, r#"["https://real-site.org/page"]"#);
        let stage = ResearchStage::new(
            Arc::new(transform),
            Arc::new(OfflineSearchProvider),
            Arc::new(NoScrape),
        );
        let mut store = DocumentStore::new();

        stage.run(&mut store, &ctx()).await.unwrap();

        assert!(store.is_empty());
    }
}
