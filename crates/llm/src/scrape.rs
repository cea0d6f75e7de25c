//! Plain-HTTP page scraper.
//!
//! Fetches a page and reduces its HTML to readable text: script, style and
//! navigation blocks are dropped, remaining tags are removed, a handful of
//! common entities are decoded and whitespace is collapsed.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use pipeline::{PageScraper, PipelineError};
use regex::Regex;
use tracing::debug;

const STAGE: &str = "scraper";

/// Pages yielding fewer characters than this are treated as empty.
const MIN_TEXT_CHARS: usize = 40;

#[derive(Debug, Clone)]
pub struct HttpPageScraper {
    http: reqwest::Client,
}

impl HttpPageScraper {
    /// A scraper whose requests give up after `timeout`.
    ///
    /// # Errors
    ///
    /// [`PipelineError::ConfigurationError`] if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, PipelineError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("copydesk/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PipelineError::ConfigurationError {
                message: format!("cannot build HTTP client: {e}"),
            })?;
        Ok(Self { http })
    }
}

#[async_trait]
impl PageScraper for HttpPageScraper {
    async fn scrape(&self, url: &str) -> Result<Option<String>, PipelineError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| PipelineError::collaborator(STAGE, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::collaborator(
                STAGE,
                format!("GET {url} returned HTTP {}", status.as_u16()),
            ));
        }
        let html = response
            .text()
            .await
            .map_err(|e| PipelineError::collaborator(STAGE, e))?;
        let text = extract_text(&html);
        debug!(url, html_bytes = html.len(), text_chars = text.len(), "page scraped");
        Ok((text.chars().count() >= MIN_TEXT_CHARS).then_some(text))
    }
}

fn block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<(script|style|noscript|nav|header|footer|svg)\b.*?</(script|style|noscript|nav|header|footer|svg)\s*>|<!--.*?-->")
            .expect("static regex")
    })
}

fn break_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)<(br|/p|/div|/li|/h[1-6]|/tr|/section|/article)\b[^>]*>").expect("static regex")
    })
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("static regex"))
}

fn spaces_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[ \t\r\f\v]+").expect("static regex"))
}

fn blank_lines_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n\s*\n+").expect("static regex"))
}

/// Readable text of an HTML document.
pub(crate) fn extract_text(html: &str) -> String {
    let text = block_re().replace_all(html, " ");
    let text = break_re().replace_all(&text, "\n");
    let text = tag_re().replace_all(&text, " ");
    let text = decode_entities(&text);
    let text = spaces_re().replace_all(&text, " ");
    let text = blank_lines_re().replace_all(&text, "\n\n");
    text.lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
