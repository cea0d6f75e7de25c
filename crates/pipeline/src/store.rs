//! In-memory document store shared by every stage.
//!
//! The store is a plain value: it is not internally synchronised. Stages never
//! share one. Each stage invocation works on its own clone, and the orchestrator
//! folds the changes back in as a [`StoreDelta`] computed by
//! [`DocumentStore::diff`]. That copy-then-merge discipline is what lets the
//! fan-out coordinator run stages concurrently without locks.
//!
//! Documents are keyed by name. Names behave like paths with conventional
//! prefixes; see [`names`] for the ones stages agree on.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::PipelineError;

/// Free-form key/value annotations attached to a document (e.g. `url`, `query`).
pub type Metadata = BTreeMap<String, String>;

/// Document names that form the contract between stages.
pub mod names {
    /// Prefix for research summaries written by the research stage.
    pub const RESEARCH_PREFIX: &str = "research/";
    /// The working draft, appended to by the write stage and rewritten by
    /// post-processing.
    pub const DRAFT: &str = "draft.md";
    /// Markdown FAQ section produced by SEO analysis.
    pub const FAQ_SECTION: &str = "faq_section.md";
    /// Markdown keyword report produced by SEO analysis.
    pub const KEYWORD_REPORT: &str = "keyword_report.md";
    /// Markdown linking report produced by SEO analysis.
    pub const LINKING_REPORT: &str = "linking_report.md";
    /// The terminal artefact assembled by the finalize stage.
    pub const FINAL_ARTICLE: &str = "final_article.md";
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// A named text blob with attached metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Unique key within the store.
    pub name: String,
    /// Full text content.
    pub content: String,
    /// Annotations; replaced wholesale on every write.
    #[serde(default)]
    pub metadata: Metadata,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// A mapping from document name to [`Document`].
///
/// Writes are unconditional upserts and there is no delete, so a name once
/// written stays readable for the lifetime of the store value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentStore {
    documents: BTreeMap<String, Document>,
}

impl DocumentStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the names of all documents.
    pub fn list(&self) -> Vec<&str> {
        self.documents.keys().map(String::as_str).collect()
    }

    /// Returns every document whose name starts with `prefix`.
    pub fn with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a Document> + 'a {
        self.documents
            .values()
            .filter(move |doc| doc.name.starts_with(prefix))
    }

    /// Returns `true` if a document named `name` has been written.
    pub fn exists(&self, name: &str) -> bool {
        self.documents.contains_key(name)
    }

    /// Returns the content of `name`.
    ///
    /// # Errors
    ///
    /// [`PipelineError::NotFound`] if the document has never been written.
    pub fn read(&self, name: &str) -> Result<&str, PipelineError> {
        self.get(name).map(|doc| doc.content.as_str())
    }

    /// Returns the full document, including metadata.
    ///
    /// # Errors
    ///
    /// [`PipelineError::NotFound`] if the document has never been written.
    pub fn get(&self, name: &str) -> Result<&Document, PipelineError> {
        self.documents.get(name).ok_or_else(|| PipelineError::NotFound {
            name: name.to_string(),
        })
    }

    /// Returns the content of `name`, or the empty string when absent.
    pub fn read_or_empty(&self, name: &str) -> &str {
        self.documents
            .get(name)
            .map(|doc| doc.content.as_str())
            .unwrap_or("")
    }

    /// Writes `content` to `name` with empty metadata, replacing any existing document.
    pub fn write(&mut self, name: impl Into<String>, content: impl Into<String>) {
        self.write_with_metadata(name, content, Metadata::new());
    }

    /// Writes `content` and `metadata` to `name`, replacing any existing document.
    pub fn write_with_metadata(
        &mut self,
        name: impl Into<String>,
        content: impl Into<String>,
        metadata: Metadata,
    ) {
        let name = name.into();
        self.documents.insert(
            name.clone(),
            Document {
                name,
                content: content.into(),
                metadata,
            },
        );
    }

    /// Number of documents in the store.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Returns `true` if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Computes the documents in `self` that are new or different relative to `base`.
    ///
    /// Used on a stage's private copy after it returns: only what the stage
    /// actually changed travels back to the orchestrator.
    pub fn diff(&self, base: &DocumentStore) -> StoreDelta {
        let documents = self
            .documents
            .values()
            .filter(|doc| base.documents.get(&doc.name) != Some(*doc))
            .cloned()
            .collect();
        StoreDelta { documents }
    }

    /// Upserts every document in `delta`.
    pub fn apply(&mut self, delta: StoreDelta) {
        for doc in delta.documents {
            self.documents.insert(doc.name.clone(), doc);
        }
    }
}

// ---------------------------------------------------------------------------
// Delta
// ---------------------------------------------------------------------------

/// The documents one stage invocation wrote, ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreDelta {
    documents: Vec<Document>,
}

impl StoreDelta {
    /// A delta that changes nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns `true` if the delta carries no documents.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Number of documents carried.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Names of the documents carried.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.documents.iter().map(|doc| doc.name.as_str())
    }

    /// The documents carried.
    pub fn documents(&self) -> &[Document] {
        &self.documents
    }
}
