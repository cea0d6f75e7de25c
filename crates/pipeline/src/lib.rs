//! Core orchestration domain for Copydesk.
//!
//! This crate contains every domain concept, newtype identifier, shared value
//! type, routing rule, and cross-cutting error type used throughout the
//! content pipeline. Infrastructure crates implement the traits defined here;
//! they never add domain rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! It defines *what* is needed; infrastructure crates define *how* to supply it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype domain identifiers (`JobId`, `TaskId`, `ModelId`) |
//! | [`types`] | Shared value types (`WordCount`, `ArtifactScore`, `Timestamp`) |
//! | [`errors`] | Error taxonomy and retry-policy types |
//! | [`store`] | Document store and store deltas |
//! | [`plan`] | Tasks and the fixed-order plan |
//! | [`state`] | Run state and pipeline phases |
//! | [`router`] | Task-dispatch decision |
//! | [`refinement`] | Humanizer loop state and exit rule |
//! | [`merge`] | Fan-in merge policy |
//! | [`reports`] | FAQ, keyword, linking and critique structures |
//! | [`extract`] | Structured payload extraction from model output |
//! | [`jobs`] | Job submission and status types |
//! | [`policy`] | Orchestration tunables |
//! | [`ports`] | Collaborator traits |

pub mod errors;
pub mod extract;
pub mod identifiers;
pub mod jobs;
pub mod merge;
pub mod plan;
pub mod policy;
pub mod ports;
pub mod refinement;
pub mod reports;
pub mod router;
pub mod state;
pub mod store;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use errors::{PipelineError, RetryPolicy};
pub use extract::{extract_payload, parse_json, strip_preamble, Payload, PayloadSource};
pub use identifiers::{JobId, ModelId, TaskId};
pub use jobs::{JobRequest, JobStatus, JobStatusReport};
pub use merge::{merge_in_order, BranchDelta, MergeCollision, MergeReport};
pub use plan::{Plan, Task, TaskDraft, TaskKind, TaskStatus};
pub use policy::{PipelinePolicy, DEFAULT_STAGE_TIMEOUT};
pub use ports::{
    CheckpointStore, ContentTransform, HumanizerCritic, HumanizerRefiner, ModelRole, PageScraper,
    Planner, SearchProvider, SearchResult, Stage, StageContext, StageOutcome, TransformRequest,
};
pub use refinement::{LoopStage, RefinementLoopState, RefinementPolicy};
pub use reports::{
    ExternalLink, FaqItem, HumanizerCritique, InternalLink, KeywordReport, LinkingReport,
};
pub use router::{route, Route};
pub use state::{Phase, RunState};
pub use store::{names, Document, DocumentStore, Metadata, StoreDelta};
pub use types::{
    ArtifactScore, RunInputs, Timestamp, WordCount, DEFAULT_LANGUAGE, DEFAULT_WORD_COUNT,
};
