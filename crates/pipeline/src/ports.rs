//! Port traits: every collaborator the orchestration core reaches through.
//!
//! Infrastructure crates implement these; the `nodes` crate consumes them as
//! `Arc<dyn …>` handles constructed once at start-up and passed in explicitly.
//! Nothing here holds process-wide state.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    DocumentStore, HumanizerCritique, JobId, PipelineError, RunInputs, RunState, StoreDelta, Task,
    TaskDraft,
};

// ---------------------------------------------------------------------------
// Content transform (language model)
// ---------------------------------------------------------------------------

/// Which configured model a transform request is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelRole {
    /// Turns a topic into a plan.
    Planner,
    /// Selects sources and summarizes them; also runs SEO extraction.
    Researcher,
    /// Drafts article sections and FAQ answers.
    Writer,
    /// Evaluate-phase critic focused on structure and SEO.
    StructureCritic,
    /// Evaluate-phase critic focused on engagement and tone.
    EngagementCritic,
    /// Evaluate-phase critic focused on logic and accuracy.
    LogicCritic,
    /// Rewrites whole drafts (optimizer, humanizer critic and refiner).
    Optimizer,
}

impl ModelRole {
    /// Every role, in declaration order.
    pub const ALL: [ModelRole; 7] = [
        ModelRole::Planner,
        ModelRole::Researcher,
        ModelRole::Writer,
        ModelRole::StructureCritic,
        ModelRole::EngagementCritic,
        ModelRole::LogicCritic,
        ModelRole::Optimizer,
    ];
}

impl std::fmt::Display for ModelRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ModelRole::Planner => "planner",
            ModelRole::Researcher => "researcher",
            ModelRole::Writer => "writer",
            ModelRole::StructureCritic => "structure_critic",
            ModelRole::EngagementCritic => "engagement_critic",
            ModelRole::LogicCritic => "logic_critic",
            ModelRole::Optimizer => "optimizer",
        };
        f.write_str(label)
    }
}

/// One opaque text-in/text-out model call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformRequest {
    /// Model routing.
    pub role: ModelRole,
    /// Full prompt text.
    pub prompt: String,
}

impl TransformRequest {
    /// Creates a request for `role`.
    pub fn new(role: ModelRole, prompt: impl Into<String>) -> Self {
        Self {
            role,
            prompt: prompt.into(),
        }
    }
}

/// A language model seen as a content transform: text in, text out, or failure.
#[async_trait]
pub trait ContentTransform: Send + Sync {
    /// Runs the transform.
    ///
    /// # Errors
    ///
    /// [`PipelineError::CollaboratorFailure`] if the model could not produce output.
    async fn transform(&self, request: TransformRequest) -> Result<String, PipelineError>;
}

// ---------------------------------------------------------------------------
// Web research
// ---------------------------------------------------------------------------

/// One web search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Page URL.
    pub url: String,
    /// Page title.
    pub title: String,
    /// Result snippet.
    pub snippet: String,
    /// 1-based rank in the result list.
    pub rank: u32,
}

/// Web search.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Returns up to `max_results` hits for `query`.
    async fn search(&self, query: &str, max_results: usize)
        -> Result<Vec<SearchResult>, PipelineError>;
}

/// Main-text extraction from a web page.
#[async_trait]
pub trait PageScraper: Send + Sync {
    /// Returns the page's main text, or `None` if nothing could be extracted.
    async fn scrape(&self, url: &str) -> Result<Option<String>, PipelineError>;
}

// ---------------------------------------------------------------------------
// Stage collaborators
// ---------------------------------------------------------------------------

/// Parameters every stage invocation receives alongside its store copy.
#[derive(Debug, Clone, PartialEq)]
pub struct StageContext {
    /// The job's inputs.
    pub inputs: RunInputs,
    /// Name of the working draft document.
    pub draft_name: String,
    /// The task being dispatched, for per-task stages.
    pub task: Option<Task>,
}

impl StageContext {
    /// A context for post-processing stages.
    pub fn new(inputs: RunInputs, draft_name: impl Into<String>) -> Self {
        Self {
            inputs,
            draft_name: draft_name.into(),
            task: None,
        }
    }

    /// The same context carrying `task`.
    pub fn for_task(&self, task: Task) -> Self {
        Self {
            task: Some(task),
            ..self.clone()
        }
    }
}

/// What a stage hands back to the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutcome<T> {
    /// Documents the stage wrote.
    pub delta: StoreDelta,
    /// Stage-specific structured output.
    pub output: T,
}

impl<T> StageOutcome<T> {
    /// An outcome that writes nothing.
    pub fn without_writes(output: T) -> Self {
        Self {
            delta: StoreDelta::empty(),
            output,
        }
    }
}

/// A unit of pipeline work run against a private store copy.
///
/// `run` mutates the copy it is given; the caller diffs it against the
/// snapshot to obtain the delta. When `run` fails (or is abandoned on a
/// timeout) the caller discards the copy and uses [`Stage::fallback`]
/// instead, so a stage's failure never reaches the router or coordinator.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Stage-specific structured output.
    type Output: Send + 'static;

    /// Stable name used in logs, merge reports and error messages.
    fn name(&self) -> &str;

    /// Runs the stage.
    async fn run(
        &self,
        store: &mut DocumentStore,
        ctx: &StageContext,
    ) -> Result<Self::Output, PipelineError>;

    /// The declared empty-safe result used when `run` fails.
    fn fallback(&self, snapshot: &DocumentStore, ctx: &StageContext) -> StageOutcome<Self::Output>;
}

/// Produces the initial plan.
#[async_trait]
pub trait Planner: Send + Sync {
    /// Proposes tasks for `inputs`. Ids are assigned by the caller.
    async fn plan(&self, inputs: &RunInputs) -> Result<Vec<TaskDraft>, PipelineError>;

    /// Plan used when [`Planner::plan`] fails or proposes nothing usable.
    fn fallback(&self, inputs: &RunInputs) -> Vec<TaskDraft>;
}

/// Scores how mechanical a draft reads.
#[async_trait]
pub trait HumanizerCritic: Send + Sync {
    /// Critiques `draft` (never called with an empty draft).
    async fn critique(&self, draft: &str) -> Result<HumanizerCritique, PipelineError>;
}

/// Rewrites a draft against a critique.
#[async_trait]
pub trait HumanizerRefiner: Send + Sync {
    /// Returns the complete rewritten draft.
    async fn refine(
        &self,
        draft: &str,
        critique: &HumanizerCritique,
    ) -> Result<String, PipelineError>;
}

// ---------------------------------------------------------------------------
// Checkpointing
// ---------------------------------------------------------------------------

/// Durable run-state storage keyed by job.
///
/// `save` must replace the previous checkpoint atomically: a reader sees
/// either the old state or the new one, never a mix.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Records `state` as the latest checkpoint for `job_id`.
    async fn save(&self, job_id: JobId, state: &RunState) -> Result<(), PipelineError>;

    /// Loads the latest checkpoint for `job_id`, if any.
    async fn load(&self, job_id: JobId) -> Result<Option<RunState>, PipelineError>;

    /// Deletes the checkpoint for `job_id`. Returns `true` if one existed.
    async fn purge(&self, job_id: JobId) -> Result<bool, PipelineError>;
}
