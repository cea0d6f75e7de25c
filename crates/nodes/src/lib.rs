//! Copydesk stage implementations and orchestration.
//!
//! This crate provides the concrete stages (planner, research, write,
//! evaluate, humanize, SEO analysis, finalize), the fan-out/fan-in
//! coordinator, the humanizer refinement loop controller, the
//! [`PipelineExecutor`] that drives a run state through its phases, and the
//! [`JobService`] that runs jobs in the background.
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** Nodes sequence calls between business logic in the
//! [`pipeline`] crate and the collaborator traits it defines (content
//! transform, search, scraping, checkpointing). Routing decisions, the loop
//! exit rule and the merge policy stay in [`pipeline`]; this crate only
//! applies them.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`stages`] | Concrete stages and their prompts |
//! | [`fanout`] | Snapshot fan-out, per-branch timeout, ordered fan-in |
//! | [`refine_loop`] | Critique/refine loop controller |
//! | [`executor`] | Phase loop with a checkpoint after every transition |
//! | [`jobs`] | Job submission, status and resume |

pub mod executor;
pub mod fanout;
pub mod jobs;
pub mod refine_loop;
pub mod stages;

#[cfg(test)]
mod testing;

pub use executor::{PipelineExecutor, StageSet};
pub use fanout::{invoke_stage, Branch, BranchOutput, FanOutCoordinator, FanOutResult};
pub use jobs::{job_result, JobService};
pub use refine_loop::RefinementLoop;
pub use stages::research::{OfflineScraper, OfflineSearchProvider};
pub use stages::SeoFinding;
