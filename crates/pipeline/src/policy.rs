//! Orchestration tunables.

use std::time::Duration;

use crate::{names, RefinementPolicy};

/// Per-invocation timeout for fan-out branches.
pub const DEFAULT_STAGE_TIMEOUT: Duration = Duration::from_secs(120);

/// Knobs the executor and coordinator read. Loaded from configuration by the
/// binary; [`PipelinePolicy::default`] is the reference policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelinePolicy {
    /// Name of the working draft document.
    pub draft_name: String,
    /// Timeout applied to each fan-out branch.
    pub stage_timeout: Duration,
    /// Run fan-out branches concurrently. When `false`, branches run one after
    /// another in merge order.
    pub concurrent_fan_out: bool,
    /// Humanizer loop bounds.
    pub refinement: RefinementPolicy,
}

impl Default for PipelinePolicy {
    fn default() -> Self {
        Self {
            draft_name: names::DRAFT.to_string(),
            stage_timeout: DEFAULT_STAGE_TIMEOUT,
            concurrent_fan_out: true,
            refinement: RefinementPolicy::default(),
        }
    }
}
