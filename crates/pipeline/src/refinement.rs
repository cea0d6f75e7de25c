//! State and exit rule of the humanizer's critique/refine loop.
//!
//! The loop itself (calling the critic and refiner) lives in the `nodes`
//! crate. This module holds the parts that are pure: the loop state that gets
//! checkpointed and the rule that decides whether another round runs.

use serde::{Deserialize, Serialize};

use crate::HumanizerCritique;

/// Score above which the loop keeps refining.
pub const DEFAULT_THRESHOLD: u8 = 3;

/// Maximum refiner invocations per loop.
pub const DEFAULT_MAX_ITERATIONS: u32 = 3;

/// Tunables for the refinement loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefinementPolicy {
    /// Continue only while the critique's artifact score is strictly above this.
    pub threshold: u8,
    /// Hard bound on refiner invocations.
    pub max_iterations: u32,
}

impl Default for RefinementPolicy {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

/// Which step the loop runs next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopStage {
    /// Score the current draft.
    Critique,
    /// Rewrite the draft against the last critique.
    Refine,
    /// Terminal.
    Done,
}

/// Checkpointable state of one refinement loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefinementLoopState {
    /// Next step.
    pub stage: LoopStage,
    /// Most recent critique; replaced, never merged.
    pub last_critique: Option<HumanizerCritique>,
    /// Refiner invocations so far.
    pub iteration_count: u32,
    /// Document the loop critiques and rewrites.
    pub draft_name: String,
}

impl RefinementLoopState {
    /// A loop that has not run yet.
    pub fn new(draft_name: impl Into<String>) -> Self {
        Self {
            stage: LoopStage::Critique,
            last_critique: None,
            iteration_count: 0,
            draft_name: draft_name.into(),
        }
    }

    /// Returns `true` once the loop has reached [`LoopStage::Done`].
    pub fn is_done(&self) -> bool {
        self.stage == LoopStage::Done
    }

    /// Exit rule, evaluated after every refine step.
    ///
    /// Continue iff the last critique scored strictly above the threshold and
    /// the iteration budget is not exhausted. A missing critique never
    /// continues.
    pub fn should_continue(&self, policy: &RefinementPolicy) -> bool {
        let score = self
            .last_critique
            .as_ref()
            .map(|c| c.ai_artifact_score.as_u8())
            .unwrap_or(0);
        score > policy.threshold && self.iteration_count < policy.max_iterations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ArtifactScore;

    fn state_with(score: u8, iterations: u32) -> RefinementLoopState {
        let mut state = RefinementLoopState::new("draft.md");
        state.last_critique = Some(HumanizerCritique::synthetic(
            ArtifactScore::new(score).unwrap(),
            "",
        ));
        state.iteration_count = iterations;
        state
    }

    #[test]
    fn continues_on_high_score_with_budget_left() {
        assert!(state_with(5, 0).should_continue(&RefinementPolicy::default()));
    }

    #[test]
    fn exits_at_or_below_threshold() {
        assert!(!state_with(3, 0).should_continue(&RefinementPolicy::default()));
        assert!(!state_with(2, 1).should_continue(&RefinementPolicy::default()));
    }

    #[test]
    fn exits_when_iterations_are_spent() {
        assert!(!state_with(8, 3).should_continue(&RefinementPolicy::default()));
    }

    #[test]
    fn missing_critique_exits() {
        let state = RefinementLoopState::new("draft.md");
        assert!(!state.should_continue(&RefinementPolicy::default()));
    }
}
