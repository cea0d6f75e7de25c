//! Refinement loop controller for the humanize stage.
//!
//! Alternates critique and rewrite over the draft until the critic's
//! artifact score drops to the threshold or the iteration cap is reached.
//! The loop state lives in [`RefinementLoopState`] so the executor can
//! checkpoint between steps and resume mid-loop.
//!
//! Failures never escape: a failed critique becomes a score-zero critique
//! (which ends the loop after one more refiner call), and a failed rewrite
//! leaves the draft unchanged but still counts as an iteration. Together with
//! the iteration cap this guarantees termination.

use std::sync::Arc;

use pipeline::{
    ArtifactScore, DocumentStore, HumanizerCritic, HumanizerCritique, HumanizerRefiner, LoopStage,
    RefinementLoopState, RefinementPolicy,
};
use tracing::{info, warn};

/// Critique-then-rewrite controller for the draft, bounded by a [`RefinementPolicy`].
pub struct RefinementLoop {
    critic: Arc<dyn HumanizerCritic>,
    refiner: Arc<dyn HumanizerRefiner>,
    policy: RefinementPolicy,
}

impl RefinementLoop {
    /// A loop that asks `critic` for scores and `refiner` for rewrites.
    pub fn new(
        critic: Arc<dyn HumanizerCritic>,
        refiner: Arc<dyn HumanizerRefiner>,
        policy: RefinementPolicy,
    ) -> Self {
        Self {
            critic,
            refiner,
            policy,
        }
    }

    pub fn policy(&self) -> &RefinementPolicy {
        &self.policy
    }

    /// Performs one transition and returns the stage the loop moved to.
    ///
    /// `Done` is absorbing: stepping a finished loop changes nothing.
    pub async fn step(&self, state: &mut RefinementLoopState, store: &mut DocumentStore) -> LoopStage {
        match state.stage {
            LoopStage::Critique => {
                let critique = self.critique(store.read_or_empty(&state.draft_name)).await;
                info!(
                    score = %critique.ai_artifact_score,
                    iteration = state.iteration_count,
                    "humanizer critique"
                );
                state.last_critique = Some(critique);
                state.stage = LoopStage::Refine;
            }
            LoopStage::Refine => {
                self.refine(state, store).await;
                state.stage = if state.should_continue(&self.policy) {
                    LoopStage::Critique
                } else {
                    LoopStage::Done
                };
                info!(
                    iteration = state.iteration_count,
                    next = ?state.stage,
                    "humanizer refinement step"
                );
            }
            LoopStage::Done => {}
        }
        state.stage
    }

    /// Steps until the loop is done.
    pub async fn run(&self, state: &mut RefinementLoopState, store: &mut DocumentStore) {
        while !state.is_done() {
            self.step(state, store).await;
        }
    }

    async fn critique(&self, draft: &str) -> HumanizerCritique {
        if draft.trim().is_empty() {
            return HumanizerCritique::synthetic(ArtifactScore::EXIT, "No draft to critique.");
        }
        match self.critic.critique(draft).await {
            Ok(critique) => critique,
            Err(e) => {
                warn!(error = %e, "humanizer critic failed, forcing loop exit");
                HumanizerCritique::synthetic(ArtifactScore::EXIT, format!("Critic error: {e}"))
            }
        }
    }

    async fn refine(&self, state: &mut RefinementLoopState, store: &mut DocumentStore) {
        let draft = store.read_or_empty(&state.draft_name).to_string();
        let Some(critique) = state.last_critique.as_ref() else {
            return;
        };
        if draft.trim().is_empty() {
            return;
        }
        match self.refiner.refine(&draft, critique).await {
            Ok(rewritten) => store.write(state.draft_name.clone(), rewritten),
            Err(e) => warn!(error = %e, "humanizer refiner failed, keeping draft"),
        }
        state.iteration_count += 1;
    }
}
