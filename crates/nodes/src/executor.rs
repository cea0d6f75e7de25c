//! Pipeline executor: drives one job's run state from planning to finalize.
//!
//! The executor is a step function. [`PipelineExecutor::advance`] performs
//! exactly one transition (plan installation, one task dispatch, one
//! evaluate round, one refinement step, one SEO fan-out, or finalize) and
//! then checkpoints the state. [`PipelineExecutor::run`] repeats that until
//! the run reaches [`Phase::Done`]. Because every transition is checkpointed
//! before the next one starts, a resumed run picks up exactly where the last
//! durable state left off.
//!
//! ## Failure handling
//!
//! Stage failures are absorbed where they happen: task stages and branches
//! substitute their fallbacks, the planner falls back to its default plan,
//! and the refinement loop converts failures into loop exits. The only error
//! that stops a run is a checkpoint that cannot be written.

use std::sync::Arc;

use pipeline::{
    CheckpointStore, ContentTransform, JobId, PageScraper, Phase, PipelineError, PipelinePolicy,
    Plan, Planner, RefinementLoopState, Route, RunState, SearchProvider, StageContext, Timestamp,
};
use tracing::{info, info_span, warn, Instrument};

use crate::fanout::{invoke_stage, Branch, FanOutCoordinator};
use crate::refine_loop::RefinementLoop;
use crate::stages::evaluate::{DraftCritic, DraftOptimizer};
use crate::stages::faq::FaqStage;
use crate::stages::finalize::finalize;
use crate::stages::humanizer::{LlmHumanizerCritic, LlmHumanizerRefiner};
use crate::stages::keywords::KeywordStage;
use crate::stages::linking::LinkingStage;
use crate::stages::planner::{default_plan, LlmPlanner};
use crate::stages::research::ResearchStage;
use crate::stages::writer::WriteStage;
use crate::stages::SeoFinding;

// ---------------------------------------------------------------------------
// Stage set
// ---------------------------------------------------------------------------

/// Every collaborator the executor dispatches to, wired once at start-up.
pub struct StageSet {
    pub planner: Arc<dyn Planner>,
    pub research: Branch<()>,
    pub write: Branch<()>,
    /// Evaluate-phase critics, in join order.
    pub critics: Vec<Branch<String>>,
    pub optimizer: DraftOptimizer,
    pub humanizer: RefinementLoop,
    /// SEO branches in merge order: FAQ, keyword, linking.
    pub seo: Vec<Branch<SeoFinding>>,
}

impl StageSet {
    /// The standard stage set, all backed by one content transform.
    pub fn standard(
        transform: Arc<dyn ContentTransform>,
        search: Arc<dyn SearchProvider>,
        scraper: Arc<dyn PageScraper>,
        policy: &PipelinePolicy,
    ) -> Self {
        let critics = DraftCritic::panel(Arc::clone(&transform))
            .into_iter()
            .map(|critic| Arc::new(critic) as Branch<String>)
            .collect();
        let seo: Vec<Branch<SeoFinding>> = vec![
            Arc::new(FaqStage::new(Arc::clone(&transform))),
            Arc::new(KeywordStage::new(Arc::clone(&transform))),
            Arc::new(LinkingStage::new(Arc::clone(&transform))),
        ];
        Self {
            planner: Arc::new(LlmPlanner::new(Arc::clone(&transform))),
            research: Arc::new(ResearchStage::new(Arc::clone(&transform), search, scraper)),
            write: Arc::new(WriteStage::new(Arc::clone(&transform))),
            critics,
            optimizer: DraftOptimizer::new(Arc::clone(&transform)),
            humanizer: RefinementLoop::new(
                Arc::new(LlmHumanizerCritic::new(Arc::clone(&transform))),
                Arc::new(LlmHumanizerRefiner::new(transform)),
                policy.refinement,
            ),
            seo,
        }
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Drives run states through the pipeline phases and checkpoints each step.
pub struct PipelineExecutor {
    stages: StageSet,
    checkpoints: Arc<dyn CheckpointStore>,
    policy: PipelinePolicy,
    fan_out: FanOutCoordinator,
}

impl PipelineExecutor {
    /// Derives the fan-out coordinator from `policy`.
    pub fn new(stages: StageSet, checkpoints: Arc<dyn CheckpointStore>, policy: PipelinePolicy) -> Self {
        let fan_out = FanOutCoordinator::from_policy(&policy);
        Self {
            stages,
            checkpoints,
            policy,
            fan_out,
        }
    }

    pub fn checkpoints(&self) -> &Arc<dyn CheckpointStore> {
        &self.checkpoints
    }

    pub fn policy(&self) -> &PipelinePolicy {
        &self.policy
    }

    /// Drives `state` to [`Phase::Done`], checkpointing after every transition.
    ///
    /// A state that is already done is returned unchanged.
    ///
    /// # Errors
    ///
    /// [`PipelineError::CheckpointUnavailable`] if a checkpoint cannot be
    /// written. The run stops at the last durable state.
    pub async fn run(&self, job_id: JobId, mut state: RunState) -> Result<RunState, PipelineError> {
        let span = info_span!("job", %job_id);
        async move {
            info!(phase = %state.phase(), cursor = state.cursor(), "run starting");
            self.checkpoints.save(job_id, &state).await?;
            while state.phase() != Phase::Done {
                self.advance(job_id, &mut state).await?;
            }
            info!("run finished");
            Ok(state)
        }
        .instrument(span)
        .await
    }

    /// Performs one transition and checkpoints the result.
    pub async fn advance(&self, job_id: JobId, state: &mut RunState) -> Result<(), PipelineError> {
        let phase = state.phase();
        match phase {
            Phase::Tasks => self.step_tasks(state).await,
            Phase::Evaluate => {
                self.evaluate(state).await;
                state.advance_phase(Phase::Humanize);
            }
            Phase::Humanize => self.humanize_step(state).await,
            Phase::SeoAnalysis => {
                self.seo_analysis(state).await;
                state.advance_phase(Phase::Finalize);
            }
            Phase::Finalize => {
                finalize(state, &self.policy.draft_name, Timestamp::now());
                state.log("finalize: final article assembled");
                state.advance_phase(Phase::Done);
            }
            Phase::Done => return Ok(()),
        }
        self.checkpoints.save(job_id, state).await
    }

    fn context(&self, state: &RunState) -> StageContext {
        StageContext::new(state.inputs().clone(), self.policy.draft_name.clone())
    }

    async fn step_tasks(&self, state: &mut RunState) {
        match state.route() {
            Route::NeedsPlan => self.install_plan(state).await,
            Route::DispatchResearch => self.dispatch(&self.stages.research, state).await,
            Route::DispatchWrite => self.dispatch(&self.stages.write, state).await,
            Route::PostProcess => {
                state.log(format!("router: {} tasks complete, post-processing", state.plan().len()));
                state.advance_phase(Phase::Evaluate);
            }
        }
    }

    async fn install_plan(&self, state: &mut RunState) {
        let inputs = state.inputs().clone();
        let planned = self
            .stages
            .planner
            .plan(&inputs)
            .instrument(info_span!("stage", stage = "planner"))
            .await;
        let drafts = match planned {
            Ok(drafts) => drafts,
            Err(e) => {
                warn!(error = %e, "planner failed, using fallback plan");
                state.log(format!("planner: failed ({e}), using fallback plan"));
                self.stages.planner.fallback(&inputs)
            }
        };
        let mut plan = Plan::from_drafts(drafts);
        if plan.is_empty() {
            plan = Plan::from_drafts(default_plan(&inputs));
        }
        let count = plan.len();
        state.install_plan(plan);
        info!(tasks = count, "plan installed");
        state.log(format!("planner: {count} tasks planned"));
    }

    async fn dispatch(&self, stage: &Branch<()>, state: &mut RunState) {
        let Some(task) = state.current_task().cloned() else {
            return;
        };
        let ctx = self.context(state).for_task(task.clone());
        let span = info_span!("stage", stage = stage.name(), task = task.id.as_u64());
        let (outcome, degraded) = invoke_stage(stage.as_ref(), state.store(), &ctx, None)
            .instrument(span)
            .await;
        let written = outcome.delta.len();
        state.complete_current(outcome.delta);
        info!(task = task.id.as_u64(), kind = %task.kind, written, "task completed");
        state.log(format!(
            "{}: task {} \"{}\" completed{}",
            task.kind,
            task.id.as_u64(),
            task.description,
            if degraded { " (fallback)" } else { "" }
        ));
    }

    async fn evaluate(&self, state: &mut RunState) {
        let ctx = self.context(state);
        let result = self
            .fan_out
            .run(state.store_mut(), &ctx, &self.stages.critics)
            .instrument(info_span!("stage", stage = "evaluate"))
            .await;
        let critiques: Vec<String> = result.outputs.into_iter().map(|branch| branch.output).collect();

        let snapshot = state.store().clone();
        let mut work = snapshot.clone();
        match self.stages.optimizer.optimize(&mut work, &ctx, &critiques).await {
            Ok(true) => {
                state.apply(work.diff(&snapshot));
                state.log("evaluate: draft optimized against critiques");
            }
            Ok(false) => state.log("evaluate: no draft to optimize"),
            Err(e) => {
                warn!(error = %e, "optimizer failed, keeping draft");
                state.log(format!("evaluate: optimizer failed ({e}), draft kept"));
            }
        }
    }

    async fn humanize_step(&self, state: &mut RunState) {
        let mut loop_state = state
            .refinement()
            .cloned()
            .unwrap_or_else(|| RefinementLoopState::new(self.policy.draft_name.clone()));
        let snapshot = state.store().clone();
        let mut work = snapshot.clone();
        let stage = self
            .stages
            .humanizer
            .step(&mut loop_state, &mut work)
            .instrument(info_span!("stage", stage = "humanize"))
            .await;
        state.apply(work.diff(&snapshot));
        state.log(format!(
            "humanize: iteration {}, next {:?}",
            loop_state.iteration_count, stage
        ));
        let done = loop_state.is_done();
        state.set_refinement(loop_state);
        if done {
            state.advance_phase(Phase::SeoAnalysis);
        }
    }

    async fn seo_analysis(&self, state: &mut RunState) {
        let ctx = self.context(state);
        let result = self
            .fan_out
            .run(state.store_mut(), &ctx, &self.stages.seo)
            .instrument(info_span!("stage", stage = "seo_analysis"))
            .await;
        for collision in &result.merge.collisions {
            state.log(format!(
                "seo_analysis: {} written by {}; kept {}",
                collision.name,
                collision.branches.join(", "),
                collision.branches.last().map(String::as_str).unwrap_or("")
            ));
        }
        for branch in result.outputs {
            match branch.output {
                SeoFinding::Faq(faqs) => state.faqs = faqs,
                SeoFinding::Keywords(report) => state.keyword_report = report,
                SeoFinding::Linking(report) => state.linking_report = report,
            }
        }
        state.log("seo_analysis: FAQ, keyword and linking analysis merged");
    }
}
