//! The orchestration's top-level record for one job.
//!
//! [`RunState`] is owned by the orchestration core for the whole job and is
//! the unit that gets checkpointed. Stage collaborators never see it; they get
//! a copy of its document store and hand back a delta.

use serde::{Deserialize, Serialize};

use crate::{
    DocumentStore, FaqItem, KeywordReport, LinkingReport, Plan, RefinementLoopState, RunInputs,
    StoreDelta, Task, TaskId,
};

/// Which part of the pipeline the job is in.
///
/// Variants are declared in execution order; a job only ever moves to a later
/// phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Planning and per-task dispatch.
    Tasks,
    /// Three critics fan out, the optimizer fans in.
    Evaluate,
    /// Bounded critic/refiner loop.
    Humanize,
    /// FAQ, keyword and linking analysis fan out.
    SeoAnalysis,
    /// Final artefact assembly.
    Finalize,
    /// Terminal.
    Done,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Phase::Tasks => "tasks",
            Phase::Evaluate => "evaluate",
            Phase::Humanize => "humanize",
            Phase::SeoAnalysis => "seo_analysis",
            Phase::Finalize => "finalize",
            Phase::Done => "done",
        };
        f.write_str(label)
    }
}

/// Full orchestration state of one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    #[serde(flatten)]
    inputs: RunInputs,
    plan: Plan,
    cursor: usize,
    store: DocumentStore,
    /// FAQ pairs produced by SEO analysis.
    pub faqs: Vec<FaqItem>,
    /// Keyword analysis produced by SEO analysis.
    pub keyword_report: KeywordReport,
    /// Link suggestions produced by SEO analysis.
    pub linking_report: LinkingReport,
    logs: Vec<String>,
    phase: Phase,
    #[serde(default)]
    refinement: Option<RefinementLoopState>,
}

impl RunState {
    /// Creates the state for a freshly submitted job: no plan, empty store,
    /// empty reports.
    pub fn new(inputs: RunInputs) -> Self {
        Self {
            inputs,
            plan: Plan::default(),
            cursor: 0,
            store: DocumentStore::new(),
            faqs: Vec::new(),
            keyword_report: KeywordReport::default(),
            linking_report: LinkingReport::default(),
            logs: Vec::new(),
            phase: Phase::Tasks,
            refinement: None,
        }
    }

    /// The job's immutable inputs.
    pub fn inputs(&self) -> &RunInputs {
        &self.inputs
    }

    /// The plan (empty until the planner has run).
    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    /// Index of the next unprocessed task.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// The shared document store.
    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    /// Mutable access for orchestration-core transitions.
    pub fn store_mut(&mut self) -> &mut DocumentStore {
        &mut self.store
    }

    /// The append-only run log.
    pub fn logs(&self) -> &[String] {
        &self.logs
    }

    /// The current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The humanizer loop state, present while (and after) the loop runs.
    pub fn refinement(&self) -> Option<&RefinementLoopState> {
        self.refinement.as_ref()
    }

    /// Mutable humanizer loop state.
    pub fn refinement_mut(&mut self) -> Option<&mut RefinementLoopState> {
        self.refinement.as_mut()
    }

    /// Replaces the humanizer loop state.
    pub fn set_refinement(&mut self, loop_state: RefinementLoopState) {
        self.refinement = Some(loop_state);
    }

    /// Appends a line to the run log.
    pub fn log(&mut self, line: impl Into<String>) {
        self.logs.push(line.into());
    }

    /// Installs the planner's output.
    ///
    /// A plan is installed at most once: if one is already present, or `plan`
    /// is empty, nothing changes and `false` is returned.
    pub fn install_plan(&mut self, plan: Plan) -> bool {
        if !self.plan.is_empty() || plan.is_empty() {
            return false;
        }
        self.plan = plan;
        true
    }

    /// The task under the cursor, if the per-task loop is not finished.
    pub fn current_task(&self) -> Option<&Task> {
        self.plan.get(self.cursor)
    }

    /// Completes the task under the cursor.
    ///
    /// Marks it completed, advances the cursor by one, and merges `delta` into
    /// the store, all in one call. Returns `None` (and changes nothing) when
    /// the cursor is already at the end of the plan.
    pub fn complete_current(&mut self, delta: StoreDelta) -> Option<TaskId> {
        let id = self.current_task()?.id;
        self.plan.complete(self.cursor);
        self.cursor += 1;
        self.store.apply(delta);
        Some(id)
    }

    /// Merges a stage delta into the store.
    pub fn apply(&mut self, delta: StoreDelta) {
        self.store.apply(delta);
    }

    /// Moves to `next` if it is later than the current phase.
    ///
    /// Returns `true` if the phase changed.
    pub fn advance_phase(&mut self, next: Phase) -> bool {
        if next > self.phase {
            self.phase = next;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{TaskDraft, TaskKind, TaskStatus, WordCount};

    fn inputs() -> RunInputs {
        RunInputs {
            topic: "sourdough".into(),
            word_count: WordCount::default(),
            language: "English".into(),
        }
    }

    #[test]
    fn plan_installs_only_once() {
        let mut state = RunState::new(inputs());
        assert!(!state.install_plan(Plan::default()));
        assert!(state.install_plan(Plan::from_drafts(vec![TaskDraft::new(
            TaskKind::Write,
            "intro"
        )])));
        assert!(!state.install_plan(Plan::from_drafts(vec![
            TaskDraft::new(TaskKind::Research, "again"),
            TaskDraft::new(TaskKind::Write, "again"),
        ])));
        assert_eq!(state.plan().len(), 1);
    }

    #[test]
    fn complete_current_advances_and_merges() {
        let mut state = RunState::new(inputs());
        state.install_plan(Plan::from_drafts(vec![TaskDraft::new(TaskKind::Write, "intro")]));

        let mut work = state.store().clone();
        work.write("draft.md", "hello");
        let delta = work.diff(state.store());

        assert_eq!(state.complete_current(delta).map(TaskId::as_u64), Some(1));
        assert_eq!(state.cursor(), 1);
        assert_eq!(state.plan().get(0).unwrap().status, TaskStatus::Completed);
        assert_eq!(state.store().read("draft.md").unwrap(), "hello");

        assert_eq!(state.complete_current(StoreDelta::empty()), None);
        assert_eq!(state.cursor(), 1);
    }

    #[test]
    fn phases_only_move_forward() {
        let mut state = RunState::new(inputs());
        assert!(state.advance_phase(Phase::Humanize));
        assert!(!state.advance_phase(Phase::Evaluate));
        assert_eq!(state.phase(), Phase::Humanize);
    }

    #[test]
    fn state_survives_json_round_trip() {
        let mut state = RunState::new(inputs());
        state.install_plan(Plan::from_drafts(vec![TaskDraft::new(TaskKind::Research, "facts")]));
        state.log("planned");
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("\"topic\":\"sourdough\""));
        let back: RunState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
