//! Task-dispatch decision.
//!
//! The router is a pure function of the plan and the cursor. It decides what
//! the per-task loop does next; the executor in the `nodes` crate carries the
//! decision out and then calls [`route`] again.

use serde::{Deserialize, Serialize};

use crate::{Plan, RunState, TaskKind};

/// The router's decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    /// No plan yet; invoke the planner.
    NeedsPlan,
    /// The task under the cursor is a research task.
    DispatchResearch,
    /// The task under the cursor is a write task.
    DispatchWrite,
    /// Every task has been processed; leave the per-task loop for good.
    PostProcess,
}

/// Decides the next step for `plan` with the cursor at `cursor`.
pub fn route(plan: &Plan, cursor: usize) -> Route {
    if plan.is_empty() {
        return Route::NeedsPlan;
    }
    match plan.get(cursor) {
        None => Route::PostProcess,
        Some(task) => match task.kind {
            TaskKind::Research => Route::DispatchResearch,
            TaskKind::Write => Route::DispatchWrite,
        },
    }
}

impl RunState {
    /// Routes on this state's plan and cursor.
    pub fn route(&self) -> Route {
        route(self.plan(), self.cursor())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RunInputs, StoreDelta, TaskDraft, WordCount};
    use proptest::prelude::*;

    fn plan_of(kinds: &[TaskKind]) -> Plan {
        Plan::from_drafts(kinds.iter().map(|k| TaskDraft::new(*k, format!("{k} task"))))
    }

    fn arb_kind() -> impl Strategy<Value = TaskKind> {
        prop_oneof![Just(TaskKind::Research), Just(TaskKind::Write)]
    }

    #[test]
    fn empty_plan_needs_planning() {
        assert_eq!(route(&Plan::default(), 0), Route::NeedsPlan);
    }

    #[test]
    fn cursor_past_end_leaves_the_loop() {
        let plan = plan_of(&[TaskKind::Research]);
        assert_eq!(route(&plan, 1), Route::PostProcess);
        assert_eq!(route(&plan, 5), Route::PostProcess);
    }

    #[test]
    fn dispatch_follows_task_kind() {
        let plan = plan_of(&[TaskKind::Research, TaskKind::Write]);
        assert_eq!(route(&plan, 0), Route::DispatchResearch);
        assert_eq!(route(&plan, 1), Route::DispatchWrite);
    }

    proptest! {
        #[test]
        fn routing_is_a_function_of_the_task_kind(
            kinds in prop::collection::vec(arb_kind(), 1..12),
            cursor in 0usize..12,
        ) {
            let plan = plan_of(&kinds);
            let first = route(&plan, cursor);
            prop_assert_eq!(first, route(&plan, cursor));
            let expected = match kinds.get(cursor) {
                None => Route::PostProcess,
                Some(TaskKind::Research) => Route::DispatchResearch,
                Some(TaskKind::Write) => Route::DispatchWrite,
            };
            prop_assert_eq!(first, expected);
        }

        #[test]
        fn cursor_is_monotonic_and_bounded(
            kinds in prop::collection::vec(arb_kind(), 1..12),
            extra_dispatches in 0usize..5,
        ) {
            let mut state = RunState::new(RunInputs {
                topic: "t".into(),
                word_count: WordCount::default(),
                language: "English".into(),
            });
            state.install_plan(plan_of(&kinds));

            let mut previous = state.cursor();
            for _ in 0..kinds.len() + extra_dispatches {
                state.complete_current(StoreDelta::empty());
                prop_assert!(state.cursor() >= previous);
                prop_assert!(state.cursor() <= state.plan().len());
                previous = state.cursor();
            }
            prop_assert_eq!(state.cursor(), kinds.len());
            prop_assert_eq!(state.route(), Route::PostProcess);
        }
    }
}
