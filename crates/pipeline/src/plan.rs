//! The plan: a fixed, ordered sequence of typed tasks.
//!
//! A [`Plan`] is built exactly once from the planner's [`TaskDraft`]s. After
//! that its length and order never change; the only mutation is the forward
//! status transition performed by the orchestration core through
//! [`Plan::complete`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::TaskId;

/// What a task asks the pipeline to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Search, select, scrape and summarize sources into `research/*`.
    Research,
    /// Draft a section and append it to the working draft.
    Write,
}

impl TaskKind {
    /// Parses the planner's `type` label. Unknown labels yield `None`.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "research" => Some(Self::Research),
            "write" => Some(Self::Write),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskKind::Research => write!(f, "research"),
            TaskKind::Write => write!(f, "write"),
        }
    }
}

/// Lifecycle of a task. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Not yet dispatched.
    Pending,
    /// Dispatched and its delta merged.
    Completed,
    /// Reserved; no stage currently produces it.
    Failed,
}

/// A task as proposed by the planner, before ids are assigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDraft {
    /// The task kind.
    pub kind: TaskKind,
    /// Free-text instruction for the stage.
    pub description: String,
    /// Extra stage parameters.
    #[serde(default)]
    pub params: BTreeMap<String, serde_json::Value>,
}

impl TaskDraft {
    /// Creates a draft with no extra parameters.
    pub fn new(kind: TaskKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
            params: BTreeMap::new(),
        }
    }
}

/// One unit of plan work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// 1-based position in the plan as first produced.
    pub id: TaskId,
    /// The task kind.
    pub kind: TaskKind,
    /// Free-text instruction for the stage.
    pub description: String,
    /// Current lifecycle state.
    pub status: TaskStatus,
    /// Extra stage parameters.
    #[serde(default)]
    pub params: BTreeMap<String, serde_json::Value>,
}

/// Ordered, fixed-length sequence of tasks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Plan {
    tasks: Vec<Task>,
}

impl Plan {
    /// Builds a plan, assigning each draft the id equal to its 1-based position.
    pub fn from_drafts(drafts: impl IntoIterator<Item = TaskDraft>) -> Self {
        let tasks = drafts
            .into_iter()
            .zip(1u64..)
            .filter_map(|(draft, position)| {
                TaskId::new(position).map(|id| Task {
                    id,
                    kind: draft.kind,
                    description: draft.description,
                    status: TaskStatus::Pending,
                    params: draft.params,
                })
            })
            .collect();
        Self { tasks }
    }

    /// Number of tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns `true` if no plan has been produced yet.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Returns the task at `index`, if any.
    pub fn get(&self, index: usize) -> Option<&Task> {
        self.tasks.get(index)
    }

    /// All tasks in order.
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Marks the task at `index` completed.
    ///
    /// Only `Pending` tasks move; a task already completed or failed is left
    /// untouched. Returns `true` if the status changed.
    pub fn complete(&mut self, index: usize) -> bool {
        match self.tasks.get_mut(index) {
            Some(task) if task.status == TaskStatus::Pending => {
                task.status = TaskStatus::Completed;
                true
            }
            _ => false,
        }
    }
}
