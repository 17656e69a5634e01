use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::Id;

/// Task lifecycle states.
///
/// Transitions are validated by [`crate::task_service::TaskService`], not by
/// this type directly — `can_transition_to` here only encodes the shape of
/// the machine for callers that want a cheap yes/no without going through
/// the service (e.g. UI affordance checks).
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Blocked,
    Review,
    Testing,
    Done,
    Cancelled,
    Archived,
}

impl TaskStatus {
    pub fn can_transition_to(&self, new: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (*self, new),
            (Todo, InProgress | Cancelled | Archived)
                | (InProgress, Todo | Blocked | Review | Testing | Done | Cancelled)
                | (Blocked, InProgress | Cancelled)
                | (Review, InProgress | Testing | Done)
                | (Testing, InProgress | Review | Done)
                | (Done, Archived)
                | (Cancelled, Todo | Archived)
        )
    }

    /// Runnable for `manage_task next`: not blocked, not terminal, not pre-flight.
    pub fn is_runnable(&self) -> bool {
        matches!(
            self,
            TaskStatus::Todo | TaskStatus::InProgress | TaskStatus::Review | TaskStatus::Testing
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Review => "review",
            TaskStatus::Testing => "testing",
            TaskStatus::Done => "done",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::Archived => "archived",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
    Urgent,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
            Priority::Urgent => "urgent",
        };
        write!(f, "{s}")
    }
}

/// One entry in a task's progress log, as produced by `add_progress`.
///
/// `content` is pre-formatted with the `=== Progress {n} ===` banner to
/// preserve the wire shape the original progress_history blob used.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressEntry {
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub progress_number: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: Id,
    pub branch_id: Id,
    pub owner_user_id: String,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub priority: Priority,
    #[serde(default)]
    pub assignee_ids: Vec<String>,
    #[serde(default)]
    pub label_ids: Vec<Id>,
    pub due_date: Option<DateTime<Utc>>,
    pub estimated_effort: Option<i32>,
    pub context_id: Option<Id>,
    /// Numbered entries keyed `entry_{n}`, insertion ordered.
    #[serde(default)]
    pub progress_history: BTreeMap<u32, ProgressEntry>,
    #[serde(default)]
    pub progress_count: u32,
    /// Rollup of subtask.progress_percentage, recomputed on every subtask change.
    #[serde(default)]
    pub progress: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Bumped on every successful update; used for `updated_at`-comparison
    /// optimistic concurrency per §5 (distinct from Context's version CAS).
    pub version: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewTask {
    pub branch_id: Id,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_priority")]
    pub priority: Priority,
    #[serde(default)]
    pub assignee_ids: Vec<String>,
    #[serde(default)]
    pub label_ids: Vec<Id>,
    pub due_date: Option<DateTime<Utc>>,
    pub estimated_effort: Option<i32>,
    /// Agent-role label (e.g. `coding-agent`) to resolve into a primary
    /// assignee via the Agent Catalog when `assignee_ids` is empty.
    pub agent_role_label: Option<String>,
}

fn default_priority() -> Priority {
    Priority::Medium
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct UpdateTask {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub assignee_ids: Option<Vec<String>>,
    pub label_ids: Option<Vec<Id>>,
    pub due_date: Option<Option<DateTime<Utc>>>,
    pub estimated_effort: Option<Option<i32>>,
}

/// Filter criteria for `manage_task list`. All fields optional and ANDed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskFilter {
    pub branch_id: Option<Id>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub assignee_id: Option<String>,
    pub label: Option<Id>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn todo_transitions() {
        assert!(TaskStatus::Todo.can_transition_to(TaskStatus::InProgress));
        assert!(TaskStatus::Todo.can_transition_to(TaskStatus::Cancelled));
        assert!(TaskStatus::Todo.can_transition_to(TaskStatus::Archived));
        assert!(!TaskStatus::Todo.can_transition_to(TaskStatus::Done));
        assert!(!TaskStatus::Todo.can_transition_to(TaskStatus::Blocked));
    }

    #[test]
    fn archived_is_terminal() {
        for s in [
            TaskStatus::Todo,
            TaskStatus::InProgress,
            TaskStatus::Blocked,
            TaskStatus::Review,
            TaskStatus::Testing,
            TaskStatus::Done,
            TaskStatus::Cancelled,
            TaskStatus::Archived,
        ] {
            assert!(!TaskStatus::Archived.can_transition_to(s));
        }
    }

    #[test]
    fn cancelled_can_reopen_to_todo() {
        assert!(TaskStatus::Cancelled.can_transition_to(TaskStatus::Todo));
        assert!(TaskStatus::Cancelled.can_transition_to(TaskStatus::Archived));
        assert!(!TaskStatus::Cancelled.can_transition_to(TaskStatus::Done));
    }
}
