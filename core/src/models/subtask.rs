use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Id, Priority, TaskStatus};

/// A child unit of work under a Task. Reuses [`TaskStatus`]/[`Priority`] —
/// the spec gives subtasks the same vocabulary, just no dependency DAG or
/// context of their own.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subtask {
    pub id: Id,
    pub task_id: Id,
    pub owner_user_id: String,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub priority: Priority,
    #[serde(default)]
    pub assignee_ids: Vec<String>,
    /// 0..100. Completing a subtask forces this to 100.
    pub progress_percentage: u8,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewSubtask {
    pub task_id: Id,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_priority")]
    pub priority: Priority,
    #[serde(default)]
    pub assignee_ids: Vec<String>,
    #[serde(default)]
    pub progress_percentage: u8,
}

fn default_priority() -> Priority {
    Priority::Medium
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct UpdateSubtask {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub assignee_ids: Option<Vec<String>>,
    pub progress_percentage: Option<u8>,
}
