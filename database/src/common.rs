//! Row<->model conversions and SQLx error mapping shared by every
//! per-aggregate repository in [`crate::sqlite`].

use serde_json::{Map, Value};
use task_core::error::OrchestratorError;
use task_core::models::{Priority, TaskStatus};

/// Maps a raw SQLx error onto the taxonomy the services expect, mirroring
/// how a unique-constraint violation becomes a domain-level `Duplicate` and
/// everything else becomes `Database`.
pub fn map_sqlx_error(err: sqlx::Error) -> OrchestratorError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.is_unique_violation() {
            return OrchestratorError::Duplicate(db_err.message().to_string());
        }
        if db_err.is_foreign_key_violation() {
            return OrchestratorError::Validation {
                field: "reference".to_string(),
                message: db_err.message().to_string(),
            };
        }
    }
    OrchestratorError::Database(err.to_string())
}

pub fn status_to_string(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Todo => "todo",
        TaskStatus::InProgress => "in_progress",
        TaskStatus::Blocked => "blocked",
        TaskStatus::Review => "review",
        TaskStatus::Testing => "testing",
        TaskStatus::Done => "done",
        TaskStatus::Cancelled => "cancelled",
        TaskStatus::Archived => "archived",
    }
}

pub fn string_to_status(s: &str) -> Result<TaskStatus, OrchestratorError> {
    match s {
        "todo" => Ok(TaskStatus::Todo),
        "in_progress" => Ok(TaskStatus::InProgress),
        "blocked" => Ok(TaskStatus::Blocked),
        "review" => Ok(TaskStatus::Review),
        "testing" => Ok(TaskStatus::Testing),
        "done" => Ok(TaskStatus::Done),
        "cancelled" => Ok(TaskStatus::Cancelled),
        "archived" => Ok(TaskStatus::Archived),
        other => Err(OrchestratorError::Database(format!("unknown task status '{other}' in storage"))),
    }
}

pub fn priority_to_string(p: Priority) -> &'static str {
    match p {
        Priority::Low => "low",
        Priority::Medium => "medium",
        Priority::High => "high",
        Priority::Critical => "critical",
        Priority::Urgent => "urgent",
    }
}

pub fn string_to_priority(s: &str) -> Result<Priority, OrchestratorError> {
    match s {
        "low" => Ok(Priority::Low),
        "medium" => Ok(Priority::Medium),
        "high" => Ok(Priority::High),
        "critical" => Ok(Priority::Critical),
        "urgent" => Ok(Priority::Urgent),
        other => Err(OrchestratorError::Database(format!("unknown priority '{other}' in storage"))),
    }
}

pub fn parse_json_object(raw: &str) -> Result<Map<String, Value>, OrchestratorError> {
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(raw).map_err(|e| OrchestratorError::Database(e.to_string()))? {
        Value::Object(map) => Ok(map),
        _ => Ok(Map::new()),
    }
}

pub fn to_json_text(map: &Map<String, Value>) -> String {
    serde_json::to_string(map).unwrap_or_else(|_| "{}".to_string())
}
