use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Id;

/// A tenant-owned container for branches of work.
///
/// `name` is unique per `owner_user_id`; deleting a project cascades to its
/// branches, tasks, subtasks, and contexts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub id: Id,
    pub owner_user_id: String,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewProject {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct UpdateProject {
    pub name: Option<String>,
    pub description: Option<String>,
}
