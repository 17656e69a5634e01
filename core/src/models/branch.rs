use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Id;

/// A working stream within a project, optionally handed to an agent.
///
/// `name` is unique per `project_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Branch {
    pub id: Id,
    pub project_id: Id,
    pub owner_user_id: String,
    pub name: String,
    pub description: String,
    pub assigned_agent_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewBranch {
    pub project_id: Id,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub assigned_agent_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct UpdateBranch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub assigned_agent_id: Option<Option<String>>,
}
