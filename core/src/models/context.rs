use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::Id;

/// One of the four context tiers, root-down.
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ContextLevel {
    Global,
    Project,
    Branch,
    Task,
}

impl std::fmt::Display for ContextLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ContextLevel::Global => "global",
            ContextLevel::Project => "project",
            ContextLevel::Branch => "branch",
            ContextLevel::Task => "task",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InsightCategory {
    Technical,
    Business,
    Performance,
    Risk,
    Discovery,
}

#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InsightImportance {
    Low,
    Medium,
    High,
    Critical,
}

/// One entry in a context's insight or progress log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InsightEntry {
    pub content: String,
    pub category: Option<InsightCategory>,
    pub importance: Option<InsightImportance>,
    pub agent: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// One per user. Substitutes `user_id` for `id` on the wire — there is no
/// separate Global Context identifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GlobalContext {
    pub user_id: String,
    pub organization_name: Option<String>,
    #[serde(default)]
    pub settings: Map<String, Value>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Supplemental per-context fields carried over from the original source's
/// richer context rows. Stored as their own column (`extras`), not folded
/// into `data`/`overrides`; settable via `create`/`update` on
/// `ContextService` like any other field.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ContextExtras {
    pub local_overrides: Option<Map<String, Value>>,
    pub implementation_notes: Option<String>,
    pub delegation_triggers: Option<Vec<String>>,
    pub force_local_only: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectContext {
    pub project_id: Id,
    pub owner_user_id: String,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default = "default_true")]
    pub inherits_from_global: bool,
    #[serde(default)]
    pub overrides: Map<String, Value>,
    /// When set, `resolve` treats this tier as a hard inheritance root,
    /// generalizing `inherits_from_global` to every tier.
    #[serde(default)]
    pub inheritance_disabled: bool,
    #[serde(default)]
    pub extras: ContextExtras,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BranchContext {
    pub branch_id: Id,
    pub owner_user_id: String,
    pub parent_project_id: Id,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub overrides: Map<String, Value>,
    #[serde(default)]
    pub inheritance_disabled: bool,
    #[serde(default)]
    pub extras: ContextExtras,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// `task_data` nests `progress`, `insights[]`, and `next_steps[]` to
/// preserve the original "metadata in task_data" wire shape (§9).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskContext {
    pub task_id: Id,
    pub owner_user_id: String,
    pub parent_branch_id: Id,
    #[serde(default)]
    pub task_data: Map<String, Value>,
    #[serde(default)]
    pub overrides: Map<String, Value>,
    #[serde(default)]
    pub inheritance_disabled: bool,
    #[serde(default)]
    pub extras: ContextExtras,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

/// Result of `resolve(level, id)`: the deep-merged view root-down, with the
/// owning tier's `overrides` applied last.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolvedContext {
    pub level: ContextLevel,
    pub id: Id,
    pub data: Map<String, Value>,
    pub version: i32,
    pub resolved_at: DateTime<Utc>,
}
