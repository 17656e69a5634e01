//! Repository traits, one per aggregate (C2, §4.2).
//!
//! Every method takes the caller's `owner_user_id` explicitly and is
//! implicitly scoped by it — there is no ambient lookup anywhere below this
//! layer. Implementations live in the `database` crate.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::error::Result;
use crate::models::*;

/// Scalar-only projection used by `list_minimal` to avoid loading
/// association tables on high-frequency browsing paths.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskSummary {
    pub task: Task,
    pub subtask_count: u32,
    pub assignee_count: u32,
    pub dependency_count: u32,
}

#[async_trait]
pub trait ProjectRepository: Send + Sync {
    async fn create(&self, owner_user_id: &str, project: NewProject) -> Result<Project>;
    async fn get_by_id(&self, owner_user_id: &str, id: Id) -> Result<Option<Project>>;
    async fn update(&self, owner_user_id: &str, id: Id, updates: UpdateProject) -> Result<Project>;
    /// Cascades to branches/tasks/subtasks/contexts. Idempotent: deleting an
    /// absent or already-deleted row returns `Ok(0)`.
    async fn delete(&self, owner_user_id: &str, id: Id) -> Result<u64>;
    async fn list(&self, owner_user_id: &str, limit: u32, offset: u32) -> Result<Vec<Project>>;
}

#[async_trait]
pub trait BranchRepository: Send + Sync {
    async fn create(&self, owner_user_id: &str, branch: NewBranch) -> Result<Branch>;
    async fn get_by_id(&self, owner_user_id: &str, id: Id) -> Result<Option<Branch>>;
    async fn update(&self, owner_user_id: &str, id: Id, updates: UpdateBranch) -> Result<Branch>;
    async fn delete(&self, owner_user_id: &str, id: Id) -> Result<u64>;
    async fn list(
        &self,
        owner_user_id: &str,
        project_id: Option<Id>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Branch>>;
}

#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn create(&self, owner_user_id: &str, task: NewTask) -> Result<Task>;
    async fn get_by_id(&self, owner_user_id: &str, id: Id) -> Result<Option<Task>>;

    /// `expected_version`, when set, performs a compare-and-swap against
    /// `Task.version` and returns `Conflict` on mismatch rather than racing
    /// a blind overwrite.
    async fn update(
        &self,
        owner_user_id: &str,
        id: Id,
        updates: UpdateTask,
        expected_version: Option<i32>,
    ) -> Result<Task>;

    async fn set_status(&self, owner_user_id: &str, id: Id, status: TaskStatus) -> Result<Task>;

    async fn set_progress(&self, owner_user_id: &str, id: Id, progress: u32) -> Result<Task>;

    async fn append_progress_entry(
        &self,
        owner_user_id: &str,
        id: Id,
        entry: ProgressEntry,
    ) -> Result<Task>;

    async fn set_context_id(&self, owner_user_id: &str, id: Id, context_id: Id) -> Result<Task>;

    async fn delete(&self, owner_user_id: &str, id: Id) -> Result<u64>;

    /// Never deletes rows the caller doesn't own; returns the count
    /// actually affected.
    async fn bulk_delete(&self, owner_user_id: &str, ids: &[Id]) -> Result<u64>;

    async fn list(&self, owner_user_id: &str, filter: TaskFilter) -> Result<Vec<Task>>;

    async fn list_minimal(&self, owner_user_id: &str, filter: TaskFilter) -> Result<Vec<TaskSummary>>;

    /// Caller's highest-priority runnable task, tie-broken by priority
    /// descending then `created_at` ascending. Candidate filtering by
    /// dependency-done-ness is done by the service, not here.
    async fn list_runnable(&self, owner_user_id: &str) -> Result<Vec<Task>>;
}

#[async_trait]
pub trait TaskDependencyRepository: Send + Sync {
    async fn add(&self, owner_user_id: &str, task_id: Id, depends_on_task_id: Id) -> Result<()>;
    async fn remove(&self, owner_user_id: &str, task_id: Id, depends_on_task_id: Id) -> Result<()>;
    async fn depends_on(&self, owner_user_id: &str, task_id: Id) -> Result<Vec<Id>>;
    /// Every `(task_id, depends_on_task_id)` edge the caller owns, for cycle
    /// detection by forward-reachability DFS in the service layer.
    async fn all_edges(&self, owner_user_id: &str) -> Result<Vec<(Id, Id)>>;
}

#[async_trait]
pub trait SubtaskRepository: Send + Sync {
    async fn create(&self, owner_user_id: &str, subtask: NewSubtask) -> Result<Subtask>;
    async fn get_by_id(&self, owner_user_id: &str, id: Id) -> Result<Option<Subtask>>;
    async fn update(&self, owner_user_id: &str, id: Id, updates: UpdateSubtask) -> Result<Subtask>;
    async fn set_status(&self, owner_user_id: &str, id: Id, status: TaskStatus) -> Result<Subtask>;
    async fn delete(&self, owner_user_id: &str, id: Id) -> Result<u64>;
    async fn list_by_task(&self, owner_user_id: &str, task_id: Id) -> Result<Vec<Subtask>>;
}

#[async_trait]
pub trait LabelRepository: Send + Sync {
    async fn get_or_create(&self, name: &str) -> Result<Label>;
    async fn list(&self) -> Result<Vec<Label>>;
    async fn attach(&self, owner_user_id: &str, task_id: Id, label_id: Id) -> Result<()>;
    async fn detach(&self, owner_user_id: &str, task_id: Id, label_id: Id) -> Result<()>;
}

#[async_trait]
pub trait GlobalContextRepository: Send + Sync {
    /// Global contexts are implicitly created on first reference per user.
    async fn get_or_create(&self, user_id: &str) -> Result<GlobalContext>;
    async fn update(
        &self,
        user_id: &str,
        settings_patch: Map<String, Value>,
        expected_version: Option<i32>,
    ) -> Result<GlobalContext>;
}

#[async_trait]
pub trait ProjectContextRepository: Send + Sync {
    async fn get(&self, owner_user_id: &str, project_id: Id) -> Result<Option<ProjectContext>>;
    async fn create(
        &self,
        owner_user_id: &str,
        project_id: Id,
        data: Map<String, Value>,
        inherits_from_global: bool,
        extras: ContextExtras,
        inheritance_disabled: bool,
    ) -> Result<ProjectContext>;
    async fn update(
        &self,
        owner_user_id: &str,
        project_id: Id,
        data_patch: Option<Map<String, Value>>,
        overrides_patch: Option<Map<String, Value>>,
        expected_version: Option<i32>,
        extras_patch: Option<ContextExtras>,
        inheritance_disabled_patch: Option<bool>,
    ) -> Result<ProjectContext>;
    async fn delete(&self, owner_user_id: &str, project_id: Id) -> Result<u64>;
    async fn list(&self, owner_user_id: &str, limit: u32, offset: u32) -> Result<Vec<ProjectContext>>;
}

#[async_trait]
pub trait BranchContextRepository: Send + Sync {
    async fn get(&self, owner_user_id: &str, branch_id: Id) -> Result<Option<BranchContext>>;
    async fn create(
        &self,
        owner_user_id: &str,
        branch_id: Id,
        parent_project_id: Id,
        data: Map<String, Value>,
        extras: ContextExtras,
        inheritance_disabled: bool,
    ) -> Result<BranchContext>;
    async fn update(
        &self,
        owner_user_id: &str,
        branch_id: Id,
        data_patch: Option<Map<String, Value>>,
        overrides_patch: Option<Map<String, Value>>,
        expected_version: Option<i32>,
        extras_patch: Option<ContextExtras>,
        inheritance_disabled_patch: Option<bool>,
    ) -> Result<BranchContext>;
    async fn delete(&self, owner_user_id: &str, branch_id: Id) -> Result<u64>;
    async fn list(&self, owner_user_id: &str, limit: u32, offset: u32) -> Result<Vec<BranchContext>>;
}

#[async_trait]
pub trait TaskContextRepository: Send + Sync {
    async fn get(&self, owner_user_id: &str, task_id: Id) -> Result<Option<TaskContext>>;
    async fn create(
        &self,
        owner_user_id: &str,
        task_id: Id,
        parent_branch_id: Id,
        task_data: Map<String, Value>,
        extras: ContextExtras,
        inheritance_disabled: bool,
    ) -> Result<TaskContext>;
    async fn update(
        &self,
        owner_user_id: &str,
        task_id: Id,
        task_data_patch: Option<Map<String, Value>>,
        overrides_patch: Option<Map<String, Value>>,
        expected_version: Option<i32>,
        extras_patch: Option<ContextExtras>,
        inheritance_disabled_patch: Option<bool>,
    ) -> Result<TaskContext>;
    async fn delete(&self, owner_user_id: &str, task_id: Id) -> Result<u64>;
    async fn list(&self, owner_user_id: &str, limit: u32, offset: u32) -> Result<Vec<TaskContext>>;
}

#[async_trait]
pub trait DelegationRepository: Send + Sync {
    async fn create(&self, request: DelegationRequest) -> Result<DelegationRequest>;
    async fn get(&self, owner_user_id: &str, id: Id) -> Result<Option<DelegationRequest>>;
    async fn decide(
        &self,
        owner_user_id: &str,
        id: Id,
        status: DelegationStatus,
    ) -> Result<DelegationRequest>;
}
