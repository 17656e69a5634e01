//! Integration tests for the Command Dispatcher (C6).
//!
//! Drives `Dispatcher` directly (no HTTP layer, that's covered by
//! `mcp-server`'s own integration tests) against in-memory repositories, the
//! way the teacher's own handler integration tests exercised its request/
//! response cycle against mock repositories.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use mcp_protocol::{Dispatcher, FanoutRegistry, ResponseOptimizer, ResponseProfile};
use mocks::{MockBranchRepository, MockLabelRepository, MockProjectRepository, MockSubtaskRepository, MockTaskRepository};
use task_core::cache::CacheLayer;
use task_core::context_service::ContextService;
use task_core::enforcement::{EnforcementLevel, Enforcer};
use task_core::error::Result;
use task_core::models::*;
use task_core::repository::{
    BranchContextRepository, DelegationRepository, GlobalContextRepository, ProjectContextRepository,
    TaskContextRepository, TaskDependencyRepository,
};
use task_core::task_service::TaskService;

/// Always-empty stub: nothing in this test suite exercises dependency edges.
struct NoDependencies;

#[async_trait]
impl TaskDependencyRepository for NoDependencies {
    async fn add(&self, _owner_user_id: &str, _task_id: Id, _depends_on_task_id: Id) -> Result<()> {
        Ok(())
    }
    async fn remove(&self, _owner_user_id: &str, _task_id: Id, _depends_on_task_id: Id) -> Result<()> {
        Ok(())
    }
    async fn depends_on(&self, _owner_user_id: &str, _task_id: Id) -> Result<Vec<Id>> {
        Ok(Vec::new())
    }
    async fn all_edges(&self, _owner_user_id: &str) -> Result<Vec<(Id, Id)>> {
        Ok(Vec::new())
    }
}

/// Minimal in-memory context repositories, just enough to construct a
/// `ContextService` for the dispatcher — context-tier behavior itself has
/// its own coverage in `task-core`.
struct EmptyContexts;

#[async_trait]
impl GlobalContextRepository for EmptyContexts {
    async fn get_or_create(&self, user_id: &str) -> Result<GlobalContext> {
        let now = chrono::Utc::now();
        Ok(GlobalContext { user_id: user_id.to_string(), organization_name: None, settings: Default::default(), version: 1, created_at: now, updated_at: now })
    }
    async fn update(&self, user_id: &str, _patch: serde_json::Map<String, serde_json::Value>, _expected_version: Option<i32>) -> Result<GlobalContext> {
        self.get_or_create(user_id).await
    }
}

#[async_trait]
impl ProjectContextRepository for EmptyContexts {
    async fn get(&self, _owner_user_id: &str, _project_id: Id) -> Result<Option<ProjectContext>> {
        Ok(None)
    }
    async fn create(&self, owner_user_id: &str, project_id: Id, data: serde_json::Map<String, serde_json::Value>, inherits_from_global: bool, extras: ContextExtras, inheritance_disabled: bool) -> Result<ProjectContext> {
        let now = chrono::Utc::now();
        Ok(ProjectContext {
            project_id,
            owner_user_id: owner_user_id.to_string(),
            data,
            inherits_from_global,
            overrides: Default::default(),
            inheritance_disabled,
            extras,
            version: 1,
            created_at: now,
            updated_at: now,
        })
    }
    async fn update(&self, owner_user_id: &str, project_id: Id, data_patch: Option<serde_json::Map<String, serde_json::Value>>, _overrides_patch: Option<serde_json::Map<String, serde_json::Value>>, _expected_version: Option<i32>, extras_patch: Option<ContextExtras>, inheritance_disabled_patch: Option<bool>) -> Result<ProjectContext> {
        self.create(owner_user_id, project_id, data_patch.unwrap_or_default(), true, extras_patch.unwrap_or_default(), inheritance_disabled_patch.unwrap_or(false)).await
    }
    async fn delete(&self, _owner_user_id: &str, _project_id: Id) -> Result<u64> {
        Ok(0)
    }
    async fn list(&self, _owner_user_id: &str, _limit: u32, _offset: u32) -> Result<Vec<ProjectContext>> {
        Ok(Vec::new())
    }
}

#[async_trait]
impl BranchContextRepository for EmptyContexts {
    async fn get(&self, _owner_user_id: &str, _branch_id: Id) -> Result<Option<BranchContext>> {
        Ok(None)
    }
    async fn create(&self, owner_user_id: &str, branch_id: Id, parent_project_id: Id, data: serde_json::Map<String, serde_json::Value>, extras: ContextExtras, inheritance_disabled: bool) -> Result<BranchContext> {
        let now = chrono::Utc::now();
        Ok(BranchContext { branch_id, owner_user_id: owner_user_id.to_string(), parent_project_id, data, overrides: Default::default(), inheritance_disabled, extras, version: 1, created_at: now, updated_at: now })
    }
    async fn update(&self, owner_user_id: &str, branch_id: Id, data_patch: Option<serde_json::Map<String, serde_json::Value>>, _overrides_patch: Option<serde_json::Map<String, serde_json::Value>>, _expected_version: Option<i32>, extras_patch: Option<ContextExtras>, inheritance_disabled_patch: Option<bool>) -> Result<BranchContext> {
        self.create(owner_user_id, branch_id, Id::new_v4(), data_patch.unwrap_or_default(), extras_patch.unwrap_or_default(), inheritance_disabled_patch.unwrap_or(false)).await
    }
    async fn delete(&self, _owner_user_id: &str, _branch_id: Id) -> Result<u64> {
        Ok(0)
    }
    async fn list(&self, _owner_user_id: &str, _limit: u32, _offset: u32) -> Result<Vec<BranchContext>> {
        Ok(Vec::new())
    }
}

#[async_trait]
impl TaskContextRepository for EmptyContexts {
    async fn get(&self, _owner_user_id: &str, _task_id: Id) -> Result<Option<TaskContext>> {
        Ok(None)
    }
    async fn create(&self, owner_user_id: &str, task_id: Id, parent_branch_id: Id, task_data: serde_json::Map<String, serde_json::Value>, extras: ContextExtras, inheritance_disabled: bool) -> Result<TaskContext> {
        let now = chrono::Utc::now();
        Ok(TaskContext { task_id, owner_user_id: owner_user_id.to_string(), parent_branch_id, task_data, overrides: Default::default(), inheritance_disabled, extras, version: 1, created_at: now, updated_at: now })
    }
    async fn update(&self, owner_user_id: &str, task_id: Id, task_data_patch: Option<serde_json::Map<String, serde_json::Value>>, _overrides_patch: Option<serde_json::Map<String, serde_json::Value>>, _expected_version: Option<i32>, extras_patch: Option<ContextExtras>, inheritance_disabled_patch: Option<bool>) -> Result<TaskContext> {
        self.create(owner_user_id, task_id, Id::new_v4(), task_data_patch.unwrap_or_default(), extras_patch.unwrap_or_default(), inheritance_disabled_patch.unwrap_or(false)).await
    }
    async fn delete(&self, _owner_user_id: &str, _task_id: Id) -> Result<u64> {
        Ok(0)
    }
    async fn list(&self, _owner_user_id: &str, _limit: u32, _offset: u32) -> Result<Vec<TaskContext>> {
        Ok(Vec::new())
    }
}

#[async_trait]
impl DelegationRepository for EmptyContexts {
    async fn create(&self, request: DelegationRequest) -> Result<DelegationRequest> {
        Ok(request)
    }
    async fn get(&self, _owner_user_id: &str, _id: Id) -> Result<Option<DelegationRequest>> {
        Ok(None)
    }
    async fn decide(&self, _owner_user_id: &str, _id: Id, _status: DelegationStatus) -> Result<DelegationRequest> {
        Err(task_core::error::OrchestratorError::not_found("DelegationRequest", "unused in this suite"))
    }
}

struct Harness {
    dispatcher: Dispatcher,
}

impl Harness {
    fn new() -> Self {
        let projects = Arc::new(MockProjectRepository::new());
        let branches = Arc::new(MockBranchRepository::new());
        let subtasks = Arc::new(MockSubtaskRepository::new());
        let tasks_repo = Arc::new(MockTaskRepository::new());
        let deps = Arc::new(NoDependencies);
        let contexts_repo = Arc::new(EmptyContexts);

        let cache = Arc::new(CacheLayer::new(60));
        let context_service = Arc::new(ContextService::new(
            contexts_repo.clone(),
            contexts_repo.clone(),
            contexts_repo.clone(),
            contexts_repo.clone(),
            contexts_repo,
            branches.clone(),
            tasks_repo.clone(),
            cache,
        ));
        let task_service = Arc::new(TaskService::new(tasks_repo, subtasks.clone(), deps, context_service.clone(), None));
        let enforcer = Arc::new(Enforcer::new(EnforcementLevel::Disabled));
        let optimizer = Arc::new(ResponseOptimizer::new(true));
        let fanout = Arc::new(FanoutRegistry::new());
        let labels = Arc::new(MockLabelRepository::new());

        let dispatcher = Dispatcher::new(projects, branches, subtasks, task_service, context_service, enforcer, optimizer, fanout, labels);
        Self { dispatcher }
    }
}

const OWNER: &str = "dispatcher-test-user";

#[tokio::test]
async fn project_branch_task_lifecycle_through_dispatcher() {
    let harness = Harness::new();

    let project = harness.dispatcher.manage_project(OWNER, "create", json!({ "name": "Orchestrator" }), ResponseProfile::Standard).await;
    assert_eq!(project["success"], json!(true));
    let project_id = project["data"]["id"].as_str().unwrap().to_string();

    let branch = harness
        .dispatcher
        .manage_branch(OWNER, "create", json!({ "project_id": project_id, "name": "main" }), ResponseProfile::Standard)
        .await;
    assert_eq!(branch["success"], json!(true));
    let branch_id = branch["data"]["id"].as_str().unwrap().to_string();

    let task = harness
        .dispatcher
        .manage_task(OWNER, None, "create", json!({ "branch_id": branch_id, "title": "Ship it", "priority": "high" }), ResponseProfile::Standard)
        .await;
    assert_eq!(task["success"], json!(true));
    assert_eq!(task["data"]["status"], json!("todo"));
}

#[tokio::test]
async fn unknown_action_reports_validation_error() {
    let harness = Harness::new();
    let response = harness.dispatcher.manage_project(OWNER, "teleport", json!({}), ResponseProfile::Standard).await;
    assert_eq!(response["success"], json!(false));
    assert_eq!(response["error"]["code"], json!("VALIDATION_ERROR"));
}

#[tokio::test]
async fn missing_required_field_reports_validation_error() {
    let harness = Harness::new();
    let response = harness.dispatcher.manage_project(OWNER, "create", json!({}), ResponseProfile::Standard).await;
    assert_eq!(response["success"], json!(false));
    assert_eq!(response["error"]["code"], json!("VALIDATION_ERROR"));
}

#[tokio::test]
async fn cross_user_isolation_on_project_get() {
    let harness = Harness::new();
    let project = harness.dispatcher.manage_project(OWNER, "create", json!({ "name": "Private" }), ResponseProfile::Standard).await;
    let project_id = project["data"]["id"].as_str().unwrap().to_string();

    let response = harness.dispatcher.manage_project("intruder", "get", json!({ "id": project_id }), ResponseProfile::Standard).await;
    assert_eq!(response["success"], json!(false));
    assert_eq!(response["error"]["code"], json!("NOT_FOUND"));
}
