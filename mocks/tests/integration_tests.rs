//! Integration tests for the mocks crate.
//!
//! Exercises the mock repositories and test utilities against the real
//! trait signatures to make sure they behave like a production repository
//! would, not just like themselves.

use mocks::contracts::test_repository_contract;
use mocks::*;
use task_core::error::OrchestratorError;
use task_core::models::*;
use task_core::repository::{BranchRepository, ProjectRepository, TaskRepository};

const OWNER: &str = "mocks-test-user";

#[tokio::test]
async fn test_mock_project_repository_basic_operations() {
    let repo = MockProjectRepository::new();

    let new_project = NewProject { name: "Orchestrator".to_string(), description: String::new() };
    let project = repo.create(OWNER, new_project).await.unwrap();
    assert_eq!(project.name, "Orchestrator");
    assert_eq!(project.owner_user_id, OWNER);

    repo.assert_called("create");

    let fetched = repo.get_by_id(OWNER, project.id).await.unwrap().unwrap();
    assert_eq!(fetched.id, project.id);

    repo.assert_called("get_by_id");
}

#[tokio::test]
async fn test_mock_project_repository_rejects_duplicate_names() {
    let repo = MockProjectRepository::new();
    let new_project = NewProject { name: "Unique".to_string(), description: String::new() };
    repo.create(OWNER, new_project.clone()).await.unwrap();

    let result = repo.create(OWNER, new_project).await;
    assert!(matches!(result, Err(OrchestratorError::Duplicate(_))));
}

#[tokio::test]
async fn test_mock_repository_error_injection() {
    let repo = MockTaskRepository::new();
    repo.inject_error(OrchestratorError::not_found("Task", "injected"));

    let result = repo.get_by_id(OWNER, Id::new_v4()).await;
    assert!(result.is_err());
    assert!(matches!(result.unwrap_err(), OrchestratorError::NotFound(_)));

    // The injected error only applies to the next call.
    let result = repo.get_by_id(OWNER, Id::new_v4()).await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_mock_task_repository_status_transitions() {
    let branch_id = Id::new_v4();
    let repo = MockTaskRepository::new();
    let task = repo.create(OWNER, builders::NewTaskBuilder::new().branch_id(branch_id).title("Transition").build()).await.unwrap();

    let updated = repo.set_status(OWNER, task.id, TaskStatus::InProgress).await.unwrap();
    assert_eq!(updated.status, TaskStatus::InProgress);

    let result = repo.set_status(OWNER, task.id, TaskStatus::Archived).await;
    assert!(matches!(result, Err(OrchestratorError::InvalidTransition { .. })));
}

#[tokio::test]
async fn test_fixtures_create_tasks_in_all_statuses() {
    let branch_id = Id::new_v4();
    let tasks = fixtures::create_tasks_in_all_statuses(branch_id);
    assert_eq!(tasks.len(), 8);

    let statuses: Vec<_> = tasks.iter().map(|t| t.status).collect();
    assert!(statuses.contains(&TaskStatus::Todo));
    assert!(statuses.contains(&TaskStatus::Done));
    assert!(statuses.contains(&TaskStatus::Archived));
}

#[tokio::test]
async fn test_builders_task_builder() {
    let branch_id = Id::new_v4();
    let task = builders::TaskBuilder::new()
        .branch_id(branch_id)
        .title("Built Task")
        .status(TaskStatus::InProgress)
        .owner("builder-agent")
        .build();

    assert_eq!(task.branch_id, branch_id);
    assert_eq!(task.title, "Built Task");
    assert_eq!(task.status, TaskStatus::InProgress);
    assert_eq!(task.owner_user_id, "builder-agent");
}

#[tokio::test]
async fn test_assertions_task_equals() {
    let branch_id = Id::new_v4();
    let task1 = fixtures::create_test_task(branch_id);
    let mut task2 = task1.clone();
    assert_task_equals(&task1, &task2);

    task2.title = "Different Title".to_string();
    let result = std::panic::catch_unwind(|| {
        assert_task_equals(&task1, &task2);
    });
    assert!(result.is_err());
}

#[tokio::test]
async fn test_assertions_state_transitions() {
    assert_state_transition_valid(TaskStatus::Todo, TaskStatus::InProgress);
    assert_state_transition_valid(TaskStatus::InProgress, TaskStatus::Done);

    assert_state_transition_invalid(TaskStatus::Todo, TaskStatus::Done);
    assert_state_transition_invalid(TaskStatus::Archived, TaskStatus::InProgress);
}

#[tokio::test]
async fn test_generators_realistic_data() {
    let branch_id = Id::new_v4();
    let task = generators::generate_random_task(branch_id);

    assert_eq!(task.branch_id, branch_id);
    assert!(!task.title.is_empty());
    assert!(!task.description.is_empty());
}

#[tokio::test]
async fn test_mock_repository_concurrent_access() {
    use std::sync::Arc;
    use tokio::task::JoinSet;

    let branch_id = Id::new_v4();
    let repo = Arc::new(MockTaskRepository::new());
    let mut set = JoinSet::new();

    for i in 0..10 {
        let repo_clone = repo.clone();
        set.spawn(async move {
            let new_task = builders::NewTaskBuilder::new().branch_id(branch_id).title(format!("Concurrent Task {i}")).build();
            repo_clone.create(OWNER, new_task).await.unwrap()
        });
    }

    let mut tasks = Vec::new();
    while let Some(result) = set.join_next().await {
        tasks.push(result.unwrap());
    }

    assert_eq!(tasks.len(), 10);

    let mut ids: Vec<_> = tasks.iter().map(|t| t.id).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 10);
}

#[tokio::test]
async fn test_branch_repository_scopes_list_by_project() {
    let repo = MockBranchRepository::new();
    let project_a = Id::new_v4();
    let project_b = Id::new_v4();

    repo.create(OWNER, NewBranch { project_id: project_a, name: "a-main".to_string(), description: String::new(), assigned_agent_id: None }).await.unwrap();
    repo.create(OWNER, NewBranch { project_id: project_b, name: "b-main".to_string(), description: String::new(), assigned_agent_id: None }).await.unwrap();

    let branches = repo.list(OWNER, Some(project_a), 10, 0).await.unwrap();
    assert_eq!(branches.len(), 1);
    assert_eq!(branches[0].project_id, project_a);
}

#[tokio::test]
async fn test_contract_suite_passes_against_mock() {
    let branch_id = Id::new_v4();
    let repo = MockTaskRepository::new();

    test_repository_contract(&repo, branch_id).await;

    let history = repo.call_history();
    assert!(!history.is_empty(), "mock should have recorded method calls");
    assert!(history.iter().any(|call| call.contains("create")));
    assert!(history.iter().any(|call| call.contains("get_by_id")));
}
