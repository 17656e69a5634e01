//! Contract test helpers for validating trait implementations.
//!
//! Standardized async tests that any [`TaskRepository`] implementation
//! should pass, so the same suite runs against both [`crate::MockTaskRepository`]
//! and the real `sqlx`-backed one in the `database` crate.

use task_core::models::{Id, Priority, TaskFilter, TaskStatus};
use task_core::repository::TaskRepository;

use crate::builders::{NewTaskBuilder, UpdateTaskBuilder};

const OWNER: &str = "contract-test-user";

pub async fn test_create_contract<R: TaskRepository>(repo: &R, branch_id: Id) {
    let new_task = NewTaskBuilder::new().branch_id(branch_id).title("Contract Task").build();
    let created = repo.create(OWNER, new_task).await.expect("create should succeed");
    assert_eq!(created.title, "Contract Task");
    assert_eq!(created.status, TaskStatus::Todo);
    assert_eq!(created.owner_user_id, OWNER);
}

pub async fn test_get_contract<R: TaskRepository>(repo: &R, branch_id: Id) {
    let new_task = NewTaskBuilder::new().branch_id(branch_id).title("Gettable Task").build();
    let created = repo.create(OWNER, new_task).await.unwrap();

    let fetched = repo.get_by_id(OWNER, created.id).await.unwrap();
    assert_eq!(fetched.map(|t| t.id), Some(created.id));

    let missing = repo.get_by_id(OWNER, Id::new_v4()).await.unwrap();
    assert!(missing.is_none());

    let wrong_owner = repo.get_by_id("someone-else", created.id).await.unwrap();
    assert!(wrong_owner.is_none(), "a repository must not leak rows across owners");
}

pub async fn test_update_contract<R: TaskRepository>(repo: &R, branch_id: Id) {
    let new_task = NewTaskBuilder::new().branch_id(branch_id).title("Before Update").build();
    let created = repo.create(OWNER, new_task).await.unwrap();

    let patch = UpdateTaskBuilder::new().title("After Update").priority(Priority::High).build();
    let updated = repo.update(OWNER, created.id, patch, None).await.unwrap();
    assert_eq!(updated.title, "After Update");
    assert_eq!(updated.priority, Priority::High);
    assert!(updated.version > created.version, "update must bump the version counter");
}

pub async fn test_optimistic_concurrency_contract<R: TaskRepository>(repo: &R, branch_id: Id) {
    let new_task = NewTaskBuilder::new().branch_id(branch_id).title("CAS Task").build();
    let created = repo.create(OWNER, new_task).await.unwrap();

    let stale_patch = UpdateTaskBuilder::new().title("Stale Write").build();
    let result = repo.update(OWNER, created.id, stale_patch, Some(created.version + 1)).await;
    assert!(result.is_err(), "update with a wrong expected_version must be rejected");
}

pub async fn test_status_transition_contract<R: TaskRepository>(repo: &R, branch_id: Id) {
    let new_task = NewTaskBuilder::new().branch_id(branch_id).title("Transition Task").build();
    let created = repo.create(OWNER, new_task).await.unwrap();

    let in_progress = repo.set_status(OWNER, created.id, TaskStatus::InProgress).await.unwrap();
    assert_eq!(in_progress.status, TaskStatus::InProgress);

    let rejected = repo.set_status(OWNER, created.id, TaskStatus::Done).await;
    assert!(rejected.is_err(), "Todo's successor InProgress cannot jump straight to Done");

    let done = repo.set_status(OWNER, created.id, TaskStatus::Testing).await;
    assert!(done.is_ok());
}

pub async fn test_list_contract<R: TaskRepository>(repo: &R, branch_id: Id) {
    for i in 0..3 {
        let new_task = NewTaskBuilder::new().branch_id(branch_id).title(format!("Listed Task {i}")).build();
        repo.create(OWNER, new_task).await.unwrap();
    }

    let filter = TaskFilter { branch_id: Some(branch_id), ..Default::default() };
    let tasks = repo.list(OWNER, filter).await.unwrap();
    assert!(tasks.len() >= 3);
    assert!(tasks.iter().all(|t| t.owner_user_id == OWNER));
}

pub async fn test_delete_contract<R: TaskRepository>(repo: &R, branch_id: Id) {
    let new_task = NewTaskBuilder::new().branch_id(branch_id).title("Deletable Task").build();
    let created = repo.create(OWNER, new_task).await.unwrap();

    let affected = repo.delete(OWNER, created.id).await.unwrap();
    assert_eq!(affected, 1);

    let again = repo.delete(OWNER, created.id).await.unwrap();
    assert_eq!(again, 0, "deleting an already-deleted row is idempotent");

    assert!(repo.get_by_id(OWNER, created.id).await.unwrap().is_none());
}

/// Runs every contract test in this module against `repo`. Intended for a
/// single `#[tokio::test]` per `TaskRepository` implementation.
pub async fn test_repository_contract<R: TaskRepository>(repo: &R, branch_id: Id) {
    test_create_contract(repo, branch_id).await;
    test_get_contract(repo, branch_id).await;
    test_update_contract(repo, branch_id).await;
    test_optimistic_concurrency_contract(repo, branch_id).await;
    test_status_transition_contract(repo, branch_id).await;
    test_list_contract(repo, branch_id).await;
    test_delete_contract(repo, branch_id).await;
}
