//! Standard test fixtures for consistent testing.
//!
//! Pre-built data for the common aggregate chain (project -> branch -> task
//! -> subtask) plus edge-case task states.

use task_core::models::*;

use crate::builders::{BranchBuilder, NewTaskBuilder, ProjectBuilder, SubtaskBuilder, TaskBuilder, UpdateTaskBuilder};

pub fn create_test_project() -> Project {
    ProjectBuilder::new().name("Test Project").build()
}

pub fn create_test_project_with_owner(owner_user_id: &str) -> Project {
    ProjectBuilder::new().owner(owner_user_id).name("Test Project").build()
}

pub fn create_test_branch(project_id: Id) -> Branch {
    BranchBuilder::new().project_id(project_id).name("main").build()
}

pub fn create_test_task(branch_id: Id) -> Task {
    TaskBuilder::new().branch_id(branch_id).title("Test Task").build()
}

pub fn create_test_task_with_status(branch_id: Id, status: TaskStatus) -> Task {
    TaskBuilder::new().branch_id(branch_id).title("Test Task").status(status).build()
}

pub fn create_test_task_with_owner(branch_id: Id, owner_user_id: &str) -> Task {
    TaskBuilder::new().branch_id(branch_id).owner(owner_user_id).title("Test Task").build()
}

pub fn create_test_tasks(branch_id: Id, count: usize) -> Vec<Task> {
    (0..count).map(|i| TaskBuilder::new().branch_id(branch_id).title(format!("Test Task {i}")).build()).collect()
}

/// One task per reachable [`TaskStatus`] variant, all on the same branch.
pub fn create_tasks_in_all_statuses(branch_id: Id) -> Vec<Task> {
    [
        TaskStatus::Todo,
        TaskStatus::InProgress,
        TaskStatus::Blocked,
        TaskStatus::Review,
        TaskStatus::Testing,
        TaskStatus::Done,
        TaskStatus::Cancelled,
        TaskStatus::Archived,
    ]
    .into_iter()
    .map(|status| create_test_task_with_status(branch_id, status))
    .collect()
}

pub fn create_new_task(branch_id: Id) -> NewTask {
    NewTaskBuilder::new().branch_id(branch_id).title("New Task").build()
}

pub fn create_new_task_with_title(branch_id: Id, title: &str) -> NewTask {
    NewTaskBuilder::new().branch_id(branch_id).title(title).build()
}

pub fn create_update_task() -> UpdateTask {
    UpdateTaskBuilder::new().title("Updated Task").build()
}

pub fn create_update_task_with_priority(priority: Priority) -> UpdateTask {
    UpdateTaskBuilder::new().title("Updated Task").priority(priority).build()
}

pub fn create_test_subtask(task_id: Id) -> Subtask {
    SubtaskBuilder::new().task_id(task_id).title("Test Subtask").build()
}

pub fn create_test_subtasks(task_id: Id, count: usize) -> Vec<Subtask> {
    (0..count).map(|i| SubtaskBuilder::new().task_id(task_id).title(format!("Test Subtask {i}")).build()).collect()
}
