//! Custom assertion helpers for testing.
//!
//! Specialized assertions for task equality, state-transition validity, and
//! filtering results, with clearer failure messages than a bare `assert_eq!`.

use task_core::models::{Priority, Task, TaskStatus};

/// Asserts two tasks are equal ignoring `updated_at`/`version`, which mutate
/// on every write and aren't meaningful to compare across a repository round
/// trip.
pub fn assert_task_equals(actual: &Task, expected: &Task) {
    assert_eq!(actual.id, expected.id, "task id mismatch");
    assert_eq!(actual.branch_id, expected.branch_id, "branch_id mismatch");
    assert_eq!(actual.owner_user_id, expected.owner_user_id, "owner_user_id mismatch");
    assert_eq!(actual.title, expected.title, "title mismatch");
    assert_eq!(actual.description, expected.description, "description mismatch");
    assert_eq!(actual.status, expected.status, "status mismatch");
    assert_eq!(actual.priority, expected.priority, "priority mismatch");
}

pub fn assert_task_equals_exact(actual: &Task, expected: &Task) {
    assert_eq!(actual, expected, "tasks are not exactly equal");
}

pub fn assert_state_transition_valid(from: TaskStatus, to: TaskStatus) {
    assert!(from.can_transition_to(to), "expected {from} -> {to} to be a valid transition");
}

pub fn assert_state_transition_invalid(from: TaskStatus, to: TaskStatus) {
    assert!(!from.can_transition_to(to), "expected {from} -> {to} to be rejected as an invalid transition");
}

pub fn assert_contains_task_with_title(tasks: &[Task], title: &str) {
    assert!(tasks.iter().any(|t| t.title == title), "no task with title '{title}' found among {} tasks", tasks.len());
}

pub fn assert_tasks_sorted_by_created_at_desc(tasks: &[Task]) {
    for window in tasks.windows(2) {
        assert!(window[0].created_at >= window[1].created_at, "tasks are not sorted by created_at descending");
    }
}

/// Declarative matcher for asserting a task has a set of expected field
/// values without listing every field in the test body.
#[derive(Default)]
pub struct TaskMatcher {
    title: Option<String>,
    status: Option<TaskStatus>,
    priority: Option<Priority>,
    owner_user_id: Option<String>,
}

impl TaskMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn owner(mut self, owner_user_id: impl Into<String>) -> Self {
        self.owner_user_id = Some(owner_user_id.into());
        self
    }

    pub fn matches(&self, task: &Task) -> bool {
        self.title.as_ref().map_or(true, |t| t == &task.title)
            && self.status.map_or(true, |s| s == task.status)
            && self.priority.map_or(true, |p| p == task.priority)
            && self.owner_user_id.as_ref().map_or(true, |o| o == &task.owner_user_id)
    }

    pub fn assert_matches(&self, task: &Task) {
        assert!(self.matches(task), "task {:?} did not match expected criteria", task.id);
    }
}
