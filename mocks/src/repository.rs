//! In-memory mock implementations of the per-aggregate repository traits
//! (C2, §4.2).
//!
//! Each mock is thread-safe, supports error injection for failure-path
//! testing, and records a call history for verification.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use task_core::error::{OrchestratorError, Result};
use task_core::models::*;
use task_core::repository::{BranchRepository, LabelRepository, ProjectRepository, SubtaskRepository, TaskRepository, TaskSummary};

fn new_id() -> Id {
    Id::new_v4()
}

/// Shared scaffolding every mock repository below is built from: a map keyed
/// by id, an injectable error for the next call, and a call-history log.
struct MockState<T> {
    rows: Mutex<HashMap<Id, T>>,
    error_injection: Mutex<Option<OrchestratorError>>,
    call_history: Mutex<Vec<String>>,
}

impl<T: Clone> MockState<T> {
    fn new() -> Self {
        Self { rows: Mutex::new(HashMap::new()), error_injection: Mutex::new(None), call_history: Mutex::new(Vec::new()) }
    }

    fn record(&self, call: impl Into<String>) {
        self.call_history.lock().push(call.into());
    }

    fn take_injected_error(&self) -> Result<()> {
        if let Some(err) = self.error_injection.lock().take() {
            return Err(err);
        }
        Ok(())
    }
}

/// Mock implementation of [`ProjectRepository`].
pub struct MockProjectRepository {
    state: MockState<Project>,
}

impl Default for MockProjectRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProjectRepository {
    pub fn new() -> Self {
        Self { state: MockState::new() }
    }

    pub fn inject_error(&self, error: OrchestratorError) {
        *self.state.error_injection.lock() = Some(error);
    }

    pub fn call_history(&self) -> Vec<String> {
        self.state.call_history.lock().clone()
    }

    pub fn assert_called(&self, method: &str) {
        let history = self.state.call_history.lock();
        assert!(history.iter().any(|c| c.contains(method)), "'{method}' was not called. History: {history:?}");
    }
}

#[async_trait]
impl ProjectRepository for MockProjectRepository {
    async fn create(&self, owner_user_id: &str, project: NewProject) -> Result<Project> {
        self.state.record(format!("create(name={})", project.name));
        self.state.take_injected_error()?;

        let rows = self.state.rows.lock();
        if rows.values().any(|p| p.owner_user_id == owner_user_id && p.name == project.name) {
            return Err(OrchestratorError::Duplicate(format!("project '{}'", project.name)));
        }
        drop(rows);

        let now = Utc::now();
        let created = Project {
            id: new_id(),
            owner_user_id: owner_user_id.to_string(),
            name: project.name,
            description: project.description,
            created_at: now,
            updated_at: now,
        };
        self.state.rows.lock().insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_by_id(&self, owner_user_id: &str, id: Id) -> Result<Option<Project>> {
        self.state.record(format!("get_by_id({id})"));
        self.state.take_injected_error()?;
        Ok(self.state.rows.lock().get(&id).filter(|p| p.owner_user_id == owner_user_id).cloned())
    }

    async fn update(&self, owner_user_id: &str, id: Id, updates: UpdateProject) -> Result<Project> {
        self.state.record(format!("update({id})"));
        self.state.take_injected_error()?;

        let mut rows = self.state.rows.lock();
        let project = rows
            .get_mut(&id)
            .filter(|p| p.owner_user_id == owner_user_id)
            .ok_or_else(|| OrchestratorError::not_found("Project", id))?;
        if let Some(name) = updates.name {
            project.name = name;
        }
        if let Some(description) = updates.description {
            project.description = description;
        }
        project.updated_at = Utc::now();
        Ok(project.clone())
    }

    async fn delete(&self, owner_user_id: &str, id: Id) -> Result<u64> {
        self.state.record(format!("delete({id})"));
        self.state.take_injected_error()?;

        let mut rows = self.state.rows.lock();
        if rows.get(&id).is_some_and(|p| p.owner_user_id == owner_user_id) {
            rows.remove(&id);
            Ok(1)
        } else {
            Ok(0)
        }
    }

    async fn list(&self, owner_user_id: &str, limit: u32, offset: u32) -> Result<Vec<Project>> {
        self.state.record("list");
        self.state.take_injected_error()?;

        let rows = self.state.rows.lock();
        let mut owned: Vec<Project> = rows.values().filter(|p| p.owner_user_id == owner_user_id).cloned().collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(owned.into_iter().skip(offset as usize).take(limit as usize).collect())
    }
}

/// Mock implementation of [`BranchRepository`].
pub struct MockBranchRepository {
    state: MockState<Branch>,
}

impl Default for MockBranchRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBranchRepository {
    pub fn new() -> Self {
        Self { state: MockState::new() }
    }

    pub fn inject_error(&self, error: OrchestratorError) {
        *self.state.error_injection.lock() = Some(error);
    }

    pub fn call_history(&self) -> Vec<String> {
        self.state.call_history.lock().clone()
    }
}

#[async_trait]
impl BranchRepository for MockBranchRepository {
    async fn create(&self, owner_user_id: &str, branch: NewBranch) -> Result<Branch> {
        self.state.record(format!("create(name={})", branch.name));
        self.state.take_injected_error()?;

        let now = Utc::now();
        let created = Branch {
            id: new_id(),
            project_id: branch.project_id,
            owner_user_id: owner_user_id.to_string(),
            name: branch.name,
            description: branch.description,
            assigned_agent_id: branch.assigned_agent_id,
            created_at: now,
            updated_at: now,
        };
        self.state.rows.lock().insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_by_id(&self, owner_user_id: &str, id: Id) -> Result<Option<Branch>> {
        self.state.record(format!("get_by_id({id})"));
        self.state.take_injected_error()?;
        Ok(self.state.rows.lock().get(&id).filter(|b| b.owner_user_id == owner_user_id).cloned())
    }

    async fn update(&self, owner_user_id: &str, id: Id, updates: UpdateBranch) -> Result<Branch> {
        self.state.record(format!("update({id})"));
        self.state.take_injected_error()?;

        let mut rows = self.state.rows.lock();
        let branch = rows
            .get_mut(&id)
            .filter(|b| b.owner_user_id == owner_user_id)
            .ok_or_else(|| OrchestratorError::not_found("Branch", id))?;
        if let Some(name) = updates.name {
            branch.name = name;
        }
        if let Some(description) = updates.description {
            branch.description = description;
        }
        if let Some(assigned_agent_id) = updates.assigned_agent_id {
            branch.assigned_agent_id = assigned_agent_id;
        }
        branch.updated_at = Utc::now();
        Ok(branch.clone())
    }

    async fn delete(&self, owner_user_id: &str, id: Id) -> Result<u64> {
        self.state.record(format!("delete({id})"));
        self.state.take_injected_error()?;

        let mut rows = self.state.rows.lock();
        if rows.get(&id).is_some_and(|b| b.owner_user_id == owner_user_id) {
            rows.remove(&id);
            Ok(1)
        } else {
            Ok(0)
        }
    }

    async fn list(&self, owner_user_id: &str, project_id: Option<Id>, limit: u32, offset: u32) -> Result<Vec<Branch>> {
        self.state.record("list");
        self.state.take_injected_error()?;

        let rows = self.state.rows.lock();
        let mut owned: Vec<Branch> = rows
            .values()
            .filter(|b| b.owner_user_id == owner_user_id && project_id.map_or(true, |pid| b.project_id == pid))
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(owned.into_iter().skip(offset as usize).take(limit as usize).collect())
    }
}

/// Mock implementation of [`TaskRepository`].
pub struct MockTaskRepository {
    state: MockState<Task>,
}

impl Default for MockTaskRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTaskRepository {
    pub fn new() -> Self {
        Self { state: MockState::new() }
    }

    /// Pre-populate the mock with tasks (e.g. from [`crate::fixtures`]).
    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        let repo = Self::new();
        let mut rows = repo.state.rows.lock();
        for task in tasks {
            rows.insert(task.id, task);
        }
        drop(rows);
        repo
    }

    pub fn inject_error(&self, error: OrchestratorError) {
        *self.state.error_injection.lock() = Some(error);
    }

    pub fn call_history(&self) -> Vec<String> {
        self.state.call_history.lock().clone()
    }

    pub fn assert_called(&self, method: &str) {
        let history = self.state.call_history.lock();
        assert!(history.iter().any(|c| c.contains(method)), "'{method}' was not called. History: {history:?}");
    }
}

#[async_trait]
impl TaskRepository for MockTaskRepository {
    async fn create(&self, owner_user_id: &str, task: NewTask) -> Result<Task> {
        self.state.record(format!("create(title={})", task.title));
        self.state.take_injected_error()?;

        let now = Utc::now();
        let created = Task {
            id: new_id(),
            branch_id: task.branch_id,
            owner_user_id: owner_user_id.to_string(),
            title: task.title,
            description: task.description,
            status: TaskStatus::Todo,
            priority: task.priority,
            assignee_ids: task.assignee_ids,
            label_ids: task.label_ids,
            due_date: task.due_date,
            estimated_effort: task.estimated_effort,
            context_id: None,
            progress_history: Default::default(),
            progress_count: 0,
            progress: 0,
            created_at: now,
            updated_at: now,
            version: 1,
        };
        self.state.rows.lock().insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_by_id(&self, owner_user_id: &str, id: Id) -> Result<Option<Task>> {
        self.state.record(format!("get_by_id({id})"));
        self.state.take_injected_error()?;
        Ok(self.state.rows.lock().get(&id).filter(|t| t.owner_user_id == owner_user_id).cloned())
    }

    async fn update(&self, owner_user_id: &str, id: Id, updates: UpdateTask, expected_version: Option<i32>) -> Result<Task> {
        self.state.record(format!("update({id})"));
        self.state.take_injected_error()?;

        let mut rows = self.state.rows.lock();
        let task = rows.get_mut(&id).filter(|t| t.owner_user_id == owner_user_id).ok_or_else(|| OrchestratorError::not_found("Task", id))?;

        if let Some(expected) = expected_version {
            if task.version != expected {
                return Err(OrchestratorError::Conflict { current_version: task.version });
            }
        }

        if let Some(title) = updates.title {
            task.title = title;
        }
        if let Some(description) = updates.description {
            task.description = description;
        }
        if let Some(priority) = updates.priority {
            task.priority = priority;
        }
        if let Some(assignee_ids) = updates.assignee_ids {
            task.assignee_ids = assignee_ids;
        }
        if let Some(label_ids) = updates.label_ids {
            task.label_ids = label_ids;
        }
        if let Some(due_date) = updates.due_date {
            task.due_date = due_date;
        }
        if let Some(estimated_effort) = updates.estimated_effort {
            task.estimated_effort = estimated_effort;
        }
        task.version += 1;
        task.updated_at = Utc::now();
        Ok(task.clone())
    }

    async fn set_status(&self, owner_user_id: &str, id: Id, status: TaskStatus) -> Result<Task> {
        self.state.record(format!("set_status({id}, {status})"));
        self.state.take_injected_error()?;

        let mut rows = self.state.rows.lock();
        let task = rows.get_mut(&id).filter(|t| t.owner_user_id == owner_user_id).ok_or_else(|| OrchestratorError::not_found("Task", id))?;
        if !task.status.can_transition_to(status) {
            return Err(OrchestratorError::InvalidTransition { from: task.status, to: status });
        }
        task.status = status;
        task.version += 1;
        task.updated_at = Utc::now();
        Ok(task.clone())
    }

    async fn set_progress(&self, owner_user_id: &str, id: Id, progress: u32) -> Result<Task> {
        self.state.record(format!("set_progress({id}, {progress})"));
        self.state.take_injected_error()?;

        let mut rows = self.state.rows.lock();
        let task = rows.get_mut(&id).filter(|t| t.owner_user_id == owner_user_id).ok_or_else(|| OrchestratorError::not_found("Task", id))?;
        task.progress = progress;
        task.updated_at = Utc::now();
        Ok(task.clone())
    }

    async fn append_progress_entry(&self, owner_user_id: &str, id: Id, entry: ProgressEntry) -> Result<Task> {
        self.state.record(format!("append_progress_entry({id})"));
        self.state.take_injected_error()?;

        let mut rows = self.state.rows.lock();
        let task = rows.get_mut(&id).filter(|t| t.owner_user_id == owner_user_id).ok_or_else(|| OrchestratorError::not_found("Task", id))?;
        task.progress_count += 1;
        task.progress_history.insert(task.progress_count, entry);
        task.updated_at = Utc::now();
        Ok(task.clone())
    }

    async fn set_context_id(&self, owner_user_id: &str, id: Id, context_id: Id) -> Result<Task> {
        self.state.record(format!("set_context_id({id})"));
        self.state.take_injected_error()?;

        let mut rows = self.state.rows.lock();
        let task = rows.get_mut(&id).filter(|t| t.owner_user_id == owner_user_id).ok_or_else(|| OrchestratorError::not_found("Task", id))?;
        task.context_id = Some(context_id);
        Ok(task.clone())
    }

    async fn delete(&self, owner_user_id: &str, id: Id) -> Result<u64> {
        self.state.record(format!("delete({id})"));
        self.state.take_injected_error()?;

        let mut rows = self.state.rows.lock();
        if rows.get(&id).is_some_and(|t| t.owner_user_id == owner_user_id) {
            rows.remove(&id);
            Ok(1)
        } else {
            Ok(0)
        }
    }

    async fn bulk_delete(&self, owner_user_id: &str, ids: &[Id]) -> Result<u64> {
        self.state.record(format!("bulk_delete({} ids)", ids.len()));
        self.state.take_injected_error()?;

        let mut rows = self.state.rows.lock();
        let mut affected = 0;
        for id in ids {
            if rows.get(id).is_some_and(|t| t.owner_user_id == owner_user_id) {
                rows.remove(id);
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn list(&self, owner_user_id: &str, filter: TaskFilter) -> Result<Vec<Task>> {
        self.state.record("list");
        self.state.take_injected_error()?;

        let rows = self.state.rows.lock();
        let mut owned: Vec<Task> = rows
            .values()
            .filter(|t| t.owner_user_id == owner_user_id)
            .filter(|t| filter.branch_id.map_or(true, |id| t.branch_id == id))
            .filter(|t| filter.status.map_or(true, |s| t.status == s))
            .filter(|t| filter.priority.map_or(true, |p| t.priority == p))
            .filter(|t| filter.assignee_id.as_ref().map_or(true, |a| t.assignee_ids.contains(a)))
            .filter(|t| filter.label.map_or(true, |l| t.label_ids.contains(&l)))
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(offset) = filter.offset {
            owned = owned.into_iter().skip(offset as usize).collect();
        }
        if let Some(limit) = filter.limit {
            owned.truncate(limit as usize);
        }
        Ok(owned)
    }

    async fn list_minimal(&self, owner_user_id: &str, filter: TaskFilter) -> Result<Vec<TaskSummary>> {
        self.state.record("list_minimal");
        let tasks = self.list(owner_user_id, filter).await?;
        Ok(tasks
            .into_iter()
            .map(|task| TaskSummary { subtask_count: 0, assignee_count: task.assignee_ids.len() as u32, dependency_count: 0, task })
            .collect())
    }

    async fn list_runnable(&self, owner_user_id: &str) -> Result<Vec<Task>> {
        self.state.record("list_runnable");
        self.state.take_injected_error()?;

        let rows = self.state.rows.lock();
        let mut runnable: Vec<Task> = rows.values().filter(|t| t.owner_user_id == owner_user_id && t.status.is_runnable()).cloned().collect();
        runnable.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.created_at.cmp(&b.created_at)));
        Ok(runnable)
    }
}

/// Mock implementation of [`SubtaskRepository`].
pub struct MockSubtaskRepository {
    state: MockState<Subtask>,
}

impl Default for MockSubtaskRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSubtaskRepository {
    pub fn new() -> Self {
        Self { state: MockState::new() }
    }

    pub fn inject_error(&self, error: OrchestratorError) {
        *self.state.error_injection.lock() = Some(error);
    }

    pub fn call_history(&self) -> Vec<String> {
        self.state.call_history.lock().clone()
    }
}

#[async_trait]
impl SubtaskRepository for MockSubtaskRepository {
    async fn create(&self, owner_user_id: &str, subtask: NewSubtask) -> Result<Subtask> {
        self.state.record(format!("create(title={})", subtask.title));
        self.state.take_injected_error()?;

        let now = Utc::now();
        let created = Subtask {
            id: new_id(),
            task_id: subtask.task_id,
            owner_user_id: owner_user_id.to_string(),
            title: subtask.title,
            description: subtask.description,
            status: TaskStatus::Todo,
            priority: subtask.priority,
            assignee_ids: subtask.assignee_ids,
            progress_percentage: subtask.progress_percentage,
            created_at: now,
            updated_at: now,
        };
        self.state.rows.lock().insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_by_id(&self, owner_user_id: &str, id: Id) -> Result<Option<Subtask>> {
        self.state.record(format!("get_by_id({id})"));
        self.state.take_injected_error()?;
        Ok(self.state.rows.lock().get(&id).filter(|s| s.owner_user_id == owner_user_id).cloned())
    }

    async fn update(&self, owner_user_id: &str, id: Id, updates: UpdateSubtask) -> Result<Subtask> {
        self.state.record(format!("update({id})"));
        self.state.take_injected_error()?;

        let mut rows = self.state.rows.lock();
        let subtask = rows.get_mut(&id).filter(|s| s.owner_user_id == owner_user_id).ok_or_else(|| OrchestratorError::not_found("Subtask", id))?;
        if let Some(title) = updates.title {
            subtask.title = title;
        }
        if let Some(description) = updates.description {
            subtask.description = description;
        }
        if let Some(priority) = updates.priority {
            subtask.priority = priority;
        }
        if let Some(assignee_ids) = updates.assignee_ids {
            subtask.assignee_ids = assignee_ids;
        }
        if let Some(progress_percentage) = updates.progress_percentage {
            subtask.progress_percentage = progress_percentage;
        }
        subtask.updated_at = Utc::now();
        Ok(subtask.clone())
    }

    async fn set_status(&self, owner_user_id: &str, id: Id, status: TaskStatus) -> Result<Subtask> {
        self.state.record(format!("set_status({id}, {status})"));
        self.state.take_injected_error()?;

        let mut rows = self.state.rows.lock();
        let subtask = rows.get_mut(&id).filter(|s| s.owner_user_id == owner_user_id).ok_or_else(|| OrchestratorError::not_found("Subtask", id))?;
        if !subtask.status.can_transition_to(status) {
            return Err(OrchestratorError::InvalidTransition { from: subtask.status, to: status });
        }
        subtask.status = status;
        if status == TaskStatus::Done {
            subtask.progress_percentage = 100;
        }
        subtask.updated_at = Utc::now();
        Ok(subtask.clone())
    }

    async fn delete(&self, owner_user_id: &str, id: Id) -> Result<u64> {
        self.state.record(format!("delete({id})"));
        self.state.take_injected_error()?;

        let mut rows = self.state.rows.lock();
        if rows.get(&id).is_some_and(|s| s.owner_user_id == owner_user_id) {
            rows.remove(&id);
            Ok(1)
        } else {
            Ok(0)
        }
    }

    async fn list_by_task(&self, owner_user_id: &str, task_id: Id) -> Result<Vec<Subtask>> {
        self.state.record(format!("list_by_task({task_id})"));
        self.state.take_injected_error()?;

        let rows = self.state.rows.lock();
        let mut owned: Vec<Subtask> = rows.values().filter(|s| s.owner_user_id == owner_user_id && s.task_id == task_id).cloned().collect();
        owned.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(owned)
    }
}

/// Convenience alias kept for call sites that only need one shared `Arc`
/// across a dispatcher built with [`task_core::repository`] trait objects.
pub type SharedMockTaskRepository = Arc<MockTaskRepository>;

/// Mock implementation of [`LabelRepository`]. Keyed by name rather than id
/// since `get_or_create` looks up by name.
pub struct MockLabelRepository {
    by_name: Mutex<HashMap<String, Label>>,
    attachments: Mutex<Vec<(Id, Id)>>,
    error_injection: Mutex<Option<OrchestratorError>>,
    call_history: Mutex<Vec<String>>,
}

impl Default for MockLabelRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLabelRepository {
    pub fn new() -> Self {
        Self {
            by_name: Mutex::new(HashMap::new()),
            attachments: Mutex::new(Vec::new()),
            error_injection: Mutex::new(None),
            call_history: Mutex::new(Vec::new()),
        }
    }

    pub fn inject_error(&self, err: OrchestratorError) {
        *self.error_injection.lock() = Some(err);
    }

    pub fn call_history(&self) -> Vec<String> {
        self.call_history.lock().clone()
    }

    fn take_injected_error(&self) -> Result<()> {
        if let Some(err) = self.error_injection.lock().take() {
            return Err(err);
        }
        Ok(())
    }
}

#[async_trait]
impl LabelRepository for MockLabelRepository {
    async fn get_or_create(&self, name: &str) -> Result<Label> {
        self.call_history.lock().push(format!("get_or_create({name})"));
        self.take_injected_error()?;

        if name.trim().is_empty() {
            return Err(OrchestratorError::empty_field("name"));
        }

        let mut by_name = self.by_name.lock();
        if let Some(existing) = by_name.get(name) {
            return Ok(existing.clone());
        }
        let label = Label { id: new_id(), name: name.to_string() };
        by_name.insert(name.to_string(), label.clone());
        Ok(label)
    }

    async fn list(&self) -> Result<Vec<Label>> {
        self.call_history.lock().push("list()".to_string());
        self.take_injected_error()?;

        let mut labels: Vec<Label> = self.by_name.lock().values().cloned().collect();
        labels.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(labels)
    }

    async fn attach(&self, _owner_user_id: &str, task_id: Id, label_id: Id) -> Result<()> {
        self.call_history.lock().push(format!("attach({task_id}, {label_id})"));
        self.take_injected_error()?;

        self.attachments.lock().push((task_id, label_id));
        Ok(())
    }

    async fn detach(&self, _owner_user_id: &str, task_id: Id, label_id: Id) -> Result<()> {
        self.call_history.lock().push(format!("detach({task_id}, {label_id})"));
        self.take_injected_error()?;

        self.attachments.lock().retain(|pair| *pair != (task_id, label_id));
        Ok(())
    }
}
