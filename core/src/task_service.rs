//! C5: task lifecycle, dependency DAG, subtask rollup, and completion
//! preconditions, coordinating with the Context Service at mutation
//! boundaries.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use serde_json::Map;

use crate::context_service::ContextService;
use crate::error::{OrchestratorError, Result};
use crate::models::{
    ContextLevel, Id, NewSubtask, NewTask, Priority, ProgressEntry, Subtask, Task, TaskFilter,
    TaskStatus, UpdateSubtask, UpdateTask,
};
use crate::repository::{SubtaskRepository, TaskDependencyRepository, TaskRepository, TaskSummary};
use crate::validation::Validator;

/// Resolves an agent-role label (e.g. `coding-agent`) to an assignee
/// identifier. The real catalog is an external collaborator (§1); this
/// trait is the seam the service depends on instead of reaching for it
/// directly.
#[async_trait::async_trait]
pub trait AgentCatalog: Send + Sync {
    async fn resolve_role(&self, role_label: &str) -> Option<String>;
}

pub struct TaskService {
    tasks: Arc<dyn TaskRepository>,
    subtasks: Arc<dyn SubtaskRepository>,
    dependencies: Arc<dyn TaskDependencyRepository>,
    contexts: Arc<ContextService>,
    agent_catalog: Option<Arc<dyn AgentCatalog>>,
}

impl TaskService {
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        subtasks: Arc<dyn SubtaskRepository>,
        dependencies: Arc<dyn TaskDependencyRepository>,
        contexts: Arc<ContextService>,
        agent_catalog: Option<Arc<dyn AgentCatalog>>,
    ) -> Self {
        Self {
            tasks,
            subtasks,
            dependencies,
            contexts,
            agent_catalog,
        }
    }

    pub async fn create(&self, owner_user_id: &str, mut new_task: NewTask) -> Result<Task> {
        Validator::validate_new_task(&new_task)?;

        if new_task.assignee_ids.is_empty() {
            if let Some(label) = new_task.agent_role_label.clone() {
                if let Some(catalog) = &self.agent_catalog {
                    if let Some(resolved) = catalog.resolve_role(&label).await {
                        new_task.assignee_ids.push(resolved);
                    }
                    // Failure to resolve leaves assignees empty; the caller
                    // sees this via the response hints, not an error here.
                }
            }
        }

        self.tasks.create(owner_user_id, new_task).await
    }

    pub async fn get(&self, owner_user_id: &str, id: Id) -> Result<Task> {
        self.tasks
            .get_by_id(owner_user_id, id)
            .await?
            .ok_or_else(|| OrchestratorError::not_found("Task", id))
    }

    pub async fn update(
        &self,
        owner_user_id: &str,
        id: Id,
        updates: UpdateTask,
        expected_version: Option<i32>,
    ) -> Result<Task> {
        self.tasks.update(owner_user_id, id, updates, expected_version).await
    }

    pub async fn list(&self, owner_user_id: &str, filter: TaskFilter) -> Result<Vec<Task>> {
        self.tasks.list(owner_user_id, filter).await
    }

    pub async fn list_minimal(&self, owner_user_id: &str, filter: TaskFilter) -> Result<Vec<TaskSummary>> {
        self.tasks.list_minimal(owner_user_id, filter).await
    }

    pub async fn delete(&self, owner_user_id: &str, id: Id) -> Result<u64> {
        self.tasks.delete(owner_user_id, id).await
    }

    /// Never deletes rows the caller doesn't own; returns the count
    /// actually affected.
    pub async fn bulk_delete(&self, owner_user_id: &str, ids: &[Id]) -> Result<u64> {
        self.tasks.bulk_delete(owner_user_id, ids).await
    }

    /// Caller's highest-priority runnable task: not blocked, not terminal,
    /// all dependencies done; tie-break priority desc then created_at asc.
    pub async fn next(&self, owner_user_id: &str) -> Result<Option<Task>> {
        let candidates = self.tasks.list_runnable(owner_user_id).await?;
        let mut best: Option<Task> = None;
        for task in candidates {
            if !task.status.is_runnable() {
                continue;
            }
            let deps = self.dependencies.depends_on(owner_user_id, task.id).await?;
            let mut all_done = true;
            for dep_id in deps {
                match self.tasks.get_by_id(owner_user_id, dep_id).await? {
                    Some(dep) if dep.status == TaskStatus::Done => {}
                    _ => {
                        all_done = false;
                        break;
                    }
                }
            }
            if !all_done {
                continue;
            }
            best = match best {
                None => Some(task),
                Some(current) => Some(pick_higher_priority(current, task)),
            };
        }
        Ok(best)
    }

    /// Validates the transition against the state machine, then persists it.
    pub async fn set_status(&self, owner_user_id: &str, id: Id, new_status: TaskStatus) -> Result<Task> {
        let task = self.get(owner_user_id, id).await?;
        if !task.status.can_transition_to(new_status) {
            return Err(OrchestratorError::InvalidTransition {
                from: task.status,
                to: new_status,
            });
        }
        self.tasks.set_status(owner_user_id, id, new_status).await
    }

    /// Runs completion preconditions, auto-creating a Task-level Context if
    /// absent, then transitions to `done`.
    pub async fn complete(&self, owner_user_id: &str, id: Id, completion_summary: Option<String>) -> Result<Task> {
        let task = self.get(owner_user_id, id).await?;
        if !task.status.can_transition_to(TaskStatus::Done) {
            return Err(OrchestratorError::InvalidTransition {
                from: task.status,
                to: TaskStatus::Done,
            });
        }

        let mut blockers = Vec::new();

        let subtasks = self.subtasks.list_by_task(owner_user_id, id).await?;
        for subtask in &subtasks {
            if subtask.status != TaskStatus::Done {
                blockers.push(format!("subtask:{}:status={}", subtask.id, subtask.status));
            }
        }

        let depends_on = self.dependencies.depends_on(owner_user_id, id).await?;
        for dep_id in depends_on {
            if let Some(dep) = self.tasks.get_by_id(owner_user_id, dep_id).await? {
                if dep.status != TaskStatus::Done {
                    blockers.push(format!("task:{dep_id}:status={}", dep.status));
                }
            }
        }

        if completion_summary.as_deref().map(str::trim).unwrap_or("").is_empty() {
            blockers.push("completion_summary:missing".to_string());
        }

        if !blockers.is_empty() {
            return Err(OrchestratorError::CompletionBlocked(blockers));
        }

        // Auto-create the Task-level Context transactionally with the
        // status update, per §4.5 precondition 2.
        let existing_context = self.contexts.get(ContextLevel::Task, id, owner_user_id, false).await;
        if existing_context.is_err() {
            let mut data = Map::new();
            data.insert("progress".to_string(), serde_json::json!(100));
            data.insert("status".to_string(), serde_json::json!(TaskStatus::Done.to_string()));
            self.contexts
                .create(ContextLevel::Task, id, owner_user_id, data, Some(task.branch_id))
                .await?;
            self.tasks.set_context_id(owner_user_id, id, id).await?;
        } else {
            let mut patch = Map::new();
            patch.insert("progress".to_string(), serde_json::json!(100));
            patch.insert("status".to_string(), serde_json::json!(TaskStatus::Done.to_string()));
            self.contexts
                .update(ContextLevel::Task, id, owner_user_id, Some(patch), None, None, true)
                .await?;
        }

        self.tasks.set_progress(owner_user_id, id, 100).await?;
        self.tasks.set_status(owner_user_id, id, TaskStatus::Done).await
    }

    /// `add_dependency`: refuses self-dependency and any edge that would
    /// close a cycle (forward-reachability DFS from `depends_on_task_id` to
    /// `task_id` — if reachable, adding the edge closes a loop).
    pub async fn add_dependency(&self, owner_user_id: &str, task_id: Id, depends_on_task_id: Id) -> Result<()> {
        if task_id == depends_on_task_id {
            return Err(OrchestratorError::DependencyCycle(vec![task_id]));
        }

        let edges = self.dependencies.all_edges(owner_user_id).await?;
        if let Some(cycle) = find_cycle_if_added(&edges, task_id, depends_on_task_id) {
            return Err(OrchestratorError::DependencyCycle(cycle));
        }

        // Sanity guard: forbid completing-task-depends-on-completing-task
        // when both are already done (configurable in theory; always on here).
        if let (Some(source), Some(target)) = (
            self.tasks.get_by_id(owner_user_id, task_id).await?,
            self.tasks.get_by_id(owner_user_id, depends_on_task_id).await?,
        ) {
            if source.status == TaskStatus::Done && target.status != TaskStatus::Done {
                return Err(OrchestratorError::validation(
                    "depends_on_task_id",
                    "a done task cannot depend on a not-done task",
                ));
            }
        }

        self.dependencies.add(owner_user_id, task_id, depends_on_task_id).await
    }

    pub async fn remove_dependency(&self, owner_user_id: &str, task_id: Id, depends_on_task_id: Id) -> Result<()> {
        self.dependencies.remove(owner_user_id, task_id, depends_on_task_id).await
    }

    pub async fn add_progress(&self, owner_user_id: &str, id: Id, content: String) -> Result<Task> {
        let task = self.get(owner_user_id, id).await?;
        let progress_number = task.progress_count + 1;
        let entry = ProgressEntry {
            content: format!("=== Progress {progress_number} ===\n{content}"),
            timestamp: Utc::now(),
            progress_number,
        };
        self.tasks.append_progress_entry(owner_user_id, id, entry).await
    }

    // --- Subtasks ---

    pub async fn create_subtask(&self, owner_user_id: &str, new_subtask: NewSubtask) -> Result<Subtask> {
        Validator::validate_new_subtask(&new_subtask)?;
        let created = self.subtasks.create(owner_user_id, new_subtask).await?;
        self.recompute_rollup(owner_user_id, created.task_id).await?;
        Ok(created)
    }

    pub async fn update_subtask(
        &self,
        owner_user_id: &str,
        id: Id,
        updates: UpdateSubtask,
    ) -> Result<Subtask> {
        if let Some(p) = updates.progress_percentage {
            Validator::validate_progress_percentage(p)?;
        }
        let subtask = self.subtasks.get_by_id(owner_user_id, id).await?
            .ok_or_else(|| OrchestratorError::not_found("Subtask", id))?;
        let updated = self.subtasks.update(owner_user_id, id, updates).await?;
        self.recompute_rollup(owner_user_id, subtask.task_id).await?;
        Ok(updated)
    }

    pub async fn delete_subtask(&self, owner_user_id: &str, id: Id) -> Result<u64> {
        let subtask = self.subtasks.get_by_id(owner_user_id, id).await?;
        let affected = self.subtasks.delete(owner_user_id, id).await?;
        if let Some(subtask) = subtask {
            self.recompute_rollup(owner_user_id, subtask.task_id).await?;
        }
        Ok(affected)
    }

    /// Completing a subtask forces `progress_percentage=100`. Does not
    /// itself complete the parent task — rollup only updates `progress`.
    pub async fn complete_subtask(&self, owner_user_id: &str, id: Id) -> Result<Subtask> {
        let subtask = self.subtasks.get_by_id(owner_user_id, id).await?
            .ok_or_else(|| OrchestratorError::not_found("Subtask", id))?;
        if !subtask.status.can_transition_to(TaskStatus::Done) {
            return Err(OrchestratorError::InvalidTransition {
                from: subtask.status,
                to: TaskStatus::Done,
            });
        }
        let updated = self
            .subtasks
            .update(
                owner_user_id,
                id,
                UpdateSubtask {
                    progress_percentage: Some(100),
                    ..Default::default()
                },
            )
            .await?;
        let completed = self.subtasks.set_status(owner_user_id, id, TaskStatus::Done).await?;
        self.recompute_rollup(owner_user_id, subtask.task_id).await?;
        let _ = updated;
        Ok(completed)
    }

    async fn recompute_rollup(&self, owner_user_id: &str, task_id: Id) -> Result<()> {
        let subtasks = self.subtasks.list_by_task(owner_user_id, task_id).await?;
        if subtasks.is_empty() {
            return Ok(());
        }
        let total: u32 = subtasks.iter().map(|s| s.progress_percentage as u32).sum();
        let progress = (total as f64 / subtasks.len() as f64).round() as u32;
        self.tasks.set_progress(owner_user_id, task_id, progress).await?;
        Ok(())
    }
}

fn pick_higher_priority(a: Task, b: Task) -> Task {
    if b.priority > a.priority {
        b
    } else if b.priority < a.priority {
        a
    } else if b.created_at < a.created_at {
        b
    } else {
        a
    }
}

/// Returns `Some(cycle)` describing the path `depends_on_task_id -> .. -> task_id`
/// if adding the edge `task_id -> depends_on_task_id` would close a loop.
fn find_cycle_if_added(edges: &[(Id, Id)], task_id: Id, depends_on_task_id: Id) -> Option<Vec<Id>> {
    let mut adjacency: std::collections::HashMap<Id, Vec<Id>> = std::collections::HashMap::new();
    for (from, to) in edges {
        adjacency.entry(*from).or_default().push(*to);
    }

    // BFS forward from depends_on_task_id; if task_id is reachable, the new
    // edge task_id -> depends_on_task_id closes a cycle.
    let mut visited: HashSet<Id> = HashSet::new();
    let mut queue: VecDeque<Vec<Id>> = VecDeque::new();
    queue.push_back(vec![depends_on_task_id]);
    visited.insert(depends_on_task_id);

    while let Some(path) = queue.pop_front() {
        let current = *path.last().unwrap();
        if current == task_id {
            let mut cycle = path;
            cycle.push(depends_on_task_id);
            return Some(cycle);
        }
        if let Some(neighbors) = adjacency.get(&current) {
            for next in neighbors {
                if visited.insert(*next) {
                    let mut new_path = path.clone();
                    new_path.push(*next);
                    queue.push_back(new_path);
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn detects_cycle_closed_by_new_edge() {
        let t1 = Uuid::new_v4();
        let t2 = Uuid::new_v4();
        let t3 = Uuid::new_v4();
        // t2 depends_on t1, t3 depends_on t2 (edges stored as (task_id, depends_on_task_id))
        let edges = vec![(t2, t1), (t3, t2)];
        // adding t1 depends_on t3 would close t1 -> t3 -> t2 -> t1
        let cycle = find_cycle_if_added(&edges, t1, t3);
        assert!(cycle.is_some());
    }

    #[test]
    fn no_cycle_for_independent_edge() {
        let t1 = Uuid::new_v4();
        let t2 = Uuid::new_v4();
        let t3 = Uuid::new_v4();
        let edges = vec![(t2, t1)];
        assert!(find_cycle_if_added(&edges, t3, t1).is_none());
    }

    #[test]
    fn priority_tie_break_prefers_earlier_created() {
        let now = Utc::now();
        let earlier = now - chrono::Duration::seconds(10);
        let a = make_task(Priority::High, earlier);
        let b = make_task(Priority::High, now);
        let winner = pick_higher_priority(a.clone(), b);
        assert_eq!(winner.id, a.id);
    }

    fn make_task(priority: Priority, created_at: chrono::DateTime<Utc>) -> Task {
        Task {
            id: Uuid::new_v4(),
            branch_id: Uuid::new_v4(),
            owner_user_id: "u1".to_string(),
            title: "t".to_string(),
            description: String::new(),
            status: TaskStatus::Todo,
            priority,
            assignee_ids: vec![],
            label_ids: vec![],
            due_date: None,
            estimated_effort: None,
            context_id: None,
            progress_history: Default::default(),
            progress_count: 0,
            progress: 0,
            created_at,
            updated_at: created_at,
            version: 1,
        }
    }
}
