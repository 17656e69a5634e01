//! Fluent builders for constructing domain model test fixtures (C2).
//!
//! Every builder defaults to a valid, minimal instance so a test only needs
//! to call the setters it cares about.

use chrono::Utc;
use task_core::models::*;

fn new_id() -> Id {
    Id::new_v4()
}

pub struct ProjectBuilder {
    project: Project,
}

impl Default for ProjectBuilder {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            project: Project {
                id: new_id(),
                owner_user_id: "test-user".to_string(),
                name: "Test Project".to_string(),
                description: String::new(),
                created_at: now,
                updated_at: now,
            },
        }
    }
}

impl ProjectBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: Id) -> Self {
        self.project.id = id;
        self
    }

    pub fn owner(mut self, owner_user_id: impl Into<String>) -> Self {
        self.project.owner_user_id = owner_user_id.into();
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.project.name = name.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.project.description = description.into();
        self
    }

    pub fn build(self) -> Project {
        self.project
    }
}

pub struct BranchBuilder {
    branch: Branch,
}

impl Default for BranchBuilder {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            branch: Branch {
                id: new_id(),
                project_id: new_id(),
                owner_user_id: "test-user".to_string(),
                name: "main".to_string(),
                description: String::new(),
                assigned_agent_id: None,
                created_at: now,
                updated_at: now,
            },
        }
    }
}

impl BranchBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: Id) -> Self {
        self.branch.id = id;
        self
    }

    pub fn project_id(mut self, project_id: Id) -> Self {
        self.branch.project_id = project_id;
        self
    }

    pub fn owner(mut self, owner_user_id: impl Into<String>) -> Self {
        self.branch.owner_user_id = owner_user_id.into();
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.branch.name = name.into();
        self
    }

    pub fn assigned_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.branch.assigned_agent_id = Some(agent_id.into());
        self
    }

    pub fn build(self) -> Branch {
        self.branch
    }
}

pub struct TaskBuilder {
    task: Task,
}

impl Default for TaskBuilder {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            task: Task {
                id: new_id(),
                branch_id: new_id(),
                owner_user_id: "test-user".to_string(),
                title: "Test Task".to_string(),
                description: String::new(),
                status: TaskStatus::Todo,
                priority: Priority::Medium,
                assignee_ids: Vec::new(),
                label_ids: Vec::new(),
                due_date: None,
                estimated_effort: None,
                context_id: None,
                progress_history: Default::default(),
                progress_count: 0,
                progress: 0,
                created_at: now,
                updated_at: now,
                version: 1,
            },
        }
    }
}

impl TaskBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: Id) -> Self {
        self.task.id = id;
        self
    }

    pub fn branch_id(mut self, branch_id: Id) -> Self {
        self.task.branch_id = branch_id;
        self
    }

    pub fn owner(mut self, owner_user_id: impl Into<String>) -> Self {
        self.task.owner_user_id = owner_user_id.into();
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.task.title = title.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.task.description = description.into();
        self
    }

    pub fn status(mut self, status: TaskStatus) -> Self {
        self.task.status = status;
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.task.priority = priority;
        self
    }

    pub fn assignee(mut self, assignee: impl Into<String>) -> Self {
        self.task.assignee_ids.push(assignee.into());
        self
    }

    pub fn label(mut self, label_id: Id) -> Self {
        self.task.label_ids.push(label_id);
        self
    }

    pub fn version(mut self, version: i32) -> Self {
        self.task.version = version;
        self
    }

    pub fn context_id(mut self, context_id: Id) -> Self {
        self.task.context_id = Some(context_id);
        self
    }

    pub fn build(self) -> Task {
        self.task
    }
}

pub struct NewTaskBuilder {
    new_task: NewTask,
}

impl Default for NewTaskBuilder {
    fn default() -> Self {
        Self {
            new_task: NewTask {
                branch_id: new_id(),
                title: "Test Task".to_string(),
                description: String::new(),
                priority: Priority::Medium,
                assignee_ids: Vec::new(),
                label_ids: Vec::new(),
                due_date: None,
                estimated_effort: None,
                agent_role_label: None,
            },
        }
    }
}

impl NewTaskBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn branch_id(mut self, branch_id: Id) -> Self {
        self.new_task.branch_id = branch_id;
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.new_task.title = title.into();
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.new_task.priority = priority;
        self
    }

    pub fn agent_role_label(mut self, label: impl Into<String>) -> Self {
        self.new_task.agent_role_label = Some(label.into());
        self
    }

    pub fn build(self) -> NewTask {
        self.new_task
    }
}

#[derive(Default)]
pub struct UpdateTaskBuilder {
    update: UpdateTask,
}

impl UpdateTaskBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.update.title = Some(title.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.update.description = Some(description.into());
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.update.priority = Some(priority);
        self
    }

    pub fn clear_due_date(mut self) -> Self {
        self.update.due_date = Some(None);
        self
    }

    pub fn build(self) -> UpdateTask {
        self.update
    }
}

#[derive(Default)]
pub struct TaskFilterBuilder {
    filter: TaskFilter,
}

impl TaskFilterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn branch_id(mut self, branch_id: Id) -> Self {
        self.filter.branch_id = Some(branch_id);
        self
    }

    pub fn status(mut self, status: TaskStatus) -> Self {
        self.filter.status = Some(status);
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.filter.priority = Some(priority);
        self
    }

    pub fn assignee_id(mut self, assignee_id: impl Into<String>) -> Self {
        self.filter.assignee_id = Some(assignee_id.into());
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.filter.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.filter.offset = Some(offset);
        self
    }

    pub fn build(self) -> TaskFilter {
        self.filter
    }
}

pub struct SubtaskBuilder {
    subtask: Subtask,
}

impl Default for SubtaskBuilder {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            subtask: Subtask {
                id: new_id(),
                task_id: new_id(),
                owner_user_id: "test-user".to_string(),
                title: "Test Subtask".to_string(),
                description: String::new(),
                status: TaskStatus::Todo,
                priority: Priority::Medium,
                assignee_ids: Vec::new(),
                progress_percentage: 0,
                created_at: now,
                updated_at: now,
            },
        }
    }
}

impl SubtaskBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn task_id(mut self, task_id: Id) -> Self {
        self.subtask.task_id = task_id;
        self
    }

    pub fn owner(mut self, owner_user_id: impl Into<String>) -> Self {
        self.subtask.owner_user_id = owner_user_id.into();
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.subtask.title = title.into();
        self
    }

    pub fn status(mut self, status: TaskStatus) -> Self {
        self.subtask.status = status;
        self
    }

    pub fn progress_percentage(mut self, pct: u8) -> Self {
        self.subtask.progress_percentage = pct;
        self
    }

    pub fn build(self) -> Subtask {
        self.subtask
    }
}
