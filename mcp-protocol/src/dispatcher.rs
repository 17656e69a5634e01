//! C6: Command Dispatcher (§4.6). One method per umbrella tool
//! (`manage_project`, `manage_branch`, `manage_task`, `manage_subtask`,
//! `manage_context`, `manage_agent`), each parameterized by an `action`
//! string. Every method: coerce params -> check the enforcement contract ->
//! route to C4/C5/the repositories -> shape the result with the Response
//! Optimizer -> fan out a change event on success.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde_json::{json, Map, Value};
use uuid::Uuid;

use task_core::context_service::{ContextRecord, ContextService};
use task_core::enforcement::Enforcer;
use task_core::error::{OrchestratorError, Result as CoreResult};
use task_core::event::{ChangeEvent, EntityType};
use task_core::models::{
    ContextExtras, ContextLevel, Id, InsightCategory, InsightImportance, NewBranch, NewProject,
    NewSubtask, NewTask, Priority, TaskFilter, TaskStatus, UpdateBranch, UpdateProject,
    UpdateSubtask, UpdateTask,
};
use task_core::repository::{BranchRepository, LabelRepository, ProjectRepository, SubtaskRepository};
use task_core::task_service::TaskService;

use crate::coercion::{coerce_json_object, coerce_list, coerce_string_list};
use crate::fanout::FanoutRegistry;
use crate::response::{Hints, ResponseOptimizer, ResponseProfile};

mod agents;
pub use agents::{Agent, AgentDirectory};

pub struct Dispatcher {
    projects: Arc<dyn ProjectRepository>,
    branches: Arc<dyn BranchRepository>,
    subtasks: Arc<dyn SubtaskRepository>,
    tasks: Arc<TaskService>,
    contexts: Arc<ContextService>,
    enforcer: Arc<Enforcer>,
    optimizer: Arc<ResponseOptimizer>,
    fanout: Arc<FanoutRegistry>,
    labels: Arc<dyn LabelRepository>,
    agents: AgentDirectory,
}

fn digest(value: &Value) -> String {
    let mut hasher = DefaultHasher::new();
    value.to_string().hash(&mut hasher);
    format!("{:x}", hasher.finish())
}

fn param_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn require_str<'a>(params: &'a Map<String, Value>, field: &str) -> CoreResult<&'a str> {
    params
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| OrchestratorError::validation(field, "required"))
}

fn require_id(params: &Map<String, Value>, field: &str) -> CoreResult<Id> {
    let raw = require_str(params, field)?;
    Uuid::parse_str(raw).map_err(|_| OrchestratorError::validation(field, "must be a UUID"))
}

fn optional_id(params: &Map<String, Value>, field: &str) -> CoreResult<Option<Id>> {
    match params.get(field).and_then(Value::as_str) {
        Some(raw) if !raw.trim().is_empty() => {
            Uuid::parse_str(raw).map(Some).map_err(|_| OrchestratorError::validation(field, "must be a UUID"))
        }
        _ => Ok(None),
    }
}

fn optional_u32(params: &Map<String, Value>, field: &str, default: u32) -> u32 {
    params.get(field).and_then(Value::as_u64).map(|v| v as u32).unwrap_or(default)
}

fn level_from_str(field: &str, raw: &str) -> CoreResult<ContextLevel> {
    match raw.to_ascii_lowercase().as_str() {
        "global" => Ok(ContextLevel::Global),
        "project" => Ok(ContextLevel::Project),
        "branch" => Ok(ContextLevel::Branch),
        "task" => Ok(ContextLevel::Task),
        _ => Err(OrchestratorError::validation(field, "must be one of global/project/branch/task")),
    }
}

fn parse_level(params: &Map<String, Value>) -> CoreResult<ContextLevel> {
    level_from_str("level", require_str(params, "level")?)
}

fn parse_extras(params: &Map<String, Value>, field: &str) -> CoreResult<Option<ContextExtras>> {
    match params.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(raw) => serde_json::from_value(raw.clone())
            .map(Some)
            .map_err(|_| OrchestratorError::validation(field, "malformed extras object")),
    }
}

fn context_record_json(record: &ContextRecord) -> Value {
    json!({
        "level": record.level,
        "id": record.id,
        "data": record.data,
        "overrides": record.overrides,
        "version": record.version,
        "extras": record.extras,
        "inheritance_disabled": record.inheritance_disabled,
    })
}

fn parse_priority(params: &Map<String, Value>, field: &str) -> CoreResult<Option<Priority>> {
    match params.get(field).and_then(Value::as_str) {
        None => Ok(None),
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "low" => Ok(Some(Priority::Low)),
            "medium" => Ok(Some(Priority::Medium)),
            "high" => Ok(Some(Priority::High)),
            "critical" => Ok(Some(Priority::Critical)),
            "urgent" => Ok(Some(Priority::Urgent)),
            _ => Err(OrchestratorError::validation(field, "unknown priority")),
        },
    }
}

fn parse_status(params: &Map<String, Value>, field: &str) -> CoreResult<Option<TaskStatus>> {
    match params.get(field).and_then(Value::as_str) {
        None => Ok(None),
        Some(raw) => serde_json::from_value(json!(raw))
            .map(Some)
            .map_err(|_| OrchestratorError::validation(field, "unknown status")),
    }
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        projects: Arc<dyn ProjectRepository>,
        branches: Arc<dyn BranchRepository>,
        subtasks: Arc<dyn SubtaskRepository>,
        tasks: Arc<TaskService>,
        contexts: Arc<ContextService>,
        enforcer: Arc<Enforcer>,
        optimizer: Arc<ResponseOptimizer>,
        fanout: Arc<FanoutRegistry>,
        labels: Arc<dyn LabelRepository>,
    ) -> Self {
        Self {
            projects,
            branches,
            subtasks,
            tasks,
            contexts,
            enforcer,
            optimizer,
            fanout,
            labels,
            agents: AgentDirectory::new(),
        }
    }

    /// Resolves label names to ids, creating rows for names seen for the
    /// first time (§4.2's `LabelRepository::get_or_create`). Callers pass
    /// label names on the wire, not ids — there is no other way to create a
    /// label.
    async fn resolve_label_names(&self, names: &[String]) -> CoreResult<Vec<Id>> {
        let mut ids = Vec::with_capacity(names.len());
        for name in names {
            ids.push(self.labels.get_or_create(name).await?.id);
        }
        Ok(ids)
    }

    fn respond<T: serde::Serialize>(
        &self,
        profile: ResponseProfile,
        operation: &str,
        hints: Option<Hints>,
        result: CoreResult<T>,
    ) -> Value {
        match result {
            Ok(data) => self.optimizer.success(profile, operation, json!(data), hints),
            Err(err) => {
                tracing::warn!(operation = %operation, error = %err, "dispatch failed");
                self.optimizer.error(profile, &err)
            }
        }
    }

    async fn publish(&self, entity_type: EntityType, entity_id: Id, actor: &str, action: &str, payload: &Value, assignees: &[String]) {
        let event = ChangeEvent::new(entity_type, entity_id, actor.to_string(), action, digest(payload));
        self.fanout.publish(&event, assignees).await;
    }

    /// Surfaces WARNING-level `recommendations` (missing-but-not-required
    /// params, §4.9) into the `hints` object of an already-shaped success
    /// envelope. A no-op for error envelopes and for every profile but
    /// `DETAILED`, the only one carrying a `hints` object at all.
    fn attach_recommendations(profile: ResponseProfile, mut body: Value, recommendations: &[String]) -> Value {
        if recommendations.is_empty() || profile != ResponseProfile::Detailed {
            return body;
        }
        if let Some(obj) = body.as_object_mut() {
            if obj.get("success") == Some(&Value::Bool(true)) {
                let hints = obj
                    .entry("hints")
                    .or_insert_with(|| json!({"next": Value::Null, "required_actions": [], "recommendations": []}));
                if let Some(list) = hints.get_mut("recommendations").and_then(Value::as_array_mut) {
                    for field in recommendations {
                        if !list.iter().any(|v| v.as_str() == Some(field.as_str())) {
                            list.push(json!(field));
                        }
                    }
                }
            }
        }
        body
    }

    /// Returns the WARNING-level `missing_recommended` fields on success (§4.9);
    /// STRICT-blocked calls still short-circuit via the `?`-propagated `Err`.
    fn check_enforcement(&self, action_key: &str, agent_id: Option<&str>, params: &Map<String, Value>) -> CoreResult<Vec<String>> {
        let as_map: std::collections::HashMap<String, Value> = params.clone().into_iter().collect();
        let outcome = match self.enforcer.check(action_key, agent_id, &as_map) {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::warn!(action = %action_key, error = %err, "enforcement blocked call");
                return Err(err);
            }
        };
        if !outcome.missing_recommended.is_empty() {
            tracing::debug!(action = %action_key, missing = ?outcome.missing_recommended, "missing recommended params");
        }
        Ok(outcome.missing_recommended)
    }

    // --- manage_project ---

    pub async fn manage_project(&self, owner_user_id: &str, action: &str, params: Value, profile: ResponseProfile) -> Value {
        let params = param_map(params);
        match action {
            "create" => {
                let result = self.do_create_project(owner_user_id, &params).await;
                self.respond(profile, "project.create", None, result)
            }
            "get" => {
                let result = self.do_get_project(owner_user_id, &params).await;
                self.respond(profile, "project.get", None, result)
            }
            "update" => {
                let result = self.do_update_project(owner_user_id, &params).await;
                self.respond(profile, "project.update", None, result)
            }
            "delete" => {
                let result = self.do_delete_project(owner_user_id, &params).await;
                self.respond(profile, "project.delete", None, result)
            }
            "list" => {
                let limit = optional_u32(&params, "limit", 50);
                let offset = optional_u32(&params, "offset", 0);
                let result = self.projects.list(owner_user_id, limit, offset).await;
                self.respond(profile, "project.list", None, result)
            }
            other => self.unknown_action(profile, "manage_project", other),
        }
    }

    async fn do_create_project(&self, owner_user_id: &str, params: &Map<String, Value>) -> CoreResult<Value> {
        let name = require_str(params, "name")?.to_string();
        let description = params.get("description").and_then(Value::as_str).unwrap_or_default().to_string();
        let created = self.projects.create(owner_user_id, NewProject { name, description }).await?;
        let value = json!(created);
        self.publish(EntityType::Project, created.id, owner_user_id, "create", &value, &[]).await;
        Ok(value)
    }

    async fn do_get_project(&self, owner_user_id: &str, params: &Map<String, Value>) -> CoreResult<Value> {
        let id = require_id(params, "id")?;
        let project = self.projects.get_by_id(owner_user_id, id).await?.ok_or_else(|| OrchestratorError::not_found("Project", id))?;
        Ok(json!(project))
    }

    async fn do_update_project(&self, owner_user_id: &str, params: &Map<String, Value>) -> CoreResult<Value> {
        let id = require_id(params, "id")?;
        let updates = UpdateProject {
            name: params.get("name").and_then(Value::as_str).map(str::to_string),
            description: params.get("description").and_then(Value::as_str).map(str::to_string),
        };
        let updated = self.projects.update(owner_user_id, id, updates).await?;
        let value = json!(updated);
        self.publish(EntityType::Project, id, owner_user_id, "update", &value, &[]).await;
        Ok(value)
    }

    async fn do_delete_project(&self, owner_user_id: &str, params: &Map<String, Value>) -> CoreResult<Value> {
        let id = require_id(params, "id")?;
        let affected = self.projects.delete(owner_user_id, id).await?;
        self.publish(EntityType::Project, id, owner_user_id, "delete", &json!({"id": id}), &[]).await;
        Ok(json!({ "deleted": affected }))
    }

    // --- manage_branch ---

    pub async fn manage_branch(&self, owner_user_id: &str, action: &str, params: Value, profile: ResponseProfile) -> Value {
        let params = param_map(params);
        match action {
            "create" => {
                let result = self.do_create_branch(owner_user_id, &params).await;
                self.respond(profile, "branch.create", None, result)
            }
            "get" => {
                let result = self.do_get_branch(owner_user_id, &params).await;
                self.respond(profile, "branch.get", None, result)
            }
            "update" => {
                let result = self.do_update_branch(owner_user_id, &params).await;
                self.respond(profile, "branch.update", None, result)
            }
            "delete" => {
                let result = self.do_delete_branch(owner_user_id, &params).await;
                self.respond(profile, "branch.delete", None, result)
            }
            "list" => {
                let project_id = optional_id(&params, "project_id").unwrap_or(None);
                let limit = optional_u32(&params, "limit", 50);
                let offset = optional_u32(&params, "offset", 0);
                let result = self.branches.list(owner_user_id, project_id, limit, offset).await;
                self.respond(profile, "branch.list", None, result)
            }
            other => self.unknown_action(profile, "manage_branch", other),
        }
    }

    async fn do_create_branch(&self, owner_user_id: &str, params: &Map<String, Value>) -> CoreResult<Value> {
        let project_id = require_id(params, "project_id")?;
        let name = require_str(params, "name")?.to_string();
        let description = params.get("description").and_then(Value::as_str).unwrap_or_default().to_string();
        let assigned_agent_id = params.get("assigned_agent_id").and_then(Value::as_str).map(str::to_string);
        let created = self.branches.create(owner_user_id, NewBranch { project_id, name, description, assigned_agent_id }).await?;
        let value = json!(created);
        self.publish(EntityType::Branch, created.id, owner_user_id, "create", &value, &[]).await;
        Ok(value)
    }

    async fn do_get_branch(&self, owner_user_id: &str, params: &Map<String, Value>) -> CoreResult<Value> {
        let id = require_id(params, "id")?;
        let branch = self.branches.get_by_id(owner_user_id, id).await?.ok_or_else(|| OrchestratorError::not_found("Branch", id))?;
        Ok(json!(branch))
    }

    async fn do_update_branch(&self, owner_user_id: &str, params: &Map<String, Value>) -> CoreResult<Value> {
        let id = require_id(params, "id")?;
        let updates = UpdateBranch {
            name: params.get("name").and_then(Value::as_str).map(str::to_string),
            description: params.get("description").and_then(Value::as_str).map(str::to_string),
            assigned_agent_id: params.get("assigned_agent_id").map(|v| v.as_str().map(str::to_string)),
        };
        let updated = self.branches.update(owner_user_id, id, updates).await?;
        let value = json!(updated);
        self.publish(EntityType::Branch, id, owner_user_id, "update", &value, &[]).await;
        Ok(value)
    }

    async fn do_delete_branch(&self, owner_user_id: &str, params: &Map<String, Value>) -> CoreResult<Value> {
        let id = require_id(params, "id")?;
        let affected = self.branches.delete(owner_user_id, id).await?;
        self.publish(EntityType::Branch, id, owner_user_id, "delete", &json!({"id": id}), &[]).await;
        Ok(json!({ "deleted": affected }))
    }

    // --- manage_task ---

    pub async fn manage_task(&self, owner_user_id: &str, agent_id: Option<&str>, action: &str, params: Value, profile: ResponseProfile) -> Value {
        let params = param_map(params);
        let action_key = format!("task.{action}");
        let recommendations = match self.check_enforcement(&action_key, agent_id, &params) {
            Ok(r) => r,
            Err(err) => return self.optimizer.error(profile, &err),
        };
        let body = match action {
            "create" => {
                let result = self.do_create_task(owner_user_id, &params).await;
                self.respond(profile, "task.create", None, result)
            }
            "update" => {
                let result = self.do_update_task(owner_user_id, &params).await;
                self.respond(profile, "task.update", None, result)
            }
            "get" => {
                let result = self.do_get_task(owner_user_id, &params).await;
                self.respond(profile, "task.get", None, result)
            }
            "delete" => {
                let result = self.do_delete_task(owner_user_id, &params).await;
                self.respond(profile, "task.delete", None, result)
            }
            "bulk_delete" => {
                let result = self.do_bulk_delete_tasks(owner_user_id, &params).await;
                self.respond(profile, "task.bulk_delete", None, result)
            }
            "complete" => {
                let result = self.do_complete_task(owner_user_id, &params).await;
                let hints = Some(Hints { next: Some("archive".to_string()), ..Default::default() });
                self.respond(profile, "task.complete", hints, result)
            }
            "list" => {
                let result = self.do_list_tasks(owner_user_id, &params).await;
                self.respond(profile, "task.list", None, result)
            }
            "list_minimal" => {
                let result = self.do_list_tasks_minimal(owner_user_id, &params).await;
                self.respond(profile, "task.list_minimal", None, result)
            }
            "search" => {
                let result = self.do_search_tasks(owner_user_id, &params).await;
                self.respond(profile, "task.search", None, result)
            }
            "next" => {
                let result = self.tasks.next(owner_user_id).await.map(|t| json!(t));
                self.respond(profile, "task.next", None, result)
            }
            "add_dependency" => {
                let result = self.do_add_dependency(owner_user_id, &params).await;
                self.respond(profile, "task.add_dependency", None, result)
            }
            "remove_dependency" => {
                let result = self.do_remove_dependency(owner_user_id, &params).await;
                self.respond(profile, "task.remove_dependency", None, result)
            }
            other => self.unknown_action(profile, "manage_task", other),
        };
        Self::attach_recommendations(profile, body, &recommendations)
    }

    async fn do_create_task(&self, owner_user_id: &str, params: &Map<String, Value>) -> CoreResult<Value> {
        let branch_id = require_id(params, "branch_id")?;
        let title = require_str(params, "title")?.to_string();
        let description = params.get("description").and_then(Value::as_str).unwrap_or_default().to_string();
        let priority = parse_priority(params, "priority")?.unwrap_or(Priority::Medium);
        let assignee_ids = coerce_string_list(params, "assignee_ids");
        let label_ids = self.resolve_label_names(&coerce_string_list(params, "label_ids")).await?;
        let due_date = params.get("due_date").and_then(Value::as_str).and_then(|s| s.parse().ok());
        let estimated_effort = params.get("estimated_effort").and_then(Value::as_i64).map(|v| v as i32);
        let agent_role_label = params.get("agent_role_label").and_then(Value::as_str).map(str::to_string);
        let created = self
            .tasks
            .create(
                owner_user_id,
                NewTask { branch_id, title, description, priority, assignee_ids, label_ids, due_date, estimated_effort, agent_role_label },
            )
            .await?;
        let value = json!(created);
        self.publish(EntityType::Task, created.id, owner_user_id, "create", &value, &created.assignee_ids).await;
        Ok(value)
    }

    async fn do_update_task(&self, owner_user_id: &str, params: &Map<String, Value>) -> CoreResult<Value> {
        let id = require_id(params, "id")?;
        let expected_version = params.get("expected_version").and_then(Value::as_i64).map(|v| v as i32);
        let updates = UpdateTask {
            title: params.get("title").and_then(Value::as_str).map(str::to_string),
            description: params.get("description").and_then(Value::as_str).map(str::to_string),
            priority: parse_priority(params, "priority")?,
            assignee_ids: if params.contains_key("assignee_ids") { Some(coerce_string_list(params, "assignee_ids")) } else { None },
            label_ids: if params.contains_key("label_ids") {
                Some(self.resolve_label_names(&coerce_string_list(params, "label_ids")).await?)
            } else {
                None
            },
            due_date: if params.contains_key("due_date") {
                Some(params.get("due_date").and_then(Value::as_str).and_then(|s| s.parse().ok()))
            } else {
                None
            },
            estimated_effort: if params.contains_key("estimated_effort") {
                Some(params.get("estimated_effort").and_then(Value::as_i64).map(|v| v as i32))
            } else {
                None
            },
        };
        let mut updated = self.tasks.update(owner_user_id, id, updates, expected_version).await?;
        if let (Some(notes), Some(progress)) = (
            params.get("work_notes").and_then(Value::as_str),
            params.get("progress_made").and_then(Value::as_str),
        ) {
            let mut content = format!("{progress}\n{notes}");
            if let Some(files) = params.get("files_modified").and_then(Value::as_str) {
                content.push_str(&format!("\nfiles_modified: {files}"));
            }
            if let Some(blockers) = params.get("blockers_encountered").and_then(Value::as_str) {
                content.push_str(&format!("\nblockers_encountered: {blockers}"));
            }
            updated = self.tasks.add_progress(owner_user_id, id, content).await?;
        }
        let value = json!(updated);
        self.publish(EntityType::Task, id, owner_user_id, "update", &value, &updated.assignee_ids).await;
        Ok(value)
    }

    async fn do_get_task(&self, owner_user_id: &str, params: &Map<String, Value>) -> CoreResult<Value> {
        let id = require_id(params, "id")?;
        Ok(json!(self.tasks.get(owner_user_id, id).await?))
    }

    async fn do_delete_task(&self, owner_user_id: &str, params: &Map<String, Value>) -> CoreResult<Value> {
        let id = require_id(params, "id")?;
        let affected = self.tasks.delete(owner_user_id, id).await?;
        self.publish(EntityType::Task, id, owner_user_id, "delete", &json!({"id": id}), &[]).await;
        Ok(json!({ "deleted": affected }))
    }

    async fn do_complete_task(&self, owner_user_id: &str, params: &Map<String, Value>) -> CoreResult<Value> {
        let id = require_id(params, "id")?;
        let summary = params.get("completion_summary").and_then(Value::as_str).map(str::to_string);
        let completed = self.tasks.complete(owner_user_id, id, summary).await?;
        let value = json!(completed);
        self.publish(EntityType::Task, id, owner_user_id, "complete", &value, &completed.assignee_ids).await;
        Ok(value)
    }

    fn build_task_filter(&self, params: &Map<String, Value>) -> CoreResult<TaskFilter> {
        Ok(TaskFilter {
            branch_id: optional_id(params, "branch_id")?,
            status: parse_status(params, "status")?,
            priority: parse_priority(params, "priority")?,
            assignee_id: params.get("assignee_id").and_then(Value::as_str).map(str::to_string),
            label: optional_id(params, "label")?,
            limit: params.get("limit").and_then(Value::as_u64).map(|v| v as u32),
            offset: params.get("offset").and_then(Value::as_u64).map(|v| v as u32),
        })
    }

    async fn do_list_tasks(&self, owner_user_id: &str, params: &Map<String, Value>) -> CoreResult<Value> {
        let filter = self.build_task_filter(params)?;
        Ok(json!(self.tasks.list(owner_user_id, filter).await?))
    }

    /// Scalar-only projection for high-frequency browsing (§4.5); skips
    /// loading association tables.
    async fn do_list_tasks_minimal(&self, owner_user_id: &str, params: &Map<String, Value>) -> CoreResult<Value> {
        let filter = self.build_task_filter(params)?;
        Ok(json!(self.tasks.list_minimal(owner_user_id, filter).await?))
    }

    async fn do_bulk_delete_tasks(&self, owner_user_id: &str, params: &Map<String, Value>) -> CoreResult<Value> {
        let ids: Vec<Id> = coerce_list(params.get("ids").unwrap_or(&Value::Null))
            .into_iter()
            .filter_map(|v| v.as_str().and_then(|s| Uuid::parse_str(s).ok()))
            .collect();
        let affected = self.tasks.bulk_delete(owner_user_id, &ids).await?;
        for id in &ids {
            self.publish(EntityType::Task, *id, owner_user_id, "delete", &json!({"id": id}), &[]).await;
        }
        Ok(json!({ "deleted": affected }))
    }

    /// No full-text index exists below C6; `search` lists by the structural
    /// filter then keeps rows whose title/description contains `query`.
    async fn do_search_tasks(&self, owner_user_id: &str, params: &Map<String, Value>) -> CoreResult<Value> {
        let query = require_str(params, "query")?.to_ascii_lowercase();
        let filter = self.build_task_filter(params)?;
        let matches: Vec<_> = self
            .tasks
            .list(owner_user_id, filter)
            .await?
            .into_iter()
            .filter(|t| t.title.to_ascii_lowercase().contains(&query) || t.description.to_ascii_lowercase().contains(&query))
            .collect();
        Ok(json!(matches))
    }

    async fn do_add_dependency(&self, owner_user_id: &str, params: &Map<String, Value>) -> CoreResult<Value> {
        let task_id = require_id(params, "task_id")?;
        let depends_on_task_id = require_id(params, "depends_on_task_id")?;
        self.tasks.add_dependency(owner_user_id, task_id, depends_on_task_id).await?;
        let value = json!({ "task_id": task_id, "depends_on_task_id": depends_on_task_id });
        self.publish(EntityType::Task, task_id, owner_user_id, "add_dependency", &value, &[]).await;
        Ok(value)
    }

    async fn do_remove_dependency(&self, owner_user_id: &str, params: &Map<String, Value>) -> CoreResult<Value> {
        let task_id = require_id(params, "task_id")?;
        let depends_on_task_id = require_id(params, "depends_on_task_id")?;
        self.tasks.remove_dependency(owner_user_id, task_id, depends_on_task_id).await?;
        let value = json!({ "task_id": task_id, "depends_on_task_id": depends_on_task_id });
        self.publish(EntityType::Task, task_id, owner_user_id, "remove_dependency", &value, &[]).await;
        Ok(value)
    }

    // --- manage_subtask ---

    pub async fn manage_subtask(&self, owner_user_id: &str, agent_id: Option<&str>, action: &str, params: Value, profile: ResponseProfile) -> Value {
        let params = param_map(params);
        let action_key = format!("subtask.{action}");
        let recommendations = match self.check_enforcement(&action_key, agent_id, &params) {
            Ok(r) => r,
            Err(err) => return self.optimizer.error(profile, &err),
        };
        let body = match action {
            "create" => {
                let result = self.do_create_subtask(owner_user_id, &params).await;
                self.respond(profile, "subtask.create", None, result)
            }
            "update" => {
                let result = self.do_update_subtask(owner_user_id, &params).await;
                self.respond(profile, "subtask.update", None, result)
            }
            "get" => {
                let result = self.do_get_subtask(owner_user_id, &params).await;
                self.respond(profile, "subtask.get", None, result)
            }
            "delete" => {
                let result = self.do_delete_subtask(owner_user_id, &params).await;
                self.respond(profile, "subtask.delete", None, result)
            }
            "complete" => {
                let result = self.do_complete_subtask(owner_user_id, &params).await;
                self.respond(profile, "subtask.complete", None, result)
            }
            "list" => {
                let task_id = require_id(&params, "task_id");
                let result = match task_id {
                    Ok(task_id) => self.subtasks.list_by_task(owner_user_id, task_id).await.map(|v| json!(v)),
                    Err(err) => Err(err),
                };
                self.respond(profile, "subtask.list", None, result)
            }
            other => self.unknown_action(profile, "manage_subtask", other),
        };
        Self::attach_recommendations(profile, body, &recommendations)
    }

    async fn do_create_subtask(&self, owner_user_id: &str, params: &Map<String, Value>) -> CoreResult<Value> {
        let task_id = require_id(params, "task_id")?;
        let title = require_str(params, "title")?.to_string();
        let description = params.get("description").and_then(Value::as_str).unwrap_or_default().to_string();
        let priority = parse_priority(params, "priority")?.unwrap_or(Priority::Medium);
        let assignee_ids = coerce_string_list(params, "assignee_ids");
        let progress_percentage = params.get("progress_percentage").and_then(Value::as_u64).unwrap_or(0) as u8;
        let created = self
            .tasks
            .create_subtask(owner_user_id, NewSubtask { task_id, title, description, priority, assignee_ids, progress_percentage })
            .await?;
        let value = json!(created);
        self.publish(EntityType::Subtask, created.id, owner_user_id, "create", &value, &created.assignee_ids).await;
        Ok(value)
    }

    async fn do_update_subtask(&self, owner_user_id: &str, params: &Map<String, Value>) -> CoreResult<Value> {
        let id = require_id(params, "id")?;
        let updates = UpdateSubtask {
            title: params.get("title").and_then(Value::as_str).map(str::to_string),
            description: params.get("description").and_then(Value::as_str).map(str::to_string),
            priority: parse_priority(params, "priority")?,
            assignee_ids: if params.contains_key("assignee_ids") { Some(coerce_string_list(params, "assignee_ids")) } else { None },
            progress_percentage: params.get("progress_percentage").and_then(Value::as_u64).map(|v| v as u8),
        };
        let updated = self.tasks.update_subtask(owner_user_id, id, updates).await?;
        let value = json!(updated);
        self.publish(EntityType::Subtask, id, owner_user_id, "update", &value, &updated.assignee_ids).await;
        Ok(value)
    }

    async fn do_get_subtask(&self, owner_user_id: &str, params: &Map<String, Value>) -> CoreResult<Value> {
        let id = require_id(params, "id")?;
        let subtask = self.subtasks.get_by_id(owner_user_id, id).await?.ok_or_else(|| OrchestratorError::not_found("Subtask", id))?;
        Ok(json!(subtask))
    }

    async fn do_delete_subtask(&self, owner_user_id: &str, params: &Map<String, Value>) -> CoreResult<Value> {
        let id = require_id(params, "id")?;
        let affected = self.tasks.delete_subtask(owner_user_id, id).await?;
        self.publish(EntityType::Subtask, id, owner_user_id, "delete", &json!({"id": id}), &[]).await;
        Ok(json!({ "deleted": affected }))
    }

    async fn do_complete_subtask(&self, owner_user_id: &str, params: &Map<String, Value>) -> CoreResult<Value> {
        let id = require_id(params, "id")?;
        let completed = self.tasks.complete_subtask(owner_user_id, id).await?;
        let value = json!(completed);
        self.publish(EntityType::Subtask, id, owner_user_id, "complete", &value, &completed.assignee_ids).await;
        Ok(value)
    }

    // --- manage_context ---

    pub async fn manage_context(&self, owner_user_id: &str, action: &str, params: Value, profile: ResponseProfile) -> Value {
        let params = param_map(params);
        match action {
            "create" => {
                let result = self.do_create_context(owner_user_id, &params).await;
                self.respond(profile, "context.create", None, result)
            }
            "get" => {
                let result = self.do_get_context(owner_user_id, &params).await;
                self.respond(profile, "context.get", None, result)
            }
            "update" => {
                let result = self.do_update_context(owner_user_id, &params).await;
                self.respond(profile, "context.update", None, result)
            }
            "delete" => {
                let result = self.do_delete_context(owner_user_id, &params).await;
                self.respond(profile, "context.delete", None, result)
            }
            "resolve" => {
                let result = self.do_resolve_context(owner_user_id, &params).await;
                self.respond(profile, "context.resolve", None, result)
            }
            "delegate" => {
                let result = self.do_delegate_context(owner_user_id, &params).await;
                self.respond(profile, "context.delegate", None, result)
            }
            "apply_delegation" => {
                let result = self.do_apply_delegation(owner_user_id, &params).await;
                self.respond(profile, "context.apply_delegation", None, result)
            }
            "add_insight" => {
                let result = self.do_add_insight(owner_user_id, &params).await;
                self.respond(profile, "context.add_insight", None, result)
            }
            "add_progress" => {
                let result = self.do_add_context_progress(owner_user_id, &params).await;
                self.respond(profile, "context.add_progress", None, result)
            }
            "list" => {
                let level = parse_level(&params);
                let result = match level {
                    Ok(level) => {
                        let limit = optional_u32(&params, "limit", 50);
                        let offset = optional_u32(&params, "offset", 0);
                        self.contexts.list(level, owner_user_id, limit, offset).await.map(|v| json!(v))
                    }
                    Err(err) => Err(err),
                };
                self.respond(profile, "context.list", None, result)
            }
            other => self.unknown_action(profile, "manage_context", other),
        }
    }

    async fn do_create_context(&self, owner_user_id: &str, params: &Map<String, Value>) -> CoreResult<Value> {
        let level = parse_level(params)?;
        let id = require_id(params, "id")?;
        let data = coerce_json_object(params.get("data").unwrap_or(&Value::Null)).unwrap_or_default();
        let parent_hint = optional_id(params, "parent_hint")?;
        if level == ContextLevel::Global {
            let global = self.contexts.get_global(owner_user_id).await?;
            return Ok(json!(global));
        }
        let extras = parse_extras(params, "extras")?.unwrap_or_default();
        let inheritance_disabled = params.get("inheritance_disabled").and_then(Value::as_bool).unwrap_or(false);
        let created = self
            .contexts
            .create(level, id, owner_user_id, data, parent_hint, extras, inheritance_disabled)
            .await?;
        let value = context_record_json(&created);
        self.publish(EntityType::Context, id, owner_user_id, "create", &value, &[]).await;
        Ok(value)
    }

    async fn do_get_context(&self, owner_user_id: &str, params: &Map<String, Value>) -> CoreResult<Value> {
        let level = parse_level(params)?;
        if level == ContextLevel::Global {
            return Ok(json!(self.contexts.get_global(owner_user_id).await?));
        }
        let id = require_id(params, "id")?;
        let include_inherited = params.get("include_inherited").and_then(Value::as_bool).unwrap_or(false);
        let record = self.contexts.get(level, id, owner_user_id, include_inherited).await?;
        Ok(context_record_json(&record))
    }

    async fn do_update_context(&self, owner_user_id: &str, params: &Map<String, Value>) -> CoreResult<Value> {
        let level = parse_level(params)?;
        let expected_version = params.get("expected_version").and_then(Value::as_i64).map(|v| v as i32);
        let data_patch = params.get("data").and_then(|v| coerce_json_object(v));
        if level == ContextLevel::Global {
            let global = self.contexts.update_global(owner_user_id, data_patch.unwrap_or_default(), expected_version).await?;
            return Ok(json!(global));
        }
        let id = require_id(params, "id")?;
        let overrides_patch = params.get("overrides").and_then(|v| coerce_json_object(v));
        let propagate_changes = params.get("propagate_changes").and_then(Value::as_bool).unwrap_or(true);
        let extras_patch = parse_extras(params, "extras")?;
        let inheritance_disabled_patch = params.get("inheritance_disabled").and_then(Value::as_bool);
        let record = self
            .contexts
            .update(
                level,
                id,
                owner_user_id,
                data_patch,
                overrides_patch,
                expected_version,
                propagate_changes,
                extras_patch,
                inheritance_disabled_patch,
            )
            .await?;
        let value = context_record_json(&record);
        self.publish(EntityType::Context, id, owner_user_id, "update", &value, &[]).await;
        Ok(value)
    }

    async fn do_delete_context(&self, owner_user_id: &str, params: &Map<String, Value>) -> CoreResult<Value> {
        let level = parse_level(params)?;
        let id = require_id(params, "id")?;
        let affected = self.contexts.delete(level, id, owner_user_id).await?;
        self.publish(EntityType::Context, id, owner_user_id, "delete", &json!({"id": id}), &[]).await;
        Ok(json!({ "deleted": affected }))
    }

    async fn do_resolve_context(&self, owner_user_id: &str, params: &Map<String, Value>) -> CoreResult<Value> {
        let level = parse_level(params)?;
        let id = if level == ContextLevel::Global { Uuid::nil() } else { require_id(params, "id")? };
        let force_refresh = params.get("force_refresh").and_then(Value::as_bool).unwrap_or(false);
        let record = self.contexts.resolve(level, id, owner_user_id, force_refresh).await?;
        Ok(json!({ "level": record.level, "id": record.id, "data": record.data, "version": record.version }))
    }

    async fn do_delegate_context(&self, owner_user_id: &str, params: &Map<String, Value>) -> CoreResult<Value> {
        let source_level = level_from_str("source_level", require_str(params, "source_level")?)?;
        let target_level = level_from_str("target_level", require_str(params, "target_level")?)?;
        let source_id = require_id(params, "source_id")?;
        let target_id = require_id(params, "target_id")?;
        let payload = params.get("payload").cloned().unwrap_or(Value::Null);
        let reason = params.get("reason").and_then(Value::as_str).unwrap_or_default().to_string();
        let request = self.contexts.delegate(source_level, source_id, target_level, target_id, owner_user_id, payload, reason).await?;
        Ok(json!(request))
    }

    async fn do_apply_delegation(&self, owner_user_id: &str, params: &Map<String, Value>) -> CoreResult<Value> {
        let id = require_id(params, "id")?;
        let approve = params.get("approve").and_then(Value::as_bool).unwrap_or(false);
        let decided = self.contexts.apply_delegation(owner_user_id, id, approve).await?;
        let value = json!(decided);
        self.publish(EntityType::Context, decided.target_id, owner_user_id, "apply_delegation", &value, &[]).await;
        Ok(value)
    }

    async fn do_add_insight(&self, owner_user_id: &str, params: &Map<String, Value>) -> CoreResult<Value> {
        let level = parse_level(params)?;
        let id = require_id(params, "id")?;
        let content = require_str(params, "content")?.to_string();
        let category = match params.get("category").and_then(Value::as_str) {
            Some(raw) => Some(serde_json::from_value::<InsightCategory>(json!(raw)).map_err(|_| OrchestratorError::validation("category", "unknown category"))?),
            None => None,
        };
        let importance = match params.get("importance").and_then(Value::as_str) {
            Some(raw) => Some(serde_json::from_value::<InsightImportance>(json!(raw)).map_err(|_| OrchestratorError::validation("importance", "unknown importance"))?),
            None => None,
        };
        let agent = params.get("agent").and_then(Value::as_str).map(str::to_string);
        let record = self.contexts.add_insight(level, id, owner_user_id, content, category, importance, agent).await?;
        let value = json!({ "level": record.level, "id": record.id, "data": record.data, "version": record.version });
        self.publish(EntityType::Context, id, owner_user_id, "add_insight", &value, &[]).await;
        Ok(value)
    }

    async fn do_add_context_progress(&self, owner_user_id: &str, params: &Map<String, Value>) -> CoreResult<Value> {
        let level = parse_level(params)?;
        let id = require_id(params, "id")?;
        let content = require_str(params, "content")?.to_string();
        let agent = params.get("agent").and_then(Value::as_str).map(str::to_string);
        let record = self.contexts.add_progress(level, id, owner_user_id, content, agent).await?;
        let value = json!({ "level": record.level, "id": record.id, "data": record.data, "version": record.version });
        self.publish(EntityType::Context, id, owner_user_id, "add_progress", &value, &[]).await;
        Ok(value)
    }

    // --- manage_agent ---

    pub async fn manage_agent(&self, owner_user_id: &str, action: &str, params: Value, profile: ResponseProfile) -> Value {
        let params = param_map(params);
        match action {
            "register" => {
                let display_name = require_str(&params, "display_name").map(str::to_string);
                let result = match display_name {
                    Ok(display_name) => Ok(json!(self.agents.register(display_name))),
                    Err(err) => Err(err),
                };
                self.respond(profile, "agent.register", None, result)
            }
            "assign_to_branch" => {
                let result = self.do_assign_agent(owner_user_id, &params).await;
                self.respond(profile, "agent.assign_to_branch", None, result)
            }
            "unassign" => {
                let result = self.do_unassign_agent(owner_user_id, &params).await;
                self.respond(profile, "agent.unassign", None, result)
            }
            "list" => {
                let result: CoreResult<Value> = Ok(json!(self.agents.list()));
                self.respond(profile, "agent.list", None, result)
            }
            other => self.unknown_action(profile, "manage_agent", other),
        }
    }

    async fn do_assign_agent(&self, owner_user_id: &str, params: &Map<String, Value>) -> CoreResult<Value> {
        let branch_id = require_id(params, "branch_id")?;
        let agent_id = require_str(params, "agent_id")?.to_string();
        let updates = UpdateBranch { name: None, description: None, assigned_agent_id: Some(Some(agent_id)) };
        let updated = self.branches.update(owner_user_id, branch_id, updates).await?;
        let value = json!(updated);
        self.publish(EntityType::Branch, branch_id, owner_user_id, "assign_agent", &value, &[]).await;
        Ok(value)
    }

    async fn do_unassign_agent(&self, owner_user_id: &str, params: &Map<String, Value>) -> CoreResult<Value> {
        let branch_id = require_id(params, "branch_id")?;
        let updates = UpdateBranch { name: None, description: None, assigned_agent_id: Some(None) };
        let updated = self.branches.update(owner_user_id, branch_id, updates).await?;
        let value = json!(updated);
        self.publish(EntityType::Branch, branch_id, owner_user_id, "unassign_agent", &value, &[]).await;
        Ok(value)
    }

    fn unknown_action(&self, profile: ResponseProfile, command: &str, action: &str) -> Value {
        self.optimizer.error(profile, &OrchestratorError::validation("action", format!("unknown {command} action '{action}'")))
    }
}
