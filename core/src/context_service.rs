//! C4: four-tier hierarchical Context CRUD, inheritance resolution,
//! delegation, and insight/progress logging.
//!
//! Tiers are a fixed 4-level DAG (Global → Project → Branch → Task); there
//! are no user-defined edges, so inheritance merges are pure functions of
//! the path (§9). This service is generic over the four context
//! repositories plus the [`CacheLayer`], and asks the primary aggregate
//! repositories (`BranchRepository`/`TaskRepository`) for parent ids when it
//! needs to auto-create a missing ancestor.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};

use crate::cache::CacheLayer;
use crate::error::{OrchestratorError, Result};
use crate::models::{
    BranchContext, ContextExtras, ContextLevel, DelegationRequest, DelegationStatus, GlobalContext,
    Id, InsightCategory, InsightImportance, ProjectContext, TaskContext,
};
use crate::repository::{
    BranchContextRepository, BranchRepository, DelegationRepository, GlobalContextRepository,
    ProjectContextRepository, TaskContextRepository, TaskRepository,
};

/// Unified view over any of the three identified tiers (Project/Branch/Task).
/// Global is addressed by `user_id` directly and has its own accessors since
/// it carries no `id` of its own.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextRecord {
    pub level: ContextLevel,
    pub id: Id,
    pub data: Map<String, Value>,
    pub overrides: Map<String, Value>,
    pub version: i32,
    pub extras: ContextExtras,
    pub inheritance_disabled: bool,
}

/// Deep-merge two maps, `overlay` shadowing `base`, recursing into nested
/// objects so lower tiers only replace the keys they actually set.
fn deep_merge(base: &Map<String, Value>, overlay: &Map<String, Value>) -> Map<String, Value> {
    let mut result = base.clone();
    for (k, v) in overlay {
        match (result.get(k), v) {
            (Some(Value::Object(existing)), Value::Object(new)) => {
                result.insert(k.clone(), Value::Object(deep_merge(existing, new)));
            }
            _ => {
                result.insert(k.clone(), v.clone());
            }
        }
    }
    result
}

pub struct ContextService {
    global_repo: Arc<dyn GlobalContextRepository>,
    project_repo: Arc<dyn ProjectContextRepository>,
    branch_repo: Arc<dyn BranchContextRepository>,
    task_repo: Arc<dyn TaskContextRepository>,
    delegation_repo: Arc<dyn DelegationRepository>,
    branches: Arc<dyn BranchRepository>,
    tasks: Arc<dyn TaskRepository>,
    cache: Arc<CacheLayer>,
}

impl ContextService {
    pub fn new(
        global_repo: Arc<dyn GlobalContextRepository>,
        project_repo: Arc<dyn ProjectContextRepository>,
        branch_repo: Arc<dyn BranchContextRepository>,
        task_repo: Arc<dyn TaskContextRepository>,
        delegation_repo: Arc<dyn DelegationRepository>,
        branches: Arc<dyn BranchRepository>,
        tasks: Arc<dyn TaskRepository>,
        cache: Arc<CacheLayer>,
    ) -> Self {
        Self {
            global_repo,
            project_repo,
            branch_repo,
            task_repo,
            delegation_repo,
            branches,
            tasks,
            cache,
        }
    }

    pub async fn get_global(&self, user_id: &str) -> Result<GlobalContext> {
        self.global_repo.get_or_create(user_id).await
    }

    pub async fn update_global(
        &self,
        user_id: &str,
        settings_patch: Map<String, Value>,
        expected_version: Option<i32>,
    ) -> Result<GlobalContext> {
        let updated = self
            .global_repo
            .update(user_id, settings_patch, expected_version)
            .await?;
        self.cache
            .invalidate(&CacheLayer::context_key("global", user_id, user_id))
            .await;
        Ok(updated)
    }

    async fn project_of(&self, owner_user_id: &str, branch_id: Id) -> Result<Id> {
        let branch = self
            .branches
            .get_by_id(owner_user_id, branch_id)
            .await?
            .ok_or_else(|| OrchestratorError::not_found("Branch", branch_id))?;
        Ok(branch.project_id)
    }

    async fn branch_of(&self, owner_user_id: &str, task_id: Id) -> Result<Id> {
        let task = self
            .tasks
            .get_by_id(owner_user_id, task_id)
            .await?
            .ok_or_else(|| OrchestratorError::not_found("Task", task_id))?;
        Ok(task.branch_id)
    }

    /// Creates a context row at `level`/`id`, auto-creating missing
    /// ancestors for the same user. `parent_hint` supplies the immediate
    /// parent id for Branch (its `project_id`) or Task (its `branch_id`)
    /// creation, since the context row itself doesn't exist yet to read it
    /// from. `extras`/`inheritance_disabled` seed the row's own supplemental
    /// fields; ancestors auto-created along the way always get the default.
    pub async fn create(
        &self,
        level: ContextLevel,
        id: Id,
        owner_user_id: &str,
        data: Map<String, Value>,
        parent_hint: Option<Id>,
        extras: ContextExtras,
        inheritance_disabled: bool,
    ) -> Result<ContextRecord> {
        match level {
            ContextLevel::Global => Err(OrchestratorError::validation(
                "level",
                "global context is singleton per user; use get_global",
            )),
            ContextLevel::Project => {
                self.global_repo.get_or_create(owner_user_id).await?;
                let created = self
                    .project_repo
                    .create(owner_user_id, id, data, true, extras, inheritance_disabled)
                    .await?;
                Ok(project_to_record(&created))
            }
            ContextLevel::Branch => {
                let project_id = match parent_hint {
                    Some(p) => p,
                    None => self.project_of(owner_user_id, id).await?,
                };
                self.ensure_project_context(owner_user_id, project_id).await?;
                let created = self
                    .branch_repo
                    .create(owner_user_id, id, project_id, data, extras, inheritance_disabled)
                    .await?;
                Ok(branch_to_record(&created))
            }
            ContextLevel::Task => {
                let branch_id = match parent_hint {
                    Some(b) => b,
                    None => self.branch_of(owner_user_id, id).await?,
                };
                self.ensure_branch_context(owner_user_id, branch_id).await?;
                let created = self
                    .task_repo
                    .create(owner_user_id, id, branch_id, data, extras, inheritance_disabled)
                    .await?;
                Ok(task_to_record(&created))
            }
        }
    }

    async fn ensure_project_context(&self, owner_user_id: &str, project_id: Id) -> Result<()> {
        if self.project_repo.get(owner_user_id, project_id).await?.is_none() {
            self.global_repo.get_or_create(owner_user_id).await?;
            self.project_repo
                .create(owner_user_id, project_id, Map::new(), true, ContextExtras::default(), false)
                .await?;
        }
        Ok(())
    }

    async fn ensure_branch_context(&self, owner_user_id: &str, branch_id: Id) -> Result<()> {
        if self.branch_repo.get(owner_user_id, branch_id).await?.is_none() {
            let project_id = self.project_of(owner_user_id, branch_id).await?;
            self.ensure_project_context(owner_user_id, project_id).await?;
            self.branch_repo
                .create(owner_user_id, branch_id, project_id, Map::new(), ContextExtras::default(), false)
                .await?;
        }
        Ok(())
    }

    pub async fn get(
        &self,
        level: ContextLevel,
        id: Id,
        owner_user_id: &str,
        include_inherited: bool,
    ) -> Result<ContextRecord> {
        if include_inherited {
            return self.resolve(level, id, owner_user_id, false).await;
        }
        match level {
            ContextLevel::Global => Err(OrchestratorError::validation("level", "use get_global")),
            ContextLevel::Project => self
                .project_repo
                .get(owner_user_id, id)
                .await?
                .map(|c| project_to_record(&c))
                .ok_or_else(|| OrchestratorError::not_found("ProjectContext", id)),
            ContextLevel::Branch => self
                .branch_repo
                .get(owner_user_id, id)
                .await?
                .map(|c| branch_to_record(&c))
                .ok_or_else(|| OrchestratorError::not_found("BranchContext", id)),
            ContextLevel::Task => self
                .task_repo
                .get(owner_user_id, id)
                .await?
                .map(|c| task_to_record(&c))
                .ok_or_else(|| OrchestratorError::not_found("TaskContext", id)),
        }
    }

    /// Partial field updates deep-merge at depth 1 into `data`; `overrides`
    /// replaces wholesale. `extras_patch`/`inheritance_disabled_patch` replace
    /// those fields wholesale when present. Invalidates the entry's own
    /// cache keys and, if `propagate_changes`, the resolved-cache of every
    /// descendant tier too (best achieved by invalidating this tier's
    /// `context:` key, whose reverse-dependency fan-out the resolve path
    /// registers descendants against).
    #[allow(clippy::too_many_arguments)]
    pub async fn update(
        &self,
        level: ContextLevel,
        id: Id,
        owner_user_id: &str,
        data_patch: Option<Map<String, Value>>,
        overrides_patch: Option<Map<String, Value>>,
        expected_version: Option<i32>,
        propagate_changes: bool,
        extras_patch: Option<ContextExtras>,
        inheritance_disabled_patch: Option<bool>,
    ) -> Result<ContextRecord> {
        let record = match level {
            ContextLevel::Global => {
                return Err(OrchestratorError::validation("level", "use update_global"))
            }
            ContextLevel::Project => {
                let updated = self
                    .project_repo
                    .update(owner_user_id, id, data_patch, overrides_patch, expected_version, extras_patch, inheritance_disabled_patch)
                    .await?;
                project_to_record(&updated)
            }
            ContextLevel::Branch => {
                let updated = self
                    .branch_repo
                    .update(owner_user_id, id, data_patch, overrides_patch, expected_version, extras_patch, inheritance_disabled_patch)
                    .await?;
                branch_to_record(&updated)
            }
            ContextLevel::Task => {
                let updated = self
                    .task_repo
                    .update(owner_user_id, id, data_patch, overrides_patch, expected_version, extras_patch, inheritance_disabled_patch)
                    .await?;
                task_to_record(&updated)
            }
        };
        let key = CacheLayer::context_key(&level.to_string(), &id.to_string(), owner_user_id);
        self.cache.invalidate(&key).await;
        if propagate_changes {
            let resolved_key = CacheLayer::resolved_context_key(&level.to_string(), &id.to_string(), owner_user_id);
            self.cache.invalidate(&resolved_key).await;
        }
        tracing::debug!(level = %level, id = %id, version = record.version, "context updated");
        Ok(record)
    }

    /// Cascades to descendants in the *context* tree only, not the task tree.
    pub async fn delete(&self, level: ContextLevel, id: Id, owner_user_id: &str) -> Result<u64> {
        let affected = match level {
            ContextLevel::Global => {
                return Err(OrchestratorError::validation("level", "global context cannot be deleted"))
            }
            ContextLevel::Project => self.project_repo.delete(owner_user_id, id).await?,
            ContextLevel::Branch => self.branch_repo.delete(owner_user_id, id).await?,
            ContextLevel::Task => self.task_repo.delete(owner_user_id, id).await?,
        };
        let key = CacheLayer::context_key(&level.to_string(), &id.to_string(), owner_user_id);
        self.cache.invalidate(&key).await;
        Ok(affected)
    }

    /// Computes the inheritance chain root-down (Global → Project → Branch →
    /// Task), deep-merging `data` with lower tiers shadowing upper ones, then
    /// applying the owning tier's `overrides` last. Missing ancestors are
    /// auto-created empty for the caller. `force_refresh` bypasses and
    /// rewrites the resolved-cache entry.
    pub async fn resolve(
        &self,
        level: ContextLevel,
        id: Id,
        owner_user_id: &str,
        force_refresh: bool,
    ) -> Result<ContextRecord> {
        let cache_key = CacheLayer::resolved_context_key(&level.to_string(), &id.to_string(), owner_user_id);
        if !force_refresh {
            if let Some(cached) = self.cache.get(&cache_key).await {
                if let Ok(record) = serde_json::from_value::<CachedResolved>(cached) {
                    tracing::trace!(level = %level, id = %id, "resolve cache hit");
                    return Ok(record.into_record(level, id));
                }
            }
        }

        let global = self.global_repo.get_or_create(owner_user_id).await?;
        let mut merged = Map::new();
        for (k, v) in global.settings {
            merged.insert(k, v);
        }
        let mut deps: HashSet<String> = HashSet::new();
        deps.insert(CacheLayer::context_key("global", owner_user_id, owner_user_id));

        let (final_overrides, final_version) = match level {
            ContextLevel::Global => (Map::new(), global.version),
            ContextLevel::Project => {
                self.ensure_project_context(owner_user_id, id).await?;
                let ctx = self
                    .project_repo
                    .get(owner_user_id, id)
                    .await?
                    .expect("auto-created above");
                merged = if ctx.inheritance_disabled {
                    ctx.data.clone()
                } else {
                    deep_merge(&merged, &ctx.data)
                };
                deps.insert(CacheLayer::context_key("project", &id.to_string(), owner_user_id));
                (ctx.overrides, ctx.version)
            }
            ContextLevel::Branch => {
                let project_id = self.project_of(owner_user_id, id).await?;
                self.ensure_project_context(owner_user_id, project_id).await?;
                let project_ctx = self.project_repo.get(owner_user_id, project_id).await?;
                if let Some(p) = &project_ctx {
                    merged = deep_merge(&merged, &p.overrides);
                    merged = deep_merge(&merged, &p.data);
                    deps.insert(CacheLayer::context_key(
                        "project",
                        &project_id.to_string(),
                        owner_user_id,
                    ));
                }
                self.ensure_branch_context(owner_user_id, id).await?;
                let ctx = self
                    .branch_repo
                    .get(owner_user_id, id)
                    .await?
                    .expect("auto-created above");
                merged = if ctx.inheritance_disabled {
                    ctx.data.clone()
                } else {
                    deep_merge(&merged, &ctx.data)
                };
                deps.insert(CacheLayer::context_key("branch", &id.to_string(), owner_user_id));
                (ctx.overrides, ctx.version)
            }
            ContextLevel::Task => {
                let branch_id = self.branch_of(owner_user_id, id).await?;
                let project_id = self.project_of(owner_user_id, branch_id).await?;
                self.ensure_project_context(owner_user_id, project_id).await?;
                if let Some(p) = self.project_repo.get(owner_user_id, project_id).await? {
                    merged = deep_merge(&merged, &p.overrides);
                    merged = deep_merge(&merged, &p.data);
                    deps.insert(CacheLayer::context_key(
                        "project",
                        &project_id.to_string(),
                        owner_user_id,
                    ));
                }
                self.ensure_branch_context(owner_user_id, branch_id).await?;
                if let Some(b) = self.branch_repo.get(owner_user_id, branch_id).await? {
                    merged = deep_merge(&merged, &b.overrides);
                    merged = deep_merge(&merged, &b.data);
                    deps.insert(CacheLayer::context_key("branch", &branch_id.to_string(), owner_user_id));
                }
                self.ensure_task_context(owner_user_id, id, branch_id).await?;
                let ctx = self
                    .task_repo
                    .get(owner_user_id, id)
                    .await?
                    .expect("auto-created above");
                merged = if ctx.inheritance_disabled {
                    ctx.task_data.clone()
                } else {
                    deep_merge(&merged, &ctx.task_data)
                };
                deps.insert(CacheLayer::context_key("task", &id.to_string(), owner_user_id));
                (ctx.overrides, ctx.version)
            }
        };
        merged = deep_merge(&merged, &final_overrides);

        let record = ContextRecord {
            level,
            id,
            data: merged.clone(),
            overrides: final_overrides,
            version: final_version,
            extras: ContextExtras::default(),
            inheritance_disabled: false,
        };
        let cached = CachedResolved {
            data: merged,
            version: final_version,
        };
        self.cache
            .put(
                cache_key,
                serde_json::to_value(&cached).unwrap_or(Value::Null),
                None,
                deps,
            )
            .await;
        Ok(record)
    }

    async fn ensure_task_context(&self, owner_user_id: &str, task_id: Id, branch_id: Id) -> Result<()> {
        if self.task_repo.get(owner_user_id, task_id).await?.is_none() {
            self.task_repo
                .create(owner_user_id, task_id, branch_id, Map::new(), ContextExtras::default(), false)
                .await?;
        }
        Ok(())
    }

    /// Enqueues a pending [`DelegationRequest`]. `target_level` must be
    /// strictly above `source_level`; never mutates the source.
    pub async fn delegate(
        &self,
        source_level: ContextLevel,
        source_id: Id,
        target_level: ContextLevel,
        target_id: Id,
        owner_user_id: &str,
        payload: Value,
        reason: String,
    ) -> Result<DelegationRequest> {
        if target_level <= source_level {
            return Err(OrchestratorError::DelegationDirection(source_level));
        }
        let request = DelegationRequest {
            id: uuid::Uuid::new_v4(),
            owner_user_id: owner_user_id.to_string(),
            source_level,
            source_id,
            target_level,
            target_id,
            payload,
            reason,
            status: DelegationStatus::Pending,
            created_at: Utc::now(),
            decided_at: None,
        };
        self.delegation_repo.create(request).await
    }

    /// Applies (approve) or discards (reject) a pending delegation. On
    /// approve, deep-merges the payload into the target context and bumps
    /// its version.
    pub async fn apply_delegation(
        &self,
        owner_user_id: &str,
        id: Id,
        approve: bool,
    ) -> Result<DelegationRequest> {
        let request = self
            .delegation_repo
            .get(owner_user_id, id)
            .await?
            .ok_or_else(|| OrchestratorError::not_found("DelegationRequest", id))?;

        if approve {
            let patch = match request.payload.as_object() {
                Some(map) => map.clone(),
                None => Map::new(),
            };
            match request.target_level {
                ContextLevel::Global => {
                    self.update_global(owner_user_id, patch, None).await?;
                }
                ContextLevel::Project => {
                    self.update(
                        ContextLevel::Project,
                        request.target_id,
                        owner_user_id,
                        Some(patch),
                        None,
                        None,
                        true,
                        None,
                        None,
                    )
                    .await?;
                }
                ContextLevel::Branch => {
                    self.update(
                        ContextLevel::Branch,
                        request.target_id,
                        owner_user_id,
                        Some(patch),
                        None,
                        None,
                        true,
                        None,
                        None,
                    )
                    .await?;
                }
                ContextLevel::Task => {
                    self.update(
                        ContextLevel::Task,
                        request.target_id,
                        owner_user_id,
                        Some(patch),
                        None,
                        None,
                        true,
                        None,
                        None,
                    )
                    .await?;
                }
            }
        }

        let status = if approve {
            DelegationStatus::Approved
        } else {
            DelegationStatus::Rejected
        };
        tracing::info!(delegation_id = %id, target_level = %request.target_level, approved = approve, "delegation decided");
        self.delegation_repo.decide(owner_user_id, id, status).await
    }

    pub async fn add_insight(
        &self,
        level: ContextLevel,
        id: Id,
        owner_user_id: &str,
        content: String,
        category: Option<InsightCategory>,
        importance: Option<InsightImportance>,
        agent: Option<String>,
    ) -> Result<ContextRecord> {
        let entry = serde_json::json!({
            "content": content,
            "category": category,
            "importance": importance,
            "agent": agent,
            "timestamp": Utc::now(),
        });
        self.append_to_list(level, id, owner_user_id, "insights", entry).await
    }

    pub async fn add_progress(
        &self,
        level: ContextLevel,
        id: Id,
        owner_user_id: &str,
        content: String,
        agent: Option<String>,
    ) -> Result<ContextRecord> {
        let entry = serde_json::json!({
            "content": content,
            "agent": agent,
            "timestamp": Utc::now(),
        });
        self.append_to_list(level, id, owner_user_id, "progress_log", entry).await
    }

    async fn append_to_list(
        &self,
        level: ContextLevel,
        id: Id,
        owner_user_id: &str,
        key: &str,
        entry: Value,
    ) -> Result<ContextRecord> {
        let current = self.get(level, id, owner_user_id, false).await?;
        let mut list = current
            .data
            .get(key)
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        list.push(entry);
        let mut patch = Map::new();
        patch.insert(key.to_string(), Value::Array(list));
        self.update(level, id, owner_user_id, Some(patch), None, None, true, None, None).await
    }

    pub async fn list(&self, level: ContextLevel, owner_user_id: &str, limit: u32, offset: u32) -> Result<Vec<ContextRecord>> {
        match level {
            ContextLevel::Global => Err(OrchestratorError::validation("level", "global context is singleton")),
            ContextLevel::Project => Ok(self
                .project_repo
                .list(owner_user_id, limit, offset)
                .await?
                .iter()
                .map(project_to_record)
                .collect()),
            ContextLevel::Branch => Ok(self
                .branch_repo
                .list(owner_user_id, limit, offset)
                .await?
                .iter()
                .map(branch_to_record)
                .collect()),
            ContextLevel::Task => Ok(self
                .task_repo
                .list(owner_user_id, limit, offset)
                .await?
                .iter()
                .map(task_to_record)
                .collect()),
        }
    }
}

#[derive(serde::Serialize, serde::Deserialize)]
struct CachedResolved {
    data: Map<String, Value>,
    version: i32,
}

impl CachedResolved {
    fn into_record(self, level: ContextLevel, id: Id) -> ContextRecord {
        ContextRecord {
            level,
            id,
            data: self.data,
            overrides: Map::new(),
            version: self.version,
            extras: ContextExtras::default(),
            inheritance_disabled: false,
        }
    }
}

fn project_to_record(c: &ProjectContext) -> ContextRecord {
    ContextRecord {
        level: ContextLevel::Project,
        id: c.project_id,
        data: c.data.clone(),
        overrides: c.overrides.clone(),
        version: c.version,
        extras: c.extras.clone(),
        inheritance_disabled: c.inheritance_disabled,
    }
}

fn branch_to_record(c: &BranchContext) -> ContextRecord {
    ContextRecord {
        level: ContextLevel::Branch,
        id: c.branch_id,
        data: c.data.clone(),
        overrides: c.overrides.clone(),
        version: c.version,
        extras: c.extras.clone(),
        inheritance_disabled: c.inheritance_disabled,
    }
}

fn task_to_record(c: &TaskContext) -> ContextRecord {
    ContextRecord {
        level: ContextLevel::Task,
        id: c.task_id,
        data: c.task_data.clone(),
        overrides: c.overrides.clone(),
        version: c.version,
        extras: c.extras.clone(),
        inheritance_disabled: c.inheritance_disabled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deep_merge_shadows_at_every_depth() {
        let mut base = Map::new();
        base.insert("settings".to_string(), json!({"theme": "dark", "lang": "en"}));
        let mut overlay = Map::new();
        overlay.insert("settings".to_string(), json!({"theme": "light"}));

        let merged = deep_merge(&base, &overlay);
        assert_eq!(merged["settings"]["theme"], json!("light"));
        assert_eq!(merged["settings"]["lang"], json!("en"));
    }
}
