//! Context tier repositories. Project/Branch/Task contexts share the same
//! version-column optimistic-concurrency pattern: bump `version`, `UPDATE
//! ... WHERE id = ? AND version = ?`, and on `rows_affected() == 0` issue a
//! follow-up existence check to tell `NotFound` apart from `Conflict` —
//! mirrored from the original workspace-context repository's CAS update.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use sqlx::Row;
use task_core::error::{OrchestratorError, Result};
use task_core::models::{BranchContext, ContextExtras, GlobalContext, Id, ProjectContext, TaskContext};
use task_core::repository::{BranchContextRepository, GlobalContextRepository, ProjectContextRepository, TaskContextRepository};

use crate::common::{map_sqlx_error, parse_json_object, to_json_text};

use super::Db;

fn merge_patch(base: &mut Map<String, Value>, patch: Map<String, Value>) {
    for (k, v) in patch {
        base.insert(k, v);
    }
}

#[derive(Debug, Clone)]
pub struct SqliteGlobalContextRepository {
    db: Db,
}

impl SqliteGlobalContextRepository {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

fn row_to_global(row: &sqlx::sqlite::SqliteRow) -> Result<GlobalContext> {
    let settings_raw: String = row.get("settings");
    Ok(GlobalContext {
        user_id: row.get("user_id"),
        organization_name: row.get("organization_name"),
        settings: parse_json_object(&settings_raw)?,
        version: row.get("version"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl GlobalContextRepository for SqliteGlobalContextRepository {
    async fn get_or_create(&self, user_id: &str) -> Result<GlobalContext> {
        if let Some(row) = sqlx::query(
            "SELECT user_id, organization_name, settings, version, created_at, updated_at FROM global_contexts WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(self.db.pool())
        .await
        .map_err(map_sqlx_error)?
        {
            return row_to_global(&row);
        }

        let now = Utc::now();
        sqlx::query(
            "INSERT INTO global_contexts (user_id, settings, version, created_at, updated_at) VALUES (?, '{}', 1, ?, ?)",
        )
        .bind(user_id)
        .bind(now)
        .bind(now)
        .execute(self.db.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(GlobalContext {
            user_id: user_id.to_string(),
            organization_name: None,
            settings: Map::new(),
            version: 1,
            created_at: now,
            updated_at: now,
        })
    }

    async fn update(&self, user_id: &str, settings_patch: Map<String, Value>, expected_version: Option<i32>) -> Result<GlobalContext> {
        let current = self.get_or_create(user_id).await?;

        if let Some(expected) = expected_version {
            if current.version != expected {
                return Err(OrchestratorError::Conflict { current_version: current.version });
            }
        }

        let mut settings = current.settings.clone();
        merge_patch(&mut settings, settings_patch);

        let result = sqlx::query(
            "UPDATE global_contexts SET settings = ?, version = version + 1, updated_at = ? WHERE user_id = ? AND version = ?",
        )
        .bind(to_json_text(&settings))
        .bind(Utc::now())
        .bind(user_id)
        .bind(current.version)
        .execute(self.db.pool())
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(OrchestratorError::Conflict { current_version: current.version });
        }

        self.get_or_create(user_id).await
    }
}

#[derive(Debug, Clone)]
pub struct SqliteProjectContextRepository {
    db: Db,
}

impl SqliteProjectContextRepository {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

fn row_to_project_context(row: &sqlx::sqlite::SqliteRow) -> Result<ProjectContext> {
    let data_raw: String = row.get("data");
    let overrides_raw: String = row.get("overrides");
    let extras_raw: String = row.get("extras");

    Ok(ProjectContext {
        project_id: row.get("project_id"),
        owner_user_id: row.get("owner_user_id"),
        data: parse_json_object(&data_raw)?,
        inherits_from_global: row.get::<i64, _>("inherits_from_global") != 0,
        overrides: parse_json_object(&overrides_raw)?,
        inheritance_disabled: row.get::<i64, _>("inheritance_disabled") != 0,
        extras: serde_json::from_str(&extras_raw).unwrap_or_default(),
        version: row.get("version"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl ProjectContextRepository for SqliteProjectContextRepository {
    async fn get(&self, owner_user_id: &str, project_id: Id) -> Result<Option<ProjectContext>> {
        let row = sqlx::query(
            "SELECT project_id, owner_user_id, data, inherits_from_global, overrides, inheritance_disabled, extras, version, created_at, updated_at \
             FROM project_contexts WHERE project_id = ? AND owner_user_id = ?",
        )
        .bind(project_id)
        .bind(owner_user_id)
        .fetch_optional(self.db.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(|r| row_to_project_context(&r)).transpose()
    }

    async fn create(
        &self,
        owner_user_id: &str,
        project_id: Id,
        data: Map<String, Value>,
        inherits_from_global: bool,
        extras: ContextExtras,
        inheritance_disabled: bool,
    ) -> Result<ProjectContext> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO project_contexts (project_id, owner_user_id, data, inherits_from_global, overrides, inheritance_disabled, extras, version, created_at, updated_at) \
             VALUES (?, ?, ?, ?, '{}', ?, ?, 1, ?, ?)",
        )
        .bind(project_id)
        .bind(owner_user_id)
        .bind(to_json_text(&data))
        .bind(inherits_from_global as i64)
        .bind(inheritance_disabled as i64)
        .bind(serde_json::to_string(&extras).unwrap_or_else(|_| "{}".to_string()))
        .bind(now)
        .bind(now)
        .execute(self.db.pool())
        .await
        .map_err(map_sqlx_error)?;

        self.get(owner_user_id, project_id)
            .await?
            .ok_or_else(|| OrchestratorError::Internal("just-inserted project context vanished".to_string()))
    }

    async fn update(
        &self,
        owner_user_id: &str,
        project_id: Id,
        data_patch: Option<Map<String, Value>>,
        overrides_patch: Option<Map<String, Value>>,
        expected_version: Option<i32>,
        extras_patch: Option<ContextExtras>,
        inheritance_disabled_patch: Option<bool>,
    ) -> Result<ProjectContext> {
        let current = self
            .get(owner_user_id, project_id)
            .await?
            .ok_or_else(|| OrchestratorError::not_found("ProjectContext", project_id))?;

        if let Some(expected) = expected_version {
            if current.version != expected {
                return Err(OrchestratorError::Conflict { current_version: current.version });
            }
        }

        let mut data = current.data.clone();
        if let Some(patch) = data_patch {
            merge_patch(&mut data, patch);
        }
        let mut overrides = current.overrides.clone();
        if let Some(patch) = overrides_patch {
            merge_patch(&mut overrides, patch);
        }
        let extras = extras_patch.unwrap_or(current.extras.clone());
        let inheritance_disabled = inheritance_disabled_patch.unwrap_or(current.inheritance_disabled);

        let result = sqlx::query(
            "UPDATE project_contexts SET data = ?, overrides = ?, inheritance_disabled = ?, extras = ?, version = version + 1, updated_at = ? \
             WHERE project_id = ? AND owner_user_id = ? AND version = ?",
        )
        .bind(to_json_text(&data))
        .bind(to_json_text(&overrides))
        .bind(inheritance_disabled as i64)
        .bind(serde_json::to_string(&extras).unwrap_or_else(|_| "{}".to_string()))
        .bind(Utc::now())
        .bind(project_id)
        .bind(owner_user_id)
        .bind(current.version)
        .execute(self.db.pool())
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return match self.get(owner_user_id, project_id).await? {
                Some(latest) => Err(OrchestratorError::Conflict { current_version: latest.version }),
                None => Err(OrchestratorError::not_found("ProjectContext", project_id)),
            };
        }

        self.get(owner_user_id, project_id)
            .await?
            .ok_or_else(|| OrchestratorError::not_found("ProjectContext", project_id))
    }

    async fn delete(&self, owner_user_id: &str, project_id: Id) -> Result<u64> {
        let result = sqlx::query("DELETE FROM project_contexts WHERE project_id = ? AND owner_user_id = ?")
            .bind(project_id)
            .bind(owner_user_id)
            .execute(self.db.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn list(&self, owner_user_id: &str, limit: u32, offset: u32) -> Result<Vec<ProjectContext>> {
        let rows = sqlx::query(
            "SELECT project_id, owner_user_id, data, inherits_from_global, overrides, inheritance_disabled, extras, version, created_at, updated_at \
             FROM project_contexts WHERE owner_user_id = ? ORDER BY created_at DESC LIMIT ? OFFSET ?",
        )
        .bind(owner_user_id)
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(self.db.pool())
        .await
        .map_err(map_sqlx_error)?;

        rows.iter().map(row_to_project_context).collect()
    }
}

#[derive(Debug, Clone)]
pub struct SqliteBranchContextRepository {
    db: Db,
}

impl SqliteBranchContextRepository {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

fn row_to_branch_context(row: &sqlx::sqlite::SqliteRow) -> Result<BranchContext> {
    let data_raw: String = row.get("data");
    let overrides_raw: String = row.get("overrides");
    let extras_raw: String = row.get("extras");

    Ok(BranchContext {
        branch_id: row.get("branch_id"),
        owner_user_id: row.get("owner_user_id"),
        parent_project_id: row.get("parent_project_id"),
        data: parse_json_object(&data_raw)?,
        overrides: parse_json_object(&overrides_raw)?,
        inheritance_disabled: row.get::<i64, _>("inheritance_disabled") != 0,
        extras: serde_json::from_str(&extras_raw).unwrap_or_default(),
        version: row.get("version"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl BranchContextRepository for SqliteBranchContextRepository {
    async fn get(&self, owner_user_id: &str, branch_id: Id) -> Result<Option<BranchContext>> {
        let row = sqlx::query(
            "SELECT branch_id, owner_user_id, parent_project_id, data, overrides, inheritance_disabled, extras, version, created_at, updated_at \
             FROM branch_contexts WHERE branch_id = ? AND owner_user_id = ?",
        )
        .bind(branch_id)
        .bind(owner_user_id)
        .fetch_optional(self.db.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(|r| row_to_branch_context(&r)).transpose()
    }

    async fn create(
        &self,
        owner_user_id: &str,
        branch_id: Id,
        parent_project_id: Id,
        data: Map<String, Value>,
        extras: ContextExtras,
        inheritance_disabled: bool,
    ) -> Result<BranchContext> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO branch_contexts (branch_id, owner_user_id, parent_project_id, data, overrides, inheritance_disabled, extras, version, created_at, updated_at) \
             VALUES (?, ?, ?, ?, '{}', ?, ?, 1, ?, ?)",
        )
        .bind(branch_id)
        .bind(owner_user_id)
        .bind(parent_project_id)
        .bind(to_json_text(&data))
        .bind(inheritance_disabled as i64)
        .bind(serde_json::to_string(&extras).unwrap_or_else(|_| "{}".to_string()))
        .bind(now)
        .bind(now)
        .execute(self.db.pool())
        .await
        .map_err(map_sqlx_error)?;

        self.get(owner_user_id, branch_id)
            .await?
            .ok_or_else(|| OrchestratorError::Internal("just-inserted branch context vanished".to_string()))
    }

    async fn update(
        &self,
        owner_user_id: &str,
        branch_id: Id,
        data_patch: Option<Map<String, Value>>,
        overrides_patch: Option<Map<String, Value>>,
        expected_version: Option<i32>,
        extras_patch: Option<ContextExtras>,
        inheritance_disabled_patch: Option<bool>,
    ) -> Result<BranchContext> {
        let current = self
            .get(owner_user_id, branch_id)
            .await?
            .ok_or_else(|| OrchestratorError::not_found("BranchContext", branch_id))?;

        if let Some(expected) = expected_version {
            if current.version != expected {
                return Err(OrchestratorError::Conflict { current_version: current.version });
            }
        }

        let mut data = current.data.clone();
        if let Some(patch) = data_patch {
            merge_patch(&mut data, patch);
        }
        let mut overrides = current.overrides.clone();
        if let Some(patch) = overrides_patch {
            merge_patch(&mut overrides, patch);
        }
        let extras = extras_patch.unwrap_or(current.extras.clone());
        let inheritance_disabled = inheritance_disabled_patch.unwrap_or(current.inheritance_disabled);

        let result = sqlx::query(
            "UPDATE branch_contexts SET data = ?, overrides = ?, inheritance_disabled = ?, extras = ?, version = version + 1, updated_at = ? \
             WHERE branch_id = ? AND owner_user_id = ? AND version = ?",
        )
        .bind(to_json_text(&data))
        .bind(to_json_text(&overrides))
        .bind(inheritance_disabled as i64)
        .bind(serde_json::to_string(&extras).unwrap_or_else(|_| "{}".to_string()))
        .bind(Utc::now())
        .bind(branch_id)
        .bind(owner_user_id)
        .bind(current.version)
        .execute(self.db.pool())
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return match self.get(owner_user_id, branch_id).await? {
                Some(latest) => Err(OrchestratorError::Conflict { current_version: latest.version }),
                None => Err(OrchestratorError::not_found("BranchContext", branch_id)),
            };
        }

        self.get(owner_user_id, branch_id)
            .await?
            .ok_or_else(|| OrchestratorError::not_found("BranchContext", branch_id))
    }

    async fn delete(&self, owner_user_id: &str, branch_id: Id) -> Result<u64> {
        let result = sqlx::query("DELETE FROM branch_contexts WHERE branch_id = ? AND owner_user_id = ?")
            .bind(branch_id)
            .bind(owner_user_id)
            .execute(self.db.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn list(&self, owner_user_id: &str, limit: u32, offset: u32) -> Result<Vec<BranchContext>> {
        let rows = sqlx::query(
            "SELECT branch_id, owner_user_id, parent_project_id, data, overrides, inheritance_disabled, extras, version, created_at, updated_at \
             FROM branch_contexts WHERE owner_user_id = ? ORDER BY created_at DESC LIMIT ? OFFSET ?",
        )
        .bind(owner_user_id)
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(self.db.pool())
        .await
        .map_err(map_sqlx_error)?;

        rows.iter().map(row_to_branch_context).collect()
    }
}

#[derive(Debug, Clone)]
pub struct SqliteTaskContextRepository {
    db: Db,
}

impl SqliteTaskContextRepository {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

fn row_to_task_context(row: &sqlx::sqlite::SqliteRow) -> Result<TaskContext> {
    let data_raw: String = row.get("task_data");
    let overrides_raw: String = row.get("overrides");
    let extras_raw: String = row.get("extras");

    Ok(TaskContext {
        task_id: row.get("task_id"),
        owner_user_id: row.get("owner_user_id"),
        parent_branch_id: row.get("parent_branch_id"),
        task_data: parse_json_object(&data_raw)?,
        overrides: parse_json_object(&overrides_raw)?,
        inheritance_disabled: row.get::<i64, _>("inheritance_disabled") != 0,
        extras: serde_json::from_str(&extras_raw).unwrap_or_default(),
        version: row.get("version"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl TaskContextRepository for SqliteTaskContextRepository {
    async fn get(&self, owner_user_id: &str, task_id: Id) -> Result<Option<TaskContext>> {
        let row = sqlx::query(
            "SELECT task_id, owner_user_id, parent_branch_id, task_data, overrides, inheritance_disabled, extras, version, created_at, updated_at \
             FROM task_contexts WHERE task_id = ? AND owner_user_id = ?",
        )
        .bind(task_id)
        .bind(owner_user_id)
        .fetch_optional(self.db.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(|r| row_to_task_context(&r)).transpose()
    }

    async fn create(
        &self,
        owner_user_id: &str,
        task_id: Id,
        parent_branch_id: Id,
        task_data: Map<String, Value>,
        extras: ContextExtras,
        inheritance_disabled: bool,
    ) -> Result<TaskContext> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO task_contexts (task_id, owner_user_id, parent_branch_id, task_data, overrides, inheritance_disabled, extras, version, created_at, updated_at) \
             VALUES (?, ?, ?, ?, '{}', ?, ?, 1, ?, ?)",
        )
        .bind(task_id)
        .bind(owner_user_id)
        .bind(parent_branch_id)
        .bind(to_json_text(&task_data))
        .bind(inheritance_disabled as i64)
        .bind(serde_json::to_string(&extras).unwrap_or_else(|_| "{}".to_string()))
        .bind(now)
        .bind(now)
        .execute(self.db.pool())
        .await
        .map_err(map_sqlx_error)?;

        self.get(owner_user_id, task_id)
            .await?
            .ok_or_else(|| OrchestratorError::Internal("just-inserted task context vanished".to_string()))
    }

    async fn update(
        &self,
        owner_user_id: &str,
        task_id: Id,
        task_data_patch: Option<Map<String, Value>>,
        overrides_patch: Option<Map<String, Value>>,
        expected_version: Option<i32>,
        extras_patch: Option<ContextExtras>,
        inheritance_disabled_patch: Option<bool>,
    ) -> Result<TaskContext> {
        let current = self
            .get(owner_user_id, task_id)
            .await?
            .ok_or_else(|| OrchestratorError::not_found("TaskContext", task_id))?;

        if let Some(expected) = expected_version {
            if current.version != expected {
                return Err(OrchestratorError::Conflict { current_version: current.version });
            }
        }

        let mut task_data = current.task_data.clone();
        if let Some(patch) = task_data_patch {
            merge_patch(&mut task_data, patch);
        }
        let mut overrides = current.overrides.clone();
        if let Some(patch) = overrides_patch {
            merge_patch(&mut overrides, patch);
        }
        let extras = extras_patch.unwrap_or(current.extras.clone());
        let inheritance_disabled = inheritance_disabled_patch.unwrap_or(current.inheritance_disabled);

        let result = sqlx::query(
            "UPDATE task_contexts SET task_data = ?, overrides = ?, inheritance_disabled = ?, extras = ?, version = version + 1, updated_at = ? \
             WHERE task_id = ? AND owner_user_id = ? AND version = ?",
        )
        .bind(to_json_text(&task_data))
        .bind(to_json_text(&overrides))
        .bind(inheritance_disabled as i64)
        .bind(serde_json::to_string(&extras).unwrap_or_else(|_| "{}".to_string()))
        .bind(Utc::now())
        .bind(task_id)
        .bind(owner_user_id)
        .bind(current.version)
        .execute(self.db.pool())
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return match self.get(owner_user_id, task_id).await? {
                Some(latest) => Err(OrchestratorError::Conflict { current_version: latest.version }),
                None => Err(OrchestratorError::not_found("TaskContext", task_id)),
            };
        }

        self.get(owner_user_id, task_id)
            .await?
            .ok_or_else(|| OrchestratorError::not_found("TaskContext", task_id))
    }

    async fn delete(&self, owner_user_id: &str, task_id: Id) -> Result<u64> {
        let result = sqlx::query("DELETE FROM task_contexts WHERE task_id = ? AND owner_user_id = ?")
            .bind(task_id)
            .bind(owner_user_id)
            .execute(self.db.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn list(&self, owner_user_id: &str, limit: u32, offset: u32) -> Result<Vec<TaskContext>> {
        let rows = sqlx::query(
            "SELECT task_id, owner_user_id, parent_branch_id, task_data, overrides, inheritance_disabled, extras, version, created_at, updated_at \
             FROM task_contexts WHERE owner_user_id = ? ORDER BY created_at DESC LIMIT ? OFFSET ?",
        )
        .bind(owner_user_id)
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(self.db.pool())
        .await
        .map_err(map_sqlx_error)?;

        rows.iter().map(row_to_task_context).collect()
    }
}
