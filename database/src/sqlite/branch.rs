use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use task_core::error::{OrchestratorError, Result};
use task_core::models::{Branch, Id, NewBranch, UpdateBranch};
use task_core::repository::BranchRepository;

use crate::common::map_sqlx_error;

use super::Db;

fn row_to_branch(row: &sqlx::sqlite::SqliteRow) -> Branch {
    Branch {
        id: row.get("id"),
        project_id: row.get("project_id"),
        owner_user_id: row.get("owner_user_id"),
        name: row.get("name"),
        description: row.get("description"),
        assigned_agent_id: row.get("assigned_agent_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

const COLUMNS: &str = "id, project_id, owner_user_id, name, description, assigned_agent_id, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct SqliteBranchRepository {
    db: Db,
}

impl SqliteBranchRepository {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl BranchRepository for SqliteBranchRepository {
    async fn create(&self, owner_user_id: &str, branch: NewBranch) -> Result<Branch> {
        if branch.name.trim().is_empty() {
            return Err(OrchestratorError::empty_field("name"));
        }

        let id = uuid::Uuid::new_v4();
        let now = Utc::now();

        let row = sqlx::query(&format!(
            "INSERT INTO branches (id, project_id, owner_user_id, name, description, assigned_agent_id, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?) RETURNING {COLUMNS}"
        ))
        .bind(id)
        .bind(branch.project_id)
        .bind(owner_user_id)
        .bind(&branch.name)
        .bind(&branch.description)
        .bind(&branch.assigned_agent_id)
        .bind(now)
        .bind(now)
        .fetch_one(self.db.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row_to_branch(&row))
    }

    async fn get_by_id(&self, owner_user_id: &str, id: Id) -> Result<Option<Branch>> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM branches WHERE id = ? AND owner_user_id = ?"
        ))
        .bind(id)
        .bind(owner_user_id)
        .fetch_optional(self.db.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(|r| row_to_branch(&r)))
    }

    async fn update(&self, owner_user_id: &str, id: Id, updates: UpdateBranch) -> Result<Branch> {
        let existing = self.get_by_id(owner_user_id, id).await?;
        let existing = existing.ok_or_else(|| OrchestratorError::not_found("Branch", id))?;

        if let Some(ref name) = updates.name {
            if name.trim().is_empty() {
                return Err(OrchestratorError::empty_field("name"));
            }
        }

        let mut builder: sqlx::QueryBuilder<sqlx::Sqlite> = sqlx::QueryBuilder::new("UPDATE branches SET ");
        let mut has_updates = false;

        if let Some(name) = &updates.name {
            builder.push("name = ");
            builder.push_bind(name.clone());
            has_updates = true;
        }
        if let Some(description) = &updates.description {
            if has_updates {
                builder.push(", ");
            }
            builder.push("description = ");
            builder.push_bind(description.clone());
            has_updates = true;
        }
        if let Some(agent) = &updates.assigned_agent_id {
            if has_updates {
                builder.push(", ");
            }
            builder.push("assigned_agent_id = ");
            builder.push_bind(agent.clone());
            has_updates = true;
        }

        if !has_updates {
            return Ok(existing);
        }

        builder.push(", updated_at = ");
        builder.push_bind(Utc::now());
        builder.push(" WHERE id = ");
        builder.push_bind(id);
        builder.push(" AND owner_user_id = ");
        builder.push_bind(owner_user_id);
        builder.push(format!(" RETURNING {COLUMNS}"));

        let row = builder.build().fetch_one(self.db.pool()).await.map_err(map_sqlx_error)?;

        Ok(row_to_branch(&row))
    }

    async fn delete(&self, owner_user_id: &str, id: Id) -> Result<u64> {
        let result = sqlx::query("DELETE FROM branches WHERE id = ? AND owner_user_id = ?")
            .bind(id)
            .bind(owner_user_id)
            .execute(self.db.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn list(&self, owner_user_id: &str, project_id: Option<Id>, limit: u32, offset: u32) -> Result<Vec<Branch>> {
        let rows = match project_id {
            Some(project_id) => {
                sqlx::query(&format!(
                    "SELECT {COLUMNS} FROM branches WHERE owner_user_id = ? AND project_id = ? ORDER BY created_at DESC LIMIT ? OFFSET ?"
                ))
                .bind(owner_user_id)
                .bind(project_id)
                .bind(limit as i64)
                .bind(offset as i64)
                .fetch_all(self.db.pool())
                .await
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {COLUMNS} FROM branches WHERE owner_user_id = ? ORDER BY created_at DESC LIMIT ? OFFSET ?"
                ))
                .bind(owner_user_id)
                .bind(limit as i64)
                .bind(offset as i64)
                .fetch_all(self.db.pool())
                .await
            }
        }
        .map_err(map_sqlx_error)?;

        Ok(rows.iter().map(row_to_branch).collect())
    }
}
