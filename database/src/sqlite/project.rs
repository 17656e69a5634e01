use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use task_core::error::{OrchestratorError, Result};
use task_core::models::{NewProject, Project, UpdateProject};
use task_core::repository::ProjectRepository;

use crate::common::map_sqlx_error;

use super::Db;

fn row_to_project(row: &sqlx::sqlite::SqliteRow) -> Project {
    Project {
        id: row.get("id"),
        owner_user_id: row.get("owner_user_id"),
        name: row.get("name"),
        description: row.get("description"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[derive(Debug, Clone)]
pub struct SqliteProjectRepository {
    db: Db,
}

impl SqliteProjectRepository {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ProjectRepository for SqliteProjectRepository {
    async fn create(&self, owner_user_id: &str, project: NewProject) -> Result<Project> {
        if project.name.trim().is_empty() {
            return Err(OrchestratorError::empty_field("name"));
        }

        let id = uuid::Uuid::new_v4();
        let now = Utc::now();

        let row = sqlx::query(
            r#"
            INSERT INTO projects (id, owner_user_id, name, description, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id, owner_user_id, name, description, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(owner_user_id)
        .bind(&project.name)
        .bind(&project.description)
        .bind(now)
        .bind(now)
        .fetch_one(self.db.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row_to_project(&row))
    }

    async fn get_by_id(&self, owner_user_id: &str, id: task_core::models::Id) -> Result<Option<Project>> {
        let row = sqlx::query(
            "SELECT id, owner_user_id, name, description, created_at, updated_at FROM projects WHERE id = ? AND owner_user_id = ?",
        )
        .bind(id)
        .bind(owner_user_id)
        .fetch_optional(self.db.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(|r| row_to_project(&r)))
    }

    async fn update(&self, owner_user_id: &str, id: task_core::models::Id, updates: UpdateProject) -> Result<Project> {
        let existing = self.get_by_id(owner_user_id, id).await?;
        let existing = existing.ok_or_else(|| OrchestratorError::not_found("Project", id))?;

        if let Some(ref name) = updates.name {
            if name.trim().is_empty() {
                return Err(OrchestratorError::empty_field("name"));
            }
        }

        let mut builder: sqlx::QueryBuilder<sqlx::Sqlite> = sqlx::QueryBuilder::new("UPDATE projects SET ");
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

        if !has_updates {
            return Ok(existing);
        }

        builder.push(", updated_at = ");
        builder.push_bind(Utc::now());
        builder.push(" WHERE id = ");
        builder.push_bind(id);
        builder.push(" AND owner_user_id = ");
        builder.push_bind(owner_user_id);
        builder.push(" RETURNING id, owner_user_id, name, description, created_at, updated_at");

        let row = builder
            .build()
            .fetch_one(self.db.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row_to_project(&row))
    }

    async fn delete(&self, owner_user_id: &str, id: task_core::models::Id) -> Result<u64> {
        let result = sqlx::query("DELETE FROM projects WHERE id = ? AND owner_user_id = ?")
            .bind(id)
            .bind(owner_user_id)
            .execute(self.db.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn list(&self, owner_user_id: &str, limit: u32, offset: u32) -> Result<Vec<Project>> {
        let rows = sqlx::query(
            "SELECT id, owner_user_id, name, description, created_at, updated_at FROM projects WHERE owner_user_id = ? ORDER BY created_at DESC LIMIT ? OFFSET ?",
        )
        .bind(owner_user_id)
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(self.db.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.iter().map(row_to_project).collect())
    }
}
