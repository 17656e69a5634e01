use async_trait::async_trait;
use sqlx::Row;
use task_core::error::{OrchestratorError, Result};
use task_core::models::{Id, Label};
use task_core::repository::LabelRepository;

use crate::common::map_sqlx_error;

use super::Db;

#[derive(Debug, Clone)]
pub struct SqliteLabelRepository {
    db: Db,
}

impl SqliteLabelRepository {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl LabelRepository for SqliteLabelRepository {
    async fn get_or_create(&self, name: &str) -> Result<Label> {
        if name.trim().is_empty() {
            return Err(OrchestratorError::empty_field("name"));
        }

        if let Some(row) = sqlx::query("SELECT id, name FROM labels WHERE name = ?")
            .bind(name)
            .fetch_optional(self.db.pool())
            .await
            .map_err(map_sqlx_error)?
        {
            return Ok(Label { id: row.get("id"), name: row.get("name") });
        }

        let id = uuid::Uuid::new_v4();
        sqlx::query("INSERT INTO labels (id, name) VALUES (?, ?)")
            .bind(id)
            .bind(name)
            .execute(self.db.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(Label { id, name: name.to_string() })
    }

    async fn list(&self) -> Result<Vec<Label>> {
        let rows = sqlx::query("SELECT id, name FROM labels ORDER BY name ASC")
            .fetch_all(self.db.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.iter().map(|r| Label { id: r.get("id"), name: r.get("name") }).collect())
    }

    async fn attach(&self, owner_user_id: &str, task_id: Id, label_id: Id) -> Result<()> {
        let owned = sqlx::query("SELECT 1 FROM tasks WHERE id = ? AND owner_user_id = ?")
            .bind(task_id)
            .bind(owner_user_id)
            .fetch_optional(self.db.pool())
            .await
            .map_err(map_sqlx_error)?;
        if owned.is_none() {
            return Err(OrchestratorError::not_found("Task", task_id));
        }

        sqlx::query("INSERT OR IGNORE INTO task_labels (task_id, label_id) VALUES (?, ?)")
            .bind(task_id)
            .bind(label_id)
            .execute(self.db.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn detach(&self, owner_user_id: &str, task_id: Id, label_id: Id) -> Result<()> {
        sqlx::query(
            "DELETE FROM task_labels WHERE task_id = ? AND label_id = ? \
             AND task_id IN (SELECT id FROM tasks WHERE owner_user_id = ?)",
        )
        .bind(task_id)
        .bind(label_id)
        .bind(owner_user_id)
        .execute(self.db.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }
}
