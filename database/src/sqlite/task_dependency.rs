use async_trait::async_trait;
use sqlx::Row;
use task_core::error::Result;
use task_core::models::Id;
use task_core::repository::TaskDependencyRepository;

use crate::common::map_sqlx_error;

use super::Db;

#[derive(Debug, Clone)]
pub struct SqliteTaskDependencyRepository {
    db: Db,
}

impl SqliteTaskDependencyRepository {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TaskDependencyRepository for SqliteTaskDependencyRepository {
    async fn add(&self, owner_user_id: &str, task_id: Id, depends_on_task_id: Id) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO task_dependencies (task_id, depends_on_task_id, owner_user_id) VALUES (?, ?, ?)",
        )
        .bind(task_id)
        .bind(depends_on_task_id)
        .bind(owner_user_id)
        .execute(self.db.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn remove(&self, owner_user_id: &str, task_id: Id, depends_on_task_id: Id) -> Result<()> {
        sqlx::query(
            "DELETE FROM task_dependencies WHERE task_id = ? AND depends_on_task_id = ? AND owner_user_id = ?",
        )
        .bind(task_id)
        .bind(depends_on_task_id)
        .bind(owner_user_id)
        .execute(self.db.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn depends_on(&self, owner_user_id: &str, task_id: Id) -> Result<Vec<Id>> {
        let rows = sqlx::query(
            "SELECT depends_on_task_id FROM task_dependencies WHERE task_id = ? AND owner_user_id = ?",
        )
        .bind(task_id)
        .bind(owner_user_id)
        .fetch_all(self.db.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.iter().map(|r| r.get::<Id, _>("depends_on_task_id")).collect())
    }

    async fn all_edges(&self, owner_user_id: &str) -> Result<Vec<(Id, Id)>> {
        let rows = sqlx::query(
            "SELECT task_id, depends_on_task_id FROM task_dependencies WHERE owner_user_id = ?",
        )
        .bind(owner_user_id)
        .fetch_all(self.db.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows
            .iter()
            .map(|r| (r.get::<Id, _>("task_id"), r.get::<Id, _>("depends_on_task_id")))
            .collect())
    }
}
