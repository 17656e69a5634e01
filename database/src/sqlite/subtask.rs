use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use task_core::error::{OrchestratorError, Result};
use task_core::models::{Id, NewSubtask, Subtask, TaskStatus, UpdateSubtask};
use task_core::repository::SubtaskRepository;

use crate::common::{map_sqlx_error, priority_to_string, status_to_string, string_to_priority, string_to_status};

use super::Db;

const SUBTASK_COLUMNS: &str =
    "id, task_id, owner_user_id, title, description, status, priority, progress_percentage, created_at, updated_at";

async fn load_assignees(pool: &SqlitePool, subtask_id: Id) -> Result<Vec<String>> {
    let rows = sqlx::query("SELECT agent_id FROM subtask_assignees WHERE subtask_id = ?")
        .bind(subtask_id)
        .fetch_all(pool)
        .await
        .map_err(map_sqlx_error)?;
    Ok(rows.iter().map(|r| r.get::<String, _>("agent_id")).collect())
}

async fn replace_assignees(pool: &SqlitePool, subtask_id: Id, assignee_ids: &[String]) -> Result<()> {
    sqlx::query("DELETE FROM subtask_assignees WHERE subtask_id = ?")
        .bind(subtask_id)
        .execute(pool)
        .await
        .map_err(map_sqlx_error)?;
    for agent_id in assignee_ids {
        sqlx::query("INSERT INTO subtask_assignees (subtask_id, agent_id) VALUES (?, ?)")
            .bind(subtask_id)
            .bind(agent_id)
            .execute(pool)
            .await
            .map_err(map_sqlx_error)?;
    }
    Ok(())
}

async fn row_to_subtask(pool: &SqlitePool, row: &sqlx::sqlite::SqliteRow) -> Result<Subtask> {
    let id: Id = row.get("id");
    let status_str: String = row.get("status");
    let priority_str: String = row.get("priority");

    Ok(Subtask {
        id,
        task_id: row.get("task_id"),
        owner_user_id: row.get("owner_user_id"),
        title: row.get("title"),
        description: row.get("description"),
        status: string_to_status(&status_str)?,
        priority: string_to_priority(&priority_str)?,
        assignee_ids: load_assignees(pool, id).await?,
        progress_percentage: row.get::<i64, _>("progress_percentage") as u8,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[derive(Debug, Clone)]
pub struct SqliteSubtaskRepository {
    db: Db,
}

impl SqliteSubtaskRepository {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    async fn fetch_row(&self, owner_user_id: &str, id: Id) -> Result<Option<sqlx::sqlite::SqliteRow>> {
        sqlx::query(&format!("SELECT {SUBTASK_COLUMNS} FROM subtasks WHERE id = ? AND owner_user_id = ?"))
            .bind(id)
            .bind(owner_user_id)
            .fetch_optional(self.db.pool())
            .await
            .map_err(map_sqlx_error)
    }
}

#[async_trait]
impl SubtaskRepository for SqliteSubtaskRepository {
    async fn create(&self, owner_user_id: &str, subtask: NewSubtask) -> Result<Subtask> {
        if subtask.title.trim().is_empty() {
            return Err(OrchestratorError::empty_field("title"));
        }

        let id = uuid::Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO subtasks (id, task_id, owner_user_id, title, description, status, priority, progress_percentage, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(subtask.task_id)
        .bind(owner_user_id)
        .bind(&subtask.title)
        .bind(&subtask.description)
        .bind(status_to_string(TaskStatus::Todo))
        .bind(priority_to_string(subtask.priority))
        .bind(subtask.progress_percentage as i64)
        .bind(now)
        .bind(now)
        .execute(self.db.pool())
        .await
        .map_err(map_sqlx_error)?;

        replace_assignees(self.db.pool(), id, &subtask.assignee_ids).await?;

        let row = self
            .fetch_row(owner_user_id, id)
            .await?
            .ok_or_else(|| OrchestratorError::not_found("Subtask", id))?;
        row_to_subtask(self.db.pool(), &row).await
    }

    async fn get_by_id(&self, owner_user_id: &str, id: Id) -> Result<Option<Subtask>> {
        match self.fetch_row(owner_user_id, id).await? {
            Some(row) => Ok(Some(row_to_subtask(self.db.pool(), &row).await?)),
            None => Ok(None),
        }
    }

    async fn update(&self, owner_user_id: &str, id: Id, updates: UpdateSubtask) -> Result<Subtask> {
        let existing = self
            .get_by_id(owner_user_id, id)
            .await?
            .ok_or_else(|| OrchestratorError::not_found("Subtask", id))?;

        if let Some(ref title) = updates.title {
            if title.trim().is_empty() {
                return Err(OrchestratorError::empty_field("title"));
            }
        }
        if let Some(p) = updates.progress_percentage {
            if p > 100 {
                return Err(OrchestratorError::validation("progress_percentage", "must be 0..=100"));
            }
        }

        let mut builder: sqlx::QueryBuilder<sqlx::Sqlite> = sqlx::QueryBuilder::new("UPDATE subtasks SET ");
        builder.push("updated_at = ");
        builder.push_bind(Utc::now());

        if let Some(title) = &updates.title {
            builder.push(", title = ");
            builder.push_bind(title.clone());
        }
        if let Some(description) = &updates.description {
            builder.push(", description = ");
            builder.push_bind(description.clone());
        }
        if let Some(priority) = updates.priority {
            builder.push(", priority = ");
            builder.push_bind(priority_to_string(priority));
        }
        if let Some(progress_percentage) = updates.progress_percentage {
            builder.push(", progress_percentage = ");
            builder.push_bind(progress_percentage as i64);
        }

        builder.push(" WHERE id = ");
        builder.push_bind(id);
        builder.push(" AND owner_user_id = ");
        builder.push_bind(owner_user_id);

        let result = builder.build().execute(self.db.pool()).await.map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(OrchestratorError::not_found("Subtask", id));
        }

        if let Some(assignee_ids) = &updates.assignee_ids {
            replace_assignees(self.db.pool(), id, assignee_ids).await?;
        }

        let _ = existing;
        let row = self
            .fetch_row(owner_user_id, id)
            .await?
            .ok_or_else(|| OrchestratorError::not_found("Subtask", id))?;
        row_to_subtask(self.db.pool(), &row).await
    }

    async fn set_status(&self, owner_user_id: &str, id: Id, status: TaskStatus) -> Result<Subtask> {
        let result = sqlx::query(
            "UPDATE subtasks SET status = ?, updated_at = ? WHERE id = ? AND owner_user_id = ?",
        )
        .bind(status_to_string(status))
        .bind(Utc::now())
        .bind(id)
        .bind(owner_user_id)
        .execute(self.db.pool())
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(OrchestratorError::not_found("Subtask", id));
        }

        let row = self
            .fetch_row(owner_user_id, id)
            .await?
            .ok_or_else(|| OrchestratorError::not_found("Subtask", id))?;
        row_to_subtask(self.db.pool(), &row).await
    }

    async fn delete(&self, owner_user_id: &str, id: Id) -> Result<u64> {
        let result = sqlx::query("DELETE FROM subtasks WHERE id = ? AND owner_user_id = ?")
            .bind(id)
            .bind(owner_user_id)
            .execute(self.db.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn list_by_task(&self, owner_user_id: &str, task_id: Id) -> Result<Vec<Subtask>> {
        let rows = sqlx::query(&format!(
            "SELECT {SUBTASK_COLUMNS} FROM subtasks WHERE task_id = ? AND owner_user_id = ? ORDER BY created_at ASC"
        ))
        .bind(task_id)
        .bind(owner_user_id)
        .fetch_all(self.db.pool())
        .await
        .map_err(map_sqlx_error)?;

        let mut subtasks = Vec::with_capacity(rows.len());
        for row in &rows {
            subtasks.push(row_to_subtask(self.db.pool(), row).await?);
        }
        Ok(subtasks)
    }
}
