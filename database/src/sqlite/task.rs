use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use task_core::error::{OrchestratorError, Result};
use task_core::models::{Id, NewTask, ProgressEntry, Task, TaskFilter, TaskStatus, UpdateTask};
use task_core::repository::{TaskRepository, TaskSummary};

use crate::common::{map_sqlx_error, priority_to_string, status_to_string, string_to_priority, string_to_status};

use super::Db;

const TASK_COLUMNS: &str = "id, branch_id, owner_user_id, title, description, status, priority, \
     due_date, estimated_effort, context_id, progress_history, progress_count, progress, \
     created_at, updated_at, version";

async fn load_assignees(pool: &SqlitePool, task_id: Id) -> Result<Vec<String>> {
    let rows = sqlx::query("SELECT agent_id FROM task_assignees WHERE task_id = ?")
        .bind(task_id)
        .fetch_all(pool)
        .await
        .map_err(map_sqlx_error)?;
    Ok(rows.iter().map(|r| r.get::<String, _>("agent_id")).collect())
}

async fn load_labels(pool: &SqlitePool, task_id: Id) -> Result<Vec<Id>> {
    let rows = sqlx::query("SELECT label_id FROM task_labels WHERE task_id = ?")
        .bind(task_id)
        .fetch_all(pool)
        .await
        .map_err(map_sqlx_error)?;
    Ok(rows.iter().map(|r| r.get::<Id, _>("label_id")).collect())
}

async fn replace_assignees(pool: &SqlitePool, task_id: Id, assignee_ids: &[String]) -> Result<()> {
    sqlx::query("DELETE FROM task_assignees WHERE task_id = ?")
        .bind(task_id)
        .execute(pool)
        .await
        .map_err(map_sqlx_error)?;
    for agent_id in assignee_ids {
        sqlx::query("INSERT INTO task_assignees (task_id, agent_id) VALUES (?, ?)")
            .bind(task_id)
            .bind(agent_id)
            .execute(pool)
            .await
            .map_err(map_sqlx_error)?;
    }
    Ok(())
}

async fn replace_labels(pool: &SqlitePool, task_id: Id, label_ids: &[Id]) -> Result<()> {
    sqlx::query("DELETE FROM task_labels WHERE task_id = ?")
        .bind(task_id)
        .execute(pool)
        .await
        .map_err(map_sqlx_error)?;
    for label_id in label_ids {
        sqlx::query("INSERT INTO task_labels (task_id, label_id) VALUES (?, ?)")
            .bind(task_id)
            .bind(label_id)
            .execute(pool)
            .await
            .map_err(map_sqlx_error)?;
    }
    Ok(())
}

fn decode_progress_history(raw: &str) -> BTreeMap<u32, ProgressEntry> {
    serde_json::from_str(raw).unwrap_or_default()
}

fn encode_progress_history(history: &BTreeMap<u32, ProgressEntry>) -> String {
    serde_json::to_string(history).unwrap_or_else(|_| "{}".to_string())
}

async fn row_to_task(pool: &SqlitePool, row: &sqlx::sqlite::SqliteRow) -> Result<Task> {
    let id: Id = row.get("id");
    let status_str: String = row.get("status");
    let priority_str: String = row.get("priority");
    let history_raw: String = row.get("progress_history");

    Ok(Task {
        id,
        branch_id: row.get("branch_id"),
        owner_user_id: row.get("owner_user_id"),
        title: row.get("title"),
        description: row.get("description"),
        status: string_to_status(&status_str)?,
        priority: string_to_priority(&priority_str)?,
        assignee_ids: load_assignees(pool, id).await?,
        label_ids: load_labels(pool, id).await?,
        due_date: row.get("due_date"),
        estimated_effort: row.get("estimated_effort"),
        context_id: row.get("context_id"),
        progress_history: decode_progress_history(&history_raw),
        progress_count: row.get::<i64, _>("progress_count") as u32,
        progress: row.get::<i64, _>("progress") as u32,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        version: row.get("version"),
    })
}

#[derive(Debug, Clone)]
pub struct SqliteTaskRepository {
    db: Db,
}

impl SqliteTaskRepository {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    async fn fetch_row(&self, owner_user_id: &str, id: Id) -> Result<Option<sqlx::sqlite::SqliteRow>> {
        sqlx::query(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ? AND owner_user_id = ?"))
            .bind(id)
            .bind(owner_user_id)
            .fetch_optional(self.db.pool())
            .await
            .map_err(map_sqlx_error)
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    async fn create(&self, owner_user_id: &str, task: NewTask) -> Result<Task> {
        if task.title.trim().is_empty() {
            return Err(OrchestratorError::empty_field("title"));
        }

        let id = uuid::Uuid::new_v4();
        let now = Utc::now();
        let empty_history: BTreeMap<u32, ProgressEntry> = BTreeMap::new();

        sqlx::query(
            r#"
            INSERT INTO tasks (
                id, branch_id, owner_user_id, title, description, status, priority,
                due_date, estimated_effort, progress_history, progress_count, progress,
                created_at, updated_at, version
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, 0, ?, ?, 1)
            "#,
        )
        .bind(id)
        .bind(task.branch_id)
        .bind(owner_user_id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(status_to_string(TaskStatus::Todo))
        .bind(priority_to_string(task.priority))
        .bind(task.due_date)
        .bind(task.estimated_effort)
        .bind(encode_progress_history(&empty_history))
        .bind(now)
        .bind(now)
        .execute(self.db.pool())
        .await
        .map_err(map_sqlx_error)?;

        replace_assignees(self.db.pool(), id, &task.assignee_ids).await?;
        replace_labels(self.db.pool(), id, &task.label_ids).await?;

        let row = self
            .fetch_row(owner_user_id, id)
            .await?
            .ok_or_else(|| OrchestratorError::not_found("Task", id))?;
        row_to_task(self.db.pool(), &row).await
    }

    async fn get_by_id(&self, owner_user_id: &str, id: Id) -> Result<Option<Task>> {
        match self.fetch_row(owner_user_id, id).await? {
            Some(row) => Ok(Some(row_to_task(self.db.pool(), &row).await?)),
            None => Ok(None),
        }
    }

    async fn update(&self, owner_user_id: &str, id: Id, updates: UpdateTask, expected_version: Option<i32>) -> Result<Task> {
        let existing = self
            .get_by_id(owner_user_id, id)
            .await?
            .ok_or_else(|| OrchestratorError::not_found("Task", id))?;

        if let Some(expected) = expected_version {
            if existing.version != expected {
                return Err(OrchestratorError::Conflict { current_version: existing.version });
            }
        }

        if let Some(ref title) = updates.title {
            if title.trim().is_empty() {
                return Err(OrchestratorError::empty_field("title"));
            }
        }

        let mut builder: sqlx::QueryBuilder<sqlx::Sqlite> = sqlx::QueryBuilder::new("UPDATE tasks SET ");
        builder.push("version = version + 1, updated_at = ");
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
        if let Some(due_date) = updates.due_date {
            builder.push(", due_date = ");
            builder.push_bind(due_date);
        }
        if let Some(estimated_effort) = updates.estimated_effort {
            builder.push(", estimated_effort = ");
            builder.push_bind(estimated_effort);
        }

        builder.push(" WHERE id = ");
        builder.push_bind(id);
        builder.push(" AND owner_user_id = ");
        builder.push_bind(owner_user_id);

        let result = builder.build().execute(self.db.pool()).await.map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(OrchestratorError::not_found("Task", id));
        }

        if let Some(assignee_ids) = &updates.assignee_ids {
            replace_assignees(self.db.pool(), id, assignee_ids).await?;
        }
        if let Some(label_ids) = &updates.label_ids {
            replace_labels(self.db.pool(), id, label_ids).await?;
        }

        let row = self
            .fetch_row(owner_user_id, id)
            .await?
            .ok_or_else(|| OrchestratorError::not_found("Task", id))?;
        row_to_task(self.db.pool(), &row).await
    }

    async fn set_status(&self, owner_user_id: &str, id: Id, status: TaskStatus) -> Result<Task> {
        let result = sqlx::query(
            "UPDATE tasks SET status = ?, version = version + 1, updated_at = ? WHERE id = ? AND owner_user_id = ?",
        )
        .bind(status_to_string(status))
        .bind(Utc::now())
        .bind(id)
        .bind(owner_user_id)
        .execute(self.db.pool())
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(OrchestratorError::not_found("Task", id));
        }

        let row = self
            .fetch_row(owner_user_id, id)
            .await?
            .ok_or_else(|| OrchestratorError::not_found("Task", id))?;
        row_to_task(self.db.pool(), &row).await
    }

    async fn set_progress(&self, owner_user_id: &str, id: Id, progress: u32) -> Result<Task> {
        let result = sqlx::query(
            "UPDATE tasks SET progress = ?, version = version + 1, updated_at = ? WHERE id = ? AND owner_user_id = ?",
        )
        .bind(progress as i64)
        .bind(Utc::now())
        .bind(id)
        .bind(owner_user_id)
        .execute(self.db.pool())
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(OrchestratorError::not_found("Task", id));
        }

        let row = self
            .fetch_row(owner_user_id, id)
            .await?
            .ok_or_else(|| OrchestratorError::not_found("Task", id))?;
        row_to_task(self.db.pool(), &row).await
    }

    async fn append_progress_entry(&self, owner_user_id: &str, id: Id, entry: ProgressEntry) -> Result<Task> {
        let existing = self
            .get_by_id(owner_user_id, id)
            .await?
            .ok_or_else(|| OrchestratorError::not_found("Task", id))?;

        let mut history = existing.progress_history;
        history.insert(entry.progress_number, entry);

        let result = sqlx::query(
            "UPDATE tasks SET progress_history = ?, progress_count = progress_count + 1, \
             version = version + 1, updated_at = ? WHERE id = ? AND owner_user_id = ?",
        )
        .bind(encode_progress_history(&history))
        .bind(Utc::now())
        .bind(id)
        .bind(owner_user_id)
        .execute(self.db.pool())
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(OrchestratorError::not_found("Task", id));
        }

        let row = self
            .fetch_row(owner_user_id, id)
            .await?
            .ok_or_else(|| OrchestratorError::not_found("Task", id))?;
        row_to_task(self.db.pool(), &row).await
    }

    async fn set_context_id(&self, owner_user_id: &str, id: Id, context_id: Id) -> Result<Task> {
        let result = sqlx::query("UPDATE tasks SET context_id = ?, updated_at = ? WHERE id = ? AND owner_user_id = ?")
            .bind(context_id)
            .bind(Utc::now())
            .bind(id)
            .bind(owner_user_id)
            .execute(self.db.pool())
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(OrchestratorError::not_found("Task", id));
        }

        let row = self
            .fetch_row(owner_user_id, id)
            .await?
            .ok_or_else(|| OrchestratorError::not_found("Task", id))?;
        row_to_task(self.db.pool(), &row).await
    }

    async fn delete(&self, owner_user_id: &str, id: Id) -> Result<u64> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = ? AND owner_user_id = ?")
            .bind(id)
            .bind(owner_user_id)
            .execute(self.db.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn bulk_delete(&self, owner_user_id: &str, ids: &[Id]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut builder: sqlx::QueryBuilder<sqlx::Sqlite> =
            sqlx::QueryBuilder::new("DELETE FROM tasks WHERE owner_user_id = ");
        builder.push_bind(owner_user_id);
        builder.push(" AND id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let result = builder.build().execute(self.db.pool()).await.map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn list(&self, owner_user_id: &str, filter: TaskFilter) -> Result<Vec<Task>> {
        let mut builder: sqlx::QueryBuilder<sqlx::Sqlite> = sqlx::QueryBuilder::new(&format!(
            "SELECT DISTINCT t.* FROM (SELECT {TASK_COLUMNS} FROM tasks) AS t \
             LEFT JOIN task_assignees ta ON ta.task_id = t.id \
             LEFT JOIN task_labels tl ON tl.task_id = t.id \
             WHERE t.owner_user_id = "
        ));
        builder.push_bind(owner_user_id.to_string());

        if let Some(branch_id) = filter.branch_id {
            builder.push(" AND t.branch_id = ");
            builder.push_bind(branch_id);
        }
        if let Some(status) = filter.status {
            builder.push(" AND t.status = ");
            builder.push_bind(status_to_string(status));
        }
        if let Some(priority) = filter.priority {
            builder.push(" AND t.priority = ");
            builder.push_bind(priority_to_string(priority));
        }
        if let Some(ref assignee_id) = filter.assignee_id {
            builder.push(" AND ta.agent_id = ");
            builder.push_bind(assignee_id.clone());
        }
        if let Some(label_id) = filter.label {
            builder.push(" AND tl.label_id = ");
            builder.push_bind(label_id);
        }

        builder.push(
            " ORDER BY CASE t.priority \
             WHEN 'urgent' THEN 5 WHEN 'critical' THEN 4 WHEN 'high' THEN 3 \
             WHEN 'medium' THEN 2 ELSE 1 END DESC, t.created_at DESC",
        );

        if let Some(limit) = filter.limit {
            builder.push(" LIMIT ");
            builder.push_bind(limit as i64);
            if let Some(offset) = filter.offset {
                builder.push(" OFFSET ");
                builder.push_bind(offset as i64);
            }
        }

        let rows = builder.build().fetch_all(self.db.pool()).await.map_err(map_sqlx_error)?;

        let mut tasks = Vec::with_capacity(rows.len());
        for row in &rows {
            tasks.push(row_to_task(self.db.pool(), row).await?);
        }
        Ok(tasks)
    }

    async fn list_minimal(&self, owner_user_id: &str, filter: TaskFilter) -> Result<Vec<TaskSummary>> {
        let tasks = self.list(owner_user_id, filter).await?;
        let mut summaries = Vec::with_capacity(tasks.len());
        for task in tasks {
            let subtask_count: i64 = sqlx::query("SELECT COUNT(*) AS c FROM subtasks WHERE task_id = ?")
                .bind(task.id)
                .fetch_one(self.db.pool())
                .await
                .map_err(map_sqlx_error)?
                .get("c");
            let dependency_count: i64 = sqlx::query("SELECT COUNT(*) AS c FROM task_dependencies WHERE task_id = ?")
                .bind(task.id)
                .fetch_one(self.db.pool())
                .await
                .map_err(map_sqlx_error)?
                .get("c");

            summaries.push(TaskSummary {
                assignee_count: task.assignee_ids.len() as u32,
                subtask_count: subtask_count as u32,
                dependency_count: dependency_count as u32,
                task,
            });
        }
        Ok(summaries)
    }

    async fn list_runnable(&self, owner_user_id: &str) -> Result<Vec<Task>> {
        let rows = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE owner_user_id = ? \
             AND status IN ('todo', 'in_progress', 'review', 'testing') \
             ORDER BY CASE priority \
             WHEN 'urgent' THEN 5 WHEN 'critical' THEN 4 WHEN 'high' THEN 3 \
             WHEN 'medium' THEN 2 ELSE 1 END DESC, created_at ASC"
        ))
        .bind(owner_user_id)
        .fetch_all(self.db.pool())
        .await
        .map_err(map_sqlx_error)?;

        let mut tasks = Vec::with_capacity(rows.len());
        for row in &rows {
            tasks.push(row_to_task(self.db.pool(), row).await?);
        }
        Ok(tasks)
    }
}
