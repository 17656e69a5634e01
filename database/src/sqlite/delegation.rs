use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use task_core::error::{OrchestratorError, Result};
use task_core::models::{ContextLevel, DelegationRequest, DelegationStatus, Id};
use task_core::repository::DelegationRepository;

use crate::common::map_sqlx_error;

use super::Db;

fn level_to_string(level: ContextLevel) -> &'static str {
    match level {
        ContextLevel::Global => "global",
        ContextLevel::Project => "project",
        ContextLevel::Branch => "branch",
        ContextLevel::Task => "task",
    }
}

fn string_to_level(s: &str) -> Result<ContextLevel> {
    match s {
        "global" => Ok(ContextLevel::Global),
        "project" => Ok(ContextLevel::Project),
        "branch" => Ok(ContextLevel::Branch),
        "task" => Ok(ContextLevel::Task),
        other => Err(OrchestratorError::Database(format!("unknown context level '{other}' in storage"))),
    }
}

fn status_to_string(status: DelegationStatus) -> &'static str {
    match status {
        DelegationStatus::Pending => "pending",
        DelegationStatus::Approved => "approved",
        DelegationStatus::Rejected => "rejected",
    }
}

fn string_to_status(s: &str) -> Result<DelegationStatus> {
    match s {
        "pending" => Ok(DelegationStatus::Pending),
        "approved" => Ok(DelegationStatus::Approved),
        "rejected" => Ok(DelegationStatus::Rejected),
        other => Err(OrchestratorError::Database(format!("unknown delegation status '{other}' in storage"))),
    }
}

fn row_to_delegation(row: &sqlx::sqlite::SqliteRow) -> Result<DelegationRequest> {
    let payload_raw: String = row.get("payload");
    let source_level: String = row.get("source_level");
    let target_level: String = row.get("target_level");
    let status: String = row.get("status");

    Ok(DelegationRequest {
        id: row.get("id"),
        owner_user_id: row.get("owner_user_id"),
        source_level: string_to_level(&source_level)?,
        source_id: row.get("source_id"),
        target_level: string_to_level(&target_level)?,
        target_id: row.get("target_id"),
        payload: serde_json::from_str(&payload_raw).unwrap_or(serde_json::Value::Null),
        reason: row.get("reason"),
        status: string_to_status(&status)?,
        created_at: row.get("created_at"),
        decided_at: row.get("decided_at"),
    })
}

#[derive(Debug, Clone)]
pub struct SqliteDelegationRepository {
    db: Db,
}

impl SqliteDelegationRepository {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl DelegationRepository for SqliteDelegationRepository {
    async fn create(&self, request: DelegationRequest) -> Result<DelegationRequest> {
        sqlx::query(
            r#"
            INSERT INTO delegation_requests (id, owner_user_id, source_level, source_id, target_level, target_id, payload, reason, status, created_at, decided_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(request.id)
        .bind(&request.owner_user_id)
        .bind(level_to_string(request.source_level))
        .bind(request.source_id)
        .bind(level_to_string(request.target_level))
        .bind(request.target_id)
        .bind(serde_json::to_string(&request.payload).unwrap_or_else(|_| "null".to_string()))
        .bind(&request.reason)
        .bind(status_to_string(request.status))
        .bind(request.created_at)
        .bind(request.decided_at)
        .execute(self.db.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(request)
    }

    async fn get(&self, owner_user_id: &str, id: Id) -> Result<Option<DelegationRequest>> {
        let row = sqlx::query(
            "SELECT id, owner_user_id, source_level, source_id, target_level, target_id, payload, reason, status, created_at, decided_at \
             FROM delegation_requests WHERE id = ? AND owner_user_id = ?",
        )
        .bind(id)
        .bind(owner_user_id)
        .fetch_optional(self.db.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(|r| row_to_delegation(&r)).transpose()
    }

    async fn decide(&self, owner_user_id: &str, id: Id, status: DelegationStatus) -> Result<DelegationRequest> {
        let result = sqlx::query(
            "UPDATE delegation_requests SET status = ?, decided_at = ? WHERE id = ? AND owner_user_id = ? AND status = 'pending'",
        )
        .bind(status_to_string(status))
        .bind(Utc::now())
        .bind(id)
        .bind(owner_user_id)
        .execute(self.db.pool())
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return match self.get(owner_user_id, id).await? {
                Some(existing) => Err(OrchestratorError::validation(
                    "status",
                    format!("delegation request already decided ({})", status_to_string(existing.status)),
                )),
                None => Err(OrchestratorError::not_found("DelegationRequest", id)),
            };
        }

        self.get(owner_user_id, id)
            .await?
            .ok_or_else(|| OrchestratorError::not_found("DelegationRequest", id))
    }
}
