use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ContextLevel, Id};

/// Status of a proposed upward context delegation.
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DelegationStatus {
    Pending,
    Approved,
    Rejected,
}

/// A request to merge a payload from a lower context tier into a strictly
/// higher one. Application (approve/reject) is a distinct, explicit step;
/// enqueueing never mutates the source context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DelegationRequest {
    pub id: Id,
    pub owner_user_id: String,
    pub source_level: ContextLevel,
    pub source_id: Id,
    pub target_level: ContextLevel,
    pub target_id: Id,
    pub payload: Value,
    pub reason: String,
    pub status: DelegationStatus,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}
