use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Id;

/// Entity kinds a [`ChangeEvent`] can describe; also the vocabulary for
/// subscription filters (C8).
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Task,
    Subtask,
    Context,
    Project,
    Branch,
}

/// Emitted exactly once per successful mutation, never for a rolled-back one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChangeEvent {
    pub entity_type: EntityType,
    pub entity_id: Id,
    pub actor_user_id: String,
    pub action: String,
    /// Opaque digest of the payload, not the payload itself — subscribers
    /// re-fetch if they need the full entity.
    pub payload_digest: String,
    pub timestamp: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn new(entity_type: EntityType, entity_id: Id, actor_user_id: String, action: impl Into<String>, payload_digest: String) -> Self {
        Self {
            entity_type,
            entity_id,
            actor_user_id,
            action: action.into(),
            payload_digest,
            timestamp: Utc::now(),
        }
    }
}
