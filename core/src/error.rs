use thiserror::Error;

use crate::models::{ContextLevel, TaskStatus};

pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Full error taxonomy for the orchestration engine (§7).
///
/// Each variant maps to one of the wire `error.code` values in §6 via
/// [`OrchestratorError::code`], and to an HTTP status via
/// [`OrchestratorError::status_code`]. `meta` diagnostic fields are attached
/// by the higher-level `mcp-protocol::error::ApiError` mapping, not here —
/// this type carries only what's needed to reconstruct them.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrchestratorError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation failed for field '{field}': {message}")]
    Validation { field: String, message: String },

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },

    #[error("dependency cycle: {0:?}")]
    DependencyCycle(Vec<uuid::Uuid>),

    #[error("completion blocked: {0:?}")]
    CompletionBlocked(Vec<String>),

    #[error("version conflict, current_version={current_version}")]
    Conflict { current_version: i32 },

    #[error("delegation must target a strictly higher tier than {0}")]
    DelegationDirection(ContextLevel),

    #[error("duplicate: {0}")]
    Duplicate(String),

    #[error("missing required parameters: {0:?}")]
    MissingRequiredParam(Vec<String>),

    #[error("auth required")]
    AuthRequired,

    #[error("forbidden")]
    Forbidden,

    #[error("transient error: {0}")]
    Transient(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl OrchestratorError {
    pub fn not_found(entity: &str, id: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("{entity} {id} not found"))
    }

    pub fn empty_field(field: &str) -> Self {
        Self::Validation {
            field: field.to_string(),
            message: "must not be empty".to_string(),
        }
    }

    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// Wire `error.code` value per §6.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::DependencyCycle(_) => "DEPENDENCY_CYCLE",
            Self::CompletionBlocked(_) => "COMPLETION_BLOCKED",
            Self::Conflict { .. } => "CONFLICT",
            Self::DelegationDirection(_) => "DELEGATION_DIRECTION",
            Self::Duplicate(_) => "DUPLICATE",
            Self::MissingRequiredParam(_) => "MISSING_REQUIRED_PARAM",
            Self::AuthRequired => "AUTH_REQUIRED",
            Self::Forbidden => "FORBIDDEN",
            Self::Transient(_) => "TRANSIENT",
            Self::Database(_) => "TRANSIENT",
            Self::Internal(_) => "TRANSIENT",
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::Validation { .. } => 400,
            Self::InvalidTransition { .. } => 422,
            Self::DependencyCycle(_) => 422,
            Self::CompletionBlocked(_) => 422,
            Self::Conflict { .. } => 409,
            Self::DelegationDirection(_) => 400,
            Self::Duplicate(_) => 409,
            Self::MissingRequiredParam(_) => 400,
            Self::AuthRequired => 401,
            Self::Forbidden => 403,
            Self::Transient(_) => 503,
            Self::Database(_) => 500,
            Self::Internal(_) => 500,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_spec_taxonomy() {
        assert_eq!(OrchestratorError::AuthRequired.code(), "AUTH_REQUIRED");
        assert_eq!(OrchestratorError::Forbidden.code(), "FORBIDDEN");
        assert_eq!(
            OrchestratorError::Conflict { current_version: 3 }.code(),
            "CONFLICT"
        );
        assert_eq!(
            OrchestratorError::DependencyCycle(vec![]).status_code(),
            422
        );
    }

    #[test]
    fn not_found_helper() {
        let err = OrchestratorError::not_found("Task", "abc");
        assert!(err.is_not_found());
        assert_eq!(err.status_code(), 404);
    }
}
