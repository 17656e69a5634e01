//! Maps [`OrchestratorError`] to an HTTP response (§7). `ApiError` is the
//! `IntoResponse` seam axum's extractors/handlers return through; the
//! `{code, message, meta}` body shape and diagnostic `meta` fields mirror
//! what [`crate::response::ResponseOptimizer::error`] produces for the
//! dispatcher's own success path, via the shared [`error_meta`] helper.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Map, Value};

use task_core::error::OrchestratorError;

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub OrchestratorError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(json!({
            "success": false,
            "error": {
                "code": self.0.code(),
                "message": self.0.to_string(),
                "meta": error_meta(&self.0),
            },
        }));
        (status, body).into_response()
    }
}

/// Diagnostic `meta` fields named in §7: `field` for validation failures,
/// `from`/`to` for rejected state transitions, `cycle` for dependency
/// cycles, `blockers` for completion-blocked, `current_version` for CAS
/// conflicts, `missing` for absent required parameters.
pub fn error_meta(err: &OrchestratorError) -> Map<String, Value> {
    let mut meta = Map::new();
    match err {
        OrchestratorError::Validation { field, .. } => {
            meta.insert("field".to_string(), json!(field));
        }
        OrchestratorError::InvalidTransition { from, to } => {
            meta.insert("from".to_string(), json!(from.to_string()));
            meta.insert("to".to_string(), json!(to.to_string()));
        }
        OrchestratorError::DependencyCycle(cycle) => {
            meta.insert("cycle".to_string(), json!(cycle));
        }
        OrchestratorError::CompletionBlocked(blockers) => {
            meta.insert("blockers".to_string(), json!(blockers));
        }
        OrchestratorError::Conflict { current_version } => {
            meta.insert("current_version".to_string(), json!(current_version));
        }
        OrchestratorError::MissingRequiredParam(fields) => {
            meta.insert("missing".to_string(), json!(fields));
        }
        _ => {}
    }
    meta
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn not_found_maps_to_404() {
        let err = ApiError(OrchestratorError::not_found("Task", "abc"));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["code"], json!("NOT_FOUND"));
    }

    #[tokio::test]
    async fn conflict_meta_carries_current_version() {
        let err = ApiError(OrchestratorError::Conflict { current_version: 7 });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["meta"]["current_version"], json!(7));
    }

    #[tokio::test]
    async fn auth_required_maps_to_401() {
        let err = ApiError(OrchestratorError::AuthRequired);
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
