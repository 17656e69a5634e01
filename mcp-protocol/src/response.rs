//! C7: Response Optimizer (§4.7). Shapes a dispatcher result into one of
//! five profiles. Every profile is additive over the stable subset
//! `{success, data|error}` — optimizer failure never fails the call, it
//! falls back to an unwrapped `STANDARD` envelope.

use chrono::Utc;
use serde_json::{json, Value};

use task_core::error::OrchestratorError;

use crate::error::error_meta;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseProfile {
    Minimal,
    Standard,
    Detailed,
    Debug,
    Legacy,
}

impl ResponseProfile {
    /// Selects a profile from the `X-Response-Format` header value and
    /// whether the caller advertised itself as an agent (the `agent` param).
    pub fn select(format_header: Option<&str>, caller_is_agent: bool) -> Self {
        match format_header.map(str::to_ascii_lowercase).as_deref() {
            Some("minimal") => ResponseProfile::Minimal,
            Some("debug") => ResponseProfile::Debug,
            Some("legacy") => ResponseProfile::Legacy,
            Some("detailed") => ResponseProfile::Detailed,
            _ if caller_is_agent => ResponseProfile::Detailed,
            _ => ResponseProfile::Standard,
        }
    }
}

/// Workflow hints attached to `DETAILED` responses.
#[derive(Debug, Clone, Default)]
pub struct Hints {
    pub next: Option<String>,
    pub required_actions: Vec<String>,
    pub recommendations: Vec<String>,
}

pub struct ResponseOptimizer {
    pub enabled: bool,
}

impl ResponseOptimizer {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn success(&self, profile: ResponseProfile, operation: &str, data: Value, hints: Option<Hints>) -> Value {
        if !self.enabled {
            return self.fallback_success(operation, data);
        }
        self.shape_success(profile, operation, data, hints)
    }

    fn fallback_success(&self, operation: &str, data: Value) -> Value {
        json!({
            "success": true,
            "data": data,
            "meta": { "operation": operation, "timestamp": Utc::now().to_rfc3339() },
        })
    }

    fn shape_success(&self, profile: ResponseProfile, operation: &str, data: Value, hints: Option<Hints>) -> Value {
        match profile {
            ResponseProfile::Minimal => json!({ "success": true, "data": data }),
            ResponseProfile::Standard => json!({
                "success": true,
                "data": data,
                "meta": { "operation": operation, "timestamp": Utc::now().to_rfc3339() },
            }),
            ResponseProfile::Detailed => {
                let mut body = json!({
                    "success": true,
                    "data": data,
                    "meta": { "operation": operation, "timestamp": Utc::now().to_rfc3339() },
                });
                if let Some(h) = hints {
                    body["hints"] = json!({
                        "next": h.next,
                        "required_actions": h.required_actions,
                        "recommendations": h.recommendations,
                    });
                }
                body
            }
            ResponseProfile::Debug => json!({
                "success": true,
                "data": data,
                "meta": {
                    "operation": operation,
                    "timestamp": Utc::now().to_rfc3339(),
                    "debug": true,
                },
            }),
            ResponseProfile::Legacy => json!({
                "status": "ok",
                "confirmation": true,
                "operation_id": operation,
                "timestamp": Utc::now().to_rfc3339(),
                "data": data,
            }),
        }
    }

    /// Error shaping always preserves `error.code`; `meta` carries the
    /// diagnostic fields named in §7 (`field`, `from`/`to`, `cycle`,
    /// `blockers`, `current_version`).
    pub fn error(&self, profile: ResponseProfile, err: &OrchestratorError) -> Value {
        let meta = error_meta(err);
        let body = json!({
            "success": false,
            "error": { "code": err.code(), "message": err.to_string(), "meta": meta },
        });
        if profile == ResponseProfile::Legacy {
            json!({
                "status": "error",
                "confirmation": false,
                "operation_id": Value::Null,
                "timestamp": Utc::now().to_rfc3339(),
                "error": body["error"].clone(),
            })
        } else {
            body
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_profile_omits_meta() {
        let optimizer = ResponseOptimizer::new(true);
        let body = optimizer.success(ResponseProfile::Minimal, "task.get", json!({"id": "x"}), None);
        assert_eq!(body["success"], json!(true));
        assert!(body.get("meta").is_none());
    }

    #[test]
    fn legacy_key_set_is_pinned() {
        let optimizer = ResponseOptimizer::new(true);
        let body = optimizer.success(ResponseProfile::Legacy, "task.update", json!({"id": "x"}), None);
        let mut keys: Vec<&str> = body.as_object().unwrap().keys().map(String::as_str).collect();
        keys.sort();
        assert_eq!(keys, vec!["confirmation", "data", "operation_id", "status", "timestamp"]);
    }

    #[test]
    fn detailed_profile_adds_hints() {
        let optimizer = ResponseOptimizer::new(true);
        let hints = Hints { next: Some("complete".to_string()), required_actions: vec![], recommendations: vec![] };
        let body = optimizer.success(ResponseProfile::Detailed, "task.create", json!({}), Some(hints));
        assert_eq!(body["hints"]["next"], json!("complete"));
    }

    #[test]
    fn error_preserves_code_and_conflict_meta() {
        let optimizer = ResponseOptimizer::new(true);
        let err = OrchestratorError::Conflict { current_version: 4 };
        let body = optimizer.error(ResponseProfile::Standard, &err);
        assert_eq!(body["error"]["code"], json!("CONFLICT"));
        assert_eq!(body["error"]["meta"]["current_version"], json!(4));
    }

    #[test]
    fn dependency_cycle_meta_carries_path() {
        let optimizer = ResponseOptimizer::new(true);
        let t1 = uuid::Uuid::new_v4();
        let err = OrchestratorError::DependencyCycle(vec![t1, t1]);
        let body = optimizer.error(ResponseProfile::Standard, &err);
        assert_eq!(body["error"]["meta"]["cycle"].as_array().unwrap().len(), 2);
    }
}
