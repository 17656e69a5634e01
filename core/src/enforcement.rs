//! C9: required/recommended parameter contracts per action, checked at a
//! configurable process-wide strictness level (§4.9).

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{OrchestratorError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnforcementLevel {
    Disabled,
    Soft,
    Warning,
    Strict,
}

impl Default for EnforcementLevel {
    fn default() -> Self {
        EnforcementLevel::Warning
    }
}

impl std::str::FromStr for EnforcementLevel {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "disabled" => Ok(Self::Disabled),
            "soft" => Ok(Self::Soft),
            "warning" => Ok(Self::Warning),
            "strict" => Ok(Self::Strict),
            other => Err(OrchestratorError::validation(
                "PARAMETER_ENFORCEMENT_LEVEL",
                format!("unknown enforcement level '{other}'"),
            )),
        }
    }
}

/// Required/recommended parameter sets for one action.
#[derive(Debug, Clone)]
pub struct ParamContract {
    pub required: &'static [&'static str],
    pub recommended: &'static [&'static str],
}

fn contract_for(action_key: &str) -> Option<ParamContract> {
    match action_key {
        "task.update" => Some(ParamContract {
            required: &["work_notes", "progress_made"],
            recommended: &["files_modified", "blockers_encountered"],
        }),
        "task.complete" => Some(ParamContract {
            required: &["completion_summary"],
            recommended: &["testing_notes", "deployment_notes"],
        }),
        "subtask.update" => Some(ParamContract {
            required: &["progress_notes"],
            recommended: &["impact_on_parent"],
        }),
        "subtask.complete" => Some(ParamContract {
            required: &["completion_summary"],
            recommended: &["impact_on_parent"],
        }),
        _ => None,
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComplianceRecord {
    pub agent_id: String,
    pub total: u64,
    pub compliant: u64,
    pub blocked: u64,
}

/// Outcome of one enforcement check, for the caller to decide how to shape
/// the response (hints at WARNING, a blocking error at STRICT).
pub struct EnforcementOutcome {
    pub missing_required: Vec<String>,
    pub missing_recommended: Vec<String>,
    pub blocked: bool,
}

pub struct Enforcer {
    level: EnforcementLevel,
    compliance: Mutex<HashMap<String, ComplianceRecord>>,
}

fn is_present(params: &HashMap<String, Value>, field: &str) -> bool {
    match params.get(field) {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        _ => true,
    }
}

impl Enforcer {
    pub fn new(level: EnforcementLevel) -> Self {
        Self {
            level,
            compliance: Mutex::new(HashMap::new()),
        }
    }

    pub fn level(&self) -> EnforcementLevel {
        self.level
    }

    /// `action_key` is `"{entity}.{action}"`, e.g. `"task.complete"`.
    pub fn check(
        &self,
        action_key: &str,
        agent_id: Option<&str>,
        params: &HashMap<String, Value>,
    ) -> Result<EnforcementOutcome> {
        let contract = contract_for(action_key);
        let (missing_required, missing_recommended) = match &contract {
            None => (Vec::new(), Vec::new()),
            Some(c) => (
                c.required.iter().filter(|f| !is_present(params, f)).map(|s| s.to_string()).collect(),
                c.recommended.iter().filter(|f| !is_present(params, f)).map(|s| s.to_string()).collect(),
            ),
        };

        let blocked = self.level == EnforcementLevel::Strict && !missing_required.is_empty();

        if let Some(agent_id) = agent_id {
            self.record_compliance(agent_id, missing_required.is_empty(), blocked);
        }

        if blocked {
            return Err(OrchestratorError::MissingRequiredParam(missing_required));
        }

        Ok(EnforcementOutcome {
            missing_required,
            missing_recommended,
            blocked: false,
        })
    }

    fn record_compliance(&self, agent_id: &str, compliant: bool, blocked: bool) {
        let mut map = self.compliance.lock().expect("compliance mutex poisoned");
        let record = map.entry(agent_id.to_string()).or_insert_with(|| ComplianceRecord {
            agent_id: agent_id.to_string(),
            ..Default::default()
        });
        record.total += 1;
        if compliant {
            record.compliant += 1;
        }
        if blocked {
            record.blocked += 1;
        }
    }

    pub fn compliance_for(&self, agent_id: &str) -> Option<ComplianceRecord> {
        self.compliance.lock().expect("compliance mutex poisoned").get(agent_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_never_blocks() {
        let enforcer = Enforcer::new(EnforcementLevel::Disabled);
        let params = HashMap::new();
        let outcome = enforcer.check("task.complete", Some("agent-1"), &params).unwrap();
        assert!(!outcome.blocked);
    }

    #[test]
    fn strict_blocks_on_missing_required() {
        let enforcer = Enforcer::new(EnforcementLevel::Strict);
        let params = HashMap::new();
        let result = enforcer.check("task.complete", Some("agent-1"), &params);
        assert!(result.is_err());
    }

    #[test]
    fn whitespace_only_treated_as_missing() {
        let enforcer = Enforcer::new(EnforcementLevel::Strict);
        let mut params = HashMap::new();
        params.insert("completion_summary".to_string(), Value::String("   ".to_string()));
        assert!(enforcer.check("task.complete", None, &params).is_err());
    }

    #[test]
    fn warning_allows_but_reports_missing() {
        let enforcer = Enforcer::new(EnforcementLevel::Warning);
        let params = HashMap::new();
        let outcome = enforcer.check("task.update", Some("agent-1"), &params).unwrap();
        assert!(!outcome.blocked);
        assert_eq!(outcome.missing_required.len(), 2);
    }
}
