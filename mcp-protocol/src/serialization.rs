//! Wire envelope for the `/mcp/manage_*` routes (§6). The body carries the
//! umbrella command's `action` plus its own `params`; `agent`, when present,
//! both feeds C9's compliance tracking and nudges C7 toward `DETAILED`.

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
pub struct CommandRequest {
    pub action: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub agent: Option<String>,
}

pub const RESPONSE_FORMAT_HEADER: &str = "x-response-format";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_minimal_request() {
        let request: CommandRequest = serde_json::from_str(r#"{"action": "get", "params": {"id": "x"}}"#).unwrap();
        assert_eq!(request.action, "get");
        assert!(request.agent.is_none());
    }

    #[test]
    fn agent_field_is_optional() {
        let request: CommandRequest = serde_json::from_str(r#"{"action": "create", "params": {}, "agent": "coding-agent-1"}"#).unwrap();
        assert_eq!(request.agent.as_deref(), Some("coding-agent-1"));
    }
}
