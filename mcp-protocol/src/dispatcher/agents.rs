//! `manage_agent`'s directory. Agent-role invocation itself (resolving a
//! role label to a prompt descriptor) is an external collaborator per §1 —
//! this is just the thin registry backing `register`/`assign_to_branch`/
//! `unassign`/`list`, in-process only like the rest of C6.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Agent {
    pub id: String,
    pub display_name: String,
    pub registered_at: DateTime<Utc>,
}

pub struct AgentDirectory {
    agents: Mutex<Vec<Agent>>,
}

impl AgentDirectory {
    pub fn new() -> Self {
        Self { agents: Mutex::new(Vec::new()) }
    }

    pub fn register(&self, display_name: String) -> Agent {
        let agent = Agent { id: Uuid::new_v4().to_string(), display_name, registered_at: Utc::now() };
        self.agents.lock().expect("agent directory mutex poisoned").push(agent.clone());
        agent
    }

    pub fn list(&self) -> Vec<Agent> {
        self.agents.lock().expect("agent directory mutex poisoned").clone()
    }
}

impl Default for AgentDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_list_round_trips() {
        let directory = AgentDirectory::new();
        let agent = directory.register("coding-agent-1".to_string());
        let listed = directory.list();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, agent.id);
    }
}
