//! Human-in-the-loop confirmation records.
//!
//! A confirmation is created instead of running an action and is consumed
//! exactly once: either executed via `execute_confirmation` or discarded via
//! `reject_confirmation`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of action a confirmation gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationType {
    ToolExecution,
    TaskExecution,
    StateChange,
    DataAccess,
    Decision,
}

impl ConfirmationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfirmationType::ToolExecution => "tool_execution",
            ConfirmationType::TaskExecution => "task_execution",
            ConfirmationType::StateChange => "state_change",
            ConfirmationType::DataAccess => "data_access",
            ConfirmationType::Decision => "decision",
        }
    }
}

impl fmt::Display for ConfirmationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pending confirmation stored in the agent's memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Confirmation {
    pub id: String,
    pub agent_id: String,
    pub confirmation_type: ConfirmationType,
    pub description: String,
    /// Payload needed to replay the action, e.g. `{tool, parameters}`.
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Confirmation {
    pub fn new(
        agent_id: impl Into<String>,
        confirmation_type: ConfirmationType,
        description: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            agent_id: agent_id.into(),
            confirmation_type,
            description: description.into(),
            data,
            created_at: Utc::now(),
        }
    }
}
