//! Agent identity, lifecycle vocabulary, and the persisted agent record.
//!
//! `AgentRecord::status` is written only by the agent's FSM transition hook.
//! Everything else about an agent (permissions, pending confirmations, the
//! last controller state) lives in the same record so one store upsert
//! covers one agent update.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::confirmation::Confirmation;
use crate::execution::ControllerState;

/// Stable identifier for an agent record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(pub String);

impl AgentId {
    /// Create a fresh, random agent id.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AgentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The role an agent plays in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    System,
    Assistant,
    User,
    Tool,
    Admin,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::System => "system",
            AgentRole::Assistant => "assistant",
            AgentRole::User => "user",
            AgentRole::Tool => "tool",
            AgentRole::Admin => "admin",
        }
    }

    pub const ALL: [AgentRole; 5] = [
        AgentRole::System,
        AgentRole::Assistant,
        AgentRole::User,
        AgentRole::Tool,
        AgentRole::Admin,
    ];
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle states of an agent. These are the FSM states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Ready,
    Busy,
    Idle,
    Error,
    Offline,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Ready => "ready",
            AgentStatus::Busy => "busy",
            AgentStatus::Idle => "idle",
            AgentStatus::Error => "error",
            AgentStatus::Offline => "offline",
        }
    }

    pub const ALL: [AgentStatus; 5] = [
        AgentStatus::Ready,
        AgentStatus::Busy,
        AgentStatus::Idle,
        AgentStatus::Error,
        AgentStatus::Offline,
    ];
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events accepted by the agent FSM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentEvent {
    ExecuteTool,
    ExecuteTask,
    Pause,
    Complete,
    Error,
    Resume,
    Reset,
    Offline,
    Online,
}

impl AgentEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentEvent::ExecuteTool => "execute_tool",
            AgentEvent::ExecuteTask => "execute_task",
            AgentEvent::Pause => "pause",
            AgentEvent::Complete => "complete",
            AgentEvent::Error => "error",
            AgentEvent::Resume => "resume",
            AgentEvent::Reset => "reset",
            AgentEvent::Offline => "offline",
            AgentEvent::Online => "online",
        }
    }
}

impl fmt::Display for AgentEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One successful FSM transition, as kept in the agent's bounded log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: AgentStatus,
    pub event: AgentEvent,
    pub to: AgentStatus,
    pub timestamp: DateTime<Utc>,
    /// Caller-supplied context passed to `trigger`.
    #[serde(default)]
    pub context: serde_json::Value,
}

/// An event that matched no transition from the current state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvalidTransitionRecord {
    pub state: AgentStatus,
    pub event: AgentEvent,
    pub timestamp: DateTime<Utc>,
}

/// Structured per-agent memory persisted inside the agent record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentMemory {
    #[serde(default)]
    pub state_history: Vec<TransitionRecord>,

    #[serde(default)]
    pub invalid_transitions: Vec<InvalidTransitionRecord>,

    /// Pending human-in-the-loop confirmations, oldest first.
    #[serde(default)]
    pub confirmations: Vec<Confirmation>,

    /// The most recently persisted controller state for this agent.
    #[serde(default)]
    pub controller_state: Option<ControllerState>,

    #[serde(default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl AgentMemory {
    pub const STATE_HISTORY_CAP: usize = 20;
    pub const INVALID_TRANSITIONS_CAP: usize = 10;
    pub const PENDING_CONFIRMATIONS_CAP: usize = 50;

    /// Append a transition, dropping the oldest entries past the cap.
    pub fn push_transition(&mut self, record: TransitionRecord) {
        self.state_history.push(record);
        truncate_front(&mut self.state_history, Self::STATE_HISTORY_CAP);
    }

    pub fn push_invalid_transition(&mut self, record: InvalidTransitionRecord) {
        self.invalid_transitions.push(record);
        truncate_front(&mut self.invalid_transitions, Self::INVALID_TRANSITIONS_CAP);
    }

    /// Store a pending confirmation. Returns the confirmation evicted to stay
    /// under the cap, if any.
    pub fn push_confirmation(&mut self, confirmation: Confirmation) -> Option<Confirmation> {
        self.confirmations.push(confirmation);
        if self.confirmations.len() > Self::PENDING_CONFIRMATIONS_CAP {
            Some(self.confirmations.remove(0))
        } else {
            None
        }
    }

    pub fn find_confirmation(&self, id: &str) -> Option<&Confirmation> {
        self.confirmations.iter().find(|c| c.id == id)
    }

    /// Remove and return the pending confirmation with `id`.
    pub fn take_confirmation(&mut self, id: &str) -> Option<Confirmation> {
        let pos = self.confirmations.iter().position(|c| c.id == id)?;
        Some(self.confirmations.remove(pos))
    }
}

fn truncate_front<T>(items: &mut Vec<T>, cap: usize) {
    if items.len() > cap {
        let excess = items.len() - cap;
        items.drain(..excess);
    }
}

/// The persisted agent record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: AgentId,
    pub name: String,
    pub role: AgentRole,
    /// Mirrors the agent FSM's current state. Written only by the FSM hook.
    pub status: AgentStatus,
    #[serde(default)]
    pub session_id: Option<String>,
    /// Names of the tools this agent may execute.
    #[serde(default)]
    pub tool_permissions: BTreeSet<String>,
    #[serde(default)]
    pub memory: AgentMemory,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

impl AgentRecord {
    /// A fresh record in the `Ready` state with no permissions.
    pub fn new(
        id: AgentId,
        name: impl Into<String>,
        role: AgentRole,
        session_id: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            role,
            status: AgentStatus::Ready,
            session_id,
            tool_permissions: BTreeSet::new(),
            memory: AgentMemory::default(),
            created_at: now,
            last_active: now,
        }
    }

    pub fn has_permission(&self, tool: &str) -> bool {
        self.tool_permissions.contains(tool)
    }

    /// Grant `tool`. Returns false when it was already granted.
    pub fn grant(&mut self, tool: impl Into<String>) -> bool {
        self.tool_permissions.insert(tool.into())
    }

    /// Revoke `tool`. Returns false when it was not granted.
    pub fn revoke(&mut self, tool: &str) -> bool {
        self.tool_permissions.remove(tool)
    }
}
