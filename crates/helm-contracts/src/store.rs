//! Record envelope and query filter for the key-value record store.
//!
//! The store only needs CRUD plus query-by-kind. Records are keyed by
//! `(kind, id)`, so an agent and a context item may share an id string
//! without colliding.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::agent::AgentRecord;
use crate::context::ContextItem;
use crate::tool::{ToolResult, ToolUsage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Agent,
    ToolUsage,
    ToolResult,
    ContextItem,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Agent => "agent",
            RecordKind::ToolUsage => "tool_usage",
            RecordKind::ToolResult => "tool_result",
            RecordKind::ContextItem => "context_item",
        }
    }

    /// Kinds that may be inserted once and never overwritten.
    pub fn is_append_only(&self) -> bool {
        matches!(self, RecordKind::ToolUsage | RecordKind::ToolResult)
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Any record the core persists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    Agent(AgentRecord),
    ToolUsage(ToolUsage),
    ToolResult(ToolResult),
    ContextItem(ContextItem),
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Agent(_) => RecordKind::Agent,
            Record::ToolUsage(_) => RecordKind::ToolUsage,
            Record::ToolResult(_) => RecordKind::ToolResult,
            Record::ContextItem(_) => RecordKind::ContextItem,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Record::Agent(a) => a.id.as_str(),
            Record::ToolUsage(u) => &u.id,
            Record::ToolResult(r) => &r.id,
            Record::ContextItem(c) => &c.id,
        }
    }

    pub fn into_agent(self) -> Option<AgentRecord> {
        match self {
            Record::Agent(a) => Some(a),
            _ => None,
        }
    }

    pub fn into_tool_usage(self) -> Option<ToolUsage> {
        match self {
            Record::ToolUsage(u) => Some(u),
            _ => None,
        }
    }

    pub fn into_tool_result(self) -> Option<ToolResult> {
        match self {
            Record::ToolResult(r) => Some(r),
            _ => None,
        }
    }

    pub fn into_context_item(self) -> Option<ContextItem> {
        match self {
            Record::ContextItem(c) => Some(c),
            _ => None,
        }
    }
}

/// Conjunctive filter for `RecordStore::query`. Unset fields match anything.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RecordFilter {
    pub kind: Option<RecordKind>,
    /// Exact session match. Records without a session never match a set value.
    pub session_id: Option<String>,
    /// Context item type, or tool name for tool usages.
    pub item_type: Option<String>,
    pub agent_id: Option<String>,
}

impl RecordFilter {
    pub fn kind(kind: RecordKind) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_item_type(mut self, item_type: impl Into<String>) -> Self {
        self.item_type = Some(item_type.into());
        self
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn matches(&self, record: &Record) -> bool {
        if let Some(kind) = self.kind {
            if record.kind() != kind {
                return false;
            }
        }

        let (session, item_type, agent) = match record {
            Record::Agent(a) => (a.session_id.as_deref(), None, Some(a.id.as_str())),
            Record::ToolUsage(u) => (None, Some(u.tool_type.as_str()), u.agent_id.as_deref()),
            Record::ToolResult(_) => (None, None, None),
            Record::ContextItem(c) => (
                c.session_id.as_deref(),
                Some(c.item_type.as_str()),
                c.agent_id.as_deref(),
            ),
        };

        field_matches(self.session_id.as_deref(), session)
            && field_matches(self.item_type.as_deref(), item_type)
            && field_matches(self.agent_id.as_deref(), agent)
    }
}

fn field_matches(wanted: Option<&str>, actual: Option<&str>) -> bool {
    match wanted {
        None => true,
        Some(w) => actual == Some(w),
    }
}
