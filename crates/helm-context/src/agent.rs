//! A per-agent view combining the agent record with its session context.

use serde::{Deserialize, Serialize};

use helm_contracts::{
    agent::{AgentId, AgentRole, AgentStatus, TransitionRecord},
    confirmation::Confirmation,
    context::ContextSnapshot,
    error::{AgentError, HelmResult},
};
use helm_core::AgentManager;

use crate::store::ContextStore;

/// How many of the newest state transitions an `AgentContext` carries.
pub const RECENT_TRANSITIONS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentContext {
    pub agent_id: AgentId,
    pub name: String,
    pub role: AgentRole,
    pub status: AgentStatus,
    pub session_id: Option<String>,
    pub tool_permissions: Vec<String>,
    pub pending_confirmations: Vec<Confirmation>,
    pub recent_transitions: Vec<TransitionRecord>,
    pub context: ContextSnapshot,
}

/// Adds `agent_context` to `AgentManager`.
pub trait AgentContextExt {
    /// The agent's record plus a snapshot of its session's context,
    /// restricted to `types` when given.
    fn agent_context(
        &self,
        agent_id: &AgentId,
        contexts: &ContextStore,
        types: Option<&[&str]>,
        token_limit: usize,
    ) -> HelmResult<AgentContext>;
}

impl AgentContextExt for AgentManager {
    fn agent_context(
        &self,
        agent_id: &AgentId,
        contexts: &ContextStore,
        types: Option<&[&str]>,
        token_limit: usize,
    ) -> HelmResult<AgentContext> {
        let record = self
            .store()
            .get_agent(agent_id.as_str())?
            .ok_or_else(|| AgentError::AgentNotFound {
                agent_id: agent_id.to_string(),
            })?;

        let session_id = record.session_id.as_deref();
        let context = match types {
            Some(types) => contexts.get_context_for_types(session_id, types, token_limit)?,
            None => contexts.get_full_context(session_id, token_limit)?,
        };

        let history = &record.memory.state_history;
        let recent_transitions = history[history.len().saturating_sub(RECENT_TRANSITIONS)..].to_vec();

        Ok(AgentContext {
            agent_id: record.id.clone(),
            name: record.name.clone(),
            role: record.role,
            status: record.status,
            session_id: record.session_id.clone(),
            tool_permissions: record.tool_permissions.iter().cloned().collect(),
            pending_confirmations: record.memory.confirmations.clone(),
            recent_transitions,
            context,
        })
    }
}
