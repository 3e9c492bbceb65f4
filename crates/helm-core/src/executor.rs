//! The agent-level tool executor.
//!
//! `AgentHandle` wraps the tool registry with the agent's lifecycle and
//! permission checks:
//!
//!   Lookup → Lifecycle gate → Permission → [Confirmation] → BUSY → Run → READY | ERROR
//!
//! The tool body is never reached unless the agent is READY and holds the
//! tool. Gate failures are returned as `Err(AgentError)` and leave the FSM
//! untouched. Failures of the tool itself are folded into a
//! `ToolInvocation::Failed` value after moving the agent to ERROR; they are
//! never raised past this boundary.

use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use helm_contracts::{
    agent::{AgentEvent, AgentId, AgentRecord, AgentStatus},
    confirmation::{Confirmation, ConfirmationType},
    error::{AgentError, HelmResult},
    tool::{ToolInvocation, ToolOutput},
};

use crate::agent_fsm::AgentFsm;
use crate::traits::{RecordStore, ToolDispatcher};

/// A cheap, cloneable handle to one agent's execution surface.
#[derive(Clone)]
pub struct AgentHandle {
    agent_id: AgentId,
    fsm: Arc<AgentFsm>,
    store: Arc<dyn RecordStore>,
    tools: Arc<dyn ToolDispatcher>,
}

impl AgentHandle {
    pub fn new(
        fsm: Arc<AgentFsm>,
        store: Arc<dyn RecordStore>,
        tools: Arc<dyn ToolDispatcher>,
    ) -> Self {
        Self {
            agent_id: fsm.agent_id().clone(),
            fsm,
            store,
            tools,
        }
    }

    pub fn id(&self) -> &AgentId {
        &self.agent_id
    }

    pub fn fsm(&self) -> &Arc<AgentFsm> {
        &self.fsm
    }

    pub fn tools(&self) -> &Arc<dyn ToolDispatcher> {
        &self.tools
    }

    pub fn status(&self) -> HelmResult<AgentStatus> {
        self.fsm.current_state()
    }

    pub fn trigger(&self, event: AgentEvent) -> HelmResult<bool> {
        self.fsm.trigger(event)
    }

    /// The persisted record of this agent.
    pub fn record(&self) -> HelmResult<AgentRecord> {
        self.store.get_agent(self.agent_id.as_str())?.ok_or_else(|| {
            AgentError::AgentNotFound {
                agent_id: self.agent_id.to_string(),
            }
            .into()
        })
    }

    /// Apply `apply` to the persisted record under the agent's record lock.
    pub fn update_record<R>(&self, apply: impl FnOnce(&mut AgentRecord) -> R) -> HelmResult<R> {
        self.fsm.update_record(apply)
    }

    /// Run `tool` on behalf of this agent.
    ///
    /// # Pipeline
    ///
    /// 1. Look the tool up; unknown → `AgentError::ToolNotFound`
    /// 2. The FSM must accept `execute_tool`; otherwise `AgentError::NotReady`
    /// 3. The agent must hold the tool name and every permission the tool
    ///    declares; otherwise `AgentError::PermissionDenied`
    /// 4. With `require_confirmation`, park a `tool_execution` confirmation
    ///    and return `ConfirmationRequired` without running anything
    /// 5. `execute_tool` → BUSY, run, then `complete` → READY on success or
    ///    `error` → ERROR on failure
    pub fn execute_tool(
        &self,
        tool: &str,
        parameters: Value,
        require_confirmation: bool,
    ) -> HelmResult<ToolInvocation> {
        let agent_id = self.agent_id.as_str();

        // ── Step 1: Tool lookup ──────────────────────────────────────────────
        let definition = self.tools.definition(tool).ok_or_else(|| AgentError::ToolNotFound {
            tool: tool.to_string(),
        })?;

        // ── Step 2: Lifecycle gate ───────────────────────────────────────────
        if !self.fsm.can_trigger(AgentEvent::ExecuteTool)? {
            let status = self.fsm.current_state()?;
            warn!(agent_id = %agent_id, tool = %tool, status = %status, "agent not ready for tool");
            return Err(AgentError::NotReady {
                agent_id: agent_id.to_string(),
                status: status.to_string(),
            }
            .into());
        }

        // ── Step 3: Permission check ─────────────────────────────────────────
        let record = self.record()?;
        if !record.has_permission(tool) {
            warn!(agent_id = %agent_id, tool = %tool, "tool permission missing");
            return Err(AgentError::PermissionDenied {
                agent_id: agent_id.to_string(),
                tool: tool.to_string(),
            }
            .into());
        }
        if let Some(missing) = definition
            .required_permissions
            .iter()
            .find(|p| !record.has_permission(p))
        {
            warn!(
                agent_id = %agent_id,
                tool = %tool,
                permission = %missing,
                "tool requires a permission the agent does not hold"
            );
            return Err(AgentError::PermissionDenied {
                agent_id: agent_id.to_string(),
                tool: tool.to_string(),
            }
            .into());
        }

        // ── Step 4: Confirmation gate ────────────────────────────────────────
        if require_confirmation {
            let confirmation = self.request_confirmation(
                ConfirmationType::ToolExecution,
                format!("Execute tool '{tool}'"),
                json!({ "tool": tool, "parameters": parameters }),
            )?;
            info!(
                agent_id = %agent_id,
                tool = %tool,
                confirmation_id = %confirmation.id,
                "tool execution awaiting confirmation"
            );
            return Ok(ToolInvocation::ConfirmationRequired {
                confirmation_id: confirmation.id,
                message: format!("Tool '{tool}' requires confirmation before it runs"),
            });
        }

        // ── Step 5: Execute under BUSY ───────────────────────────────────────
        self.run_tool(tool, &parameters)
    }

    fn run_tool(&self, tool: &str, parameters: &Value) -> HelmResult<ToolInvocation> {
        let agent_id = self.agent_id.as_str();

        // Another caller may have won the race since the gate check.
        if !self.fsm.trigger_with(AgentEvent::ExecuteTool, &json!({ "tool": tool }))? {
            return Err(AgentError::NotReady {
                agent_id: agent_id.to_string(),
                status: self.fsm.current_state()?.to_string(),
            }
            .into());
        }

        let start = Instant::now();
        match self.tools.execute_tool(tool, parameters, Some(agent_id), true) {
            Ok(output) => {
                self.fsm.trigger(AgentEvent::Complete)?;
                info!(
                    agent_id = %agent_id,
                    tool = %tool,
                    success = output.success,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "tool executed"
                );
                Ok(ToolInvocation::Completed { output })
            }
            Err(e) => {
                self.fsm.trigger_with(
                    AgentEvent::Error,
                    &json!({ "tool": tool, "error": e.to_string() }),
                )?;
                error!(
                    agent_id = %agent_id,
                    tool = %tool,
                    error = %e,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "tool failed, agent moved to error"
                );
                Ok(ToolInvocation::Failed {
                    error: e.to_string(),
                    error_type: e.kind().to_string(),
                })
            }
        }
    }

    // ── Confirmations ────────────────────────────────────────────────────────

    /// Park an action behind a new confirmation and persist it.
    pub fn request_confirmation(
        &self,
        confirmation_type: ConfirmationType,
        description: impl Into<String>,
        data: Value,
    ) -> HelmResult<Confirmation> {
        let confirmation =
            Confirmation::new(self.agent_id.as_str(), confirmation_type, description, data);
        let stored = confirmation.clone();
        let evicted = self.update_record(move |record| record.memory.push_confirmation(stored))?;
        if let Some(old) = evicted {
            warn!(
                agent_id = %self.agent_id,
                confirmation_id = %old.id,
                "pending confirmation cap reached, oldest dropped"
            );
        }
        Ok(confirmation)
    }

    /// Ask for approval before firing `event` on this agent's FSM.
    pub fn request_state_change(
        &self,
        event: AgentEvent,
        description: impl Into<String>,
    ) -> HelmResult<Confirmation> {
        self.request_confirmation(
            ConfirmationType::StateChange,
            description,
            json!({ "event": event }),
        )
    }

    pub fn pending_confirmations(&self) -> HelmResult<Vec<Confirmation>> {
        Ok(self.record()?.memory.confirmations)
    }

    /// Consume confirmation `id` and perform the action it gates.
    ///
    /// `tool_execution` re-runs the tool with confirmation off. `state_change`
    /// fires the stored event. Other types stay pending and yield
    /// `AgentError::UnsupportedConfirmation`. A second call with the same id
    /// fails with `AgentError::ConfirmationNotFound`.
    pub fn execute_confirmation(&self, id: &str) -> HelmResult<ToolInvocation> {
        let confirmation = self.update_record(|record| {
            let ctype = record.memory.find_confirmation(id).map(|c| c.confirmation_type);
            match ctype {
                None => Err(AgentError::ConfirmationNotFound {
                    confirmation_id: id.to_string(),
                }),
                Some(ConfirmationType::ToolExecution | ConfirmationType::StateChange) => record
                    .memory
                    .take_confirmation(id)
                    .ok_or_else(|| AgentError::ConfirmationNotFound {
                        confirmation_id: id.to_string(),
                    }),
                Some(other) => Err(AgentError::UnsupportedConfirmation {
                    confirmation_type: other.to_string(),
                }),
            }
        })??;

        debug!(
            agent_id = %self.agent_id,
            confirmation_id = %id,
            confirmation_type = %confirmation.confirmation_type,
            "executing confirmation"
        );

        match confirmation.confirmation_type {
            ConfirmationType::StateChange => {
                let event: AgentEvent = serde_json::from_value(confirmation.data["event"].clone())
                    .map_err(|e| AgentError::UnsupportedConfirmation {
                        confirmation_type: format!("state_change with invalid event: {e}"),
                    })?;
                let applied = self
                    .fsm
                    .trigger_with(event, &json!({ "confirmation_id": confirmation.id }))?;
                let status = self.fsm.current_state()?;
                let message = if applied {
                    format!("state change '{event}' applied, agent is now {status}")
                } else {
                    format!("state change '{event}' not valid from {status}")
                };
                let output = if applied {
                    ToolOutput::ok(message)
                } else {
                    ToolOutput::unsuccessful(message, None)
                };
                Ok(ToolInvocation::Completed {
                    output: output.with_data(json!({ "event": event, "status": status })),
                })
            }
            _ => {
                let tool = confirmation.data["tool"].as_str().unwrap_or_default().to_string();
                let parameters = confirmation.data["parameters"].clone();
                self.execute_tool(&tool, parameters, false)
            }
        }
    }

    /// Discard confirmation `id` without performing its action.
    pub fn reject_confirmation(&self, id: &str) -> HelmResult<Confirmation> {
        let taken = self.update_record(|record| record.memory.take_confirmation(id))?;
        let confirmation = taken.ok_or_else(|| AgentError::ConfirmationNotFound {
            confirmation_id: id.to_string(),
        })?;
        info!(agent_id = %self.agent_id, confirmation_id = %id, "confirmation rejected");
        Ok(confirmation)
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use helm_contracts::{
        agent::{AgentEvent, AgentId, AgentRecord, AgentRole, AgentStatus},
        confirmation::ConfirmationType,
        error::{AgentError, HelmError, ToolError},
        store::Record,
        tool::{ToolInvocation, ToolOutput},
    };

    use super::AgentHandle;
    use crate::agent_fsm::AgentFsm;
    use crate::testing::{MockStore, MockTools};
    use crate::traits::RecordStore;

    fn tools() -> MockTools {
        MockTools::default()
            .with_tool("run_command", |params| {
                Ok(ToolOutput::ok(format!("ran {}", params["command"].as_str().unwrap_or(""))))
            })
            .with_tool("explode", |_| {
                Err(ToolError::Execution {
                    tool: "explode".into(),
                    reason: "boom".into(),
                })
            })
    }

    fn handle_with(tools: MockTools, permissions: &[&str]) -> (AgentHandle, Arc<MockStore>) {
        let store = Arc::new(MockStore::default());
        let mut record = AgentRecord::new(AgentId::from("a"), "A", AgentRole::Assistant, None);
        for p in permissions {
            record.grant(*p);
        }
        store.upsert(Record::Agent(record)).unwrap();

        let fsm = Arc::new(AgentFsm::load(AgentId::from("a"), store.clone()).unwrap());
        (AgentHandle::new(fsm, store.clone(), Arc::new(tools)), store)
    }

    // ── Gates ────────────────────────────────────────────────────────────────

    #[test]
    fn missing_permission_is_rejected_without_transition() {
        let (handle, store) = handle_with(tools(), &[]);

        let err = handle
            .execute_tool("run_command", json!({ "command": "ls" }), false)
            .unwrap_err();

        assert!(err.to_string().contains("does not have permission"));
        assert!(matches!(err, HelmError::Agent(AgentError::PermissionDenied { .. })));
        assert_eq!(handle.status().unwrap(), AgentStatus::Ready);
        let saved = store.get_agent("a").unwrap().unwrap();
        assert!(saved.memory.state_history.is_empty(), "no transition attempted");
    }

    #[test]
    fn granted_permission_runs_ready_busy_ready() {
        let (handle, store) = handle_with(tools(), &["run_command"]);

        let result = handle
            .execute_tool("run_command", json!({ "command": "ls" }), false)
            .unwrap();

        assert!(result.is_success());
        assert_eq!(result.observation_text(), "ran ls");
        assert_eq!(handle.status().unwrap(), AgentStatus::Ready);

        let history = store.get_agent("a").unwrap().unwrap().memory.state_history;
        let path: Vec<_> = history.iter().map(|t| (t.from, t.to)).collect();
        assert_eq!(
            path,
            vec![(AgentStatus::Ready, AgentStatus::Busy), (AgentStatus::Busy, AgentStatus::Ready)]
        );
    }

    #[test]
    fn unknown_tool_is_rejected() {
        let (handle, _) = handle_with(tools(), &["ghost"]);
        let err = handle.execute_tool("ghost", json!({}), false).unwrap_err();
        assert!(matches!(err, HelmError::Agent(AgentError::ToolNotFound { .. })));
    }

    #[test]
    fn declared_permissions_are_enforced() {
        let tools = MockTools::default().with_permissioned_tool("deploy", &["prod:write"]);
        let (handle, _) = handle_with(tools, &["deploy"]);

        let err = handle.execute_tool("deploy", json!({}), false).unwrap_err();
        assert!(matches!(err, HelmError::Agent(AgentError::PermissionDenied { .. })));

        handle.update_record(|r| r.grant("prod:write")).unwrap();
        assert!(handle.execute_tool("deploy", json!({}), false).unwrap().is_success());
    }

    #[test]
    fn busy_or_errored_agent_is_not_ready() {
        let (handle, _) = handle_with(tools(), &["run_command"]);
        handle.trigger(AgentEvent::Pause).unwrap();

        let err = handle.execute_tool("run_command", json!({}), false).unwrap_err();
        match err {
            HelmError::Agent(AgentError::NotReady { status, .. }) => assert_eq!(status, "idle"),
            other => panic!("expected NotReady, got {:?}", other),
        }
    }

    // ── Failures ─────────────────────────────────────────────────────────────

    #[test]
    fn tool_failure_becomes_structured_result_and_error_state() {
        let (handle, _) = handle_with(tools(), &["explode"]);

        let result = handle.execute_tool("explode", json!({}), false).unwrap();

        match &result {
            ToolInvocation::Failed { error, error_type } => {
                assert_eq!(error_type, "execution");
                assert!(error.contains("boom"));
            }
            other => panic!("expected Failed, got {:?}", other),
        }
        assert_eq!(handle.status().unwrap(), AgentStatus::Error);

        // Recoverable through reset.
        assert!(handle.trigger(AgentEvent::Reset).unwrap());
        assert_eq!(handle.status().unwrap(), AgentStatus::Ready);
    }

    // ── Confirmations ────────────────────────────────────────────────────────

    #[test]
    fn confirmation_round_trip_executes_exactly_once() {
        let tools = tools();
        let calls = tools.calls.clone();
        let (handle, _) = handle_with(tools, &["run_command"]);

        let parked = handle
            .execute_tool("run_command", json!({ "command": "rm -rf build" }), true)
            .unwrap();
        let id = match parked {
            ToolInvocation::ConfirmationRequired { confirmation_id, .. } => confirmation_id,
            other => panic!("expected ConfirmationRequired, got {:?}", other),
        };
        assert!(calls.lock().unwrap().is_empty(), "tool must not run before confirmation");
        assert_eq!(handle.pending_confirmations().unwrap().len(), 1);

        let result = handle.execute_confirmation(&id).unwrap();
        assert_eq!(result.observation_text(), "ran rm -rf build");
        assert_eq!(calls.lock().unwrap().len(), 1);
        assert!(handle.pending_confirmations().unwrap().is_empty());

        let err = handle.execute_confirmation(&id).unwrap_err();
        assert!(err.to_string().contains("not found"));
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn confirmations_get_fresh_ids() {
        let (handle, _) = handle_with(tools(), &["run_command"]);
        let a = handle.execute_tool("run_command", json!({}), true).unwrap();
        let b = handle.execute_tool("run_command", json!({}), true).unwrap();
        assert_ne!(a, b);
        assert_eq!(handle.pending_confirmations().unwrap().len(), 2);
    }

    #[test]
    fn state_change_confirmation_fires_event() {
        let (handle, _) = handle_with(tools(), &[]);
        let c = handle.request_state_change(AgentEvent::Pause, "pause for review").unwrap();

        let result = handle.execute_confirmation(&c.id).unwrap();
        assert!(result.is_success());
        assert_eq!(handle.status().unwrap(), AgentStatus::Idle);
    }

    #[test]
    fn unsupported_confirmation_stays_pending() {
        let (handle, _) = handle_with(tools(), &[]);
        let c = handle
            .request_confirmation(ConfirmationType::DataAccess, "read secrets", json!({}))
            .unwrap();

        let err = handle.execute_confirmation(&c.id).unwrap_err();
        assert!(matches!(err, HelmError::Agent(AgentError::UnsupportedConfirmation { .. })));
        assert_eq!(handle.pending_confirmations().unwrap().len(), 1);
    }

    #[test]
    fn rejected_confirmation_never_runs() {
        let tools = tools();
        let calls = tools.calls.clone();
        let (handle, _) = handle_with(tools, &["run_command"]);

        let id = match handle.execute_tool("run_command", json!({}), true).unwrap() {
            ToolInvocation::ConfirmationRequired { confirmation_id, .. } => confirmation_id,
            other => panic!("expected ConfirmationRequired, got {:?}", other),
        };
        handle.reject_confirmation(&id).unwrap();

        assert!(handle.execute_confirmation(&id).is_err());
        assert!(calls.lock().unwrap().is_empty());
    }
}
