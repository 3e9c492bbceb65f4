//! The agent lifecycle state machine.
//!
//! ```text
//! READY  --execute_tool | execute_task--> BUSY
//! READY  --pause-->    IDLE
//! BUSY   --complete--> READY
//! BUSY   --error-->    ERROR
//! IDLE   --resume-->   READY
//! ERROR  --reset-->    READY
//! ERROR  --offline-->  OFFLINE
//! OFFLINE --online-->  READY
//! ```
//!
//! Every applied transition is written back to the agent record (status plus
//! a bounded `state_history` entry) from inside the machine lock, which is
//! what keeps `AgentRecord::status` equal to the FSM state.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, warn};

use helm_contracts::{
    agent::{
        AgentEvent, AgentId, AgentRecord, AgentStatus, InvalidTransitionRecord, TransitionRecord,
    },
    error::{AgentError, HelmError, HelmResult},
    store::Record,
};

use crate::fsm::{NoHooks, StateMachine, Transition, TransitionHooks};
use crate::traits::RecordStore;

/// The fixed transition table for agents.
pub fn agent_transitions() -> Vec<Transition<AgentStatus, AgentEvent, Value>> {
    use AgentEvent as E;
    use AgentStatus as S;
    vec![
        Transition::new([S::Ready], E::ExecuteTool, S::Busy),
        Transition::new([S::Ready], E::ExecuteTask, S::Busy),
        Transition::new([S::Ready], E::Pause, S::Idle),
        Transition::new([S::Busy], E::Complete, S::Ready),
        Transition::new([S::Busy], E::Error, S::Error),
        Transition::new([S::Idle], E::Resume, S::Ready),
        Transition::new([S::Error], E::Reset, S::Ready),
        Transition::new([S::Error], E::Offline, S::Offline),
        Transition::new([S::Offline], E::Online, S::Ready),
    ]
}

/// Load, modify, and store one agent record under `lock`.
///
/// Returns `Ok(None)` when the agent has no record.
fn update_agent_record<R>(
    store: &dyn RecordStore,
    lock: &Mutex<()>,
    agent_id: &AgentId,
    apply: impl FnOnce(&mut AgentRecord) -> R,
) -> HelmResult<Option<R>> {
    let _guard = lock.lock().map_err(|e| HelmError::Store {
        reason: format!("agent record lock poisoned: {e}"),
    })?;
    let Some(mut record) = store.get_agent(agent_id.as_str())? else {
        return Ok(None);
    };
    let out = apply(&mut record);
    store.upsert(Record::Agent(record))?;
    Ok(Some(out))
}

/// Writes transitions into the agent record.
struct PersistHooks {
    agent_id: AgentId,
    store: Arc<dyn RecordStore>,
    record_lock: Arc<Mutex<()>>,
}

impl PersistHooks {
    fn update(&self, apply: impl FnOnce(&mut AgentRecord)) {
        match update_agent_record(self.store.as_ref(), &self.record_lock, &self.agent_id, apply) {
            Ok(Some(())) => {}
            Ok(None) => {
                debug!(agent_id = %self.agent_id, "no agent record yet, transition not persisted");
            }
            Err(e) => {
                warn!(agent_id = %self.agent_id, error = %e, "failed to persist agent transition");
            }
        }
    }
}

impl TransitionHooks<AgentStatus, AgentEvent, Value> for PersistHooks {
    fn on_transition(&self, from: AgentStatus, event: AgentEvent, to: AgentStatus, ctx: &Value) {
        self.update(|record| {
            let now = Utc::now();
            record.status = to;
            record.last_active = now;
            record.memory.push_transition(TransitionRecord {
                from,
                event,
                to,
                timestamp: now,
                context: ctx.clone(),
            });
        });
    }

    fn on_invalid_transition(&self, state: AgentStatus, event: AgentEvent, _ctx: &Value) {
        self.update(|record| {
            record.memory.push_invalid_transition(InvalidTransitionRecord {
                state,
                event,
                timestamp: Utc::now(),
            });
        });
    }
}

/// The lifecycle machine of one agent.
///
/// Obtain instances through `AgentManager::fsm_for_agent` so that every
/// caller shares the same machine (and lock) for a given agent.
///
/// The machine also owns the agent's record lock. Transition hooks and
/// `update_record` both take it, so a confirmation write can never clobber a
/// concurrent status write.
pub struct AgentFsm {
    agent_id: AgentId,
    machine: StateMachine<AgentStatus, AgentEvent, Value>,
    store: Option<Arc<dyn RecordStore>>,
    record_lock: Arc<Mutex<()>>,
}

impl AgentFsm {
    /// Build the machine for `agent_id`, starting from its persisted status,
    /// or `Ready` when the agent has no record yet.
    pub fn load(agent_id: AgentId, store: Arc<dyn RecordStore>) -> HelmResult<Self> {
        let initial = store
            .get_agent(agent_id.as_str())?
            .map(|record| record.status)
            .unwrap_or(AgentStatus::Ready);

        debug!(agent_id = %agent_id, status = %initial, "agent fsm loaded");

        let record_lock = Arc::new(Mutex::new(()));
        let hooks = PersistHooks {
            agent_id: agent_id.clone(),
            store: Arc::clone(&store),
            record_lock: Arc::clone(&record_lock),
        };
        Ok(Self {
            agent_id,
            machine: StateMachine::new(initial, agent_transitions()).with_hooks(hooks),
            store: Some(store),
            record_lock,
        })
    }

    /// A machine that persists nothing.
    pub fn detached(agent_id: AgentId, initial: AgentStatus) -> Self {
        Self {
            agent_id,
            machine: StateMachine::new(initial, agent_transitions()).with_hooks(NoHooks),
            store: None,
            record_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    pub fn current_state(&self) -> HelmResult<AgentStatus> {
        self.machine.current_state()
    }

    pub fn trigger(&self, event: AgentEvent) -> HelmResult<bool> {
        self.machine.trigger(event, &Value::Null)
    }

    /// Trigger with context that is stored alongside the transition.
    pub fn trigger_with(&self, event: AgentEvent, ctx: &Value) -> HelmResult<bool> {
        self.machine.trigger(event, ctx)
    }

    pub fn can_trigger(&self, event: AgentEvent) -> HelmResult<bool> {
        self.machine.can_trigger(event, &Value::Null)
    }

    pub fn available_events(&self) -> HelmResult<Vec<AgentEvent>> {
        self.machine.available_events(&Value::Null)
    }

    /// Apply `apply` to the persisted agent record under the record lock.
    ///
    /// Never call `trigger` from inside `apply`: hooks take the same lock.
    pub fn update_record<R>(&self, apply: impl FnOnce(&mut AgentRecord) -> R) -> HelmResult<R> {
        let store = self.store.as_ref().ok_or_else(|| HelmError::Store {
            reason: format!("agent '{}' has a detached state machine", self.agent_id),
        })?;
        update_agent_record(store.as_ref(), &self.record_lock, &self.agent_id, apply)?.ok_or_else(
            || {
                AgentError::AgentNotFound {
                    agent_id: self.agent_id.to_string(),
                }
                .into()
            },
        )
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
