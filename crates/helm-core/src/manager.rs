//! Agent creation, lookup, and permission management.
//!
//! The manager owns one `AgentFsm` per agent id. Every handle for the same
//! agent shares that machine, which is what makes the per-agent lock hold
//! across callers.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info};

use helm_contracts::{
    agent::{AgentId, AgentRecord, AgentRole},
    error::{AgentError, HelmError, HelmResult},
    store::{Record, RecordFilter, RecordKind},
};

use crate::agent_fsm::AgentFsm;
use crate::executor::AgentHandle;
use crate::traits::{RecordStore, ToolDispatcher};

pub struct AgentManager {
    store: Arc<dyn RecordStore>,
    tools: Arc<dyn ToolDispatcher>,
    fsms: Mutex<HashMap<AgentId, Arc<AgentFsm>>>,
}

impl AgentManager {
    pub fn new(store: Arc<dyn RecordStore>, tools: Arc<dyn ToolDispatcher>) -> Self {
        Self {
            store,
            tools,
            fsms: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn tools(&self) -> &Arc<dyn ToolDispatcher> {
        &self.tools
    }

    fn fsm_cache(&self) -> HelmResult<MutexGuard<'_, HashMap<AgentId, Arc<AgentFsm>>>> {
        self.fsms.lock().map_err(|e| HelmError::StateMachine {
            reason: format!("fsm cache lock poisoned: {e}"),
        })
    }

    /// The shared machine for `agent_id`, loading it on first use.
    ///
    /// A machine for an id with no agent record is handed out but not
    /// cached, so a later `create_agent` starts from the record's status.
    pub fn fsm_for_agent(&self, agent_id: &AgentId) -> HelmResult<Arc<AgentFsm>> {
        let mut fsms = self.fsm_cache()?;
        if let Some(fsm) = fsms.get(agent_id) {
            return Ok(Arc::clone(fsm));
        }
        let fsm = Arc::new(AgentFsm::load(agent_id.clone(), Arc::clone(&self.store))?);
        if self.store.get_agent(agent_id.as_str())?.is_some() {
            fsms.insert(agent_id.clone(), Arc::clone(&fsm));
        } else {
            debug!(agent_id = %agent_id, "no agent record, fsm not cached");
        }
        Ok(fsm)
    }

    fn handle_for(&self, agent_id: &AgentId) -> HelmResult<AgentHandle> {
        let fsm = self.fsm_for_agent(agent_id)?;
        Ok(AgentHandle::new(fsm, Arc::clone(&self.store), Arc::clone(&self.tools)))
    }

    /// Load the agent with `agent_id` if it exists, otherwise create it.
    ///
    /// Without an id a fresh uuid is generated.
    pub fn create_agent(
        &self,
        name: &str,
        role: AgentRole,
        session_id: Option<&str>,
        agent_id: Option<AgentId>,
    ) -> HelmResult<AgentHandle> {
        let agent_id = agent_id.unwrap_or_default();

        if self.store.get_agent(agent_id.as_str())?.is_some() {
            debug!(agent_id = %agent_id, "agent already exists, loading");
            return self.handle_for(&agent_id);
        }

        // Drop any machine built before the record existed.
        self.fsm_cache()?.remove(&agent_id);
        let record = AgentRecord::new(
            agent_id.clone(),
            name,
            role,
            session_id.map(str::to_string),
        );
        self.store.upsert(Record::Agent(record))?;
        info!(agent_id = %agent_id, name = %name, role = %role, "agent created");
        self.handle_for(&agent_id)
    }

    pub fn get_agent(&self, agent_id: &AgentId) -> HelmResult<Option<AgentHandle>> {
        if self.store.get_agent(agent_id.as_str())?.is_none() {
            return Ok(None);
        }
        self.handle_for(agent_id).map(Some)
    }

    /// Like `get_agent`, but a missing agent is an error.
    pub fn handle(&self, agent_id: &AgentId) -> HelmResult<AgentHandle> {
        self.get_agent(agent_id)?.ok_or_else(|| {
            AgentError::AgentNotFound {
                agent_id: agent_id.to_string(),
            }
            .into()
        })
    }

    /// All agents, or those of one session, ordered by creation time.
    pub fn list_agents(&self, session_id: Option<&str>) -> HelmResult<Vec<AgentRecord>> {
        let mut filter = RecordFilter::kind(RecordKind::Agent);
        if let Some(session) = session_id {
            filter = filter.with_session(session);
        }
        let mut agents: Vec<AgentRecord> = self
            .store
            .query(&filter)?
            .into_iter()
            .filter_map(Record::into_agent)
            .collect();
        agents.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(agents)
    }

    pub fn delete_agent(&self, agent_id: &AgentId) -> HelmResult<bool> {
        let deleted = self.store.delete(RecordKind::Agent, agent_id.as_str())?;
        self.fsm_cache()?.remove(agent_id);
        if deleted {
            info!(agent_id = %agent_id, "agent deleted");
        }
        Ok(deleted)
    }

    /// Grant `tool`. Returns false if the agent already held it.
    pub fn grant_tool(&self, agent_id: &AgentId, tool: &str) -> HelmResult<bool> {
        let handle = self.handle(agent_id)?;
        let granted = handle.update_record(|r| r.grant(tool))?;
        info!(agent_id = %agent_id, tool = %tool, granted, "tool permission granted");
        Ok(granted)
    }

    /// Revoke `tool`. Returns false if the agent did not hold it.
    pub fn revoke_tool(&self, agent_id: &AgentId, tool: &str) -> HelmResult<bool> {
        let handle = self.handle(agent_id)?;
        let revoked = handle.update_record(|r| r.revoke(tool))?;
        info!(agent_id = %agent_id, tool = %tool, revoked, "tool permission revoked");
        Ok(revoked)
    }

    pub fn count_by_role(&self) -> HelmResult<BTreeMap<String, usize>> {
        let mut counts = BTreeMap::new();
        for agent in self.list_agents(None)? {
            *counts.entry(agent.role.to_string()).or_insert(0) += 1;
        }
        Ok(counts)
    }
}
