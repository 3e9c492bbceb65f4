//! The agent-class registry used for delegation.
//!
//! An explicit value passed to controllers at construction. A class name maps
//! to a factory that builds the agent logic for a freshly created child.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;
use tracing::debug;

use helm_contracts::{
    agent::{AgentId, AgentRole},
    error::{HelmError, HelmResult},
};

use crate::traits::Agent;

/// Everything a factory needs to know about the agent it is building.
#[derive(Debug, Clone)]
pub struct AgentSpawn {
    pub agent_id: AgentId,
    pub name: String,
    pub role: AgentRole,
    pub session_id: Option<String>,
    /// Free-form inputs from the delegating action.
    pub inputs: Value,
}

pub type AgentFactory = Box<dyn Fn(AgentSpawn) -> HelmResult<Box<dyn Agent>> + Send + Sync>;

#[derive(Default)]
pub struct AgentRegistry {
    factories: BTreeMap<String, AgentFactory>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `class`. A second registration under the same name fails and
    /// leaves the first in place.
    pub fn register(
        &mut self,
        class: impl Into<String>,
        factory: impl Fn(AgentSpawn) -> HelmResult<Box<dyn Agent>> + Send + Sync + 'static,
    ) -> HelmResult<()> {
        let class = class.into();
        if self.factories.contains_key(&class) {
            return Err(HelmError::Delegation {
                reason: format!("agent class '{class}' is already registered"),
            });
        }
        debug!(class = %class, "agent class registered");
        self.factories.insert(class, Box::new(factory));
        Ok(())
    }

    pub fn contains(&self, class: &str) -> bool {
        self.factories.contains_key(class)
    }

    /// Registered class names, sorted.
    pub fn classes(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    pub fn spawn(&self, class: &str, spawn: AgentSpawn) -> HelmResult<Box<dyn Agent>> {
        let factory = self.factories.get(class).ok_or_else(|| HelmError::Delegation {
            reason: format!("unknown agent class '{class}'"),
        })?;
        factory(spawn)
    }
}

impl fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("classes", &self.classes())
            .finish()
    }
}
