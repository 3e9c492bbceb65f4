//! The runtime configuration document.
//!
//! Every section has serde defaults, so an empty document is a valid
//! configuration. `validate` rejects values the runtime cannot honour.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use helm_context::ContextConfig;
use helm_contracts::{
    agent::AgentRole,
    error::{HelmError, HelmResult},
};
use helm_core::ControllerConfig;
use helm_memory::{CondenserConfig, MemoryConfig};

/// An agent created at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub id: String,
    pub name: String,
    #[serde(default = "default_role")]
    pub role: AgentRole,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub tool_permissions: Vec<String>,
}

fn default_role() -> AgentRole {
    AgentRole::Assistant
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HelmConfig {
    pub controller: ControllerConfig,
    pub memory: MemoryConfig,
    pub condenser: CondenserConfig,
    pub context: ContextConfig,
    pub agents: Vec<AgentProfile>,
}

impl HelmConfig {
    /// Parse `s` as TOML. The result is validated before it is returned.
    pub fn from_toml_str(s: &str) -> HelmResult<Self> {
        let config: HelmConfig = toml::from_str(s).map_err(|e| HelmError::Config {
            reason: format!("failed to parse helm TOML: {e}"),
        })?;
        config.validate()?;
        debug!(agents = config.agents.len(), "configuration parsed");
        Ok(config)
    }

    pub fn from_file(path: &Path) -> HelmResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| HelmError::Config {
            reason: format!("failed to read config file '{}': {e}", path.display()),
        })?;
        let config = Self::from_toml_str(&contents)?;
        info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    pub fn validate(&self) -> HelmResult<()> {
        if self.controller.max_iterations == 0 {
            return Err(HelmError::Config {
                reason: "controller max_iterations must be at least 1".to_string(),
            });
        }
        if let Some(budget) = self.controller.max_budget {
            if budget < 0.0 {
                return Err(HelmError::Config {
                    reason: format!("controller max_budget must not be negative, got {budget}"),
                });
            }
        }
        self.condenser.validate()?;
        self.context.validate()?;

        let mut ids = HashSet::new();
        for profile in &self.agents {
            if !ids.insert(profile.id.as_str()) {
                return Err(HelmError::Config {
                    reason: format!("agent profile id '{}' is declared twice", profile.id),
                });
            }
        }
        Ok(())
    }

    pub fn agent(&self, id: &str) -> Option<&AgentProfile> {
        self.agents.iter().find(|p| p.id == id)
    }
}
