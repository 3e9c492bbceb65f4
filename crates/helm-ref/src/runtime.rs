//! Wiring for the reference runtime.
//!
//! `Runtime::from_config` builds every collaborator from one `HelmConfig`:
//!
//!   InMemoryRecordStore → ToolRegistry (+ built-ins) → AgentManager
//!     → AgentRegistry (agent classes) → ContextStore → agent profiles
//!
//! All of them share the same store, so tool usage, agent records, and
//! context items land side by side.

use std::sync::Arc;

use tracing::info;

use helm_config::HelmConfig;
use helm_context::ContextStore;
use helm_contracts::{
    agent::AgentId,
    error::HelmResult,
    tool::ToolDefinition,
};
use helm_core::{
    function_calling::delegate_definition,
    traits::ModelClient,
    AgentController, AgentHandle, AgentManager, AgentRegistry, ToolCallingAgent,
};
use helm_memory::{CondenserConfig, MemoryConfig};
use helm_store::InMemoryRecordStore;
use helm_tools::{register_builtin_tools, ToolRegistry};

/// Embedded reference configuration.
const REFERENCE_CONFIG: &str = include_str!("../config/reference.toml");

/// The agent class delegates are spawned from.
pub const RESEARCHER_CLASS: &str = "researcher";

pub fn load_reference_config() -> HelmResult<HelmConfig> {
    HelmConfig::from_toml_str(REFERENCE_CONFIG)
}

fn tool_calling_agent(
    name: &str,
    task: &str,
    model: Arc<dyn ModelClient>,
    tools: Vec<ToolDefinition>,
    memory: &MemoryConfig,
    condenser: &CondenserConfig,
) -> ToolCallingAgent {
    ToolCallingAgent::new(name, model, tools)
        .with_task(task)
        .with_memory(memory)
        .with_condenser(condenser.build())
}

pub struct Runtime {
    config: HelmConfig,
    model: Arc<dyn ModelClient>,
    store: Arc<InMemoryRecordStore>,
    tools: Arc<ToolRegistry>,
    manager: Arc<AgentManager>,
    registry: Arc<AgentRegistry>,
    context: ContextStore,
}

impl Runtime {
    pub fn from_config(config: HelmConfig, model: Arc<dyn ModelClient>) -> HelmResult<Self> {
        config.validate()?;
        let store = Arc::new(InMemoryRecordStore::new());

        let mut tools = ToolRegistry::with_store(store.clone());
        register_builtin_tools(&mut tools)?;
        let tools = Arc::new(tools);

        let manager = Arc::new(AgentManager::new(store.clone(), tools.clone()));

        // Delegates see the registered tools but cannot delegate further.
        let mut registry = AgentRegistry::new();
        {
            let model = Arc::clone(&model);
            let definitions = tools.definitions();
            let memory = config.memory.clone();
            let condenser = config.condenser.clone();
            registry.register(RESEARCHER_CLASS, move |spawn| {
                let task = spawn.inputs["task"].as_str().unwrap_or_default();
                Ok(Box::new(tool_calling_agent(
                    &spawn.name,
                    task,
                    Arc::clone(&model),
                    definitions.clone(),
                    &memory,
                    &condenser,
                )))
            })?;
        }

        let context = ContextStore::new(store.clone(), config.context.clone());

        for profile in &config.agents {
            let handle = manager.create_agent(
                &profile.name,
                profile.role,
                profile.session_id.as_deref(),
                Some(AgentId::from(profile.id.as_str())),
            )?;
            for tool in &profile.tool_permissions {
                manager.grant_tool(handle.id(), tool)?;
            }
        }

        info!(
            tools = tools.len(),
            agent_classes = registry.classes().len(),
            agents = config.agents.len(),
            "reference runtime ready"
        );

        Ok(Self {
            config,
            model,
            store,
            tools,
            manager,
            registry: Arc::new(registry),
            context,
        })
    }

    pub fn config(&self) -> &HelmConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<InMemoryRecordStore> {
        &self.store
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    pub fn manager(&self) -> &Arc<AgentManager> {
        &self.manager
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    pub fn context(&self) -> &ContextStore {
        &self.context
    }

    pub fn handle(&self, agent_id: &str) -> HelmResult<AgentHandle> {
        self.manager.handle(&AgentId::from(agent_id))
    }

    /// A controller driving a tool-calling agent for `agent_id` on `task`.
    ///
    /// The agent is offered every registered tool plus `delegate`.
    pub fn controller(&self, agent_id: &str, task: &str) -> HelmResult<AgentController> {
        let handle = self.handle(agent_id)?;
        let mut definitions = self.tools.definitions();
        definitions.push(delegate_definition(&self.registry.classes()));

        let record = handle.record()?;
        let agent = tool_calling_agent(
            &record.name,
            task,
            Arc::clone(&self.model),
            definitions,
            &self.config.memory,
            &self.config.condenser,
        );
        Ok(AgentController::new(
            Box::new(agent),
            handle,
            self.config.controller.clone(),
            Arc::clone(&self.registry),
            Arc::clone(&self.manager),
        ))
    }
}
