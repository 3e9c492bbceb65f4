//! # helm-core
//!
//! The agent orchestration core of helm.
//!
//! This crate provides:
//! - The four collaborator traits (`RecordStore`, `ModelClient`,
//!   `ToolDispatcher`, `Agent`)
//! - A generic, thread-safe `StateMachine` and the agent lifecycle `AgentFsm`
//! - `AgentHandle`, which gates tool execution on lifecycle, permissions, and
//!   human confirmation
//! - `AgentManager` and `AgentRegistry` for agents and agent classes
//! - `AgentController`, the bounded step loop with synchronous delegation
//! - Function-call parsing and the reference `ToolCallingAgent`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use helm_core::{AgentController, AgentManager, AgentRegistry, ControllerConfig};
//!
//! let manager = Arc::new(AgentManager::new(store, tools));
//! let handle = manager.create_agent("coder", AgentRole::Assistant, None, None)?;
//! let mut controller = AgentController::new(agent, handle, ControllerConfig::default(), registry, manager);
//! let summary = controller.run(10);
//! controller.close();
//! ```

pub mod agent;
pub mod agent_fsm;
pub mod controller;
pub mod executor;
pub mod fsm;
pub mod function_calling;
pub mod manager;
pub mod registry;
pub mod traits;

#[cfg(test)]
mod testing;

pub use agent::{history_to_events, ToolCallingAgent};
pub use agent_fsm::AgentFsm;
pub use controller::{AgentController, ControllerConfig};
pub use executor::AgentHandle;
pub use fsm::{StateMachine, Transition, TransitionHooks};
pub use manager::AgentManager;
pub use registry::{AgentRegistry, AgentSpawn};
