//! # helm-tools
//!
//! The tool registry for helm agents.
//!
//! ```text
//! execute_tool ──► lookup ──► validate (jsonschema) ──► run ──► record usage/result
//! ```
//!
//! `ToolRegistry` is an explicit value built at startup and handed to the
//! `AgentManager` as its `ToolDispatcher`. Tools declare their parameters
//! either through a typed `ToolParams` struct or a raw `ToolSchema`; both are
//! compiled to JSON Schema once, at registration.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use helm_tools::{register_builtin_tools, ToolRegistry};
//!
//! let mut registry = ToolRegistry::with_store(store.clone());
//! register_builtin_tools(&mut registry)?;
//! let manager = AgentManager::new(store, Arc::new(registry));
//! ```

pub mod builtin;
pub mod registry;

pub use builtin::{
    register_builtin_tools, FinishParams, ReadFileParams, RunCommandParams, ThinkParams,
};
pub use registry::{ToolFn, ToolParams, ToolRegistry};
