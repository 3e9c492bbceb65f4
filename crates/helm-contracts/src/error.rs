//! Error taxonomy for the helm orchestration core.
//!
//! All fallible operations return `HelmResult<T>`. The sub-enums mirror the
//! three failure families callers need to tell apart:
//!
//! - `AgentError`: state and permission violations at the agent boundary
//! - `ToolError`: lookup, validation, and execution failures in the registry
//! - `FunctionCallError`: malformed or unknown tool calls issued by a model
//!
//! Invalid FSM transitions are deliberately absent: they are a boolean
//! outcome of `trigger`, not an error.

use thiserror::Error;

/// State and permission violations raised by the agent-level wrapper.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AgentError {
    /// The agent's FSM does not accept `execute_tool` in its current state.
    #[error("agent '{agent_id}' is not ready (status: {status})")]
    NotReady { agent_id: String, status: String },

    /// The tool is not in the agent's permission set.
    #[error("agent '{agent_id}' does not have permission to use tool '{tool}'")]
    PermissionDenied { agent_id: String, tool: String },

    #[error("agent '{agent_id}' not found")]
    AgentNotFound { agent_id: String },

    #[error("tool '{tool}' not found")]
    ToolNotFound { tool: String },

    /// Raised for unknown ids and for ids that were already consumed.
    #[error("confirmation '{confirmation_id}' not found")]
    ConfirmationNotFound { confirmation_id: String },

    #[error("confirmation type '{confirmation_type}' cannot be executed")]
    UnsupportedConfirmation { confirmation_type: String },
}

impl AgentError {
    /// Short classification string stored in structured results.
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::NotReady { .. } => "not_ready",
            AgentError::PermissionDenied { .. } => "permission_denied",
            AgentError::AgentNotFound { .. } | AgentError::ToolNotFound { .. } => "not_found",
            AgentError::ConfirmationNotFound { .. }
            | AgentError::UnsupportedConfirmation { .. } => "confirmation",
        }
    }
}

/// Failures inside the tool registry.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ToolError {
    /// Parameters did not match the tool's declared schema.
    #[error("invalid parameters for tool '{tool}': {reason}")]
    Validation { tool: String, reason: String },

    /// The tool body itself failed.
    #[error("tool '{tool}' failed: {reason}")]
    Execution { tool: String, reason: String },

    #[error("tool '{tool}' is not registered")]
    NotFound { tool: String },

    /// A second registration under an existing name. The first one stays.
    #[error("tool '{tool}' is already registered")]
    AlreadyRegistered { tool: String },

    /// The declared schema could not be compiled.
    #[error("tool '{tool}' declares an invalid schema: {reason}")]
    InvalidSchema { tool: String, reason: String },
}

impl ToolError {
    /// Short classification string stored in structured results.
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::Validation { .. } | ToolError::InvalidSchema { .. } => "validation",
            ToolError::Execution { .. } => "execution",
            ToolError::NotFound { .. } => "not_found",
            ToolError::AlreadyRegistered { .. } => "registration",
        }
    }
}

/// Malformed model-issued function calls.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FunctionCallError {
    #[error("function call validation failed: {reason}")]
    Validation { reason: String },

    #[error("function '{tool}' does not exist")]
    NotExists { tool: String },
}

/// The unified error type for the helm runtime.
#[derive(Debug, Error)]
pub enum HelmError {
    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    FunctionCall(#[from] FunctionCallError),

    /// The record store could not complete a read or write.
    #[error("record store error: {reason}")]
    Store { reason: String },

    /// A required configuration value is missing or invalid.
    #[error("configuration error: {reason}")]
    Config { reason: String },

    /// The state machine lock or table is unusable.
    #[error("state machine error: {reason}")]
    StateMachine { reason: String },

    /// The model collaborator failed to produce a completion.
    #[error("model error: {reason}")]
    Model { reason: String },

    /// A sub-agent could not be spawned or run.
    #[error("delegation error: {reason}")]
    Delegation { reason: String },

    /// A context item or chain referenced by id does not exist.
    #[error("context error: {reason}")]
    Context { reason: String },
}

/// Convenience alias used throughout the helm crates.
pub type HelmResult<T> = Result<T, HelmError>;
