//! Collaborator trait definitions for the helm orchestration core.
//!
//! These four traits are the seams of the runtime:
//!
//! - `RecordStore`    the key-value store every record is persisted to
//! - `ModelClient`    the completion provider, opaque to the core
//! - `ToolDispatcher` the tool registry as seen by agents and controllers
//! - `Agent`          the step logic a controller drives
//!
//! Everything is injected at construction time. There are no global
//! registries.

use serde_json::Value;

use helm_contracts::{
    agent::AgentRecord,
    context::ContextItem,
    error::{HelmResult, ToolError},
    execution::{ControllerState, StepOutput},
    message::{Completion, Message},
    store::{Record, RecordFilter, RecordKind},
    tool::{ToolDefinition, ToolOutput},
};

/// A key-value record store with CRUD and query-by-kind semantics.
///
/// Each call is a single atomic update. The core never spans a transaction
/// across calls, so consumers must tolerate a transition that was applied
/// without its log entry being written.
pub trait RecordStore: Send + Sync {
    /// Fetch one record by kind and id.
    fn get(&self, kind: RecordKind, id: &str) -> HelmResult<Option<Record>>;

    /// Insert or overwrite a record.
    ///
    /// Implementations must reject overwrites of append-only kinds
    /// (`RecordKind::is_append_only`).
    fn upsert(&self, record: Record) -> HelmResult<()>;

    /// Return every record matching `filter`, in no particular order.
    fn query(&self, filter: &RecordFilter) -> HelmResult<Vec<Record>>;

    /// Remove a record. Returns false when it did not exist.
    fn delete(&self, kind: RecordKind, id: &str) -> HelmResult<bool>;

    fn get_agent(&self, id: &str) -> HelmResult<Option<AgentRecord>> {
        Ok(self.get(RecordKind::Agent, id)?.and_then(Record::into_agent))
    }

    fn get_context_item(&self, id: &str) -> HelmResult<Option<ContextItem>> {
        Ok(self
            .get(RecordKind::ContextItem, id)?
            .and_then(Record::into_context_item))
    }
}

/// The model collaborator.
///
/// The agent step function is the only caller. The core does not pick a
/// provider or a wire protocol.
pub trait ModelClient: Send + Sync {
    fn complete(&self, messages: &[Message], tools: &[ToolDefinition]) -> HelmResult<Completion>;
}

/// Named, schema-validated tool execution.
pub trait ToolDispatcher: Send + Sync {
    fn definition(&self, name: &str) -> Option<ToolDefinition>;

    fn definitions(&self) -> Vec<ToolDefinition>;

    /// Validate `parameters`, run the tool, and when `record` is set persist
    /// a `ToolUsage`/`ToolResult` pair whatever the outcome.
    fn execute_tool(
        &self,
        name: &str,
        parameters: &Value,
        agent_id: Option<&str>,
        record: bool,
    ) -> Result<ToolOutput, ToolError>;
}

/// Step logic driven by an `AgentController`.
///
/// Implementations may call a model, keep their own conversation memory, and
/// queue several actions from one completion. The controller executes the
/// returned action; the agent only decides.
pub trait Agent: Send {
    /// Decide the next action given the run state so far.
    fn step(&mut self, state: &ControllerState) -> HelmResult<StepOutput>;

    /// True once the agent considers its task finished.
    fn is_complete(&self) -> bool;
}
