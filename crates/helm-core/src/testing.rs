//! Mock collaborators shared by the unit tests in this crate.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use serde_json::Value;

use helm_contracts::{
    error::{HelmError, HelmResult, ToolError},
    execution::{AgentAction, ControllerState, StepOutput},
    store::{Record, RecordFilter, RecordKind},
    tool::{ToolDefinition, ToolOutput, ToolSchema},
};

use crate::traits::{Agent, RecordStore, ToolDispatcher};

/// A `HashMap`-backed store.
#[derive(Default)]
pub struct MockStore {
    records: Mutex<HashMap<(RecordKind, String), Record>>,
}

impl RecordStore for MockStore {
    fn get(&self, kind: RecordKind, id: &str) -> HelmResult<Option<Record>> {
        Ok(self.records.lock().unwrap().get(&(kind, id.to_string())).cloned())
    }

    fn upsert(&self, record: Record) -> HelmResult<()> {
        let key = (record.kind(), record.id().to_string());
        let mut records = self.records.lock().unwrap();
        if key.0.is_append_only() && records.contains_key(&key) {
            return Err(HelmError::Store {
                reason: format!("{} '{}' is append-only", key.0, key.1),
            });
        }
        records.insert(key, record);
        Ok(())
    }

    fn query(&self, filter: &RecordFilter) -> HelmResult<Vec<Record>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }

    fn delete(&self, kind: RecordKind, id: &str) -> HelmResult<bool> {
        Ok(self.records.lock().unwrap().remove(&(kind, id.to_string())).is_some())
    }
}

type MockToolFn = Box<dyn Fn(&Value) -> Result<ToolOutput, ToolError> + Send + Sync>;

/// A dispatcher over closures that counts every call.
#[derive(Default)]
pub struct MockTools {
    tools: HashMap<String, (ToolDefinition, MockToolFn)>,
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl MockTools {
    pub fn with_tool(
        mut self,
        name: &str,
        f: impl Fn(&Value) -> Result<ToolOutput, ToolError> + Send + Sync + 'static,
    ) -> Self {
        let def = ToolDefinition {
            name: name.to_string(),
            description: format!("mock {name}"),
            schema: ToolSchema::new(),
            required_permissions: vec![],
        };
        self.tools.insert(name.to_string(), (def, Box::new(f)));
        self
    }

    pub fn with_permissioned_tool(mut self, name: &str, required: &[&str]) -> Self {
        self = self.with_tool(name, |_| Ok(ToolOutput::ok("ok")));
        if let Some((def, _)) = self.tools.get_mut(name) {
            def.required_permissions = required.iter().map(|s| s.to_string()).collect();
        }
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl ToolDispatcher for MockTools {
    fn definition(&self, name: &str) -> Option<ToolDefinition> {
        self.tools.get(name).map(|(d, _)| d.clone())
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|(d, _)| d.clone()).collect()
    }

    fn execute_tool(
        &self,
        name: &str,
        parameters: &Value,
        _agent_id: Option<&str>,
        _record: bool,
    ) -> Result<ToolOutput, ToolError> {
        self.calls.lock().unwrap().push(name.to_string());
        match self.tools.get(name) {
            Some((_, f)) => f(parameters),
            None => Err(ToolError::NotFound { tool: name.to_string() }),
        }
    }
}

/// An agent that replays a fixed list of step results.
///
/// `Err(msg)` entries make `step` fail with a model error. Once the script
/// runs out the agent keeps emitting a plain message.
pub struct ScriptedAgent {
    script: VecDeque<Result<StepOutput, String>>,
    complete: bool,
    pub steps: Arc<Mutex<u32>>,
}

impl ScriptedAgent {
    pub fn new(script: Vec<Result<StepOutput, String>>) -> Self {
        Self {
            script: script.into(),
            complete: false,
            steps: Arc::new(Mutex::new(0)),
        }
    }

    /// An agent that answers every step with a message and never finishes.
    pub fn chatty() -> Self {
        Self::new(vec![])
    }
}

impl Agent for ScriptedAgent {
    fn step(&mut self, _state: &ControllerState) -> HelmResult<StepOutput> {
        *self.steps.lock().unwrap() += 1;
        match self.script.pop_front() {
            Some(Ok(output)) => {
                if matches!(output.action, AgentAction::Finish { .. }) {
                    self.complete = true;
                }
                Ok(output)
            }
            Some(Err(reason)) => Err(HelmError::Model { reason }),
            None => Ok(StepOutput::new(AgentAction::Message {
                content: "still working".to_string(),
            })),
        }
    }

    fn is_complete(&self) -> bool {
        self.complete
    }
}
