//! The reference tool-calling agent.
//!
//! Each step either replays an action queued from an earlier completion or
//! asks the model for new ones:
//!
//!   Queue? → Rebuild conversation → Condense → ModelClient::complete → Actions
//!
//! The conversation is rebuilt from the controller history on every model
//! call, so the agent holds no state the controller does not also persist.

use std::collections::VecDeque;
use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info};

use helm_contracts::{
    error::HelmResult,
    execution::{AgentAction, ControllerState, HistoryEventKind, StepOutput},
    message::{ConversationEvent, Message},
    tool::ToolDefinition,
};
use helm_memory::{Condenser, ConversationMemory, MemoryConfig, NoOpCondenser};

use crate::function_calling::{response_to_actions, DELEGATE_TOOL};
use crate::traits::{Agent, ModelClient};

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant that solves tasks step by step. \
Use the available tools when they help, and call `finish` with a short summary when the task is done.";

pub struct ToolCallingAgent {
    name: String,
    system_prompt: String,
    task: String,
    model: Arc<dyn ModelClient>,
    tools: Vec<ToolDefinition>,
    memory: ConversationMemory,
    condenser: Box<dyn Condenser>,
    pending: VecDeque<AgentAction>,
    complete: bool,
}

impl ToolCallingAgent {
    pub fn new(
        name: impl Into<String>,
        model: Arc<dyn ModelClient>,
        tools: Vec<ToolDefinition>,
    ) -> Self {
        Self {
            name: name.into(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            task: String::new(),
            model,
            tools,
            memory: ConversationMemory::default(),
            condenser: Box::new(NoOpCondenser),
            pending: VecDeque::new(),
            complete: false,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_task(mut self, task: impl Into<String>) -> Self {
        self.task = task.into();
        self
    }

    pub fn with_condenser(mut self, condenser: Box<dyn Condenser>) -> Self {
        self.condenser = condenser;
        self
    }

    pub fn with_memory(mut self, config: &MemoryConfig) -> Self {
        self.memory = ConversationMemory::from_config(config);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The conversation as last sent to the model, before condensation.
    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    /// Drop queued actions and the conversation, and start over.
    pub fn reset(&mut self) {
        self.memory.clear();
        self.pending.clear();
        self.complete = false;
    }

    fn take_action(&mut self, action: AgentAction) -> AgentAction {
        if matches!(action, AgentAction::Finish { .. }) {
            info!(agent = %self.name, "agent finished");
            self.complete = true;
        }
        action
    }

    fn build_messages(&mut self, state: &ControllerState) -> Vec<Message> {
        self.memory.clear();
        self.memory.add_message(Message::system(self.system_prompt.clone()));
        if !self.task.is_empty() {
            self.memory.add_message(Message::user(self.task.clone()));
        }
        self.memory.process_events(&history_to_events(state));
        self.condenser.condense(&self.memory.messages())
    }
}

impl Agent for ToolCallingAgent {
    fn step(&mut self, state: &ControllerState) -> HelmResult<StepOutput> {
        if let Some(action) = self.pending.pop_front() {
            debug!(agent = %self.name, action = action.kind(), "replaying queued action");
            return Ok(StepOutput::new(self.take_action(action)));
        }

        let messages = self.build_messages(state);
        debug!(
            agent = %self.name,
            iteration = state.iteration,
            messages = messages.len(),
            "calling model"
        );
        let completion = self.model.complete(&messages, &self.tools)?;

        self.pending.extend(response_to_actions(&completion, &self.tools));
        let action = match self.pending.pop_front() {
            Some(action) => self.take_action(action),
            None => AgentAction::Message {
                content: "I'm not sure how to proceed. Could you provide more information?"
                    .to_string(),
            },
        };

        let output = StepOutput::new(action);
        Ok(match completion.usage {
            Some(usage) => output.with_usage(usage),
            None => output,
        })
    }

    fn is_complete(&self) -> bool {
        self.complete
    }
}

/// Render controller history as conversation events.
///
/// Tool calls are paired with their observations. A delegation is shown as a
/// `delegate` call answered by the child's result. Failed function calls are
/// fed back as user turns so the model can correct itself.
pub fn history_to_events(state: &ControllerState) -> Vec<ConversationEvent> {
    let mut events = Vec::new();
    for event in &state.history {
        let timestamp = Some(event.timestamp);
        let delegate_id = format!("delegate-{}", event.iteration);

        match &event.kind {
            HistoryEventKind::Step { action, observation } => match action {
                AgentAction::Message { content } => events.push(ConversationEvent::Message {
                    source: "agent".to_string(),
                    content: content.clone(),
                    timestamp,
                }),
                AgentAction::ToolCall {
                    tool_call_id,
                    tool_name,
                    parameters,
                    ..
                } => {
                    events.push(ConversationEvent::ToolCall {
                        id: tool_call_id.clone(),
                        tool_name: tool_name.clone(),
                        input: parameters.clone(),
                        timestamp,
                    });
                    if let Some(observation) = observation {
                        events.push(ConversationEvent::ToolResult {
                            tool_call_id: tool_call_id.clone(),
                            tool_name: tool_name.clone(),
                            result: observation.observation_text(),
                            timestamp,
                        });
                    }
                }
                AgentAction::Delegate { agent_class, inputs } => {
                    events.push(ConversationEvent::ToolCall {
                        id: delegate_id,
                        tool_name: DELEGATE_TOOL.to_string(),
                        input: json!({ "agent_class": agent_class, "inputs": inputs }),
                        timestamp,
                    })
                }
                AgentAction::Finish { message } => events.push(ConversationEvent::Message {
                    source: "agent".to_string(),
                    content: message.clone(),
                    timestamp,
                }),
                AgentAction::Error { error, error_type } => {
                    events.push(ConversationEvent::Message {
                        source: "user".to_string(),
                        content: format!("[{error_type}] {error}"),
                        timestamp,
                    })
                }
            },
            HistoryEventKind::Delegation { result, .. } => {
                events.push(ConversationEvent::ToolResult {
                    tool_call_id: delegate_id,
                    tool_name: DELEGATE_TOOL.to_string(),
                    result: result.to_string(),
                    timestamp,
                })
            }
            HistoryEventKind::Error { .. } => {}
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use serde_json::json;

    use helm_contracts::{
        error::{HelmError, HelmResult},
        execution::{AgentAction, ControllerState, HistoryEventKind, Usage},
        message::{Completion, ConversationEvent, Message, Role},
        tool::{ParamType, ToolDefinition, ToolInvocation, ToolOutput, ToolSchema},
    };
    use helm_memory::{SummaryCondenser, SummaryConfig};

    use super::{history_to_events, ToolCallingAgent};
    use crate::traits::{Agent, ModelClient};

    /// Replays completions and records every message list it was sent.
    struct MockModel {
        replies: Mutex<VecDeque<HelmResult<Completion>>>,
        seen: Arc<Mutex<Vec<Vec<Message>>>>,
    }

    impl MockModel {
        fn new(replies: Vec<HelmResult<Completion>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                seen: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    impl ModelClient for MockModel {
        fn complete(&self, messages: &[Message], _tools: &[ToolDefinition]) -> HelmResult<Completion> {
            self.seen.lock().unwrap().push(messages.to_vec());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Completion::text("idle")))
        }
    }

    fn tools() -> Vec<ToolDefinition> {
        vec![ToolDefinition {
            name: "run_command".into(),
            description: "Run a shell command".into(),
            schema: ToolSchema::new().required("command", ParamType::String, "Command"),
            required_permissions: vec![],
        }]
    }

    fn agent(model: MockModel) -> ToolCallingAgent {
        ToolCallingAgent::new("coder", Arc::new(model), tools()).with_task("list the files")
    }

    #[test]
    fn first_step_sends_system_and_task() {
        let model = MockModel::new(vec![Ok(Completion::text("on it"))]);
        let seen = model.seen.clone();
        let mut agent = agent(model);

        let output = agent.step(&ControllerState::new()).unwrap();
        assert_eq!(output.action, AgentAction::Message { content: "on it".into() });

        let sent = &seen.lock().unwrap()[0];
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].role, Role::System);
        assert_eq!(sent[1].content, "list the files");
    }

    #[test]
    fn multiple_calls_are_queued_and_usage_reported_once() {
        let completion = Completion {
            content: Some("two things".into()),
            tool_calls: vec![
                helm_contracts::message::ToolCall {
                    id: "c1".into(),
                    name: "run_command".into(),
                    arguments: json!({ "command": "ls" }),
                },
                helm_contracts::message::ToolCall {
                    id: "c2".into(),
                    name: "finish".into(),
                    arguments: json!("{\"message\": \"done\"}"),
                },
            ],
            usage: Some(Usage { prompt_tokens: 12, completion_tokens: 3, cost: 0.01 }),
        };
        let model = MockModel::new(vec![Ok(completion)]);
        let seen = model.seen.clone();
        let mut agent = agent(model);
        let state = ControllerState::new();

        let first = agent.step(&state).unwrap();
        assert_eq!(first.action.kind(), "tool_call");
        assert!(first.usage.is_some());
        assert!(!agent.is_complete());

        let second = agent.step(&state).unwrap();
        assert_eq!(second.action, AgentAction::Finish { message: "done".into() });
        assert!(second.usage.is_none());
        assert!(agent.is_complete());
        assert_eq!(seen.lock().unwrap().len(), 1, "queued action must not call the model");
    }

    #[test]
    fn model_error_propagates() {
        let mut agent = agent(MockModel::new(vec![Err(HelmError::Model { reason: "429".into() })]));
        assert!(agent.step(&ControllerState::new()).is_err());
    }

    #[test]
    fn unknown_tool_becomes_error_action() {
        let model = MockModel::new(vec![Ok(Completion::tool_call("c1", "rm_rf", json!({})))]);
        let mut agent = agent(model);
        match agent.step(&ControllerState::new()).unwrap().action {
            AgentAction::Error { error_type, .. } => assert_eq!(error_type, "function_call_not_exists"),
            other => panic!("expected Error, got {:?}", other),
        }
    }

    #[test]
    fn history_is_replayed_to_model() {
        let mut state = ControllerState::new();
        state.iteration = 1;
        state.record(HistoryEventKind::Step {
            action: AgentAction::ToolCall {
                tool_call_id: "c1".into(),
                tool_name: "run_command".into(),
                parameters: json!({ "command": "ls" }),
                thought: String::new(),
            },
            observation: Some(ToolInvocation::Completed { output: ToolOutput::ok("Cargo.toml") }),
        });

        let model = MockModel::new(vec![]);
        let seen = model.seen.clone();
        let mut agent = agent(model);
        agent.step(&state).unwrap();

        let sent = &seen.lock().unwrap()[0];
        assert_eq!(sent.len(), 4);
        assert!(sent[2].has_tool_calls());
        assert_eq!(sent[3].role, Role::Tool);
        assert_eq!(sent[3].content, "Cargo.toml");
    }

    #[test]
    fn condenser_is_applied_before_model_call() {
        let mut state = ControllerState::new();
        for i in 0..10 {
            state.iteration = i + 1;
            state.record(HistoryEventKind::Step {
                action: AgentAction::Message { content: format!("note {i}") },
                observation: None,
            });
        }

        let model = MockModel::new(vec![]);
        let seen = model.seen.clone();
        let mut agent = agent(model).with_condenser(Box::new(SummaryCondenser::new(SummaryConfig {
            max_messages: 5,
            ..Default::default()
        })));
        agent.step(&state).unwrap();

        let sent = &seen.lock().unwrap()[0];
        assert_eq!(sent.len(), 5);
        assert_eq!(sent[0].role, Role::System);
        assert!(sent.iter().any(|m| m.content == "list the files"));
    }

    #[test]
    fn delegation_pairs_call_and_result() {
        let mut state = ControllerState::new();
        state.iteration = 2;
        state.record(HistoryEventKind::Step {
            action: AgentAction::Delegate { agent_class: "researcher".into(), inputs: json!({}) },
            observation: None,
        });
        state.record(HistoryEventKind::Delegation {
            agent_class: "researcher".into(),
            result: json!({ "success": true }),
        });

        let events = history_to_events(&state);
        match (&events[0], &events[1]) {
            (
                ConversationEvent::ToolCall { id: call_id, tool_name, .. },
                ConversationEvent::ToolResult { tool_call_id, .. },
            ) => {
                assert_eq!(tool_name, "delegate");
                assert_eq!(call_id, tool_call_id);
            }
            other => panic!("expected call/result pair, got {:?}", other),
        }
    }
}
