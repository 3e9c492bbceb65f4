//! Controller run state, agent actions, and step outcomes.
//!
//! `ControllerState` is owned by exactly one controller for one run and is
//! persisted into the agent record after every step.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tool::ToolInvocation;

/// What an agent decided to do in one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentAction {
    /// Plain assistant text, no side effects.
    Message { content: String },

    ToolCall {
        tool_call_id: String,
        tool_name: String,
        parameters: Value,
        #[serde(default)]
        thought: String,
    },

    /// Hand a sub-task to a child controller running `agent_class`.
    Delegate { agent_class: String, inputs: Value },

    /// The agent considers its task done.
    Finish { message: String },

    /// The model issued a call that could not be turned into an action.
    Error { error: String, error_type: String },
}

impl AgentAction {
    pub fn kind(&self) -> &'static str {
        match self {
            AgentAction::Message { .. } => "message",
            AgentAction::ToolCall { .. } => "tool_call",
            AgentAction::Delegate { .. } => "delegate",
            AgentAction::Finish { .. } => "finish",
            AgentAction::Error { .. } => "error",
        }
    }
}

/// Token and cost accounting reported by the model collaborator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cost: f64,
}

/// The result of `Agent::step`.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutput {
    pub action: AgentAction,
    pub usage: Option<Usage>,
}

impl StepOutput {
    pub fn new(action: AgentAction) -> Self {
        Self { action, usage: None }
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// Accumulated model usage for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cost: f64,
}

impl Metrics {
    pub fn add(&mut self, usage: &Usage) {
        self.prompt_tokens += usage.prompt_tokens;
        self.completion_tokens += usage.completion_tokens;
        self.cost += usage.cost;
    }

    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Payload of one history entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HistoryEventKind {
    /// A completed step. `observation` is set when the action ran a tool.
    Step {
        action: AgentAction,
        #[serde(default)]
        observation: Option<ToolInvocation>,
    },

    /// `agent.step` failed. The run stops after this entry.
    Error { error: String },

    /// A child controller finished (or failed to start).
    Delegation { agent_class: String, result: Value },
}

/// One entry in the controller history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEvent {
    pub timestamp: DateTime<Utc>,
    pub iteration: u32,
    #[serde(flatten)]
    pub kind: HistoryEventKind,
}

/// Mutable run state of one controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerState {
    pub iteration: u32,
    pub start_time: DateTime<Utc>,
    pub last_action_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_secs: Option<f64>,
    #[serde(default)]
    pub history: Vec<HistoryEvent>,
    #[serde(default)]
    pub metrics: Metrics,
}

impl ControllerState {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            iteration: 0,
            start_time: now,
            last_action_time: now,
            end_time: None,
            duration_secs: None,
            history: Vec::new(),
            metrics: Metrics::default(),
        }
    }

    /// Append a history entry stamped with the current iteration.
    pub fn record(&mut self, kind: HistoryEventKind) {
        self.history.push(HistoryEvent {
            timestamp: Utc::now(),
            iteration: self.iteration,
            kind,
        });
    }

    pub fn last_event(&self) -> Option<&HistoryEvent> {
        self.history.last()
    }
}

impl Default for ControllerState {
    fn default() -> Self {
        Self::new()
    }
}

/// Why `AgentController::step` returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepReport {
    MaxIterationsReached,
    MaxBudgetExceeded,
    AgentComplete,
    /// A normal step. The action and its observation are in history.
    Stepped { action: AgentAction },
    Delegating { agent_class: String, inputs: Value },
    /// A tool call is parked behind a human confirmation.
    AwaitingConfirmation { confirmation_id: String },
    Error { error: String },
    /// The controller was closed and refuses further steps.
    Closed,
    /// `run` was given a step limit of zero and took no step.
    NoSteps,
}

impl StepReport {
    pub fn status(&self) -> &'static str {
        match self {
            StepReport::MaxIterationsReached => "max_iterations_reached",
            StepReport::MaxBudgetExceeded => "max_budget_exceeded",
            StepReport::AgentComplete => "agent_complete",
            StepReport::Stepped { .. } => "stepped",
            StepReport::Delegating { .. } => "delegating",
            StepReport::AwaitingConfirmation { .. } => "awaiting_confirmation",
            StepReport::Error { .. } => "error",
            StepReport::Closed => "closed",
            StepReport::NoSteps => "no_steps",
        }
    }
}

/// What `AgentController::run` hands back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub agent_id: String,
    pub steps: u32,
    pub complete: bool,
    pub final_report: StepReport,
    pub state: ControllerState,
}
