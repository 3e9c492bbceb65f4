//! The agent controller: drives one agent through a bounded run.
//!
//!   Closed? → Iteration cap → Budget cap → Complete? → Agent::step → Execute → Record → Persist
//!
//! One controller owns one `ControllerState` for one run. `step` must not be
//! called concurrently on the same controller; separate agents get separate
//! controllers and may run in parallel.
//!
//! Delegation is a synchronous recursive call: `run` builds a child
//! controller, runs it to completion, closes it, and records the child's
//! result before the parent continues.
//!
//! Controllers must be closed explicitly with `close()`. Dropping an open
//! controller only logs a warning; it never persists.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use helm_contracts::{
    agent::AgentId,
    error::{HelmError, HelmResult},
    execution::{
        AgentAction, ControllerState, HistoryEventKind, RunSummary, StepReport,
    },
    tool::ToolInvocation,
};

use crate::executor::AgentHandle;
use crate::manager::AgentManager;
use crate::registry::{AgentRegistry, AgentSpawn};
use crate::traits::Agent;

/// Run ceilings and gating for a controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub max_iterations: u32,
    /// Cost ceiling. The run stops once accumulated cost exceeds it.
    pub max_budget: Option<f64>,
    /// Route every tool call through a human confirmation.
    pub confirmation_mode: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            max_budget: None,
            confirmation_mode: false,
        }
    }
}

pub struct AgentController {
    agent: Box<dyn Agent>,
    handle: AgentHandle,
    config: ControllerConfig,
    registry: Arc<AgentRegistry>,
    manager: Arc<AgentManager>,
    parent_id: Option<AgentId>,
    is_delegate: bool,
    state: ControllerState,
    closed: bool,
    delegate: Option<Box<AgentController>>,
}

impl AgentController {
    pub fn new(
        agent: Box<dyn Agent>,
        handle: AgentHandle,
        config: ControllerConfig,
        registry: Arc<AgentRegistry>,
        manager: Arc<AgentManager>,
    ) -> Self {
        Self {
            agent,
            handle,
            config,
            registry,
            manager,
            parent_id: None,
            is_delegate: false,
            state: ControllerState::new(),
            closed: false,
            delegate: None,
        }
    }

    pub fn handle(&self) -> &AgentHandle {
        &self.handle
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn parent_id(&self) -> Option<&AgentId> {
        self.parent_id.as_ref()
    }

    pub fn is_delegate(&self) -> bool {
        self.is_delegate
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Advance the run by one step.
    ///
    /// # Pipeline
    ///
    /// 1. Closed controllers refuse to step
    /// 2. `iteration >= max_iterations` → stop, state untouched
    /// 3. `metrics.cost > max_budget` → stop, state untouched
    /// 4. Agent reports complete → stop
    /// 5. Increment the iteration and call `Agent::step`; an error is
    ///    recorded and stops the run
    /// 6. Execute the action, record it with its observation, persist
    pub fn step(&mut self) -> (bool, StepReport) {
        let agent_id = self.handle.id().clone();

        // ── Step 1: Closed ───────────────────────────────────────────────────
        if self.closed {
            warn!(agent_id = %agent_id, "step called on a closed controller");
            return (false, StepReport::Closed);
        }

        // ── Step 2: Iteration ceiling ────────────────────────────────────────
        if self.state.iteration >= self.config.max_iterations {
            debug!(
                agent_id = %agent_id,
                iteration = self.state.iteration,
                max_iterations = self.config.max_iterations,
                "iteration ceiling reached"
            );
            return (false, StepReport::MaxIterationsReached);
        }

        // ── Step 3: Budget ceiling ───────────────────────────────────────────
        if let Some(max_budget) = self.config.max_budget {
            if self.state.metrics.cost > max_budget {
                info!(
                    agent_id = %agent_id,
                    cost = self.state.metrics.cost,
                    max_budget,
                    "budget exceeded"
                );
                return (false, StepReport::MaxBudgetExceeded);
            }
        }

        // ── Step 4: Completion ───────────────────────────────────────────────
        if self.agent.is_complete() {
            return (false, StepReport::AgentComplete);
        }

        // ── Step 5: Agent step ───────────────────────────────────────────────
        self.state.iteration += 1;
        self.state.last_action_time = Utc::now();
        let iteration = self.state.iteration;

        let output = match self.agent.step(&self.state) {
            Ok(output) => output,
            Err(e) => return self.fail_step(e),
        };
        if let Some(usage) = &output.usage {
            self.state.metrics.add(usage);
        }

        // ── Step 6: Execute and record ───────────────────────────────────────
        let observation = match &output.action {
            AgentAction::ToolCall {
                tool_name,
                parameters,
                ..
            } => match self.execute_tool_call(tool_name, parameters) {
                Ok(invocation) => Some(invocation),
                Err(e) => return self.fail_step(e),
            },
            _ => None,
        };

        debug!(
            agent_id = %agent_id,
            iteration,
            action = output.action.kind(),
            "step executed"
        );

        let report = match (&output.action, &observation) {
            (_, Some(ToolInvocation::ConfirmationRequired { confirmation_id, .. })) => {
                StepReport::AwaitingConfirmation {
                    confirmation_id: confirmation_id.clone(),
                }
            }
            (AgentAction::Delegate { agent_class, inputs }, _) => StepReport::Delegating {
                agent_class: agent_class.clone(),
                inputs: inputs.clone(),
            },
            (action, _) => StepReport::Stepped {
                action: action.clone(),
            },
        };

        self.state.record(HistoryEventKind::Step {
            action: output.action,
            observation,
        });
        self.persist();

        let proceed = !matches!(report, StepReport::AwaitingConfirmation { .. });
        (proceed, report)
    }

    /// Run tool calls through the agent wrapper.
    ///
    /// Gate failures become a `Rejected` observation the agent can react to.
    /// Anything else (store, lock) is fatal to the step.
    fn execute_tool_call(&self, tool: &str, parameters: &Value) -> HelmResult<ToolInvocation> {
        match self
            .handle
            .execute_tool(tool, parameters.clone(), self.config.confirmation_mode)
        {
            Ok(invocation) => Ok(invocation),
            Err(HelmError::Agent(e)) => {
                warn!(agent_id = %self.handle.id(), tool = %tool, error = %e, "tool call rejected");
                Ok(ToolInvocation::Rejected {
                    error: e.to_string(),
                    error_type: e.kind().to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }

    fn fail_step(&mut self, e: HelmError) -> (bool, StepReport) {
        error!(
            agent_id = %self.handle.id(),
            iteration = self.state.iteration,
            error = %e,
            "agent step failed, run stopped"
        );
        let error = e.to_string();
        self.state.record(HistoryEventKind::Error {
            error: error.clone(),
        });
        self.persist();
        (false, StepReport::Error { error })
    }

    /// Step until the run stops or `max_steps` steps were taken. A limit of
    /// zero takes no step and reports `NoSteps`.
    pub fn run(&mut self, max_steps: u32) -> RunSummary {
        let start_iteration = self.state.iteration;
        let mut calls = 0;

        info!(
            agent_id = %self.handle.id(),
            max_steps,
            delegate = self.is_delegate,
            "run started"
        );

        let mut final_report = StepReport::NoSteps;
        while calls < max_steps {
            let (proceed, report) = self.step();
            calls += 1;

            if let StepReport::Delegating { agent_class, inputs } = &report {
                self.run_delegate(agent_class, inputs);
            }

            final_report = report;
            if !proceed {
                break;
            }
        }

        let summary = RunSummary {
            agent_id: self.handle.id().to_string(),
            steps: self.state.iteration - start_iteration,
            complete: self.agent.is_complete(),
            final_report,
            state: self.state.clone(),
        };
        info!(
            agent_id = %summary.agent_id,
            steps = summary.steps,
            complete = summary.complete,
            status = summary.final_report.status(),
            "run finished"
        );
        summary
    }

    // ── Delegation ───────────────────────────────────────────────────────────

    fn run_delegate(&mut self, agent_class: &str, inputs: &Value) {
        let result = match self.spawn_delegate(agent_class, inputs) {
            Ok(child) => {
                let max_steps = child.config.max_iterations;
                let child = self.delegate.insert(Box::new(child));
                let summary = child.run(max_steps);
                child.close();
                self.delegate = None;

                json!({
                    "success": summary.complete,
                    "agent_id": summary.agent_id,
                    "steps": summary.steps,
                    "status": summary.final_report.status(),
                    "message": final_message(&summary.state),
                })
            }
            Err(e) => {
                warn!(
                    agent_id = %self.handle.id(),
                    agent_class = %agent_class,
                    error = %e,
                    "delegation failed"
                );
                json!({ "success": false, "error": e.to_string() })
            }
        };

        self.state.record(HistoryEventKind::Delegation {
            agent_class: agent_class.to_string(),
            result,
        });
        self.persist();
    }

    /// Build a child controller for `agent_class`.
    ///
    /// The child gets its own agent record carrying the parent's role and
    /// tool permissions, with the parent id as its session.
    fn spawn_delegate(&self, agent_class: &str, inputs: &Value) -> HelmResult<AgentController> {
        if !self.registry.contains(agent_class) {
            return Err(HelmError::Delegation {
                reason: format!("unknown agent class '{agent_class}'"),
            });
        }

        let parent = self.handle.record()?;
        let name = format!("delegate-{agent_class}");
        let child = self
            .manager
            .create_agent(&name, parent.role, Some(parent.id.as_str()), None)?;
        for tool in &parent.tool_permissions {
            self.manager.grant_tool(child.id(), tool)?;
        }

        let agent = self.registry.spawn(
            agent_class,
            AgentSpawn {
                agent_id: child.id().clone(),
                name,
                role: parent.role,
                session_id: Some(parent.id.to_string()),
                inputs: inputs.clone(),
            },
        )?;

        info!(
            agent_id = %self.handle.id(),
            delegate_id = %child.id(),
            agent_class = %agent_class,
            "delegate spawned"
        );

        Ok(AgentController {
            agent,
            handle: child,
            config: self.config.clone(),
            registry: Arc::clone(&self.registry),
            manager: Arc::clone(&self.manager),
            parent_id: Some(parent.id),
            is_delegate: true,
            state: ControllerState::new(),
            closed: false,
            delegate: None,
        })
    }

    // ── Persistence and shutdown ─────────────────────────────────────────────

    fn persist(&self) {
        let state = self.state.clone();
        if let Err(e) = self
            .handle
            .update_record(move |record| record.memory.controller_state = Some(state))
        {
            warn!(agent_id = %self.handle.id(), error = %e, "failed to persist controller state");
        }
    }

    /// Close the controller. Closes a live delegate first, stamps the end
    /// time, and persists. Calling it again does nothing.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        if let Some(mut child) = self.delegate.take() {
            child.close();
        }

        let now = Utc::now();
        self.state.end_time = Some(now);
        self.state.duration_secs =
            Some((now - self.state.start_time).num_milliseconds() as f64 / 1000.0);
        self.persist();
        self.closed = true;

        info!(
            agent_id = %self.handle.id(),
            iterations = self.state.iteration,
            "controller closed"
        );
    }
}

impl Drop for AgentController {
    fn drop(&mut self) {
        if !self.closed {
            warn!(agent_id = %self.handle.id(), "controller dropped without close()");
        }
    }
}

/// The message of the last `Finish` action in a run, if any.
fn final_message(state: &ControllerState) -> Option<String> {
    state.history.iter().rev().find_map(|event| match &event.kind {
        HistoryEventKind::Step {
            action: AgentAction::Finish { message },
            ..
        } => Some(message.clone()),
        _ => None,
    })
}

// ── Tests ────────────────────────────────────────────────────────────────────
