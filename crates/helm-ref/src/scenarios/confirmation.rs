//! Scenario 3: Human confirmation
//!
//! Tool calls that require confirmation are parked on the agent record
//! instead of running. Executing the confirmation runs the tool exactly once
//! and consumes it; a second attempt is "not found". Rejecting a confirmation
//! discards it without running anything. A controller in confirmation mode
//! suspends its run on the first parked call.

use std::sync::Arc;

use serde_json::json;

use helm_contracts::{
    error::{HelmError, HelmResult},
    execution::StepReport,
    store::RecordKind,
    tool::ToolInvocation,
};

use crate::mock_model::{self, ScriptedModel};
use crate::runtime::{load_reference_config, Runtime};

const AGENT: &str = "lead";

#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmationOutcome {
    pub first_id: String,
    pub rejected_id: String,
    /// Tool usage records written before any confirmation was executed.
    pub usages_while_pending: usize,
    pub pending_while_parked: usize,
    pub executed: ToolInvocation,
    pub pending_after_execute: usize,
    pub second_execute_error: Option<String>,
    pub usages_after_reject: usize,
    pub pending_after_reject: usize,
    pub suspended_report: StepReport,
    pub suspended_steps: u32,
    pub resumed: ToolInvocation,
}

fn tool_usages(runtime: &Runtime) -> HelmResult<usize> {
    Ok(runtime
        .store()
        .counts()?
        .get(&RecordKind::ToolUsage)
        .copied()
        .unwrap_or(0))
}

fn parked_id(invocation: ToolInvocation) -> HelmResult<String> {
    match invocation {
        ToolInvocation::ConfirmationRequired { confirmation_id, .. } => Ok(confirmation_id),
        other => Err(HelmError::StateMachine {
            reason: format!("expected a parked tool call, got '{}'", other.status()),
        }),
    }
}

pub fn run_scenario() -> HelmResult<ConfirmationOutcome> {
    println!("=== Scenario 3: Human Confirmation ===");
    println!();

    let runtime = Runtime::from_config(load_reference_config()?, Arc::new(ScriptedModel::default()))?;
    let handle = runtime.handle(AGENT)?;

    // ── Sub-case A: park, execute, execute again ─────────────────────────────

    println!("  Sub-case A: confirm a parked tool call");
    let first_id = parked_id(handle.execute_tool(
        "think",
        json!({ "thought": "approved by a human" }),
        true,
    )?)?;
    let pending_while_parked = handle.pending_confirmations()?.len();
    let usages_while_pending = tool_usages(&runtime)?;
    println!("  Confirmation id:        {}", first_id);
    println!("  Pending confirmations:  {}", pending_while_parked);
    println!("  Tool runs so far:       {}", usages_while_pending);

    let executed = handle.execute_confirmation(&first_id)?;
    let pending_after_execute = handle.pending_confirmations()?.len();
    println!("  execute_confirmation:   {} ({:?})", executed.status(), executed.observation_text());
    println!("  Pending confirmations:  {}", pending_after_execute);

    let second_execute_error = match handle.execute_confirmation(&first_id) {
        Err(e) => {
            println!("  Second execute:         ERROR ({})", e);
            Some(e.to_string())
        }
        Ok(invocation) => {
            println!("  Second execute unexpectedly ran: {}", invocation.status());
            None
        }
    };
    println!();

    // ── Sub-case B: park and reject ──────────────────────────────────────────

    println!("  Sub-case B: reject a parked tool call");
    let rejected_id = parked_id(handle.execute_tool(
        "think",
        json!({ "thought": "never approved" }),
        true,
    )?)?;
    let rejected = handle.reject_confirmation(&rejected_id)?;
    let pending_after_reject = handle.pending_confirmations()?.len();
    let usages_after_reject = tool_usages(&runtime)?;
    println!("  Rejected:               {} ({})", rejected.id, rejected.description);
    println!("  Pending confirmations:  {}", pending_after_reject);
    println!("  Tool runs so far:       {}", usages_after_reject);
    println!();

    // ── Sub-case C: controller in confirmation mode ──────────────────────────

    println!("  Sub-case C: controller with confirmation_mode = true");
    let mut config = runtime.config().clone();
    config.controller.confirmation_mode = true;
    let gated = Runtime::from_config(
        config,
        Arc::new(ScriptedModel::new(vec![mock_model::think("call-2", "needs sign-off")])),
    )?;
    let mut controller = gated.controller(AGENT, "Review the plan.")?;
    let summary = controller.run(gated.config().controller.max_iterations);
    println!("  Run stopped with:       {}", summary.final_report.status());
    println!("  Steps taken:            {}", summary.steps);

    let suspended_id = match &summary.final_report {
        StepReport::AwaitingConfirmation { confirmation_id } => confirmation_id.clone(),
        other => {
            controller.close();
            return Err(HelmError::StateMachine {
                reason: format!("expected a suspended run, got '{}'", other.status()),
            });
        }
    };
    let resumed = controller.handle().execute_confirmation(&suspended_id)?;
    println!("  Human approved:         {} ({:?})", resumed.status(), resumed.observation_text());
    controller.close();

    println!();
    println!("  Scenario 3 complete.");
    println!();

    Ok(ConfirmationOutcome {
        first_id,
        rejected_id,
        usages_while_pending,
        pending_while_parked,
        executed,
        pending_after_execute,
        second_execute_error,
        usages_after_reject,
        pending_after_reject,
        suspended_report: summary.final_report,
        suspended_steps: summary.steps,
        resumed,
    })
}
