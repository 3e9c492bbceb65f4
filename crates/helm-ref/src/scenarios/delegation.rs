//! Scenario 4: Synchronous delegation
//!
//! The lead agent delegates a lookup to the `researcher` class. The parent
//! controller builds a child controller, runs it to completion, closes it,
//! and records its result before taking its own next step. The child gets a
//! fresh agent record carrying the parent's role and tool permissions, with
//! the parent's id as its session.

use std::sync::Arc;

use serde_json::Value;

use helm_contracts::{
    error::HelmResult,
    execution::{AgentAction, HistoryEventKind},
};

use crate::mock_model::{self, ScriptedModel};
use crate::runtime::{load_reference_config, Runtime, RESEARCHER_CLASS};

const AGENT: &str = "lead";

#[derive(Debug, Clone, PartialEq)]
pub struct DelegationOutcome {
    pub complete: bool,
    pub parent_steps: u32,
    /// The history entry the parent recorded for the delegation.
    pub delegation: Option<(String, Value)>,
    pub child_names: Vec<String>,
    pub child_permissions: Vec<String>,
    pub child_closed: bool,
    pub final_message: Option<String>,
    pub model_calls: usize,
}

pub fn run_scenario() -> HelmResult<DelegationOutcome> {
    println!("=== Scenario 4: Synchronous Delegation ===");
    println!();

    // Parent and child share the script. The child's turns sit between the
    // parent's delegate call and its finish.
    let model = Arc::new(ScriptedModel::new(vec![
        mock_model::delegate("call-1", RESEARCHER_CLASS, "Find where configuration is loaded."),
        mock_model::think("call-2", "helm-config exposes HelmConfig::from_file"),
        mock_model::finish("call-3", "configuration is loaded by HelmConfig::from_file"),
        mock_model::finish("call-4", "delegated lookup complete"),
    ]));
    let runtime = Runtime::from_config(load_reference_config()?, model.clone())?;
    let mut controller = runtime.controller(AGENT, "Find out how configuration is loaded.")?;

    println!("  Parent agent:           {}", AGENT);
    println!("  Agent classes:          {}", runtime.registry().classes().join(", "));

    let summary = controller.run(runtime.config().controller.max_iterations);
    controller.close();

    let delegation = summary.state.history.iter().find_map(|event| match &event.kind {
        HistoryEventKind::Delegation { agent_class, result } => {
            Some((agent_class.clone(), result.clone()))
        }
        _ => None,
    });
    if let Some((class, result)) = &delegation {
        println!("  Delegated to:           {}", class);
        println!("  Child success:          {}", result["success"]);
        println!("  Child steps:            {}", result["steps"]);
        println!("  Child message:          {}", result["message"]);
    }

    let children = runtime.manager().list_agents(Some(AGENT))?;
    let child_names: Vec<String> = children.iter().map(|c| c.name.clone()).collect();
    let child_permissions: Vec<String> = children
        .first()
        .map(|c| c.tool_permissions.iter().cloned().collect())
        .unwrap_or_default();
    let child_closed = children.iter().all(|c| {
        c.memory
            .controller_state
            .as_ref()
            .is_some_and(|s| s.end_time.is_some())
    });
    println!("  Child records:          {}", children.len());
    println!("  Child controller closed: {}", if child_closed { "YES" } else { "NO" });

    let final_message = summary.state.history.iter().rev().find_map(|event| match &event.kind {
        HistoryEventKind::Step {
            action: AgentAction::Finish { message },
            ..
        } => Some(message.clone()),
        _ => None,
    });
    println!("  Parent finished:        {}", summary.complete);
    println!("  Parent steps:           {}", summary.steps);
    println!("  Model calls:            {}", model.call_count());
    println!();
    println!("  Scenario 4 complete.");
    println!();

    Ok(DelegationOutcome {
        complete: summary.complete,
        parent_steps: summary.steps,
        delegation,
        child_names,
        child_permissions,
        child_closed,
        final_message,
        model_calls: model.call_count(),
    })
}
