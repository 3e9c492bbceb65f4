//! Scenario 2: Iteration cap
//!
//! A controller limited to three iterations drives a model that would keep
//! thinking forever. Three steps run normally. The fourth `step()` returns
//! `(false, max_iterations_reached)` without calling the model and without
//! touching the controller state.

use std::sync::Arc;

use helm_contracts::error::HelmResult;

use crate::mock_model::{self, ScriptedModel};
use crate::runtime::{load_reference_config, Runtime};

const AGENT: &str = "lead";
const MAX_ITERATIONS: u32 = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct IterationCapOutcome {
    /// `(proceed, status)` of every `step()` call, in order.
    pub steps: Vec<(bool, &'static str)>,
    pub iteration: u32,
    /// The state after the capped call equals the state before it.
    pub state_unchanged: bool,
    pub model_calls: usize,
    pub total_tokens: u64,
}

pub fn run_scenario() -> HelmResult<IterationCapOutcome> {
    println!("=== Scenario 2: Iteration Cap ===");
    println!();

    let mut config = load_reference_config()?;
    config.controller.max_iterations = MAX_ITERATIONS;

    let model = Arc::new(ScriptedModel::new(
        (1..=4).map(|i| mock_model::think(&format!("call-{i}"), &format!("thought {i}"))),
    ));
    let runtime = Runtime::from_config(config, model.clone())?;
    let mut controller = runtime.controller(AGENT, "Think about the problem until told to stop.")?;

    println!("  max_iterations = {}", MAX_ITERATIONS);

    let mut steps = Vec::new();
    for _ in 0..MAX_ITERATIONS {
        let (proceed, report) = controller.step();
        println!(
            "  step() → ({}, {}) iteration {}",
            proceed,
            report.status(),
            controller.state().iteration
        );
        steps.push((proceed, report.status()));
    }

    let before = controller.state().clone();
    let (proceed, report) = controller.step();
    let state_unchanged = *controller.state() == before;
    println!("  step() → ({}, {}) iteration {}", proceed, report.status(), controller.state().iteration);
    steps.push((proceed, report.status()));

    let iteration = controller.state().iteration;
    let total_tokens = controller.state().metrics.total_tokens();
    controller.close();

    println!("  State unchanged by capped call: {}", if state_unchanged { "YES" } else { "NO" });
    println!("  Model calls:                    {}", model.call_count());
    println!("  Tokens used:                    {}", total_tokens);
    println!();
    println!("  Scenario 2 complete.");
    println!();

    Ok(IterationCapOutcome {
        steps,
        iteration,
        state_unchanged,
        model_calls: model.call_count(),
        total_tokens,
    })
}
