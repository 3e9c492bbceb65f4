//! helm Reference Runtime Demo CLI
//!
//! Runs one or all of the reference scenarios. Each scenario wires real helm
//! components (record store, tool registry, agent manager, controller,
//! context store) to a scripted model.
//!
//! Usage:
//!   cargo run -p demo -- run-all
//!   cargo run -p demo -- permission-gate
//!   cargo run -p demo -- iteration-cap
//!   cargo run -p demo -- confirmation
//!   cargo run -p demo -- delegation
//!   cargo run -p demo -- context-snapshot

use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use helm_contracts::error::HelmResult;
use helm_ref::scenarios::{
    confirmation, context_snapshot, delegation, iteration_cap, permission_gate,
};

// ── CLI definition ────────────────────────────────────────────────────────────

/// helm: agent orchestration core demo.
///
/// Each subcommand runs one or all of the reference scenarios, showing the
/// lifecycle gate, run ceilings, human confirmation, delegation, and context
/// assembly.
#[derive(Parser)]
#[command(
    name = "demo",
    about = "helm reference runtime demo",
    long_about = "Runs helm reference scenarios showing permission and lifecycle gating,\n\
                  iteration ceilings, human confirmation, synchronous delegation,\n\
                  and token-bounded context snapshots."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run all five scenarios in sequence.
    RunAll,
    /// Scenario 1: Permission gate (denied, then READY → BUSY → READY).
    PermissionGate,
    /// Scenario 2: Iteration cap (the fourth step of three is refused).
    IterationCap,
    /// Scenario 3: Human confirmation (execute once, reject, suspend a run).
    Confirmation,
    /// Scenario 4: Synchronous delegation to a child controller.
    Delegation,
    /// Scenario 5: Context snapshot under a token limit, then expiry.
    ContextSnapshot,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    // Set RUST_LOG=debug for the full pipeline trace.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    print_banner();

    let result = match cli.command {
        Command::RunAll => run_all(),
        Command::PermissionGate => run_permission_gate(),
        Command::IterationCap => run_iteration_cap(),
        Command::Confirmation => run_confirmation(),
        Command::Delegation => run_delegation(),
        Command::ContextSnapshot => run_context_snapshot(),
    };

    match result {
        Ok(()) => {
            println!("All selected scenarios completed successfully.");
        }
        Err(e) => {
            eprintln!("Demo error: {}", e);
            std::process::exit(1);
        }
    }
}

// ── Scenario dispatch ─────────────────────────────────────────────────────────

fn run_all() -> HelmResult<()> {
    run_permission_gate()?;
    run_iteration_cap()?;
    run_confirmation()?;
    run_delegation()?;
    run_context_snapshot()?;
    Ok(())
}

fn run_permission_gate() -> HelmResult<()> {
    let outcome = permission_gate::run_scenario()?;
    debug!(?outcome, "permission gate finished");
    Ok(())
}

fn run_iteration_cap() -> HelmResult<()> {
    let outcome = iteration_cap::run_scenario()?;
    debug!(?outcome, "iteration cap finished");
    Ok(())
}

fn run_confirmation() -> HelmResult<()> {
    let outcome = confirmation::run_scenario()?;
    debug!(?outcome, "confirmation finished");
    Ok(())
}

fn run_delegation() -> HelmResult<()> {
    let outcome = delegation::run_scenario()?;
    debug!(?outcome, "delegation finished");
    Ok(())
}

fn run_context_snapshot() -> HelmResult<()> {
    let outcome = context_snapshot::run_scenario()?;
    debug!(?outcome, "context snapshot finished");
    Ok(())
}

// ── Banner ────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("helm: Agent Orchestration Core");
    println!("Reference Runtime Demo");
    println!("==============================");
    println!();
    println!("Controller pipeline per step:");
    println!("  [1] Closed controllers refuse to step");
    println!("  [2] Iteration and budget ceilings stop the run before the agent is called");
    println!("  [3] Agent::step decides the next action from the run history");
    println!("  [4] Tool calls pass the lifecycle, permission, and confirmation gates");
    println!("  [5] ToolRegistry validates parameters, runs the tool, records usage/result");
    println!("  [6] The action and its observation are recorded and the state persisted");
    println!();
}
