//! # helm-ref
//!
//! Reference runtime for the helm agent orchestration core.
//!
//! Demonstrates five scenarios against a scripted model:
//!
//! 1. **Permission gate**: an ungranted tool is rejected without touching the
//!    lifecycle; once granted it runs READY → BUSY → READY.
//! 2. **Iteration cap**: the step after the last allowed iteration stops the
//!    run and leaves the controller state untouched.
//! 3. **Confirmation**: a gated tool call is parked, then executed exactly
//!    once or rejected.
//! 4. **Delegation**: a parent agent hands a sub-task to a child controller
//!    and resumes with its result.
//! 5. **Context snapshot**: priority-greedy snapshot assembly under a token
//!    limit, then two-phase expiry.
//!
//! No external services are contacted. `run_command` spawns a local shell.

pub mod mock_model;
pub mod runtime;
pub mod scenarios;

pub use mock_model::ScriptedModel;
pub use runtime::{load_reference_config, Runtime, RESEARCHER_CLASS};
