//! Reference runtime scenarios.
//!
//! Each scenario builds its own `Runtime` from the reference configuration,
//! drives real helm components with a scripted model, prints a walk-through,
//! and returns what it observed so tests can assert on it.

pub mod confirmation;
pub mod context_snapshot;
pub mod delegation;
pub mod iteration_cap;
pub mod permission_gate;
