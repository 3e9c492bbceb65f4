//! # helm-contracts
//!
//! Shared types, records, and errors for the helm agent orchestration core.
//!
//! Every crate in the workspace imports from here. Only data definitions,
//! constructors, and small accessors live in this crate.

pub mod agent;
pub mod confirmation;
pub mod context;
pub mod error;
pub mod execution;
pub mod message;
pub mod store;
pub mod tool;
