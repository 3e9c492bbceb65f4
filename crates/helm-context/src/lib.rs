//! # helm-context
//!
//! Typed, TTL-bound context for helm agents, served as token-bounded
//! snapshots.
//!
//! ```text
//! record_* / add ──► ContextStore ──► Prioritizer (one formula)
//!                         │
//!                         ├─► get_full_context: per-type quota, priority-greedy fill
//!                         ├─► chains: ordered groups of items
//!                         └─► run_maintenance: reprioritize → flag expired → reap
//! ```
//!
//! Items live in the shared `RecordStore` as `Record::ContextItem`, next to
//! agents and tool records. Time-dependent operations have an `_at(now)`
//! variant for callers that control the clock.

pub mod agent;
pub mod chain;
pub mod config;
pub mod priority;
pub mod store;

pub use agent::{AgentContext, AgentContextExt};
pub use chain::{ChainView, CHAIN_ITEM_TYPE};
pub use config::ContextConfig;
pub use priority::Prioritizer;
pub use store::ContextStore;
