//! # helm-memory
//!
//! Conversation memory for helm agents.
//!
//! - `ConversationMemory` is a capped, ordered message log that also maps raw
//!   conversation events into messages.
//! - `Condenser` implementations shrink a message list to fit a budget before
//!   it is sent to the model.

pub mod condenser;
pub mod memory;

pub use condenser::{Condenser, CondenserConfig, NoOpCondenser, SummaryCondenser, SummaryConfig};
pub use memory::{ConversationMemory, MemoryConfig};
