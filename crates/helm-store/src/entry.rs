//! Audit entries and store snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use helm_contracts::{store::Record, tool::ToolUsage};

/// One link of the tool audit chain. Wraps the usage record it commits to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Position in the chain, starting at 0.
    pub sequence: u64,
    pub usage: ToolUsage,
    /// Hash of the previous entry, or `GENESIS_HASH` for the first one.
    pub prev_hash: String,
    pub this_hash: String,
}

impl AuditEntry {
    /// 64 hex zeros.
    pub const GENESIS_HASH: &'static str =
        "0000000000000000000000000000000000000000000000000000000000000000";
}

/// Everything the store holds, as exported by `export_snapshot`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub records: Vec<Record>,
    pub audit: Vec<AuditEntry>,
    pub exported_at: DateTime<Utc>,
    /// `this_hash` of the last audit entry. Empty when there is none.
    pub terminal_hash: String,
}
