//! Hash-chain primitives for the tool audit log.
//!
//! Hash input layout (bytes, in order):
//!   1. sequence as 8-byte little-endian
//!   2. prev_hash as UTF-8 bytes (64 ASCII hex chars)
//!   3. canonical JSON of the `ToolUsage` record

use sha2::{Digest, Sha256};

use helm_contracts::{
    error::{HelmError, HelmResult},
    tool::ToolUsage,
};

use crate::entry::AuditEntry;

/// Compute the SHA-256 hash of one audit entry as lowercase hex.
pub fn hash_entry(sequence: u64, usage: &ToolUsage, prev_hash: &str) -> HelmResult<String> {
    let usage_json = serde_json::to_vec(usage).map_err(|e| HelmError::Store {
        reason: format!("tool usage '{}' is not serializable: {e}", usage.id),
    })?;

    let mut hasher = Sha256::new();
    hasher.update(sequence.to_le_bytes());
    hasher.update(prev_hash.as_bytes());
    hasher.update(&usage_json);

    Ok(hex::encode(hasher.finalize()))
}

/// Verify linkage and hash correctness of every entry.
///
/// An empty chain is valid. Sequences must count up from 0.
pub fn verify_chain(entries: &[AuditEntry]) -> bool {
    let mut expected_prev = AuditEntry::GENESIS_HASH.to_string();

    for (i, entry) in entries.iter().enumerate() {
        if entry.sequence != i as u64 || entry.prev_hash != expected_prev {
            return false;
        }
        match hash_entry(entry.sequence, &entry.usage, &entry.prev_hash) {
            Ok(h) if h == entry.this_hash => {}
            _ => return false,
        }
        expected_prev = entry.this_hash.clone();
    }

    true
}
