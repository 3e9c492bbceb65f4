//! In-memory implementation of `RecordStore`.
//!
//! `InMemoryRecordStore` is the reference store. Records live in a
//! `BTreeMap` behind `Arc<Mutex<_>>`, so clones of the store share the same
//! data and iteration order is deterministic.
//!
//! Tool usages and results are append-only. Every tool usage is also
//! appended to a SHA-256 hash chain under the same lock, so the chain and
//! the records can never disagree about order.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tracing::{debug, info, warn};

use helm_contracts::{
    error::{HelmError, HelmResult},
    store::{Record, RecordFilter, RecordKind},
};
use helm_core::traits::RecordStore;

use crate::{
    chain::{hash_entry, verify_chain},
    entry::{AuditEntry, StoreSnapshot},
};

// ── Internal mutable state ────────────────────────────────────────────────────

pub(crate) struct StoreState {
    pub(crate) records: BTreeMap<(RecordKind, String), Record>,
    pub(crate) audit: Vec<AuditEntry>,
    /// `this_hash` of the last audit entry, or `GENESIS_HASH`.
    pub(crate) last_hash: String,
}

impl StoreState {
    fn empty() -> Self {
        Self {
            records: BTreeMap::new(),
            audit: Vec::new(),
            last_hash: AuditEntry::GENESIS_HASH.to_string(),
        }
    }
}

// ── Public store ──────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct InMemoryRecordStore {
    pub(crate) state: Arc<Mutex<StoreState>>,
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(StoreState::empty())),
        }
    }

    fn lock(&self) -> HelmResult<MutexGuard<'_, StoreState>> {
        self.state.lock().map_err(|e| HelmError::Store {
            reason: format!("store lock poisoned: {e}"),
        })
    }

    /// Record counts per kind. Kinds with no records are omitted.
    pub fn counts(&self) -> HelmResult<BTreeMap<RecordKind, usize>> {
        let state = self.lock()?;
        let mut counts = BTreeMap::new();
        for (kind, _) in state.records.keys() {
            *counts.entry(*kind).or_insert(0) += 1;
        }
        Ok(counts)
    }

    pub fn len(&self) -> HelmResult<usize> {
        Ok(self.lock()?.records.len())
    }

    pub fn is_empty(&self) -> HelmResult<bool> {
        Ok(self.len()? == 0)
    }

    /// The tool audit chain, in append order.
    pub fn audit_log(&self) -> HelmResult<Vec<AuditEntry>> {
        Ok(self.lock()?.audit.clone())
    }

    /// Check the audit chain and that every entry still matches the stored
    /// usage record it commits to.
    pub fn verify_integrity(&self) -> bool {
        let Ok(state) = self.lock() else {
            return false;
        };
        if !verify_chain(&state.audit) {
            return false;
        }
        state.audit.iter().all(|entry| {
            matches!(
                state.records.get(&(RecordKind::ToolUsage, entry.usage.id.clone())),
                Some(Record::ToolUsage(stored)) if *stored == entry.usage
            )
        })
    }

    /// Serialize the whole store, audit chain included, as JSON.
    pub fn export_snapshot(&self) -> HelmResult<String> {
        let snapshot = {
            let state = self.lock()?;
            StoreSnapshot {
                records: state.records.values().cloned().collect(),
                audit: state.audit.clone(),
                exported_at: Utc::now(),
                terminal_hash: state
                    .audit
                    .last()
                    .map(|e| e.this_hash.clone())
                    .unwrap_or_default(),
            }
        };
        info!(
            records = snapshot.records.len(),
            audit_entries = snapshot.audit.len(),
            "store snapshot exported"
        );
        serde_json::to_string(&snapshot).map_err(|e| HelmError::Store {
            reason: format!("snapshot serialization failed: {e}"),
        })
    }

    /// Rebuild a store from `export_snapshot` output.
    ///
    /// A snapshot whose audit chain does not verify is rejected.
    pub fn from_snapshot(json: &str) -> HelmResult<Self> {
        let snapshot: StoreSnapshot = serde_json::from_str(json).map_err(|e| HelmError::Store {
            reason: format!("invalid snapshot: {e}"),
        })?;
        if !verify_chain(&snapshot.audit) {
            return Err(HelmError::Store {
                reason: "snapshot audit chain failed verification".to_string(),
            });
        }

        let mut state = StoreState::empty();
        for record in snapshot.records {
            state
                .records
                .insert((record.kind(), record.id().to_string()), record);
        }
        state.last_hash = snapshot
            .audit
            .last()
            .map(|e| e.this_hash.clone())
            .unwrap_or_else(|| AuditEntry::GENESIS_HASH.to_string());
        state.audit = snapshot.audit;

        let store = Self {
            state: Arc::new(Mutex::new(state)),
        };
        if !store.verify_integrity() {
            return Err(HelmError::Store {
                reason: "snapshot records do not match the audit chain".to_string(),
            });
        }
        Ok(store)
    }
}

// ── RecordStore impl ──────────────────────────────────────────────────────────

impl RecordStore for InMemoryRecordStore {
    fn get(&self, kind: RecordKind, id: &str) -> HelmResult<Option<Record>> {
        Ok(self.lock()?.records.get(&(kind, id.to_string())).cloned())
    }

    fn upsert(&self, record: Record) -> HelmResult<()> {
        let mut state = self.lock()?;
        let key = (record.kind(), record.id().to_string());

        if key.0.is_append_only() && state.records.contains_key(&key) {
            warn!(kind = %key.0, id = %key.1, "rejected overwrite of append-only record");
            return Err(HelmError::Store {
                reason: format!("{} '{}' is append-only", key.0, key.1),
            });
        }

        if let Record::ToolUsage(usage) = &record {
            let sequence = state.audit.len() as u64;
            let prev_hash = state.last_hash.clone();
            let this_hash = hash_entry(sequence, usage, &prev_hash)?;
            state.audit.push(AuditEntry {
                sequence,
                usage: usage.clone(),
                prev_hash,
                this_hash: this_hash.clone(),
            });
            state.last_hash = this_hash;
        }

        debug!(kind = %key.0, id = %key.1, "record stored");
        state.records.insert(key, record);
        Ok(())
    }

    fn query(&self, filter: &RecordFilter) -> HelmResult<Vec<Record>> {
        Ok(self
            .lock()?
            .records
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }

    fn delete(&self, kind: RecordKind, id: &str) -> HelmResult<bool> {
        if kind.is_append_only() {
            return Err(HelmError::Store {
                reason: format!("{kind} '{id}' is append-only and cannot be deleted"),
            });
        }
        Ok(self.lock()?.records.remove(&(kind, id.to_string())).is_some())
    }
}
