//! # helm-store
//!
//! The reference `RecordStore` for helm: an in-memory key-value store with
//! an append-only, SHA-256 hash-chained audit log of tool usages.
//!
//! ## Overview
//!
//! Every `ToolUsage` written to the store is wrapped in an `AuditEntry` that
//! links to the previous entry via its hash. Editing a stored usage or an
//! entry breaks the chain and is detected by `verify_integrity`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use helm_store::InMemoryRecordStore;
//!
//! let store = Arc::new(InMemoryRecordStore::new());
//! let manager = AgentManager::new(store.clone(), tools);
//! // ... run agents ...
//! assert!(store.verify_integrity());
//! let json = store.export_snapshot()?;
//! ```

pub mod chain;
pub mod entry;
pub mod memory;

pub use chain::{hash_entry, verify_chain};
pub use entry::{AuditEntry, StoreSnapshot};
pub use memory::InMemoryRecordStore;

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use helm_contracts::{
        agent::{AgentId, AgentRecord, AgentRole},
        store::{Record, RecordFilter, RecordKind},
        tool::{ToolResult, ToolUsage},
    };
    use helm_core::traits::RecordStore;

    use super::{AuditEntry, InMemoryRecordStore};

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn usage(tool: &str, success: bool) -> ToolUsage {
        ToolUsage {
            id: uuid::Uuid::new_v4().to_string(),
            tool_type: tool.to_string(),
            params: json!({ "command": "ls" }),
            success,
            error_message: None,
            execution_time_secs: 0.01,
            agent_id: Some("a".to_string()),
            result_id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
        }
    }

    fn agent(id: &str, session: Option<&str>) -> Record {
        Record::Agent(AgentRecord::new(
            AgentId::from(id),
            id,
            AgentRole::Assistant,
            session.map(str::to_string),
        ))
    }

    fn store_with_usages(n: usize) -> InMemoryRecordStore {
        let store = InMemoryRecordStore::new();
        for i in 0..n {
            store.upsert(Record::ToolUsage(usage("run_command", i % 2 == 0))).unwrap();
        }
        store
    }

    // ── CRUD ──────────────────────────────────────────────────────────────────

    #[test]
    fn upsert_get_query_delete() {
        let store = InMemoryRecordStore::new();
        store.upsert(agent("a", Some("s1"))).unwrap();
        store.upsert(agent("b", Some("s2"))).unwrap();

        assert!(store.get_agent("a").unwrap().is_some());
        assert!(store.get(RecordKind::ContextItem, "a").unwrap().is_none());

        let s1 = store
            .query(&RecordFilter::kind(RecordKind::Agent).with_session("s1"))
            .unwrap();
        assert_eq!(s1.len(), 1);

        assert!(store.delete(RecordKind::Agent, "a").unwrap());
        assert!(!store.delete(RecordKind::Agent, "a").unwrap());
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn agents_can_be_overwritten() {
        let store = InMemoryRecordStore::new();
        store.upsert(agent("a", None)).unwrap();
        let mut record = store.get_agent("a").unwrap().unwrap();
        record.grant("think");
        store.upsert(Record::Agent(record)).unwrap();
        assert!(store.get_agent("a").unwrap().unwrap().has_permission("think"));
    }

    #[test]
    fn tool_records_are_append_only() {
        let store = InMemoryRecordStore::new();
        let u = usage("think", true);
        store.upsert(Record::ToolUsage(u.clone())).unwrap();
        assert!(store.upsert(Record::ToolUsage(u.clone())).is_err());
        assert!(store.delete(RecordKind::ToolUsage, &u.id).is_err());

        let result = ToolResult {
            id: u.result_id.clone(),
            usage_id: u.id.clone(),
            result_data: json!({}),
            output_text: "ok".into(),
            exit_code: None,
            created_at: Utc::now(),
        };
        store.upsert(Record::ToolResult(result.clone())).unwrap();
        assert!(store.upsert(Record::ToolResult(result)).is_err());
        assert_eq!(store.audit_log().unwrap().len(), 1, "rejected writes are not audited");
    }

    #[test]
    fn counts_per_kind() {
        let store = store_with_usages(3);
        store.upsert(agent("a", None)).unwrap();
        let counts = store.counts().unwrap();
        assert_eq!(counts[&RecordKind::ToolUsage], 3);
        assert_eq!(counts[&RecordKind::Agent], 1);
        assert!(!counts.contains_key(&RecordKind::ContextItem));
    }

    // ── Audit chain ───────────────────────────────────────────────────────────

    #[test]
    fn chain_is_valid_after_sequential_writes() {
        let store = store_with_usages(3);
        assert!(store.verify_integrity());

        let log = store.audit_log().unwrap();
        assert_eq!(log[0].prev_hash, AuditEntry::GENESIS_HASH);
        for (idx, entry) in log.iter().enumerate() {
            assert_eq!(entry.sequence, idx as u64);
        }
        assert_eq!(log[1].prev_hash, log[0].this_hash);
    }

    #[test]
    fn tampered_entry_is_detected() {
        let store = store_with_usages(3);
        {
            let mut state = store.state.lock().unwrap();
            state.audit[0].usage.success = !state.audit[0].usage.success;
        }
        assert!(!store.verify_integrity());
    }

    #[test]
    fn tampered_record_is_detected() {
        let store = store_with_usages(2);
        {
            let mut state = store.state.lock().unwrap();
            let key = state.records.keys().find(|k| k.0 == RecordKind::ToolUsage).cloned().unwrap();
            if let Some(Record::ToolUsage(u)) = state.records.get_mut(&key) {
                u.params = json!({ "command": "rm -rf /" });
            }
        }
        assert!(!store.verify_integrity());
    }

    #[test]
    fn empty_store_verifies() {
        assert!(InMemoryRecordStore::new().verify_integrity());
        assert!(super::verify_chain(&[]));
    }

    // ── Snapshots ─────────────────────────────────────────────────────────────

    #[test]
    fn snapshot_round_trip_preserves_records_and_chain() {
        let store = store_with_usages(2);
        store.upsert(agent("a", Some("s1"))).unwrap();

        let json = store.export_snapshot().unwrap();
        let restored = InMemoryRecordStore::from_snapshot(&json).unwrap();

        assert_eq!(restored.counts().unwrap(), store.counts().unwrap());
        assert_eq!(restored.audit_log().unwrap(), store.audit_log().unwrap());
        assert!(restored.verify_integrity());

        // New usages extend the restored chain.
        restored.upsert(Record::ToolUsage(usage("think", true))).unwrap();
        assert!(restored.verify_integrity());
    }

    #[test]
    fn tampered_snapshot_is_rejected() {
        let store = store_with_usages(1);
        let json = store.export_snapshot().unwrap();
        let tampered = json.replace("\"success\":true", "\"success\":false");
        assert_ne!(json, tampered);
        assert!(InMemoryRecordStore::from_snapshot(&tampered).is_err());
    }

    #[test]
    fn clones_share_state() {
        let store = InMemoryRecordStore::new();
        let other = store.clone();
        store.upsert(agent("a", None)).unwrap();
        assert!(other.get_agent("a").unwrap().is_some());
    }
}
