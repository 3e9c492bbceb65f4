//! Context items and the snapshots assembled from them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A typed, TTL-bound piece of context.
///
/// Logical expiry (`now - updated_at > ttl`) is recorded in `is_expired` by
/// the cleanup pass. Physical deletion happens only in the reaper, after the
/// retention window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextItem {
    pub id: String,
    pub item_type: String,
    pub data: Value,
    /// Stored priority in `0..=100`.
    pub priority: u8,
    pub ttl_secs: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub is_expired: bool,
    #[serde(default)]
    pub interaction_count: u32,
    #[serde(default)]
    pub relevance_score: f64,
}

impl ContextItem {
    /// Seconds since the last update, never negative.
    pub fn age_secs(&self, now: DateTime<Utc>) -> f64 {
        let millis = (now - self.updated_at).num_milliseconds().max(0);
        millis as f64 / 1000.0
    }

    /// Whether the TTL has elapsed, regardless of the `is_expired` flag.
    pub fn is_past_ttl(&self, now: DateTime<Utc>) -> bool {
        self.age_secs(now) > self.ttl_secs as f64
    }

    /// Global items (no session) are visible to every session.
    pub fn visible_to(&self, session_id: Option<&str>) -> bool {
        match (session_id, self.session_id.as_deref()) {
            (None, _) => true,
            (Some(_), None) => true,
            (Some(wanted), Some(own)) => wanted == own,
        }
    }
}

/// A token-bounded, type-grouped view of the context store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub timestamp: DateTime<Utc>,
    pub session_id: Option<String>,
    /// Item payloads grouped by item type, highest priority first.
    pub context: BTreeMap<String, Vec<Value>>,
    pub char_count: usize,
    pub token_estimate: usize,
}

impl ContextSnapshot {
    pub fn item_count(&self) -> usize {
        self.context.values().map(Vec::len).sum()
    }
}

/// One member of a context chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainLink {
    pub item_id: String,
    pub position: usize,
    pub added_at: DateTime<Utc>,
}

/// Ordered grouping of related context items, stored as a `context_chain` item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextChain {
    pub chain_id: String,
    pub name: String,
    pub description: String,
    pub root_item_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<ChainLink>,
}

/// A chain member resolved against the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainMember {
    pub position: usize,
    pub item_id: String,
    pub item_type: String,
    pub data: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Aggregate counts over the context store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextStats {
    pub total: usize,
    pub active: usize,
    pub expired: usize,
    pub types: usize,
    pub by_type: BTreeMap<String, usize>,
}

/// What one maintenance pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceReport {
    pub reprioritized: usize,
    pub marked_expired: usize,
    pub deleted: usize,
}
