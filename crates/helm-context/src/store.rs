//! `ContextStore`: typed, TTL-bound context items over a `RecordStore`.
//!
//! ```text
//! add ──► prioritize ──► persist        get_full_context ──► quota per type
//!                                                        ──► priority-greedy fill
//! ```
//!
//! Expiry is two-phase. `cleanup_expired_items` only flags items whose TTL
//! has elapsed; `delete_expired_items` removes flagged items once they are
//! past the retention window. Reads by id still return flagged items.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use helm_contracts::{
    context::{ContextItem, ContextSnapshot, ContextStats, MaintenanceReport},
    error::HelmResult,
    store::{Record, RecordFilter, RecordKind},
};
use helm_core::traits::RecordStore;

use crate::{config::ContextConfig, priority::Prioritizer};

pub const BEHAVIOR_TTL_SECS: u64 = 86_400;
pub const INTERACTION_TTL_SECS: u64 = 259_200;
pub const TOOL_USAGE_TTL_SECS: u64 = 86_400;
/// Longest user message or response kept by `record_interaction`.
pub const MAX_INTERACTION_CHARS: usize = 10_000;

const TRUNCATION_MARKER: &str = "... [truncated]";

/// Highest priority first; ties go to the most recently updated, then id.
pub(crate) fn by_priority(a: &ContextItem, b: &ContextItem) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| b.updated_at.cmp(&a.updated_at))
        .then_with(|| a.id.cmp(&b.id))
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{TRUNCATION_MARKER}", &text[..cut]),
        None => text.to_string(),
    }
}

fn is_live(item: &ContextItem, now: DateTime<Utc>) -> bool {
    !item.is_expired && !item.is_past_ttl(now)
}

pub struct ContextStore {
    store: Arc<dyn RecordStore>,
    prioritizer: Prioritizer,
    config: ContextConfig,
}

impl ContextStore {
    pub fn new(store: Arc<dyn RecordStore>, config: ContextConfig) -> Self {
        Self {
            store,
            prioritizer: Prioritizer::from_config(&config),
            config,
        }
    }

    pub fn prioritizer(&self) -> &Prioritizer {
        &self.prioritizer
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    // ── Internal helpers ──────────────────────────────────────────────────────

    pub(crate) fn items(&self, filter: RecordFilter) -> HelmResult<Vec<ContextItem>> {
        let filter = RecordFilter {
            kind: Some(RecordKind::ContextItem),
            ..filter
        };
        Ok(self
            .store
            .query(&filter)?
            .into_iter()
            .filter_map(Record::into_context_item)
            .collect())
    }

    pub(crate) fn save(&self, item: ContextItem) -> HelmResult<()> {
        self.store.upsert(Record::ContextItem(item))
    }

    pub(crate) fn insert(
        &self,
        item_type: &str,
        data: Value,
        ttl_secs: Option<u64>,
        session_id: Option<&str>,
        agent_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> HelmResult<String> {
        let mut item = ContextItem {
            id: Uuid::new_v4().to_string(),
            item_type: item_type.to_string(),
            data,
            priority: 0,
            ttl_secs: ttl_secs.unwrap_or(self.config.default_ttl_secs),
            created_at: now,
            updated_at: now,
            session_id: session_id.map(str::to_string),
            agent_id: agent_id.map(str::to_string),
            is_expired: false,
            interaction_count: 0,
            relevance_score: 0.0,
        };
        item.priority = self.prioritizer.priority(&item, now);

        let id = item.id.clone();
        debug!(
            item_id = %id,
            item_type,
            priority = item.priority,
            ttl_secs = item.ttl_secs,
            "context item added"
        );
        self.save(item)?;
        Ok(id)
    }

    // ── Items ─────────────────────────────────────────────────────────────────

    /// Store a new item and return its id. `ttl_secs` defaults to the
    /// configured TTL.
    pub fn add_context_item(
        &self,
        item_type: &str,
        data: Value,
        ttl_secs: Option<u64>,
        session_id: Option<&str>,
    ) -> HelmResult<String> {
        self.add_context_item_at(item_type, data, ttl_secs, session_id, Utc::now())
    }

    pub fn add_context_item_at(
        &self,
        item_type: &str,
        data: Value,
        ttl_secs: Option<u64>,
        session_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> HelmResult<String> {
        self.insert(item_type, data, ttl_secs, session_id, None, now)
    }

    /// Fetch one item visible to `session_id`, even if it has expired.
    pub fn get_context_item(
        &self,
        id: &str,
        session_id: Option<&str>,
    ) -> HelmResult<Option<ContextItem>> {
        self.get_context_item_at(id, session_id, Utc::now())
    }

    pub fn get_context_item_at(
        &self,
        id: &str,
        session_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> HelmResult<Option<ContextItem>> {
        let Some(item) = self.store.get_context_item(id)? else {
            debug!(item_id = %id, "context item not found");
            return Ok(None);
        };
        if !item.visible_to(session_id) {
            debug!(item_id = %id, session_id = ?session_id, "context item belongs to another session");
            return Ok(None);
        }
        if is_live(&item, now) {
            debug!(item_id = %id, "context item retrieved");
        } else {
            debug!(item_id = %id, "retrieved expired context item");
        }
        Ok(Some(item))
    }

    /// Live items of one type visible to `session_id`, highest priority first.
    pub fn get_context_by_type(
        &self,
        item_type: &str,
        session_id: Option<&str>,
        max_items: usize,
    ) -> HelmResult<Vec<ContextItem>> {
        self.get_context_by_type_at(item_type, session_id, max_items, Utc::now())
    }

    pub fn get_context_by_type_at(
        &self,
        item_type: &str,
        session_id: Option<&str>,
        max_items: usize,
        now: DateTime<Utc>,
    ) -> HelmResult<Vec<ContextItem>> {
        let mut items: Vec<ContextItem> = self
            .items(RecordFilter::default().with_item_type(item_type))?
            .into_iter()
            .filter(|item| item.visible_to(session_id) && is_live(item, now))
            .collect();
        items.sort_by(by_priority);
        items.truncate(max_items);
        Ok(items)
    }

    /// Replace an item's data. Returns false when no visible item has `id`.
    ///
    /// An update refreshes `updated_at`, recomputes the priority and clears
    /// the expired flag.
    pub fn update_context_item(
        &self,
        id: &str,
        data: Value,
        session_id: Option<&str>,
    ) -> HelmResult<bool> {
        self.update_context_item_at(id, data, session_id, Utc::now())
    }

    pub fn update_context_item_at(
        &self,
        id: &str,
        data: Value,
        session_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> HelmResult<bool> {
        let Some(mut item) = self.get_context_item_at(id, session_id, now)? else {
            return Ok(false);
        };
        item.data = data;
        item.updated_at = now;
        item.is_expired = false;
        item.priority = self.prioritizer.priority(&item, now);
        debug!(item_id = %id, priority = item.priority, "context item updated");
        self.save(item)?;
        Ok(true)
    }

    /// Count one more interaction with an item and recompute its priority.
    pub fn touch_context_item(&self, id: &str) -> HelmResult<bool> {
        self.touch_context_item_at(id, Utc::now())
    }

    pub fn touch_context_item_at(&self, id: &str, now: DateTime<Utc>) -> HelmResult<bool> {
        let Some(mut item) = self.store.get_context_item(id)? else {
            return Ok(false);
        };
        item.interaction_count = item.interaction_count.saturating_add(1);
        item.priority = self.prioritizer.priority(&item, now);
        self.save(item)?;
        Ok(true)
    }

    /// Set an item's relevance, clamped to `0.0..=1.0`, and recompute its
    /// priority.
    pub fn set_relevance_score(&self, id: &str, score: f64) -> HelmResult<bool> {
        self.set_relevance_score_at(id, score, Utc::now())
    }

    pub fn set_relevance_score_at(&self, id: &str, score: f64, now: DateTime<Utc>) -> HelmResult<bool> {
        let Some(mut item) = self.store.get_context_item(id)? else {
            return Ok(false);
        };
        item.relevance_score = if score.is_nan() { 0.0 } else { score.clamp(0.0, 1.0) };
        item.priority = self.prioritizer.priority(&item, now);
        debug!(item_id = %id, relevance = item.relevance_score, priority = item.priority, "context relevance set");
        self.save(item)?;
        Ok(true)
    }

    /// Recompute every live item's priority. Returns how many changed.
    pub fn update_context_priorities(&self) -> HelmResult<usize> {
        self.update_context_priorities_at(Utc::now())
    }

    pub fn update_context_priorities_at(&self, now: DateTime<Utc>) -> HelmResult<usize> {
        let mut changed = 0;
        for mut item in self.items(RecordFilter::default())? {
            if item.is_expired {
                continue;
            }
            let priority = self.prioritizer.priority(&item, now);
            if priority != item.priority {
                item.priority = priority;
                self.save(item)?;
                changed += 1;
            }
        }
        debug!(changed, "context priorities updated");
        Ok(changed)
    }

    // ── Snapshots ─────────────────────────────────────────────────────────────

    /// Token-bounded snapshot of every live item visible to `session_id`.
    pub fn get_full_context(
        &self,
        session_id: Option<&str>,
        token_limit: usize,
    ) -> HelmResult<ContextSnapshot> {
        self.assemble(session_id, token_limit, None, Utc::now())
    }

    pub fn get_full_context_at(
        &self,
        session_id: Option<&str>,
        token_limit: usize,
        now: DateTime<Utc>,
    ) -> HelmResult<ContextSnapshot> {
        self.assemble(session_id, token_limit, None, now)
    }

    /// `get_full_context` restricted to the listed item types.
    pub fn get_context_for_types(
        &self,
        session_id: Option<&str>,
        types: &[&str],
        token_limit: usize,
    ) -> HelmResult<ContextSnapshot> {
        self.assemble(session_id, token_limit, Some(types), Utc::now())
    }

    /// Each type contributes at most its quota of top-priority items. The
    /// candidates are then added in priority order while they fit in
    /// `token_limit · chars_per_token` characters; an item that does not fit
    /// is skipped, never truncated.
    fn assemble(
        &self,
        session_id: Option<&str>,
        token_limit: usize,
        types: Option<&[&str]>,
        now: DateTime<Utc>,
    ) -> HelmResult<ContextSnapshot> {
        let mut by_type: BTreeMap<String, Vec<ContextItem>> = BTreeMap::new();
        for item in self.items(RecordFilter::default())? {
            let wanted = types.map_or(true, |t| t.contains(&item.item_type.as_str()));
            if wanted && item.visible_to(session_id) && is_live(&item, now) {
                by_type.entry(item.item_type.clone()).or_default().push(item);
            }
        }

        let mut candidates = Vec::new();
        for (item_type, mut items) in by_type {
            let quota = self.prioritizer.quota(&item_type, items.len());
            items.sort_by(by_priority);
            items.truncate(quota);
            candidates.extend(items);
        }
        candidates.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| {
                    self.prioritizer
                        .type_importance(&b.item_type)
                        .total_cmp(&self.prioritizer.type_importance(&a.item_type))
                })
                .then_with(|| by_priority(a, b))
        });

        let char_limit = token_limit.saturating_mul(self.config.chars_per_token);
        let mut char_count = 0;
        let mut context: BTreeMap<String, Vec<Value>> = BTreeMap::new();
        for item in candidates {
            let chars = item.data.to_string().chars().count();
            if char_count + chars > char_limit {
                debug!(item_id = %item.id, chars, char_count, char_limit, "context item skipped, over budget");
                continue;
            }
            char_count += chars;
            context.entry(item.item_type).or_default().push(item.data);
        }

        let snapshot = ContextSnapshot {
            timestamp: now,
            session_id: session_id.map(str::to_string),
            context,
            char_count,
            token_estimate: char_count / self.config.chars_per_token.max(1),
        };
        debug!(
            types = snapshot.context.len(),
            items = snapshot.item_count(),
            token_estimate = snapshot.token_estimate,
            "context snapshot assembled"
        );
        Ok(snapshot)
    }

    // ── Expiry ────────────────────────────────────────────────────────────────

    /// Flag items whose TTL has elapsed. Nothing is deleted.
    pub fn cleanup_expired_items(&self) -> HelmResult<usize> {
        self.cleanup_expired_items_at(Utc::now())
    }

    pub fn cleanup_expired_items_at(&self, now: DateTime<Utc>) -> HelmResult<usize> {
        let mut marked = 0;
        for mut item in self.items(RecordFilter::default())? {
            if !item.is_expired && item.is_past_ttl(now) {
                item.is_expired = true;
                self.save(item)?;
                marked += 1;
            }
        }
        if marked > 0 {
            info!(marked, "context items marked expired");
        }
        Ok(marked)
    }

    /// Remove flagged items created more than `older_than_days` ago.
    pub fn delete_expired_items(&self, older_than_days: u32) -> HelmResult<usize> {
        self.delete_expired_items_at(older_than_days, Utc::now())
    }

    pub fn delete_expired_items_at(
        &self,
        older_than_days: u32,
        now: DateTime<Utc>,
    ) -> HelmResult<usize> {
        let cutoff = Duration::days(i64::from(older_than_days));
        let mut deleted = 0;
        for item in self.items(RecordFilter::default())? {
            if item.is_expired && now - item.created_at > cutoff {
                if self.store.delete(RecordKind::ContextItem, &item.id)? {
                    deleted += 1;
                }
            }
        }
        if deleted > 0 {
            info!(deleted, older_than_days, "expired context items deleted");
        }
        Ok(deleted)
    }

    /// Re-prioritize, flag expired items, then reap past `retention_days`.
    pub fn run_maintenance(&self, retention_days: u32) -> HelmResult<MaintenanceReport> {
        self.run_maintenance_at(retention_days, Utc::now())
    }

    pub fn run_maintenance_at(
        &self,
        retention_days: u32,
        now: DateTime<Utc>,
    ) -> HelmResult<MaintenanceReport> {
        let report = MaintenanceReport {
            reprioritized: self.update_context_priorities_at(now)?,
            marked_expired: self.cleanup_expired_items_at(now)?,
            deleted: self.delete_expired_items_at(retention_days, now)?,
        };
        info!(
            reprioritized = report.reprioritized,
            marked_expired = report.marked_expired,
            deleted = report.deleted,
            "context maintenance finished"
        );
        Ok(report)
    }

    pub fn stats(&self) -> HelmResult<ContextStats> {
        let mut stats = ContextStats::default();
        for item in self.items(RecordFilter::default())? {
            stats.total += 1;
            if item.is_expired {
                stats.expired += 1;
            }
            *stats.by_type.entry(item.item_type).or_insert(0) += 1;
        }
        stats.active = stats.total - stats.expired;
        stats.types = stats.by_type.len();
        Ok(stats)
    }

    // ── Recorders ─────────────────────────────────────────────────────────────

    pub fn record_behavior(
        &self,
        action: &str,
        screen: &str,
        duration_secs: u64,
        details: Value,
        session_id: Option<&str>,
    ) -> HelmResult<String> {
        self.record_behavior_at(action, screen, duration_secs, details, session_id, Utc::now())
    }

    pub fn record_behavior_at(
        &self,
        action: &str,
        screen: &str,
        duration_secs: u64,
        details: Value,
        session_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> HelmResult<String> {
        let details = if details.is_null() { json!({}) } else { details };
        let data = json!({
            "action": action,
            "screen": screen,
            "duration": duration_secs,
            "details": details,
            "timestamp": now.to_rfc3339(),
        });
        self.insert("behavior", data, Some(BEHAVIOR_TTL_SECS), session_id, None, now)
    }

    /// Messages longer than `MAX_INTERACTION_CHARS` are cut and marked.
    pub fn record_interaction(
        &self,
        user_message: &str,
        ai_response: &str,
        context: Value,
        session_id: Option<&str>,
    ) -> HelmResult<String> {
        self.record_interaction_at(user_message, ai_response, context, session_id, Utc::now())
    }

    pub fn record_interaction_at(
        &self,
        user_message: &str,
        ai_response: &str,
        context: Value,
        session_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> HelmResult<String> {
        let context = if context.is_null() { json!({}) } else { context };
        let data = json!({
            "user_message": truncate(user_message, MAX_INTERACTION_CHARS),
            "ai_response": truncate(ai_response, MAX_INTERACTION_CHARS),
            "context": context,
            "timestamp": now.to_rfc3339(),
        });
        self.insert("interaction", data, Some(INTERACTION_TTL_SECS), session_id, None, now)
    }

    pub fn record_tool_usage(
        &self,
        agent_id: &str,
        tool: &str,
        success: bool,
        summary: &str,
        session_id: Option<&str>,
    ) -> HelmResult<String> {
        let now = Utc::now();
        let data = json!({
            "tool": tool,
            "success": success,
            "summary": summary,
            "timestamp": now.to_rfc3339(),
        });
        self.insert("tool_usage", data, Some(TOOL_USAGE_TTL_SECS), session_id, Some(agent_id), now)
    }

    /// Live behaviour items across all sessions, most recently updated first.
    pub fn get_recent_activities(&self, limit: usize) -> HelmResult<Vec<ContextItem>> {
        self.get_recent_activities_at(limit, Utc::now())
    }

    pub fn get_recent_activities_at(
        &self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> HelmResult<Vec<ContextItem>> {
        let mut items: Vec<ContextItem> = self
            .items(RecordFilter::default().with_item_type("behavior"))?
            .into_iter()
            .filter(|item| is_live(item, now))
            .collect();
        items.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
        items.truncate(limit);
        Ok(items)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use helm_store::InMemoryRecordStore;

    use super::*;

    fn context_store() -> ContextStore {
        ContextStore::new(Arc::new(InMemoryRecordStore::new()), ContextConfig::default())
    }

    fn t0() -> DateTime<Utc> {
        Utc::now()
    }

    // ── Items ─────────────────────────────────────────────────────────────────

    #[test]
    fn added_item_gets_priority_and_default_ttl() {
        let cs = context_store();
        let now = t0();
        let id = cs.add_context_item_at("user_info", json!({"name": "ada"}), None, None, now).unwrap();
        let item = cs.get_context_item_at(&id, None, now).unwrap().unwrap();
        assert_eq!(item.priority, 75);
        assert_eq!(item.ttl_secs, 3600);
        assert_eq!(item.data["name"], "ada");
    }

    #[test]
    fn session_scoping() {
        let cs = context_store();
        let now = t0();
        let private = cs.add_context_item_at("task", json!({}), None, Some("s1"), now).unwrap();
        let global = cs.add_context_item_at("task", json!({}), None, None, now).unwrap();

        assert!(cs.get_context_item_at(&private, Some("s1"), now).unwrap().is_some());
        assert!(cs.get_context_item_at(&private, Some("s2"), now).unwrap().is_none());
        assert!(cs.get_context_item_at(&global, Some("s2"), now).unwrap().is_some());
        assert_eq!(cs.get_context_by_type_at("task", Some("s2"), 10, now).unwrap().len(), 1);
        assert_eq!(cs.get_context_by_type_at("task", Some("s1"), 10, now).unwrap().len(), 2);
    }

    #[test]
    fn by_type_is_priority_ordered_and_limited() {
        let cs = context_store();
        let now = t0();
        let old = cs
            .add_context_item_at("task", json!({"n": "old"}), Some(100), None, now - Duration::seconds(90))
            .unwrap();
        let fresh = cs.add_context_item_at("task", json!({"n": "fresh"}), Some(100), None, now).unwrap();
        cs.update_context_priorities_at(now).unwrap();

        let items = cs.get_context_by_type_at("task", None, 10, now).unwrap();
        assert_eq!(items[0].id, fresh);
        assert_eq!(items[1].id, old);
        assert_eq!(cs.get_context_by_type_at("task", None, 1, now).unwrap().len(), 1);
    }

    #[test]
    fn expired_item_is_still_readable_by_id() {
        let cs = context_store();
        let now = t0();
        let id = cs.add_context_item_at("task", json!({}), Some(10), None, now).unwrap();
        let later = now + Duration::seconds(60);
        assert!(cs.get_context_item_at(&id, None, later).unwrap().is_some());
        assert!(cs.get_context_by_type_at("task", None, 10, later).unwrap().is_empty());
    }

    #[test]
    fn update_refreshes_recency_and_clears_the_flag() {
        let cs = context_store();
        let now = t0();
        let id = cs.add_context_item_at("task", json!({"v": 1}), Some(100), None, now).unwrap();
        let later = now + Duration::seconds(200);
        assert_eq!(cs.cleanup_expired_items_at(later).unwrap(), 1);

        assert!(cs.update_context_item_at(&id, json!({"v": 2}), None, later).unwrap());
        let item = cs.get_context_item_at(&id, None, later).unwrap().unwrap();
        assert!(!item.is_expired);
        assert_eq!(item.updated_at, later);
        assert_eq!(item.priority, 65);
        assert_eq!(item.data["v"], 2);

        assert!(!cs.update_context_item_at("missing", json!({}), None, later).unwrap());
    }

    #[test]
    fn touch_counts_interactions() {
        let cs = context_store();
        let now = t0();
        let id = cs.add_context_item_at("user_info", json!({}), None, None, now).unwrap();
        for _ in 0..100 {
            cs.touch_context_item_at(&id, now).unwrap();
        }
        let item = cs.get_context_item_at(&id, None, now).unwrap().unwrap();
        assert_eq!(item.interaction_count, 100);
        assert_eq!(item.priority, 85);
        assert!(!cs.touch_context_item("missing").unwrap());
    }

    #[test]
    fn relevance_raises_priority() {
        let cs = context_store();
        let now = t0();
        let id = cs.add_context_item_at("user_info", json!({}), None, None, now).unwrap();

        assert!(cs.set_relevance_score_at(&id, 1.0, now).unwrap());
        let item = cs.get_context_item_at(&id, None, now).unwrap().unwrap();
        assert_eq!(item.relevance_score, 1.0);
        assert_eq!(item.priority, 85);

        cs.set_relevance_score_at(&id, 7.0, now).unwrap();
        assert_eq!(cs.get_context_item_at(&id, None, now).unwrap().unwrap().relevance_score, 1.0);
        assert!(!cs.set_relevance_score("missing", 0.5).unwrap());
    }

    #[test]
    fn reprioritization_reflects_age() {
        let cs = context_store();
        let now = t0();
        cs.add_context_item_at("user_info", json!({}), Some(3600), None, now).unwrap();
        assert_eq!(cs.update_context_priorities_at(now).unwrap(), 0);
        assert_eq!(cs.update_context_priorities_at(now + Duration::seconds(1800)).unwrap(), 1);
        let item = &cs.get_context_by_type_at("user_info", None, 1, now + Duration::seconds(1800)).unwrap()[0];
        assert_eq!(item.priority, 60);
    }

    // ── Snapshots ─────────────────────────────────────────────────────────────

    #[test]
    fn snapshot_is_priority_greedy_and_skips_what_does_not_fit() {
        let cs = context_store();
        let now = t0();
        // 1 token = 4 chars; a 10-token budget is 40 chars.
        let big = "x".repeat(30);
        cs.add_context_item_at("user_info", json!({"v": big}), None, None, now).unwrap();
        cs.add_context_item_at("metadata", json!({"v": "abcdefghijklmnopqrstuvwxyz"}), None, None, now)
            .unwrap();
        cs.add_context_item_at("metadata", json!({"v": "a"}), None, None, now).unwrap();

        let snapshot = cs.get_full_context_at(None, 10, now).unwrap();
        // user_info (38 chars) goes first; the long metadata item would
        // overflow and is skipped; the short one does not fit either.
        assert_eq!(snapshot.context["user_info"].len(), 1);
        assert!(!snapshot.context.contains_key("metadata"));
        assert_eq!(snapshot.char_count, 38);
        assert_eq!(snapshot.token_estimate, 9);

        let roomy = cs.get_full_context_at(None, 100, now).unwrap();
        assert_eq!(roomy.item_count(), 3);
        assert!(roomy.char_count <= 400);
    }

    #[test]
    fn skipped_item_does_not_block_smaller_ones() {
        let cs = context_store();
        let now = t0();
        cs.add_context_item_at("user_info", json!({"v": "x".repeat(50)}), None, None, now).unwrap();
        cs.add_context_item_at("task", json!({"v": "ok"}), None, None, now).unwrap();

        let snapshot = cs.get_full_context_at(None, 5, now).unwrap();
        assert!(!snapshot.context.contains_key("user_info"));
        assert_eq!(snapshot.context["task"], vec![json!({"v": "ok"})]);
    }

    #[test]
    fn snapshot_respects_type_quota() {
        let cs = context_store();
        let now = t0();
        for n in 0..6 {
            cs.add_context_item_at("metadata", json!({ "n": n }), None, None, now).unwrap();
        }
        let snapshot = cs.get_full_context_at(None, 10_000, now).unwrap();
        assert_eq!(snapshot.context["metadata"].len(), 2);
    }

    #[test]
    fn snapshot_excludes_expired_and_foreign_items() {
        let cs = context_store();
        let now = t0();
        cs.add_context_item_at("task", json!({"s": 1}), None, Some("s1"), now).unwrap();
        cs.add_context_item_at("task", json!({"s": 2}), None, Some("s2"), now).unwrap();
        cs.add_context_item_at("task", json!({"short": true}), Some(5), Some("s1"), now).unwrap();

        let snapshot = cs.get_full_context_at(Some("s1"), 1000, now + Duration::seconds(60)).unwrap();
        assert_eq!(snapshot.context["task"], vec![json!({"s": 1})]);
        assert_eq!(snapshot.session_id.as_deref(), Some("s1"));
    }

    #[test]
    fn type_filter_restricts_snapshot() {
        let cs = context_store();
        cs.add_context_item("task", json!({}), None, None).unwrap();
        cs.add_context_item("behavior", json!({}), None, None).unwrap();
        let snapshot = cs.get_context_for_types(None, &["task"], 1000).unwrap();
        assert_eq!(snapshot.context.keys().collect::<Vec<_>>(), vec!["task"]);
    }

    // ── Two-phase expiry ──────────────────────────────────────────────────────

    #[test]
    fn cleanup_marks_and_delete_reaps_only_marked_old_items() {
        let cs = context_store();
        let now = t0();
        let short = cs.add_context_item_at("task", json!({}), Some(60), None, now).unwrap();
        let long = cs.add_context_item_at("task", json!({}), Some(86_400 * 90), None, now).unwrap();

        let day_two = now + Duration::days(2);
        assert_eq!(cs.cleanup_expired_items_at(day_two).unwrap(), 1);
        assert_eq!(cs.cleanup_expired_items_at(day_two).unwrap(), 0, "already marked");
        assert_eq!(cs.delete_expired_items_at(30, day_two).unwrap(), 0, "inside retention");
        assert!(cs.get_context_item_at(&short, None, day_two).unwrap().unwrap().is_expired);

        let day_forty = now + Duration::days(40);
        assert_eq!(cs.delete_expired_items_at(30, day_forty).unwrap(), 1);
        assert!(cs.get_context_item(&short, None).unwrap().is_none());
        assert!(cs.get_context_item(&long, None).unwrap().is_some(), "unmarked items survive");
    }

    #[test]
    fn maintenance_runs_all_three_phases() {
        let cs = context_store();
        let now = t0();
        cs.add_context_item_at("task", json!({}), Some(60), None, now).unwrap();
        cs.add_context_item_at("task", json!({}), Some(86_400 * 90), None, now).unwrap();

        let report = cs.run_maintenance_at(30, now + Duration::days(1)).unwrap();
        assert_eq!(report.marked_expired, 1);
        assert_eq!(report.deleted, 0);
        assert!(report.reprioritized >= 1);

        let report = cs.run_maintenance_at(30, now + Duration::days(31)).unwrap();
        assert_eq!(report.deleted, 1);

        let stats = cs.stats().unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.active, 1);
        assert_eq!(stats.expired, 0);
    }

    #[test]
    fn stats_count_per_type() {
        let cs = context_store();
        let now = t0();
        cs.add_context_item_at("task", json!({}), Some(1), None, now).unwrap();
        cs.add_context_item_at("task", json!({}), None, None, now).unwrap();
        cs.add_context_item_at("behavior", json!({}), None, None, now).unwrap();
        cs.cleanup_expired_items_at(now + Duration::seconds(10)).unwrap();

        let stats = cs.stats().unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.expired, 1);
        assert_eq!(stats.active, 2);
        assert_eq!(stats.types, 2);
        assert_eq!(stats.by_type["task"], 2);
    }

    // ── Recorders ─────────────────────────────────────────────────────────────

    #[test]
    fn recorders_use_their_ttls() {
        let cs = context_store();
        let b = cs.record_behavior("open", "chat", 3, Value::Null, Some("s1")).unwrap();
        let i = cs.record_interaction("hi", "hello", Value::Null, Some("s1")).unwrap();
        let t = cs.record_tool_usage("agent-1", "run_command", true, "listed files", None).unwrap();

        let behavior = cs.get_context_item(&b, None).unwrap().unwrap();
        assert_eq!(behavior.ttl_secs, BEHAVIOR_TTL_SECS);
        assert_eq!(behavior.data["details"], json!({}));
        assert_eq!(cs.get_context_item(&i, None).unwrap().unwrap().ttl_secs, INTERACTION_TTL_SECS);

        let usage = cs.get_context_item(&t, None).unwrap().unwrap();
        assert_eq!(usage.item_type, "tool_usage");
        assert_eq!(usage.agent_id.as_deref(), Some("agent-1"));
        assert_eq!(usage.data["tool"], "run_command");
    }

    #[test]
    fn long_interactions_are_truncated() {
        let cs = context_store();
        let long = "é".repeat(MAX_INTERACTION_CHARS + 5);
        let id = cs.record_interaction(&long, "short", json!({"k": 1}), None).unwrap();
        let item = cs.get_context_item(&id, None).unwrap().unwrap();

        let stored = item.data["user_message"].as_str().unwrap();
        assert!(stored.ends_with(TRUNCATION_MARKER));
        assert_eq!(stored.chars().count(), MAX_INTERACTION_CHARS + TRUNCATION_MARKER.len());
        assert_eq!(item.data["ai_response"], "short");
    }

    #[test]
    fn recent_activities_are_newest_first() {
        let cs = context_store();
        let now = t0();
        for (n, action) in ["first", "second", "third"].iter().enumerate() {
            let session = format!("s{n}");
            let at = now + Duration::seconds(n as i64);
            cs.record_behavior_at(action, "chat", 0, json!({}), Some(session.as_str()), at).unwrap();
        }
        cs.add_context_item_at("task", json!({}), None, None, now).unwrap();

        let recent = cs.get_recent_activities_at(2, now + Duration::seconds(5)).unwrap();
        let actions: Vec<_> = recent.iter().map(|i| i.data["action"].as_str().unwrap()).collect();
        assert_eq!(actions, vec!["third", "second"]);
    }
}
