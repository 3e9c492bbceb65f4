//! Scenario 5: Context snapshot and expiry
//!
//! Items of several types are scored by the one priority formula. A snapshot
//! under a token limit takes candidates in priority order and skips any that
//! would overflow the budget, so a small low-priority item can still land
//! after a larger one was skipped. Expiry is two-phase: past-TTL items are
//! first flagged, and only flagged items older than the retention window are
//! deleted.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::json;

use helm_contracts::{context::ContextSnapshot, error::HelmResult};

use crate::mock_model::ScriptedModel;
use crate::runtime::{load_reference_config, Runtime};

const SESSION: &str = "reference";
const TIGHT_TOKEN_LIMIT: usize = 40;

#[derive(Debug, Clone, PartialEq)]
pub struct ContextSnapshotOutcome {
    /// `(item_type, priority)` in insertion order.
    pub priorities: Vec<(String, u8)>,
    pub full: ContextSnapshot,
    pub tight: ContextSnapshot,
    pub flagged: usize,
    pub flagged_item_readable: bool,
    pub flagged_item_in_snapshot: bool,
    pub deleted_within_retention: usize,
    pub deleted_after_retention: usize,
    pub flagged_item_gone: bool,
}

fn add(
    runtime: &Runtime,
    item_type: &str,
    data: serde_json::Value,
    ttl_secs: Option<u64>,
    at: DateTime<Utc>,
    priorities: &mut Vec<(String, u8)>,
) -> HelmResult<String> {
    let context = runtime.context();
    let id = context.add_context_item_at(item_type, data, ttl_secs, Some(SESSION), at)?;
    if let Some(item) = context.get_context_item_at(&id, Some(SESSION), at)? {
        println!("  + {:<10} priority {:>3}  {}", item.item_type, item.priority, item.data);
        priorities.push((item.item_type, item.priority));
    }
    Ok(id)
}

fn print_snapshot(label: &str, snapshot: &ContextSnapshot) {
    println!(
        "  {}: {} item(s), {} chars, ~{} tokens",
        label,
        snapshot.item_count(),
        snapshot.char_count,
        snapshot.token_estimate
    );
    for (item_type, items) in &snapshot.context {
        for data in items {
            println!("    [{}] {}", item_type, data);
        }
    }
}

pub fn run_scenario() -> HelmResult<ContextSnapshotOutcome> {
    println!("=== Scenario 5: Context Snapshot and Expiry ===");
    println!();

    let runtime = Runtime::from_config(load_reference_config()?, Arc::new(ScriptedModel::default()))?;
    let context = runtime.context();
    let now = Utc::now();
    let mut priorities = Vec::new();

    // ── Sub-case A: scoring ──────────────────────────────────────────────────

    println!("  Sub-case A: items scored on insert");
    add(&runtime, "user_info", json!({"name": "Ada", "preference": "terse answers"}), None, now, &mut priorities)?;
    add(&runtime, "decision", json!({"choice": "keep the in-memory store"}), None, now, &mut priorities)?;
    add(&runtime, "task", json!({"title": "wire the registry"}), None, now - Duration::seconds(10), &mut priorities)?;
    add(&runtime, "task", json!({"title": "write the scenarios"}), None, now - Duration::seconds(20), &mut priorities)?;
    add(&runtime, "task", json!({"title": "trim old code"}), None, now - Duration::seconds(30), &mut priorities)?;
    add(&runtime, "metadata", json!({"build": "debug"}), None, now, &mut priorities)?;
    println!();

    // ── Sub-case B: token-bounded snapshot ───────────────────────────────────

    println!("  Sub-case B: snapshots");
    let full = context.get_full_context_at(Some(SESSION), 1_000, now)?;
    print_snapshot("Unbounded", &full);
    let tight = context.get_full_context_at(Some(SESSION), TIGHT_TOKEN_LIMIT, now)?;
    print_snapshot(&format!("{TIGHT_TOKEN_LIMIT} tokens"), &tight);
    println!();

    // ── Sub-case C: two-phase expiry ─────────────────────────────────────────

    println!("  Sub-case C: two-phase expiry");
    let short_lived = add(
        &runtime,
        "request",
        json!({"ask": "summarize the run"}),
        Some(60),
        now,
        &mut priorities,
    )?;

    let later = now + Duration::minutes(2);
    let flagged = context.cleanup_expired_items_at(later)?;
    let flagged_item_readable = context
        .get_context_item_at(&short_lived, Some(SESSION), later)?
        .is_some_and(|item| item.is_expired);
    let flagged_item_in_snapshot = context
        .get_full_context_at(Some(SESSION), 1_000, later)?
        .context
        .contains_key("request");
    println!("  Flagged past TTL:       {}", flagged);
    println!("  Still readable by id:   {}", if flagged_item_readable { "YES" } else { "NO" });
    println!("  In snapshot:            {}", if flagged_item_in_snapshot { "YES" } else { "NO" });

    let retention = runtime.config().context.retention_days;
    let deleted_within_retention = context.delete_expired_items_at(retention, later)?;
    let deleted_after_retention =
        context.delete_expired_items_at(retention, now + Duration::days(i64::from(retention) + 1))?;
    let flagged_item_gone = context.get_context_item(&short_lived, Some(SESSION))?.is_none();
    println!("  Deleted within {} days: {}", retention, deleted_within_retention);
    println!("  Deleted after {} days:  {}", retention, deleted_after_retention);

    let stats = context.stats()?;
    println!("  Remaining items:        {} across {} type(s)", stats.total, stats.types);
    println!();
    println!("  Scenario 5 complete.");
    println!();

    Ok(ContextSnapshotOutcome {
        priorities,
        full,
        tight,
        flagged,
        flagged_item_readable,
        flagged_item_in_snapshot,
        deleted_within_retention,
        deleted_after_retention,
        flagged_item_gone,
    })
}
