//! The one priority formula for context items.
//!
//! ```text
//! score = 0.5·type_priority + 0.3·recency + 0.1·interaction + 0.1·relevance
//! recency     = max(0, 1 − age_secs / ttl_secs)
//! interaction = min(1, 0.1·√interaction_count)
//! ```
//!
//! The score is clamped to `[0, 1]` and stored as `round(score · 100)`.
//! Age is measured from `updated_at`, so an update refreshes recency.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use helm_contracts::context::ContextItem;

use crate::config::ContextConfig;

const TYPE_WEIGHT: f64 = 0.5;
const RECENCY_WEIGHT: f64 = 0.3;
const INTERACTION_WEIGHT: f64 = 0.1;
const RELEVANCE_WEIGHT: f64 = 0.1;

/// Weight used for types missing from a table.
pub const DEFAULT_WEIGHT: f64 = 0.5;

/// Base priority of each item type.
pub const DEFAULT_TYPE_PRIORITY: &[(&str, f64)] = &[
    ("user_info", 0.9),
    ("agent", 0.85),
    ("session", 0.85),
    ("behavior", 0.8),
    ("interaction", 0.8),
    ("request", 0.75),
    ("task", 0.7),
    ("github", 0.7),
    ("decision", 0.7),
    ("environment", 0.65),
    ("tool_usage", 0.6),
    ("tool_result", 0.6),
    ("metadata", 0.2),
];

/// Share of the per-type snapshot quota each item type receives.
pub const DEFAULT_TYPE_IMPORTANCE: &[(&str, f64)] = &[
    ("user_info", 1.0),
    ("agent", 1.0),
    ("interaction", 0.8),
    ("behavior", 0.8),
    ("github", 0.7),
    ("task", 0.7),
    ("tool_usage", 0.6),
    ("tool_result", 0.6),
    ("environment", 0.4),
    ("request", 0.3),
    ("metadata", 0.2),
];

fn table(defaults: &[(&str, f64)], overrides: &BTreeMap<String, f64>) -> BTreeMap<String, f64> {
    let mut weights: BTreeMap<String, f64> =
        defaults.iter().map(|(t, w)| (t.to_string(), *w)).collect();
    weights.extend(overrides.iter().map(|(t, w)| (t.clone(), *w)));
    weights
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prioritizer {
    type_priority: BTreeMap<String, f64>,
    type_importance: BTreeMap<String, f64>,
    max_items_per_type: usize,
}

impl Default for Prioritizer {
    fn default() -> Self {
        Self::from_config(&ContextConfig::default())
    }
}

impl Prioritizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in tables with the config's entries layered on top.
    pub fn from_config(config: &ContextConfig) -> Self {
        Self {
            type_priority: table(DEFAULT_TYPE_PRIORITY, &config.type_priority),
            type_importance: table(DEFAULT_TYPE_IMPORTANCE, &config.type_importance),
            max_items_per_type: config.max_items_per_type,
        }
    }

    pub fn type_priority(&self, item_type: &str) -> f64 {
        self.type_priority.get(item_type).copied().unwrap_or(DEFAULT_WEIGHT)
    }

    pub fn type_importance(&self, item_type: &str) -> f64 {
        self.type_importance.get(item_type).copied().unwrap_or(DEFAULT_WEIGHT)
    }

    /// 1 when just updated, falling linearly to 0 at the TTL.
    pub fn recency_factor(item: &ContextItem, now: DateTime<Utc>) -> f64 {
        if item.ttl_secs == 0 {
            return 0.0;
        }
        (1.0 - item.age_secs(now) / item.ttl_secs as f64).max(0.0)
    }

    pub fn interaction_factor(interaction_count: u32) -> f64 {
        (0.1 * f64::from(interaction_count).sqrt()).min(1.0)
    }

    /// The unscaled score in `[0, 1]`.
    pub fn score(&self, item: &ContextItem, now: DateTime<Utc>) -> f64 {
        let score = TYPE_WEIGHT * self.type_priority(&item.item_type)
            + RECENCY_WEIGHT * Self::recency_factor(item, now)
            + INTERACTION_WEIGHT * Self::interaction_factor(item.interaction_count)
            + RELEVANCE_WEIGHT * item.relevance_score.clamp(0.0, 1.0);
        score.clamp(0.0, 1.0)
    }

    /// The stored priority, `0..=100`.
    pub fn priority(&self, item: &ContextItem, now: DateTime<Utc>) -> u8 {
        (self.score(item, now) * 100.0).round() as u8
    }

    /// How many items of `item_type` a snapshot fetches when `available`
    /// are live: `max(1, min(available, ⌊max_items_per_type · importance⌋))`.
    pub fn quota(&self, item_type: &str, available: usize) -> usize {
        let scaled = self.max_items_per_type as f64 * self.type_importance(item_type);
        // Absorb float error such as 0.7 * 10 = 7.000000000000001.
        let by_importance = (scaled + 1e-9).floor() as usize;
        available.min(by_importance).max(1)
    }
}
