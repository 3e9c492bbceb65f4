use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use helm_contracts::error::{HelmError, HelmResult};

/// Tuning for the context store, the `[context]` section of the runtime
/// configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// TTL applied when `add_context_item` is given none.
    pub default_ttl_secs: u64,
    pub chars_per_token: usize,
    /// Upper bound on the per-type fetch quota of a snapshot.
    pub max_items_per_type: usize,
    pub retention_days: u32,
    /// Overrides for the built-in type priority table.
    pub type_priority: BTreeMap<String, f64>,
    /// Overrides for the built-in type importance table.
    pub type_importance: BTreeMap<String, f64>,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: 3600,
            chars_per_token: 4,
            max_items_per_type: 10,
            retention_days: 30,
            type_priority: BTreeMap::new(),
            type_importance: BTreeMap::new(),
        }
    }
}

impl ContextConfig {
    pub fn validate(&self) -> HelmResult<()> {
        if self.chars_per_token == 0 {
            return Err(HelmError::Config {
                reason: "context chars_per_token must be greater than 0".to_string(),
            });
        }
        let tables = [
            ("type_priority", &self.type_priority),
            ("type_importance", &self.type_importance),
        ];
        for (table, weights) in tables {
            for (item_type, weight) in weights {
                if !(0.0..=1.0).contains(weight) {
                    return Err(HelmError::Config {
                        reason: format!(
                            "context {table} weight for '{item_type}' must lie in [0, 1], got {weight}"
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}
