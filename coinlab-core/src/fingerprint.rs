//! Stable cache keys for strategy selections.
//!
//! The key covers everything that changes selection output (name, hold
//! period, market, offsets, factor and filter lists, side weights, counts,
//! count clamps and rank-window inclusivity)
//! and nothing else, so editing one strategy leaves the others' caches valid.
//! The strategy's own `cap_weight` is not part of the key; cached rows are
//! rescaled on load.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::StrategyConfig;

/// Number of hex characters of the hash kept in the key.
const HASH_PREFIX: usize = 8;

/// Cache key of a strategy: `{name}-{8 hex chars of blake3(fullname)}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StrategyKey(pub String);

impl StrategyKey {
    pub fn of(strategy: &StrategyConfig) -> Self {
        use serde_json::json;

        let canonical = json!({
            "fullname": strategy.fullname(),
        });
        let hash = blake3::hash(canonical.to_string().as_bytes());
        let hex = hash.to_hex();
        Self(format!("{}-{}", strategy.name, &hex[..HASH_PREFIX]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StrategyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}
