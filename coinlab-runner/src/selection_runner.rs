//! Runs selection for every strategy, in parallel, with cache reuse.

use anyhow::Result;
use chrono::NaiveDateTime;
use coinlab_core::config::StrategyConfig;
use coinlab_core::data::FactorPanel;
use coinlab_core::domain::SelectionRow;
use coinlab_core::fingerprint::StrategyKey;
use coinlab_core::selection::select;
use rayon::prelude::*;
use std::time::Instant;
use tracing::debug;

use crate::cache::SelectionCache;

/// Selection executor over a list of strategies.
pub struct SelectionRunner {
    cache: Option<SelectionCache>,
    parallel: bool,
}

impl SelectionRunner {
    pub fn new(cache: Option<SelectionCache>) -> Self {
        Self {
            cache,
            parallel: true,
        }
    }

    /// Enables or disables parallel execution.
    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn cache(&self) -> Option<&SelectionCache> {
        self.cache.as_ref()
    }

    /// Selection rows per strategy, in the order of `strategies`.
    pub fn run(
        &self,
        strategies: &[StrategyConfig],
        panel: &FactorPanel,
        unified_time: NaiveDateTime,
    ) -> Result<Vec<Vec<SelectionRow>>> {
        if self.parallel {
            strategies
                .par_iter()
                .map(|s| self.run_one(s, panel, unified_time))
                .collect()
        } else {
            strategies
                .iter()
                .map(|s| self.run_one(s, panel, unified_time))
                .collect()
        }
    }

    fn run_one(
        &self,
        strategy: &StrategyConfig,
        panel: &FactorPanel,
        unified_time: NaiveDateTime,
    ) -> Result<Vec<SelectionRow>> {
        let key = StrategyKey::of(strategy);
        if let Some(cache) = &self.cache {
            if let Some(rows) = cache.get(&key)? {
                if let Some(rows) = rescale(rows, strategy.cap_weight) {
                    debug!(strategy = %strategy.name, key = %key, rows = rows.len(), "selection cache hit");
                    return Ok(rows);
                }
            }
        }

        let started = Instant::now();
        let rows = select(strategy, panel, unified_time);
        debug!(
            strategy = %strategy.name,
            rows = rows.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "selection computed"
        );
        if let Some(cache) = &self.cache {
            cache.put(&key, &rows)?;
        }
        Ok(rows)
    }
}

/// Rescale cached rows to a new strategy `cap_weight`.
///
/// `None` when a cached row was stored with a zero cap weight and the new
/// one is not zero; such rows cannot be rescaled and must be recomputed.
pub fn rescale(mut rows: Vec<SelectionRow>, cap_weight: f64) -> Option<Vec<SelectionRow>> {
    for row in rows.iter_mut() {
        if row.cap_weight == cap_weight {
            continue;
        }
        if row.cap_weight == 0.0 {
            return None;
        }
        row.target_alloc_ratio *= cap_weight / row.cap_weight;
        row.cap_weight = cap_weight;
    }
    Some(rows)
}
