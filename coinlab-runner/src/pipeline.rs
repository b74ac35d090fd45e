//! End-to-end position pipeline.
//!
//! universe preparation → daily resampling (day hold periods) → factor computation → per-strategy selection (cached)
//! → common-start trim → transfer to swap → aggregation → position limits.

use chrono::NaiveDateTime;
use coinlab_core::aggregate::{aggregate, VenueMatrices};
use coinlab_core::config::{BacktestConfig, ConfigError, StrategyConfig};
use coinlab_core::data::{resample_daily, DataError, FactorPanel};
use coinlab_core::domain::{SelectionRow, Venue};
use coinlab_core::factors::{compute_factor_columns, FactorError, FactorRegistry};
use coinlab_core::fingerprint::StrategyKey;
use coinlab_core::redistribute::apply_position_limits;
use coinlab_core::selection::{transfer_to_swap, trim_to_common_start};
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::cache::SelectionCache;
use crate::selection_runner::SelectionRunner;

/// Errors that abort a pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("data error: {0}")]
    Data(#[from] DataError),

    #[error("factor error: {0}")]
    Factor(#[from] FactorError),

    #[error("selection cache error: {0:#}")]
    Cache(anyhow::Error),

    #[error("no panel rows left after universe filtering")]
    EmptyUniverse,
}

/// Final matrices plus the per-strategy selections that produced them.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub matrices: VenueMatrices,
    /// Selections by strategy name, after trim and transfer.
    pub selections: BTreeMap<String, Vec<SelectionRow>>,
    /// Common first selection time, when any strategy selected anything.
    pub start: Option<NaiveDateTime>,
    /// Universe-filtered hourly panel, for lot replay.
    pub panel: FactorPanel,
}

/// Pipeline configuration: factor registry, optional cache, parallelism.
pub struct Pipeline {
    registry: FactorRegistry,
    cache: Option<SelectionCache>,
    parallel: bool,
}

impl Pipeline {
    pub fn new(registry: FactorRegistry) -> Self {
        Self {
            registry,
            cache: None,
            parallel: true,
        }
    }

    pub fn with_cache(mut self, cache: SelectionCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Enables or disables parallel selection.
    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn registry(&self) -> &FactorRegistry {
        &self.registry
    }

    /// Universe filtering on the hourly panel.
    pub fn universe_panel(
        &self,
        config: &BacktestConfig,
        panel: &FactorPanel,
    ) -> Result<FactorPanel, PipelineError> {
        let hourly = config.universe.apply(panel);
        if hourly.is_empty() {
            return Err(PipelineError::EmptyUniverse);
        }
        info!(
            rows = hourly.len(),
            dropped = panel.len() - hourly.len(),
            "universe filtered"
        );
        Ok(hourly)
    }

    /// The panel selection reads: daily bars for day hold periods, then
    /// every factor column the strategies need.
    pub fn selection_panel(
        &self,
        config: &BacktestConfig,
        hourly: &FactorPanel,
    ) -> Result<FactorPanel, PipelineError> {
        let mut prepared = if config.is_day_period() {
            resample_daily(hourly)
        } else {
            hourly.clone()
        };
        let needed: Vec<_> = config
            .strategies
            .iter()
            .flat_map(StrategyConfig::required_factors)
            .collect();
        compute_factor_columns(&mut prepared, &self.registry, &needed)?;
        info!(
            rows = prepared.len(),
            daily = config.is_day_period(),
            columns = needed.len(),
            "panel prepared"
        );
        Ok(prepared)
    }

    /// [`universe_panel`](Self::universe_panel) followed by
    /// [`selection_panel`](Self::selection_panel).
    pub fn prepare_panel(
        &self,
        config: &BacktestConfig,
        panel: &FactorPanel,
    ) -> Result<FactorPanel, PipelineError> {
        let hourly = self.universe_panel(config, panel)?;
        self.selection_panel(config, &hourly)
    }

    /// Selection for every strategy over an already prepared panel, in
    /// config order. Results are written to the cache when one is set.
    pub fn select(
        &self,
        config: &BacktestConfig,
        prepared: &FactorPanel,
    ) -> Result<Vec<Vec<SelectionRow>>, PipelineError> {
        let runner = SelectionRunner::new(self.cache.clone()).with_parallelism(self.parallel);
        let selections = runner
            .run(&config.strategies, prepared, config.unified_time)
            .map_err(PipelineError::Cache)?;
        info!(
            strategies = selections.len(),
            rows = selections.iter().map(Vec::len).sum::<usize>(),
            "selection done"
        );
        Ok(selections)
    }

    /// Run the whole pipeline.
    pub fn run(
        &self,
        config: &BacktestConfig,
        panel: &FactorPanel,
    ) -> Result<PipelineOutput, PipelineError> {
        let hourly = self.universe_panel(config, panel)?;
        let prepared = self.selection_panel(config, &hourly)?;
        let mut selections = self.select(config, &prepared)?;

        let start = trim_to_common_start(&mut selections);
        match start {
            Some(t) => info!(start = %t, "selections trimmed to common start"),
            None => warn!("no strategy selected anything"),
        }
        for (strategy, rows) in config.strategies.iter().zip(selections.iter_mut()) {
            if strategy.market.order_first == Venue::Swap {
                transfer_to_swap(rows, &prepared);
            }
        }

        let pairs: Vec<(&StrategyConfig, &[SelectionRow])> = config
            .strategies
            .iter()
            .zip(selections.iter())
            .map(|(s, rows)| (s, rows.as_slice()))
            .collect();
        let matrices = aggregate(&pairs, config.start, config.end);

        let mut fills = BTreeMap::new();
        for name in config.position_limits.fill_strategies() {
            if let Some(pair) = pairs.iter().find(|(s, _)| s.name == name) {
                fills.insert(name.to_string(), aggregate(&[*pair], config.start, config.end));
            }
        }
        let matrices =
            apply_position_limits(matrices, &config.position_limits, config.leverage, &fills);

        if let Some(cache) = &self.cache {
            if !config.reserve_cache {
                for strategy in &config.strategies {
                    cache
                        .remove(&StrategyKey::of(strategy))
                        .map_err(PipelineError::Cache)?;
                }
            }
        }

        let selections = config
            .strategies
            .iter()
            .map(|s| s.name.clone())
            .zip(selections)
            .collect();
        Ok(PipelineOutput {
            matrices,
            selections,
            start,
            panel: hourly,
        })
    }
}
