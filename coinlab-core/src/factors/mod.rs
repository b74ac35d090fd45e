//! Factor trait, registry and panel-wide factor computation.
//!
//! A factor turns the panel into one named column. Time-series factors look
//! at a single (symbol, venue) history; cross-sectional factors need the
//! whole panel and may depend on other factor columns, which are computed
//! first. Columns already present in the input panel are never recomputed,
//! so externally precomputed factors work without registration.

pub mod cross_section;
pub mod time_series;

pub use cross_section::{BiasRankDiff, PctChangeRank};
pub use time_series::{Bias, PctChange, QuoteVolumeMean, Volatility};

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

use crate::config::{column_name, FactorParam};
use crate::data::FactorPanel;

// ─── Error type ──────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum FactorError {
    #[error("unknown factor: {0}")]
    UnknownFactor(String),

    #[error("factor '{factor}' needs column '{column}', which is not in the panel")]
    MissingColumn { factor: String, column: String },

    #[error("factor '{factor}' cannot use parameter '{param}'")]
    InvalidParam { factor: String, param: String },
}

// ─── Trait ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FactorKind {
    /// Computed per (symbol, venue) series from its own history.
    TimeSeries,
    /// Computed jointly over every symbol in each time bucket.
    CrossSectional,
}

/// A pluggable factor implementation.
pub trait Factor: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> FactorKind;

    /// Factors whose columns must exist before this one is computed.
    fn dependencies(&self, _param: &FactorParam) -> Vec<(String, FactorParam)> {
        Vec::new()
    }

    /// Compute the column for every panel row. Output length equals `panel.len()`.
    fn compute(&self, panel: &FactorPanel, param: &FactorParam) -> Result<Vec<f64>, FactorError>;
}

/// Window length for `factor`, or an `InvalidParam` error.
pub(crate) fn window(factor: &str, param: &FactorParam) -> Result<usize, FactorError> {
    param.as_window().ok_or_else(|| FactorError::InvalidParam {
        factor: factor.to_string(),
        param: param.to_string(),
    })
}

// ─── Registry ────────────────────────────────────────────────────────

/// Name → factor lookup, populated once at startup.
#[derive(Clone, Default)]
pub struct FactorRegistry {
    factors: HashMap<String, Arc<dyn Factor>>,
}

impl FactorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in factor.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(PctChange));
        registry.register(Arc::new(Bias));
        registry.register(Arc::new(Volatility));
        registry.register(Arc::new(QuoteVolumeMean));
        registry.register(Arc::new(PctChangeRank));
        registry.register(Arc::new(BiasRankDiff));
        registry
    }

    /// Add or replace a factor under its own name.
    pub fn register(&mut self, factor: Arc<dyn Factor>) {
        self.factors.insert(factor.name().to_string(), factor);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Factor>> {
        self.factors.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factors.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factors.keys().map(|k| k.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Dependencies of a cross-sectional factor; empty for anything else.
    pub fn cross_dependencies(&self, name: &str, param: &FactorParam) -> Vec<(String, FactorParam)> {
        match self.get(name) {
            Some(f) if f.kind() == FactorKind::CrossSectional => f.dependencies(param),
            _ => Vec::new(),
        }
    }
}

impl std::fmt::Debug for FactorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FactorRegistry")
            .field("factors", &self.names())
            .finish()
    }
}

// ─── Panel computation ───────────────────────────────────────────────

/// Resolve `needed` plus transitive dependencies into a compute plan,
/// keyed by column name. Columns already in the panel are left out.
fn plan(
    panel: &FactorPanel,
    registry: &FactorRegistry,
    needed: &[(String, FactorParam)],
) -> Result<BTreeMap<String, (Arc<dyn Factor>, FactorParam)>, FactorError> {
    let mut plan = BTreeMap::new();
    let mut stack: Vec<(String, FactorParam)> = needed.to_vec();
    while let Some((name, param)) = stack.pop() {
        let col = column_name(&name, &param);
        if panel.has_column(&col) || plan.contains_key(&col) {
            continue;
        }
        let factor = registry
            .get(&name)
            .cloned()
            .ok_or_else(|| FactorError::UnknownFactor(name.clone()))?;
        stack.extend(factor.dependencies(&param));
        plan.insert(col, (factor, param));
    }
    Ok(plan)
}

/// Compute every factor column in `needed` (and its dependencies) into the panel.
///
/// Time-series factors run first so cross-sectional factors can read them.
pub fn compute_factor_columns(
    panel: &mut FactorPanel,
    registry: &FactorRegistry,
    needed: &[(String, FactorParam)],
) -> Result<(), FactorError> {
    let plan = plan(panel, registry, needed)?;
    for kind in [FactorKind::TimeSeries, FactorKind::CrossSectional] {
        for (col, (factor, param)) in plan.iter().filter(|(_, (f, _))| f.kind() == kind) {
            let values = factor.compute(panel, param)?;
            debug!(column = %col, kind = ?kind, "factor computed");
            panel.set_column(col.clone(), values);
        }
    }
    Ok(())
}

/// Rolling mean over `window` values; NaN until the window is full or
/// whenever it contains a NaN.
pub(crate) fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if window == 0 || n < window {
        return result;
    }
    let mut sum = 0.0;
    let mut nans = 0usize;
    for (i, &v) in values.iter().enumerate() {
        if v.is_nan() {
            nans += 1;
        } else {
            sum += v;
        }
        if i >= window {
            let leaving = values[i - window];
            if leaving.is_nan() {
                nans -= 1;
            } else {
                sum -= leaving;
            }
        }
        if i + 1 >= window && nans == 0 {
            result[i] = sum / window as f64;
        }
    }
    result
}

/// Run `f` over each (symbol, venue) series of `source` and scatter the
/// results back to panel rows.
pub(crate) fn per_series(
    panel: &FactorPanel,
    source: &[f64],
    f: impl Fn(&[f64]) -> Vec<f64>,
) -> Vec<f64> {
    let mut out = vec![f64::NAN; panel.len()];
    for rows in panel.series() {
        let series: Vec<f64> = rows.iter().map(|&r| source[r]).collect();
        for (&r, v) in rows.iter().zip(f(&series)) {
            out[r] = v;
        }
    }
    out
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::data::test_support::hour;
    use crate::data::{FactorPanel, PanelRow};

    /// Two swap symbols over `closes.len()` hours.
    pub fn two_symbol_panel(a: &[f64], b: &[f64]) -> FactorPanel {
        let mut rows = Vec::new();
        for (h, &c) in a.iter().enumerate() {
            rows.push(PanelRow::new(hour(h as i64), "AAA-USDT", false, c));
        }
        for (h, &c) in b.iter().enumerate() {
            rows.push(PanelRow::new(hour(h as i64), "BBB-USDT", false, c));
        }
        FactorPanel::from_rows(rows)
    }
}
