//! Per-series factors built from each symbol's own close history.

use super::{per_series, rolling_mean, window, Factor, FactorError, FactorKind};
use crate::config::FactorParam;
use crate::data::FactorPanel;

/// `close / close[n bars ago] - 1`.
#[derive(Debug, Clone, Copy)]
pub struct PctChange;

pub(crate) fn pct_change(values: &[f64], n: usize) -> Vec<f64> {
    (0..values.len())
        .map(|i| {
            if i < n {
                f64::NAN
            } else {
                values[i] / values[i - n] - 1.0
            }
        })
        .collect()
}

impl Factor for PctChange {
    fn name(&self) -> &str {
        "PctChange"
    }

    fn kind(&self) -> FactorKind {
        FactorKind::TimeSeries
    }

    fn compute(&self, panel: &FactorPanel, param: &FactorParam) -> Result<Vec<f64>, FactorError> {
        let n = window(self.name(), param)?;
        Ok(per_series(panel, panel.closes(), |c| pct_change(c, n)))
    }
}

/// `close / SMA(close, n) - 1`.
#[derive(Debug, Clone, Copy)]
pub struct Bias;

impl Factor for Bias {
    fn name(&self) -> &str {
        "Bias"
    }

    fn kind(&self) -> FactorKind {
        FactorKind::TimeSeries
    }

    fn compute(&self, panel: &FactorPanel, param: &FactorParam) -> Result<Vec<f64>, FactorError> {
        let n = window(self.name(), param)?;
        Ok(per_series(panel, panel.closes(), |c| {
            rolling_mean(c, n)
                .iter()
                .zip(c)
                .map(|(ma, close)| close / ma - 1.0)
                .collect()
        }))
    }
}

/// Rolling sample standard deviation of one-bar returns over `n` returns.
#[derive(Debug, Clone, Copy)]
pub struct Volatility;

fn rolling_std(values: &[f64], n: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if n < 2 {
        return out;
    }
    for i in (n - 1)..values.len() {
        let w = &values[i + 1 - n..=i];
        if w.iter().any(|v| v.is_nan()) {
            continue;
        }
        let mean = w.iter().sum::<f64>() / n as f64;
        let var = w.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
        out[i] = var.sqrt();
    }
    out
}

impl Factor for Volatility {
    fn name(&self) -> &str {
        "Volatility"
    }

    fn kind(&self) -> FactorKind {
        FactorKind::TimeSeries
    }

    fn compute(&self, panel: &FactorPanel, param: &FactorParam) -> Result<Vec<f64>, FactorError> {
        let n = window(self.name(), param)?;
        if n < 2 {
            return Err(FactorError::InvalidParam {
                factor: self.name().to_string(),
                param: param.to_string(),
            });
        }
        Ok(per_series(panel, panel.closes(), |c| {
            rolling_std(&pct_change(c, 1), n)
        }))
    }
}

/// Rolling mean of the panel's `quote_volume` column.
#[derive(Debug, Clone, Copy)]
pub struct QuoteVolumeMean;

impl Factor for QuoteVolumeMean {
    fn name(&self) -> &str {
        "QuoteVolumeMean"
    }

    fn kind(&self) -> FactorKind {
        FactorKind::TimeSeries
    }

    fn compute(&self, panel: &FactorPanel, param: &FactorParam) -> Result<Vec<f64>, FactorError> {
        let n = window(self.name(), param)?;
        let volume = panel
            .column("quote_volume")
            .ok_or_else(|| FactorError::MissingColumn {
                factor: self.name().to_string(),
                column: "quote_volume".to_string(),
            })?;
        Ok(per_series(panel, volume, |v| rolling_mean(v, n)))
    }
}
