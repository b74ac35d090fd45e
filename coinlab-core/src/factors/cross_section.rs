//! Factors ranked across all symbols of a time bucket.

use super::{per_series, window, Factor, FactorError, FactorKind};
use crate::config::{column_name, FactorParam};
use crate::data::FactorPanel;
use crate::selection::rank::{by_bucket, rank_min, to_pct};

fn dependency<'a>(
    panel: &'a FactorPanel,
    factor: &str,
    dep: &str,
    param: &FactorParam,
) -> Result<&'a [f64], FactorError> {
    let column = column_name(dep, param);
    panel.column(&column).ok_or(FactorError::MissingColumn {
        factor: factor.to_string(),
        column,
    })
}

fn all_rows(panel: &FactorPanel) -> Vec<usize> {
    (0..panel.len()).collect()
}

/// Per-bucket min-rank of `PctChange_n` (smallest change ranks 1).
#[derive(Debug, Clone, Copy)]
pub struct PctChangeRank;

impl Factor for PctChangeRank {
    fn name(&self) -> &str {
        "PctChangeRank"
    }

    fn kind(&self) -> FactorKind {
        FactorKind::CrossSectional
    }

    fn dependencies(&self, param: &FactorParam) -> Vec<(String, FactorParam)> {
        vec![("PctChange".to_string(), param.clone())]
    }

    fn compute(&self, panel: &FactorPanel, param: &FactorParam) -> Result<Vec<f64>, FactorError> {
        let source = dependency(panel, self.name(), "PctChange", param)?;
        let buckets = panel.buckets(&all_rows(panel));
        Ok(by_bucket(&buckets, source, |v| rank_min(v, true)))
    }
}

/// Per-bucket percentile rank of `Bias_n`, then its n-bar change per symbol.
#[derive(Debug, Clone, Copy)]
pub struct BiasRankDiff;

impl Factor for BiasRankDiff {
    fn name(&self) -> &str {
        "BiasRankDiff"
    }

    fn kind(&self) -> FactorKind {
        FactorKind::CrossSectional
    }

    fn dependencies(&self, param: &FactorParam) -> Vec<(String, FactorParam)> {
        vec![("Bias".to_string(), param.clone())]
    }

    fn compute(&self, panel: &FactorPanel, param: &FactorParam) -> Result<Vec<f64>, FactorError> {
        let n = window(self.name(), param)?;
        let source = dependency(panel, self.name(), "Bias", param)?;
        let buckets = panel.buckets(&all_rows(panel));
        let pct = by_bucket(&buckets, source, |v| to_pct(&rank_min(v, true)));
        Ok(per_series(panel, &pct, |s| {
            (0..s.len())
                .map(|i| if i < n { f64::NAN } else { s[i] - s[i - n] })
                .collect()
        }))
    }
}
