//! Lot rebalancing — converts target ratios into integer order lots.
//!
//! Three interchangeable policies share one trait. All of them start from
//! [`target_lots_by_ratio`]; the thresholded policies then suppress small
//! adjustments of existing positions.

pub mod always;
pub mod equity_ratio;
pub mod position_ratio;

pub use always::RebAlways;
pub use equity_ratio::RebByEquityRatio;
pub use position_ratio::RebByPositionRatio;

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Share of equity used when the book holds spot only.
pub const LONG_ONLY_EQUITY_RATIO: f64 = 0.97;

/// Below this total |swap ratio| the book counts as spot only.
const SPOT_ONLY_EPSILON: f64 = 1e-6;

/// Target notionals at or below this are not traded.
const MIN_TARGET_EQUITY: f64 = 0.01;

// ─── Inputs ──────────────────────────────────────────────────────────

/// Lot size (coins per lot) of every symbol, fixed for a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LotSizes {
    pub spot: Vec<f64>,
    pub swap: Vec<f64>,
}

/// One venue's state at a rebalance tick. Slices are aligned with that
/// venue's lot sizes.
#[derive(Debug, Clone, Copy)]
pub struct VenueBook<'a> {
    pub prices: &'a [f64],
    pub lots: &'a [i64],
    pub ratios: &'a [f64],
}

impl VenueBook<'_> {
    fn assert_len(&self, n: usize) {
        assert_eq!(self.prices.len(), n, "prices length must match lot sizes");
        assert_eq!(self.lots.len(), n, "current lots length must match lot sizes");
        assert_eq!(self.ratios.len(), n, "ratios length must match lot sizes");
    }
}

// ─── Primitives ──────────────────────────────────────────────────────

/// `trunc(equity * ratio / price / lot_size)` per symbol.
///
/// Symbols with a negligible target, a zero price or a zero lot size get 0.
/// Results that saturate the i64 range are zeroed with a warning.
pub fn target_lots_by_ratio(equity: f64, prices: &[f64], ratios: &[f64], lot_sizes: &[f64]) -> Vec<i64> {
    assert_eq!(prices.len(), lot_sizes.len(), "prices length must match lot sizes");
    assert_eq!(ratios.len(), lot_sizes.len(), "ratios length must match lot sizes");
    let mut out = vec![0i64; lot_sizes.len()];
    for i in 0..out.len() {
        let target_equity = equity * ratios[i];
        if !(target_equity.abs() > MIN_TARGET_EQUITY && prices[i] != 0.0 && lot_sizes[i] != 0.0) {
            continue;
        }
        // `as` saturates and maps NaN to 0
        let lots = (target_equity / prices[i] / lot_sizes[i]) as i64;
        if lots == i64::MAX || lots == i64::MIN {
            warn!(
                symbol_index = i,
                raw = target_equity / prices[i] / lot_sizes[i],
                "lot count overflows i64, set to 0"
            );
            continue;
        }
        out[i] = lots;
    }
    out
}

/// `|target - current| * lot_size * price` per symbol.
pub fn delta_amounts(target: &[i64], current: &[i64], prices: &[f64], lot_sizes: &[f64]) -> Vec<f64> {
    (0..target.len())
        .map(|i| {
            if target[i] == current[i] {
                0.0
            } else {
                (target[i] as f64 - current[i] as f64).abs() * lot_sizes[i] * prices[i]
            }
        })
        .collect()
}

/// Suppress adjustments smaller than `min_order_limit`.
///
/// Opening (`current == 0`, `target != 0`) and closing (`current != 0`,
/// `target == 0`) always go through. A suppressed symbol keeps its current
/// lots. Returns the new targets.
pub fn filter_deltas(target: &[i64], current: &[i64], delta_amount: &[f64], min_order_limit: &[f64]) -> Vec<i64> {
    (0..target.len())
        .map(|i| {
            let opens = current[i] == 0 && target[i] != 0;
            let closes = current[i] != 0 && target[i] == 0;
            if delta_amount[i] < min_order_limit[i] && !(opens || closes) {
                current[i]
            } else {
                target[i]
            }
        })
        .collect()
}

// ─── Policy trait ────────────────────────────────────────────────────

/// A rebalancing policy, chosen once per backtest.
pub trait RebalancePolicy: Send + Sync {
    fn name(&self) -> &str;

    fn lot_sizes(&self) -> &LotSizes;

    /// Target lots for one venue.
    fn venue_targets(&self, equity: f64, book: &VenueBook<'_>, lot_sizes: &[f64]) -> Vec<i64>;

    /// Target lots for both venues.
    ///
    /// When the swap book is empty the spot book uses
    /// [`LONG_ONLY_EQUITY_RATIO`] of equity and swap targets are all 0.
    fn calc_lots(&self, equity: f64, spot: VenueBook<'_>, swap: VenueBook<'_>) -> (Vec<i64>, Vec<i64>) {
        let sizes = self.lot_sizes();
        spot.assert_len(sizes.spot.len());
        swap.assert_len(sizes.swap.len());

        let swap_exposure: f64 = swap.ratios.iter().map(|r| r.abs()).sum();
        if swap_exposure < SPOT_ONLY_EPSILON {
            let spot_targets =
                self.venue_targets(equity * LONG_ONLY_EQUITY_RATIO, &spot, &sizes.spot);
            return (spot_targets, vec![0; sizes.swap.len()]);
        }
        (
            self.venue_targets(equity, &spot, &sizes.spot),
            self.venue_targets(equity, &swap, &sizes.swap),
        )
    }
}

// ─── Mode config + factory ───────────────────────────────────────────

/// `[rebalance_mode]` table.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case", deny_unknown_fields)]
pub enum RebalanceMode {
    #[default]
    Always,
    ByEquityRatio { min_order_ratio: f64 },
    ByPositionRatio { min_order_ratio: f64 },
}

impl RebalanceMode {
    pub fn validate(&self) -> Result<(), String> {
        match self {
            RebalanceMode::Always => Ok(()),
            RebalanceMode::ByEquityRatio { min_order_ratio }
            | RebalanceMode::ByPositionRatio { min_order_ratio } => {
                if min_order_ratio.is_finite() && *min_order_ratio >= 0.0 {
                    Ok(())
                } else {
                    Err(format!("min_order_ratio {min_order_ratio} must be >= 0"))
                }
            }
        }
    }
}

impl fmt::Display for RebalanceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RebalanceMode::Always => f.write_str("always"),
            RebalanceMode::ByEquityRatio { min_order_ratio } => {
                write!(f, "by_equity_ratio({min_order_ratio})")
            }
            RebalanceMode::ByPositionRatio { min_order_ratio } => {
                write!(f, "by_position_ratio({min_order_ratio})")
            }
        }
    }
}

/// Build the policy for `mode`.
pub fn create_policy(mode: RebalanceMode, lot_sizes: LotSizes) -> Box<dyn RebalancePolicy> {
    match mode {
        RebalanceMode::Always => Box::new(RebAlways::new(lot_sizes)),
        RebalanceMode::ByEquityRatio { min_order_ratio } => {
            Box::new(RebByEquityRatio::new(lot_sizes, min_order_ratio))
        }
        RebalanceMode::ByPositionRatio { min_order_ratio } => {
            Box::new(RebByPositionRatio::new(lot_sizes, min_order_ratio))
        }
    }
}
