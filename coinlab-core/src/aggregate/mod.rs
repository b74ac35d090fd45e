//! Offset/strategy aggregation into spot and swap ratio matrices.
//!
//! Per strategy, venue and direction the selection rows are summed per
//! (time, symbol), placed on an hourly grid and rolled forward over the hold
//! period. The rolled grids are then summed into one matrix per venue over
//! the backtest index `[start, end)`.

pub mod matrix;
pub mod rolling;

pub use matrix::RatioMatrix;
pub use rolling::{hourly_grid, place_on_grid, rolling_sum};

use chrono::{Duration, NaiveDateTime};
use std::collections::BTreeSet;
use tracing::info;

use crate::config::StrategyConfig;
use crate::domain::{Direction, SelectionRow, Venue};

/// Day-period signals take effect at the close of the trading day.
pub const DAY_SHIFT_HOURS: i64 = 23;

/// The two output matrices of an aggregation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VenueMatrices {
    pub spot: RatioMatrix,
    pub swap: RatioMatrix,
}

impl VenueMatrices {
    pub fn venue(&self, venue: Venue) -> &RatioMatrix {
        match venue {
            Venue::Spot => &self.spot,
            Venue::Swap => &self.swap,
        }
    }
}

/// Aggregate per-strategy selections into spot and swap matrices over `[start, end)`.
///
/// Strategies are reduced in name order, so the output does not depend on
/// the order of `selections`.
pub fn aggregate(
    selections: &[(&StrategyConfig, &[SelectionRow])],
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> VenueMatrices {
    let mut ordered: Vec<&(&StrategyConfig, &[SelectionRow])> = selections.iter().collect();
    ordered.sort_by(|a, b| a.0.name.cmp(&b.0.name));

    let index = hourly_grid(start, end);
    let mut parts: [Vec<RatioMatrix>; 2] = [Vec::new(), Vec::new()];
    for (strategy, rows) in ordered {
        let shift = if strategy.hold_period.is_day() {
            Duration::hours(DAY_SHIFT_HOURS)
        } else {
            Duration::zero()
        };
        let window = strategy.hold_period.window_hours();
        for (slot, venue) in [Venue::Spot, Venue::Swap].into_iter().enumerate() {
            for direction in [Direction::Long, Direction::Short] {
                let subset: Vec<&SelectionRow> = rows
                    .iter()
                    .filter(|r| r.venue() == venue && r.direction == direction)
                    .collect();
                let Some(first) = subset.iter().map(|r| r.candle_begin_time + shift).min() else {
                    continue;
                };
                let grid = hourly_grid(first.min(start), end);
                let placed = place_on_grid(&subset, grid, shift);
                parts[slot].push(rolling_sum(&placed, window));
            }
        }
    }

    let [spot_parts, swap_parts] = parts;
    let reduce = |parts: Vec<RatioMatrix>| {
        let symbols: BTreeSet<String> = parts
            .iter()
            .flat_map(|m| m.symbols().iter().cloned())
            .collect();
        let mut out = RatioMatrix::zeros(index.clone(), symbols.into_iter().collect());
        for part in &parts {
            out.add_matrix(part);
        }
        out
    };
    let matrices = VenueMatrices {
        spot: reduce(spot_parts),
        swap: reduce(swap_parts),
    };
    info!(
        strategies = selections.len(),
        hours = index.len(),
        spot_symbols = matrices.spot.n_symbols(),
        swap_symbols = matrices.swap.n_symbols(),
        "aggregation done"
    );
    matrices
}
