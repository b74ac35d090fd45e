//! Skip adjustments smaller than a fraction of the position's own notional.

use super::{
    delta_amounts, filter_deltas, target_lots_by_ratio, LotSizes, RebalancePolicy, VenueBook,
};

#[derive(Debug, Clone)]
pub struct RebByPositionRatio {
    lot_sizes: LotSizes,
    /// Minimum order notional as a fraction of the current position notional.
    min_order_ratio: f64,
}

impl RebByPositionRatio {
    pub fn new(lot_sizes: LotSizes, min_order_ratio: f64) -> Self {
        Self {
            lot_sizes,
            min_order_ratio,
        }
    }
}

impl RebalancePolicy for RebByPositionRatio {
    fn name(&self) -> &str {
        "by_position_ratio"
    }

    fn lot_sizes(&self) -> &LotSizes {
        &self.lot_sizes
    }

    fn venue_targets(&self, equity: f64, book: &VenueBook<'_>, lot_sizes: &[f64]) -> Vec<i64> {
        let target = target_lots_by_ratio(equity, book.prices, book.ratios, lot_sizes);
        let amount = delta_amounts(&target, book.lots, book.prices, lot_sizes);
        let limit: Vec<f64> = (0..target.len())
            .map(|i| {
                (book.lots[i] as f64).abs() * lot_sizes[i] * book.prices[i] * self.min_order_ratio
            })
            .collect();
        filter_deltas(&target, book.lots, &amount, &limit)
    }
}
