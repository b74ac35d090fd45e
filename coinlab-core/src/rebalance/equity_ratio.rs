//! Skip adjustments smaller than a fraction of total equity.

use super::{
    delta_amounts, filter_deltas, target_lots_by_ratio, LotSizes, RebalancePolicy, VenueBook,
};

#[derive(Debug, Clone)]
pub struct RebByEquityRatio {
    lot_sizes: LotSizes,
    /// Minimum order notional as a fraction of equity.
    min_order_ratio: f64,
}

impl RebByEquityRatio {
    pub fn new(lot_sizes: LotSizes, min_order_ratio: f64) -> Self {
        Self {
            lot_sizes,
            min_order_ratio,
        }
    }
}

impl RebalancePolicy for RebByEquityRatio {
    fn name(&self) -> &str {
        "by_equity_ratio"
    }

    fn lot_sizes(&self) -> &LotSizes {
        &self.lot_sizes
    }

    fn venue_targets(&self, equity: f64, book: &VenueBook<'_>, lot_sizes: &[f64]) -> Vec<i64> {
        let target = target_lots_by_ratio(equity, book.prices, book.ratios, lot_sizes);
        let amount = delta_amounts(&target, book.lots, book.prices, lot_sizes);
        let limit = vec![equity * self.min_order_ratio; target.len()];
        filter_deltas(&target, book.lots, &amount, &limit)
    }
}
