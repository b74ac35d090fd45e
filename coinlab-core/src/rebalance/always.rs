//! Rebalance on every ratio change, however small.

use super::{target_lots_by_ratio, LotSizes, RebalancePolicy, VenueBook};

#[derive(Debug, Clone)]
pub struct RebAlways {
    lot_sizes: LotSizes,
}

impl RebAlways {
    pub fn new(lot_sizes: LotSizes) -> Self {
        Self { lot_sizes }
    }
}

impl RebalancePolicy for RebAlways {
    fn name(&self) -> &str {
        "always"
    }

    fn lot_sizes(&self) -> &LotSizes {
        &self.lot_sizes
    }

    fn venue_targets(&self, equity: f64, book: &VenueBook<'_>, lot_sizes: &[f64]) -> Vec<i64> {
        target_lots_by_ratio(equity, book.prices, book.ratios, lot_sizes)
    }
}
