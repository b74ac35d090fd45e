//! Post-selection adjustments across strategies.

use chrono::NaiveDateTime;
use tracing::debug;

use crate::data::FactorPanel;
use crate::domain::{SelectionRow, Venue};

/// Drop every row earlier than the latest first-selection time across
/// strategies, so all strategies start trading together. Strategies with no
/// rows do not constrain the start. Returns the common start.
pub fn trim_to_common_start(selections: &mut [Vec<SelectionRow>]) -> Option<NaiveDateTime> {
    let start = selections
        .iter()
        .filter_map(|rows| rows.iter().map(|r| r.candle_begin_time).min())
        .max()?;
    for rows in selections.iter_mut() {
        rows.retain(|r| r.candle_begin_time >= start);
    }
    Some(start)
}

/// Move spot picks onto the paired perpetual when the strategy prefers the
/// swap venue.
///
/// The symbol, venue flag and close are taken from the swap row at the same
/// bucket. Rows without a swap row there stay on spot. Returns the number of
/// rows moved.
pub fn transfer_to_swap(rows: &mut [SelectionRow], panel: &FactorPanel) -> usize {
    let index = panel.row_index();
    let mut moved = 0;
    for row in rows.iter_mut() {
        if row.order_first != Venue::Swap || !row.is_spot || row.symbol_swap.is_empty() {
            continue;
        }
        let Some(&swap_row) = index.get(&(row.candle_begin_time, row.symbol_swap.as_str(), false))
        else {
            continue;
        };
        row.symbol = panel.symbol(swap_row).to_string();
        row.is_spot = false;
        row.close = panel.close(swap_row);
        moved += 1;
    }
    debug!(moved, "spot selections moved to swap");
    moved
}
