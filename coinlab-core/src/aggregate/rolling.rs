//! Hold-period rolling on the hourly grid.

use chrono::{Duration, NaiveDateTime};

use super::matrix::RatioMatrix;
use crate::domain::SelectionRow;

/// Every hour from `from` up to but excluding `to`.
pub fn hourly_grid(from: NaiveDateTime, to: NaiveDateTime) -> Vec<NaiveDateTime> {
    let mut grid = Vec::new();
    let mut t = from;
    while t < to {
        grid.push(t);
        t += Duration::hours(1);
    }
    grid
}

/// Group-sum `rows` by (time, symbol) onto `grid`. Rows off the grid are dropped.
pub fn place_on_grid(
    rows: &[&SelectionRow],
    grid: Vec<NaiveDateTime>,
    shift: Duration,
) -> RatioMatrix {
    let symbols: Vec<String> = rows.iter().map(|r| r.symbol.clone()).collect();
    let mut m = RatioMatrix::zeros(grid, symbols);
    for row in rows {
        let (Some(t), Some(s)) = (
            m.time_index(row.candle_begin_time + shift),
            m.symbol_index(&row.symbol),
        ) else {
            continue;
        };
        m.add(t, s, row.target_alloc_ratio);
    }
    m
}

/// Trailing sum over `window` hours per symbol, with partial windows at the start.
///
/// Kept as a running sum per symbol. The sum snaps to exactly 0 whenever the
/// window holds no nonzero cell, so a symbol that leaves the window carries
/// no rounding residue.
pub fn rolling_sum(m: &RatioMatrix, window: usize) -> RatioMatrix {
    if window <= 1 {
        return m.clone();
    }
    let mut out = RatioMatrix::zeros(m.times().to_vec(), m.symbols().to_vec());
    for s in 0..m.n_symbols() {
        let mut total = 0.0;
        let mut nonzero = 0usize;
        for t in 0..m.n_times() {
            let entering = m.get(t, s);
            if entering != 0.0 {
                total += entering;
                nonzero += 1;
            }
            if t >= window {
                let leaving = m.get(t - window, s);
                if leaving != 0.0 {
                    total -= leaving;
                    nonzero -= 1;
                }
            }
            if nonzero == 0 {
                total = 0.0;
            }
            out.set(t, s, total);
        }
    }
    out
}
