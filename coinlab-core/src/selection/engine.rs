//! Per-strategy selection over a prepared factor panel.
//!
//! Each time bucket is processed independently: restrict the universe, score
//! each side with a weighted sum of per-factor ranks, pre-filter, take the
//! configured count by score rank, post-filter, then turn the survivors into
//! signed capital fractions.

use chrono::NaiveDateTime;
use std::collections::HashMap;
use tracing::{debug, warn};

use super::count::{rank_window, CountClamp};
use super::filter::filter_mask;
use super::offset::offset_of;
use super::rank::rank_min;
use crate::config::{FactorConfig, SelectNum, SideConfig, StrategyConfig};
use crate::data::{is_day_start, FactorPanel};
use crate::domain::{Direction, SelectionRow};

/// Ratios at or below this magnitude are dropped after side scaling.
const MIN_RATIO: f64 = 1e-9;

/// One surviving pick inside a bucket.
#[derive(Debug, Clone, Copy)]
struct Pick {
    row: usize,
    direction: Direction,
    ratio: f64,
}

/// Run selection for one strategy.
///
/// An empty result is valid. A strategy whose factor columns are missing from
/// the panel selects nothing and logs a warning. Day-length hold periods
/// select on midnight buckets only (see [`resample_daily`](crate::data::resample_daily)).
pub fn select(
    strategy: &StrategyConfig,
    panel: &FactorPanel,
    unified_time: NaiveDateTime,
) -> Vec<SelectionRow> {
    let mut columns = Vec::new();
    for name in strategy.factor_columns() {
        match panel.column(&name) {
            Some(values) => columns.push(values),
            None => {
                warn!(strategy = %strategy.name, column = %name, "factor column missing, nothing selected");
                return Vec::new();
            }
        }
    }

    let daily = strategy.hold_period.is_day();
    let mut offsets: HashMap<NaiveDateTime, u32> = HashMap::new();
    let eligible: Vec<usize> = (0..panel.len())
        .filter(|&r| {
            (!daily || is_day_start(panel.time(r)))
                && panel.tradable(r)
                && strategy.market.admits(panel.is_spot(r), panel.listed_on_both(r))
                && columns.iter().all(|c| !c[r].is_nan())
        })
        .filter(|&r| {
            let offset = *offsets
                .entry(panel.time(r))
                .or_insert_with(|| offset_of(panel.time(r), unified_time, &strategy.hold_period));
            strategy.offset_list.contains(&offset)
        })
        .collect();

    let offset_scale = strategy.cap_weight / strategy.offset_list.len() as f64;
    let mut out = Vec::new();
    for (time, rows) in panel.buckets(&eligible) {
        let offset = offsets[&time];
        for pick in select_bucket(strategy, panel, &rows) {
            out.push(SelectionRow {
                candle_begin_time: time,
                symbol: panel.symbol(pick.row).to_string(),
                is_spot: panel.is_spot(pick.row),
                symbol_swap: panel.symbol_swap(pick.row).to_string(),
                close: panel.close(pick.row),
                direction: pick.direction,
                offset,
                target_alloc_ratio: pick.ratio * offset_scale * pick.direction.sign(),
                strategy: strategy.name.clone(),
                cap_weight: strategy.cap_weight,
                order_first: strategy.market.order_first,
            });
        }
    }
    debug!(strategy = %strategy.name, eligible = eligible.len(), selected = out.len(), "selection done");
    out
}

// ─── One bucket ──────────────────────────────────────────────────────

fn select_bucket(strategy: &StrategyConfig, panel: &FactorPanel, rows: &[usize]) -> Vec<Pick> {
    let mut picks = Vec::new();
    let mut long_count = 0usize;
    if strategy.long.is_active() {
        let longs = pick_side(panel, rows, &strategy.long, Direction::Long, 0);
        long_count = longs.len();
        picks.extend(longs);
    }
    if strategy.short.is_active() {
        picks.extend(pick_side(panel, rows, &strategy.short, Direction::Short, long_count));
    }
    if picks.is_empty() {
        return picks;
    }

    let selected: Vec<usize> = picks.iter().map(|p| p.row).collect();
    let long_post = filter_mask(panel, &selected, &strategy.long.filter_list_post);
    let short_post = filter_mask(panel, &selected, &strategy.short.filter_list_post);
    let mut kept: Vec<Pick> = picks
        .into_iter()
        .enumerate()
        .filter(|(i, p)| match p.direction {
            Direction::Long => long_post[*i],
            Direction::Short => short_post[*i],
        })
        .map(|(_, p)| p)
        .filter_map(|mut p| {
            p.ratio *= strategy.side(p.direction).cap_weight;
            (p.ratio.abs() > MIN_RATIO).then_some(p)
        })
        .collect();
    kept.sort_by(|a, b| {
        a.direction
            .cmp(&b.direction)
            .then_with(|| panel.symbol(a.row).cmp(panel.symbol(b.row)))
            .then_with(|| panel.is_spot(a.row).cmp(&panel.is_spot(b.row)))
    });
    kept
}

/// Weighted sum of per-factor min-ranks over `rows`. Zero weights are skipped.
fn composite_score(panel: &FactorPanel, rows: &[usize], factors: &[FactorConfig]) -> Vec<f64> {
    let mut score = vec![0.0; rows.len()];
    for factor in factors.iter().filter(|f| f.weight != 0.0) {
        let Some(column) = panel.column(&factor.col_name()) else {
            continue;
        };
        let values: Vec<f64> = rows.iter().map(|&r| column[r]).collect();
        for (s, rank) in score.iter_mut().zip(rank_min(&values, factor.ascending)) {
            *s += rank * factor.weight;
        }
    }
    score
}

/// Pre-filter, rank and count-select one side of a bucket. Each pick gets
/// `1 / picked` of the side.
fn pick_side(
    panel: &FactorPanel,
    rows: &[usize],
    side: &SideConfig,
    direction: Direction,
    long_count: usize,
) -> Vec<Pick> {
    let score = composite_score(panel, rows, &side.factor_list);
    let mask = filter_mask(panel, rows, &side.filter_list);
    let mut candidates = Vec::new();
    let mut scores = Vec::new();
    for (i, &r) in rows.iter().enumerate() {
        // shorts need a perpetual to trade
        if mask[i] && (direction == Direction::Long || !panel.symbol_swap(r).is_empty()) {
            candidates.push(r);
            scores.push(score[i]);
        }
    }
    if candidates.is_empty() {
        return Vec::new();
    }

    let ranks = rank_min(&scores, direction == Direction::Long);
    let clamp = side.num_limit.map(|limit| match direction {
        Direction::Long => CountClamp::Max(limit),
        Direction::Short => CountClamp::Min(limit),
    });
    let keep = match side.select_num {
        SelectNum::Count(n) => rank_window(&ranks, None, Some(n), side.inclusive, clamp),
        SelectNum::Range(l, r) => rank_window(&ranks, Some(l), Some(r), side.inclusive, clamp),
        SelectNum::MatchLong => ranks.iter().map(|&r| r <= long_count as f64).collect(),
    };

    let picked: Vec<usize> = candidates
        .into_iter()
        .zip(keep)
        .filter_map(|(r, k)| k.then_some(r))
        .collect();
    let ratio = 1.0 / picked.len() as f64;
    picked
        .into_iter()
        .map(|row| Pick {
            row,
            direction,
            ratio,
        })
        .collect()
}
