//! Per-symbol position limits with excess redistribution.
//!
//! Cells beyond the limit are clipped and the clipped excess of each time
//! bucket is spread over a fallback ("fill") strategy's symbols in
//! proportion to that strategy's own allocation in the same bucket.

use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::aggregate::{RatioMatrix, VenueMatrices};
use crate::domain::Direction;

/// Fill weights at or below this magnitude are ignored.
const FILL_EPSILON: f64 = 1e-8;

/// Limit for one side of the book.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SideLimit {
    /// Largest allowed |ratio| per symbol, before dividing by leverage.
    pub rate_limit: f64,
    /// Strategy whose allocation absorbs the excess.
    pub fill_strategy: String,
}

/// Optional long and short limits. Absent sides are not limited.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PositionLimits {
    #[serde(default)]
    pub long: Option<SideLimit>,
    #[serde(default)]
    pub short: Option<SideLimit>,
}

impl PositionLimits {
    pub fn is_empty(&self) -> bool {
        self.long.is_none() && self.short.is_none()
    }

    /// Configured sides with their labels.
    pub fn sides(&self) -> impl Iterator<Item = (&'static str, &SideLimit)> {
        [("long", self.long.as_ref()), ("short", self.short.as_ref())]
            .into_iter()
            .filter_map(|(label, limit)| limit.map(|l| (label, l)))
    }

    /// Names of the strategies referenced as fill strategies.
    pub fn fill_strategies(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.sides().map(|(_, l)| l.fill_strategy.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

/// Fill weights for one bucket: symbol column in `fill` → share of 1.
fn fill_weights(fill: &RatioMatrix, t: usize, direction: Direction) -> Vec<(usize, f64)> {
    let row = fill.row(t);
    let picked: Vec<(usize, f64)> = row
        .iter()
        .enumerate()
        .filter(|(_, v)| match direction {
            Direction::Long => **v > FILL_EPSILON,
            Direction::Short => **v < -FILL_EPSILON,
        })
        .map(|(s, v)| (s, v.abs()))
        .collect();
    let total: f64 = picked.iter().map(|(_, w)| w).sum();
    picked.into_iter().map(|(s, w)| (s, w / total)).collect()
}

/// Clip `ratio` to `±rate_limit` on `direction`'s side and move the excess
/// onto the symbols of `fill`.
///
/// The output holds the union of both matrices' symbols. Buckets with no
/// usable fill row are still clipped; their excess is dropped with a warning.
pub fn redistribute(
    ratio: &RatioMatrix,
    fill: &RatioMatrix,
    rate_limit: f64,
    direction: Direction,
) -> RatioMatrix {
    let mut symbols: Vec<String> = ratio.symbols().to_vec();
    symbols.extend(fill.symbols().iter().cloned());
    let mut out = ratio.reindex(ratio.times().to_vec(), symbols);
    let fill_cols: Vec<usize> = fill
        .symbols()
        .iter()
        .filter_map(|s| out.symbol_index(s))
        .collect();

    let mut unallocated = 0usize;
    for t in 0..out.n_times() {
        let mut excess = 0.0;
        for v in out.row_mut(t) {
            match direction {
                Direction::Long if *v > rate_limit => {
                    excess += *v - rate_limit;
                    *v = rate_limit;
                }
                Direction::Short if *v < -rate_limit => {
                    excess += *v + rate_limit;
                    *v = -rate_limit;
                }
                _ => {}
            }
        }
        if excess == 0.0 {
            continue;
        }
        let time = out.times()[t];
        let weights = fill
            .time_index(time)
            .map(|ft| fill_weights(fill, ft, direction))
            .unwrap_or_default();
        if weights.is_empty() {
            unallocated += 1;
            continue;
        }
        for (fs, w) in weights {
            let col = fill_cols[fs];
            out.add(t, col, w * excess);
            if direction == Direction::Short && out.get(t, col) > 0.0 {
                warn!(
                    time = %time,
                    symbol = %out.symbols()[col],
                    value = out.get(t, col),
                    "short cell turned positive after redistribution"
                );
            }
        }
    }
    if unallocated > 0 {
        warn!(
            ?direction,
            buckets = unallocated,
            "fill matrix has no usable allocation, excess clipped without redistribution"
        );
    }
    out
}

/// Apply configured limits to both venue matrices.
///
/// `fills` maps a fill strategy name to that strategy's own aggregated
/// matrices. Long limits apply to spot and swap; short limits to swap only.
pub fn apply_position_limits(
    matrices: VenueMatrices,
    limits: &PositionLimits,
    leverage: f64,
    fills: &BTreeMap<String, VenueMatrices>,
) -> VenueMatrices {
    fn lookup<'a>(
        fills: &'a BTreeMap<String, VenueMatrices>,
        empty: &'a VenueMatrices,
        name: &str,
    ) -> &'a VenueMatrices {
        fills.get(name).unwrap_or_else(|| {
            warn!(fill_strategy = %name, "fill strategy has no matrices, clipping only");
            empty
        })
    }

    let VenueMatrices { mut spot, mut swap } = matrices;
    let empty = VenueMatrices::default();

    if let Some(limit) = &limits.long {
        let rate = limit.rate_limit / leverage;
        let fill = lookup(fills, &empty, &limit.fill_strategy);
        spot = redistribute(&spot, &fill.spot, rate, Direction::Long);
        swap = redistribute(&swap, &fill.swap, rate, Direction::Long);
        info!(rate_limit = rate, fill_strategy = %limit.fill_strategy, "long limits applied");
    }
    if let Some(limit) = &limits.short {
        let rate = limit.rate_limit / leverage;
        let fill = lookup(fills, &empty, &limit.fill_strategy);
        swap = redistribute(&swap, &fill.swap, rate, Direction::Short);
        info!(rate_limit = rate, fill_strategy = %limit.fill_strategy, "short limits applied");
    }
    VenueMatrices { spot, swap }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::test_support::hour;

    fn matrix(symbols: &[&str], rows: &[&[f64]]) -> RatioMatrix {
        let times = (0..rows.len() as i64).map(hour).collect();
        let mut m = RatioMatrix::zeros(times, symbols.iter().map(|s| s.to_string()).collect());
        for (t, row) in rows.iter().enumerate() {
            for (s, v) in row.iter().enumerate() {
                m.set(t, s, *v);
            }
        }
        m
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn excess_follows_fill_proportions() {
        let ratio = matrix(&["X"], &[&[0.25]]);
        let fill = matrix(&["A", "B"], &[&[0.6, 0.4]]);
        let out = redistribute(&ratio, &fill, 0.1, Direction::Long);
        assert!(approx(out.value(hour(0), "X"), 0.10));
        assert!(approx(out.value(hour(0), "A"), 0.09));
        assert!(approx(out.value(hour(0), "B"), 0.06));
    }

    #[test]
    fn fill_row_is_normalised() {
        let ratio = matrix(&["X"], &[&[0.3]]);
        let fill = matrix(&["A", "B"], &[&[0.05, 0.15]]);
        let out = redistribute(&ratio, &fill, 0.1, Direction::Long);
        assert!(approx(out.value(hour(0), "A"), 0.05));
        assert!(approx(out.value(hour(0), "B"), 0.15));
    }

    #[test]
    fn short_side_is_symmetric() {
        let ratio = matrix(&["X", "Y"], &[&[-0.3, 0.5]]);
        let fill = matrix(&["A", "B"], &[&[-0.2, 0.9]]);
        let out = redistribute(&ratio, &fill, 0.1, Direction::Short);
        assert!(approx(out.value(hour(0), "X"), -0.1));
        // long cells untouched, positive fill weights ignored
        assert!(approx(out.value(hour(0), "Y"), 0.5));
        assert!(approx(out.value(hour(0), "A"), -0.2));
        assert!(approx(out.value(hour(0), "B"), 0.0));
    }

    #[test]
    fn missing_fill_still_clips() {
        let ratio = matrix(&["X"], &[&[0.4], &[0.05]]);
        let out = redistribute(&ratio, &RatioMatrix::default(), 0.1, Direction::Long);
        assert!(approx(out.value(hour(0), "X"), 0.1));
        assert!(approx(out.value(hour(1), "X"), 0.05));
        assert!(approx(out.abs_sum(), 0.15));
    }

    #[test]
    fn non_overlapping_fill_times() {
        let ratio = matrix(&["X"], &[&[0.4]]);
        let mut fill = RatioMatrix::zeros(vec![hour(9)], vec!["A".into()]);
        fill.set(0, 0, 1.0);
        let out = redistribute(&ratio, &fill, 0.1, Direction::Long);
        assert!(approx(out.value(hour(0), "X"), 0.1));
        assert_eq!(out.value(hour(0), "A"), 0.0);
    }

    #[test]
    fn apply_limits_divides_by_leverage() {
        let spot = matrix(&["X"], &[&[0.3]]);
        let swap = matrix(&["Y"], &[&[-0.3]]);
        let fill = VenueMatrices {
            spot: matrix(&["A"], &[&[1.0]]),
            swap: matrix(&["B"], &[&[-1.0]]),
        };
        let mut fills = BTreeMap::new();
        fills.insert("f".to_string(), fill);
        let limits = PositionLimits {
            long: Some(SideLimit {
                rate_limit: 0.2,
                fill_strategy: "f".into(),
            }),
            short: Some(SideLimit {
                rate_limit: 0.2,
                fill_strategy: "f".into(),
            }),
        };
        let out = apply_position_limits(VenueMatrices { spot, swap }, &limits, 2.0, &fills);
        assert!(approx(out.spot.value(hour(0), "X"), 0.1));
        assert!(approx(out.spot.value(hour(0), "A"), 0.2));
        assert!(approx(out.swap.value(hour(0), "Y"), -0.1));
        assert!(approx(out.swap.value(hour(0), "B"), -0.2));
    }

    #[test]
    fn no_limits_pass_through() {
        let m = VenueMatrices {
            spot: matrix(&["X"], &[&[0.9]]),
            swap: RatioMatrix::default(),
        };
        let out = apply_position_limits(m.clone(), &PositionLimits::default(), 1.0, &BTreeMap::new());
        assert_eq!(out, m);
    }
}
