//! Cross-sectional ranking with explicit tie methods.
//!
//! Ranks are 1-based. NaN inputs stay NaN and are not counted.

use chrono::NaiveDateTime;
use std::collections::BTreeMap;

/// Apply `f` to each bucket's slice of `values` (indexed by panel row) and
/// scatter the results back. Rows outside every bucket are NaN.
pub fn by_bucket(
    buckets: &BTreeMap<NaiveDateTime, Vec<usize>>,
    values: &[f64],
    f: impl Fn(&[f64]) -> Vec<f64>,
) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    for rows in buckets.values() {
        let slice: Vec<f64> = rows.iter().map(|&r| values[r]).collect();
        for (&r, v) in rows.iter().zip(f(&slice)) {
            out[r] = v;
        }
    }
    out
}

/// Indices of the non-NaN values, ordered best-first. The sort is stable, so
/// equal values keep their input order.
fn ordered(values: &[f64], ascending: bool) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..values.len()).filter(|&i| !values[i].is_nan()).collect();
    idx.sort_by(|&a, &b| {
        let ord = values[a].total_cmp(&values[b]);
        if ascending {
            ord
        } else {
            ord.reverse()
        }
    });
    idx
}

/// Walk runs of equal values and assign `f(first_position, last_position)` to each.
fn assign_ties(values: &[f64], ascending: bool, f: impl Fn(usize, usize) -> f64) -> Vec<f64> {
    let order = ordered(values, ascending);
    let mut out = vec![f64::NAN; values.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start;
        while end + 1 < order.len() && values[order[end + 1]] == values[order[start]] {
            end += 1;
        }
        let rank = f(start + 1, end + 1);
        for &i in &order[start..=end] {
            out[i] = rank;
        }
        start = end + 1;
    }
    out
}

/// Equal values all receive the lowest contested rank.
pub fn rank_min(values: &[f64], ascending: bool) -> Vec<f64> {
    assign_ties(values, ascending, |first, _| first as f64)
}

/// Equal values receive the mean of their contested ranks.
pub fn rank_average(values: &[f64], ascending: bool) -> Vec<f64> {
    assign_ties(values, ascending, |first, last| (first + last) as f64 / 2.0)
}

/// Divide ranks by the number of ranked (non-NaN) entries.
pub fn to_pct(ranks: &[f64]) -> Vec<f64> {
    let n = ranks.iter().filter(|r| !r.is_nan()).count();
    ranks.iter().map(|r| r / n as f64).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_ties_share_lowest_rank() {
        let r = rank_min(&[3.0, 1.0, 3.0, 2.0], true);
        assert_eq!(r, vec![3.0, 1.0, 3.0, 2.0]);
        let r = rank_min(&[5.0, 5.0, 1.0], true);
        assert_eq!(r, vec![2.0, 2.0, 1.0]);
    }

    #[test]
    fn descending_reverses_order() {
        let r = rank_min(&[1.0, 2.0, 3.0], false);
        assert_eq!(r, vec![3.0, 2.0, 1.0]);
    }

    #[test]
    fn average_ties() {
        let r = rank_average(&[5.0, 5.0, 1.0, 7.0], true);
        assert_eq!(r, vec![2.5, 2.5, 1.0, 4.0]);
    }

    #[test]
    fn nan_is_skipped_and_not_counted() {
        let r = rank_min(&[f64::NAN, 2.0, 1.0], true);
        assert!(r[0].is_nan());
        assert_eq!(&r[1..], &[2.0, 1.0]);
        let p = to_pct(&r);
        assert!(p[0].is_nan());
        assert_eq!(&p[1..], &[1.0, 0.5]);
    }

    #[test]
    fn by_bucket_ranks_within_each_group() {
        use crate::data::test_support::hour;
        let mut buckets = BTreeMap::new();
        buckets.insert(hour(0), vec![0, 2]);
        buckets.insert(hour(1), vec![1, 3]);
        let r = by_bucket(&buckets, &[1.0, 9.0, 2.0, 8.0], |v| rank_min(v, true));
        assert_eq!(r, vec![1.0, 2.0, 2.0, 1.0]);
    }

    #[test]
    fn empty_input() {
        assert!(rank_min(&[], true).is_empty());
    }
}
