//! Keep-masks from filter entries, evaluated per time bucket.

use tracing::warn;

use super::rank::{rank_average, to_pct};
use crate::config::{FilterFactorConfig, FilterHow};
use crate::data::FactorPanel;

/// Positions of `rows` grouped by time bucket (bucket order, then input order).
pub(crate) fn local_buckets(panel: &FactorPanel, rows: &[usize]) -> Vec<Vec<usize>> {
    let mut groups: std::collections::BTreeMap<_, Vec<usize>> = std::collections::BTreeMap::new();
    for (pos, &row) in rows.iter().enumerate() {
        groups.entry(panel.time(row)).or_default().push(pos);
    }
    groups.into_values().collect()
}

/// Per-bucket transform of values aligned with `rows`.
pub(crate) fn per_bucket(
    buckets: &[Vec<usize>],
    values: &[f64],
    f: impl Fn(&[f64]) -> Vec<f64>,
) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    for bucket in buckets {
        let slice: Vec<f64> = bucket.iter().map(|&p| values[p]).collect();
        for (&p, v) in bucket.iter().zip(f(&slice)) {
            out[p] = v;
        }
    }
    out
}

/// AND of every filter's mask over `rows`. Empty filter list keeps everything.
///
/// `rank` and `pct` use the average tie method; `val` compares raw values.
/// A filter whose column is missing rejects every row.
pub fn filter_mask(panel: &FactorPanel, rows: &[usize], filters: &[FilterFactorConfig]) -> Vec<bool> {
    let mut mask = vec![true; rows.len()];
    if filters.is_empty() || rows.is_empty() {
        return mask;
    }
    let buckets = local_buckets(panel, rows);
    for filter in filters {
        let col = filter.col_name();
        let Some(column) = panel.column(&col) else {
            warn!(column = %col, "filter column missing, no symbol passes");
            return vec![false; rows.len()];
        };
        let values: Vec<f64> = rows.iter().map(|&r| column[r]).collect();
        let scored = match filter.method.how {
            FilterHow::Val => values,
            FilterHow::Rank => per_bucket(&buckets, &values, |v| rank_average(v, filter.ascending)),
            FilterHow::Pct => per_bucket(&buckets, &values, |v| {
                to_pct(&rank_average(v, filter.ascending))
            }),
        };
        for (keep, v) in mask.iter_mut().zip(&scored) {
            *keep = *keep && filter.method.range.test(*v);
        }
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FactorParam;
    use crate::data::test_support::hour;
    use crate::data::PanelRow;

    fn panel() -> FactorPanel {
        FactorPanel::from_rows(vec![
            PanelRow::new(hour(0), "A", false, 1.0),
            PanelRow::new(hour(0), "B", false, 1.0),
            PanelRow::new(hour(0), "C", false, 1.0),
            PanelRow::new(hour(1), "A", false, 1.0),
            PanelRow::new(hour(1), "B", false, 1.0),
        ])
        .with_column("Vol_1", vec![3.0, 1.0, 2.0, 5.0, 5.0])
    }

    fn filter(method: &str, ascending: bool) -> FilterFactorConfig {
        FilterFactorConfig::new("Vol", FactorParam::Int(1), method, ascending).unwrap()
    }

    #[test]
    fn rank_filter_per_bucket() {
        let p = panel();
        let rows: Vec<usize> = (0..5).collect();
        let m = filter_mask(&p, &rows, &[filter("rank:<=2", true)]);
        // bucket 0 ranks: A=3, B=1, C=2; bucket 1 ties average to 1.5
        assert_eq!(m, vec![false, true, true, true, true]);
        let m = filter_mask(&p, &rows, &[filter("rank:<=1", false)]);
        assert_eq!(m, vec![true, false, false, false, false]);
    }

    #[test]
    fn pct_and_val_filters_combine() {
        let p = panel();
        let rows: Vec<usize> = (0..5).collect();
        let m = filter_mask(&p, &rows, &[filter("pct:>0.5", true), filter("val:<5", true)]);
        assert_eq!(m, vec![true, false, true, false, false]);
    }

    #[test]
    fn missing_column_rejects_all() {
        let p = panel();
        let f = FilterFactorConfig::new("Nope", FactorParam::Int(1), "val:>0", true).unwrap();
        assert_eq!(filter_mask(&p, &[0, 1], &[f]), vec![false, false]);
    }

    #[test]
    fn subset_rows_rank_among_themselves() {
        let p = panel();
        let m = filter_mask(&p, &[0, 2], &[filter("rank:<=1", true)]);
        assert_eq!(m, vec![false, true]);
    }
}
