//! The factor panel: one row per (time bucket, symbol, venue).
//!
//! Column-oriented so factor computation and ranking can work on plain
//! `&[f64]` slices. Row order is not significant; every consumer groups rows
//! explicitly by series (symbol + venue) or by time bucket.

use chrono::NaiveDateTime;
use std::collections::{BTreeMap, HashMap};

/// One input row, used to build a panel.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelRow {
    pub candle_begin_time: NaiveDateTime,
    pub symbol: String,
    pub is_spot: bool,
    pub close: f64,
    /// Spot listing of the same asset ("" when none).
    pub symbol_spot: String,
    /// Perpetual listing of the same asset ("" when none).
    pub symbol_swap: String,
    pub tradable: bool,
}

impl PanelRow {
    /// A row for a symbol listed on a single venue.
    pub fn new(candle_begin_time: NaiveDateTime, symbol: &str, is_spot: bool, close: f64) -> Self {
        let (symbol_spot, symbol_swap) = if is_spot {
            (symbol.to_string(), String::new())
        } else {
            (String::new(), symbol.to_string())
        };
        Self {
            candle_begin_time,
            symbol: symbol.to_string(),
            is_spot,
            close,
            symbol_spot,
            symbol_swap,
            tradable: true,
        }
    }

    /// Mark the row as listed on both venues.
    pub fn dual_listed(mut self) -> Self {
        self.symbol_spot = self.symbol.clone();
        self.symbol_swap = self.symbol.clone();
        self
    }
}

/// Column-oriented table of prices, listing metadata and factor values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FactorPanel {
    times: Vec<NaiveDateTime>,
    symbols: Vec<String>,
    is_spot: Vec<bool>,
    close: Vec<f64>,
    symbol_spot: Vec<String>,
    symbol_swap: Vec<String>,
    tradable: Vec<bool>,
    columns: BTreeMap<String, Vec<f64>>,
}

impl FactorPanel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows(rows: impl IntoIterator<Item = PanelRow>) -> Self {
        let mut panel = Self::new();
        for row in rows {
            panel.push(row);
        }
        panel
    }

    /// Append a row. Existing factor columns get NaN for the new row.
    pub fn push(&mut self, row: PanelRow) {
        self.times.push(row.candle_begin_time);
        self.symbols.push(row.symbol);
        self.is_spot.push(row.is_spot);
        self.close.push(row.close);
        self.symbol_spot.push(row.symbol_spot);
        self.symbol_swap.push(row.symbol_swap);
        self.tradable.push(row.tradable);
        for values in self.columns.values_mut() {
            values.push(f64::NAN);
        }
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn time(&self, row: usize) -> NaiveDateTime {
        self.times[row]
    }

    pub fn times(&self) -> &[NaiveDateTime] {
        &self.times
    }

    pub fn symbol(&self, row: usize) -> &str {
        &self.symbols[row]
    }

    pub fn is_spot(&self, row: usize) -> bool {
        self.is_spot[row]
    }

    pub fn close(&self, row: usize) -> f64 {
        self.close[row]
    }

    pub fn closes(&self) -> &[f64] {
        &self.close
    }

    pub fn symbol_spot(&self, row: usize) -> &str {
        &self.symbol_spot[row]
    }

    pub fn symbol_swap(&self, row: usize) -> &str {
        &self.symbol_swap[row]
    }

    pub fn tradable(&self, row: usize) -> bool {
        self.tradable[row]
    }

    pub fn set_tradable(&mut self, row: usize, tradable: bool) {
        self.tradable[row] = tradable;
    }

    /// Both a spot and a perpetual listing exist for this row's asset.
    pub fn listed_on_both(&self, row: usize) -> bool {
        !self.symbol_spot[row].is_empty() && !self.symbol_swap[row].is_empty()
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(|v| v.as_slice())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(|k| k.as_str())
    }

    /// Insert or replace a numeric column.
    pub fn set_column(&mut self, name: impl Into<String>, values: Vec<f64>) {
        assert_eq!(
            values.len(),
            self.len(),
            "column length must match panel height"
        );
        self.columns.insert(name.into(), values);
    }

    /// Builder form of [`set_column`](Self::set_column).
    pub fn with_column(mut self, name: impl Into<String>, values: Vec<f64>) -> Self {
        self.set_column(name, values);
        self
    }

    /// Keep only rows where `mask` is true.
    pub fn retain(&self, mask: &[bool]) -> FactorPanel {
        assert_eq!(mask.len(), self.len(), "mask length must match panel height");
        fn pick<T: Clone>(values: &[T], mask: &[bool]) -> Vec<T> {
            values
                .iter()
                .zip(mask)
                .filter(|(_, keep)| **keep)
                .map(|(v, _)| v.clone())
                .collect()
        }
        FactorPanel {
            times: pick(&self.times, mask),
            symbols: pick(&self.symbols, mask),
            is_spot: pick(&self.is_spot, mask),
            close: pick(&self.close, mask),
            symbol_spot: pick(&self.symbol_spot, mask),
            symbol_swap: pick(&self.symbol_swap, mask),
            tradable: pick(&self.tradable, mask),
            columns: self
                .columns
                .iter()
                .map(|(k, v)| (k.clone(), pick(v, mask)))
                .collect(),
        }
    }

    /// Row indices per series (symbol + venue), each sorted by time.
    pub fn series(&self) -> Vec<Vec<usize>> {
        let mut groups: BTreeMap<(&str, bool), Vec<usize>> = BTreeMap::new();
        for row in 0..self.len() {
            groups
                .entry((self.symbols[row].as_str(), self.is_spot[row]))
                .or_default()
                .push(row);
        }
        groups
            .into_values()
            .map(|mut rows| {
                rows.sort_by_key(|&r| self.times[r]);
                rows
            })
            .collect()
    }

    /// Group `rows` by time bucket, preserving the given row order within a bucket.
    pub fn buckets(&self, rows: &[usize]) -> BTreeMap<NaiveDateTime, Vec<usize>> {
        let mut groups: BTreeMap<NaiveDateTime, Vec<usize>> = BTreeMap::new();
        for &row in rows {
            groups.entry(self.times[row]).or_default().push(row);
        }
        groups
    }

    /// Lookup from (time, symbol, venue) to row index.
    pub fn row_index(&self) -> HashMap<(NaiveDateTime, &str, bool), usize> {
        (0..self.len())
            .map(|row| {
                (
                    (self.times[row], self.symbols[row].as_str(), self.is_spot[row]),
                    row,
                )
            })
            .collect()
    }

    /// First and last bucket in the panel.
    pub fn time_range(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let first = self.times.iter().min()?;
        let last = self.times.iter().max()?;
        Some((*first, *last))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::test_support::hour;

    fn sample() -> FactorPanel {
        FactorPanel::from_rows(vec![
            PanelRow::new(hour(1), "BTC-USDT", false, 101.0),
            PanelRow::new(hour(0), "BTC-USDT", false, 100.0),
            PanelRow::new(hour(0), "ETH-USDT", true, 10.0).dual_listed(),
        ])
    }

    #[test]
    fn series_are_sorted_by_time() {
        let panel = sample();
        let series = panel.series();
        assert_eq!(series.len(), 2);
        let btc = series
            .iter()
            .find(|rows| panel.symbol(rows[0]) == "BTC-USDT")
            .unwrap();
        assert_eq!(btc, &vec![1, 0]);
    }

    #[test]
    fn retain_filters_every_column() {
        let panel = sample().with_column("f", vec![1.0, 2.0, 3.0]);
        let kept = panel.retain(&[true, false, true]);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept.column("f").unwrap(), &[1.0, 3.0]);
        assert!(kept.listed_on_both(1));
    }

    #[test]
    fn push_pads_existing_columns_with_nan() {
        let mut panel = sample().with_column("f", vec![1.0, 2.0, 3.0]);
        panel.push(PanelRow::new(hour(2), "SOL-USDT", false, 5.0));
        assert!(panel.column("f").unwrap()[3].is_nan());
    }

    #[test]
    #[should_panic(expected = "column length")]
    fn set_column_rejects_wrong_length() {
        let mut panel = sample();
        panel.set_column("f", vec![1.0]);
    }
}
