//! Hourly → daily bars for day-length hold periods.
//!
//! Each (symbol, venue) series is grouped by calendar day; the daily bar sits
//! on the midnight bucket. Prices, listing fields and the tradable flag take
//! the day's last value. Flow columns (volumes, trade counts, funding) are
//! summed; every other numeric column takes the day's last non-NaN value.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::BTreeMap;
use tracing::debug;

use super::panel::{FactorPanel, PanelRow};

/// Columns that accumulate over the day instead of taking the last value.
pub const SUMMED_COLUMNS: [&str; 6] = [
    "volume",
    "quote_volume",
    "trade_num",
    "taker_buy_base_asset_volume",
    "taker_buy_quote_asset_volume",
    "funding_fee",
];

/// Midnight bucket of the day containing `time`.
pub fn day_start(time: NaiveDateTime) -> NaiveDateTime {
    time.date().and_time(NaiveTime::MIN)
}

/// Is `time` the midnight bucket of its day?
pub fn is_day_start(time: NaiveDateTime) -> bool {
    time.time() == NaiveTime::MIN
}

/// Resample an hourly panel to one row per (day, symbol, venue).
pub fn resample_daily(panel: &FactorPanel) -> FactorPanel {
    let names: Vec<String> = panel.column_names().map(str::to_string).collect();
    let columns: Vec<&[f64]> = names
        .iter()
        .filter_map(|name| panel.column(name))
        .collect();
    let summed: Vec<bool> = names
        .iter()
        .map(|name| SUMMED_COLUMNS.contains(&name.as_str()))
        .collect();

    let mut rows = Vec::new();
    let mut values: Vec<Vec<f64>> = vec![Vec::new(); names.len()];
    for series in panel.series() {
        let mut days: BTreeMap<NaiveDate, Vec<usize>> = BTreeMap::new();
        for row in series {
            days.entry(panel.time(row).date()).or_default().push(row);
        }
        for day_rows in days.into_values() {
            // series rows are time-sorted, so the last row closes the day
            let Some(&last) = day_rows.last() else {
                continue;
            };
            rows.push(PanelRow {
                candle_begin_time: day_start(panel.time(last)),
                symbol: panel.symbol(last).to_string(),
                is_spot: panel.is_spot(last),
                close: panel.close(last),
                symbol_spot: panel.symbol_spot(last).to_string(),
                symbol_swap: panel.symbol_swap(last).to_string(),
                tradable: panel.tradable(last),
            });
            for (c, column) in columns.iter().enumerate() {
                let day_values = day_rows.iter().map(|&r| column[r]).filter(|v| !v.is_nan());
                let value = if summed[c] {
                    day_values.sum::<f64>()
                } else {
                    day_values.last().unwrap_or(f64::NAN)
                };
                values[c].push(value);
            }
        }
    }

    let mut daily = FactorPanel::from_rows(rows);
    for (name, column) in names.into_iter().zip(values) {
        daily.set_column(name, column);
    }
    debug!(hourly = panel.len(), daily = daily.len(), "panel resampled to daily bars");
    daily
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::test_support::hour;

    fn two_days() -> FactorPanel {
        let mut rows = Vec::new();
        for h in 0..48 {
            rows.push(PanelRow::new(hour(h), "BTC-USDT", false, 100.0 + h as f64));
        }
        rows.push(PanelRow::new(hour(5), "ETH-USDT", true, 10.0).dual_listed());
        let mut panel = FactorPanel::from_rows(rows);
        let last = panel.len() - 1;
        let mut quote = vec![1.0; panel.len()];
        quote[last] = 7.0;
        let mut score: Vec<f64> = (0..panel.len()).map(|r| r as f64).collect();
        score[23] = f64::NAN;
        panel.set_column("quote_volume", quote);
        panel.set_column("Score_1", score);
        panel.set_tradable(47, false);
        panel
    }

    fn find(panel: &FactorPanel, symbol: &str, t: NaiveDateTime) -> usize {
        (0..panel.len())
            .find(|&r| panel.symbol(r) == symbol && panel.time(r) == t)
            .unwrap()
    }

    #[test]
    fn one_row_per_day_on_the_midnight_bucket() {
        let daily = resample_daily(&two_days());
        assert_eq!(daily.len(), 3);
        assert!(daily.times().iter().all(|&t| is_day_start(t)));

        let day0 = find(&daily, "BTC-USDT", hour(0));
        let day1 = find(&daily, "BTC-USDT", hour(24));
        assert_eq!(daily.close(day0), 123.0);
        assert_eq!(daily.close(day1), 147.0);
        assert!(daily.tradable(day0));
        assert!(!daily.tradable(day1));
    }

    #[test]
    fn flow_columns_sum_and_others_take_last_value() {
        let daily = resample_daily(&two_days());
        let day0 = find(&daily, "BTC-USDT", hour(0));
        let eth = find(&daily, "ETH-USDT", hour(0));
        assert_eq!(daily.column("quote_volume").unwrap()[day0], 24.0);
        assert_eq!(daily.column("quote_volume").unwrap()[eth], 7.0);
        // hour 23 is NaN, so the last valid value is hour 22
        assert_eq!(daily.column("Score_1").unwrap()[day0], 22.0);
        assert!(daily.listed_on_both(eth));
        assert!(daily.is_spot(eth));
    }

    #[test]
    fn day_start_truncates_to_midnight() {
        assert_eq!(day_start(hour(30)), hour(24));
        assert!(is_day_start(hour(48)));
        assert!(!is_day_start(hour(49)));
    }
}
