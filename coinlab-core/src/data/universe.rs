//! Tradable-universe rules: black/white lists, leveraged tokens,
//! stablecoins and minimum listing age.

use chrono::Duration;
use tracing::debug;

use super::panel::FactorPanel;

/// Base assets that are pegged or otherwise not worth rotating into.
pub const STABLE_SYMBOLS: [&str; 13] = [
    "BKRW", "USDC", "USDP", "TUSD", "BUSD", "FDUSD", "DAI", "EUR", "GBP", "USBP", "SUSD", "PAXG",
    "AEUR",
];

const LEVERAGED_SUFFIXES: [&str; 4] = ["UP", "DOWN", "BEAR", "BULL"];
const LEVERAGED_EXCEPTIONS: [&str; 2] = ["JUP", "SYRUP"];

/// `btc-usdt` → `BTCUSDT`.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.to_ascii_uppercase().replace('-', "")
}

/// Can this symbol take part in selection?
///
/// A non-empty white list is authoritative. Otherwise the symbol must be a
/// USDT pair that is not black-listed, not a leveraged token and not a
/// stablecoin. List entries may be written with or without the dash.
pub fn is_trade_symbol(symbol: &str, black_list: &[String], white_list: &[String]) -> bool {
    let symbol = normalize_symbol(symbol);
    if !white_list.is_empty() {
        return white_list.iter().any(|w| normalize_symbol(w) == symbol);
    }
    if symbol.is_empty()
        || !symbol.ends_with("USDT")
        || black_list.iter().any(|b| normalize_symbol(b) == symbol)
    {
        return false;
    }
    let base = &symbol[..symbol.len() - 4];
    let leveraged = LEVERAGED_SUFFIXES.iter().any(|s| base.ends_with(s))
        && !LEVERAGED_EXCEPTIONS.contains(&base);
    !leveraged && !STABLE_SYMBOLS.contains(&base)
}

/// Universe rules applied to the panel before any factor is ranked.
#[derive(Debug, Clone, Default)]
pub struct UniverseFilter {
    pub black_list: Vec<String>,
    pub white_list: Vec<String>,
    /// Hours of history a series needs before it becomes eligible.
    pub min_kline_num: u32,
}

impl UniverseFilter {
    /// Drop untradable symbols and each series' first `min_kline_num` hours.
    pub fn apply(&self, panel: &FactorPanel) -> FactorPanel {
        let mut keep = vec![false; panel.len()];
        let warmup = Duration::hours(i64::from(self.min_kline_num));
        for rows in panel.series() {
            let Some(&first) = rows.first() else {
                continue;
            };
            if !is_trade_symbol(panel.symbol(first), &self.black_list, &self.white_list) {
                continue;
            }
            let eligible_from = panel.time(first) + warmup;
            for row in rows {
                keep[row] = panel.time(row) >= eligible_from;
            }
        }
        let kept = panel.retain(&keep);
        debug!(
            before = panel.len(),
            after = kept.len(),
            "universe filter applied"
        );
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::panel::PanelRow;
    use crate::data::test_support::hour;

    fn none() -> Vec<String> {
        Vec::new()
    }

    #[test]
    fn accepts_plain_usdt_pairs() {
        assert!(is_trade_symbol("BTC-USDT", &none(), &none()));
        assert!(is_trade_symbol("JUPUSDT", &none(), &none()));
        assert!(is_trade_symbol("SYRUP-USDT", &none(), &none()));
    }

    #[test]
    fn rejects_leveraged_stable_and_non_usdt() {
        assert!(!is_trade_symbol("BTCUP-USDT", &none(), &none()));
        assert!(!is_trade_symbol("ETHBEAR-USDT", &none(), &none()));
        assert!(!is_trade_symbol("USDC-USDT", &none(), &none()));
        assert!(!is_trade_symbol("BTC-BUSD", &none(), &none()));
        assert!(!is_trade_symbol("", &none(), &none()));
    }

    #[test]
    fn white_list_wins_and_black_list_blocks() {
        let white = vec!["ETHUSDT".to_string()];
        assert!(is_trade_symbol("ETH-USDT", &none(), &white));
        assert!(!is_trade_symbol("BTC-USDT", &none(), &white));

        let black = vec!["BTC-USDT".to_string()];
        assert!(!is_trade_symbol("BTCUSDT", &black, &none()));
    }

    #[test]
    fn warmup_drops_early_rows_per_series() {
        let panel = FactorPanel::from_rows(vec![
            PanelRow::new(hour(0), "BTC-USDT", false, 1.0),
            PanelRow::new(hour(1), "BTC-USDT", false, 1.0),
            PanelRow::new(hour(2), "BTC-USDT", false, 1.0),
            PanelRow::new(hour(2), "ETH-USDT", false, 1.0),
            PanelRow::new(hour(2), "USDC-USDT", false, 1.0),
        ]);
        let filter = UniverseFilter {
            min_kline_num: 2,
            ..Default::default()
        };
        let kept = filter.apply(&panel);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept.symbol(0), "BTC-USDT");
        assert_eq!(kept.time(0), hour(2));
    }
}
