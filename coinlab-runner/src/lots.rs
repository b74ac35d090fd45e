//! Lot replay: walks the hourly index and turns ratio rows into lots.

use chrono::NaiveDateTime;
use coinlab_core::aggregate::{RatioMatrix, VenueMatrices};
use coinlab_core::config::BacktestConfig;
use coinlab_core::data::FactorPanel;
use coinlab_core::rebalance::{create_policy, LotSizes, RebalancePolicy, VenueBook};
use serde::Serialize;
use std::collections::HashMap;
use tracing::info;

/// Lots of every symbol at one tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LotTick {
    pub time: NaiveDateTime,
    pub spot: Vec<i64>,
    pub swap: Vec<i64>,
}

/// The lot stream of a replay, aligned with the symbol lists.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LotStream {
    pub policy: String,
    pub spot_symbols: Vec<String>,
    pub swap_symbols: Vec<String>,
    pub ticks: Vec<LotTick>,
}

impl LotStream {
    /// Compact JSON summary: counts and the number of ticks holding each symbol.
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "policy": self.policy,
            "ticks": self.ticks.len(),
            "spot_ticks_held": ticks_held(&self.ticks, &self.spot_symbols, |t| t.spot.as_slice()),
            "swap_ticks_held": ticks_held(&self.ticks, &self.swap_symbols, |t| t.swap.as_slice()),
        })
    }
}

fn ticks_held(
    ticks: &[LotTick],
    symbols: &[String],
    pick: impl Fn(&LotTick) -> &[i64],
) -> serde_json::Map<String, serde_json::Value> {
    symbols
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let held = ticks.iter().filter(|t| pick(t)[i] != 0).count();
            (s.clone(), serde_json::json!(held))
        })
        .collect()
}

/// Owns the rebalancing policy and the symbol layout for one backtest.
pub struct LotPlanner {
    policy: Box<dyn RebalancePolicy>,
    spot_symbols: Vec<String>,
    swap_symbols: Vec<String>,
}

impl LotPlanner {
    /// Policy from `config.rebalance_mode`, lot sizes from `[lot_sizes]`
    /// with `default_lot_size` as fallback, symbols from `matrices`.
    pub fn new(config: &BacktestConfig, matrices: &VenueMatrices) -> Self {
        let spot_symbols = matrices.spot.symbols().to_vec();
        let swap_symbols = matrices.swap.symbols().to_vec();
        let sizes = LotSizes {
            spot: spot_symbols.iter().map(|s| config.lot_size(s)).collect(),
            swap: swap_symbols.iter().map(|s| config.lot_size(s)).collect(),
        };
        Self {
            policy: create_policy(config.rebalance_mode, sizes),
            spot_symbols,
            swap_symbols,
        }
    }

    pub fn policy_name(&self) -> &str {
        self.policy.name()
    }

    /// Replay `index` at constant `equity`. Prices come from the panel close
    /// at each tick (0 when missing); each tick starts from the previous
    /// tick's lots.
    pub fn replay(
        &self,
        matrices: &VenueMatrices,
        panel: &FactorPanel,
        index: &[NaiveDateTime],
        equity: f64,
    ) -> LotStream {
        let rows = panel.row_index();
        let prices = |t: NaiveDateTime, symbols: &[String], is_spot: bool| -> Vec<f64> {
            symbols
                .iter()
                .map(|s| {
                    rows.get(&(t, s.as_str(), is_spot))
                        .map_or(0.0, |&r| panel.close(r))
                })
                .collect()
        };

        let mut spot_lots = vec![0i64; self.spot_symbols.len()];
        let mut swap_lots = vec![0i64; self.swap_symbols.len()];
        let mut ticks = Vec::with_capacity(index.len());
        for &t in index {
            let spot_ratios = ratio_row(&matrices.spot, t, &self.spot_symbols);
            let swap_ratios = ratio_row(&matrices.swap, t, &self.swap_symbols);
            let spot_prices = prices(t, &self.spot_symbols, true);
            let swap_prices = prices(t, &self.swap_symbols, false);
            let (spot, swap) = self.policy.calc_lots(
                equity,
                VenueBook {
                    prices: &spot_prices,
                    lots: &spot_lots,
                    ratios: &spot_ratios,
                },
                VenueBook {
                    prices: &swap_prices,
                    lots: &swap_lots,
                    ratios: &swap_ratios,
                },
            );
            spot_lots = spot.clone();
            swap_lots = swap.clone();
            ticks.push(LotTick { time: t, spot, swap });
        }
        info!(policy = self.policy.name(), ticks = ticks.len(), "lot replay done");
        LotStream {
            policy: self.policy.name().to_string(),
            spot_symbols: self.spot_symbols.clone(),
            swap_symbols: self.swap_symbols.clone(),
            ticks,
        }
    }
}

/// Ratios at `t` for `symbols` (0 for absent times or symbols).
fn ratio_row(m: &RatioMatrix, t: NaiveDateTime, symbols: &[String]) -> Vec<f64> {
    let cols: HashMap<&str, usize> = m
        .symbols()
        .iter()
        .enumerate()
        .map(|(i, s)| (s.as_str(), i))
        .collect();
    match m.time_index(t) {
        Some(ti) => symbols
            .iter()
            .map(|s| cols.get(s.as_str()).map_or(0.0, |&c| m.get(ti, c)))
            .collect(),
        None => vec![0.0; symbols.len()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coinlab_core::data::PanelRow;
    use coinlab_core::factors::FactorRegistry;
    use chrono::Duration;

    const CONFIG: &str = r#"
start_date = "2024-01-01"
end_date = "2024-01-01 03:00:00"
default_lot_size = 0.5
[lot_sizes]
"BTC-USDT" = 0.125

[[strategy]]
strategy = "S"
hold_period = "1H"
factor_list = [["Bias", true, 3, 1]]
"#;

    fn t(h: i64) -> NaiveDateTime {
        coinlab_core::config::parse_time("2024-01-01").unwrap() + Duration::hours(h)
    }

    #[test]
    fn replay_sizes_lots_from_ratios_and_prices() {
        let config = BacktestConfig::from_toml_str(CONFIG, &FactorRegistry::new()).unwrap();
        let index = config.hourly_index();
        let mut swap = RatioMatrix::zeros(index.clone(), vec!["BTC-USDT".into(), "ETH-USDT".into()]);
        swap.set(0, 0, 0.5);
        swap.set(1, 1, -0.25);
        let matrices = VenueMatrices {
            spot: RatioMatrix::zeros(index.clone(), vec![]),
            swap,
        };
        let panel = FactorPanel::from_rows(vec![
            PanelRow::new(t(0), "BTC-USDT", false, 5_000.0),
            PanelRow::new(t(1), "ETH-USDT", false, 2_000.0),
        ]);

        let planner = LotPlanner::new(&config, &matrices);
        assert_eq!(planner.policy_name(), "always");
        let stream = planner.replay(&matrices, &panel, &index, 10_000.0);
        assert_eq!(stream.ticks.len(), 3);
        // 10_000 * 0.5 / 5_000 / 0.125 = 8
        assert_eq!(stream.ticks[0].swap, vec![8, 0]);
        // 10_000 * -0.25 / 2_000 / 0.5 = -2.5, truncated toward zero
        assert_eq!(stream.ticks[1].swap, vec![0, -2]);
        assert_eq!(stream.ticks[2].swap, vec![0, 0]);

        let summary = stream.summary();
        assert_eq!(summary["ticks"], 3);
        assert_eq!(summary["swap_ticks_held"]["ETH-USDT"], 1);
    }
}
