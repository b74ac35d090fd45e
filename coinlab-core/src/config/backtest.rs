//! Backtest-level configuration loaded from a TOML file.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::warn;

use super::strategy::{StrategyConfig, StrategySpec};
use super::ConfigError;
use crate::data::UniverseFilter;
use crate::domain::SelectScope;
use crate::factors::FactorRegistry;
use crate::rebalance::RebalanceMode;
use crate::redistribute::PositionLimits;

/// Parse `YYYY-MM-DD HH:MM:SS` or `YYYY-MM-DD` (midnight).
pub fn parse_time(s: &str) -> Result<NaiveDateTime, ConfigError> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map(|d| d.and_hms_opt(0, 0, 0).unwrap_or_default())
        })
        .map_err(|_| ConfigError::InvalidTime(s.to_string()))
}

fn default_name() -> String {
    "backtest".to_string()
}

fn default_leverage() -> f64 {
    1.0
}

fn default_initial_usdt() -> f64 {
    10_000.0
}

fn default_min_kline_num() -> u32 {
    168
}

fn default_unified_time() -> String {
    "2017-01-01 00:00:00".to_string()
}

fn default_lot_size() -> f64 {
    0.001
}

/// The backtest file as written by the user.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BacktestSpec {
    #[serde(default = "default_name")]
    pub name: String,
    pub start_date: String,
    pub end_date: String,
    #[serde(default = "default_leverage")]
    pub leverage: f64,
    #[serde(default = "default_initial_usdt")]
    pub initial_usdt: f64,
    #[serde(default)]
    pub black_list: Vec<String>,
    #[serde(default)]
    pub white_list: Vec<String>,
    #[serde(default = "default_min_kline_num")]
    pub min_kline_num: u32,
    #[serde(default = "default_unified_time")]
    pub unified_time: String,
    #[serde(default = "default_lot_size")]
    pub default_lot_size: f64,
    #[serde(default)]
    pub lot_sizes: BTreeMap<String, f64>,
    #[serde(default)]
    pub rebalance_mode: RebalanceMode,
    #[serde(default)]
    pub position_limits: PositionLimits,
    /// Keep selection cache files after aggregation.
    #[serde(default)]
    pub reserve_cache: bool,
    #[serde(default, rename = "strategy")]
    pub strategies: Vec<StrategySpec>,
}

/// Validated backtest configuration.
#[derive(Debug, Clone)]
pub struct BacktestConfig {
    pub name: String,
    /// First hourly bucket (inclusive).
    pub start: NaiveDateTime,
    /// Last hourly bucket (exclusive).
    pub end: NaiveDateTime,
    pub leverage: f64,
    pub initial_usdt: f64,
    pub universe: UniverseFilter,
    pub unified_time: NaiveDateTime,
    pub default_lot_size: f64,
    pub lot_sizes: BTreeMap<String, f64>,
    pub rebalance_mode: RebalanceMode,
    pub position_limits: PositionLimits,
    pub reserve_cache: bool,
    /// Runnable strategies, cap weights normalised to sum to 1 over the file.
    pub strategies: Vec<StrategyConfig>,
}

impl BacktestConfig {
    pub fn from_toml_str(src: &str, registry: &FactorRegistry) -> Result<Self, ConfigError> {
        let spec: BacktestSpec = toml::from_str(src)?;
        Self::from_spec(spec, registry)
    }

    pub fn from_file(path: &Path, registry: &FactorRegistry) -> Result<Self, ConfigError> {
        let src = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&src, registry)
    }

    pub fn from_spec(spec: BacktestSpec, registry: &FactorRegistry) -> Result<Self, ConfigError> {
        let start = parse_time(&spec.start_date)?;
        let end = parse_time(&spec.end_date)?;
        if end <= start {
            return Err(ConfigError::Invalid {
                field: "end_date".into(),
                reason: format!("{end} is not after start_date {start}"),
            });
        }
        let unified_time = parse_time(&spec.unified_time)?;
        if !(spec.leverage.is_finite() && spec.leverage > 0.0) {
            return Err(ConfigError::Invalid {
                field: "leverage".into(),
                reason: "must be positive".into(),
            });
        }
        if spec.strategies.is_empty() {
            return Err(ConfigError::NoStrategies);
        }

        let total_cap: f64 = spec.strategies.iter().map(|s| s.cap_weight).sum();
        if !(total_cap.is_finite() && total_cap > 0.0) {
            return Err(ConfigError::Invalid {
                field: "cap_weight".into(),
                reason: "strategy cap weights must sum to a positive number".into(),
            });
        }

        let mut strategies = Vec::with_capacity(spec.strategies.len());
        let mut names = HashSet::new();
        let (mut any_hour, mut any_day) = (false, false);
        for (index, raw) in spec.strategies.into_iter().enumerate() {
            let mut strategy = StrategyConfig::from_spec(index, raw, registry)?;
            strategy.cap_weight /= total_cap;

            if strategy.hold_period.is_day() {
                any_day = true;
            } else {
                any_hour = true;
            }
            if strategy.market.scope != SelectScope::Swap && spec.leverage >= 2.0 {
                return Err(ConfigError::SpotLeverage {
                    strategy: strategy.name,
                    leverage: spec.leverage,
                });
            }
            if !names.insert(strategy.name.clone()) {
                return Err(ConfigError::DuplicateStrategy(strategy.name));
            }
            if strategy.is_empty_selection() {
                warn!(strategy = %strategy.name, "both select counts are zero, strategy skipped");
                continue;
            }
            strategies.push(strategy);
        }
        if any_hour && any_day {
            return Err(ConfigError::MixedPeriods);
        }
        if strategies.is_empty() {
            return Err(ConfigError::NoStrategies);
        }

        for (side, limit) in spec.position_limits.sides() {
            if !names.contains(&limit.fill_strategy) {
                return Err(ConfigError::UnknownFillStrategy(limit.fill_strategy.clone()));
            }
            if !(limit.rate_limit.is_finite() && limit.rate_limit > 0.0) {
                return Err(ConfigError::Invalid {
                    field: format!("position_limits.{side}.rate_limit"),
                    reason: "must be positive".into(),
                });
            }
        }
        spec.rebalance_mode
            .validate()
            .map_err(|reason| ConfigError::Invalid {
                field: "rebalance_mode".into(),
                reason,
            })?;

        Ok(Self {
            name: spec.name,
            start,
            end,
            leverage: spec.leverage,
            initial_usdt: spec.initial_usdt,
            universe: UniverseFilter {
                black_list: spec.black_list,
                white_list: spec.white_list,
                min_kline_num: spec.min_kline_num,
            },
            unified_time,
            default_lot_size: spec.default_lot_size,
            lot_sizes: spec.lot_sizes,
            rebalance_mode: spec.rebalance_mode,
            position_limits: spec.position_limits,
            reserve_cache: spec.reserve_cache,
            strategies,
        })
    }

    /// True when the strategies use day hold periods.
    pub fn is_day_period(&self) -> bool {
        self.strategies.iter().any(|s| s.hold_period.is_day())
    }

    /// Every hourly timestamp in `[start, end)`.
    pub fn hourly_index(&self) -> Vec<NaiveDateTime> {
        let mut index = Vec::new();
        let mut t = self.start;
        while t < self.end {
            index.push(t);
            t += Duration::hours(1);
        }
        index
    }

    pub fn strategy(&self, name: &str) -> Option<&StrategyConfig> {
        self.strategies.iter().find(|s| s.name == name)
    }

    /// Lot size for `symbol`, falling back to `default_lot_size`.
    pub fn lot_size(&self, symbol: &str) -> f64 {
        self.lot_sizes
            .get(symbol)
            .copied()
            .unwrap_or(self.default_lot_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rebalance::RebalanceMode;

    const BASE: &str = r#"
        name = "demo"
        start_date = "2024-01-01"
        end_date = "2024-01-02"
    "#;

    fn load(extra: &str) -> Result<BacktestConfig, ConfigError> {
        BacktestConfig::from_toml_str(
            &format!("{BASE}\n{extra}"),
            &FactorRegistry::with_builtins(),
        )
    }

    const STRATEGY: &str = r#"
        [[strategy]]
        strategy = "A"
        hold_period = "6H"
        cap_weight = 1
        factor_list = [["Bias", true, 3, 1]]
    "#;

    #[test]
    fn loads_with_defaults() {
        let cfg = load(STRATEGY).unwrap();
        assert_eq!(cfg.name, "demo");
        assert_eq!(cfg.universe.min_kline_num, 168);
        assert_eq!(cfg.initial_usdt, 10_000.0);
        assert_eq!(cfg.unified_time, parse_time("2017-01-01").unwrap());
        assert_eq!(cfg.hourly_index().len(), 24);
        assert_eq!(cfg.rebalance_mode, RebalanceMode::Always);
        assert!(!cfg.is_day_period());
        assert_eq!(cfg.strategies[0].cap_weight, 1.0);
    }

    #[test]
    fn cap_weights_normalised_over_all_strategies() {
        let cfg = load(
            r#"
            [[strategy]]
            strategy = "A"
            cap_weight = 3
            factor_list = [["Bias", true, 3, 1]]

            [[strategy]]
            strategy = "B"
            cap_weight = 1
            factor_list = [["Bias", true, 6, 1]]

            [[strategy]]
            strategy = "Idle"
            cap_weight = 4
            long_select_coin_num = 0
            factor_list = [["Bias", true, 6, 1]]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.strategies.len(), 2);
        assert_eq!(cfg.strategies[0].cap_weight, 3.0 / 8.0);
        assert_eq!(cfg.strategies[1].cap_weight, 1.0 / 8.0);
    }

    #[test]
    fn mixed_periods_rejected() {
        let err = load(
            r#"
            [[strategy]]
            strategy = "A"
            hold_period = "6H"
            factor_list = [["Bias", true, 3, 1]]

            [[strategy]]
            strategy = "B"
            hold_period = "1D"
            factor_list = [["Bias", true, 3, 1]]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::MixedPeriods));
    }

    #[test]
    fn spot_with_leverage_rejected() {
        let err = load(
            r#"
            leverage = 2

            [[strategy]]
            strategy = "A"
            market = "spot_swap"
            factor_list = [["Bias", true, 3, 1]]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::SpotLeverage { .. }));
    }

    #[test]
    fn fill_strategy_must_exist() {
        let err = load(&format!(
            "{STRATEGY}\n[position_limits.long]\nrate_limit = 0.1\nfill_strategy = \"nope\"\n"
        ))
        .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownFillStrategy(n) if n == "nope"));

        let cfg = load(&format!(
            "{STRATEGY}\n[position_limits.long]\nrate_limit = 0.1\nfill_strategy = \"0.A\"\n"
        ))
        .unwrap();
        assert_eq!(cfg.position_limits.long.unwrap().rate_limit, 0.1);
    }

    #[test]
    fn duplicate_names_rejected() {
        let err = load(
            r#"
            [[strategy]]
            strategy = "A"
            name = "same"
            factor_list = [["Bias", true, 3, 1]]

            [[strategy]]
            strategy = "B"
            name = "same"
            factor_list = [["Bias", true, 3, 1]]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateStrategy(_)));
    }

    #[test]
    fn rebalance_mode_table() {
        let cfg = load(&format!(
            "{STRATEGY}\n[rebalance_mode]\nmode = \"by_equity_ratio\"\nmin_order_ratio = 0.01\n"
        ))
        .unwrap();
        assert_eq!(
            cfg.rebalance_mode,
            RebalanceMode::ByEquityRatio {
                min_order_ratio: 0.01
            }
        );
    }

    #[test]
    fn lot_size_fallback() {
        let src = format!("{BASE}\ndefault_lot_size = 0.5\n[lot_sizes]\n\"BTC-USDT\" = 0.001\n{STRATEGY}");
        let cfg = BacktestConfig::from_toml_str(&src, &FactorRegistry::with_builtins()).unwrap();
        assert_eq!(cfg.lot_size("BTC-USDT"), 0.001);
        assert_eq!(cfg.lot_size("ETH-USDT"), 0.5);
    }

    #[test]
    fn bad_dates() {
        assert!(parse_time("2024/01/01").is_err());
        assert_eq!(
            parse_time("2024-01-01 05:00:00").unwrap(),
            parse_time("2024-01-01").unwrap() + Duration::hours(5)
        );
        let src = "start_date = \"2024-01-02\"\nend_date = \"2024-01-01\"\n";
        assert!(BacktestConfig::from_toml_str(src, &FactorRegistry::with_builtins()).is_err());
    }
}
