//! Backtest and strategy configuration.
//!
//! Raw TOML forms (`BacktestSpec`, `StrategySpec`) are validated into
//! immutable `BacktestConfig` / `StrategyConfig` values. Every check happens
//! here, before any computation starts.

pub mod backtest;
pub mod factor;
pub mod filter;
pub mod strategy;

pub use backtest::{parse_time, BacktestConfig, BacktestSpec};
pub use factor::{column_name, FactorConfig, FactorParam};
pub use filter::{Comparison, FilterFactorConfig, FilterHow, FilterMethod, RangeExpr};
pub use strategy::{SelectInclusive, SelectNum, SideConfig, StrategyConfig, StrategySpec};

use crate::domain::Direction;

/// Configuration errors. All of them abort before computation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid time '{0}', expected YYYY-MM-DD or YYYY-MM-DD HH:MM:SS")]
    InvalidTime(String),

    #[error("strategy '{strategy}': {direction:?} factor list is empty but its select count is not zero")]
    EmptyFactorList {
        strategy: String,
        direction: Direction,
    },

    #[error("strategy '{0}': long and short cap weights are both zero")]
    ZeroCapWeight(String),

    #[error("strategy '{strategy}': factor '{factor}' has a negative or non-finite weight")]
    NegativeWeight { strategy: String, factor: String },

    #[error("hour and day hold periods cannot be mixed in one backtest")]
    MixedPeriods,

    #[error("strategy '{strategy}' selects from spot, which does not support leverage {leverage}")]
    SpotLeverage { strategy: String, leverage: f64 },

    #[error("position limit fill strategy '{0}' is not a configured strategy")]
    UnknownFillStrategy(String),

    #[error("strategy name '{0}' is used more than once")]
    DuplicateStrategy(String),

    #[error("no strategy left to run")]
    NoStrategies,

    #[error("invalid {field}: {reason}")]
    Invalid { field: String, reason: String },
}
