//! CoinLab Core — selection, aggregation, position limits and lot sizing.
//!
//! This crate holds the pure computation of a crypto rotation backtest:
//! - Configuration (backtest + strategies) with load-time validation
//! - Factor panel, universe preparation and the factor registry
//! - Per-strategy selection engine (composite ranks, filters, counts, offsets)
//! - Offset/strategy aggregation into spot and swap ratio matrices
//! - Per-symbol position limits with excess redistribution
//! - Lot rebalancing policies
//!
//! Orchestration, caching and I/O of results live in `coinlab-runner`.

pub mod aggregate;
pub mod config;
pub mod data;
pub mod domain;
pub mod factors;
pub mod fingerprint;
pub mod rebalance;
pub mod redistribute;
pub mod selection;

pub use aggregate::{aggregate, RatioMatrix, VenueMatrices};
pub use config::{BacktestConfig, ConfigError, StrategyConfig};
pub use data::{DataError, FactorPanel};
pub use domain::{Direction, SelectionRow};
pub use factors::{FactorError, FactorRegistry};
pub use fingerprint::StrategyKey;
pub use rebalance::{create_policy, RebalanceMode, RebalancePolicy};
pub use redistribute::{apply_position_limits, redistribute, PositionLimits};
