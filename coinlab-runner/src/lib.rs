//! CoinLab Runner — pipeline orchestration, selection cache, lot replay, export.
//!
//! This crate builds on `coinlab-core` to provide:
//! - Parquet selection cache keyed by strategy fingerprint
//! - Parallel per-strategy selection with cache reuse
//! - The end-to-end position pipeline (selection → aggregation → limits)
//! - Lot replay through the configured rebalancing policy
//! - CSV/JSON artifact export

pub mod cache;
pub mod export;
pub mod lots;
pub mod pipeline;
pub mod selection_runner;

pub use cache::SelectionCache;
pub use export::{export_lots_csv, export_ratio_csv, export_selections_csv, save_artifacts};
pub use lots::{LotPlanner, LotStream, LotTick};
pub use pipeline::{Pipeline, PipelineError, PipelineOutput};
pub use selection_runner::SelectionRunner;
