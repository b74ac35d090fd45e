//! CoinLab CLI — config checks, selection and the full position pipeline.
//!
//! Commands:
//! - `run` — selection → aggregation → position limits → lot replay, with artifacts
//! - `select` — selection only, results written to the selection cache
//! - `check` — validate a config and print strategy fullnames and cache keys
//! - `cache clear` — remove every cached selection

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use coinlab_core::config::BacktestConfig;
use coinlab_core::data::{read_panel, FactorPanel};
use coinlab_core::factors::FactorRegistry;
use coinlab_core::fingerprint::StrategyKey;
use coinlab_runner::{save_artifacts, LotPlanner, Pipeline, PipelineOutput, SelectionCache};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(
    name = "coinlab",
    about = "CoinLab CLI — multi-strategy crypto position backtesting core"
)]
struct Cli {
    /// Debug-level logging (RUST_LOG takes precedence when set).
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline and write ratio, selection and lot artifacts.
    Run {
        /// Path to a TOML backtest config.
        #[arg(long)]
        config: PathBuf,

        /// Path to the hourly panel (Parquet).
        #[arg(long)]
        panel: PathBuf,

        /// Output directory for artifacts.
        #[arg(long, default_value = "results")]
        out: PathBuf,

        /// Selection cache directory.
        #[arg(long, default_value = "cache")]
        cache_dir: PathBuf,

        /// Run strategies one after another instead of in parallel.
        #[arg(long, default_value_t = false)]
        sequential: bool,

        /// Equity used for lot sizing. Defaults to the config's initial_usdt.
        #[arg(long)]
        equity: Option<f64>,
    },
    /// Run selection only and keep the results in the selection cache.
    Select {
        /// Path to a TOML backtest config.
        #[arg(long)]
        config: PathBuf,

        /// Path to the hourly panel (Parquet).
        #[arg(long)]
        panel: PathBuf,

        /// Selection cache directory.
        #[arg(long, default_value = "cache")]
        cache_dir: PathBuf,

        /// Run strategies one after another instead of in parallel.
        #[arg(long, default_value_t = false)]
        sequential: bool,
    },
    /// Validate a config and print each strategy's fullname and cache key.
    Check {
        /// Path to a TOML backtest config.
        #[arg(long)]
        config: PathBuf,
    },
    /// Selection cache management.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Remove every cached selection.
    Clear {
        /// Selection cache directory.
        #[arg(long, default_value = "cache")]
        cache_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    match cli.command {
        Commands::Run {
            config,
            panel,
            out,
            cache_dir,
            sequential,
            equity,
        } => run_pipeline_cmd(&config, &panel, &out, &cache_dir, sequential, equity),
        Commands::Select {
            config,
            panel,
            cache_dir,
            sequential,
        } => run_select_cmd(&config, &panel, &cache_dir, sequential),
        Commands::Check { config } => run_check(&config),
        Commands::Cache { action } => match action {
            CacheAction::Clear { cache_dir } => run_cache_clear(&cache_dir),
        },
    }
}

fn init_tracing(verbose: bool) -> Result<()> {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to install tracing subscriber")
}

fn load(config_path: &Path, panel_path: &Path) -> Result<(BacktestConfig, FactorPanel)> {
    let registry = FactorRegistry::with_builtins();
    let config = BacktestConfig::from_file(config_path, &registry)
        .with_context(|| format!("loading config {}", config_path.display()))?;
    let panel = read_panel(panel_path)
        .with_context(|| format!("loading panel {}", panel_path.display()))?;
    info!(
        config = %config.name,
        strategies = config.strategies.len(),
        rows = panel.len(),
        range = ?panel.time_range(),
        "inputs loaded"
    );
    Ok((config, panel))
}

fn pipeline(cache_dir: &Path, sequential: bool) -> Result<Pipeline> {
    let cache = SelectionCache::new(cache_dir)?;
    Ok(Pipeline::new(FactorRegistry::with_builtins())
        .with_cache(cache)
        .with_parallelism(!sequential))
}

fn run_pipeline_cmd(
    config_path: &Path,
    panel_path: &Path,
    out: &Path,
    cache_dir: &Path,
    sequential: bool,
    equity: Option<f64>,
) -> Result<()> {
    let (config, panel) = load(config_path, panel_path)?;
    let output = pipeline(cache_dir, sequential)?.run(&config, &panel)?;

    let planner = LotPlanner::new(&config, &output.matrices);
    let lots = planner.replay(
        &output.matrices,
        &output.panel,
        &config.hourly_index(),
        equity.unwrap_or(config.initial_usdt),
    );

    print_summary(&config, &output);
    let written = save_artifacts(out, &output, Some(&lots))?;
    for path in &written {
        println!("wrote {}", path.display());
    }
    Ok(())
}

fn run_select_cmd(
    config_path: &Path,
    panel_path: &Path,
    cache_dir: &Path,
    sequential: bool,
) -> Result<()> {
    let (config, panel) = load(config_path, panel_path)?;
    let pipeline = pipeline(cache_dir, sequential)?;
    let prepared = pipeline.prepare_panel(&config, &panel)?;
    let selections = pipeline.select(&config, &prepared)?;

    println!("{:<24} {:<32} {:>8}", "Strategy", "Cache key", "Rows");
    println!("{}", "-".repeat(66));
    for (strategy, rows) in config.strategies.iter().zip(&selections) {
        println!(
            "{:<24} {:<32} {:>8}",
            strategy.name,
            StrategyKey::of(strategy),
            rows.len()
        );
    }
    println!("Cached in: {}", cache_dir.display());
    Ok(())
}

fn run_check(config_path: &Path) -> Result<()> {
    let config = BacktestConfig::from_file(config_path, &FactorRegistry::with_builtins())
        .with_context(|| format!("loading config {}", config_path.display()))?;

    println!("Config:   {}", config.name);
    println!("Period:   {} to {}", config.start, config.end);
    println!("Leverage: {}", config.leverage);
    println!("Rebalance: {:?}", config.rebalance_mode);
    println!();
    for strategy in &config.strategies {
        println!("{} (cap {:.4})", strategy.name, strategy.cap_weight);
        println!("  key:      {}", StrategyKey::of(strategy));
        println!("  fullname: {}", strategy.fullname());
    }
    for (side, limit) in config.position_limits.sides() {
        println!(
            "limit {side}: {} → fill {}",
            limit.rate_limit, limit.fill_strategy
        );
    }
    Ok(())
}

fn run_cache_clear(cache_dir: &Path) -> Result<()> {
    if !cache_dir.exists() {
        println!("Cache directory does not exist: {}", cache_dir.display());
        return Ok(());
    }
    let cache = SelectionCache::new(cache_dir)?;
    let count = cache.len()?;
    cache.clear()?;
    println!("Removed {count} cached selection(s) from {}", cache_dir.display());
    Ok(())
}

fn print_summary(config: &BacktestConfig, output: &PipelineOutput) {
    println!();
    println!("=== {} ===", config.name);
    match output.start {
        Some(t) => println!("Common start:  {t}"),
        None => println!("Common start:  (no selections)"),
    }
    for (name, rows) in &output.selections {
        println!("{name:<24} {:>8} rows", rows.len());
    }
    println!();
    for (venue, m) in [("spot", &output.matrices.spot), ("swap", &output.matrices.swap)] {
        println!(
            "{venue}: {} hours × {} symbols, gross exposure {:.4}",
            m.n_times(),
            m.n_symbols(),
            m.abs_sum()
        );
    }
    println!();
}
