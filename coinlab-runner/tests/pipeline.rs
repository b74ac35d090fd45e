//! Pipeline runs over a small synthetic panel: limits, venue transfer,
//! cache reuse and artifact export.

use chrono::{Duration, NaiveDateTime};
use coinlab_core::config::{parse_time, BacktestConfig};
use coinlab_core::data::{FactorPanel, PanelRow};
use coinlab_core::factors::FactorRegistry;
use coinlab_runner::{save_artifacts, LotPlanner, Pipeline, PipelineError, SelectionCache};

const SYMBOLS: [&str; 4] = ["AAA-USDT", "BBB-USDT", "CCC-USDT", "DDD-USDT"];

fn t0() -> NaiveDateTime {
    parse_time("2024-01-01").unwrap()
}

/// 4 symbols over 12 hours; symbol i grows `(i + 1)%` per hour, so DDD
/// always has the largest one-hour change.
fn panel(with_spot: bool) -> FactorPanel {
    panel_over(with_spot, 12)
}

fn panel_over(with_spot: bool, hours: i64) -> FactorPanel {
    let mut rows = Vec::new();
    for (i, symbol) in SYMBOLS.iter().enumerate() {
        let growth = 1.0 + (i + 1) as f64 / 100.0;
        let mut close = 10.0;
        for h in 0..hours {
            let t = t0() + Duration::hours(h);
            if with_spot {
                rows.push(PanelRow::new(t, symbol, true, close).dual_listed());
                rows.push(PanelRow::new(t, symbol, false, close).dual_listed());
            } else {
                rows.push(PanelRow::new(t, symbol, false, close));
            }
            close *= growth;
        }
    }
    FactorPanel::from_rows(rows)
}

fn config(extra: &str, strategies: &str) -> BacktestConfig {
    let src = format!(
        r#"
name = "pipeline"
start_date = "2024-01-01"
end_date = "2024-01-01 12:00:00"
min_kline_num = 0
{extra}
{strategies}
"#
    );
    BacktestConfig::from_toml_str(&src, &FactorRegistry::with_builtins()).unwrap()
}

const TOP_AND_SPREAD: &str = r#"
[[strategy]]
strategy = "Momentum"
name = "top"
hold_period = "1H"
long_select_coin_num = 1
short_cap_weight = 0
factor_list = [["PctChange", false, 1, 1]]

[[strategy]]
strategy = "Momentum"
name = "spread"
hold_period = "1H"
long_select_coin_num = 4
short_cap_weight = 0
factor_list = [["PctChange", false, 1, 1]]
"#;

fn pipeline() -> Pipeline {
    Pipeline::new(FactorRegistry::with_builtins()).with_parallelism(false)
}

#[test]
fn aggregates_strategies_by_cap_weight() {
    let config = config("", TOP_AND_SPREAD);
    let output = pipeline().run(&config, &panel(false)).unwrap();

    assert_eq!(output.start, Some(t0() + Duration::hours(1)));
    assert_eq!(output.selections.len(), 2);
    assert!(output.selections["top"].iter().all(|r| r.symbol == "DDD-USDT"));

    let swap = &output.matrices.swap;
    let t = t0() + Duration::hours(6);
    // top: 0.5 on DDD; spread: 0.5 / 4 on each symbol
    assert!((swap.value(t, "DDD-USDT") - 0.625).abs() < 1e-12);
    assert!((swap.value(t, "AAA-USDT") - 0.125).abs() < 1e-12);
    assert_eq!(output.matrices.spot.abs_sum(), 0.0);
}

#[test]
fn long_limit_moves_excess_into_fill_strategy() {
    let limits = r#"
[position_limits.long]
rate_limit = 0.3
fill_strategy = "spread"
"#;
    let config = config(limits, TOP_AND_SPREAD);
    let output = pipeline().run(&config, &panel(false)).unwrap();

    let swap = &output.matrices.swap;
    let t = t0() + Duration::hours(6);
    // excess 0.325 split evenly over the four spread symbols
    assert!((swap.value(t, "DDD-USDT") - 0.38125).abs() < 1e-9);
    for symbol in &SYMBOLS[..3] {
        assert!((swap.value(t, symbol) - 0.20625).abs() < 1e-9, "{symbol}");
    }
    let row = swap.row(swap.time_index(t).unwrap());
    assert!((row.iter().sum::<f64>() - 1.0).abs() < 1e-9);
}

#[test]
fn spot_selection_is_transferred_to_swap() {
    let strategies = r#"
[[strategy]]
strategy = "Momentum"
name = "spot_pick"
hold_period = "1H"
market = "spot_swap"
long_select_coin_num = 1
short_cap_weight = 0
factor_list = [["PctChange", false, 1, 1]]
"#;
    let config = config("", strategies);
    let output = pipeline().run(&config, &panel(true)).unwrap();

    let rows = &output.selections["spot_pick"];
    assert!(!rows.is_empty());
    assert!(rows.iter().all(|r| !r.is_spot && r.symbol == "DDD-USDT"));
    assert_eq!(output.matrices.spot.abs_sum(), 0.0);
    assert_eq!(
        output.matrices.swap.value(t0() + Duration::hours(6), "DDD-USDT"),
        1.0
    );
}

#[test]
fn cache_files_follow_reserve_cache() {
    let dir = tempfile::tempdir().unwrap();
    let cache = SelectionCache::new(dir.path()).unwrap();
    let data = panel(false);

    let keep = config("reserve_cache = true", TOP_AND_SPREAD);
    let first = pipeline().with_cache(cache.clone()).run(&keep, &data).unwrap();
    assert_eq!(cache.len().unwrap(), 2);

    // second run is served from the cache and matches the first
    let second = pipeline().with_cache(cache.clone()).run(&keep, &data).unwrap();
    assert_eq!(first.matrices, second.matrices);
    assert_eq!(first.selections, second.selections);

    let drop = config("", TOP_AND_SPREAD);
    pipeline().with_cache(cache.clone()).run(&drop, &data).unwrap();
    assert!(cache.is_empty().unwrap());
}

#[test]
fn parallel_and_sequential_runs_agree() {
    let config = config("", TOP_AND_SPREAD);
    let data = panel(false);
    let parallel = Pipeline::new(FactorRegistry::with_builtins())
        .run(&config, &data)
        .unwrap();
    let sequential = pipeline().run(&config, &data).unwrap();
    assert_eq!(parallel.matrices, sequential.matrices);
}

#[test]
fn white_list_without_matches_is_an_empty_universe() {
    let config = config(r#"white_list = ["ZZZ-USDT"]"#, TOP_AND_SPREAD);
    let err = pipeline().run(&config, &panel(false)).unwrap_err();
    assert!(matches!(err, PipelineError::EmptyUniverse));
}

#[test]
fn artifacts_are_written() {
    let config = config("", TOP_AND_SPREAD);
    let output = pipeline().run(&config, &panel(false)).unwrap();
    let planner = LotPlanner::new(&config, &output.matrices);
    let lots = planner.replay(
        &output.matrices,
        &output.panel,
        &config.hourly_index(),
        config.initial_usdt,
    );
    assert_eq!(lots.ticks.len(), 12);

    let dir = tempfile::tempdir().unwrap();
    let written = save_artifacts(dir.path(), &output, Some(&lots)).unwrap();
    assert_eq!(written.len(), 5);
    for path in &written {
        assert!(path.exists(), "{}", path.display());
    }
    let swap_csv = std::fs::read_to_string(dir.path().join("swap_ratio.csv")).unwrap();
    assert!(swap_csv.starts_with("candle_begin_time,AAA-USDT"));
}

#[test]
fn day_hold_period_selects_once_per_day() {
    let src = r#"
name = "daily"
start_date = "2024-01-01"
end_date = "2024-01-04"
min_kline_num = 0

[[strategy]]
strategy = "Momentum"
name = "daily_top"
hold_period = "1D"
long_select_coin_num = 1
short_cap_weight = 0
factor_list = [["PctChange", false, 1, 1]]
"#;
    let config = BacktestConfig::from_toml_str(src, &FactorRegistry::with_builtins()).unwrap();
    let output = pipeline().run(&config, &panel_over(false, 72)).unwrap();

    // daily bars: day 0 has no change yet, days 1 and 2 pick DDD
    let rows = &output.selections["daily_top"];
    let times: Vec<_> = rows.iter().map(|r| r.candle_begin_time).collect();
    assert_eq!(times, vec![t0() + Duration::hours(24), t0() + Duration::hours(48)]);
    assert!(rows.iter().all(|r| r.symbol == "DDD-USDT"));

    // held from 23:00 of the selection day for 24 hours
    let swap = &output.matrices.swap;
    assert_eq!(swap.value(t0() + Duration::hours(46), "DDD-USDT"), 0.0);
    assert_eq!(swap.value(t0() + Duration::hours(50), "DDD-USDT"), 1.0);
    assert_eq!(output.panel.len(), 4 * 72);
}
