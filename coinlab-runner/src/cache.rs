//! Per-strategy selection cache with Parquet storage.
//!
//! One file per strategy, named by its [`StrategyKey`]. Empty selections are
//! stored as well-typed empty tables so a cache hit never needs special
//! casing downstream.

use anyhow::{bail, Context, Result};
use chrono::DateTime;
use coinlab_core::domain::{Direction, SelectionRow, Venue};
use coinlab_core::fingerprint::StrategyKey;
use polars::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};

/// Cache of selection tables.
#[derive(Debug, Clone)]
pub struct SelectionCache {
    cache_dir: PathBuf,
}

impl SelectionCache {
    /// Creates a cache in `cache_dir`, creating the directory if needed.
    pub fn new(cache_dir: impl AsRef<Path>) -> Result<Self> {
        let cache_dir = cache_dir.as_ref().to_path_buf();
        fs::create_dir_all(&cache_dir).context("Failed to create cache directory")?;
        Ok(Self { cache_dir })
    }

    pub fn dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn contains(&self, key: &StrategyKey) -> bool {
        self.path(key).exists()
    }

    /// Cached rows for `key`, or `None` when absent.
    pub fn get(&self, key: &StrategyKey) -> Result<Option<Vec<SelectionRow>>> {
        let path = self.path(key);
        if !path.exists() {
            return Ok(None);
        }
        let file = fs::File::open(&path)
            .with_context(|| format!("Failed to open cached selection {}", path.display()))?;
        let df = ParquetReader::new(file)
            .finish()
            .with_context(|| format!("Failed to read cached selection {}", path.display()))?;
        let rows = rows_from_dataframe(&df)
            .with_context(|| format!("Malformed cached selection {}", path.display()))?;
        Ok(Some(rows))
    }

    /// Stores `rows` under `key` (atomic: `.tmp` then rename).
    pub fn put(&self, key: &StrategyKey, rows: &[SelectionRow]) -> Result<()> {
        let path = self.path(key);
        let mut df = rows_to_dataframe(rows).context("Failed to build selection table")?;
        let tmp_path = path.with_extension("parquet.tmp");
        let file = fs::File::create(&tmp_path).context("Failed to create cache file")?;
        ParquetWriter::new(file)
            .finish(&mut df)
            .context("Failed to write cached selection")?;
        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            anyhow::Error::new(e).context("Failed to move cached selection into place")
        })
    }

    pub fn remove(&self, key: &StrategyKey) -> Result<()> {
        let path = self.path(key);
        if path.exists() {
            fs::remove_file(&path).context("Failed to remove cached selection")?;
        }
        Ok(())
    }

    /// Removes every cached selection.
    pub fn clear(&self) -> Result<()> {
        for path in self.files()? {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove {}", path.display()))?;
        }
        Ok(())
    }

    /// Number of cached selections.
    pub fn len(&self) -> Result<usize> {
        Ok(self.files()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.cache_dir).context("Failed to list cache directory")? {
            let path = entry?.path();
            if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("parquet") {
                files.push(path);
            }
        }
        Ok(files)
    }

    fn path(&self, key: &StrategyKey) -> PathBuf {
        self.cache_dir.join(format!("{key}.parquet"))
    }
}

// ─── Table conversion ────────────────────────────────────────────────

fn strings(rows: &[SelectionRow], f: impl Fn(&SelectionRow) -> &str) -> Vec<String> {
    rows.iter().map(|r| f(r).to_string()).collect()
}

fn rows_to_dataframe(rows: &[SelectionRow]) -> Result<DataFrame> {
    let times: Vec<i64> = rows
        .iter()
        .map(|r| r.candle_begin_time.and_utc().timestamp_millis())
        .collect();
    let columns = vec![
        Column::new("candle_begin_time".into(), times),
        Column::new("symbol".into(), strings(rows, |r| r.symbol.as_str())),
        Column::new(
            "is_spot".into(),
            rows.iter().map(|r| r.is_spot as i32).collect::<Vec<i32>>(),
        ),
        Column::new("symbol_swap".into(), strings(rows, |r| r.symbol_swap.as_str())),
        Column::new(
            "close".into(),
            rows.iter().map(|r| r.close).collect::<Vec<f64>>(),
        ),
        Column::new(
            "direction".into(),
            rows.iter()
                .map(|r| i32::from(r.direction.as_i8()))
                .collect::<Vec<i32>>(),
        ),
        Column::new(
            "offset".into(),
            rows.iter().map(|r| i64::from(r.offset)).collect::<Vec<i64>>(),
        ),
        Column::new(
            "target_alloc_ratio".into(),
            rows.iter().map(|r| r.target_alloc_ratio).collect::<Vec<f64>>(),
        ),
        Column::new("strategy".into(), strings(rows, |r| r.strategy.as_str())),
        Column::new(
            "cap_weight".into(),
            rows.iter().map(|r| r.cap_weight).collect::<Vec<f64>>(),
        ),
        Column::new("order_first".into(), strings(rows, |r| r.order_first.as_str())),
    ];
    Ok(DataFrame::new(columns)?)
}

fn rows_from_dataframe(df: &DataFrame) -> Result<Vec<SelectionRow>> {
    let i64s = |name: &str| -> Result<Vec<i64>> {
        let col = df.column(name)?.cast(&DataType::Int64)?;
        Ok(col.i64()?.into_iter().map(|v| v.unwrap_or(0)).collect())
    };
    let f64s = |name: &str| -> Result<Vec<f64>> {
        let col = df.column(name)?.cast(&DataType::Float64)?;
        Ok(col.f64()?.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    };
    let strs = |name: &str| -> Result<Vec<String>> {
        Ok(df
            .column(name)?
            .str()?
            .into_iter()
            .map(|v| v.unwrap_or_default().to_string())
            .collect())
    };

    let times = i64s("candle_begin_time")?;
    let symbols = strs("symbol")?;
    let is_spot = i64s("is_spot")?;
    let symbol_swap = strs("symbol_swap")?;
    let close = f64s("close")?;
    let direction = i64s("direction")?;
    let offset = i64s("offset")?;
    let ratio = f64s("target_alloc_ratio")?;
    let strategy = strs("strategy")?;
    let cap_weight = f64s("cap_weight")?;
    let order_first = strs("order_first")?;

    let mut rows = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let Some(time) = DateTime::from_timestamp_millis(times[i]) else {
            bail!("timestamp {} out of range at row {i}", times[i]);
        };
        let Some(dir) = i8::try_from(direction[i]).ok().and_then(Direction::from_i8) else {
            bail!("invalid direction {} at row {i}", direction[i]);
        };
        let venue = match order_first[i].as_str() {
            "spot" => Venue::Spot,
            "swap" => Venue::Swap,
            other => bail!("invalid order_first '{other}' at row {i}"),
        };
        rows.push(SelectionRow {
            candle_begin_time: time.naive_utc(),
            symbol: symbols[i].clone(),
            is_spot: is_spot[i] != 0,
            symbol_swap: symbol_swap[i].clone(),
            close: close[i],
            direction: dir,
            offset: u32::try_from(offset[i]).context("offset out of range")?,
            target_alloc_ratio: ratio[i],
            strategy: strategy[i].clone(),
            cap_weight: cap_weight[i],
            order_first: venue,
        });
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn key(name: &str) -> StrategyKey {
        StrategyKey(format!("{name}-0123abcd"))
    }

    fn sample_rows() -> Vec<SelectionRow> {
        let t = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(5, 0, 0)
            .unwrap();
        vec![
            SelectionRow {
                candle_begin_time: t,
                symbol: "ETH-USDT".into(),
                is_spot: true,
                symbol_swap: "ETH-USDT".into(),
                close: 3500.5,
                direction: Direction::Long,
                offset: 2,
                target_alloc_ratio: 0.125,
                strategy: "mom".into(),
                cap_weight: 0.5,
                order_first: Venue::Swap,
            },
            SelectionRow {
                candle_begin_time: t,
                symbol: "DOGE-USDT".into(),
                is_spot: false,
                symbol_swap: "DOGE-USDT".into(),
                close: 0.15,
                direction: Direction::Short,
                offset: 2,
                target_alloc_ratio: -0.125,
                strategy: "mom".into(),
                cap_weight: 0.5,
                order_first: Venue::Swap,
            },
        ]
    }

    #[test]
    fn test_cache_put_get() {
        let temp_dir = tempfile::tempdir().unwrap();
        let cache = SelectionCache::new(temp_dir.path()).unwrap();
        let k = key("mom");

        assert!(!cache.contains(&k));
        assert!(cache.get(&k).unwrap().is_none());

        cache.put(&k, &sample_rows()).unwrap();
        assert!(cache.contains(&k));
        assert_eq!(cache.get(&k).unwrap().unwrap(), sample_rows());
    }

    #[test]
    fn test_empty_selection_is_cached() {
        let temp_dir = tempfile::tempdir().unwrap();
        let cache = SelectionCache::new(temp_dir.path()).unwrap();
        let k = key("quiet");

        cache.put(&k, &[]).unwrap();
        assert!(cache.contains(&k));
        assert_eq!(cache.get(&k).unwrap().unwrap(), Vec::<SelectionRow>::new());
    }

    #[test]
    fn test_cache_remove_and_clear() {
        let temp_dir = tempfile::tempdir().unwrap();
        let cache = SelectionCache::new(temp_dir.path()).unwrap();

        for i in 0..3 {
            cache.put(&key(&format!("s{i}")), &sample_rows()).unwrap();
        }
        assert_eq!(cache.len().unwrap(), 3);

        cache.remove(&key("s0")).unwrap();
        assert!(!cache.contains(&key("s0")));
        assert_eq!(cache.len().unwrap(), 2);

        cache.clear().unwrap();
        assert!(cache.is_empty().unwrap());
    }
}
