//! Parquet import/export for factor panels.
//!
//! Required columns: `candle_begin_time` (datetime or epoch milliseconds),
//! `symbol`, `is_spot`, `close`. Optional: `symbol_spot`, `symbol_swap`,
//! `tradable`. Every other numeric column is loaded as a factor/raw column.

use chrono::{DateTime, NaiveDateTime};
use polars::prelude::*;
use std::fs;
use std::path::Path;

use super::panel::{FactorPanel, PanelRow};
use super::DataError;

const RESERVED: [&str; 7] = [
    "candle_begin_time",
    "symbol",
    "is_spot",
    "close",
    "symbol_spot",
    "symbol_swap",
    "tradable",
];

/// Read a factor panel from a Parquet file.
pub fn read_panel(path: &Path) -> Result<FactorPanel, DataError> {
    let file = fs::File::open(path)
        .map_err(|e| DataError::ParquetError(format!("open {}: {e}", path.display())))?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| DataError::ParquetError(format!("read {}: {e}", path.display())))?;
    panel_from_dataframe(&df)
}

/// Write a factor panel to a Parquet file (atomic: `.tmp` then rename).
pub fn write_panel(panel: &FactorPanel, path: &Path) -> Result<(), DataError> {
    let mut df = panel_to_dataframe(panel)?;
    let tmp_path = path.with_extension("parquet.tmp");
    let file = fs::File::create(&tmp_path)
        .map_err(|e| DataError::ParquetError(format!("create file: {e}")))?;
    ParquetWriter::new(file)
        .finish(&mut df)
        .map_err(|e| DataError::ParquetError(format!("write parquet: {e}")))?;
    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        DataError::ParquetError(format!("atomic rename failed: {e}"))
    })
}

fn polars_err(context: &str) -> impl Fn(PolarsError) -> DataError + '_ {
    move |e| DataError::ParquetError(format!("{context}: {e}"))
}

/// Epoch-millisecond values of the time column, whatever its physical type.
fn time_millis(df: &DataFrame) -> Result<Vec<Option<i64>>, DataError> {
    let col = df
        .column("candle_begin_time")
        .map_err(|_| DataError::MissingColumn("candle_begin_time".into()))?;
    let divisor = match col.dtype() {
        DataType::Datetime(TimeUnit::Milliseconds, _) | DataType::Int64 => 1,
        DataType::Datetime(TimeUnit::Microseconds, _) => 1_000,
        DataType::Datetime(TimeUnit::Nanoseconds, _) => 1_000_000,
        other => {
            return Err(DataError::SchemaMismatch {
                column: "candle_begin_time".into(),
                found: other.to_string(),
            })
        }
    };
    let raw = col
        .cast(&DataType::Int64)
        .map_err(polars_err("cast candle_begin_time"))?;
    let ca = raw.i64().map_err(polars_err("candle_begin_time"))?;
    Ok(ca.into_iter().map(|v| v.map(|x| x / divisor)).collect())
}

fn string_column(df: &DataFrame, name: &str, required: bool) -> Result<Vec<String>, DataError> {
    let Ok(col) = df.column(name) else {
        if required {
            return Err(DataError::MissingColumn(name.into()));
        }
        return Ok(vec![String::new(); df.height()]);
    };
    let ca = col.str().map_err(|_| DataError::SchemaMismatch {
        column: name.into(),
        found: col.dtype().to_string(),
    })?;
    Ok(ca
        .into_iter()
        .map(|v| v.unwrap_or_default().to_string())
        .collect())
}

fn flag_column(df: &DataFrame, name: &str, default: Option<bool>) -> Result<Vec<bool>, DataError> {
    let Ok(col) = df.column(name) else {
        return match default {
            Some(flag) => Ok(vec![flag; df.height()]),
            None => Err(DataError::MissingColumn(name.into())),
        };
    };
    let raw = col.cast(&DataType::Int64).map_err(polars_err(name))?;
    let ca = raw.i64().map_err(polars_err(name))?;
    Ok(ca.into_iter().map(|v| v.unwrap_or(0) != 0).collect())
}

fn float_column(col: &Column) -> Result<Vec<f64>, DataError> {
    let name = col.name().to_string();
    let raw = col.cast(&DataType::Float64).map_err(polars_err(&name))?;
    let ca = raw.f64().map_err(polars_err(&name))?;
    Ok(ca.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
}

fn is_numeric(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Float64
            | DataType::Float32
            | DataType::Int64
            | DataType::Int32
            | DataType::Int16
            | DataType::Int8
            | DataType::UInt64
            | DataType::UInt32
            | DataType::UInt16
            | DataType::UInt8
    )
}

fn millis_to_time(ms: i64) -> Result<NaiveDateTime, DataError> {
    DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.naive_utc())
        .ok_or_else(|| DataError::ValidationError(format!("timestamp {ms} out of range")))
}

pub fn panel_from_dataframe(df: &DataFrame) -> Result<FactorPanel, DataError> {
    let times = time_millis(df)?;
    let symbols = string_column(df, "symbol", true)?;
    let symbol_spot = string_column(df, "symbol_spot", false)?;
    let symbol_swap = string_column(df, "symbol_swap", false)?;
    let is_spot = flag_column(df, "is_spot", None)?;
    let tradable = flag_column(df, "tradable", Some(true))?;
    let close_col = df
        .column("close")
        .map_err(|_| DataError::MissingColumn("close".into()))?;
    let close = float_column(close_col)?;

    let mut panel = FactorPanel::new();
    for row in 0..df.height() {
        let ms = times[row].ok_or_else(|| {
            DataError::ValidationError(format!("null candle_begin_time at row {row}"))
        })?;
        panel.push(PanelRow {
            candle_begin_time: millis_to_time(ms)?,
            symbol: symbols[row].clone(),
            is_spot: is_spot[row],
            close: close[row],
            symbol_spot: symbol_spot[row].clone(),
            symbol_swap: symbol_swap[row].clone(),
            tradable: tradable[row],
        });
    }

    for col in df.get_columns() {
        let name = col.name().as_str();
        if RESERVED.contains(&name) || !is_numeric(col.dtype()) {
            continue;
        }
        panel.set_column(name, float_column(col)?);
    }
    Ok(panel)
}

pub fn panel_to_dataframe(panel: &FactorPanel) -> Result<DataFrame, DataError> {
    let n = panel.len();
    let times: Vec<i64> = panel
        .times()
        .iter()
        .map(|t| t.and_utc().timestamp_millis())
        .collect();
    let symbols: Vec<String> = (0..n).map(|r| panel.symbol(r).to_string()).collect();
    let spot: Vec<String> = (0..n).map(|r| panel.symbol_spot(r).to_string()).collect();
    let swap: Vec<String> = (0..n).map(|r| panel.symbol_swap(r).to_string()).collect();
    let is_spot: Vec<i32> = (0..n).map(|r| panel.is_spot(r) as i32).collect();
    let tradable: Vec<i32> = (0..n).map(|r| panel.tradable(r) as i32).collect();

    let mut columns = vec![
        Column::new("candle_begin_time".into(), times),
        Column::new("symbol".into(), symbols),
        Column::new("is_spot".into(), is_spot),
        Column::new("close".into(), panel.closes().to_vec()),
        Column::new("symbol_spot".into(), spot),
        Column::new("symbol_swap".into(), swap),
        Column::new("tradable".into(), tradable),
    ];
    for name in panel.column_names() {
        if let Some(values) = panel.column(name) {
            columns.push(Column::new(name.into(), values.to_vec()));
        }
    }
    DataFrame::new(columns).map_err(polars_err("dataframe creation"))
}
