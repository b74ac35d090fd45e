//! CSV export of ratio matrices, selections and lot streams.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use coinlab_core::aggregate::RatioMatrix;
use coinlab_core::domain::SelectionRow;

use crate::lots::LotStream;
use crate::pipeline::PipelineOutput;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn finish(wtr: csv::Writer<Vec<u8>>) -> Result<String> {
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Wide ratio matrix: `candle_begin_time` then one column per symbol.
pub fn export_ratio_csv(matrix: &RatioMatrix) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    let mut header = vec!["candle_begin_time".to_string()];
    header.extend(matrix.symbols().iter().cloned());
    wtr.write_record(&header)?;
    for (t, time) in matrix.times().iter().enumerate() {
        let mut record = vec![time.format(TIME_FORMAT).to_string()];
        record.extend(matrix.row(t).iter().map(|v| v.to_string()));
        wtr.write_record(&record)?;
    }
    finish(wtr)
}

/// Long-format selection table.
///
/// Columns: candle_begin_time, strategy, symbol, is_spot, symbol_swap, close,
/// direction, offset, target_alloc_ratio, cap_weight, order_first
pub fn export_selections_csv(rows: &[SelectionRow]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "candle_begin_time",
        "strategy",
        "symbol",
        "is_spot",
        "symbol_swap",
        "close",
        "direction",
        "offset",
        "target_alloc_ratio",
        "cap_weight",
        "order_first",
    ])?;
    for r in rows {
        let time = r.candle_begin_time.format(TIME_FORMAT).to_string();
        wtr.write_record([
            time.as_str(),
            &r.strategy,
            &r.symbol,
            &u8::from(r.is_spot).to_string(),
            &r.symbol_swap,
            &r.close.to_string(),
            &r.direction.as_i8().to_string(),
            &r.offset.to_string(),
            &r.target_alloc_ratio.to_string(),
            &r.cap_weight.to_string(),
            r.order_first.as_str(),
        ])?;
    }
    finish(wtr)
}

/// Lot stream in long format, one row per non-zero (tick, venue, symbol).
pub fn export_lots_csv(stream: &LotStream) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["candle_begin_time", "venue", "symbol", "lots"])?;
    for tick in &stream.ticks {
        let time = tick.time.format(TIME_FORMAT).to_string();
        for (venue, symbols, lots) in [
            ("spot", &stream.spot_symbols, &tick.spot),
            ("swap", &stream.swap_symbols, &tick.swap),
        ] {
            for (symbol, lot) in symbols.iter().zip(lots) {
                if *lot != 0 {
                    wtr.write_record([time.as_str(), venue, symbol, &lot.to_string()])?;
                }
            }
        }
    }
    finish(wtr)
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Write the pipeline artifacts into `output_dir`:
/// - `spot_ratio.csv`, `swap_ratio.csv`: final ratio matrices
/// - `selections.csv`: all strategies' selection rows
/// - `lots.csv`, `lots_summary.json`: when a lot stream is given
///
/// Returns the written paths.
pub fn save_artifacts(
    output_dir: &Path,
    output: &PipelineOutput,
    lots: Option<&LotStream>,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create {}", output_dir.display()))?;

    let all_rows: Vec<SelectionRow> = output.selections.values().flatten().cloned().collect();
    let mut files = vec![
        ("spot_ratio.csv", export_ratio_csv(&output.matrices.spot)?),
        ("swap_ratio.csv", export_ratio_csv(&output.matrices.swap)?),
        ("selections.csv", export_selections_csv(&all_rows)?),
    ];
    if let Some(stream) = lots {
        files.push(("lots.csv", export_lots_csv(stream)?));
        let summary = serde_json::to_string_pretty(&stream.summary())
            .context("failed to serialize lot summary")?;
        files.push(("lots_summary.json", summary));
    }

    let mut written = Vec::with_capacity(files.len());
    for (name, content) in files {
        let path = output_dir.join(name);
        std::fs::write(&path, content)
            .with_context(|| format!("failed to write {}", path.display()))?;
        written.push(path);
    }
    Ok(written)
}
