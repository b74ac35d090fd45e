//! Factor panel storage, Parquet I/O, daily resampling and universe preparation.

pub mod io;
pub mod panel;
pub mod resample;
pub mod universe;

pub use io::{read_panel, write_panel};
pub use panel::{FactorPanel, PanelRow};
pub use resample::{day_start, is_day_start, resample_daily};
pub use universe::{is_trade_symbol, UniverseFilter, STABLE_SYMBOLS};

use thiserror::Error;

/// Structured error types for panel loading.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("missing required column '{0}'")]
    MissingColumn(String),

    #[error("column '{column}' has unexpected type {found}")]
    SchemaMismatch { column: String, found: String },

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("parquet I/O error: {0}")]
    ParquetError(String),
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{Duration, NaiveDate, NaiveDateTime};

    /// 2024-01-01 00:00 plus `h` hours.
    pub fn hour(h: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + Duration::hours(h)
    }
}
