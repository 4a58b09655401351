//! CSV import price source.
//!
//! Layout: `{dir}/{SYMBOL}.csv` with a `date,close` header. Empty close cells
//! are read as missing (`NaN`). Rows must be in ascending date order.

use super::provider::{DataError, DataSource, PriceSource};
use crate::series::TimeSeries;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize, Deserialize)]
struct CloseRecord {
    date: NaiveDate,
    close: Option<f64>,
}

/// Reads closing prices from per-symbol CSV files.
#[derive(Debug, Clone)]
pub struct CsvPriceSource {
    dir: PathBuf,
}

impl CsvPriceSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path for a symbol: `{dir}/{SYMBOL}.csv`.
    pub fn path_for(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", symbol.to_uppercase()))
    }
}

impl PriceSource for CsvPriceSource {
    fn name(&self) -> &str {
        "csv_import"
    }

    fn kind(&self) -> DataSource {
        DataSource::CsvImport
    }

    fn fetch_close(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<TimeSeries, DataError> {
        let path = self.path_for(symbol);
        if !path.exists() {
            return Err(DataError::SymbolNotFound {
                symbol: symbol.to_string(),
            });
        }
        let series = read_prices_csv(&path, symbol)?.between(start, end);
        if series.is_empty() {
            return Err(DataError::Unavailable {
                provider: self.name().into(),
                reason: format!("{} has no rows between {start} and {end}", path.display()),
            });
        }
        Ok(series)
    }
}

/// Read a `date,close` CSV into a series named `name`.
pub fn read_prices_csv(path: &Path, name: &str) -> Result<TimeSeries, DataError> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut points = Vec::new();
    for record in reader.deserialize() {
        let record: CloseRecord = record?;
        points.push((record.date, record.close.unwrap_or(f64::NAN)));
    }
    Ok(TimeSeries::from_pairs(name, points)?)
}

/// Write a series as a `date,close` CSV, creating parent directories.
/// Missing values are written as empty cells.
pub fn write_prices_csv(path: &Path, series: &TimeSeries) -> Result<(), DataError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    for (date, value) in series.iter() {
        writer.serialize(CloseRecord {
            date,
            close: (!value.is_nan()).then_some(value),
        })?;
    }
    writer.flush()?;
    Ok(())
}
