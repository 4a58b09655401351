//! Source traits and structured error types for data acquisition.
//!
//! `PriceSource` abstracts over price providers (Yahoo Finance, CSV import) and
//! `MacroSource` over providers of the Buffett indicator, so implementations
//! can be swapped, stacked behind a cache, and mocked in tests.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::series::{SeriesError, TimeSeries};

/// Structured error types for data operations.
///
/// A source that cannot deliver says so with one of these; it never returns an
/// empty or zero-filled series in place of an error.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("{provider} unavailable: {reason}")]
    Unavailable { provider: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("malformed series: {0}")]
    Series(#[from] SeriesError),
}

impl From<csv::Error> for DataError {
    fn from(e: csv::Error) -> Self {
        DataError::Parse(e.to_string())
    }
}

/// Where a series came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    YahooFinance,
    CsvImport,
    Fred,
    Synthetic,
}

/// Daily closing prices for one symbol.
pub trait PriceSource: Send + Sync {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    fn kind(&self) -> DataSource;

    /// Adjusted closing prices for `symbol` within `[start, end]`.
    fn fetch_close(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<TimeSeries, DataError>;
}

/// Market capitalization to GDP ("Buffett indicator").
pub trait MacroSource: Send + Sync {
    fn name(&self) -> &str;

    /// Ratio series within `[start, end]`, as a fraction (1.0 = 100%).
    fn fetch_ratio(&self, start: NaiveDate, end: NaiveDate) -> Result<TimeSeries, DataError>;
}

impl<S: PriceSource + ?Sized> PriceSource for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn kind(&self) -> DataSource {
        (**self).kind()
    }

    fn fetch_close(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<TimeSeries, DataError> {
        (**self).fetch_close(symbol, start, end)
    }
}

impl<M: MacroSource + ?Sized> MacroSource for Box<M> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn fetch_ratio(&self, start: NaiveDate, end: NaiveDate) -> Result<TimeSeries, DataError> {
        (**self).fetch_ratio(start, end)
    }
}
