//! Data acquisition: price and macro sources, CSV import, TTL cache.

pub mod cache;
pub mod csv_source;
pub mod fred;
pub mod provider;
pub mod yahoo;

pub use cache::{
    CachedMacroSource, CachedPriceSource, FallbackMacroSource, FetchCache, FetchKey, DEFAULT_TTL,
};
pub use csv_source::{read_prices_csv, write_prices_csv, CsvPriceSource};
pub use fred::{buffett_ratio, FredProvider};
pub use provider::{DataError, DataSource, MacroSource, PriceSource};
pub use yahoo::YahooProvider;

use chrono::NaiveDate;
use log::info;

use crate::series::PriceFrame;

/// Fetch every symbol from `source` and align them on the union of dates.
///
/// Fails on the first symbol that cannot be fetched.
pub fn load_price_frame<S: AsRef<str>>(
    source: &dyn PriceSource,
    symbols: &[S],
    start: NaiveDate,
    end: NaiveDate,
) -> Result<PriceFrame, DataError> {
    let series = symbols
        .iter()
        .map(|symbol| {
            let s = source.fetch_close(symbol.as_ref(), start, end)?;
            info!("{}: {} closes from {}", symbol.as_ref(), s.len(), source.name());
            Ok(s.renamed(symbol.as_ref()))
        })
        .collect::<Result<Vec<_>, DataError>>()?;
    Ok(PriceFrame::align(&series)?)
}
