//! FRED macro source for the Buffett indicator (market capitalization / GDP).
//!
//! Two fetch modes:
//! - With an API key: the `fred/series/observations` JSON endpoint.
//! - Without one: the public `fredgraph.csv` download.
//!
//! GDP is quarterly, so each market observation is divided by the most recent
//! GDP print at or before its date (as-of join).

use super::provider::{DataError, MacroSource};
use crate::series::TimeSeries;
use chrono::{Duration as Days, NaiveDate};
use log::debug;
use serde::Deserialize;
use std::time::Duration;

/// Wilshire 5000 full-cap price index (≈ total market cap, billions USD).
pub const WILSHIRE_5000: &str = "WILL5000INDFC";
/// Nonfinancial corporate equities at market value (millions USD, quarterly).
pub const CORPORATE_EQUITIES: &str = "NCBEILQ027S";
/// Nominal GDP (billions USD, quarterly, SAAR).
pub const GDP: &str = "GDP";

const API_URL: &str = "https://api.stlouisfed.org/fred/series/observations";
const GRAPH_URL: &str = "https://fred.stlouisfed.org/graph/fredgraph.csv";

#[derive(Debug, Deserialize)]
struct ObservationsResponse {
    observations: Vec<Observation>,
}

#[derive(Debug, Deserialize)]
struct Observation {
    date: NaiveDate,
    value: String,
}

/// Buffett indicator from two FRED series.
pub struct FredProvider {
    client: reqwest::blocking::Client,
    api_key: Option<String>,
    market_series: String,
    /// Multiplier bringing the market series to GDP units (billions).
    market_scale: f64,
    name: String,
}

impl FredProvider {
    /// Wilshire 5000 over GDP.
    pub fn new(api_key: Option<String>) -> Result<Self, DataError> {
        Self::with_market_series(api_key, WILSHIRE_5000, 1.0)
    }

    /// Nonfinancial corporate equities over GDP.
    pub fn corporate_equities(api_key: Option<String>) -> Result<Self, DataError> {
        Self::with_market_series(api_key, CORPORATE_EQUITIES, 1e-3)
    }

    pub fn with_market_series(
        api_key: Option<String>,
        market_series: &str,
        market_scale: f64,
    ) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| DataError::NetworkUnreachable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            market_series: market_series.to_string(),
            market_scale,
            name: format!("fred:{market_series}/{GDP}"),
        })
    }

    /// Observations of one series within `[start, end]`; missing prints skipped.
    pub fn fetch_series(
        &self,
        series_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<TimeSeries, DataError> {
        let points = match &self.api_key {
            Some(key) => self.fetch_json(series_id, key, start, end)?,
            None => self.fetch_csv(series_id, start, end)?,
        };
        if points.is_empty() {
            return Err(DataError::Unavailable {
                provider: self.name.clone(),
                reason: format!("no observations for {series_id} between {start} and {end}"),
            });
        }
        Ok(TimeSeries::from_pairs(series_id, points)?)
    }

    fn fetch_json(
        &self,
        series_id: &str,
        api_key: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<(NaiveDate, f64)>, DataError> {
        let start = start.to_string();
        let end = end.to_string();
        let resp = self
            .client
            .get(API_URL)
            .query(&[
                ("series_id", series_id),
                ("api_key", api_key),
                ("file_type", "json"),
                ("observation_start", start.as_str()),
                ("observation_end", end.as_str()),
            ])
            .send()
            .map_err(|e| DataError::NetworkUnreachable(e.to_string()))?;
        self.check_status(series_id, resp.status())?;

        let body: ObservationsResponse = resp
            .json()
            .map_err(|e| DataError::ResponseFormatChanged(format!("FRED {series_id}: {e}")))?;
        Ok(body
            .observations
            .into_iter()
            .filter_map(|o| parse_value(&o.value).map(|v| (o.date, v)))
            .collect())
    }

    fn fetch_csv(
        &self,
        series_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<(NaiveDate, f64)>, DataError> {
        let start = start.to_string();
        let end = end.to_string();
        let resp = self
            .client
            .get(GRAPH_URL)
            .query(&[
                ("id", series_id),
                ("cosd", start.as_str()),
                ("coed", end.as_str()),
            ])
            .send()
            .map_err(|e| DataError::NetworkUnreachable(e.to_string()))?;
        self.check_status(series_id, resp.status())?;

        let text = resp
            .text()
            .map_err(|e| DataError::NetworkUnreachable(e.to_string()))?;
        parse_graph_csv(&text)
    }

    fn check_status(&self, series_id: &str, status: reqwest::StatusCode) -> Result<(), DataError> {
        if status.is_success() {
            return Ok(());
        }
        Err(match status {
            reqwest::StatusCode::TOO_MANY_REQUESTS => DataError::RateLimited {
                retry_after_secs: 60,
            },
            reqwest::StatusCode::BAD_REQUEST
            | reqwest::StatusCode::UNAUTHORIZED
            | reqwest::StatusCode::FORBIDDEN
                if self.api_key.is_some() =>
            {
                DataError::AuthenticationRequired(format!("FRED rejected the API key (HTTP {status})"))
            }
            reqwest::StatusCode::NOT_FOUND => DataError::SymbolNotFound {
                symbol: series_id.to_string(),
            },
            _ => DataError::Unavailable {
                provider: self.name.clone(),
                reason: format!("HTTP {status} for {series_id}"),
            },
        })
    }
}

impl MacroSource for FredProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch_ratio(&self, start: NaiveDate, end: NaiveDate) -> Result<TimeSeries, DataError> {
        let market = self.fetch_series(&self.market_series, start, end)?;
        // reach back far enough that the first market date has a GDP print
        let gdp = self.fetch_series(GDP, start - Days::days(190), end)?;
        debug!(
            "fred: {} market points, {} GDP points",
            market.len(),
            gdp.len()
        );

        let scale = self.market_scale;
        let scaled = TimeSeries::from_pairs(
            market.name(),
            market.iter().map(|(d, v)| (d, v * scale)),
        )?;
        let ratio = buffett_ratio(&scaled, &gdp);
        if ratio.is_empty() {
            return Err(DataError::Unavailable {
                provider: self.name.clone(),
                reason: "market and GDP series do not overlap".into(),
            });
        }
        Ok(ratio)
    }
}

/// Market value divided by the latest GDP at or before each market date.
///
/// Market dates before the first GDP print are dropped, as are non-positive
/// GDP values.
pub fn buffett_ratio(market: &TimeSeries, gdp: &TimeSeries) -> TimeSeries {
    let gdp = gdp.filter(|v| v.is_finite() && v > 0.0);
    let mut cursor = 0;
    let mut latest: Option<f64> = None;
    let mut points = Vec::with_capacity(market.len());

    for (date, value) in market.iter() {
        while cursor < gdp.len() && gdp.dates()[cursor] <= date {
            latest = Some(gdp.values()[cursor]);
            cursor += 1;
        }
        if let Some(g) = latest {
            if value.is_finite() {
                points.push((date, value / g));
            }
        }
    }

    let (dates, values) = points.into_iter().unzip();
    TimeSeries::derived("buffett_ratio", dates, values)
}

/// Parse a `fredgraph.csv` body: a date column then a value column.
fn parse_graph_csv(text: &str) -> Result<Vec<(NaiveDate, f64)>, DataError> {
    let mut reader = csv::Reader::from_reader(text.as_bytes());
    let mut points = Vec::new();
    for record in reader.records() {
        let record = record?;
        let (Some(date), Some(value)) = (record.get(0), record.get(1)) else {
            return Err(DataError::ResponseFormatChanged(
                "fredgraph.csv row has fewer than two columns".into(),
            ));
        };
        let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
            .map_err(|e| DataError::Parse(format!("bad FRED date '{date}': {e}")))?;
        if let Some(v) = parse_value(value) {
            points.push((date, v));
        }
    }
    Ok(points)
}

/// FRED writes "." (or nothing) for a missing observation.
fn parse_value(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn ratio_uses_latest_gdp_as_of_each_date() {
        let market = TimeSeries::new(
            "m",
            vec![d(2023, 12, 29), d(2024, 1, 2), d(2024, 3, 28), d(2024, 4, 1)],
            vec![40_000.0, 41_000.0, 44_000.0, 45_000.0],
        )
        .unwrap();
        let gdp = TimeSeries::new("GDP", vec![d(2024, 1, 1), d(2024, 4, 1)], vec![28_000.0, 29_000.0])
            .unwrap();

        let r = buffett_ratio(&market, &gdp);
        assert_eq!(r.dates(), &[d(2024, 1, 2), d(2024, 3, 28), d(2024, 4, 1)]);
        assert!((r.values()[0] - 41_000.0 / 28_000.0).abs() < 1e-12);
        assert!((r.values()[1] - 44_000.0 / 28_000.0).abs() < 1e-12);
        assert!((r.values()[2] - 45_000.0 / 29_000.0).abs() < 1e-12);
        assert_eq!(r.name(), "buffett_ratio");
    }

    #[test]
    fn graph_csv_skips_missing_marks() {
        let body = "observation_date,GDP\n2023-10-01,27956.998\n2024-01-01,.\n2024-04-01,28629.153\n";
        let points = parse_graph_csv(body).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].0, d(2024, 4, 1));
    }

    #[test]
    fn graph_csv_rejects_bad_dates() {
        assert!(parse_graph_csv("DATE,GDP\nyesterday,1.0\n").is_err());
    }

    #[test]
    fn missing_value_markers() {
        assert_eq!(parse_value("."), None);
        assert_eq!(parse_value(""), None);
        assert_eq!(parse_value(" 1.5 "), Some(1.5));
    }

    #[test]
    fn blank_api_key_means_keyless() {
        let p = FredProvider::new(Some("  ".into())).unwrap();
        assert!(p.api_key.is_none());
        assert_eq!(p.name(), "fred:WILL5000INDFC/GDP");
    }
}
