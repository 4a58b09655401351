//! Trend estimation on raw price sequences.
//!
//! Two trend models are supported:
//! - Log-linear: least-squares line through `(t, ln price)`, exponentiated back
//!   to price space. Its slope is the per-period log drift.
//! - Moving average: trailing mean with a minimum-period floor of 1, so the
//!   first `window − 1` points average whatever history exists (a front-loaded
//!   bias, not a bug).
//!
//! Plus the derived readings the dashboard shows next to a trend: percent
//! distance from trend and the waiting time until price crosses back.

use serde::{Deserialize, Serialize};

use crate::error::EstimationError;
use crate::series::TimeSeries;
use crate::stats::TRADING_DAYS;

/// Which trend model to fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendModel {
    /// Exponential fit (log-linear regression), the CAGR reading of the price.
    LogLinear,
    /// Simple moving average over the configured window.
    MovingAverage,
}

/// A fitted log-linear trend.
#[derive(Debug, Clone, Serialize)]
pub struct LogTrendFit {
    /// Fitted `ln(price)` at the first clean observation.
    pub intercept: f64,
    /// Fitted log drift per period.
    pub slope: f64,
    /// `exp(intercept + slope·t)` on the cleaned index.
    pub trend: TimeSeries,
}

impl LogTrendFit {
    /// Compound annual growth implied by the slope, as a fraction.
    pub fn annualized_growth(&self) -> f64 {
        (self.slope * TRADING_DAYS).exp() - 1.0
    }
}

/// Fit `ln(price) = a + b·t` by ordinary least squares.
///
/// Missing values are dropped first, as are non-positive prices, whose
/// logarithm is undefined. The time index counts clean observations, so a
/// calendar gap is not treated as elapsed time.
pub fn log_trend_fit(prices: &TimeSeries) -> Result<LogTrendFit, EstimationError> {
    let clean = prices.filter(|p| p.is_finite() && p > 0.0);
    let n = clean.len();
    if n < 2 {
        return Err(EstimationError::InsufficientData {
            required: 2,
            actual: n,
        });
    }

    let ys: Vec<f64> = clean.values().iter().map(|p| p.ln()).collect();
    let x_mean = (n - 1) as f64 / 2.0;
    let y_mean = ys.iter().sum::<f64>() / n as f64;

    let mut sxy = 0.0;
    let mut sxx = 0.0;
    for (i, y) in ys.iter().enumerate() {
        let dx = i as f64 - x_mean;
        sxy += dx * (y - y_mean);
        sxx += dx * dx;
    }
    let slope = sxy / sxx;
    let intercept = y_mean - slope * x_mean;

    let values = (0..n)
        .map(|i| (intercept + slope * i as f64).exp())
        .collect();
    let trend = TimeSeries::derived("log_trend", clean.dates().to_vec(), values);

    Ok(LogTrendFit {
        intercept,
        slope,
        trend,
    })
}

/// Log-linear trend line aligned to the NaN-dropped price index.
pub fn log_trend(prices: &TimeSeries) -> Result<TimeSeries, EstimationError> {
    log_trend_fit(prices).map(|fit| fit.trend)
}

/// Trailing simple moving average with a minimum-period floor of 1.
///
/// `NaN` inputs are skipped inside a window; a window with no valid value
/// yields `NaN`. Output is aligned index-for-index with the input.
pub fn smooth_trend(prices: &TimeSeries, window: usize) -> Result<TimeSeries, EstimationError> {
    if window == 0 {
        return Err(EstimationError::invalid("window", "must be >= 1"));
    }

    let values = prices.values();
    let smoothed = (0..values.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            let (sum, count) = values[start..=i]
                .iter()
                .filter(|v| !v.is_nan())
                .fold((0.0, 0usize), |(s, c), &v| (s + v, c + 1));
            if count == 0 {
                f64::NAN
            } else {
                sum / count as f64
            }
        })
        .collect();

    Ok(TimeSeries::derived(
        "smooth_trend",
        prices.dates().to_vec(),
        smoothed,
    ))
}

/// Fit the configured trend model.
pub fn fit_trend(
    prices: &TimeSeries,
    model: TrendModel,
    window: usize,
) -> Result<TimeSeries, EstimationError> {
    match model {
        TrendModel::LogLinear => log_trend(prices),
        TrendModel::MovingAverage => smooth_trend(prices, window),
    }
}

/// Percent distance of price from trend: `(price − trend) / trend × 100`.
///
/// Computed on the dates present in both series. A zero trend value yields an
/// infinite or `NaN` entry, which is passed through rather than masked.
pub fn pct_distance(prices: &TimeSeries, trend: &TimeSeries) -> TimeSeries {
    let (dates, values) = paired(prices, trend)
        .map(|(date, p, t)| (date, (p - t) / t * 100.0))
        .unzip();
    TimeSeries::derived("pct_distance", dates, values)
}

/// Most recent percent distance from trend, the dashboard's headline number.
pub fn latest_distance(prices: &TimeSeries, trend: &TimeSeries) -> Option<f64> {
    pct_distance(prices, trend).last().map(|(_, v)| v)
}

/// Lengths of consecutive runs where price stays on one side of the trend.
///
/// Runs are returned in time order. "Above" is strict; a missing price counts
/// as not above. The durations sum to the number of compared dates.
pub fn time_to_reversion(prices: &TimeSeries, trend: &TimeSeries) -> Vec<usize> {
    let mut durations = Vec::new();
    let mut current: Option<(bool, usize)> = None;

    for (_, p, t) in paired(prices, trend) {
        let above = p > t;
        current = match current {
            Some((side, len)) if side == above => Some((side, len + 1)),
            Some((_, len)) => {
                durations.push(len);
                Some((above, 1))
            }
            None => Some((above, 1)),
        };
    }
    if let Some((_, len)) = current {
        durations.push(len);
    }
    durations
}

/// Maximum-likelihood rate of an exponential fit to waiting times: `1 / mean`.
///
/// `None` when there is nothing to fit.
pub fn fit_exponential_waiting_time(durations: &[usize]) -> Option<f64> {
    if durations.is_empty() {
        return None;
    }
    let mean = durations.iter().sum::<usize>() as f64 / durations.len() as f64;
    (mean > 0.0).then(|| 1.0 / mean)
}

/// Merge-join two series on their common dates.
fn paired<'a>(
    left: &'a TimeSeries,
    right: &'a TimeSeries,
) -> impl Iterator<Item = (chrono::NaiveDate, f64, f64)> + 'a {
    right
        .iter()
        .filter_map(move |(date, r)| left.get(date).map(|l| (date, l, r)))
}
