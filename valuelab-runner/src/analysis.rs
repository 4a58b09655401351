//! Analysis orchestration: from loaded prices to a full valuation and risk
//! report.
//!
//! One call runs every estimator on the same return stream:
//! 1. Trend of the price (single ticker) or wealth index (basket), distance
//!    from trend and reversion waiting times
//! 2. Bootstrap intervals for the Sharpe ratio and the mean return
//! 3. Rolling and regime-conditioned Sharpe
//! 4. Rolling bootstrap band of the mean return
//! 5. Normal and Student-t fits of the return distribution
//! 6. Buffett indicator, when a macro source is given
//!
//! Degenerate sub-results (zero volatility, too few points for a fit) become
//! warnings in the report, never errors.

use chrono::NaiveDate;
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;
use valuelab_core::bootstrap::SharpeVerdict;
use valuelab_core::data::{DataSource, MacroSource};
use valuelab_core::risk::{annualized_sharpe, daily_risk_free};
use valuelab_core::{
    bootstrap_ci, bootstrap_sharpe, fit_exponential_waiting_time, fit_return_distribution,
    fit_trend, log_trend_fit, pct_distance, portfolio_returns, regime_conditioned_sharpe, returns,
    rolling_bootstrap_ci, rolling_sharpe, time_to_reversion, ConfidenceInterval, DistributionFit,
    EstimationError, RegimeSharpe, RngHierarchy, RollingInterval, SeriesError, SharpeInterval,
    TimeSeries, TrendModel, Weights,
};

use crate::config::{AnalysisConfig, ConfigError, Fingerprint};
use crate::data_loader::LoadedData;

/// Current schema version for persisted reports.
pub const SCHEMA_VERSION: u32 = 1;

/// RNG streams, one per single-sample bootstrap.
const SHARPE_STREAM: &str = "sharpe";
const MEAN_STREAM: &str = "mean_return";

/// Errors from running an analysis.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("estimation error: {0}")]
    Estimation(#[from] EstimationError),

    #[error("series error: {0}")]
    Series(#[from] SeriesError),
}

// ─── Report ──────────────────────────────────────────────────────────

/// Everything one analysis run produces.
///
/// Full series are kept in [`ReportSeries`], which is exported as CSV rather
/// than embedded in the JSON report.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub schema_version: u32,
    pub fingerprint: Fingerprint,
    pub dataset_hash: String,
    pub config: AnalysisConfig,
    pub sources: BTreeMap<String, DataSource>,
    pub synthetic: bool,
    pub weights_used: Weights,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub trend: TrendSummary,
    pub returns: ReturnSummary,
    pub sharpe: Option<SharpeSummary>,
    pub mean_return: ConfidenceInterval,
    pub latest_rolling_sharpe: Option<f64>,
    pub regime_sharpe: RegimeSharpe,
    pub rolling_band: RollingBandSummary,
    pub distribution: DistributionFit,
    pub buffett: Option<BuffettSummary>,
    pub warnings: Vec<String>,
    #[serde(skip)]
    pub series: ReportSeries,
}

/// Full series behind the report, for charting.
#[derive(Debug, Clone)]
pub struct ReportSeries {
    /// Price (single ticker) or wealth index (basket) the trend was fitted on.
    pub level: TimeSeries,
    pub trend: TimeSeries,
    pub pct_distance: TimeSeries,
    pub returns: TimeSeries,
    pub rolling_sharpe: TimeSeries,
    pub rolling_band: Vec<RollingInterval>,
    pub buffett: Option<TimeSeries>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrendSummary {
    pub model: TrendModel,
    /// Name of the fitted level series: the ticker or `wealth_index`.
    pub fitted_on: String,
    pub latest_level: Option<f64>,
    pub latest_trend: Option<f64>,
    /// Percent distance of the latest level from trend.
    pub latest_distance_pct: Option<f64>,
    /// Per-day log slope, log-linear model only.
    pub log_slope: Option<f64>,
    /// Compound annual growth implied by the slope, log-linear model only.
    pub annualized_growth: Option<f64>,
    pub reversion: ReversionSummary,
}

/// Waiting times between crossings of the trend.
#[derive(Debug, Clone, Serialize)]
pub struct ReversionSummary {
    pub runs: usize,
    pub mean_duration: Option<f64>,
    /// Exponential waiting-time rate, `1 / mean_duration`.
    pub exponential_rate: Option<f64>,
    /// Length of the run still in progress.
    pub current_run: Option<usize>,
    pub currently_above: Option<bool>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ReturnSummary {
    pub observations: usize,
    pub mean_daily: f64,
    pub std_daily: f64,
    /// Point estimate of the annualized Sharpe ratio.
    pub annualized_sharpe: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct SharpeSummary {
    pub daily: SharpeInterval,
    pub annualized: SharpeInterval,
    pub verdict: SharpeVerdict,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct RollingBandSummary {
    pub window: usize,
    pub records: usize,
    pub latest: Option<RollingInterval>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BuffettSummary {
    pub source: String,
    pub observations: usize,
    pub latest_date: NaiveDate,
    pub latest_ratio: f64,
    pub mean_ratio: f64,
}

// ─── Orchestration ───────────────────────────────────────────────────

/// Run every estimator over `data` as configured.
///
/// `macro_source` is only consulted when the Buffett indicator is enabled. A
/// macro fetch failure becomes a warning; estimation failures are errors.
pub fn run_analysis(
    config: &AnalysisConfig,
    data: &LoadedData,
    macro_source: Option<&dyn MacroSource>,
) -> Result<AnalysisReport, AnalysisError> {
    config.validate()?;
    let mut warnings = Vec::new();
    if data.has_synthetic {
        warnings.push("one or more tickers use synthetic prices".to_string());
    }

    // Returns
    let weights = config.weights()?;
    let asset_returns = returns(&data.frame)?;
    let portfolio = portfolio_returns(&asset_returns, &weights)?;
    let port = portfolio.series.clone();
    info!(
        "analysis: {} returns over {} assets",
        port.len(),
        portfolio.weights_used.len()
    );

    // Trend
    let level = trend_level(config, data, &port)?;
    let trend = fit_trend(&level, config.trend.model, config.trend.smooth_window)?;
    let distance = pct_distance(&level, &trend);
    let trend_summary = summarize_trend(config.trend.model, &level, &trend, &distance)?;

    // Sharpe and mean intervals
    let values: Vec<f64> = port.values().iter().copied().filter(|v| !v.is_nan()).collect();
    let rf_daily = daily_risk_free(config.risk.risk_free_rate);
    let hierarchy = RngHierarchy::new(config.bootstrap.seed);

    let sharpe = bootstrap_sharpe(
        &values,
        config.bootstrap.sharpe_resamples,
        rf_daily,
        &mut hierarchy.rng_for(SHARPE_STREAM, 0),
    )?
    .map(|daily| SharpeSummary {
        daily,
        annualized: daily.annualized(),
        verdict: daily.verdict(),
    });
    if sharpe.is_none() {
        warnings.push("Sharpe interval undefined: returns have zero volatility".to_string());
    }

    let mean_return = bootstrap_ci(
        &values,
        config.bootstrap.mean_resamples,
        config.bootstrap.alpha,
        &mut hierarchy.rng_for(MEAN_STREAM, 0),
    )?;

    let return_summary = ReturnSummary {
        observations: values.len(),
        mean_daily: valuelab_core::stats::mean(&values),
        std_daily: valuelab_core::stats::sample_std(&values),
        annualized_sharpe: annualized_sharpe(&values, rf_daily),
    };

    // Rolling and regime Sharpe
    let rolling = rolling_sharpe(&port, config.risk.risk_free_rate, config.risk.sharpe_window)?;
    let latest_rolling_sharpe = rolling.last().map(|(_, v)| v).filter(|v| v.is_finite());
    let regime_sharpe =
        regime_conditioned_sharpe(&port, config.risk.risk_free_rate, config.risk.regime_vol_window)?;
    if regime_sharpe.is_undefined() {
        warnings.push("regime Sharpe undefined: volatility too flat or too few points".to_string());
    }

    // Rolling band
    let window = config.bootstrap.rolling_window;
    let band = rolling_bootstrap_ci(&port, window, &config.bootstrap.rolling_config())?;
    if band.is_empty() {
        warnings.push(format!(
            "rolling band empty: {} returns do not exceed the {window}-day window",
            port.len()
        ));
    }
    let rolling_band = RollingBandSummary {
        window,
        records: band.len(),
        latest: band.last().copied(),
    };

    // Distribution
    let distribution = fit_return_distribution(&values);
    match &distribution {
        DistributionFit::InsufficientData { observations } => warnings.push(format!(
            "distribution fit skipped: {observations} returns, need {}",
            valuelab_core::distribution::MIN_FIT_OBSERVATIONS
        )),
        DistributionFit::Fitted(report) if !report.student_t.is_converged() => {
            warnings.push("Student-t fit did not converge".to_string())
        }
        DistributionFit::Fitted(_) => {}
    }

    // Buffett indicator
    let (buffett, buffett_series) = match macro_source.filter(|_| config.data.buffett) {
        Some(source) => match fetch_buffett(source, data) {
            Ok(Some((summary, series))) => (Some(summary), Some(series)),
            Ok(None) => {
                warnings.push("Buffett indicator: no observations in range".to_string());
                (None, None)
            }
            Err(e) => {
                warn!("Buffett indicator unavailable: {e}");
                warnings.push(format!("Buffett indicator unavailable: {e}"));
                (None, None)
            }
        },
        None => (None, None),
    };

    for w in &warnings {
        debug!("warning: {w}");
    }

    Ok(AnalysisReport {
        schema_version: SCHEMA_VERSION,
        fingerprint: config.fingerprint(),
        dataset_hash: data.dataset_hash.clone(),
        config: config.redacted(),
        sources: data.sources.clone(),
        synthetic: data.has_synthetic,
        weights_used: portfolio.weights_used,
        first_date: data.frame.dates().first().copied(),
        last_date: data.frame.dates().last().copied(),
        trend: trend_summary,
        returns: return_summary,
        sharpe,
        mean_return,
        latest_rolling_sharpe,
        regime_sharpe,
        rolling_band,
        distribution,
        buffett,
        warnings,
        series: ReportSeries {
            level,
            trend,
            pct_distance: distance,
            returns: port,
            rolling_sharpe: rolling,
            rolling_band: band,
            buffett: buffett_series,
        },
    })
}

/// Series the trend is fitted on: the ticker's own closes, or for a basket a
/// wealth index compounded from the portfolio returns and starting at 100.
fn trend_level(
    config: &AnalysisConfig,
    data: &LoadedData,
    port: &TimeSeries,
) -> Result<TimeSeries, AnalysisError> {
    if let [ticker] = config.portfolio.tickers.as_slice() {
        if let Some(prices) = data.frame.series(ticker) {
            return Ok(prices.dropna());
        }
    }
    Ok(wealth_index(port)?)
}

/// Compound returns onto a base of 100. The base itself is not a point: the
/// first value is `100 × (1 + r₀)`.
pub fn wealth_index(returns: &TimeSeries) -> Result<TimeSeries, SeriesError> {
    let mut level = 100.0;
    TimeSeries::from_pairs(
        "wealth_index",
        returns.iter().map(|(date, r)| {
            level *= 1.0 + r;
            (date, level)
        }),
    )
}

fn summarize_trend(
    model: TrendModel,
    level: &TimeSeries,
    trend: &TimeSeries,
    distance: &TimeSeries,
) -> Result<TrendSummary, AnalysisError> {
    let (log_slope, annualized_growth) = match model {
        TrendModel::LogLinear => {
            let fit = log_trend_fit(level)?;
            (Some(fit.slope), Some(fit.annualized_growth()))
        }
        TrendModel::MovingAverage => (None, None),
    };

    let durations = time_to_reversion(level, trend);
    let mean_duration = (!durations.is_empty())
        .then(|| durations.iter().sum::<usize>() as f64 / durations.len() as f64);

    let latest_trend = trend.last().map(|(_, v)| v);
    let latest_level = trend
        .last()
        .and_then(|(date, _)| level.get(date))
        .or_else(|| level.last().map(|(_, v)| v));

    Ok(TrendSummary {
        model,
        fitted_on: level.name().to_string(),
        latest_level,
        latest_trend,
        latest_distance_pct: distance.last().map(|(_, v)| v),
        log_slope,
        annualized_growth,
        reversion: ReversionSummary {
            runs: durations.len(),
            mean_duration,
            exponential_rate: fit_exponential_waiting_time(&durations),
            current_run: durations.last().copied(),
            currently_above: latest_level.zip(latest_trend).map(|(p, t)| p > t),
        },
    })
}

fn fetch_buffett(
    source: &dyn MacroSource,
    data: &LoadedData,
) -> Result<Option<(BuffettSummary, TimeSeries)>, valuelab_core::data::DataError> {
    let (Some(&start), Some(&end)) = (data.frame.dates().first(), data.frame.dates().last())
    else {
        return Ok(None);
    };
    let ratio = source.fetch_ratio(start, end)?.dropna();
    let Some((latest_date, latest_ratio)) = ratio.last() else {
        return Ok(None);
    };
    let summary = BuffettSummary {
        source: source.name().to_string(),
        observations: ratio.len(),
        latest_date,
        latest_ratio,
        mean_ratio: valuelab_core::stats::mean(ratio.values()),
    };
    Ok(Some((summary, ratio)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_loader::{load_prices, LoadOptions};
    use valuelab_core::data::DataError;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn small_config(tickers: &[&str]) -> AnalysisConfig {
        let mut config = AnalysisConfig::default();
        config.portfolio.tickers = tickers.iter().map(|t| t.to_string()).collect();
        config.portfolio.start = Some(d(2022, 1, 3));
        config.portfolio.end = Some(d(2023, 12, 29));
        config.bootstrap.sharpe_resamples = 200;
        config.bootstrap.mean_resamples = 200;
        config.bootstrap.rolling_resamples = 100;
        config
    }

    fn synthetic(config: &AnalysisConfig) -> LoadedData {
        let opts = LoadOptions {
            start: config.portfolio.start.unwrap(),
            end: config.portfolio.end.unwrap(),
            offline: true,
            synthetic: true,
            seed: 42,
        };
        load_prices(&config.portfolio.tickers, None, &opts).unwrap()
    }

    struct FixedRatio;

    impl MacroSource for FixedRatio {
        fn name(&self) -> &str {
            "fixed"
        }

        fn fetch_ratio(&self, start: NaiveDate, _end: NaiveDate) -> Result<TimeSeries, DataError> {
            let dates = vec![start, start + chrono::Duration::days(90)];
            Ok(TimeSeries::new("ratio", dates, vec![1.5, 1.7])?)
        }
    }

    struct Down;

    impl MacroSource for Down {
        fn name(&self) -> &str {
            "down"
        }

        fn fetch_ratio(&self, _: NaiveDate, _: NaiveDate) -> Result<TimeSeries, DataError> {
            Err(DataError::NetworkUnreachable("offline".into()))
        }
    }

    #[test]
    fn single_ticker_report_is_complete() {
        let config = small_config(&["SPY"]);
        let data = synthetic(&config);
        let report = run_analysis(&config, &data, None).unwrap();

        assert_eq!(report.trend.fitted_on, "SPY");
        assert!(report.trend.log_slope.is_some());
        assert!(report.trend.latest_distance_pct.is_some());
        assert!(report.sharpe.is_some());
        assert!(report.mean_return.lower <= report.mean_return.upper);
        assert_eq!(
            report.rolling_band.records,
            report.series.returns.len() - config.bootstrap.rolling_window
        );
        assert!(report.distribution.report().is_some());
        assert!(report.synthetic);
        assert!(report.buffett.is_none());
        assert_eq!(report.fingerprint, config.fingerprint());
    }

    #[test]
    fn basket_fits_trend_on_wealth_index() {
        let mut config = small_config(&["AAA", "BBB"]);
        config.portfolio.weights = Some(BTreeMap::from([
            ("AAA".to_string(), 3.0),
            ("BBB".to_string(), 1.0),
        ]));
        let data = synthetic(&config);
        let report = run_analysis(&config, &data, None).unwrap();

        assert_eq!(report.trend.fitted_on, "wealth_index");
        assert!((report.weights_used.get("AAA").unwrap() - 0.75).abs() < 1e-12);
        assert_eq!(report.series.level.len(), report.series.returns.len());
    }

    #[test]
    fn moving_average_has_no_slope() {
        let mut config = small_config(&["SPY"]);
        config.trend.model = TrendModel::MovingAverage;
        let data = synthetic(&config);
        let report = run_analysis(&config, &data, None).unwrap();
        assert!(report.trend.log_slope.is_none());
        assert!(report.trend.reversion.runs >= 1);
    }

    #[test]
    fn same_config_and_data_reproduce_report() {
        let config = small_config(&["SPY"]);
        let data = synthetic(&config);
        let a = run_analysis(&config, &data, None).unwrap();
        let b = run_analysis(&config, &data, None).unwrap();
        assert_eq!(a.mean_return, b.mean_return);
        assert_eq!(a.series.rolling_band, b.series.rolling_band);
    }

    #[test]
    fn buffett_summary_from_macro_source() {
        let config = small_config(&["SPY"]);
        let data = synthetic(&config);
        let report = run_analysis(&config, &data, Some(&FixedRatio)).unwrap();
        let buffett = report.buffett.unwrap();
        assert_eq!(buffett.observations, 2);
        assert_eq!(buffett.latest_ratio, 1.7);
        assert!((buffett.mean_ratio - 1.6).abs() < 1e-12);
    }

    #[test]
    fn macro_failure_becomes_warning() {
        let config = small_config(&["SPY"]);
        let data = synthetic(&config);
        let report = run_analysis(&config, &data, Some(&Down)).unwrap();
        assert!(report.buffett.is_none());
        assert!(report.warnings.iter().any(|w| w.contains("Buffett")));
    }

    #[test]
    fn disabled_buffett_ignores_macro_source() {
        let mut config = small_config(&["SPY"]);
        config.data.buffett = false;
        let data = synthetic(&config);
        let report = run_analysis(&config, &data, Some(&FixedRatio)).unwrap();
        assert!(report.buffett.is_none());
    }

    #[test]
    fn short_history_warns_instead_of_failing() {
        let mut config = small_config(&["SPY"]);
        config.portfolio.start = Some(d(2023, 12, 1));
        let data = synthetic(&config);
        let report = run_analysis(&config, &data, None).unwrap();
        assert_eq!(report.rolling_band.records, 0);
        assert!(matches!(
            report.distribution,
            DistributionFit::InsufficientData { .. }
        ));
        assert!(report.warnings.len() >= 2);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = small_config(&["SPY"]);
        let data = synthetic(&config);
        config.bootstrap.alpha = 2.0;
        assert!(matches!(
            run_analysis(&config, &data, None),
            Err(AnalysisError::Config(_))
        ));
    }

    #[test]
    fn wealth_index_compounds_from_100() {
        let dates = vec![d(2024, 1, 2), d(2024, 1, 3)];
        let r = TimeSeries::new("r", dates, vec![0.10, -0.10]).unwrap();
        let w = wealth_index(&r).unwrap();
        assert!((w.values()[0] - 110.0).abs() < 1e-12);
        assert!((w.values()[1] - 99.0).abs() < 1e-12);
    }
}
