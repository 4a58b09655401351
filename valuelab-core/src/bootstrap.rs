//! Percentile bootstrap: confidence intervals for the mean return and the
//! Sharpe ratio, plus a rolling bootstrap band.
//!
//! Resampling is i.i.d. with replacement at the original sample size.
//! Percentiles interpolate linearly between closest ranks.
//!
//! The rolling variant seeds every window independently from
//! `RngHierarchy::sub_seed("rolling_bootstrap", i)`, so windows run in
//! parallel on rayon and the output is identical for any thread count.

use chrono::NaiveDate;
use log::debug;
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::EstimationError;
use crate::rng::RngHierarchy;
use crate::series::TimeSeries;
use crate::stats::{mean, percentile_sorted, sample_std, sort_floats, TRADING_DAYS};

/// RNG stream label for rolling windows.
pub const ROLLING_STREAM: &str = "rolling_bootstrap";

// ─── Configuration ───────────────────────────────────────────────────

/// Configuration for the percentile bootstrap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Number of resamples per interval (default 5000).
    pub n_resamples: usize,
    /// Two-sided significance level (default 0.05, a 95% interval).
    pub alpha: f64,
    /// Master seed for reproducibility.
    pub seed: u64,
    /// Upper bound on `windows × n_resamples` for the rolling variant.
    pub max_resample_budget: u64,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            n_resamples: 5000,
            alpha: 0.05,
            seed: 42,
            max_resample_budget: 50_000_000,
        }
    }
}

impl BootstrapConfig {
    pub fn validate(&self) -> Result<(), EstimationError> {
        check_resamples(self.n_resamples)?;
        check_alpha(self.alpha)
    }
}

// ─── Result types ────────────────────────────────────────────────────

/// Percentile interval around a point estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    /// Sample mean of the input.
    pub estimate: f64,
    pub lower: f64,
    pub upper: f64,
    /// Coverage level, `1 − alpha`.
    pub level: f64,
}

impl ConfidenceInterval {
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    pub fn contains(&self, value: f64) -> bool {
        self.lower <= value && value <= self.upper
    }
}

/// Whether a Sharpe interval clears zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SharpeVerdict {
    /// Lower bound at or above zero.
    Positive,
    /// Interval includes zero; risk-adjusted returns are not reliably positive.
    Unstable,
}

/// Bootstrap distribution summary of the per-period Sharpe ratio.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SharpeInterval {
    /// Mean of the valid bootstrap Sharpe draws.
    pub mean: f64,
    /// 5th percentile.
    pub lower: f64,
    /// 95th percentile.
    pub upper: f64,
    /// Draws kept after discarding zero-volatility resamples.
    pub valid_draws: usize,
    pub n_resamples: usize,
}

impl SharpeInterval {
    /// Same interval scaled by √252.
    pub fn annualized(&self) -> Self {
        let k = TRADING_DAYS.sqrt();
        Self {
            mean: self.mean * k,
            lower: self.lower * k,
            upper: self.upper * k,
            ..*self
        }
    }

    pub fn verdict(&self) -> SharpeVerdict {
        if self.lower < 0.0 {
            SharpeVerdict::Unstable
        } else {
            SharpeVerdict::Positive
        }
    }
}

/// One rolling window's bootstrap interval, stamped with the date just after
/// the window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RollingInterval {
    pub date: NaiveDate,
    pub mean: f64,
    pub lower: f64,
    pub upper: f64,
}

// ─── Single-sample bootstrap ─────────────────────────────────────────

/// Percentile bootstrap interval for the mean.
///
/// Non-finite values are dropped first. Bounds are the `alpha/2` and `1 − alpha/2`
/// percentiles of the resampled means.
pub fn bootstrap_ci(
    values: &[f64],
    n_resamples: usize,
    alpha: f64,
    rng: &mut impl Rng,
) -> Result<ConfidenceInterval, EstimationError> {
    check_resamples(n_resamples)?;
    check_alpha(alpha)?;
    let sample = finite_sample(values)?;

    let means = resampled_means(&sample, n_resamples, rng);
    Ok(ConfidenceInterval {
        estimate: mean(&sample),
        lower: percentile_sorted(&means, 100.0 * alpha / 2.0),
        upper: percentile_sorted(&means, 100.0 * (1.0 - alpha / 2.0)),
        level: 1.0 - alpha,
    })
}

/// Bootstrap distribution of the per-period Sharpe ratio `(mean − rf) / std`.
///
/// Draws whose sample std is not strictly positive are discarded. `None` when
/// no draw survives, e.g. constant returns or a single observation.
pub fn bootstrap_sharpe(
    returns: &[f64],
    n_resamples: usize,
    rf_daily: f64,
    rng: &mut impl Rng,
) -> Result<Option<SharpeInterval>, EstimationError> {
    check_resamples(n_resamples)?;
    let sample = finite_sample(returns)?;
    let n = sample.len();

    let mut draws = Vec::with_capacity(n_resamples);
    let mut resample = vec![0.0; n];
    for _ in 0..n_resamples {
        for slot in resample.iter_mut() {
            *slot = sample[rng.gen_range(0..n)];
        }
        let sigma = sample_std(&resample);
        if sigma > 0.0 {
            draws.push((mean(&resample) - rf_daily) / sigma);
        }
    }

    if draws.is_empty() {
        debug!("bootstrap sharpe: all {n_resamples} draws had zero volatility");
        return Ok(None);
    }

    let valid_draws = draws.len();
    let draw_mean = mean(&draws);
    sort_floats(&mut draws);
    Ok(Some(SharpeInterval {
        mean: draw_mean,
        lower: percentile_sorted(&draws, 5.0),
        upper: percentile_sorted(&draws, 95.0),
        valid_draws,
        n_resamples,
    }))
}

// ─── Rolling bootstrap ───────────────────────────────────────────────

/// Rolling percentile bootstrap of the mean return.
///
/// For each `i` in `window..len` the trailing slice `[i − window, i)` is
/// bootstrapped and the record is dated `dates[i]`; the output has
/// `len − window` records, empty when `len <= window`. Non-finite values inside
/// a window are dropped; a window with none left yields a `NaN` record.
///
/// Fails with `ResourceLimit` before any work when
/// `(len − window) × n_resamples` exceeds the configured budget.
pub fn rolling_bootstrap_ci(
    returns: &TimeSeries,
    window: usize,
    config: &BootstrapConfig,
) -> Result<Vec<RollingInterval>, EstimationError> {
    if window == 0 {
        return Err(EstimationError::invalid("window", "must be >= 1"));
    }
    config.validate()?;

    let len = returns.len();
    if len <= window {
        debug!("rolling bootstrap: {len} points, window {window}, nothing to compute");
        return Ok(Vec::new());
    }

    let windows = len - window;
    let cost = windows as u128 * config.n_resamples as u128;
    if cost > config.max_resample_budget as u128 {
        return Err(EstimationError::ResourceLimit {
            windows,
            n_resamples: config.n_resamples,
            budget: config.max_resample_budget,
        });
    }

    let hierarchy = RngHierarchy::new(config.seed);
    let values = returns.values();
    let dates = returns.dates();
    let lo_pct = 100.0 * config.alpha / 2.0;
    let hi_pct = 100.0 * (1.0 - config.alpha / 2.0);

    let intervals = (window..len)
        .into_par_iter()
        .map(|i| {
            let sample: Vec<f64> = values[i - window..i]
                .iter()
                .copied()
                .filter(|v| v.is_finite())
                .collect();
            if sample.is_empty() {
                return RollingInterval {
                    date: dates[i],
                    mean: f64::NAN,
                    lower: f64::NAN,
                    upper: f64::NAN,
                };
            }
            let mut rng = hierarchy.rng_for(ROLLING_STREAM, i as u64);
            let means = resampled_means(&sample, config.n_resamples, &mut rng);
            RollingInterval {
                date: dates[i],
                mean: mean(&sample),
                lower: percentile_sorted(&means, lo_pct),
                upper: percentile_sorted(&means, hi_pct),
            }
        })
        .collect();

    Ok(intervals)
}

// ─── Helpers ─────────────────────────────────────────────────────────

/// Sorted means of `n_resamples` with-replacement resamples of `sample`.
fn resampled_means(sample: &[f64], n_resamples: usize, rng: &mut impl Rng) -> Vec<f64> {
    let n = sample.len();
    let mut means: Vec<f64> = (0..n_resamples)
        .map(|_| (0..n).map(|_| sample[rng.gen_range(0..n)]).sum::<f64>() / n as f64)
        .collect();
    sort_floats(&mut means);
    means
}

fn finite_sample(values: &[f64]) -> Result<Vec<f64>, EstimationError> {
    let sample: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sample.is_empty() {
        return Err(EstimationError::EmptyInput("bootstrap sample"));
    }
    Ok(sample)
}

fn check_resamples(n_resamples: usize) -> Result<(), EstimationError> {
    if n_resamples == 0 {
        return Err(EstimationError::invalid("n_resamples", "must be >= 1"));
    }
    Ok(())
}

fn check_alpha(alpha: f64) -> Result<(), EstimationError> {
    if !(alpha > 0.0 && alpha < 1.0) {
        return Err(EstimationError::invalid(
            "alpha",
            format!("must be in (0, 1), got {alpha}"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::test_series;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn ci_brackets_sample_mean() {
        let values: Vec<f64> = (0..100).map(|i| (i as f64 - 50.0) * 0.001).collect();
        let mut rng = StdRng::seed_from_u64(1);
        let ci = bootstrap_ci(&values, 2000, 0.05, &mut rng).unwrap();
        assert!(ci.lower <= ci.estimate && ci.estimate <= ci.upper);
        assert!((ci.level - 0.95).abs() < 1e-12);
    }

    #[test]
    fn ci_of_constant_is_degenerate_point() {
        let mut rng = StdRng::seed_from_u64(1);
        let ci = bootstrap_ci(&[0.01; 20], 100, 0.05, &mut rng).unwrap();
        assert!((ci.lower - 0.01).abs() < 1e-15);
        assert!((ci.upper - 0.01).abs() < 1e-15);
    }

    #[test]
    fn ci_rejects_bad_parameters() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(bootstrap_ci(&[], 100, 0.05, &mut rng).is_err());
        assert!(bootstrap_ci(&[1.0], 0, 0.05, &mut rng).is_err());
        assert!(bootstrap_ci(&[1.0], 10, 0.0, &mut rng).is_err());
        assert!(bootstrap_ci(&[1.0], 10, 1.0, &mut rng).is_err());
    }

    #[test]
    fn ci_drops_nan() {
        let mut rng = StdRng::seed_from_u64(3);
        let ci = bootstrap_ci(&[0.02, f64::NAN, 0.02], 50, 0.1, &mut rng).unwrap();
        assert_eq!(ci.estimate, 0.02);
    }

    #[test]
    fn sharpe_of_constant_returns_is_none() {
        let mut rng = StdRng::seed_from_u64(7);
        for (c, n) in [(0.001, 50), (0.1, 40), (0.0123, 252)] {
            assert_eq!(bootstrap_sharpe(&vec![c; n], 200, 0.0, &mut rng).unwrap(), None);
        }
    }

    #[test]
    fn infinite_returns_are_dropped() {
        let mut rng = StdRng::seed_from_u64(3);
        let ci = bootstrap_ci(&[0.02, f64::INFINITY, 0.02, f64::NEG_INFINITY], 50, 0.1, &mut rng)
            .unwrap();
        assert_eq!(ci.estimate, 0.02);
        assert!(ci.lower.is_finite() && ci.upper.is_finite());
    }

    #[test]
    fn sharpe_single_observation_is_none() {
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(bootstrap_sharpe(&[0.01], 50, 0.0, &mut rng).unwrap(), None);
    }

    #[test]
    fn sharpe_interval_ordering_and_verdict() {
        let values: Vec<f64> = (0..250)
            .map(|i| 0.002 + if i % 2 == 0 { 0.01 } else { -0.01 })
            .collect();
        let mut rng = StdRng::seed_from_u64(11);
        let s = bootstrap_sharpe(&values, 1000, 0.0, &mut rng).unwrap().unwrap();
        assert!(s.lower <= s.mean && s.mean <= s.upper);
        assert!(s.valid_draws == 1000);
        assert_eq!(s.verdict(), SharpeVerdict::Positive);
        let a = s.annualized();
        assert!((a.mean / s.mean - 252.0_f64.sqrt()).abs() < 1e-9);
        assert_eq!(a.valid_draws, s.valid_draws);
    }

    #[test]
    fn sharpe_interval_including_zero_is_unstable() {
        let s = SharpeInterval {
            mean: 0.01,
            lower: -0.02,
            upper: 0.04,
            valid_draws: 10,
            n_resamples: 10,
        };
        assert_eq!(s.verdict(), SharpeVerdict::Unstable);
    }

    #[test]
    fn rolling_length_and_dates() {
        let values: Vec<f64> = (0..40).map(|i| ((i * 7) % 11) as f64 * 0.001).collect();
        let r = test_series("r", &values);
        let config = BootstrapConfig {
            n_resamples: 200,
            ..Default::default()
        };
        let out = rolling_bootstrap_ci(&r, 10, &config).unwrap();
        assert_eq!(out.len(), 30);
        assert_eq!(out[0].date, r.dates()[10]);
        let expected_mean = mean(&values[0..10]);
        assert!((out[0].mean - expected_mean).abs() < 1e-15);
        for rec in &out {
            assert!(rec.lower <= rec.upper);
        }
    }

    #[test]
    fn rolling_short_series_is_empty() {
        let r = test_series("r", &[0.01; 5]);
        let out = rolling_bootstrap_ci(&r, 5, &BootstrapConfig::default()).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn rolling_all_nan_window_yields_nan_record() {
        let r = test_series("r", &[f64::NAN, f64::NAN, 0.01, 0.02]);
        let config = BootstrapConfig {
            n_resamples: 20,
            ..Default::default()
        };
        let out = rolling_bootstrap_ci(&r, 2, &config).unwrap();
        assert_eq!(out.len(), 2);
        assert!(out[0].mean.is_nan());
        assert!(out[1].mean.is_finite());
    }

    #[test]
    fn rolling_is_deterministic() {
        let values: Vec<f64> = (0..60).map(|i| ((i * 13) % 17) as f64 * 0.001).collect();
        let r = test_series("r", &values);
        let config = BootstrapConfig {
            n_resamples: 100,
            ..Default::default()
        };
        let a = rolling_bootstrap_ci(&r, 20, &config).unwrap();
        let b = rolling_bootstrap_ci(&r, 20, &config).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rolling_respects_budget() {
        let r = test_series("r", &[0.01; 100]);
        let config = BootstrapConfig {
            n_resamples: 1000,
            max_resample_budget: 10_000,
            ..Default::default()
        };
        let err = rolling_bootstrap_ci(&r, 10, &config).unwrap_err();
        assert_eq!(
            err,
            EstimationError::ResourceLimit {
                windows: 90,
                n_resamples: 1000,
                budget: 10_000
            }
        );
    }
}
