//! Risk metrics: rolling Sharpe ratio and volatility-regime-conditioned Sharpe.
//!
//! Conventions used throughout:
//! - Daily risk-free rate = annual rate / 252.
//! - Standard deviation is the sample (N−1) estimate.
//! - Sharpe = mean(excess) / std(excess) × √252.

use chrono::NaiveDate;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::EstimationError;
use crate::series::TimeSeries;
use crate::stats::{mean, percentile_sorted, sample_std, sort_floats, TRADING_DAYS};

/// Trailing window for realized volatility when classifying regimes.
pub const DEFAULT_VOL_WINDOW: usize = 21;

/// Minimum observations a regime needs before its Sharpe is reported.
pub const MIN_REGIME_OBSERVATIONS: usize = 5;

/// Convert an annual risk-free rate to a per-trading-day rate.
pub fn daily_risk_free(rf_annual: f64) -> f64 {
    rf_annual / TRADING_DAYS
}

/// Annualized Sharpe of a sample of per-period returns.
///
/// `None` for fewer than 2 observations or zero/undefined volatility.
pub fn annualized_sharpe(returns: &[f64], rf_daily: f64) -> Option<f64> {
    let std = sample_std(returns);
    if !std.is_finite() || std == 0.0 {
        return None;
    }
    Some((mean(returns) - rf_daily) / std * TRADING_DAYS.sqrt())
}

/// Rolling annualized Sharpe ratio over a trailing window.
///
/// The first `window − 1` points are `NaN`, as is any window that contains a
/// missing return or has zero volatility.
pub fn rolling_sharpe(
    returns: &TimeSeries,
    rf_annual: f64,
    window: usize,
) -> Result<TimeSeries, EstimationError> {
    if window < 2 {
        return Err(EstimationError::invalid("window", "must be >= 2"));
    }
    let rf_daily = daily_risk_free(rf_annual);
    let values = rolling_apply(returns.values(), window, |w| {
        annualized_sharpe(w, rf_daily).unwrap_or(f64::NAN)
    });
    Ok(TimeSeries::derived(
        "rolling_sharpe",
        returns.dates().to_vec(),
        values,
    ))
}

/// Trailing realized volatility (sample std, not annualized).
pub fn rolling_volatility(
    returns: &TimeSeries,
    window: usize,
) -> Result<TimeSeries, EstimationError> {
    if window < 2 {
        return Err(EstimationError::invalid("window", "must be >= 2"));
    }
    let values = rolling_apply(returns.values(), window, sample_std);
    Ok(TimeSeries::derived(
        "rolling_volatility",
        returns.dates().to_vec(),
        values,
    ))
}

/// Volatility tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Regime {
    Low,
    Mid,
    High,
}

impl Regime {
    pub const ALL: [Regime; 3] = [Regime::Low, Regime::Mid, Regime::High];

    pub fn label(self) -> &'static str {
        match self {
            Regime::Low => "Low Vol",
            Regime::Mid => "Mid Vol",
            Regime::High => "High Vol",
        }
    }
}

/// Per-timestamp regime assignment.
#[derive(Debug, Clone, Serialize)]
pub struct RegimeLabels {
    pub dates: Vec<NaiveDate>,
    pub labels: Vec<Regime>,
    /// Bin edges after duplicate removal, ascending.
    pub edges: Vec<f64>,
}

/// Assign each timestamp a volatility tier by equal-frequency binning.
///
/// Leading points without a full volatility window are dropped. Tercile edges
/// that coincide are merged; the surviving bins take the lowest labels.
/// Returns `None` when fewer than 3 distinct volatility values exist.
pub fn regime_labels(
    returns: &TimeSeries,
    vol_window: usize,
) -> Result<Option<RegimeLabels>, EstimationError> {
    let vol = rolling_volatility(returns, vol_window)?.dropna();

    let mut sorted = vol.values().to_vec();
    sort_floats(&mut sorted);
    let mut distinct = sorted.clone();
    distinct.dedup();
    if distinct.len() < 3 {
        debug!(
            "regime binning skipped: {} distinct volatility values",
            distinct.len()
        );
        return Ok(None);
    }

    let mut edges: Vec<f64> = [0.0, 100.0 / 3.0, 200.0 / 3.0, 100.0]
        .iter()
        .map(|&p| percentile_sorted(&sorted, p))
        .collect();
    edges.dedup();

    let labels = vol
        .values()
        .iter()
        .map(|&v| {
            let bin = edges[1..]
                .iter()
                .position(|&upper| v <= upper)
                .unwrap_or(edges.len() - 2);
            Regime::ALL[bin]
        })
        .collect();

    Ok(Some(RegimeLabels {
        dates: vol.dates().to_vec(),
        labels,
        edges,
    }))
}

/// Sharpe ratio within one volatility tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RegimeStat {
    pub observations: usize,
    /// `None` below `MIN_REGIME_OBSERVATIONS` or with zero volatility.
    pub sharpe: Option<f64>,
}

/// Annualized Sharpe per volatility tier. Order-free, not a time series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RegimeSharpe {
    pub low: RegimeStat,
    pub mid: RegimeStat,
    pub high: RegimeStat,
}

impl RegimeSharpe {
    pub fn get(&self, regime: Regime) -> RegimeStat {
        match regime {
            Regime::Low => self.low,
            Regime::Mid => self.mid,
            Regime::High => self.high,
        }
    }

    /// True when no tier produced a Sharpe value.
    pub fn is_undefined(&self) -> bool {
        Regime::ALL.iter().all(|&r| self.get(r).sharpe.is_none())
    }
}

/// Annualized Sharpe conditioned on the trailing-volatility regime.
///
/// When the volatility distribution is too flat to form tiers, every label is
/// undefined. Each tier otherwise needs at least `MIN_REGIME_OBSERVATIONS`
/// returns with nonzero dispersion.
pub fn regime_conditioned_sharpe(
    returns: &TimeSeries,
    rf_annual: f64,
    vol_window: usize,
) -> Result<RegimeSharpe, EstimationError> {
    if returns.is_empty() {
        return Err(EstimationError::EmptyInput("returns"));
    }
    let Some(regimes) = regime_labels(returns, vol_window)? else {
        return Ok(RegimeSharpe::default());
    };

    let rf_daily = daily_risk_free(rf_annual);
    let mut buckets: [Vec<f64>; 3] = Default::default();
    for (date, regime) in regimes.dates.iter().zip(&regimes.labels) {
        if let Some(r) = returns.get(*date) {
            buckets[*regime as usize].push(r);
        }
    }

    let stat = |subset: &Vec<f64>| RegimeStat {
        observations: subset.len(),
        sharpe: if subset.len() >= MIN_REGIME_OBSERVATIONS {
            annualized_sharpe(subset, rf_daily)
        } else {
            None
        },
    };

    Ok(RegimeSharpe {
        low: stat(&buckets[0]),
        mid: stat(&buckets[1]),
        high: stat(&buckets[2]),
    })
}

/// Apply `f` to every full trailing window; `NaN` before the first full window
/// and for windows containing a `NaN`.
fn rolling_apply(values: &[f64], window: usize, f: impl Fn(&[f64]) -> f64) -> Vec<f64> {
    (0..values.len())
        .map(|i| {
            if i + 1 < window {
                return f64::NAN;
            }
            let slice = &values[i + 1 - window..=i];
            if slice.iter().any(|v| v.is_nan()) {
                f64::NAN
            } else {
                f(slice)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::test_series;

    #[test]
    fn daily_rate_uses_252() {
        assert!((daily_risk_free(0.0252) - 0.0001).abs() < 1e-15);
    }

    #[test]
    fn rolling_sharpe_warmup_is_nan() {
        let r = test_series("r", &[0.01, -0.005, 0.02, 0.0, 0.01]);
        let rs = rolling_sharpe(&r, 0.0, 3).unwrap();
        assert_eq!(rs.len(), 5);
        assert!(rs.values()[0].is_nan());
        assert!(rs.values()[1].is_nan());
        assert!(rs.values()[2].is_finite());
    }

    #[test]
    fn rolling_sharpe_matches_formula() {
        let r = test_series("r", &[0.01, 0.03]);
        let rs = rolling_sharpe(&r, 0.0, 2).unwrap();
        let expected = 0.02 / (0.0002_f64).sqrt() * 252.0_f64.sqrt();
        assert!((rs.values()[1] - expected).abs() < 1e-9);
    }

    #[test]
    fn rolling_sharpe_zero_vol_is_nan() {
        let r = test_series("r", &[0.01; 4]);
        let rs = rolling_sharpe(&r, 0.0, 2).unwrap();
        assert!(rs.values().iter().all(|v| v.is_nan()));

        let r = test_series("r", &[0.1; 40]);
        let rs = rolling_sharpe(&r, 0.0, 21).unwrap();
        assert!(rs.values().iter().all(|v| v.is_nan()));
        assert_eq!(annualized_sharpe(&[0.1; 40], 0.0), None);
    }

    #[test]
    fn rolling_window_must_be_at_least_two() {
        let r = test_series("r", &[0.01; 4]);
        assert!(rolling_sharpe(&r, 0.0, 1).is_err());
    }

    #[test]
    fn constant_volatility_yields_all_undefined() {
        let r = test_series("r", &[0.001; 200]);
        let out = regime_conditioned_sharpe(&r, 0.02, DEFAULT_VOL_WINDOW).unwrap();
        assert!(out.is_undefined());
        assert_eq!(out, RegimeSharpe::default());
    }

    #[test]
    fn regimes_split_into_equal_thirds() {
        // Three blocks of increasing amplitude, alternating sign so each block
        // has its own volatility level.
        let mut values = Vec::new();
        for amp in [0.001, 0.01, 0.05] {
            for i in 0..60 {
                let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
                values.push(sign * amp * (1.0 + 0.01 * i as f64));
            }
        }
        let r = test_series("r", &values);
        let labels = regime_labels(&r, 5).unwrap().unwrap();
        assert_eq!(labels.edges.len(), 4);
        let highs = labels.labels.iter().filter(|&&l| l == Regime::High).count();
        let lows = labels.labels.iter().filter(|&&l| l == Regime::Low).count();
        assert!(highs > 40 && lows > 40, "highs={highs} lows={lows}");
        assert_eq!(*labels.labels.last().unwrap(), Regime::High);
    }

    #[test]
    fn regime_sharpe_reports_each_tier() {
        let mut values = Vec::new();
        for amp in [0.002, 0.01, 0.03] {
            for i in 0..80 {
                let base = if i % 2 == 0 { amp } else { -0.8 * amp };
                values.push(base + 0.0001 * (i % 7) as f64);
            }
        }
        let r = test_series("r", &values);
        let out = regime_conditioned_sharpe(&r, 0.0, 10).unwrap();
        for regime in Regime::ALL {
            let stat = out.get(regime);
            assert!(stat.observations >= MIN_REGIME_OBSERVATIONS, "{regime:?}");
            assert!(stat.sharpe.is_some(), "{regime:?}");
        }
    }

    #[test]
    fn small_tier_is_undefined() {
        // Six returns: vol window of 2 leaves five volatility points, far too
        // few for any tier to reach five observations.
        let r = test_series("r", &[0.01, -0.02, 0.03, -0.01, 0.05, 0.0]);
        let out = regime_conditioned_sharpe(&r, 0.0, 2).unwrap();
        assert!(out.is_undefined());
        assert!(out.low.observations > 0);
    }

    #[test]
    fn empty_returns_fail() {
        let r = TimeSeries::empty("r");
        assert!(regime_conditioned_sharpe(&r, 0.0, 21).is_err());
    }
}
