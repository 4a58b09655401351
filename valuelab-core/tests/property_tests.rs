//! Property tests for estimator invariants.
//!
//! Uses proptest to verify:
//! 1. Trend alignment: log trend keeps the cleaned index and stays positive
//! 2. Distance identity: a series is at zero distance from itself
//! 3. Moving-average identity: a window of 1 reproduces the input
//! 4. Portfolio accounting: renormalized weights sum to 1 and reproduce the
//!    weighted combination
//! 5. Bootstrap boundaries: single resample, rolling length and ordering
//! 6. Reversion runs: durations partition the compared points
//! 7. Constant returns: no Sharpe, zero-variance fit, all-NaN rolling Sharpe

use chrono::NaiveDate;
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeMap;

use valuelab_core::{
    bootstrap_ci, bootstrap_sharpe, fit_return_distribution, log_trend, pct_distance,
    portfolio_returns, rolling_bootstrap_ci, rolling_sharpe, smooth_trend, time_to_reversion,
    BootstrapConfig, PriceFrame, TimeSeries, Weights,
};

// ── Helpers ──────────────────────────────────────────────────────────

fn series(name: &str, values: &[f64]) -> TimeSeries {
    let start = NaiveDate::from_ymd_opt(2021, 1, 4).unwrap();
    let dates = (0..values.len())
        .map(|i| start + chrono::Duration::days(i as i64))
        .collect();
    TimeSeries::new(name, dates, values.to_vec()).unwrap()
}

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_prices() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(1.0..1000.0_f64, 2..200)
}

/// Prices with roughly one in ten points missing, at least two present.
fn arb_gappy_prices() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(prop::option::weighted(0.9, 1.0..1000.0_f64), 2..200)
        .prop_map(|v| v.into_iter().map(|p| p.unwrap_or(f64::NAN)).collect::<Vec<_>>())
        .prop_filter("need two valid prices", |v: &Vec<f64>| {
            v.iter().filter(|p| !p.is_nan()).count() >= 2
        })
}

fn arb_returns() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(-0.05..0.05_f64, 1..300)
}

// ── 1. Trend alignment ───────────────────────────────────────────────

proptest! {
    #[test]
    fn log_trend_keeps_clean_index_and_is_positive(prices in arb_gappy_prices()) {
        let s = series("p", &prices);
        let trend = log_trend(&s).unwrap();
        let clean = s.dropna();
        prop_assert_eq!(trend.dates(), clean.dates());
        prop_assert!(trend.values().iter().all(|&v| v > 0.0 && v.is_finite()));
    }
}

// ── 2. Distance identity ─────────────────────────────────────────────

proptest! {
    #[test]
    fn distance_to_self_is_zero(prices in arb_prices()) {
        let s = series("p", &prices);
        let dist = pct_distance(&s, &s);
        prop_assert_eq!(dist.len(), s.len());
        prop_assert!(dist.values().iter().all(|&v| v == 0.0));
    }
}

// ── 3. Moving-average identity ───────────────────────────────────────

proptest! {
    #[test]
    fn smooth_trend_window_one_is_identity(prices in arb_prices()) {
        let s = series("p", &prices);
        let sma = smooth_trend(&s, 1).unwrap();
        prop_assert_eq!(sma.values(), s.values());
        prop_assert_eq!(sma.dates(), s.dates());
    }
}

// ── 4. Portfolio accounting ──────────────────────────────────────────

proptest! {
    #[test]
    fn portfolio_reproduces_weighted_sum(
        rows in prop::collection::vec((-0.05..0.05_f64, -0.05..0.05_f64, -0.05..0.05_f64), 1..100),
        wa in 0.01..5.0_f64,
        wb in 0.01..5.0_f64,
        wz in 0.0..5.0_f64,
    ) {
        let n = rows.len();
        let start = NaiveDate::from_ymd_opt(2022, 3, 1).unwrap();
        let dates: Vec<NaiveDate> = (0..n).map(|i| start + chrono::Duration::days(i as i64)).collect();
        let mut columns = BTreeMap::new();
        columns.insert("A".to_string(), rows.iter().map(|r| r.0).collect::<Vec<_>>());
        columns.insert("B".to_string(), rows.iter().map(|r| r.1).collect::<Vec<_>>());
        columns.insert("C".to_string(), rows.iter().map(|r| r.2).collect::<Vec<_>>());
        let frame = PriceFrame::new(dates, columns).unwrap();

        // "Z" is not in the frame and must be dropped before renormalizing
        let mut w = BTreeMap::new();
        w.insert("A".to_string(), wa);
        w.insert("B".to_string(), wb);
        w.insert("Z".to_string(), wz);
        let weights = Weights::new(w).unwrap();

        let port = portfolio_returns(&frame, &weights).unwrap();
        prop_assert!((port.weights_used.total() - 1.0).abs() < 1e-12);
        prop_assert_eq!(port.weights_used.get("Z"), None);
        prop_assert_eq!(port.series.len(), n);

        let total = wa + wb;
        for (i, &r) in port.series.values().iter().enumerate() {
            let expected = rows[i].0 * wa / total + rows[i].1 * wb / total;
            prop_assert!((r - expected).abs() < 1e-12);
        }
    }
}

// ── 5. Bootstrap boundaries ──────────────────────────────────────────

proptest! {
    #[test]
    fn single_resample_collapses_interval(values in arb_returns(), seed in any::<u64>()) {
        let mut rng = StdRng::seed_from_u64(seed);
        let ci = bootstrap_ci(&values, 1, 0.05, &mut rng).unwrap();
        prop_assert_eq!(ci.lower, ci.upper);
        let lo = values.iter().cloned().fold(f64::INFINITY, f64::min);
        let hi = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        prop_assert!(ci.lower >= lo - 1e-12 && ci.upper <= hi + 1e-12);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn rolling_length_and_ordering(
        values in prop::collection::vec(-0.05..0.05_f64, 0..120),
        window in 10usize..40,
        seed in any::<u64>(),
    ) {
        let s = series("r", &values);
        let config = BootstrapConfig { n_resamples: 400, seed, ..Default::default() };
        let out = rolling_bootstrap_ci(&s, window, &config).unwrap();
        prop_assert_eq!(out.len(), values.len().saturating_sub(window));
        for (k, rec) in out.iter().enumerate() {
            prop_assert_eq!(rec.date, s.dates()[window + k]);
            prop_assert!(rec.lower <= rec.mean && rec.mean <= rec.upper,
                "record {}: {} <= {} <= {}", k, rec.lower, rec.mean, rec.upper);
        }
    }
}

// ── 6. Reversion runs ────────────────────────────────────────────────

proptest! {
    #[test]
    fn reversion_durations_partition_points(prices in arb_prices()) {
        let s = series("p", &prices);
        let trend = log_trend(&s).unwrap();
        let runs = time_to_reversion(&s, &trend);
        prop_assert_eq!(runs.iter().sum::<usize>(), trend.len());
        prop_assert!(runs.iter().all(|&d| d >= 1));
    }
}

// ── 7. Constant returns ──────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn constant_returns_are_degenerate(c in -0.1..0.1_f64, n in 30usize..300, seed in any::<u64>()) {
        let values = vec![c; n];

        let mut rng = StdRng::seed_from_u64(seed);
        prop_assert_eq!(bootstrap_sharpe(&values, 100, 0.0, &mut rng).unwrap(), None);

        let fit = fit_return_distribution(&values);
        let report = fit.report().unwrap();
        prop_assert_eq!(report.normal.std, 0.0);
        prop_assert_eq!(report.skewness, 0.0);
        prop_assert_eq!(report.excess_kurtosis, 0.0);
        prop_assert!(!report.student_t.is_converged());
        prop_assert_eq!(report.jarque_bera.p_value, 1.0);

        let rs = rolling_sharpe(&series("r", &values), 0.0, 21).unwrap();
        prop_assert!(rs.values().iter().all(|v| v.is_nan()));
    }
}
