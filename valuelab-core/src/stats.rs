//! Small descriptive-statistics helpers shared by the estimators.
//!
//! Conventions: `sample_std` uses N−1, `population_std` uses N, and
//! percentiles interpolate linearly between closest ranks.

/// Trading days per year, used for rate conversion and annualization.
pub const TRADING_DAYS: f64 = 252.0;

/// Arithmetic mean. `NaN` for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// True when every value equals the first. Vacuously true for an empty slice.
pub fn is_constant(values: &[f64]) -> bool {
    values.iter().all(|&x| x == values[0])
}

/// Sample standard deviation (N−1). `NaN` for fewer than 2 values.
///
/// Exactly `0.0` for identical values, where the rounded mean would
/// otherwise leave a residual of order 1e-17.
pub fn sample_std(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return f64::NAN;
    }
    if is_constant(values) {
        return 0.0;
    }
    let m = mean(values);
    let ss = values.iter().map(|&x| (x - m).powi(2)).sum::<f64>();
    (ss / (n - 1) as f64).sqrt()
}

/// Population standard deviation (N). `NaN` for an empty slice.
pub fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    if is_constant(values) {
        return 0.0;
    }
    let m = mean(values);
    let ss = values.iter().map(|&x| (x - m).powi(2)).sum::<f64>();
    (ss / values.len() as f64).sqrt()
}

/// Sort in place, ascending. `NaN`s sort last.
pub fn sort_floats(values: &mut [f64]) {
    values.sort_by(|a, b| a.total_cmp(b));
}

/// Percentile `p` (0–100) of an ascending slice using linear interpolation.
pub fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return f64::NAN;
    }
    if n == 1 {
        return sorted[0];
    }
    let rank = (p / 100.0).clamp(0.0, 1.0) * (n - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = (lo + 1).min(n - 1);
    let frac = rank - lo as f64;
    sorted[lo] * (1.0 - frac) + sorted[hi] * frac
}

/// Central moments `(mean, m2, m3, m4)` with the 1/N normalization.
///
/// Identical values give exact zero moments around the first value.
pub fn central_moments(values: &[f64]) -> (f64, f64, f64, f64) {
    if !values.is_empty() && is_constant(values) {
        return (values[0], 0.0, 0.0, 0.0);
    }
    let n = values.len() as f64;
    let m = mean(values);
    let (mut m2, mut m3, mut m4) = (0.0, 0.0, 0.0);
    for &x in values {
        let d = x - m;
        let d2 = d * d;
        m2 += d2;
        m3 += d2 * d;
        m4 += d2 * d2;
    }
    (m, m2 / n, m3 / n, m4 / n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_std_uses_n_minus_one() {
        let x = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((population_std(&x) - 2.0).abs() < 1e-12);
        assert!((sample_std(&x) - (32.0_f64 / 7.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn std_of_single_value_is_nan() {
        assert!(sample_std(&[1.0]).is_nan());
    }

    #[test]
    fn constant_values_have_exact_zero_spread() {
        for c in [0.1, 0.003, 1.0 / 3.0, -0.0123] {
            let x = vec![c; 41];
            assert_eq!(sample_std(&x), 0.0);
            assert_eq!(population_std(&x), 0.0);
            assert_eq!(central_moments(&x), (c, 0.0, 0.0, 0.0));
        }
    }

    #[test]
    fn percentile_interpolates() {
        let x = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile_sorted(&x, 0.0), 1.0);
        assert_eq!(percentile_sorted(&x, 100.0), 4.0);
        assert!((percentile_sorted(&x, 50.0) - 2.5).abs() < 1e-12);
        assert!((percentile_sorted(&x, 5.0) - 1.15).abs() < 1e-12);
    }

    #[test]
    fn percentile_single_and_empty() {
        assert_eq!(percentile_sorted(&[7.0], 95.0), 7.0);
        assert!(percentile_sorted(&[], 50.0).is_nan());
    }

    #[test]
    fn moments_of_symmetric_sample() {
        let (m, m2, m3, _) = central_moments(&[-1.0, 0.0, 1.0]);
        assert_eq!(m, 0.0);
        assert!((m2 - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(m3, 0.0);
    }
}
