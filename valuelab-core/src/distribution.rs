//! Return distribution fitting: normal and Student-t fits, sample moments,
//! and the Jarque-Bera normality test.
//!
//! The Student-t fit is maximum likelihood by ECM: for a fixed degrees of
//! freedom `ν`, EM updates location and scale with the usual latent-weight
//! iteration `w = (ν + 1) / (ν + z²)`; `ν` itself is profiled by golden-section
//! search over `ln ν ∈ [ln 0.5, ln 1000]`. A fit that does not settle is
//! reported as `StudentTFit::Failed`, never as an error.

use log::debug;
use serde::Serialize;
use statrs::distribution::{ChiSquared, ContinuousCDF};
use statrs::function::gamma::ln_gamma;

use crate::stats::central_moments;

/// Fewer clean observations than this and no fit is attempted.
pub const MIN_FIT_OBSERVATIONS: usize = 30;

const DF_MIN: f64 = 0.5;
const DF_MAX: f64 = 1000.0;
const EM_MAX_ITER: usize = 1000;
const EM_TOL: f64 = 1e-9;
const GOLDEN_TOL: f64 = 1e-5;
const GOLDEN_MAX_ITER: usize = 200;

// ─── Result types ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NormalFit {
    pub mean: f64,
    /// Maximum-likelihood (population) standard deviation.
    pub std: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StudentTFit {
    Converged {
        df: f64,
        loc: f64,
        scale: f64,
        log_likelihood: f64,
    },
    Failed {
        reason: String,
    },
}

impl StudentTFit {
    pub fn is_converged(&self) -> bool {
        matches!(self, StudentTFit::Converged { .. })
    }

    fn failed(reason: impl Into<String>) -> Self {
        StudentTFit::Failed {
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct JarqueBera {
    pub statistic: f64,
    /// Upper tail of chi-square with 2 degrees of freedom.
    pub p_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistributionReport {
    pub observations: usize,
    pub normal: NormalFit,
    pub skewness: f64,
    pub excess_kurtosis: f64,
    pub student_t: StudentTFit,
    pub jarque_bera: JarqueBera,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DistributionFit {
    InsufficientData { observations: usize },
    Fitted(DistributionReport),
}

impl DistributionFit {
    pub fn report(&self) -> Option<&DistributionReport> {
        match self {
            DistributionFit::Fitted(report) => Some(report),
            DistributionFit::InsufficientData { .. } => None,
        }
    }
}

// ─── Fitting ─────────────────────────────────────────────────────────

/// Fit candidate distributions to a return sample.
///
/// Infinite values are treated as missing and dropped with the `NaN`s.
pub fn fit_return_distribution(returns: &[f64]) -> DistributionFit {
    let sample: Vec<f64> = returns.iter().copied().filter(|r| r.is_finite()).collect();
    let n = sample.len();
    if n < MIN_FIT_OBSERVATIONS {
        return DistributionFit::InsufficientData { observations: n };
    }

    let (mean, m2, m3, m4) = central_moments(&sample);
    if m2 <= 0.0 {
        debug!("distribution fit: zero variance across {n} observations");
        return DistributionFit::Fitted(DistributionReport {
            observations: n,
            normal: NormalFit { mean, std: 0.0 },
            skewness: 0.0,
            excess_kurtosis: 0.0,
            student_t: StudentTFit::failed("zero variance"),
            jarque_bera: JarqueBera {
                statistic: 0.0,
                p_value: 1.0,
            },
        });
    }

    let skewness = m3 / m2.powf(1.5);
    let excess_kurtosis = m4 / (m2 * m2) - 3.0;

    DistributionFit::Fitted(DistributionReport {
        observations: n,
        normal: NormalFit {
            mean,
            std: m2.sqrt(),
        },
        skewness,
        excess_kurtosis,
        student_t: fit_student_t(&sample, mean, m2.sqrt()),
        jarque_bera: jarque_bera(n, skewness, excess_kurtosis),
    })
}

/// Jarque-Bera statistic `n/6 · (S² + K²/4)` with its chi-square(2) p-value.
pub fn jarque_bera(n: usize, skewness: f64, excess_kurtosis: f64) -> JarqueBera {
    let statistic =
        n as f64 / 6.0 * (skewness * skewness + 0.25 * excess_kurtosis * excess_kurtosis);
    let p_value = match ChiSquared::new(2.0) {
        Ok(chi2) => 1.0 - chi2.cdf(statistic),
        // chi-square(2) has a closed-form tail
        Err(_) => (-statistic / 2.0).exp(),
    };
    JarqueBera { statistic, p_value }
}

/// Student-t log-likelihood of `sample` at `(df, loc, scale)`.
pub fn student_t_log_likelihood(sample: &[f64], df: f64, loc: f64, scale: f64) -> f64 {
    let n = sample.len() as f64;
    let norm = ln_gamma((df + 1.0) / 2.0)
        - ln_gamma(df / 2.0)
        - 0.5 * (df * std::f64::consts::PI).ln()
        - scale.ln();
    let tail: f64 = sample
        .iter()
        .map(|&x| {
            let z = (x - loc) / scale;
            (1.0 + z * z / df).ln()
        })
        .sum();
    n * norm - (df + 1.0) / 2.0 * tail
}

fn fit_student_t(sample: &[f64], mean: f64, std: f64) -> StudentTFit {
    // profile objective; probes that do not converge count as -inf
    let profile = |ln_df: f64| -> f64 {
        em_loc_scale(sample, ln_df.exp(), mean, std)
            .map(|(_, _, ll)| ll)
            .unwrap_or(f64::NEG_INFINITY)
    };

    let ln_df = golden_section_max(profile, DF_MIN.ln(), DF_MAX.ln());
    let df = ln_df.exp();
    match em_loc_scale(sample, df, mean, std) {
        Some((loc, scale, log_likelihood)) if log_likelihood.is_finite() => {
            StudentTFit::Converged {
                df,
                loc,
                scale,
                log_likelihood,
            }
        }
        Some(_) => StudentTFit::failed("non-finite log-likelihood"),
        None => StudentTFit::failed(format!(
            "EM did not converge within {EM_MAX_ITER} iterations at df = {df:.3}"
        )),
    }
}

/// EM for location and scale at fixed `df`. Returns `(loc, scale, loglik)`.
fn em_loc_scale(sample: &[f64], df: f64, mean: f64, std: f64) -> Option<(f64, f64, f64)> {
    let n = sample.len() as f64;
    let mut loc = mean;
    let mut scale = std;

    for _ in 0..EM_MAX_ITER {
        let mut sw = 0.0;
        let mut swx = 0.0;
        for &x in sample {
            let z = (x - loc) / scale;
            let w = (df + 1.0) / (df + z * z);
            sw += w;
            swx += w * x;
        }
        let new_loc = swx / sw;
        let new_var = sample
            .iter()
            .map(|&x| {
                let z = (x - loc) / scale;
                let w = (df + 1.0) / (df + z * z);
                w * (x - new_loc).powi(2)
            })
            .sum::<f64>()
            / n;
        let new_scale = new_var.sqrt();
        if !new_loc.is_finite() || !new_scale.is_finite() || new_scale <= 0.0 {
            return None;
        }

        let settled = (new_loc - loc).abs() <= EM_TOL * scale
            && (new_scale - scale).abs() <= EM_TOL * scale;
        loc = new_loc;
        scale = new_scale;
        if settled {
            return Some((loc, scale, student_t_log_likelihood(sample, df, loc, scale)));
        }
    }
    None
}

/// Maximize a unimodal `f` on `[a, b]`.
fn golden_section_max(f: impl Fn(f64) -> f64, mut a: f64, mut b: f64) -> f64 {
    let inv_phi = (5.0_f64.sqrt() - 1.0) / 2.0;
    let mut c = b - inv_phi * (b - a);
    let mut d = a + inv_phi * (b - a);
    let mut fc = f(c);
    let mut fd = f(d);

    for _ in 0..GOLDEN_MAX_ITER {
        if (b - a).abs() < GOLDEN_TOL {
            break;
        }
        if fc >= fd {
            b = d;
            d = c;
            fd = fc;
            c = b - inv_phi * (b - a);
            fc = f(c);
        } else {
            a = c;
            c = d;
            fc = fd;
            d = a + inv_phi * (b - a);
            fd = f(d);
        }
    }
    if fc >= fd {
        c
    } else {
        d
    }
}
