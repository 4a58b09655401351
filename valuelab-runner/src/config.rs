//! Serializable analysis configuration.
//!
//! Loaded from TOML. Every section and field has a default, so an empty file
//! (or no file at all) gives the dashboard defaults: AAPL over the last three
//! years, log-linear trend, zero risk-free rate.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use valuelab_core::{BootstrapConfig, EstimationError, TrendModel, Weights};

/// Unique identifier for an analysis configuration (content-addressable hash).
pub type Fingerprint = String;

/// Errors from loading or validating a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Full configuration for one analysis run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub portfolio: PortfolioConfig,
    pub trend: TrendConfig,
    pub risk: RiskConfig,
    pub bootstrap: BootstrapSettings,
    pub data: DataConfig,
}

/// What to analyze and over which dates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortfolioConfig {
    pub tickers: Vec<String>,
    /// Defaults to three years before `end`.
    pub start: Option<NaiveDate>,
    /// Defaults to today.
    pub end: Option<NaiveDate>,
    /// Asset weights; equal weights when absent.
    pub weights: Option<BTreeMap<String, f64>>,
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        Self {
            tickers: vec!["AAPL".to_string()],
            start: None,
            end: None,
            weights: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    pub model: TrendModel,
    /// Moving-average window, used by `moving_average`.
    pub smooth_window: usize,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            model: TrendModel::LogLinear,
            smooth_window: 63,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Annual risk-free rate as a fraction.
    pub risk_free_rate: f64,
    pub sharpe_window: usize,
    pub regime_vol_window: usize,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            risk_free_rate: 0.0,
            sharpe_window: 63,
            regime_vol_window: valuelab_core::risk::DEFAULT_VOL_WINDOW,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapSettings {
    pub sharpe_resamples: usize,
    pub mean_resamples: usize,
    pub rolling_window: usize,
    pub rolling_resamples: usize,
    pub alpha: f64,
    pub seed: u64,
    pub max_resample_budget: u64,
}

impl Default for BootstrapSettings {
    fn default() -> Self {
        let core = BootstrapConfig::default();
        Self {
            sharpe_resamples: 2000,
            mean_resamples: core.n_resamples,
            rolling_window: 126,
            rolling_resamples: 1000,
            alpha: core.alpha,
            seed: core.seed,
            max_resample_budget: core.max_resample_budget,
        }
    }
}

impl BootstrapSettings {
    /// Core configuration for the rolling band.
    pub fn rolling_config(&self) -> BootstrapConfig {
        BootstrapConfig {
            n_resamples: self.rolling_resamples,
            alpha: self.alpha,
            seed: self.seed,
            max_resample_budget: self.max_resample_budget,
        }
    }
}

/// Where prices come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSourceKind {
    Yahoo,
    Csv,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub source: PriceSourceKind,
    /// Directory of `{SYMBOL}.csv` files for the `csv` source.
    pub csv_dir: PathBuf,
    pub cache_ttl_secs: u64,
    /// Fetch the Buffett indicator alongside prices.
    pub buffett: bool,
    /// FRED API key; the keyless CSV endpoint is used when absent.
    pub fred_api_key: Option<String>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            source: PriceSourceKind::Yahoo,
            csv_dir: PathBuf::from("data"),
            cache_ttl_secs: 3600,
            buffett: true,
            fred_api_key: None,
        }
    }
}

impl AnalysisConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Fill in missing dates relative to `today`: end defaults to today and
    /// start to the same calendar day three years earlier.
    pub fn with_resolved_dates(mut self, today: NaiveDate) -> Self {
        let end = self.portfolio.end.unwrap_or(today);
        let start = self.portfolio.start.unwrap_or_else(|| {
            NaiveDate::from_ymd_opt(end.year() - 3, end.month(), end.day())
                .unwrap_or(end - chrono::Duration::days(365 * 3))
        });
        self.portfolio.start = Some(start);
        self.portfolio.end = Some(end);
        self
    }

    /// Weights for the configured tickers; equal weights when none are given.
    pub fn weights(&self) -> Result<Weights, EstimationError> {
        match &self.portfolio.weights {
            Some(map) => Weights::new(map.clone()),
            None => Weights::equal(&self.portfolio.tickers),
        }
    }

    /// Reject configurations no analysis could run on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.portfolio;
        if p.tickers.is_empty() {
            return Err(invalid("at least one ticker is required"));
        }
        if let Some(t) = p.tickers.iter().find(|t| t.trim().is_empty()) {
            return Err(invalid(format!("blank ticker '{t}'")));
        }
        let mut seen = std::collections::BTreeSet::new();
        if let Some(t) = p.tickers.iter().find(|t| !seen.insert(t.as_str())) {
            return Err(invalid(format!("duplicate ticker '{t}'")));
        }
        if let Some(weights) = &p.weights {
            if let Some(k) = weights.keys().find(|k| !p.tickers.contains(k)) {
                return Err(invalid(format!("weight given for '{k}', which is not a ticker")));
            }
            if let Some(t) = p.tickers.iter().find(|t| !weights.contains_key(*t)) {
                return Err(invalid(format!("no weight given for ticker '{t}'")));
            }
            Weights::new(weights.clone()).map_err(|e| invalid(e.to_string()))?;
        }
        if let (Some(start), Some(end)) = (p.start, p.end) {
            if start >= end {
                return Err(invalid(format!("start {start} must be before end {end}")));
            }
        }

        if self.trend.smooth_window == 0 {
            return Err(invalid("trend.smooth_window must be >= 1"));
        }
        if !self.risk.risk_free_rate.is_finite() {
            return Err(invalid("risk.risk_free_rate must be finite"));
        }
        if self.risk.sharpe_window < 2 {
            return Err(invalid("risk.sharpe_window must be >= 2"));
        }
        if self.risk.regime_vol_window < 2 {
            return Err(invalid("risk.regime_vol_window must be >= 2"));
        }

        let b = &self.bootstrap;
        if !(b.alpha > 0.0 && b.alpha < 1.0) {
            return Err(invalid(format!("bootstrap.alpha must be in (0, 1), got {}", b.alpha)));
        }
        if b.rolling_window == 0 {
            return Err(invalid("bootstrap.rolling_window must be >= 1"));
        }
        if b.sharpe_resamples == 0 || b.mean_resamples == 0 || b.rolling_resamples == 0 {
            return Err(invalid("bootstrap resample counts must be >= 1"));
        }
        Ok(())
    }

    /// Copy without credentials, safe to persist in reports.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.data.fred_api_key = None;
        copy
    }

    /// Deterministic BLAKE3 hash of this configuration, credentials excluded.
    ///
    /// Two runs with identical configs share a fingerprint, and therefore an
    /// output directory.
    pub fn fingerprint(&self) -> Fingerprint {
        let public = self.redacted();
        let json =
            serde_json::to_vec(&public).unwrap_or_else(|_| format!("{public:?}").into_bytes());
        blake3::hash(&json).to_hex().to_string()
    }
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}
