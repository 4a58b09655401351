//! ValueLab Core — estimation of equity valuation and risk metrics under
//! statistical uncertainty.
//!
//! This crate contains the statistical estimation core:
//! - Time-indexed series types with a strictly increasing date axis
//! - Trend estimation (log-linear, moving average, distance, reversion times)
//! - Return aggregation for single assets and weighted baskets
//! - Rolling and regime-conditioned Sharpe ratios
//! - Percentile bootstrap, including a parallel rolling bootstrap
//! - Normal and Student-t distribution fits with a normality test
//!
//! The estimators are pure: no I/O, deterministic given a seed. Data
//! acquisition (price and macro sources, CSV import, TTL cache) lives in
//! [`data`].

pub mod bootstrap;
pub mod data;
pub mod distribution;
pub mod error;
pub mod returns;
pub mod risk;
pub mod rng;
pub mod series;
pub mod stats;
pub mod trend;

pub use bootstrap::{
    bootstrap_ci, bootstrap_sharpe, rolling_bootstrap_ci, BootstrapConfig, ConfidenceInterval,
    RollingInterval, SharpeInterval, SharpeVerdict,
};
pub use distribution::{
    fit_return_distribution, DistributionFit, DistributionReport, JarqueBera, NormalFit,
    StudentTFit,
};
pub use error::EstimationError;
pub use returns::{portfolio_returns, returns, simple_returns, PortfolioReturns, Weights};
pub use risk::{
    regime_conditioned_sharpe, regime_labels, rolling_sharpe, rolling_volatility, Regime,
    RegimeLabels, RegimeSharpe, RegimeStat,
};
pub use rng::RngHierarchy;
pub use series::{PriceFrame, SeriesError, TimeSeries};
pub use trend::{
    fit_exponential_waiting_time, fit_trend, latest_distance, log_trend, log_trend_fit,
    pct_distance, smooth_trend, time_to_reversion, LogTrendFit, TrendModel,
};
