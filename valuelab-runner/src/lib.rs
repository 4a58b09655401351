//! ValueLab Runner — analysis orchestration, configuration, reports.
//!
//! This crate builds on `valuelab-core` to provide:
//! - TOML configuration with defaults and BLAKE3 fingerprinting
//! - Price loading with source/synthetic fallback
//! - One-call analysis producing a full valuation and risk report
//! - JSON, CSV and Markdown export

pub mod analysis;
pub mod config;
pub mod data_loader;
pub mod export;

pub use analysis::{
    run_analysis, wealth_index, AnalysisError, AnalysisReport, ReportSeries, SCHEMA_VERSION,
};
pub use config::{AnalysisConfig, ConfigError, Fingerprint, PriceSourceKind};
pub use data_loader::{
    build_macro_source, build_price_source, generate_synthetic_prices, load_prices, LoadError,
    LoadOptions, LoadedData,
};
pub use export::{generate_report, save_artifacts};
