//! ValueLab CLI — analyze, fetch, and config commands.
//!
//! Commands:
//! - `analyze`: run a valuation and risk analysis from a TOML config and/or flags
//! - `fetch`: download closing prices from Yahoo Finance into CSV files
//! - `config`: print the default configuration as TOML

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;
use valuelab_core::data::{write_prices_csv, PriceSource, YahooProvider};
use valuelab_core::TrendModel;
use valuelab_runner::{
    build_macro_source, build_price_source, generate_report, load_prices, run_analysis,
    save_artifacts, AnalysisConfig, LoadOptions, PriceSourceKind,
};

#[derive(Parser)]
#[command(
    name = "valuelab",
    about = "ValueLab CLI — equity valuation and risk under statistical uncertainty"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full analysis: trend, Sharpe intervals, regimes, distribution, macro.
    Analyze(AnalyzeArgs),
    /// Download closing prices from Yahoo Finance and save them as CSV.
    Fetch {
        /// Symbols to download (e.g., SPY QQQ AAPL).
        #[arg(required = true)]
        symbols: Vec<String>,

        /// Start date (YYYY-MM-DD). Defaults to 3 years ago.
        #[arg(long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        end: Option<String>,

        /// Directory for `{SYMBOL}.csv` files.
        #[arg(long, default_value = "data")]
        csv_dir: PathBuf,
    },
    /// Print the default configuration as TOML.
    Config,
}

#[derive(clap::Args)]
struct AnalyzeArgs {
    /// Path to a TOML config file. Flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Ticker to analyze; repeat for an equal-weight basket.
    #[arg(long = "ticker")]
    tickers: Vec<String>,

    /// Basket weights, e.g. "SPY=0.6,TLT=0.4". Implies the tickers.
    #[arg(long)]
    weights: Option<String>,

    /// Start date (YYYY-MM-DD). Defaults to 3 years before the end date.
    #[arg(long)]
    start: Option<String>,

    /// End date (YYYY-MM-DD). Defaults to today.
    #[arg(long)]
    end: Option<String>,

    /// Trend model: log_linear or moving_average.
    #[arg(long)]
    trend: Option<String>,

    /// Moving-average window in trading days.
    #[arg(long)]
    window: Option<usize>,

    /// Annual risk-free rate, as a fraction (0.04 = 4%).
    #[arg(long)]
    rf: Option<f64>,

    /// Master seed for all bootstrap draws.
    #[arg(long)]
    seed: Option<u64>,

    /// Read prices from `{SYMBOL}.csv` files in this directory instead of Yahoo.
    #[arg(long)]
    csv_dir: Option<PathBuf>,

    /// FRED API key. Falls back to $FRED_API_KEY, then the keyless endpoint.
    #[arg(long)]
    fred_api_key: Option<String>,

    /// Skip the Buffett indicator.
    #[arg(long, default_value_t = false)]
    no_macro: bool,

    /// Offline mode: no network access.
    #[arg(long, default_value_t = false)]
    offline: bool,

    /// Use synthetic data as fallback.
    #[arg(long, default_value_t = false)]
    synthetic: bool,

    /// Output directory for report artifacts.
    #[arg(long, default_value = "results")]
    output_dir: PathBuf,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze(args) => run_analyze(args),
        Commands::Fetch {
            symbols,
            start,
            end,
            csv_dir,
        } => run_fetch(symbols, start, end, csv_dir),
        Commands::Config => {
            print!("{}", AnalysisConfig::default().to_toml()?);
            Ok(())
        }
    }
}

fn run_analyze(args: AnalyzeArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => AnalysisConfig::from_file(path)?,
        None => AnalysisConfig::default(),
    };
    apply_overrides(&mut config, &args)?;
    let config = config.with_resolved_dates(chrono::Local::now().date_naive());
    config.validate()?;

    let (Some(start), Some(end)) = (config.portfolio.start, config.portfolio.end) else {
        bail!("analysis dates could not be resolved");
    };
    let opts = LoadOptions {
        start,
        end,
        offline: args.offline,
        synthetic: args.synthetic,
        seed: config.bootstrap.seed,
    };

    // Price and macro sources
    let price_source = build_price_source(&config)?;
    let macro_source = if args.offline {
        None
    } else {
        build_macro_source(&config)?
    };

    let data = load_prices(&config.portfolio.tickers, Some(price_source.as_ref()), &opts)?;
    let report = run_analysis(&config, &data, macro_source.as_deref())?;

    // Print summary
    println!("{}", generate_report(&report));

    let run_dir = save_artifacts(&report, &args.output_dir)?;
    println!("Artifacts saved to: {}", run_dir.display());

    Ok(())
}

/// Layer command-line flags over the file or default configuration.
fn apply_overrides(config: &mut AnalysisConfig, args: &AnalyzeArgs) -> Result<()> {
    let p = &mut config.portfolio;
    if let Some(spec) = &args.weights {
        let weights = parse_weights(spec)?;
        p.tickers = weights.keys().cloned().collect();
        p.weights = Some(weights);
    } else if !args.tickers.is_empty() {
        p.tickers = args.tickers.iter().map(|t| t.to_uppercase()).collect();
        p.weights = None;
    }
    if let Some(start) = parse_date(args.start.as_deref())? {
        p.start = Some(start);
    }
    if let Some(end) = parse_date(args.end.as_deref())? {
        p.end = Some(end);
    }

    if let Some(model) = &args.trend {
        config.trend.model = parse_trend_model(model)?;
    }
    if let Some(window) = args.window {
        config.trend.smooth_window = window;
    }
    if let Some(rf) = args.rf {
        config.risk.risk_free_rate = rf;
    }
    if let Some(seed) = args.seed {
        config.bootstrap.seed = seed;
    }

    if let Some(dir) = &args.csv_dir {
        config.data.source = PriceSourceKind::Csv;
        config.data.csv_dir = dir.clone();
    }
    if args.no_macro {
        config.data.buffett = false;
    }
    if let Some(key) = args
        .fred_api_key
        .clone()
        .or_else(|| std::env::var("FRED_API_KEY").ok())
    {
        config.data.fred_api_key = Some(key);
    }
    Ok(())
}

fn run_fetch(
    symbols: Vec<String>,
    start: Option<String>,
    end: Option<String>,
    csv_dir: PathBuf,
) -> Result<()> {
    let end_date = parse_date(end.as_deref())?.unwrap_or_else(|| chrono::Local::now().date_naive());
    let start_date =
        parse_date(start.as_deref())?.unwrap_or_else(|| end_date - chrono::Duration::days(365 * 3));

    std::fs::create_dir_all(&csv_dir)
        .with_context(|| format!("failed to create {}", csv_dir.display()))?;
    let provider = YahooProvider::new()?;

    let mut failed = 0;
    for symbol in &symbols {
        let symbol = symbol.to_uppercase();
        match provider.fetch_close(&symbol, start_date, end_date) {
            Ok(prices) => {
                let path = csv_dir.join(format!("{symbol}.csv"));
                write_prices_csv(&path, &prices)?;
                println!("{symbol}: {} closes -> {}", prices.len(), path.display());
            }
            Err(e) => {
                eprintln!("Error for {symbol}: {e}");
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{failed} of {} symbols failed", symbols.len());
    }
    Ok(())
}

fn parse_date(s: Option<&str>) -> Result<Option<NaiveDate>> {
    s.map(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
        .transpose()
        .context("dates must be YYYY-MM-DD")
}

fn parse_trend_model(s: &str) -> Result<TrendModel> {
    match s {
        "log_linear" | "log" => Ok(TrendModel::LogLinear),
        "moving_average" | "sma" => Ok(TrendModel::MovingAverage),
        _ => bail!("unknown trend model '{s}'. Valid: log_linear, moving_average"),
    }
}

/// Parse `"SPY=0.6,TLT=0.4"` into a weight map.
fn parse_weights(spec: &str) -> Result<BTreeMap<String, f64>> {
    let mut weights = BTreeMap::new();
    for pair in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let Some((symbol, weight)) = pair.split_once('=') else {
            bail!("weight '{pair}' must look like SYMBOL=WEIGHT");
        };
        let weight: f64 = weight
            .trim()
            .parse()
            .with_context(|| format!("invalid weight for {symbol}"))?;
        weights.insert(symbol.trim().to_uppercase(), weight);
    }
    if weights.is_empty() {
        bail!("--weights is empty");
    }
    Ok(weights)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_parse_and_uppercase() {
        let w = parse_weights("spy=0.6, tlt = 0.4").unwrap();
        assert_eq!(w["SPY"], 0.6);
        assert_eq!(w["TLT"], 0.4);
    }

    #[test]
    fn malformed_weights_rejected() {
        assert!(parse_weights("SPY").is_err());
        assert!(parse_weights("SPY=abc").is_err());
        assert!(parse_weights(" , ").is_err());
    }

    #[test]
    fn trend_model_names() {
        assert_eq!(parse_trend_model("sma").unwrap(), TrendModel::MovingAverage);
        assert_eq!(parse_trend_model("log_linear").unwrap(), TrendModel::LogLinear);
        assert!(parse_trend_model("cubic").is_err());
    }

    #[test]
    fn dates_parse_or_fail() {
        assert_eq!(
            parse_date(Some("2024-02-29")).unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 29)
        );
        assert_eq!(parse_date(None).unwrap(), None);
        assert!(parse_date(Some("02/29/2024")).is_err());
    }

    #[test]
    fn weights_flag_overrides_tickers() {
        let args = parse_analyze(&[
            "--ticker", "AAPL", "--weights", "SPY=3,TLT=1", "--trend", "sma", "--no-macro",
        ]);
        let mut config = AnalysisConfig::default();
        apply_overrides(&mut config, &args).unwrap();
        assert_eq!(config.portfolio.tickers, vec!["SPY", "TLT"]);
        assert_eq!(config.trend.model, TrendModel::MovingAverage);
        assert!(!config.data.buffett);
    }

    fn parse_analyze(args: &[&str]) -> AnalyzeArgs {
        let argv = ["valuelab", "analyze"].iter().chain(args).copied();
        match Cli::parse_from(argv).command {
            Commands::Analyze(a) => a,
            _ => unreachable!(),
        }
    }
}
