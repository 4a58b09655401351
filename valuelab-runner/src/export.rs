//! Reporting and export: JSON, CSV, and Markdown artifact generation.
//!
//! Provides three export formats for analysis results:
//! - **JSON**: the full report with schema versioning
//! - **CSV**: price vs. trend, rolling Sharpe, the rolling bootstrap band and
//!   the Buffett indicator, for charting front-ends
//! - **Markdown**: a human-readable summary, also printed by the CLI
//!
//! Artifacts land in `{output_dir}/{fingerprint prefix}/`, so rerunning an
//! identical configuration overwrites its own directory.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use valuelab_core::{Regime, RollingInterval, TimeSeries};

use crate::analysis::AnalysisReport;

/// Hex characters of the fingerprint used for the artifact directory name.
const DIR_PREFIX_LEN: usize = 12;

// ─── JSON export ────────────────────────────────────────────────────

/// Serialize an `AnalysisReport` to pretty JSON.
///
/// Non-finite numbers are written as `null`.
pub fn export_json(report: &AnalysisReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("failed to serialize AnalysisReport to JSON")
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Export level, trend and percent distance on the trend's dates.
///
/// Columns: date, level, trend, pct_distance
pub fn export_trend_csv(level: &TimeSeries, trend: &TimeSeries) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["date", "level", "trend", "pct_distance"])?;
    for (date, t) in trend.iter() {
        let p = level.get(date).unwrap_or(f64::NAN);
        wtr.write_record([
            date.to_string(),
            fmt_value(p),
            fmt_value(t),
            fmt_value((p - t) / t * 100.0),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Export the rolling bootstrap band.
///
/// Columns: date, mean, lower, upper
pub fn export_rolling_csv(band: &[RollingInterval]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["date", "mean", "lower", "upper"])?;
    for rec in band {
        wtr.write_record([
            rec.date.to_string(),
            fmt_value(rec.mean),
            fmt_value(rec.lower),
            fmt_value(rec.upper),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Export a single series as `date,<name>`.
pub fn export_series_csv(series: &TimeSeries) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["date", series.name()])?;
    for (date, v) in series.iter() {
        wtr.write_record([date.to_string(), fmt_value(v)])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Undefined values become empty cells.
fn fmt_value(v: f64) -> String {
    if v.is_finite() {
        format!("{v}")
    } else {
        String::new()
    }
}

// ─── Artifact persistence ───────────────────────────────────────────

/// Save all artifacts for an analysis to a fingerprint-named directory.
///
/// Creates `output_dir/{fingerprint[..12]}/` containing:
/// - `report.json`: full report
/// - `report.md`: Markdown summary
/// - `trend.csv`: level vs. trend
/// - `rolling_sharpe.csv`: rolling annualized Sharpe
/// - `rolling_ci.csv`: rolling bootstrap band
/// - `buffett.csv`: Buffett indicator, when fetched
///
/// Returns the path to the created directory.
pub fn save_artifacts(report: &AnalysisReport, output_dir: &Path) -> Result<PathBuf> {
    let prefix: String = report.fingerprint.chars().take(DIR_PREFIX_LEN).collect();
    let run_dir = output_dir.join(prefix);
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    let series = &report.series;
    write(&run_dir, "report.json", &export_json(report)?)?;
    write(&run_dir, "report.md", &generate_report(report))?;
    write(&run_dir, "trend.csv", &export_trend_csv(&series.level, &series.trend)?)?;
    write(
        &run_dir,
        "rolling_sharpe.csv",
        &export_series_csv(&series.rolling_sharpe)?,
    )?;
    write(&run_dir, "rolling_ci.csv", &export_rolling_csv(&series.rolling_band)?)?;
    if let Some(buffett) = &series.buffett {
        write(&run_dir, "buffett.csv", &export_series_csv(buffett)?)?;
    }

    log::info!("artifacts saved to {}", run_dir.display());
    Ok(run_dir)
}

fn write(dir: &Path, name: &str, content: &str) -> Result<()> {
    let path = dir.join(name);
    std::fs::write(&path, content).with_context(|| format!("failed to write {}", path.display()))
}

// ─── Markdown reports ───────────────────────────────────────────────

/// Generate a Markdown summary of an analysis.
pub fn generate_report(report: &AnalysisReport) -> String {
    let mut md = String::new();
    let tickers = report.config.portfolio.tickers.join(", ");

    let _ = writeln!(md, "# Valuation & Risk: {tickers}\n");
    if report.synthetic {
        let _ = writeln!(md, "> **SYNTHETIC DATA**: not real market prices.\n");
    }
    if let (Some(first), Some(last)) = (report.first_date, report.last_date) {
        let _ = writeln!(md, "Period: {first} to {last}\n");
    }
    if report.weights_used.len() > 1 {
        let _ = writeln!(md, "| Asset | Weight |");
        let _ = writeln!(md, "|-------|--------|");
        for (asset, w) in report.weights_used.iter() {
            let _ = writeln!(md, "| {asset} | {:.1}% |", w * 100.0);
        }
        let _ = writeln!(md);
    }

    // Trend
    let t = &report.trend;
    let _ = writeln!(md, "## Trend ({:?}, on {})\n", t.model, t.fitted_on);
    let _ = writeln!(md, "| Metric | Value |");
    let _ = writeln!(md, "|--------|-------|");
    let _ = writeln!(md, "| Latest level | {} |", fmt_opt(t.latest_level, 2));
    let _ = writeln!(md, "| Latest trend | {} |", fmt_opt(t.latest_trend, 2));
    let _ = writeln!(
        md,
        "| Distance from trend | {} |",
        fmt_pct(t.latest_distance_pct)
    );
    if let Some(g) = t.annualized_growth {
        let _ = writeln!(md, "| Trend growth (annual) | {:.2}% |", g * 100.0);
    }
    let r = &t.reversion;
    let _ = writeln!(md, "| Runs around trend | {} |", r.runs);
    let _ = writeln!(md, "| Mean run length (days) | {} |", fmt_opt(r.mean_duration, 1));
    let _ = writeln!(md, "| Reversion rate (1/day) | {} |", fmt_opt(r.exponential_rate, 4));
    let _ = writeln!(md);

    // Risk
    let _ = writeln!(md, "## Risk\n");
    let _ = writeln!(md, "| Metric | Value |");
    let _ = writeln!(md, "|--------|-------|");
    let _ = writeln!(md, "| Returns | {} |", report.returns.observations);
    let _ = writeln!(
        md,
        "| Sharpe (annualized) | {} |",
        fmt_opt(report.returns.annualized_sharpe, 2)
    );
    match &report.sharpe {
        Some(s) => {
            let a = s.annualized;
            let _ = writeln!(
                md,
                "| Sharpe 90% band (annualized) | [{:.2}, {:.2}] ({:?}) |",
                a.lower, a.upper, s.verdict
            );
        }
        None => {
            let _ = writeln!(md, "| Sharpe 90% band | undefined |");
        }
    }
    let m = &report.mean_return;
    let _ = writeln!(
        md,
        "| Mean daily return {:.0}% CI | {:.4}% [{:.4}%, {:.4}%] |",
        m.level * 100.0,
        m.estimate * 100.0,
        m.lower * 100.0,
        m.upper * 100.0
    );
    let _ = writeln!(
        md,
        "| Rolling Sharpe (latest) | {} |",
        fmt_opt(report.latest_rolling_sharpe, 2)
    );
    for regime in Regime::ALL {
        let stat = report.regime_sharpe.get(regime);
        let _ = writeln!(
            md,
            "| Sharpe, {} vol ({} obs) | {} |",
            regime.label(),
            stat.observations,
            fmt_opt(stat.sharpe, 2)
        );
    }
    if let Some(latest) = report.rolling_band.latest {
        let _ = writeln!(
            md,
            "| Rolling {}d mean band (latest) | [{:.4}%, {:.4}%] |",
            report.rolling_band.window,
            latest.lower * 100.0,
            latest.upper * 100.0
        );
    }
    let _ = writeln!(md);

    // Distribution
    if let Some(d) = report.distribution.report() {
        let _ = writeln!(md, "## Return Distribution\n");
        let _ = writeln!(md, "| Metric | Value |");
        let _ = writeln!(md, "|--------|-------|");
        let _ = writeln!(md, "| Skewness | {:.3} |", d.skewness);
        let _ = writeln!(md, "| Excess kurtosis | {:.3} |", d.excess_kurtosis);
        let _ = writeln!(
            md,
            "| Jarque-Bera | {:.2} (p = {:.4}) |",
            d.jarque_bera.statistic, d.jarque_bera.p_value
        );
        match &d.student_t {
            valuelab_core::StudentTFit::Converged { df, .. } => {
                let _ = writeln!(md, "| Student-t df | {df:.2} |");
            }
            valuelab_core::StudentTFit::Failed { reason } => {
                let _ = writeln!(md, "| Student-t df | failed: {reason} |");
            }
        }
        let _ = writeln!(md);
    }

    // Macro
    if let Some(b) = &report.buffett {
        let _ = writeln!(md, "## Buffett Indicator\n");
        let _ = writeln!(
            md,
            "Market cap / GDP: **{:.1}%** as of {} (period mean {:.1}%, source {})\n",
            b.latest_ratio * 100.0,
            b.latest_date,
            b.mean_ratio * 100.0,
            b.source
        );
    }

    if !report.warnings.is_empty() {
        let _ = writeln!(md, "## Warnings\n");
        for w in &report.warnings {
            let _ = writeln!(md, "- {w}");
        }
    }

    md
}

fn fmt_opt(v: Option<f64>, decimals: usize) -> String {
    match v {
        Some(x) if x.is_finite() => format!("{x:.decimals$}"),
        _ => "n/a".to_string(),
    }
}

fn fmt_pct(v: Option<f64>) -> String {
    match v {
        Some(x) if x.is_finite() => format!("{x:+.2}%"),
        _ => "n/a".to_string(),
    }
}
