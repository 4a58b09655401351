//! Return aggregation: price sequences to return sequences, and a weighted
//! basket of per-asset returns to one portfolio return sequence.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::EstimationError;
use crate::series::{PriceFrame, TimeSeries};

/// Name given to the combined portfolio return series.
pub const PORTFOLIO_NAME: &str = "portfolio";

/// Non-negative asset weights, keyed by asset identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, f64>", into = "BTreeMap<String, f64>")]
pub struct Weights(BTreeMap<String, f64>);

impl Weights {
    /// Validate that every weight is finite and non-negative.
    pub fn new(weights: BTreeMap<String, f64>) -> Result<Self, EstimationError> {
        if weights.is_empty() {
            return Err(EstimationError::EmptyInput("weights"));
        }
        if let Some((asset, w)) = weights.iter().find(|(_, w)| !w.is_finite() || **w < 0.0) {
            return Err(EstimationError::invalid(
                "weights",
                format!("weight for '{asset}' must be finite and non-negative, got {w}"),
            ));
        }
        Ok(Self(weights))
    }

    /// Equal weights over `assets`.
    pub fn equal<S: AsRef<str>>(assets: &[S]) -> Result<Self, EstimationError> {
        let w = 1.0 / assets.len().max(1) as f64;
        Self::new(
            assets
                .iter()
                .map(|a| (a.as_ref().to_string(), w))
                .collect(),
        )
    }

    pub fn get(&self, asset: &str) -> Option<f64> {
        self.0.get(asset).copied()
    }

    pub fn assets(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, &v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.0.values().sum()
    }

    /// Drop assets that fail `available`, then rescale the rest to sum to 1.
    pub fn restricted_to(
        &self,
        available: impl Fn(&str) -> bool,
    ) -> Result<Self, EstimationError> {
        let kept: BTreeMap<String, f64> = self
            .0
            .iter()
            .filter(|(asset, _)| available(asset))
            .map(|(asset, &w)| (asset.clone(), w))
            .collect();
        if kept.is_empty() {
            return Err(EstimationError::EmptyInput("weights after restriction"));
        }
        let total: f64 = kept.values().sum();
        if total <= 0.0 {
            return Err(EstimationError::DegenerateWeights);
        }
        Ok(Self(
            kept.into_iter().map(|(asset, w)| (asset, w / total)).collect(),
        ))
    }
}

impl TryFrom<BTreeMap<String, f64>> for Weights {
    type Error = EstimationError;

    fn try_from(map: BTreeMap<String, f64>) -> Result<Self, Self::Error> {
        Self::new(map)
    }
}

impl From<Weights> for BTreeMap<String, f64> {
    fn from(weights: Weights) -> Self {
        weights.0
    }
}

/// A portfolio return series plus the renormalized weights that produced it.
#[derive(Debug, Clone, Serialize)]
pub struct PortfolioReturns {
    pub series: TimeSeries,
    pub weights_used: Weights,
}

/// Period-over-period fractional change of one price series.
///
/// The output starts at the second price date; the first timestamp has no
/// return. A missing price on either side yields `NaN` for that period.
pub fn simple_returns(prices: &TimeSeries) -> Result<TimeSeries, EstimationError> {
    if prices.len() < 2 {
        return Err(EstimationError::InsufficientData {
            required: 2,
            actual: prices.len(),
        });
    }
    let values = pct_change(prices.values());
    Ok(TimeSeries::derived(
        prices.name(),
        prices.dates()[1..].to_vec(),
        values,
    ))
}

/// Per-asset returns over the shared index.
///
/// Only rows where every asset is undefined are dropped (always the leading
/// row). Rows with partial gaps are kept; they are resolved at the portfolio
/// combination step.
pub fn returns(prices: &PriceFrame) -> Result<PriceFrame, EstimationError> {
    if prices.n_assets() == 0 {
        return Err(EstimationError::EmptyInput("price frame has no assets"));
    }
    if prices.len() < 2 {
        return Err(EstimationError::InsufficientData {
            required: 2,
            actual: prices.len(),
        });
    }

    let changed: BTreeMap<String, Vec<f64>> = prices
        .columns()
        .map(|(asset, values)| (asset.to_string(), pct_change(values)))
        .collect();

    let keep: Vec<usize> = (0..prices.len() - 1)
        .filter(|&row| changed.values().any(|col| !col[row].is_nan()))
        .collect();

    let dates: Vec<NaiveDate> = keep.iter().map(|&row| prices.dates()[row + 1]).collect();
    let columns: BTreeMap<String, Vec<f64>> = changed
        .into_iter()
        .map(|(asset, col)| {
            let kept = keep.iter().map(|&row| col[row]).collect::<Vec<f64>>();
            (asset, kept)
        })
        .collect();

    Ok(PriceFrame::new(dates, columns)?)
}

/// Weighted portfolio return per timestamp.
///
/// Weights are restricted to assets present in `returns` and renormalized to
/// sum to 1. Fails loudly when no weighted asset is present. Rows where any
/// positively weighted asset is undefined are dropped.
pub fn portfolio_returns(
    returns: &PriceFrame,
    weights: &Weights,
) -> Result<PortfolioReturns, EstimationError> {
    let no_overlap = || EstimationError::NoOverlap {
        assets: returns.asset_names(),
        weights: weights.assets(),
    };
    if !weights.iter().any(|(asset, _)| returns.column(asset).is_some()) {
        return Err(no_overlap());
    }
    let weights_used = weights.restricted_to(|asset| returns.column(asset).is_some())?;

    let legs: Vec<(&[f64], f64)> = weights_used
        .iter()
        .filter(|&(_, w)| w > 0.0)
        .filter_map(|(asset, w)| returns.column(asset).map(|col| (col, w)))
        .collect();

    let (dates, values): (Vec<NaiveDate>, Vec<f64>) = returns
        .dates()
        .iter()
        .enumerate()
        .map(|(row, &date)| {
            let r = legs.iter().map(|(col, w)| col[row] * w).sum::<f64>();
            (date, r)
        })
        .filter(|(_, r)| !r.is_nan())
        .unzip();

    Ok(PortfolioReturns {
        series: TimeSeries::derived(PORTFOLIO_NAME, dates, values),
        weights_used,
    })
}

fn pct_change(values: &[f64]) -> Vec<f64> {
    values.windows(2).map(|w| w[1] / w[0] - 1.0).collect()
}
