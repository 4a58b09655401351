//! Error taxonomy for the estimation core.
//!
//! Only structural problems are errors: empty input, misaligned assets,
//! invalid parameters, or a request over the resample budget. Insufficient
//! data for a fit and degenerate sub-results are reported inside the result
//! types instead.

use thiserror::Error;

use crate::series::SeriesError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EstimationError {
    #[error("empty input: {0}")]
    EmptyInput(&'static str),

    #[error("insufficient data: need at least {required} observations, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("no overlap between return assets {assets:?} and weighted assets {weights:?}")]
    NoOverlap {
        assets: Vec<String>,
        weights: Vec<String>,
    },

    #[error("weights of the overlapping assets sum to zero")]
    DegenerateWeights,

    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error(
        "resource limit: {windows} windows x {n_resamples} resamples exceeds the budget of {budget}"
    )]
    ResourceLimit {
        windows: usize,
        n_resamples: usize,
        budget: u64,
    },

    #[error(transparent)]
    Series(#[from] SeriesError),
}

impl EstimationError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}
