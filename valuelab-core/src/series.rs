//! Time-indexed series types shared by every estimator.
//!
//! A `TimeSeries` is a single named column on a strictly increasing date axis.
//! A `PriceFrame` is several asset columns on one shared axis. Missing values
//! are `NaN`; gaps in the date axis are allowed and never interpolated.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use thiserror::Error;

/// Errors raised when constructing series with a broken index.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SeriesError {
    #[error("length mismatch: {dates} dates vs {values} values")]
    LengthMismatch { dates: usize, values: usize },

    #[error("dates must be strictly increasing (violation at index {index}: {date})")]
    NonIncreasingDates { index: usize, date: NaiveDate },

    #[error("duplicate asset column '{0}'")]
    DuplicateAsset(String),
}

/// A named, time-indexed sequence of `f64` values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSeries {
    name: String,
    dates: Vec<NaiveDate>,
    values: Vec<f64>,
}

impl TimeSeries {
    /// Build a series, validating that `dates` is strictly increasing.
    pub fn new(
        name: impl Into<String>,
        dates: Vec<NaiveDate>,
        values: Vec<f64>,
    ) -> Result<Self, SeriesError> {
        check_index(&dates)?;
        if dates.len() != values.len() {
            return Err(SeriesError::LengthMismatch {
                dates: dates.len(),
                values: values.len(),
            });
        }
        Ok(Self {
            name: name.into(),
            dates,
            values,
        })
    }

    /// Build a series from `(date, value)` pairs in time order.
    pub fn from_pairs(
        name: impl Into<String>,
        pairs: impl IntoIterator<Item = (NaiveDate, f64)>,
    ) -> Result<Self, SeriesError> {
        let (dates, values): (Vec<_>, Vec<_>) = pairs.into_iter().unzip();
        Self::new(name, dates, values)
    }

    /// Derived series whose index is a subsequence of an already validated one.
    pub(crate) fn derived(name: impl Into<String>, dates: Vec<NaiveDate>, values: Vec<f64>) -> Self {
        debug_assert_eq!(dates.len(), values.len());
        debug_assert!(dates.windows(2).all(|w| w[0] < w[1]));
        Self {
            name: name.into(),
            dates,
            values,
        }
    }

    pub fn empty(name: impl Into<String>) -> Self {
        Self::derived(name, Vec::new(), Vec::new())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Same data under a different name.
    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Value at `date`, if the date is on the index.
    pub fn get(&self, date: NaiveDate) -> Option<f64> {
        self.dates
            .binary_search(&date)
            .ok()
            .map(|i| self.values[i])
    }

    /// Last `(date, value)` pair.
    pub fn last(&self) -> Option<(NaiveDate, f64)> {
        self.dates.last().copied().zip(self.values.last().copied())
    }

    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, f64)> + '_ {
        self.dates.iter().copied().zip(self.values.iter().copied())
    }

    /// Copy with every `NaN` row removed.
    pub fn dropna(&self) -> Self {
        self.filter(|v| !v.is_nan())
    }

    /// Copy keeping only the rows whose value satisfies `keep`.
    pub fn filter(&self, mut keep: impl FnMut(f64) -> bool) -> Self {
        let (dates, values) = self.iter().filter(|&(_, v)| keep(v)).unzip();
        Self::derived(self.name.clone(), dates, values)
    }

    /// Keep only rows within `[start, end]`.
    pub fn between(&self, start: NaiveDate, end: NaiveDate) -> Self {
        let (dates, values) = self
            .iter()
            .filter(|&(d, _)| d >= start && d <= end)
            .unzip();
        Self::derived(self.name.clone(), dates, values)
    }
}

/// Several asset columns aligned on one shared date axis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceFrame {
    dates: Vec<NaiveDate>,
    columns: BTreeMap<String, Vec<f64>>,
}

impl PriceFrame {
    /// Build a frame from a date axis and equally long columns.
    pub fn new(
        dates: Vec<NaiveDate>,
        columns: BTreeMap<String, Vec<f64>>,
    ) -> Result<Self, SeriesError> {
        check_index(&dates)?;
        for values in columns.values() {
            if values.len() != dates.len() {
                return Err(SeriesError::LengthMismatch {
                    dates: dates.len(),
                    values: values.len(),
                });
            }
        }
        Ok(Self { dates, columns })
    }

    /// Align several series onto the union of their dates.
    ///
    /// A series missing a date gets `NaN` there. Nothing is forward-filled;
    /// rows with partial data are resolved later, at portfolio combination.
    pub fn align(series: &[TimeSeries]) -> Result<Self, SeriesError> {
        let mut seen = BTreeSet::new();
        for s in series {
            if !seen.insert(s.name()) {
                return Err(SeriesError::DuplicateAsset(s.name().to_string()));
            }
        }

        let all_dates: BTreeSet<NaiveDate> = series
            .iter()
            .flat_map(|s| s.dates().iter().copied())
            .collect();
        let dates: Vec<NaiveDate> = all_dates.into_iter().collect();
        let position: HashMap<NaiveDate, usize> =
            dates.iter().enumerate().map(|(i, &d)| (d, i)).collect();

        let mut columns = BTreeMap::new();
        for s in series {
            let mut column = vec![f64::NAN; dates.len()];
            for (date, value) in s.iter() {
                column[position[&date]] = value;
            }
            columns.insert(s.name().to_string(), column);
        }

        Ok(Self { dates, columns })
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn n_assets(&self) -> usize {
        self.columns.len()
    }

    pub fn asset_names(&self) -> Vec<String> {
        self.columns.keys().cloned().collect()
    }

    pub fn column(&self, asset: &str) -> Option<&[f64]> {
        self.columns.get(asset).map(|v| v.as_slice())
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// One asset as a standalone series (still `NaN` where the asset is missing).
    pub fn series(&self, asset: &str) -> Option<TimeSeries> {
        self.columns
            .get(asset)
            .map(|values| TimeSeries::derived(asset, self.dates.clone(), values.clone()))
    }
}

fn check_index(dates: &[NaiveDate]) -> Result<(), SeriesError> {
    match dates.windows(2).position(|w| w[0] >= w[1]) {
        Some(i) => Err(SeriesError::NonIncreasingDates {
            index: i + 1,
            date: dates[i + 1],
        }),
        None => Ok(()),
    }
}

/// Consecutive calendar days starting at 2024-01-01, for tests.
#[cfg(test)]
pub(crate) fn test_dates(n: usize) -> Vec<NaiveDate> {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    (0..n)
        .map(|i| start + chrono::Duration::days(i as i64))
        .collect()
}

/// Series named `name` over `test_dates(values.len())`.
#[cfg(test)]
pub(crate) fn test_series(name: &str, values: &[f64]) -> TimeSeries {
    TimeSeries::new(name, test_dates(values.len()), values.to_vec()).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    #[test]
    fn rejects_duplicate_dates() {
        let err = TimeSeries::new("x", vec![d(1), d(2), d(2)], vec![1.0, 2.0, 3.0]).unwrap_err();
        assert_eq!(
            err,
            SeriesError::NonIncreasingDates {
                index: 2,
                date: d(2)
            }
        );
    }

    #[test]
    fn rejects_unsorted_dates() {
        assert!(TimeSeries::new("x", vec![d(3), d(1)], vec![1.0, 2.0]).is_err());
    }

    #[test]
    fn rejects_length_mismatch() {
        let err = TimeSeries::new("x", vec![d(1), d(2)], vec![1.0]).unwrap_err();
        assert_eq!(err, SeriesError::LengthMismatch { dates: 2, values: 1 });
    }

    #[test]
    fn dropna_keeps_gaps_uninterpolated() {
        let s = TimeSeries::new("x", vec![d(1), d(2), d(5)], vec![1.0, f64::NAN, 3.0]).unwrap();
        let clean = s.dropna();
        assert_eq!(clean.dates(), &[d(1), d(5)]);
        assert_eq!(clean.values(), &[1.0, 3.0]);
    }

    #[test]
    fn get_by_date() {
        let s = TimeSeries::new("x", vec![d(1), d(3)], vec![10.0, 30.0]).unwrap();
        assert_eq!(s.get(d(3)), Some(30.0));
        assert_eq!(s.get(d(2)), None);
    }

    #[test]
    fn align_fills_missing_with_nan() {
        let a = TimeSeries::new("A", vec![d(1), d(2), d(3)], vec![1.0, 2.0, 3.0]).unwrap();
        let b = TimeSeries::new("B", vec![d(2), d(4)], vec![20.0, 40.0]).unwrap();
        let frame = PriceFrame::align(&[a, b]).unwrap();

        assert_eq!(frame.dates(), &[d(1), d(2), d(3), d(4)]);
        let col_b = frame.column("B").unwrap();
        assert!(col_b[0].is_nan());
        assert_eq!(col_b[1], 20.0);
        assert!(col_b[2].is_nan());
        assert_eq!(col_b[3], 40.0);
        assert!(frame.column("A").unwrap()[3].is_nan());
    }

    #[test]
    fn align_rejects_duplicate_names() {
        let a = test_series("A", &[1.0, 2.0]);
        let err = PriceFrame::align(&[a.clone(), a]).unwrap_err();
        assert_eq!(err, SeriesError::DuplicateAsset("A".into()));
    }
}
