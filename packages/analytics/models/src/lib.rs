#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Time series and correlation result types.
//!
//! A [`TimeSeries`] is a named, key-ordered sequence of values with unique
//! keys (typically years). Comparing two series yields a
//! [`CorrelationResult`] whose [`Correlation`] is either a computed
//! coefficient or an explicit [`UndefinedReason`].

use std::fmt;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display};

/// A single keyed value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint<K> {
    /// Alignment key (e.g. a year).
    pub key: K,
    /// Measured value.
    pub value: f64,
}

/// A named series, ordered by key, with unique keys and finite values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSeries<K> {
    name: String,
    points: Vec<TimeSeriesPoint<K>>,
}

impl<K: Ord + fmt::Debug> TimeSeries<K> {
    /// Builds a series, sorting points by key.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidSeriesError`] if two points share a key or a value
    /// is NaN or infinite.
    pub fn new(
        name: impl Into<String>,
        points: impl IntoIterator<Item = (K, f64)>,
    ) -> Result<Self, InvalidSeriesError> {
        let name = name.into();
        let mut points: Vec<TimeSeriesPoint<K>> = points
            .into_iter()
            .map(|(key, value)| TimeSeriesPoint { key, value })
            .collect();

        if let Some(bad) = points.iter().find(|p| !p.value.is_finite()) {
            return Err(InvalidSeriesError::NonFiniteValue {
                series: name,
                key: format!("{:?}", bad.key),
            });
        }

        points.sort_by(|a, b| a.key.cmp(&b.key));

        if let Some(pair) = points.windows(2).find(|w| w[0].key == w[1].key) {
            return Err(InvalidSeriesError::DuplicateKey {
                series: name,
                key: format!("{:?}", pair[0].key),
            });
        }

        Ok(Self { name, points })
    }
}

impl<K> TimeSeries<K> {
    /// Series name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Points in ascending key order.
    #[must_use]
    pub fn points(&self) -> &[TimeSeriesPoint<K>] {
        &self.points
    }

    /// Number of points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the series has no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl<K: Ord> TimeSeries<K> {
    /// Looks up the value at `key`.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<f64> {
        self.points
            .binary_search_by(|p| p.key.cmp(key))
            .ok()
            .map(|i| self.points[i].value)
    }
}

/// Error returned when building a [`TimeSeries`] from invalid points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidSeriesError {
    /// Two points share a key.
    DuplicateKey {
        /// Series name.
        series: String,
        /// The repeated key, debug-formatted.
        key: String,
    },
    /// A value is NaN or infinite.
    NonFiniteValue {
        /// Series name.
        series: String,
        /// Key of the offending point, debug-formatted.
        key: String,
    },
}

impl fmt::Display for InvalidSeriesError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateKey { series, key } => {
                write!(f, "series {series:?} has duplicate key {key}")
            }
            Self::NonFiniteValue { series, key } => {
                write!(f, "series {series:?} has a non-finite value at key {key}")
            }
        }
    }
}

impl std::error::Error for InvalidSeriesError {}

/// Why a correlation could not be computed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UndefinedReason {
    /// Fewer than two keys are shared by both series.
    InsufficientOverlap,
    /// One of the series is constant across the shared keys.
    ZeroVariance,
}

/// A Pearson coefficient, or the reason there is none.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum Correlation {
    /// Computed coefficient in `[-1, 1]`.
    Defined {
        /// Pearson's r.
        coefficient: f64,
    },
    /// No coefficient is statistically defined.
    Undefined {
        /// Why.
        reason: UndefinedReason,
    },
}

impl Correlation {
    /// The coefficient if defined.
    #[must_use]
    pub const fn coefficient(&self) -> Option<f64> {
        match self {
            Self::Defined { coefficient } => Some(*coefficient),
            Self::Undefined { .. } => None,
        }
    }
}

/// Correlation between two named series over their shared keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelationResult {
    /// First series name.
    pub series_a: String,
    /// Second series name.
    pub series_b: String,
    /// Number of keys present in both series.
    pub common_key_count: usize,
    /// The outcome.
    pub correlation: Correlation,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorts_points_by_key() {
        let series = TimeSeries::new("s", [(2023, 3.0), (2021, 1.0), (2022, 2.0)]).unwrap();
        let keys: Vec<i32> = series.points().iter().map(|p| p.key).collect();
        assert_eq!(keys, vec![2021, 2022, 2023]);
        assert_eq!(series.get(&2022), Some(2.0));
        assert_eq!(series.get(&2020), None);
    }

    #[test]
    fn rejects_duplicate_keys() {
        let err = TimeSeries::new("s", [(2021, 1.0), (2021, 2.0)]).unwrap_err();
        assert_eq!(
            err,
            InvalidSeriesError::DuplicateKey {
                series: "s".to_string(),
                key: "2021".to_string(),
            }
        );
    }

    #[test]
    fn rejects_non_finite_values() {
        assert!(TimeSeries::new("s", [(1, f64::NAN)]).is_err());
        assert!(TimeSeries::new("s", [(1, f64::INFINITY)]).is_err());
    }

    #[test]
    fn undefined_serializes_distinctly_from_zero() {
        let undefined = Correlation::Undefined {
            reason: UndefinedReason::InsufficientOverlap,
        };
        let zero = Correlation::Defined { coefficient: 0.0 };

        assert_eq!(
            serde_json::to_value(undefined).unwrap(),
            serde_json::json!({ "status": "undefined", "reason": "insufficient_overlap" })
        );
        assert_eq!(
            serde_json::to_value(zero).unwrap(),
            serde_json::json!({ "status": "defined", "coefficient": 0.0 })
        );
        assert_eq!(undefined.coefficient(), None);
    }
}
