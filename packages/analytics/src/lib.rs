#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Analytical engine for sightings data.
//!
//! - [`aggregate`] folds resolved observations into per-region counts
//! - [`temporal`] aligns keyed series and computes Pearson correlation
//! - [`yearly`] builds per-year sighting series from raw observations
//!
//! None of this performs I/O. The only hard failure is malformed input
//! (negative counts, invalid series), which aborts the whole batch.

pub mod aggregate;
pub mod temporal;
pub mod yearly;

use monarch_map_analytics_models::InvalidSeriesError;
use thiserror::Error;

/// Errors that can occur during analytics operations.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    /// An observation carried a negative count.
    #[error("Invalid aggregate input: observation {index} has count {count}")]
    InvalidAggregateInput {
        /// Position of the offending observation in the batch.
        index: usize,
        /// The rejected count.
        count: i64,
    },

    /// A series could not be built.
    #[error("Invalid series: {0}")]
    InvalidSeries(#[from] InvalidSeriesError),
}

/// Converts an observation count into an unsigned amount.
///
/// # Errors
///
/// Returns [`AnalyticsError::InvalidAggregateInput`] if `count` is negative.
pub(crate) fn checked_count(index: usize, count: i64) -> Result<u64, AnalyticsError> {
    u64::try_from(count).map_err(|_| AnalyticsError::InvalidAggregateInput { index, count })
}
