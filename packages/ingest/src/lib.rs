#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Loading sighting datasets from CSV.
//!
//! Observation exports, keyed comparison series, daily measurements
//! averaged per year, and the merge of several yearly exports into one
//! date-ordered file.

pub mod measurements;
pub mod merge;
pub mod observations;
pub mod series;

use monarch_map_analytics_models::InvalidSeriesError;
use thiserror::Error;

pub use measurements::{load_yearly_means, read_yearly_means};
pub use merge::{MergedDataset, merge_datasets, merge_files};
pub use observations::{ObservationColumns, load_observations, parse_date, read_observations};
pub use series::{load_series, read_series};

/// Errors that can occur while reading or writing datasets.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Malformed CSV.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// File could not be read or written.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A required column is absent from the header row.
    #[error("Missing column {column:?}")]
    MissingColumn {
        /// Expected header name.
        column: String,
    },

    /// A count cell is present but not an integer.
    #[error("Invalid count {value:?} on line {line}")]
    InvalidCount {
        /// 1-based line number in the source file.
        line: u64,
        /// Raw cell content.
        value: String,
    },

    /// A series row has a key that is not an integer year.
    #[error("Invalid series key {value:?} on line {line}")]
    InvalidSeriesKey {
        /// 1-based line number in the source file.
        line: u64,
        /// Raw cell content.
        value: String,
    },

    /// A series row has a value that is not a number.
    #[error("Invalid series value {value:?} on line {line}")]
    InvalidSeriesValue {
        /// 1-based line number in the source file.
        line: u64,
        /// Raw cell content.
        value: String,
    },

    /// The loaded points do not form a valid series.
    #[error(transparent)]
    Series(#[from] InvalidSeriesError),
}

/// Line number of a record, falling back to `fallback` when the reader
/// does not track positions.
pub(crate) fn record_line(record: &csv::StringRecord, fallback: usize) -> u64 {
    record
        .position()
        .map_or_else(|| u64::try_from(fallback).unwrap_or(u64::MAX), csv::Position::line)
}
