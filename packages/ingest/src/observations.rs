//! Observation CSV loading.
//!
//! Rows carry a coordinate plus optional date, count and state columns.
//! Unparseable coordinates are kept as NaN so the enrichment run can count
//! them as invalid instead of silently losing the row. Unparseable dates
//! become `None`. A count cell that is present but not an integer fails
//! the whole load.

use std::io::Read;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use monarch_map_region_models::Observation;

use crate::{IngestError, record_line};

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// Header names of the observation columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservationColumns {
    /// Latitude column (required).
    pub latitude: String,
    /// Longitude column (required).
    pub longitude: String,
    /// Date column (optional).
    pub date: String,
    /// Sighting count column (optional).
    pub count: String,
    /// State/province column (optional).
    pub state: String,
}

impl Default for ObservationColumns {
    fn default() -> Self {
        Self {
            latitude: "Latitude".to_string(),
            longitude: "Longitude".to_string(),
            date: "Date".to_string(),
            count: "Number".to_string(),
            state: "State/Province".to_string(),
        }
    }
}

/// Parses a date cell in any of the accepted formats.
///
/// Returns `None` for empty or unrecognized input.
#[must_use]
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
                .map(|dt| dt.date())
        })
}

/// Reads observations from a CSV file.
///
/// # Errors
///
/// See [`read_observations`].
pub fn load_observations(
    path: &Path,
    columns: &ObservationColumns,
) -> Result<Vec<Observation>, IngestError> {
    let file = std::fs::File::open(path)?;
    let observations = read_observations(file, columns)?;
    log::info!(
        "Loaded {} observations from {}",
        observations.len(),
        path.display()
    );
    Ok(observations)
}

/// Reads observations from CSV data with a header row.
///
/// # Errors
///
/// * [`IngestError::MissingColumn`] if the latitude or longitude column is
///   absent
/// * [`IngestError::InvalidCount`] if a count cell is not an integer
/// * [`IngestError::Csv`] for malformed CSV
pub fn read_observations(
    reader: impl Read,
    columns: &ObservationColumns,
) -> Result<Vec<Observation>, IngestError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);

    let headers = reader.headers()?.clone();
    let position = |name: &str| headers.iter().position(|h| h.trim() == name);
    let required = |name: &str| {
        position(name).ok_or_else(|| IngestError::MissingColumn {
            column: name.to_string(),
        })
    };

    let lat_idx = required(&columns.latitude)?;
    let lon_idx = required(&columns.longitude)?;
    let date_idx = position(&columns.date);
    let count_idx = position(&columns.count);
    let state_idx = position(&columns.state);

    let mut observations = Vec::new();
    let mut bad_coordinates = 0usize;

    for (i, result) in reader.records().enumerate() {
        let record = result?;
        let line = record_line(&record, i + 2);
        let cell = |idx: Option<usize>| {
            idx.and_then(|idx| record.get(idx))
                .map(str::trim)
                .filter(|s| !s.is_empty())
        };

        let latitude = parse_coordinate(cell(Some(lat_idx)));
        let longitude = parse_coordinate(cell(Some(lon_idx)));
        if latitude.is_nan() || longitude.is_nan() {
            bad_coordinates += 1;
            log::debug!("Line {line}: unparseable coordinate");
        }

        let count = cell(count_idx)
            .map(|raw| {
                parse_count(raw).ok_or_else(|| IngestError::InvalidCount {
                    line,
                    value: raw.to_string(),
                })
            })
            .transpose()?;

        observations.push(Observation {
            latitude,
            longitude,
            timestamp: cell(date_idx).and_then(parse_date),
            count,
            state: cell(state_idx).map(String::from),
        });
    }

    if bad_coordinates > 0 {
        log::warn!("{bad_coordinates} rows have unparseable coordinates");
    }

    Ok(observations)
}

fn parse_coordinate(raw: Option<&str>) -> f64 {
    raw.and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(f64::NAN)
}

/// Integer counts, also accepting integral floats like `"3.0"` that
/// spreadsheet exports produce.
#[allow(clippy::cast_possible_truncation)]
fn parse_count(raw: &str) -> Option<i64> {
    if let Ok(n) = raw.parse::<i64>() {
        return Some(n);
    }
    let f = raw.parse::<f64>().ok()?;
    (f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15).then_some(f as i64)
}
