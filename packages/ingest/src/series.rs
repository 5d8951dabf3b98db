//! Keyed series CSV loading.

use std::io::Read;
use std::path::Path;

use monarch_map_analytics_models::TimeSeries;

use crate::{IngestError, record_line};

/// Reads a `(year, value)` series from a CSV file.
///
/// # Errors
///
/// See [`read_series`].
pub fn load_series(name: &str, path: &Path) -> Result<TimeSeries<i32>, IngestError> {
    let file = std::fs::File::open(path)?;
    let series = read_series(name, file)?;
    log::info!(
        "Loaded series {name:?} with {} points from {}",
        series.len(),
        path.display()
    );
    Ok(series)
}

/// Reads a series from CSV data with a header row.
///
/// The first column is the key (an integer year), the second the value.
/// Fully blank rows are skipped.
///
/// # Errors
///
/// * [`IngestError::InvalidSeriesKey`] / [`IngestError::InvalidSeriesValue`]
///   for unparseable cells
/// * [`IngestError::Series`] for duplicate keys or non-finite values
/// * [`IngestError::Csv`] for malformed CSV
pub fn read_series(name: &str, reader: impl Read) -> Result<TimeSeries<i32>, IngestError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let mut points = Vec::new();

    for (i, result) in reader.records().enumerate() {
        let record = result?;
        let line = record_line(&record, i + 2);

        let key_raw = record.get(0).unwrap_or("").trim();
        let value_raw = record.get(1).unwrap_or("").trim();
        if key_raw.is_empty() && value_raw.is_empty() {
            continue;
        }

        let key = key_raw
            .parse::<i32>()
            .map_err(|_| IngestError::InvalidSeriesKey {
                line,
                value: key_raw.to_string(),
            })?;
        let value = value_raw
            .parse::<f64>()
            .map_err(|_| IngestError::InvalidSeriesValue {
                line,
                value: value_raw.to_string(),
            })?;

        points.push((key, value));
    }

    Ok(TimeSeries::new(name, points)?)
}

#[cfg(test)]
mod tests {
    use monarch_map_analytics_models::InvalidSeriesError;

    use super::*;

    #[test]
    fn reads_year_value_pairs() {
        let csv = "year,temperature\n2022,71.5\n2021,70.1\n\n2023,72\n";
        let series = read_series("temperature", csv.as_bytes()).unwrap();

        assert_eq!(series.name(), "temperature");
        assert_eq!(series.len(), 3);
        assert_eq!(series.points()[0].key, 2021);
        assert_eq!(series.get(&2023), Some(72.0));
    }

    #[test]
    fn rejects_non_integer_key() {
        let csv = "year,value\n2021,1\nlast year,2\n";
        let err = read_series("s", csv.as_bytes()).unwrap_err();
        assert!(matches!(
            err,
            IngestError::InvalidSeriesKey { line: 3, value } if value == "last year"
        ));
    }

    #[test]
    fn rejects_non_numeric_value() {
        let csv = "year,value\n2021,\n";
        let err = read_series("s", csv.as_bytes()).unwrap_err();
        assert!(matches!(err, IngestError::InvalidSeriesValue { line: 2, .. }));
    }

    #[test]
    fn rejects_duplicate_years() {
        let csv = "year,value\n2021,1\n2021,2\n";
        let err = read_series("s", csv.as_bytes()).unwrap_err();
        assert!(matches!(
            err,
            IngestError::Series(InvalidSeriesError::DuplicateKey { .. })
        ));
    }

    #[test]
    fn rejects_non_finite_value() {
        let csv = "year,value\n2021,NaN\n";
        let err = read_series("s", csv.as_bytes()).unwrap_err();
        assert!(matches!(
            err,
            IngestError::Series(InvalidSeriesError::NonFiniteValue { .. })
        ));
    }
}
