//! Daily measurement CSVs averaged into yearly series.
//!
//! Environmental exports (ozone, temperature) carry one row per site and
//! day. Correlating them against yearly sighting totals needs one value
//! per year, so every requested column is averaged over the rows that
//! fall in each calendar year.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use chrono::Datelike as _;
use monarch_map_analytics_models::TimeSeries;

use crate::observations::parse_date;
use crate::{IngestError, record_line};

/// Running sum and sample count for one year of one column.
#[derive(Debug, Default, Clone, Copy)]
struct Mean {
    sum: f64,
    samples: u32,
}

impl Mean {
    fn value(self) -> f64 {
        self.sum / f64::from(self.samples)
    }
}

/// Reads a measurement CSV and averages `value_columns` per year.
///
/// # Errors
///
/// See [`read_yearly_means`].
pub fn load_yearly_means(
    path: &Path,
    date_column: &str,
    value_columns: &[String],
) -> Result<Vec<TimeSeries<i32>>, IngestError> {
    let file = std::fs::File::open(path)?;
    let series = read_yearly_means(file, date_column, value_columns)?;
    log::info!(
        "Averaged {} measurement columns per year from {}",
        series.len(),
        path.display()
    );
    Ok(series)
}

/// Averages each of `value_columns` per calendar year of `date_column`.
///
/// Returns one series per value column, named after the column and in
/// the order given. Rows without a usable date are skipped. Blank and
/// `NaN` cells are missing samples: they do not count towards that
/// column's mean, and a year with no samples is absent from the series.
///
/// # Errors
///
/// * [`IngestError::MissingColumn`] if the date or a value column is
///   absent
/// * [`IngestError::InvalidSeriesValue`] for a non-numeric value cell
/// * [`IngestError::Series`] if a mean is not finite
/// * [`IngestError::Csv`] for malformed CSV
pub fn read_yearly_means(
    reader: impl Read,
    date_column: &str,
    value_columns: &[String],
) -> Result<Vec<TimeSeries<i32>>, IngestError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);

    let headers = reader.headers()?.clone();
    let required = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| IngestError::MissingColumn {
                column: name.to_string(),
            })
    };

    let date_idx = required(date_column)?;
    let value_idx = value_columns
        .iter()
        .map(|name| required(name))
        .collect::<Result<Vec<_>, _>>()?;

    let mut means: Vec<BTreeMap<i32, Mean>> = vec![BTreeMap::new(); value_columns.len()];
    let mut undated = 0usize;

    for (i, result) in reader.records().enumerate() {
        let record = result?;
        let line = record_line(&record, i + 2);

        let Some(year) = record.get(date_idx).and_then(parse_date).map(|d| d.year()) else {
            undated += 1;
            continue;
        };

        for (&idx, by_year) in value_idx.iter().zip(&mut means) {
            let raw = record.get(idx).unwrap_or("").trim();
            if raw.is_empty() {
                continue;
            }
            let value = raw
                .parse::<f64>()
                .map_err(|_| IngestError::InvalidSeriesValue {
                    line,
                    value: raw.to_string(),
                })?;
            if value.is_nan() {
                continue;
            }

            let mean = by_year.entry(year).or_default();
            mean.sum += value;
            mean.samples += 1;
        }
    }

    if undated > 0 {
        log::warn!("Skipped {undated} measurement rows without a usable {date_column:?}");
    }

    value_columns
        .iter()
        .zip(means)
        .map(|(name, by_year)| {
            let points = by_year.into_iter().map(|(year, mean)| (year, mean.value()));
            Ok(TimeSeries::new(name.clone(), points)?)
        })
        .collect()
}
