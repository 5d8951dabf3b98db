//! Merging several observation exports into one date-ordered dataset.
//!
//! Sighting exports usually come one file per year with slightly
//! different columns. The merge takes the union of all header rows (in
//! first-seen order), fills missing cells with empty strings, and
//! stable-sorts the rows by the date column. Rows whose date cannot be
//! parsed sort last, in input order.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::IngestError;
use crate::observations::parse_date;

/// Rows from several CSV inputs aligned to a common header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedDataset {
    /// Union of input headers, first-seen order.
    pub headers: Vec<String>,
    /// Rows in date order, each aligned to `headers`.
    pub rows: Vec<Vec<String>>,
    /// Number of rows whose date was missing or unparseable.
    pub undated_rows: usize,
}

impl MergedDataset {
    /// Writes the dataset as CSV with a header row.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError`] if writing fails.
    pub fn write(&self, writer: impl Write) -> Result<(), IngestError> {
        let mut writer = csv::Writer::from_writer(writer);
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Writes the dataset to a file, replacing it if present.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError`] if the file cannot be created or written.
    pub fn write_to_path(&self, path: &Path) -> Result<(), IngestError> {
        let file = std::fs::File::create(path)?;
        self.write(file)?;
        log::info!("Wrote {} merged rows to {}", self.rows.len(), path.display());
        Ok(())
    }
}

/// Merges CSV files from disk. See [`merge_datasets`].
///
/// # Errors
///
/// Returns [`IngestError`] if any file cannot be opened or parsed.
pub fn merge_files(paths: &[PathBuf], date_column: &str) -> Result<MergedDataset, IngestError> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        log::debug!("Reading {}", path.display());
        files.push(std::fs::File::open(path)?);
    }
    merge_datasets(files, date_column)
}

/// Concatenates CSV inputs and sorts the result by `date_column`.
///
/// # Errors
///
/// Returns [`IngestError::Csv`] if any input is malformed.
pub fn merge_datasets<R: Read>(
    inputs: impl IntoIterator<Item = R>,
    date_column: &str,
) -> Result<MergedDataset, IngestError> {
    let mut headers: Vec<String> = Vec::new();
    let mut rows: Vec<(Option<NaiveDate>, Vec<String>)> = Vec::new();
    let mut input_count = 0usize;

    for input in inputs {
        input_count += 1;
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(input);

        // Position of each input column within the merged header.
        let mapping: Vec<usize> = dedupe_headers(reader.headers()?)
            .into_iter()
            .map(|h| {
                headers.iter().position(|existing| *existing == h).unwrap_or_else(|| {
                    headers.push(h);
                    headers.len() - 1
                })
            })
            .collect();

        let mut overflowing = 0usize;
        for result in reader.records() {
            let record = result?;
            if record.len() > mapping.len() {
                overflowing += 1;
            }
            let mut row = vec![String::new(); headers.len()];
            for (value, &target) in record.iter().zip(&mapping) {
                row[target] = value.to_string();
            }
            rows.push((None, row));
        }
        if overflowing > 0 {
            log::warn!(
                "Input {input_count}: dropped trailing cells from {overflowing} rows wider than \
                 its {} header columns",
                mapping.len()
            );
        }
    }

    let date_idx = headers.iter().position(|h| h == date_column);
    if date_idx.is_none() {
        log::warn!("No {date_column:?} column in any input; rows keep input order");
    }

    let width = headers.len();
    for (date, row) in &mut rows {
        row.resize(width, String::new());
        *date = date_idx.and_then(|idx| parse_date(&row[idx]));
    }

    rows.sort_by_key(|(date, _)| (date.is_none(), *date));

    let undated_rows = rows.iter().filter(|(date, _)| date.is_none()).count();
    log::info!(
        "Merged {} rows from {input_count} inputs ({undated_rows} without a usable date)",
        rows.len()
    );

    Ok(MergedDataset {
        headers,
        rows: rows.into_iter().map(|(_, row)| row).collect(),
        undated_rows,
    })
}

/// Trims header names and suffixes repeats within one file as `name.1`,
/// `name.2` so no two columns share a merged slot.
fn dedupe_headers(raw: &csv::StringRecord) -> Vec<String> {
    let mut seen: Vec<String> = Vec::with_capacity(raw.len());
    for name in raw.iter().map(str::trim) {
        let mut candidate = name.to_string();
        let mut suffix = 1usize;
        while seen.contains(&candidate) {
            candidate = format!("{name}.{suffix}");
            suffix += 1;
        }
        if candidate != name {
            log::warn!("Repeated column {name:?} renamed to {candidate:?}");
        }
        seen.push(candidate);
    }
    seen
}
