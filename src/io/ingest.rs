//! CSV ingest and schema validation.
//!
//! This module turns polling CSV text into a `RawTable`: named fields per row,
//! still as text. Interpreting the text (percentages, markers, dates) is the
//! job of `engineering::clean`.
//!
//! Design goals:
//! - **Strict schema** for required columns (missing column aborts the run)
//! - **Row-level tolerance** (a malformed CSV record is kept as a `RowError`)
//! - **Case-insensitive headers** (exports disagree on capitalisation)

use std::collections::HashMap;
use std::io::Read;

use csv::StringRecord;

use crate::error::AppError;

pub const COL_DATE: &str = "Date";
pub const COL_POLLSTER: &str = "Pollster";
pub const COL_SAMPLE: &str = "Sample";
pub const COL_TIMESTAMP: &str = "Timestamp";
pub const COL_EXCLUDES_OVERSEAS: &str = "Excludes overseas candidates";

/// One CSV record with its fields picked out by column name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    pub line: usize,
    pub date: String,
    pub pollster: String,
    pub sample: Option<String>,
    pub timestamp: Option<String>,
    pub excludes_overseas: Option<String>,
    /// Candidate cells, aligned with `RawTable::candidates`.
    pub cells: Vec<String>,
}

/// A record the CSV reader itself could not decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTable {
    pub candidates: Vec<String>,
    pub rows: Vec<RawRow>,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
}

/// Parse polling CSV, validating that `Date`, `Pollster` and every configured
/// candidate column exist.
pub fn parse_polling_csv<R: Read>(input: R, candidates: &[String]) -> Result<RawTable, AppError> {
    if candidates.is_empty() {
        return Err(AppError::Config("at least one candidate column is required".to_string()));
    }

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input);

    let headers = reader.headers()?.clone();
    let header_map = build_header_map(&headers);

    let date_idx = required_column(&header_map, COL_DATE)?;
    let pollster_idx = required_column(&header_map, COL_POLLSTER)?;
    let candidate_idx = candidates
        .iter()
        .map(|c| required_column(&header_map, c))
        .collect::<Result<Vec<_>, _>>()?;

    let sample_idx = header_map.get(&normalize_header_name(COL_SAMPLE)).copied();
    let timestamp_idx = header_map.get(&normalize_header_name(COL_TIMESTAMP)).copied();
    let overseas_idx = header_map
        .get(&normalize_header_name(COL_EXCLUDES_OVERSEAS))
        .copied();

    let mut rows = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    // Line where the next record starts; only a fallback when the reader
    // reports no position.
    let mut next_line = 2usize;
    for result in reader.records() {
        rows_read += 1;

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                let line = e.position().map_or(next_line, |p| p.line() as usize);
                next_line = line + 1;
                row_errors.push(RowError {
                    line,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };
        // Quoted fields may span several physical lines.
        let line = record.position().map_or(next_line, |p| p.line() as usize);
        next_line = line + 1;

        rows.push(RawRow {
            line,
            date: field(&record, date_idx),
            pollster: field(&record, pollster_idx),
            sample: sample_idx.map(|i| field(&record, i)),
            timestamp: timestamp_idx.map(|i| field(&record, i)),
            excludes_overseas: overseas_idx.map(|i| field(&record, i)),
            cells: candidate_idx.iter().map(|&i| field(&record, i)).collect(),
        });
    }

    Ok(RawTable {
        candidates: candidates.to_vec(),
        rows,
        row_errors,
        rows_read,
    })
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    let mut map = HashMap::new();
    for (idx, name) in headers.iter().enumerate() {
        // First occurrence wins for repeated headers.
        map.entry(normalize_header_name(name)).or_insert(idx);
    }
    map
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports sometimes prefix the first header with a UTF-8 BOM.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_lowercase()
}

fn required_column(header_map: &HashMap<String, usize>, name: &str) -> Result<usize, AppError> {
    header_map
        .get(&normalize_header_name(name))
        .copied()
        .ok_or_else(|| AppError::MissingColumn(name.to_string()))
}

fn field(record: &StringRecord, idx: usize) -> String {
    record.get(idx).unwrap_or("").to_string()
}
