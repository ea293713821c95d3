//! Run summary JSON.
//!
//! A small, stable record of one run written next to the output tables:
//! - row accounting through each engineering stage
//! - the settings that shaped the series (weighting, gaps, trend, drop-outs)
//! - the latest value per candidate
//!
//! It is the machine-readable counterpart of the terminal summary.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::{Dropout, GapFill, TrendConfig, WeightMode};
use crate::error::AppError;

pub const SUMMARY_FILE: &str = "run_summary.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowCounts {
    pub read: usize,
    pub dropped: usize,
    pub duplicates_dropped: usize,
    pub rows_split: usize,
    pub rows_added: usize,
    /// Rows that went into weighting.
    pub weighted: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub weight_mode: WeightMode,
    pub gap_fill: GapFill,
    pub max_gap_days: usize,
    pub min_reports: usize,
    pub trend: TrendConfig,
    pub dropouts: Vec<Dropout>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestValue {
    pub candidate: String,
    pub date: Option<NaiveDate>,
    pub average: Option<f64>,
    pub trend: Option<f64>,
    /// Days left missing in the averaged series.
    pub missing_days: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub tool: String,
    pub source: String,
    pub rows: RowCounts,
    pub pollsters: Vec<String>,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub settings: Settings,
    pub warnings: usize,
    pub latest: Vec<LatestValue>,
}

pub fn write_summary_json(path: &Path, summary: &RunSummary) -> Result<(), AppError> {
    let file = File::create(path).map_err(|e| AppError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, summary)?;
    writer.flush().map_err(|e| AppError::io(path, e))?;
    Ok(())
}

pub fn read_summary_json(path: &Path) -> Result<RunSummary, AppError> {
    let file = File::open(path).map_err(|e| AppError::io(path, e))?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}
