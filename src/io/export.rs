//! CSV artifacts.
//!
//! Final outputs (`polling_averages.csv`, `trends.csv`) have one row per day:
//! `Date`, one column per candidate in name order, then
//! `Excludes overseas candidates`. Missing values are empty fields.
//!
//! Both final tables are written to `*.tmp` files first and renamed into
//! place only once both writes succeeded. Tables from an earlier run are
//! moved to `*.bak` while the new pair goes in and put back if any rename
//! fails, so the pair on disk is either the old one or the new one.
//!
//! Interim outputs (cleaned table, per-pollster splits) are plain writes.

use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::{CandidateSeries, PollRecord, PollingTable, ShareCell};
use crate::error::AppError;
use crate::io::ingest::{COL_DATE, COL_EXCLUDES_OVERSEAS, COL_POLLSTER, COL_SAMPLE, COL_TIMESTAMP};

pub const CLEANED_TABLE_FILE: &str = "dataland_polling.csv";
pub const SPLIT_LIST_FILE: &str = "pollster_split_list.csv";

/// Where the two final tables were written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub polling_averages: PathBuf,
    pub trends: PathBuf,
}

/// Write one series table.
pub fn write_series_csv(path: &Path, series: &CandidateSeries) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_path(path)?;

    let mut header = vec![COL_DATE.to_string()];
    header.extend(series.columns.keys().cloned());
    header.push(COL_EXCLUDES_OVERSEAS.to_string());
    writer.write_record(&header)?;

    for day in 0..series.days {
        let mut row = vec![series.date_at(day).format("%Y-%m-%d").to_string()];
        for column in series.columns.values() {
            row.push(fmt_value(column.values.get(day).copied().flatten()));
        }
        let flag = series.excludes_overseas.get(day).copied().unwrap_or(false);
        row.push(flag.to_string());
        writer.write_record(&row)?;
    }

    writer.flush().map_err(|e| AppError::io(path, e))?;
    Ok(())
}

/// Write both final tables into `dir`, all-or-nothing.
pub fn write_outputs(
    dir: &Path,
    averages: &CandidateSeries,
    trends: &CandidateSeries,
) -> Result<OutputPaths, AppError> {
    fs::create_dir_all(dir).map_err(|e| AppError::io(dir, e))?;

    let targets = [
        (averages, dir.join(format!("{}.csv", averages.kind.file_stem()))),
        (trends, dir.join(format!("{}.csv", trends.kind.file_stem()))),
    ];
    let tmp: Vec<PathBuf> = targets.iter().map(|(_, path)| tmp_path(path)).collect();

    for ((series, _), tmp_path) in targets.iter().zip(&tmp) {
        if let Err(e) = write_series_csv(tmp_path, series) {
            for p in &tmp {
                let _ = fs::remove_file(p);
            }
            return Err(e);
        }
    }

    let moves: Vec<(PathBuf, PathBuf)> = tmp
        .into_iter()
        .zip(targets.iter().map(|(_, path)| path.clone()))
        .collect();
    commit(&moves)?;

    let [(_, polling_averages), (_, trends)] = targets;
    Ok(OutputPaths {
        polling_averages,
        trends,
    })
}

/// Write the engineered polling table.
pub fn write_cleaned_table(path: &Path, table: &PollingTable) -> Result<(), AppError> {
    write_records(path, &table.candidates, table.records.iter())
}

/// Write one file per pollster plus an index file. Returns the written paths,
/// index last.
pub fn write_pollster_splits(dir: &Path, table: &PollingTable) -> Result<Vec<PathBuf>, AppError> {
    fs::create_dir_all(dir).map_err(|e| AppError::io(dir, e))?;

    let mut written = Vec::new();
    let mut index = csv::Writer::from_path(dir.join(SPLIT_LIST_FILE))?;
    index.write_record([COL_POLLSTER, "File", "Rows"])?;

    for (pollster, rows) in table.by_pollster() {
        let file_name = format!("pollster_split_{}.csv", file_safe(pollster));
        let path = dir.join(&file_name);
        write_records(&path, &table.candidates, rows.iter().copied())?;
        index.write_record([pollster, file_name.as_str(), rows.len().to_string().as_str()])?;
        written.push(path);
    }

    let index_path = dir.join(SPLIT_LIST_FILE);
    index.flush().map_err(|e| AppError::io(&index_path, e))?;
    written.push(index_path);
    Ok(written)
}

fn write_records<'a>(
    path: &Path,
    candidates: &[String],
    records: impl Iterator<Item = &'a PollRecord>,
) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_path(path)?;

    let mut header = vec![
        COL_DATE.to_string(),
        COL_POLLSTER.to_string(),
        COL_SAMPLE.to_string(),
        COL_TIMESTAMP.to_string(),
    ];
    header.extend(candidates.iter().cloned());
    header.extend(
        [COL_EXCLUDES_OVERSEAS, "Alternate question", "Footnotes", "Scenario"]
            .iter()
            .map(|c| c.to_string()),
    );
    writer.write_record(&header)?;

    for r in records {
        let mut row = vec![
            r.date.format("%Y-%m-%d").to_string(),
            r.pollster.clone(),
            r.sample.map(|n| n.to_string()).unwrap_or_default(),
            r.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
        ];
        row.extend(r.shares.iter().map(fmt_cell));
        row.push(r.excludes_overseas.to_string());
        row.push(r.alternate_question.to_string());
        row.push(
            candidates
                .iter()
                .zip(&r.footnotes)
                .filter(|(_, flagged)| **flagged)
                .map(|(c, _)| c.as_str())
                .collect::<Vec<_>>()
                .join(";"),
        );
        row.push(r.scenario.map(|s| s.to_string()).unwrap_or_default());
        writer.write_record(&row)?;
    }

    writer.flush().map_err(|e| AppError::io(path, e))?;
    Ok(())
}

fn fmt_value(v: Option<f64>) -> String {
    v.map(|v| format!("{v:.6}")).unwrap_or_default()
}

fn fmt_cell(cell: &ShareCell) -> String {
    match cell {
        ShareCell::Missing => String::new(),
        ShareCell::Value(v) => format!("{v:.6}"),
        ShareCell::Multi(values) => values
            .iter()
            .map(|v| format!("{v:.6}"))
            .collect::<Vec<_>>()
            .join(" / "),
    }
}

/// Rename every `(tmp, target)` pair into place, or none of them.
fn commit(moves: &[(PathBuf, PathBuf)]) -> Result<(), AppError> {
    let mut backups = Vec::new();
    let mut placed = Vec::new();
    let outcome = swap_in(moves, &mut backups, &mut placed);

    if outcome.is_err() {
        for target in &placed {
            let _ = fs::remove_file(target);
        }
        for (target, backup) in backups.iter().rev() {
            if let Err(e) = fs::rename(backup, target) {
                log::error!("could not restore {}: {e}", target.display());
            }
        }
        for (tmp, _) in moves {
            let _ = fs::remove_file(tmp);
        }
    } else {
        for (_, backup) in &backups {
            let _ = fs::remove_file(backup);
        }
    }
    outcome
}

fn swap_in(
    moves: &[(PathBuf, PathBuf)],
    backups: &mut Vec<(PathBuf, PathBuf)>,
    placed: &mut Vec<PathBuf>,
) -> Result<(), AppError> {
    for (_, target) in moves {
        if target.exists() {
            let backup = sibling_path(target, ".bak");
            fs::rename(target, &backup).map_err(|e| AppError::io(target, e))?;
            backups.push((target.clone(), backup));
        }
    }
    for (tmp, target) in moves {
        fs::rename(tmp, target).map_err(|e| AppError::io(target, e))?;
        placed.push(target.clone());
    }
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    sibling_path(path, ".tmp")
}

fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

fn file_safe(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}
