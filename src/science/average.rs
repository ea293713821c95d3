//! Per-candidate weighted averages across pollsters.
//!
//! For one candidate:
//!
//! 1. each pollster's reports are placed on a daily grid covering the table's
//!    date range (several rows on one day are pooled by sample for
//!    interpolation only)
//! 2. the pollster's share and sample series are interpolated with the gap
//!    bound; a report that omits the candidate is a barrier
//! 3. each day, present shares are combined as `Σ w·p / Σ w`, with `w` from
//!    the configured `WeightingStrategy`. On a report day every row is its own
//!    observation, so split scenario rows are weighted separately; on a filled
//!    day the pollster contributes one interpolated observation
//! 4. days on which no pollster's interpolation reached are filled on the
//!    aggregate, with the bound measured on the days nobody reported; internal
//!    gaps that remain are reported
//!
//! A report that omits the candidate contributes nothing to either sum, so it
//! neither pulls the average down nor inflates the denominator.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rayon::prelude::*;

use crate::domain::{CandidateSeries, DailySeries, GapFill, PipelineConfig, PollRecord, PollingTable, SeriesKind};
use crate::error::AppError;
use crate::report::{CollectingReporter, Diagnostic, Reporter, Stage};
use crate::science::interpolate::{find_gaps, interpolate_segments, interpolate_within_silence};
use crate::science::weighting::{Observation, WeightingStrategy, median_sample, pollster_histories};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AverageOptions {
    pub max_gap_days: usize,
    pub gap_fill: GapFill,
    /// Pollsters with fewer report dates for a candidate are flagged as sparse.
    pub min_reports: usize,
}

impl AverageOptions {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            max_gap_days: config.max_gap_days,
            gap_fill: config.gap_fill,
            min_reports: config.min_reports,
        }
    }
}

impl Default for AverageOptions {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

/// One pollster's reports for one candidate, on the table's daily grid.
#[derive(Debug, Clone, PartialEq)]
struct PollsterGrid {
    shares: Vec<Option<f64>>,
    samples: Vec<Option<f64>>,
    /// Days the pollster reported but left the candidate out.
    omitted: Vec<bool>,
    /// `(share, sample)` of every row with a value, per report day.
    rows: Vec<Vec<(f64, Option<f64>)>>,
    /// Days with a value for the candidate.
    reports: usize,
}

/// Weighted daily average of `candidate` over every pollster in `table`.
///
/// The table must not contain multi-response rows.
pub fn compute_weighted_average(
    table: &PollingTable,
    candidate: &str,
    strategy: &dyn WeightingStrategy,
    options: &AverageOptions,
    reporter: &mut dyn Reporter,
) -> Result<DailySeries, AppError> {
    if table.has_multi_response_rows() {
        return Err(AppError::stage(
            Stage::Weight,
            "multi-response rows must be split before weighting",
        ));
    }
    let idx = table
        .candidate_index(candidate)
        .ok_or_else(|| AppError::Config(format!("unknown candidate '{candidate}'")))?;
    let (start, end) = table
        .date_range()
        .ok_or_else(|| AppError::no_data(Stage::Weight, "the polling table is empty"))?;

    let days = DailySeries::empty(start, end).len();
    let histories = pollster_histories(table);
    let fallback_sample = median_sample(table).unwrap_or(1.0);

    let mut numer = vec![0.0; days];
    let mut denom = vec![0.0; days];
    let mut observed = vec![false; days];

    for (pollster, rows) in table.by_pollster() {
        let Some(history) = histories.get(pollster) else {
            continue;
        };
        let grid = pollster_grid(&rows, idx, start, days, fallback_sample);

        if grid.reports > 0 && grid.reports < options.min_reports {
            reporter.report(Diagnostic::SparsePollster {
                pollster: pollster.to_string(),
                candidate: table.candidates[idx].clone(),
                reports: grid.reports,
            });
        }

        for (seen, share) in observed.iter_mut().zip(&grid.shares) {
            *seen |= share.is_some();
        }

        let shares = interpolate_segments(&grid.shares, &grid.omitted, options.max_gap_days, options.gap_fill);
        let samples = interpolate_segments(&grid.samples, &grid.omitted, options.max_gap_days, options.gap_fill);

        for d in 0..days {
            let pooled;
            let day_rows: &[(f64, Option<f64>)] = if grid.rows[d].is_empty() {
                let Some(share) = shares[d] else {
                    continue;
                };
                pooled = [(share, samples[d])];
                &pooled
            } else {
                &grid.rows[d]
            };
            for &(share, sample) in day_rows {
                let w = strategy.weight(&Observation { history, share, sample });
                if w.is_finite() && w > 0.0 {
                    numer[d] += w * share;
                    denom[d] += w;
                }
            }
        }
    }

    let raw: Vec<Option<f64>> = numer
        .iter()
        .zip(&denom)
        .map(|(&n, &d)| (d > 0.0).then(|| n / d))
        .collect();
    let filled = DailySeries::with_fills_from(
        start,
        interpolate_within_silence(&raw, &observed, options.max_gap_days, options.gap_fill),
        &observed,
    );

    for gap in find_gaps(&filled.values) {
        reporter.report(Diagnostic::GapLeftUnfilled {
            candidate: table.candidates[idx].clone(),
            start: filled.date_at(gap.start),
            days: gap.len,
        });
    }

    Ok(filled)
}

/// Weighted averages for every candidate of the table.
///
/// Candidates are independent, so they are computed in parallel; diagnostics
/// are replayed into `reporter` in candidate order.
pub fn compute_polling_averages(
    table: &PollingTable,
    strategy: &dyn WeightingStrategy,
    options: &AverageOptions,
    reporter: &mut dyn Reporter,
) -> Result<CandidateSeries, AppError> {
    let (start, end) = table
        .date_range()
        .ok_or_else(|| AppError::no_data(Stage::Weight, "the polling table is empty"))?;

    let results: Vec<(String, CollectingReporter, Result<DailySeries, AppError>)> = table
        .candidates
        .par_iter()
        .map(|candidate| {
            let mut local = CollectingReporter::new();
            let series = compute_weighted_average(table, candidate, strategy, options, &mut local);
            (candidate.clone(), local, series)
        })
        .collect();

    let mut columns = BTreeMap::new();
    for (candidate, local, series) in results {
        local.replay_into(reporter);
        columns.insert(candidate, series?);
    }

    if columns.values().all(|s| s.missing_count() == s.len()) {
        return Err(AppError::no_data(Stage::Weight, "no candidate has any averaged value"));
    }

    let days = DailySeries::empty(start, end).len();
    Ok(CandidateSeries {
        kind: SeriesKind::PollingAverages,
        start,
        days,
        columns,
        excludes_overseas: excludes_overseas_flags(table, start, days),
    })
}

fn pollster_grid(rows: &[&PollRecord], idx: usize, start: NaiveDate, days: usize, fallback_sample: f64) -> PollsterGrid {
    let mut by_date: BTreeMap<NaiveDate, Vec<&PollRecord>> = BTreeMap::new();
    for &r in rows {
        by_date.entry(r.date).or_default().push(r);
    }

    let mut grid = PollsterGrid {
        shares: vec![None; days],
        samples: vec![None; days],
        omitted: vec![false; days],
        rows: vec![Vec::new(); days],
        reports: 0,
    };

    for (date, day_rows) in by_date {
        let offset = (date - start).num_days();
        if offset < 0 || offset as usize >= days {
            continue;
        }
        let d = offset as usize;

        let present: Vec<(f64, f64)> = day_rows
            .iter()
            .filter_map(|r| {
                let n = r.sample.map(f64::from).unwrap_or(fallback_sample);
                r.share(idx).map(|p| (p, n))
            })
            .collect();
        if present.is_empty() {
            grid.omitted[d] = true;
            continue;
        }

        let total: f64 = present.iter().map(|(_, n)| n).sum();
        let share = if total > 0.0 {
            present.iter().map(|(p, n)| p * n).sum::<f64>() / total
        } else {
            present.iter().map(|(p, _)| p).sum::<f64>() / present.len() as f64
        };
        grid.shares[d] = Some(share);
        grid.samples[d] = Some(total);
        grid.rows[d] = present.iter().map(|&(p, n)| (p, Some(n))).collect();
        grid.reports += 1;
    }

    grid
}

/// Per-day flag: some report dated that day excludes overseas candidates.
fn excludes_overseas_flags(table: &PollingTable, start: NaiveDate, days: usize) -> Vec<bool> {
    let mut flags = vec![false; days];
    for r in table.records.iter().filter(|r| r.excludes_overseas) {
        let offset = (r.date - start).num_days();
        if offset >= 0 && (offset as usize) < days {
            flags[offset as usize] = true;
        }
    }
    flags
}
