//! Permanent candidate drop-outs.
//!
//! Drop-outs are never inferred from the data; they come from configuration.
//! From the drop-out date on, the candidate's values are removed and the
//! remaining present candidates are rescaled to sum to 1 on each of those
//! days.

use chrono::NaiveDate;

use crate::domain::{CandidateSeries, Dropout};
use crate::error::AppError;

/// What `apply_dropouts` removed for one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Truncation {
    pub candidate: String,
    pub from: NaiveDate,
    /// Days on which a value was removed.
    pub days: usize,
}

/// Truncate dropped-out candidates and re-normalise the others.
///
/// Candidate names match case-insensitively; an unknown name is a
/// configuration error. Drop-outs dated after the series end do nothing.
pub fn apply_dropouts(series: &mut CandidateSeries, dropouts: &[Dropout]) -> Result<Vec<Truncation>, AppError> {
    let mut truncations = Vec::with_capacity(dropouts.len());
    let mut first_idx: Option<usize> = None;

    for dropout in dropouts {
        let (name, column) = series
            .columns
            .iter_mut()
            .find(|(name, _)| name.eq_ignore_ascii_case(&dropout.candidate))
            .ok_or_else(|| {
                AppError::Config(format!("drop-out names unknown candidate '{}'", dropout.candidate))
            })?;

        let from_idx = if dropout.from <= column.start {
            0
        } else {
            match column.index_of(dropout.from) {
                Some(i) => i,
                None => {
                    truncations.push(Truncation {
                        candidate: name.clone(),
                        from: dropout.from,
                        days: 0,
                    });
                    continue;
                }
            }
        };

        let mut days = 0;
        for v in &mut column.values[from_idx..] {
            if v.take().is_some() {
                days += 1;
            }
        }
        truncations.push(Truncation {
            candidate: name.clone(),
            from: dropout.from,
            days,
        });
        first_idx = Some(first_idx.map_or(from_idx, |i| i.min(from_idx)));
    }

    if let Some(idx) = first_idx {
        renormalise_from(series, idx);
    }
    Ok(truncations)
}

/// Rescale present values so they sum to 1 on every day from `idx` on.
pub fn renormalise_from(series: &mut CandidateSeries, idx: usize) {
    for day in idx..series.days {
        let sum = series.present_sum(day);
        if sum <= 0.0 {
            continue;
        }
        for column in series.columns.values_mut() {
            if let Some(Some(v)) = column.values.get_mut(day) {
                *v /= sum;
            }
        }
    }
}
