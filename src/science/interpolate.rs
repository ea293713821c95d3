//! Bounded linear gap filling on daily grids.
//!
//! A gap is a run of missing days with a known value on both sides. Leading
//! and trailing runs are never gaps and are never filled.
//!
//! - `GapFill::Reach`: fill the first `max_gap` days of every gap, leave the
//!   rest missing
//! - `GapFill::Strict`: fill gaps of at most `max_gap` days, leave longer
//!   gaps entirely missing
//!
//! Filled values always lie on the straight line between the two bracketing
//! known values, whatever part of the gap is filled. `interpolate_gaps`
//! records which days it filled on the series itself.

use crate::domain::{DailySeries, GapFill};

/// An internal run of missing values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gap {
    /// Index of the first missing value.
    pub start: usize,
    pub len: usize,
}

/// Internal gaps of `values`, in order.
pub fn find_gaps(values: &[Option<f64>]) -> Vec<Gap> {
    let mut gaps = Vec::new();
    let mut last_known: Option<usize> = None;
    for (i, v) in values.iter().enumerate() {
        if v.is_none() {
            continue;
        }
        if let Some(prev) = last_known {
            if i > prev + 1 {
                gaps.push(Gap {
                    start: prev + 1,
                    len: i - prev - 1,
                });
            }
        }
        last_known = Some(i);
    }
    gaps
}

/// Fill gaps in a slice of daily values.
pub fn interpolate_values(values: &[Option<f64>], max_gap: usize, fill: GapFill) -> Vec<Option<f64>> {
    let mut out = values.to_vec();
    for gap in find_gaps(values) {
        let (Some(a), Some(b)) = (values[gap.start - 1], values[gap.start + gap.len]) else {
            continue;
        };
        let span = (gap.len + 1) as f64;
        for k in 0..reach(gap.len, max_gap, fill) {
            let u = (k + 1) as f64 / span;
            out[gap.start + k] = Some(a + (b - a) * u);
        }
    }
    out
}

/// Number of days filled at the start of a gap of `len` days.
fn reach(len: usize, max_gap: usize, fill: GapFill) -> usize {
    match fill {
        GapFill::Reach => len.min(max_gap),
        GapFill::Strict if len <= max_gap => len,
        GapFill::Strict => 0,
    }
}

/// Fill gaps of an aggregate series, measuring the bound on the underlying
/// observations rather than on the aggregate itself.
///
/// `observed[i]` says whether any source had a real value on day `i`. A
/// missing aggregate day is filled only when it lies within the reach of a
/// silence run of `observed`. Aggregates built from already-interpolated
/// sources therefore never extend a fill beyond the bound.
pub fn interpolate_within_silence(
    values: &[Option<f64>],
    observed: &[bool],
    max_gap: usize,
    fill: GapFill,
) -> Vec<Option<f64>> {
    let marks: Vec<Option<f64>> = observed.iter().map(|&o| o.then_some(0.0)).collect();
    let mut allowed = vec![false; values.len()];
    for run in find_gaps(&marks) {
        for k in 0..reach(run.len, max_gap, fill) {
            if let Some(slot) = allowed.get_mut(run.start + k) {
                *slot = true;
            }
        }
    }

    let mut out = values.to_vec();
    for gap in find_gaps(values) {
        let (Some(a), Some(b)) = (values[gap.start - 1], values[gap.start + gap.len]) else {
            continue;
        };
        let span = (gap.len + 1) as f64;
        for k in 0..gap.len {
            let d = gap.start + k;
            if allowed[d] {
                out[d] = Some(a + (b - a) * (k + 1) as f64 / span);
            }
        }
    }
    out
}

/// Fill gaps in a daily series.
///
/// The bound is measured on observed days, so values filled by an earlier
/// pass never shorten a gap. Running this twice gives the same series.
pub fn interpolate_gaps(series: &DailySeries, max_gap: usize, fill: GapFill) -> DailySeries {
    let observed: Vec<bool> = (0..series.len()).map(|i| series.is_observed(i)).collect();
    let values = interpolate_within_silence(&series.values, &observed, max_gap, fill);
    DailySeries::with_fills_from(series.start, values, &observed)
}

/// Like `interpolate_values`, but never interpolates across a barrier.
///
/// Barrier positions stay missing, and each run between barriers is filled
/// on its own.
pub fn interpolate_segments(
    values: &[Option<f64>],
    barriers: &[bool],
    max_gap: usize,
    fill: GapFill,
) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    let mut seg_start = 0;
    for i in 0..=values.len() {
        let at_barrier = barriers.get(i).copied().unwrap_or(false);
        if i < values.len() && !at_barrier {
            continue;
        }
        if seg_start < i {
            let filled = interpolate_values(&values[seg_start..i], max_gap, fill);
            out[seg_start..i].copy_from_slice(&filled);
        }
        seg_start = i + 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn with_gap(len: usize) -> Vec<Option<f64>> {
        let mut v = vec![Some(0.0)];
        v.extend(std::iter::repeat_n(None, len));
        v.push(Some(1.0));
        v
    }

    #[test]
    fn finds_only_internal_gaps() {
        let v = vec![None, Some(1.0), None, None, Some(2.0), Some(3.0), None];
        assert_eq!(find_gaps(&v), vec![Gap { start: 2, len: 2 }]);
    }

    #[test]
    fn short_gap_is_filled_linearly() {
        let out = interpolate_values(&with_gap(10), 14, GapFill::Reach);
        assert!(out.iter().all(Option::is_some));
        for (i, v) in out.iter().enumerate() {
            assert_relative_eq!(v.unwrap(), i as f64 / 11.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn reach_fills_up_to_the_bound_from_the_left() {
        let out = interpolate_values(&with_gap(20), 14, GapFill::Reach);
        assert!(out[1..=14].iter().all(Option::is_some));
        assert!(out[15..=20].iter().all(Option::is_none));
        assert_relative_eq!(out[14].unwrap(), 14.0 / 21.0, epsilon = 1e-12);
    }

    #[test]
    fn gap_one_past_the_bound_keeps_a_missing_point() {
        let reach = interpolate_values(&with_gap(15), 14, GapFill::Reach);
        assert_eq!(reach.iter().filter(|v| v.is_none()).count(), 1);

        let strict = interpolate_values(&with_gap(15), 14, GapFill::Strict);
        assert_eq!(strict.iter().filter(|v| v.is_none()).count(), 15);
    }

    #[test]
    fn edges_are_never_filled() {
        let v = vec![None, None, Some(0.4), None, Some(0.6), None];
        let out = interpolate_values(&v, 14, GapFill::Reach);
        assert_eq!(out[0], None);
        assert_eq!(out[5], None);
        assert_relative_eq!(out[3].unwrap(), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn complete_series_is_unchanged() {
        let v: Vec<Option<f64>> = (0..30).map(|i| Some(0.3 + 0.001 * i as f64)).collect();
        assert_eq!(interpolate_values(&v, 14, GapFill::Reach), v);
        assert_eq!(interpolate_values(&v, 0, GapFill::Strict), v);
    }

    #[test]
    fn aggregate_fill_is_bounded_by_the_silence() {
        // Two sources that never overlap: nine silent days in between.
        let mut values = vec![Some(0.4); 10];
        values.extend(std::iter::repeat_n(None, 9));
        values.extend(std::iter::repeat_n(Some(0.5), 10));
        let observed: Vec<bool> = values.iter().map(Option::is_some).collect();
        let out = interpolate_within_silence(&values, &observed, 14, GapFill::Reach);
        assert!(out.iter().all(Option::is_some));

        // One source silent for 20 days, already filled 14 days in.
        let mut observed = vec![true];
        observed.extend(std::iter::repeat_n(false, 20));
        observed.push(true);
        let values = interpolate_values(&with_gap(20), 14, GapFill::Reach);
        let out = interpolate_within_silence(&values, &observed, 14, GapFill::Reach);
        assert_eq!(out, values);
    }

    #[test]
    fn interpolate_gaps_is_idempotent_past_the_bound() {
        let start = chrono::NaiveDate::from_ymd_opt(2023, 10, 1).unwrap();
        let series = DailySeries::new(start, with_gap(14 + 6));

        let once = interpolate_gaps(&series, 14, GapFill::Reach);
        assert_eq!(once.missing_count(), 6);
        assert_eq!(once.filled.iter().filter(|f| **f).count(), 14);
        assert!(!once.is_observed(1));
        assert!(once.is_observed(0));

        let twice = interpolate_gaps(&once, 14, GapFill::Reach);
        assert_eq!(twice, once);

        let strict = interpolate_gaps(&series, 14, GapFill::Strict);
        assert_eq!(interpolate_gaps(&strict, 14, GapFill::Strict), strict);
        assert_eq!(strict.missing_count(), 20);
    }

    #[test]
    fn interpolate_gaps_fills_short_gaps_on_the_line() {
        let start = chrono::NaiveDate::from_ymd_opt(2023, 10, 1).unwrap();
        let out = interpolate_gaps(&DailySeries::new(start, with_gap(3)), 14, GapFill::Reach);
        assert_eq!(out.missing_count(), 0);
        assert_relative_eq!(out.values[2].unwrap(), 0.5, epsilon = 1e-12);
        assert_eq!(out.filled, vec![false, true, true, true, false]);
    }

    #[test]
    fn barriers_stop_interpolation() {
        let v = vec![Some(0.2), None, None, None, Some(0.6)];
        let barriers = vec![false, false, true, false, false];
        let out = interpolate_segments(&v, &barriers, 14, GapFill::Reach);
        assert_eq!(out, vec![Some(0.2), None, None, None, Some(0.6)]);

        let open = interpolate_segments(&v, &[false; 5], 14, GapFill::Reach);
        assert!(open.iter().all(Option::is_some));
    }
}
