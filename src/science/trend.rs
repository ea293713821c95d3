//! Rolling Gaussian smoothing of the averaged series.
//!
//! The window is trailing: the value on day `t` uses days `t - window + 1 ..= t`.
//! Kernel weights are `exp(-0.5 * ((j - (window - 1) / 2) / std)^2)` for
//! `j = 0..window`, renormalised over the values present in the window. A
//! value is emitted only when at least `min_periods` values are present.

use std::collections::BTreeMap;

use crate::domain::{CandidateSeries, DailySeries, SeriesKind, TrendConfig};
use crate::error::AppError;

impl TrendConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.window == 0 {
            return Err(AppError::Config("trend window must be at least 1 day".to_string()));
        }
        if !(self.std.is_finite() && self.std > 0.0) {
            return Err(AppError::Config(format!("trend std must be > 0 (got {})", self.std)));
        }
        if self.min_periods == 0 || self.min_periods > self.window {
            return Err(AppError::Config(format!(
                "trend min_periods must be within 1..={} (got {})",
                self.window, self.min_periods
            )));
        }
        Ok(())
    }

    fn kernel(&self) -> Vec<f64> {
        let center = (self.window as f64 - 1.0) / 2.0;
        (0..self.window)
            .map(|j| {
                let z = (j as f64 - center) / self.std;
                (-0.5 * z * z).exp()
            })
            .collect()
    }
}

/// Smooth one raw series.
pub fn compute_trend(raw: &DailySeries, config: &TrendConfig) -> DailySeries {
    let kernel = config.kernel();
    let window = kernel.len();
    let min_periods = config.min_periods.max(1);

    let values = (0..raw.len())
        .map(|t| {
            let mut num = 0.0;
            let mut den = 0.0;
            let mut count = 0;
            for (j, w) in kernel.iter().enumerate() {
                // Kernel slot `j` covers day `t + 1 + j - window`.
                let Some(idx) = (t + 1 + j).checked_sub(window) else {
                    continue;
                };
                if let Some(v) = raw.values[idx] {
                    num += w * v;
                    den += w;
                    count += 1;
                }
            }
            (count >= min_periods && den > 0.0).then(|| num / den)
        })
        .collect();

    DailySeries::new(raw.start, values)
}

/// Smooth every column of an averaged series.
pub fn compute_trends(averages: &CandidateSeries, config: &TrendConfig) -> CandidateSeries {
    let columns: BTreeMap<String, DailySeries> = averages
        .columns
        .iter()
        .map(|(name, series)| (name.clone(), compute_trend(series, config)))
        .collect();

    CandidateSeries {
        kind: SeriesKind::Trends,
        start: averages.start,
        days: averages.days,
        columns,
        excludes_overseas: averages.excludes_overseas.clone(),
    }
}
