//! Pollster weighting strategies.
//!
//! The weighted average asks a `WeightingStrategy` how much one observation
//! counts: one row of a pollster on a report day (split scenario rows are
//! separate observations), or the pollster's interpolated share on a filled
//! day. Strategies are built once per table (some need
//! table-wide statistics) and shared read-only across candidates.
//!
//! Formulas (`n` = sample size, `r` = report dates, `p` = share):
//!
//! | mode               | weight              |
//! |--------------------|---------------------|
//! | `Sample`           | `n`                 |
//! | `Reports`          | `r`                 |
//! | `Equal`            | `1`                 |
//! | `InverseVariance`  | `n / (p (1 - p))`   |
//!
//! A missing sample size falls back to the median sample of the table (or 1
//! when no row reports one).

use std::collections::{BTreeMap, BTreeSet};

use crate::domain::{PollingTable, WeightMode};

/// What a strategy knows about a pollster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollsterHistory {
    pub pollster: String,
    /// Distinct dates on which the pollster published.
    pub report_dates: usize,
}

/// One pollster's contribution on one day.
#[derive(Debug, Clone, Copy)]
pub struct Observation<'a> {
    pub history: &'a PollsterHistory,
    pub share: f64,
    /// Sample size, interpolated like the share on filled days.
    pub sample: Option<f64>,
}

pub trait WeightingStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Non-negative weight of `obs`. Zero removes it from the average.
    fn weight(&self, obs: &Observation<'_>) -> f64;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleWeight {
    pub fallback_sample: f64,
}

impl WeightingStrategy for SampleWeight {
    fn name(&self) -> &'static str {
        "sample"
    }

    fn weight(&self, obs: &Observation<'_>) -> f64 {
        obs.sample.unwrap_or(self.fallback_sample).max(0.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportCountWeight;

impl WeightingStrategy for ReportCountWeight {
    fn name(&self) -> &'static str {
        "reports"
    }

    fn weight(&self, obs: &Observation<'_>) -> f64 {
        obs.history.report_dates as f64
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EqualWeight;

impl WeightingStrategy for EqualWeight {
    fn name(&self) -> &'static str {
        "equal"
    }

    fn weight(&self, _obs: &Observation<'_>) -> f64 {
        1.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InverseVarianceWeight {
    pub fallback_sample: f64,
}

impl WeightingStrategy for InverseVarianceWeight {
    fn name(&self) -> &'static str {
        "inverse-variance"
    }

    fn weight(&self, obs: &Observation<'_>) -> f64 {
        // Clamp keeps near-0 and near-1 shares from dominating.
        let p = obs.share.clamp(0.01, 0.99);
        let n = obs.sample.unwrap_or(self.fallback_sample).max(0.0);
        n / (p * (1.0 - p))
    }
}

impl WeightMode {
    /// Build the strategy for this mode, with table-wide fallbacks.
    pub fn strategy(self, table: &PollingTable) -> Box<dyn WeightingStrategy> {
        let fallback_sample = median_sample(table).unwrap_or(1.0);
        match self {
            WeightMode::Sample => Box::new(SampleWeight { fallback_sample }),
            WeightMode::Reports => Box::new(ReportCountWeight),
            WeightMode::Equal => Box::new(EqualWeight),
            WeightMode::InverseVariance => Box::new(InverseVarianceWeight { fallback_sample }),
        }
    }
}

/// Report-date counts for every pollster in the table.
pub fn pollster_histories(table: &PollingTable) -> BTreeMap<String, PollsterHistory> {
    table
        .by_pollster()
        .into_iter()
        .map(|(name, rows)| {
            let dates: BTreeSet<_> = rows.iter().map(|r| r.date).collect();
            let history = PollsterHistory {
                pollster: name.to_string(),
                report_dates: dates.len(),
            };
            (name.to_string(), history)
        })
        .collect()
}

/// Median reported sample size.
pub fn median_sample(table: &PollingTable) -> Option<f64> {
    let mut samples: Vec<u32> = table.records.iter().filter_map(|r| r.sample).collect();
    if samples.is_empty() {
        return None;
    }
    samples.sort_unstable();
    let mid = samples.len() / 2;
    let median = if samples.len() % 2 == 0 {
        (samples[mid - 1] as f64 + samples[mid] as f64) / 2.0
    } else {
        samples[mid] as f64
    };
    Some(median)
}
