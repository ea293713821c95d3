//! Shared domain types.
//!
//! These types are kept explicit and statically shaped: every column the
//! pipeline reads is a named field, and candidate shares are stored in the
//! same order as `PollingTable::candidates`.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{Days, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Candidate columns of the Dataland polling table.
pub const DEFAULT_CANDIDATES: [&str; 6] = ["Bulstrode", "Lydgate", "Vincy", "Casaubon", "Chettam", "Others"];

/// One candidate cell after cleaning.
#[derive(Debug, Clone, PartialEq)]
pub enum ShareCell {
    /// The pollster did not report this candidate on this row.
    Missing,
    /// A single fraction in `[0, 1]`.
    Value(f64),
    /// Several simultaneous answers folded into one cell (e.g. `31% / 29%`).
    ///
    /// Only present between cleaning and splitting.
    Multi(Vec<f64>),
}

impl ShareCell {
    /// The single fraction of this cell, if any.
    pub fn value(&self) -> Option<f64> {
        match self {
            ShareCell::Value(v) => Some(*v),
            ShareCell::Missing | ShareCell::Multi(_) => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, ShareCell::Missing)
    }

    pub fn response_count(&self) -> usize {
        match self {
            ShareCell::Missing => 0,
            ShareCell::Value(_) => 1,
            ShareCell::Multi(values) => values.len(),
        }
    }
}

/// A single cleaned poll row.
#[derive(Debug, Clone, PartialEq)]
pub struct PollRecord {
    /// 1-based line in the source CSV (header is line 1).
    pub line: usize,
    pub date: NaiveDate,
    /// Publication time used to decide recency between duplicate entries.
    pub timestamp: NaiveDateTime,
    pub pollster: String,
    pub sample: Option<u32>,
    /// Candidate shares, aligned with `PollingTable::candidates`.
    pub shares: Vec<ShareCell>,
    /// Whether the candidate cell carried a footnote marker (`*`).
    pub footnotes: Vec<bool>,
    pub excludes_overseas: bool,
    /// Row answered the alternate (hypothetical) question, marked with `**`.
    pub alternate_question: bool,
    /// Index of the response this row was split from, if any.
    pub scenario: Option<usize>,
}

impl PollRecord {
    pub fn share(&self, candidate: usize) -> Option<f64> {
        self.shares.get(candidate).and_then(ShareCell::value)
    }

    pub fn has_multi_response(&self) -> bool {
        self.shares.iter().any(|c| matches!(c, ShareCell::Multi(_)))
    }

    /// Sum of all shares when every candidate holds a single value.
    pub fn complete_share_sum(&self) -> Option<f64> {
        self.shares.iter().map(ShareCell::value).sum()
    }
}

/// Cleaned polling data, ordered by date once the pipeline has sorted it.
#[derive(Debug, Clone, PartialEq)]
pub struct PollingTable {
    pub candidates: Vec<String>,
    pub records: Vec<PollRecord>,
}

impl PollingTable {
    pub fn new(candidates: Vec<String>, records: Vec<PollRecord>) -> Self {
        Self { candidates, records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn candidate_index(&self, name: &str) -> Option<usize> {
        self.candidates.iter().position(|c| c.eq_ignore_ascii_case(name))
    }

    /// Unique pollster names, sorted.
    pub fn pollsters(&self) -> Vec<String> {
        self.records
            .iter()
            .map(|r| r.pollster.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Records grouped by pollster, keeping table order within each group.
    pub fn by_pollster(&self) -> BTreeMap<&str, Vec<&PollRecord>> {
        let mut out: BTreeMap<&str, Vec<&PollRecord>> = BTreeMap::new();
        for r in &self.records {
            out.entry(r.pollster.as_str()).or_default().push(r);
        }
        out
    }

    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        let first = self.records.iter().map(|r| r.date).min()?;
        let last = self.records.iter().map(|r| r.date).max()?;
        Some((first, last))
    }

    pub fn has_multi_response_rows(&self) -> bool {
        self.records.iter().any(PollRecord::has_multi_response)
    }

    /// Stable sort by date, then pollster.
    pub fn sort_by_date(&mut self) {
        self.records
            .sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.pollster.cmp(&b.pollster)));
    }
}

/// Values on a contiguous daily grid starting at `start`.
#[derive(Debug, Clone, PartialEq)]
pub struct DailySeries {
    pub start: NaiveDate,
    pub values: Vec<Option<f64>>,
    /// Days whose value was interpolated rather than observed.
    pub filled: Vec<bool>,
}

impl DailySeries {
    pub fn new(start: NaiveDate, values: Vec<Option<f64>>) -> Self {
        let filled = vec![false; values.len()];
        Self { start, values, filled }
    }

    /// A series covering `start..=end` with every value missing.
    pub fn empty(start: NaiveDate, end: NaiveDate) -> Self {
        let days = (end - start).num_days().max(0) as usize + 1;
        Self::new(start, vec![None; days])
    }

    /// Same values, with `filled` marking the days that are present here but
    /// absent from `observed`.
    pub fn with_fills_from(start: NaiveDate, values: Vec<Option<f64>>, observed: &[bool]) -> Self {
        let filled = values
            .iter()
            .enumerate()
            .map(|(i, v)| v.is_some() && !observed.get(i).copied().unwrap_or(false))
            .collect();
        Self { start, values, filled }
    }

    /// Present and not produced by interpolation.
    pub fn is_observed(&self, idx: usize) -> bool {
        self.values.get(idx).is_some_and(Option::is_some) && !self.filled.get(idx).copied().unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn date_at(&self, idx: usize) -> NaiveDate {
        self.start
            .checked_add_days(Days::new(idx as u64))
            .unwrap_or(NaiveDate::MAX)
    }

    pub fn index_of(&self, date: NaiveDate) -> Option<usize> {
        let offset = (date - self.start).num_days();
        if offset < 0 || offset as usize >= self.values.len() {
            return None;
        }
        Some(offset as usize)
    }

    pub fn get(&self, date: NaiveDate) -> Option<f64> {
        self.index_of(date).and_then(|i| self.values[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, Option<f64>)> + '_ {
        self.values.iter().enumerate().map(|(i, v)| (self.date_at(i), *v))
    }

    pub fn missing_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_none()).count()
    }

    /// Most recent present value.
    pub fn latest(&self) -> Option<(NaiveDate, f64)> {
        self.values
            .iter()
            .enumerate()
            .rev()
            .find_map(|(i, v)| v.map(|v| (self.date_at(i), v)))
    }
}

/// Which of the two pipeline artifacts a `CandidateSeries` is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesKind {
    /// Unsmoothed weighted averages.
    PollingAverages,
    /// Rolling-window smoothed averages.
    Trends,
}

impl SeriesKind {
    pub fn file_stem(self) -> &'static str {
        match self {
            SeriesKind::PollingAverages => "polling_averages",
            SeriesKind::Trends => "trends",
        }
    }
}

/// Per-candidate daily series sharing one date grid.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateSeries {
    pub kind: SeriesKind,
    pub start: NaiveDate,
    pub days: usize,
    /// One column per candidate, sorted by name.
    pub columns: BTreeMap<String, DailySeries>,
    /// Per-day flag: some report on that day excludes overseas candidates.
    pub excludes_overseas: Vec<bool>,
}

impl CandidateSeries {
    pub fn date_at(&self, idx: usize) -> NaiveDate {
        self.start
            .checked_add_days(Days::new(idx as u64))
            .unwrap_or(NaiveDate::MAX)
    }

    pub fn end(&self) -> NaiveDate {
        self.date_at(self.days.saturating_sub(1))
    }

    pub fn column(&self, candidate: &str) -> Option<&DailySeries> {
        self.columns.get(candidate)
    }

    /// Sum of the present candidate values on day `idx`.
    pub fn present_sum(&self, idx: usize) -> f64 {
        self.columns
            .values()
            .filter_map(|s| s.values.get(idx).copied().flatten())
            .sum()
    }
}

/// Pollster weighting policy (see `science::weighting`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WeightMode {
    /// Weight each observation by its sample size.
    Sample,
    /// Weight each pollster by its number of distinct report dates.
    Reports,
    /// Every pollster counts the same.
    Equal,
    /// Binomial inverse variance `n / (p (1 - p))`.
    InverseVariance,
}

impl FromStr for WeightMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sample" => Ok(WeightMode::Sample),
            "reports" => Ok(WeightMode::Reports),
            "equal" => Ok(WeightMode::Equal),
            "inverse-variance" | "inverse_variance" => Ok(WeightMode::InverseVariance),
            other => Err(AppError::Config(format!(
                "unknown weight mode '{other}' (expected sample, reports, equal or inverse-variance)"
            ))),
        }
    }
}

/// How gaps longer than the bound are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GapFill {
    /// Fill the first `max_gap` days of any gap, leave the remainder missing.
    Reach,
    /// Leave gaps longer than `max_gap` entirely missing.
    Strict,
}

impl FromStr for GapFill {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reach" => Ok(GapFill::Reach),
            "strict" => Ok(GapFill::Strict),
            other => Err(AppError::Config(format!(
                "unknown gap fill policy '{other}' (expected reach or strict)"
            ))),
        }
    }
}

/// Rolling-window smoothing used for the trend series.
///
/// The default (7 days, Gaussian std of 3 days) follows sustained opinion
/// shifts over roughly a week while suppressing day-to-day sampling noise.
/// The window is trailing, so a sudden real shift shows up with a lag of
/// about half a window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendConfig {
    pub window: usize,
    pub std: f64,
    /// Minimum present values within a window to emit a trend value.
    pub min_periods: usize,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            window: 7,
            std: 3.0,
            min_periods: 7,
        }
    }
}

/// A known permanent candidate drop-out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dropout {
    pub candidate: String,
    pub from: NaiveDate,
}

/// Where polling data comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollSource {
    Url(String),
    File(PathBuf),
    /// Seeded synthetic data (see `data::sample`).
    Synthetic { seed: u64 },
}

impl std::fmt::Display for PollSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PollSource::Url(url) => write!(f, "{url}"),
            PollSource::File(path) => write!(f, "{}", path.display()),
            PollSource::Synthetic { seed } => write!(f, "synthetic:{seed}"),
        }
    }
}

/// A full run's configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub source: PollSource,
    pub candidates: Vec<String>,

    /// Cache for downloaded source files.
    pub raw_dir: Option<PathBuf>,
    /// Cleaned table and per-pollster splits.
    pub interim_dir: Option<PathBuf>,
    /// Final artifacts.
    pub output_dir: PathBuf,
    /// Ignore cached raw files and fetch again.
    pub reset: bool,

    pub max_gap_days: usize,
    pub gap_fill: GapFill,
    pub weight_mode: WeightMode,
    /// Pollsters with fewer report dates than this trigger a sparsity warning.
    pub min_reports: usize,
    pub trend: TrendConfig,
    /// Allowed deviation of a complete row's share sum from 1.
    pub anomaly_tolerance: f64,
    pub dropouts: Vec<Dropout>,

    pub plot: bool,
    pub plot_width: usize,
    pub plot_height: usize,
    pub chart_svg: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source: PollSource::Synthetic { seed: 42 },
            candidates: DEFAULT_CANDIDATES.iter().map(|c| c.to_string()).collect(),
            raw_dir: Some(PathBuf::from("data/01_raw")),
            interim_dir: Some(PathBuf::from("data/02_interim")),
            output_dir: PathBuf::from("data/03_final"),
            reset: false,
            max_gap_days: 14,
            gap_fill: GapFill::Reach,
            weight_mode: WeightMode::Sample,
            min_reports: 2,
            trend: TrendConfig::default(),
            anomaly_tolerance: 0.03,
            dropouts: Vec::new(),
            plot: true,
            plot_width: 100,
            plot_height: 25,
            chart_svg: None,
        }
    }
}
