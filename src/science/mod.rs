//! Data science: from a clean polling table to per-candidate daily series.
//!
//! - `weighting`: pluggable pollster weights
//! - `interpolate`: bounded linear gap filling
//! - `average`: weighted averages across pollsters
//! - `trend`: Gaussian rolling smoothing
//! - `dropout`: known drop-outs and re-normalisation

pub mod average;
pub mod dropout;
pub mod interpolate;
pub mod trend;
pub mod weighting;

pub use average::{AverageOptions, compute_polling_averages, compute_weighted_average};
pub use dropout::{Truncation, apply_dropouts, renormalise_from};
pub use interpolate::{Gap, find_gaps, interpolate_gaps, interpolate_values};
pub use trend::{compute_trend, compute_trends};
pub use weighting::{
    EqualWeight, InverseVarianceWeight, Observation, PollsterHistory, ReportCountWeight, SampleWeight,
    WeightingStrategy,
};
