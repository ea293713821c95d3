//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - cleaned poll rows and the table holding them (`PollRecord`, `PollingTable`)
//! - daily series outputs (`DailySeries`, `CandidateSeries`)
//! - run configuration (`PipelineConfig`, `WeightMode`, `GapFill`, `TrendConfig`)

pub mod types;

pub use types::*;
