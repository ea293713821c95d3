//! `poll-trends` library crate.
//!
//! The binary (`polls`) is a thin wrapper around this library so that:
//!
//! - every stage is testable without spawning processes
//! - diagnostics go through an injectable `report::Reporter`
//! - the two output tables are the only coupling to charting

pub mod app;
pub mod data;
pub mod domain;
pub mod engineering;
pub mod error;
pub mod io;
pub mod plot;
pub mod report;
pub mod science;
