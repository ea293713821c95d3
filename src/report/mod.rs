//! Operator-facing diagnostics.
//!
//! Computation never prints. Each stage hands `Diagnostic` values to a
//! `Reporter`, which decides what to do with them: the binary logs them,
//! tests collect them and assert on their content.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

pub mod format;

pub use format::*;

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Load,
    Clean,
    Deduplicate,
    Split,
    Weight,
    Smooth,
    Export,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Load => "load",
            Stage::Clean => "clean",
            Stage::Deduplicate => "deduplicate",
            Stage::Split => "split",
            Stage::Weight => "weight",
            Stage::Smooth => "smooth",
            Stage::Export => "export",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    SourceLoaded {
        source: String,
        bytes: usize,
        cached: bool,
    },
    /// A row could not be recovered and was removed.
    RowDropped { line: usize, reason: String },
    /// Per-column cleaning counts.
    ColumnRepaired {
        column: String,
        repaired: usize,
        invalid: usize,
        footnotes: usize,
    },
    /// A complete row whose shares do not add up to 1.
    ShareSumAnomaly {
        line: usize,
        pollster: String,
        date: NaiveDate,
        sum: f64,
    },
    DuplicateResolved {
        pollster: String,
        date: NaiveDate,
        kept_line: usize,
        kept_timestamp: NaiveDateTime,
        dropped: Vec<(usize, NaiveDateTime)>,
        merged_cells: usize,
    },
    SplitProgress {
        pollster: String,
        row: usize,
        total: usize,
        responses: usize,
    },
    /// Pollster included in the average with too few reports to be reliable.
    SparsePollster {
        pollster: String,
        candidate: String,
        reports: usize,
    },
    /// Internal gap in an averaged series that interpolation did not close.
    GapLeftUnfilled {
        candidate: String,
        start: NaiveDate,
        days: usize,
    },
    CandidateTruncated {
        candidate: String,
        from: NaiveDate,
        days: usize,
    },
    StageCompleted { stage: Stage, elapsed_ms: u128 },
}

impl Diagnostic {
    pub fn severity(&self) -> Severity {
        match self {
            Diagnostic::RowDropped { .. }
            | Diagnostic::ShareSumAnomaly { .. }
            | Diagnostic::SparsePollster { .. }
            | Diagnostic::GapLeftUnfilled { .. } => Severity::Warning,
            Diagnostic::ColumnRepaired { invalid, .. } if *invalid > 0 => Severity::Warning,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::SourceLoaded { source, bytes, cached } => {
                let origin = if *cached { " (cached)" } else { "" };
                write!(f, "Loaded {bytes} bytes from {source}{origin}")
            }
            Diagnostic::RowDropped { line, reason } => write!(f, "Dropping line {line}: {reason}"),
            Diagnostic::ColumnRepaired {
                column,
                repaired,
                invalid,
                footnotes,
            } => write!(
                f,
                "Column `{column}`: {repaired} repaired, {invalid} invalid, {footnotes} footnoted"
            ),
            Diagnostic::ShareSumAnomaly {
                line,
                pollster,
                date,
                sum,
            } => write!(f, "Line {line} ({pollster}, {date}): shares sum to {sum:.3}"),
            Diagnostic::DuplicateResolved {
                pollster,
                date,
                kept_line,
                kept_timestamp,
                dropped,
                merged_cells,
            } => {
                let dropped = dropped
                    .iter()
                    .map(|(line, ts)| format!("line {line} @ {ts}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(
                    f,
                    "Pollster '{pollster}' reported {date} more than once: keeping line {kept_line} @ {kept_timestamp}, dropping {dropped} ({merged_cells} cells merged)"
                )
            }
            Diagnostic::SplitProgress {
                pollster,
                row,
                total,
                responses,
            } => write!(f, "Splitting '{pollster}' [{row}/{total}] into {responses} rows"),
            Diagnostic::SparsePollster {
                pollster,
                candidate,
                reports,
            } => write!(
                f,
                "Pollster '{pollster}' has only {reports} report(s) for {candidate}; its contribution is statistically fragile"
            ),
            Diagnostic::GapLeftUnfilled { candidate, start, days } => {
                write!(f, "{candidate}: {days} day(s) from {start} left missing (gap exceeds bound)")
            }
            Diagnostic::CandidateTruncated { candidate, from, days } => {
                write!(f, "{candidate} dropped out on {from}: {days} day(s) truncated, others re-normalised")
            }
            Diagnostic::StageCompleted { stage, elapsed_ms } => {
                write!(f, "Done: {stage} took {elapsed_ms} ms")
            }
        }
    }
}

/// Receiver for pipeline diagnostics.
pub trait Reporter {
    fn report(&mut self, diagnostic: Diagnostic);
}

/// Forwards diagnostics to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn report(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity() {
            Severity::Info => log::info!("{diagnostic}"),
            Severity::Warning => log::warn!("{diagnostic}"),
        }
    }
}

/// Keeps every diagnostic in memory.
#[derive(Debug, Default, Clone)]
pub struct CollectingReporter {
    pub diagnostics: Vec<Diagnostic>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity() == Severity::Warning)
    }

    /// Hand everything collected so far to another reporter, in order.
    pub fn replay_into(self, target: &mut dyn Reporter) {
        for d in self.diagnostics {
            target.report(d);
        }
    }
}

impl Reporter for CollectingReporter {
    fn report(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }
}
