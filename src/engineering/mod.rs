//! Data engineering: turn a raw polling table into one the weighting stage
//! can trust.
//!
//! - `clean`: typed cells, marker flags, repaired percentages
//! - `dedup`: one entry per pollster and date, most recent wins
//! - `split`: multi-response rows become independent rows

pub mod clean;
pub mod dedup;
pub mod split;

pub use clean::{CleaningReport, ColumnDiagnostics, clean_data, parse_date};
pub use dedup::{DedupReport, ResolvedDuplicate, resolve_duplicate_pollster_entries};
pub use split::{SplitReport, split_all_multi_response_rows, split_multi_response_rows};
