//! Expansion of multi-response rows.
//!
//! Some pollsters fold several simultaneous answers into one row (for example
//! a hypothetical scenario next to the headline question, `31% / 29%`). Each
//! answer is a distinct sample for weighting, so the row is replaced by one
//! row per response:
//!
//! - row `k` takes the `k`-th value of every multi-valued cell, or `Missing`
//!   when that cell has fewer responses
//! - single-valued cells are copied to every row
//! - date, pollster, sample and flags are kept; `scenario` is set to `k`

use crate::domain::{PollRecord, PollingTable, ShareCell};
use crate::report::{Diagnostic, Reporter};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SplitReport {
    /// Multi-response rows that were expanded.
    pub rows_split: usize,
    /// Net rows added to the table.
    pub rows_added: usize,
}

impl SplitReport {
    fn absorb(&mut self, other: SplitReport) {
        self.rows_split += other.rows_split;
        self.rows_added += other.rows_added;
    }
}

/// Split every multi-response row of `pollster`, in place.
///
/// Rows keep their position in the table; a split row's replacements appear
/// where the original was. Emits one `SplitProgress` per expanded row.
pub fn split_multi_response_rows(
    table: &mut PollingTable,
    pollster: &str,
    reporter: &mut dyn Reporter,
) -> SplitReport {
    let total = table
        .records
        .iter()
        .filter(|r| r.pollster == pollster && r.has_multi_response())
        .count();
    if total == 0 {
        return SplitReport::default();
    }

    let mut report = SplitReport::default();
    let mut out = Vec::with_capacity(table.records.len() + total);

    for record in table.records.drain(..) {
        if record.pollster != pollster || !record.has_multi_response() {
            out.push(record);
            continue;
        }

        let expanded = expand(&record);
        report.rows_split += 1;
        report.rows_added += expanded.len().saturating_sub(1);
        reporter.report(Diagnostic::SplitProgress {
            pollster: pollster.to_string(),
            row: report.rows_split,
            total,
            responses: expanded.len(),
        });
        out.extend(expanded);
    }

    table.records = out;
    report
}

/// Split multi-response rows for every pollster that has them.
pub fn split_all_multi_response_rows(table: &mut PollingTable, reporter: &mut dyn Reporter) -> SplitReport {
    let pollsters: Vec<String> = table
        .by_pollster()
        .into_iter()
        .filter(|(_, rows)| rows.iter().any(|r| r.has_multi_response()))
        .map(|(name, _)| name.to_string())
        .collect();

    let mut report = SplitReport::default();
    for pollster in pollsters {
        report.absorb(split_multi_response_rows(table, &pollster, reporter));
    }
    report
}

fn expand(record: &PollRecord) -> Vec<PollRecord> {
    let responses = record
        .shares
        .iter()
        .map(ShareCell::response_count)
        .max()
        .unwrap_or(1)
        .max(1);

    (0..responses)
        .map(|k| {
            let shares = record
                .shares
                .iter()
                .map(|cell| match cell {
                    ShareCell::Multi(values) => values
                        .get(k)
                        .copied()
                        .map(ShareCell::Value)
                        .unwrap_or(ShareCell::Missing),
                    other => other.clone(),
                })
                .collect();
            PollRecord {
                shares,
                scenario: Some(k),
                ..record.clone()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::report::CollectingReporter;

    fn record(line: usize, pollster: &str, shares: Vec<ShareCell>) -> PollRecord {
        let date = NaiveDate::from_ymd_opt(2023, 10, 18).unwrap();
        PollRecord {
            line,
            date,
            timestamp: date.and_hms_opt(0, 0, 0).unwrap(),
            pollster: pollster.to_string(),
            sample: Some(800),
            footnotes: vec![false; shares.len()],
            shares,
            excludes_overseas: false,
            alternate_question: false,
            scenario: None,
        }
    }

    fn table(records: Vec<PollRecord>) -> PollingTable {
        let candidates = ["A", "B", "C"].iter().map(|c| c.to_string()).collect();
        PollingTable::new(candidates, records)
    }

    #[test]
    fn expands_in_place_and_reports_progress() {
        let mut t = table(vec![
            record(2, "Ipsos", vec![ShareCell::Value(0.3), ShareCell::Value(0.3), ShareCell::Value(0.4)]),
            record(
                3,
                "Ipsos",
                vec![
                    ShareCell::Multi(vec![0.31, 0.29]),
                    ShareCell::Value(0.4),
                    ShareCell::Multi(vec![0.29, 0.31]),
                ],
            ),
            record(4, "Bardi", vec![ShareCell::Value(0.2), ShareCell::Value(0.5), ShareCell::Value(0.3)]),
        ]);
        let mut reporter = CollectingReporter::new();
        let report = split_multi_response_rows(&mut t, "Ipsos", &mut reporter);

        assert_eq!(report, SplitReport { rows_split: 1, rows_added: 1 });
        assert_eq!(t.len(), 4);
        assert_eq!(t.records[1].scenario, Some(0));
        assert_eq!(t.records[2].scenario, Some(1));
        assert_eq!(t.records[1].share(0), Some(0.31));
        assert_eq!(t.records[2].share(0), Some(0.29));
        assert_eq!(t.records[2].share(1), Some(0.4));
        assert_eq!(t.records[2].share(2), Some(0.31));
        assert_eq!(t.records[3].pollster, "Bardi");
        assert!(!t.has_multi_response_rows());

        assert_eq!(
            reporter.diagnostics,
            vec![Diagnostic::SplitProgress {
                pollster: "Ipsos".to_string(),
                row: 1,
                total: 1,
                responses: 2,
            }]
        );
    }

    #[test]
    fn shorter_cells_leave_missing_values() {
        let mut t = table(vec![record(
            2,
            "Ipsos",
            vec![
                ShareCell::Multi(vec![0.3, 0.2, 0.1]),
                ShareCell::Multi(vec![0.5, 0.6]),
                ShareCell::Missing,
            ],
        )]);
        let mut reporter = CollectingReporter::new();
        split_multi_response_rows(&mut t, "Ipsos", &mut reporter);

        assert_eq!(t.len(), 3);
        assert_eq!(t.records[2].share(0), Some(0.1));
        assert_eq!(t.records[2].shares[1], ShareCell::Missing);
        assert!(t.records.iter().all(|r| r.shares[2] == ShareCell::Missing));
    }

    #[test]
    fn other_pollsters_are_untouched() {
        let mut t = table(vec![record(
            2,
            "Bardi",
            vec![ShareCell::Multi(vec![0.3, 0.2]), ShareCell::Value(0.5), ShareCell::Value(0.3)],
        )]);
        let mut reporter = CollectingReporter::new();
        let report = split_multi_response_rows(&mut t, "Ipsos", &mut reporter);
        assert_eq!(report, SplitReport::default());
        assert!(t.has_multi_response_rows());
        assert!(reporter.diagnostics.is_empty());
    }

    #[test]
    fn table_without_multi_rows_keeps_its_row_count() {
        let mut t = table(vec![
            record(2, "Ipsos", vec![ShareCell::Value(0.3), ShareCell::Value(0.3), ShareCell::Value(0.4)]),
            record(3, "Bardi", vec![ShareCell::Value(0.2), ShareCell::Value(0.5), ShareCell::Value(0.3)]),
        ]);
        let before = t.clone();
        let mut reporter = CollectingReporter::new();
        let report = split_all_multi_response_rows(&mut t, &mut reporter);
        assert_eq!(report.rows_added, 0);
        assert_eq!(t, before);
    }

    #[test]
    fn split_all_covers_every_pollster() {
        let mut t = table(vec![
            record(2, "Ipsos", vec![ShareCell::Multi(vec![0.3, 0.2]), ShareCell::Value(0.5), ShareCell::Value(0.3)]),
            record(3, "Bardi", vec![ShareCell::Value(0.2), ShareCell::Multi(vec![0.5, 0.4]), ShareCell::Value(0.3)]),
        ]);
        let mut reporter = CollectingReporter::new();
        let report = split_all_multi_response_rows(&mut t, &mut reporter);
        assert_eq!(report.rows_split, 2);
        assert_eq!(t.len(), 4);
        assert!(!t.has_multi_response_rows());
    }
}
