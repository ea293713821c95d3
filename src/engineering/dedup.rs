//! Duplicate pollster entries.
//!
//! Entries are duplicates when they share `(pollster, date, scenario)`.
//! Resolution keeps the entry with the latest timestamp; equal timestamps are
//! broken by source order (the earlier line wins). Cells the kept entry left
//! empty are filled from the dropped entries, most recent first, so two
//! half-rows that together cover the candidate set merge into one.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};

use crate::domain::{PollRecord, PollingTable, ShareCell};
use crate::report::{Diagnostic, Reporter};

/// One resolved duplicate group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDuplicate {
    pub pollster: String,
    pub date: NaiveDate,
    pub kept_line: usize,
    pub kept_timestamp: NaiveDateTime,
    pub dropped: Vec<(usize, NaiveDateTime)>,
    pub merged_cells: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupReport {
    pub groups: Vec<ResolvedDuplicate>,
}

impl DedupReport {
    pub fn rows_dropped(&self) -> usize {
        self.groups.iter().map(|g| g.dropped.len()).sum()
    }
}

type GroupKey = (String, NaiveDate, Option<usize>);

/// Collapse duplicate entries, keeping the most recent one per group.
///
/// The output is sorted by date, then pollster.
pub fn resolve_duplicate_pollster_entries(
    table: PollingTable,
    reporter: &mut dyn Reporter,
) -> (PollingTable, DedupReport) {
    let PollingTable { candidates, records } = table;

    let mut groups: BTreeMap<GroupKey, Vec<PollRecord>> = BTreeMap::new();
    for r in records {
        groups
            .entry((r.pollster.clone(), r.date, r.scenario))
            .or_default()
            .push(r);
    }

    let mut report = DedupReport::default();
    let mut kept = Vec::with_capacity(groups.len());

    for (_, mut entries) in groups {
        if entries.len() == 1 {
            kept.extend(entries);
            continue;
        }

        // Most recent first; source order among equal timestamps.
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.line.cmp(&b.line)));
        let mut entries = entries.into_iter();
        let Some(mut winner) = entries.next() else {
            continue;
        };
        let losers: Vec<PollRecord> = entries.collect();

        let merged_cells = merge_missing_cells(&mut winner, &losers);

        let resolved = ResolvedDuplicate {
            pollster: winner.pollster.clone(),
            date: winner.date,
            kept_line: winner.line,
            kept_timestamp: winner.timestamp,
            dropped: losers.iter().map(|l| (l.line, l.timestamp)).collect(),
            merged_cells,
        };
        reporter.report(Diagnostic::DuplicateResolved {
            pollster: resolved.pollster.clone(),
            date: resolved.date,
            kept_line: resolved.kept_line,
            kept_timestamp: resolved.kept_timestamp,
            dropped: resolved.dropped.clone(),
            merged_cells,
        });
        report.groups.push(resolved);
        kept.push(winner);
    }

    let mut out = PollingTable::new(candidates, kept);
    out.sort_by_date();
    (out, report)
}

fn merge_missing_cells(winner: &mut PollRecord, losers: &[PollRecord]) -> usize {
    let mut merged = 0;
    for idx in 0..winner.shares.len() {
        if !winner.shares[idx].is_missing() {
            continue;
        }
        let donor = losers
            .iter()
            .find(|l| l.shares.get(idx).is_some_and(|c| !c.is_missing()));
        if let Some(donor) = donor {
            winner.shares[idx] = donor.shares[idx].clone();
            if let Some(&flag) = donor.footnotes.get(idx) {
                winner.footnotes[idx] = flag;
            }
            merged += 1;
        }
    }
    if winner.sample.is_none() {
        winner.sample = losers.iter().find_map(|l| l.sample);
    }
    merged
}

/// Number of cells still missing, for callers that want to check merge coverage.
pub fn missing_cells(record: &PollRecord) -> usize {
    record.shares.iter().filter(|c| matches!(c, ShareCell::Missing)).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::CollectingReporter;

    fn record(line: usize, pollster: &str, day: u32, ts_day: u32, shares: &[Option<f64>]) -> PollRecord {
        let date = NaiveDate::from_ymd_opt(2023, 10, day).unwrap();
        PollRecord {
            line,
            date,
            timestamp: NaiveDate::from_ymd_opt(2023, 10, ts_day)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            pollster: pollster.to_string(),
            sample: Some(500),
            shares: shares
                .iter()
                .map(|s| s.map(ShareCell::Value).unwrap_or(ShareCell::Missing))
                .collect(),
            footnotes: vec![false; shares.len()],
            excludes_overseas: false,
            alternate_question: false,
            scenario: None,
        }
    }

    fn table(records: Vec<PollRecord>) -> PollingTable {
        PollingTable::new(vec!["A".to_string(), "B".to_string()], records)
    }

    #[test]
    fn keeps_the_latest_timestamp() {
        let t = table(vec![
            record(2, "Ipsos", 12, 13, &[Some(0.6), Some(0.4)]),
            record(3, "Ipsos", 12, 12, &[Some(0.5), Some(0.5)]),
            record(4, "Bardi", 12, 12, &[Some(0.3), Some(0.7)]),
        ]);
        let mut reporter = CollectingReporter::new();
        let (out, report) = resolve_duplicate_pollster_entries(t, &mut reporter);

        assert_eq!(out.len(), 2);
        let ipsos = out.records.iter().find(|r| r.pollster == "Ipsos").unwrap();
        assert_eq!(ipsos.line, 2);
        assert_eq!(ipsos.share(0), Some(0.6));

        assert_eq!(report.rows_dropped(), 1);
        assert_eq!(report.groups[0].dropped[0].0, 3);
        assert_eq!(reporter.diagnostics.len(), 1);
    }

    #[test]
    fn equal_timestamps_keep_the_first_line() {
        let t = table(vec![
            record(7, "Ipsos", 12, 12, &[Some(0.5), Some(0.5)]),
            record(5, "Ipsos", 12, 12, &[Some(0.6), Some(0.4)]),
        ]);
        let mut reporter = CollectingReporter::new();
        let (out, _) = resolve_duplicate_pollster_entries(t, &mut reporter);
        assert_eq!(out.records[0].line, 5);
    }

    #[test]
    fn complementary_rows_merge() {
        let t = table(vec![
            record(2, "Ipsos", 12, 12, &[Some(0.6), None]),
            record(3, "Ipsos", 12, 12, &[None, Some(0.4)]),
        ]);
        let mut reporter = CollectingReporter::new();
        let (out, report) = resolve_duplicate_pollster_entries(t, &mut reporter);

        assert_eq!(out.len(), 1);
        assert_eq!(missing_cells(&out.records[0]), 0);
        assert_eq!(out.records[0].share(1), Some(0.4));
        assert_eq!(report.groups[0].merged_cells, 1);
    }

    #[test]
    fn split_scenarios_are_not_duplicates() {
        let mut a = record(2, "Ipsos", 12, 12, &[Some(0.6), Some(0.4)]);
        let mut b = a.clone();
        a.scenario = Some(0);
        b.scenario = Some(1);
        let mut reporter = CollectingReporter::new();
        let (out, report) = resolve_duplicate_pollster_entries(table(vec![a, b]), &mut reporter);
        assert_eq!(out.len(), 2);
        assert!(report.groups.is_empty());
    }

    #[test]
    fn output_is_sorted_by_date() {
        let t = table(vec![
            record(2, "Ipsos", 20, 20, &[Some(0.6), Some(0.4)]),
            record(3, "Bardi", 3, 3, &[Some(0.5), Some(0.5)]),
        ]);
        let mut reporter = CollectingReporter::new();
        let (out, _) = resolve_duplicate_pollster_entries(t, &mut reporter);
        assert!(out.records.windows(2).all(|w| w[0].date <= w[1].date));
    }
}
