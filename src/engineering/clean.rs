//! Cell-level cleaning: raw text table -> typed `PollingTable`.
//!
//! What gets repaired:
//! - percentages without a `%` sign (`41` -> 0.41, `0.5` -> 0.005)
//! - decimal commas (`41,5%`)
//! - thousands separators in the sample size (`1,204`)
//!
//! Markers are recorded, never folded into the value:
//! - `*` on a candidate cell -> footnote flag for that cell
//! - `**` on a candidate cell -> the row answered the alternate question
//! - `*` on the sample size -> the poll excludes overseas candidates
//!
//! Unrecoverable cells become `ShareCell::Missing` and are counted as invalid.
//! Rows without a usable date or pollster are dropped, always with a
//! `RowDropped` diagnostic.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::domain::{PollRecord, PollingTable, ShareCell};
use crate::error::AppError;
use crate::io::ingest::{COL_EXCLUDES_OVERSEAS, COL_SAMPLE, COL_TIMESTAMP, RawRow, RawTable};
use crate::report::{Diagnostic, Reporter, Stage};

/// Cleaning counts for one column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnDiagnostics {
    pub column: String,
    pub repaired: usize,
    pub invalid: usize,
    pub footnotes: usize,
}

impl ColumnDiagnostics {
    fn named(column: &str) -> Self {
        Self {
            column: column.to_string(),
            ..Self::default()
        }
    }

    fn has_findings(&self) -> bool {
        self.repaired + self.invalid + self.footnotes > 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleaningReport {
    /// Candidate columns first (in table order), then metadata columns.
    pub columns: Vec<ColumnDiagnostics>,
    pub rows_dropped: usize,
    pub anomalies: usize,
}

impl CleaningReport {
    pub fn column(&self, name: &str) -> Option<&ColumnDiagnostics> {
        self.columns.iter().find(|c| c.column == name)
    }
}

/// Outcome of parsing a single percentage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum ParsedShare {
    Clean(f64),
    Repaired(f64),
    Invalid,
}

/// Clean a raw table.
///
/// Fails only when no row survives; everything else is repaired in place and
/// reported.
pub fn clean_data(
    raw: &RawTable,
    anomaly_tolerance: f64,
    reporter: &mut dyn Reporter,
) -> Result<(PollingTable, CleaningReport), AppError> {
    let mut report = CleaningReport {
        columns: raw.candidates.iter().map(|c| ColumnDiagnostics::named(c)).collect(),
        ..CleaningReport::default()
    };
    let mut sample_diag = ColumnDiagnostics::named(COL_SAMPLE);
    let mut timestamp_diag = ColumnDiagnostics::named(COL_TIMESTAMP);
    let mut overseas_diag = ColumnDiagnostics::named(COL_EXCLUDES_OVERSEAS);

    for e in &raw.row_errors {
        report.rows_dropped += 1;
        reporter.report(Diagnostic::RowDropped {
            line: e.line,
            reason: e.message.clone(),
        });
    }

    let mut records = Vec::with_capacity(raw.rows.len());

    for row in &raw.rows {
        let Some(date) = parse_date(&row.date) else {
            report.rows_dropped += 1;
            reporter.report(Diagnostic::RowDropped {
                line: row.line,
                reason: format!("invalid date '{}'", row.date),
            });
            continue;
        };

        let pollster = normalize_pollster(&row.pollster);
        if pollster.is_empty() {
            report.rows_dropped += 1;
            reporter.report(Diagnostic::RowDropped {
                line: row.line,
                reason: "missing pollster".to_string(),
            });
            continue;
        }

        let mut shares = Vec::with_capacity(row.cells.len());
        let mut footnotes = Vec::with_capacity(row.cells.len());
        let mut alternate_question = false;

        for (cell, diag) in row.cells.iter().zip(report.columns.iter_mut()) {
            let (value, markers) = clean_share_cell(cell, diag);
            footnotes.push(markers > 0);
            alternate_question |= markers >= 2;
            shares.push(value);
        }

        let (sample, sample_flag) = clean_sample(row, &mut sample_diag);
        let timestamp = clean_timestamp(row, date, &mut timestamp_diag);
        let overseas_flag = clean_overseas_flag(row, &mut overseas_diag);

        let record = PollRecord {
            line: row.line,
            date,
            timestamp,
            pollster,
            sample,
            shares,
            footnotes,
            excludes_overseas: sample_flag || overseas_flag,
            alternate_question,
            scenario: None,
        };

        if let Some(sum) = record.complete_share_sum() {
            if (sum - 1.0).abs() > anomaly_tolerance {
                report.anomalies += 1;
                reporter.report(Diagnostic::ShareSumAnomaly {
                    line: record.line,
                    pollster: record.pollster.clone(),
                    date: record.date,
                    sum,
                });
            }
        }

        records.push(record);
    }

    report.columns.push(sample_diag);
    report.columns.push(timestamp_diag);
    report.columns.push(overseas_diag);

    for diag in report.columns.iter().filter(|d| d.has_findings()) {
        reporter.report(Diagnostic::ColumnRepaired {
            column: diag.column.clone(),
            repaired: diag.repaired,
            invalid: diag.invalid,
            footnotes: diag.footnotes,
        });
    }

    if records.is_empty() {
        return Err(AppError::no_data(
            Stage::Clean,
            format!("all {} rows were dropped", raw.rows_read),
        ));
    }

    Ok((PollingTable::new(raw.candidates.clone(), records), report))
}

/// Clean one candidate cell. Returns the cell and the number of `*` markers.
fn clean_share_cell(text: &str, diag: &mut ColumnDiagnostics) -> (ShareCell, usize) {
    let markers = text.matches('*').count();
    if markers > 0 {
        diag.footnotes += 1;
    }
    let body = text.replace('*', "");
    let body = body.trim();

    if is_missing_token(body) {
        return (ShareCell::Missing, markers);
    }

    let mut values = Vec::new();
    let mut repaired = false;
    for part in body.split(['/', '|']) {
        match parse_share(part) {
            ParsedShare::Clean(v) => values.push(v),
            ParsedShare::Repaired(v) => {
                repaired = true;
                values.push(v);
            }
            ParsedShare::Invalid => {
                diag.invalid += 1;
                return (ShareCell::Missing, markers);
            }
        }
    }
    if repaired {
        diag.repaired += 1;
    }

    let cell = match values.len() {
        1 => ShareCell::Value(values[0]),
        _ => ShareCell::Multi(values),
    };
    (cell, markers)
}

/// Parse a percentage-formatted share into a fraction.
///
/// A number without a `%` sign is still a percentage; it only counts as a
/// repair.
pub(crate) fn parse_share(text: &str) -> ParsedShare {
    let text = text.trim();
    let has_pct = text.ends_with('%');
    let mut body = text.trim_end_matches('%').trim().to_string();
    let mut repaired = !has_pct;

    if body.contains(',') && !body.contains('.') {
        body = body.replace(',', ".");
        repaired = true;
    }

    let Ok(v) = body.parse::<f64>() else {
        return ParsedShare::Invalid;
    };

    let fraction = v / 100.0;

    if !fraction.is_finite() || !(0.0..=1.0).contains(&fraction) {
        return ParsedShare::Invalid;
    }

    if repaired {
        ParsedShare::Repaired(fraction)
    } else {
        ParsedShare::Clean(fraction)
    }
}

fn is_missing_token(s: &str) -> bool {
    matches!(
        s.to_ascii_lowercase().as_str(),
        "" | "nan" | "na" | "n/a" | "-" | "\u{2013}" | "\u{2014}"
    )
}

fn clean_sample(row: &RawRow, diag: &mut ColumnDiagnostics) -> (Option<u32>, bool) {
    let Some(text) = row.sample.as_deref() else {
        return (None, false);
    };
    let flagged = text.contains('*');
    if flagged {
        diag.footnotes += 1;
    }
    let digits: String = text
        .chars()
        .filter(|c| !matches!(c, '*' | ',' | ' '))
        .collect();
    if is_missing_token(&digits) {
        return (None, flagged);
    }

    if let Ok(n) = digits.parse::<u32>() {
        return (Some(n), flagged);
    }
    // `683.0` style exports.
    match digits.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 && v.fract() == 0.0 && v <= u32::MAX as f64 => {
            diag.repaired += 1;
            (Some(v as u32), flagged)
        }
        _ => {
            diag.invalid += 1;
            (None, flagged)
        }
    }
}

fn clean_timestamp(row: &RawRow, date: NaiveDate, diag: &mut ColumnDiagnostics) -> NaiveDateTime {
    let midnight = date.and_time(NaiveTime::MIN);
    let Some(text) = row.timestamp.as_deref().map(str::trim).filter(|s| !s.is_empty()) else {
        return midnight;
    };
    match parse_timestamp(text) {
        Some(ts) => ts,
        None => {
            diag.invalid += 1;
            midnight
        }
    }
}

fn clean_overseas_flag(row: &RawRow, diag: &mut ColumnDiagnostics) -> bool {
    let Some(text) = row.excludes_overseas.as_deref() else {
        return false;
    };
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "1" => true,
        "false" | "no" | "n" | "0" | "" => false,
        _ => {
            diag.invalid += 1;
            false
        }
    }
}

fn normalize_pollster(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse a poll date.
///
/// Source tables use US ordering (`MM/DD/YY`); ISO dates and the date part of
/// ISO date-times are accepted as well.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    const FMTS: [&str; 4] = ["%m/%d/%y", "%m/%d/%Y", "%Y-%m-%d", "%Y/%m/%d"];
    let s = s.trim();
    for fmt in FMTS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    parse_timestamp(s).map(|ts| ts.date())
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    const FMTS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];
    for fmt in FMTS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(ts);
        }
    }
    ["%Y-%m-%d", "%m/%d/%y", "%m/%d/%Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .map(|d| d.and_time(NaiveTime::MIN))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::ingest::parse_polling_csv;
    use crate::report::CollectingReporter;

    fn candidates() -> Vec<String> {
        ["Bulstrode", "Lydgate", "Chettam"].iter().map(|c| c.to_string()).collect()
    }

    fn clean(csv: &str) -> (PollingTable, CleaningReport, CollectingReporter) {
        let raw = parse_polling_csv(csv.as_bytes(), &candidates()).unwrap();
        let mut reporter = CollectingReporter::new();
        let (table, report) = clean_data(&raw, 0.03, &mut reporter).unwrap();
        (table, report, reporter)
    }

    #[test]
    fn parse_share_variants() {
        assert_eq!(parse_share("41%"), ParsedShare::Clean(0.41));
        assert_eq!(parse_share(" 41 % "), ParsedShare::Clean(0.41));
        assert_eq!(parse_share("41"), ParsedShare::Repaired(0.41));
        assert_eq!(parse_share("0.5"), ParsedShare::Repaired(0.005));
        assert_eq!(parse_share("41,5%"), ParsedShare::Repaired(0.415));
        assert_eq!(parse_share("abc%"), ParsedShare::Invalid);
        assert_eq!(parse_share("140%"), ParsedShare::Invalid);
    }

    #[test]
    fn percentages_become_fractions_and_repairs_are_counted() {
        let (table, report, _) = clean(
            "Date,Pollster,Sample,Bulstrode,Lydgate,Chettam\n\
             01/01/21,Bardi University,683,10%,60,30%\n\
             02/02/21,Bardi University,700,20%,50%,30%\n",
        );

        assert_eq!(table.len(), 2);
        assert_eq!(table.records[0].share(0), Some(0.1));
        assert!((table.records[0].share(1).unwrap() - 0.6).abs() < 1e-12);
        assert_eq!(table.records[1].date, NaiveDate::from_ymd_opt(2021, 2, 2).unwrap());

        let lydgate = report.column("Lydgate").unwrap();
        assert_eq!(lydgate.repaired, 1);
        assert_eq!(lydgate.invalid, 0);
    }

    #[test]
    fn unsigned_small_values_stay_percentages() {
        let (table, report, _) = clean(
            "Date,Pollster,Bulstrode,Lydgate,Chettam\n\
             10/01/23,Garth Polling,99.5,0.5,\n",
        );

        let row = &table.records[0];
        assert_eq!(row.shares[0], ShareCell::Value(0.995));
        assert_eq!(row.shares[1], ShareCell::Value(0.005));
        assert_eq!(row.shares[2], ShareCell::Missing);
        assert_eq!(report.column("Bulstrode").unwrap().repaired, 1);
        assert_eq!(report.column("Lydgate").unwrap().repaired, 1);
        assert_eq!(report.column("Lydgate").unwrap().invalid, 0);
    }

    #[test]
    fn markers_are_flags_not_values() {
        let (table, report, _) = clean(
            "Date,Pollster,Sample,Bulstrode,Lydgate,Chettam\n\
             10/18/23,Bardi University,\"1,709*\",32%,38%*,**\n\
             10/18/23,Bardi University,709,32%,38%,8%**\n",
        );

        let first = &table.records[0];
        assert_eq!(first.sample, Some(1709));
        assert!(first.excludes_overseas);
        assert_eq!(first.footnotes, vec![false, true, true]);
        assert!(first.alternate_question);
        assert_eq!(first.shares[2], ShareCell::Missing);

        let second = &table.records[1];
        assert!(!second.excludes_overseas);
        assert!(second.alternate_question);
        assert_eq!(second.share(2), Some(0.08));

        assert_eq!(report.column("Chettam").unwrap().footnotes, 2);
        assert_eq!(report.column("Sample").unwrap().footnotes, 1);
    }

    #[test]
    fn invalid_cells_are_missing_and_logged() {
        let (table, report, reporter) = clean(
            "Date,Pollster,Bulstrode,Lydgate,Chettam\n\
             10/18/23,Bardi University,thirty,38%,30%\n",
        );
        assert_eq!(table.records[0].shares[0], ShareCell::Missing);
        assert_eq!(report.column("Bulstrode").unwrap().invalid, 1);
        assert!(reporter.diagnostics.iter().any(|d| matches!(
            d,
            Diagnostic::ColumnRepaired { column, invalid: 1, .. } if column == "Bulstrode"
        )));
    }

    #[test]
    fn rows_with_bad_dates_are_dropped_with_a_trace() {
        let (table, report, reporter) = clean(
            "Date,Pollster,Bulstrode,Lydgate,Chettam\n\
             sometime,Bardi University,30%,40%,30%\n\
             10/18/23,  Bardi   University ,30%,40%,30%\n",
        );
        assert_eq!(table.len(), 1);
        assert_eq!(table.records[0].pollster, "Bardi University");
        assert_eq!(report.rows_dropped, 1);
        assert!(reporter
            .diagnostics
            .iter()
            .any(|d| matches!(d, Diagnostic::RowDropped { line: 2, .. })));
    }

    #[test]
    fn multi_response_cells_are_kept_for_splitting() {
        let (table, _, _) = clean(
            "Date,Pollster,Bulstrode,Lydgate,Chettam\n\
             10/18/23,Bardi University,31% / 29%,40%,29% | 31%\n",
        );
        assert_eq!(table.records[0].shares[0], ShareCell::Multi(vec![0.31, 0.29]));
        assert!(table.has_multi_response_rows());
    }

    #[test]
    fn share_sum_anomalies_are_reported() {
        let (_, report, reporter) = clean(
            "Date,Pollster,Bulstrode,Lydgate,Chettam\n\
             10/18/23,Bardi University,50%,40%,30%\n\
             10/19/23,Bardi University,30%,40%,\n",
        );
        assert_eq!(report.anomalies, 1);
        assert_eq!(
            reporter
                .diagnostics
                .iter()
                .filter(|d| matches!(d, Diagnostic::ShareSumAnomaly { .. }))
                .count(),
            1
        );
    }

    #[test]
    fn timestamps_default_to_midnight_of_the_poll_date() {
        let (table, _, _) = clean(
            "Date,Pollster,Timestamp,Bulstrode,Lydgate,Chettam\n\
             10/18/23,Bardi University,2023-10-19 08:30:00,30%,40%,30%\n\
             10/18/23,Ipsos,,30%,40%,30%\n",
        );
        assert_eq!(
            table.records[0].timestamp,
            NaiveDate::from_ymd_opt(2023, 10, 19).unwrap().and_hms_opt(8, 30, 0).unwrap()
        );
        assert_eq!(
            table.records[1].timestamp,
            NaiveDate::from_ymd_opt(2023, 10, 18).unwrap().and_hms_opt(0, 0, 0).unwrap()
        );
    }

    #[test]
    fn empty_result_is_fatal() {
        let raw = parse_polling_csv(
            "Date,Pollster,Bulstrode,Lydgate,Chettam\nnope,X,1%,1%,1%\n".as_bytes(),
            &candidates(),
        )
        .unwrap();
        let mut reporter = CollectingReporter::new();
        let err = clean_data(&raw, 0.03, &mut reporter).unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }
}
