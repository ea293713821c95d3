//! Terminal output for a finished run.
//!
//! Formatting lives here so the stages stay free of presentation, and output
//! changes stay localized (the tests below pin the layout).

use crate::io::summary::{LatestValue, RunSummary};

/// Format the run summary: row accounting, settings and latest values.
pub fn format_run_summary(summary: &RunSummary) -> String {
    let mut out = String::new();

    out.push_str("=== polls - Polling Averages & Trends ===\n");
    out.push_str(&format!("Source: {}\n", summary.source));
    out.push_str(&format!(
        "Dates: [{}, {}] | pollsters={}\n",
        summary.start,
        summary.end,
        summary.pollsters.len()
    ));

    let rows = &summary.rows;
    out.push_str(&format!(
        "Rows: read={} dropped={} duplicates={} split={}(+{}) weighted={}\n",
        rows.read, rows.dropped, rows.duplicates_dropped, rows.rows_split, rows.rows_added, rows.weighted
    ));

    let s = &summary.settings;
    out.push_str(&format!(
        "Weighting: {:?} | gaps: {:?} <= {}d | trend: window={} std={:.1} min={}\n",
        s.weight_mode, s.gap_fill, s.max_gap_days, s.trend.window, s.trend.std, s.trend.min_periods
    ));
    for d in &s.dropouts {
        out.push_str(&format!("Drop-out: {} from {}\n", d.candidate, d.from));
    }
    if summary.warnings > 0 {
        out.push_str(&format!("Warnings: {}\n", summary.warnings));
    }

    out.push('\n');
    out.push_str(&format_latest_table(&summary.latest));
    out
}

/// Latest value per candidate, highest average first.
pub fn format_latest_table(latest: &[LatestValue]) -> String {
    let mut rows: Vec<&LatestValue> = latest.iter().collect();
    rows.sort_by(|a, b| {
        b.average
            .unwrap_or(f64::NEG_INFINITY)
            .total_cmp(&a.average.unwrap_or(f64::NEG_INFINITY))
            .then_with(|| a.candidate.cmp(&b.candidate))
    });

    let mut out = String::new();
    out.push_str(
        format!("{:<16} {:<10} {:>8} {:>8} {:>8}", "candidate", "date", "average", "trend", "missing").trim_end(),
    );
    out.push('\n');
    out.push_str(format!("{:-<16} {:-<10} {:-<8} {:-<8} {:-<8}", "", "", "", "", "").trim_end());
    out.push('\n');

    for r in rows {
        let date = r.date.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string());
        out.push_str(
            format!(
                "{:<16} {:<10} {:>8} {:>8} {:>8}",
                truncate(&r.candidate, 16),
                date,
                fmt_pct(r.average),
                fmt_pct(r.trend),
                r.missing_days
            )
            .trim_end(),
        );
        out.push('\n');
    }
    out
}

fn fmt_pct(v: Option<f64>) -> String {
    v.map(|v| format!("{:.1}%", v * 100.0)).unwrap_or_else(|| "-".to_string())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::domain::{Dropout, GapFill, TrendConfig, WeightMode};
    use crate::io::summary::{RowCounts, Settings};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 10, d).unwrap()
    }

    fn latest(candidate: &str, average: Option<f64>) -> LatestValue {
        LatestValue {
            candidate: candidate.to_string(),
            date: average.map(|_| day(9)),
            average,
            trend: average.map(|a| a - 0.01),
            missing_days: 0,
        }
    }

    #[test]
    fn latest_table_orders_by_average() {
        let txt = format_latest_table(&[
            latest("Vincy", Some(0.2)),
            latest("Bulstrode", Some(0.35)),
            latest("Others", None),
        ]);
        let lines: Vec<&str> = txt.lines().collect();
        assert_eq!(lines[0], "candidate        date        average    trend  missing");
        assert_eq!(lines[2], "Bulstrode        2023-10-09    35.0%    34.0%        0");
        assert!(lines[3].starts_with("Vincy"));
        assert_eq!(lines[4], "Others           -                 -        -        0");
    }

    #[test]
    fn summary_lists_dropouts_and_warnings() {
        let summary = RunSummary {
            tool: "polls".to_string(),
            source: "synthetic:42".to_string(),
            rows: RowCounts {
                read: 12,
                dropped: 1,
                duplicates_dropped: 2,
                rows_split: 1,
                rows_added: 1,
                weighted: 10,
            },
            pollsters: vec!["Bardi University".to_string(), "Garth Polling".to_string()],
            start: day(1),
            end: day(9),
            settings: Settings {
                weight_mode: WeightMode::Sample,
                gap_fill: GapFill::Reach,
                max_gap_days: 14,
                min_reports: 2,
                trend: TrendConfig::default(),
                dropouts: vec![Dropout {
                    candidate: "Chettam".to_string(),
                    from: day(5),
                }],
            },
            warnings: 4,
            latest: vec![latest("Bulstrode", Some(0.35))],
        };

        let txt = format_run_summary(&summary);
        assert!(txt.contains("Dates: [2023-10-01, 2023-10-09] | pollsters=2\n"));
        assert!(txt.contains("Rows: read=12 dropped=1 duplicates=2 split=1(+1) weighted=10\n"));
        assert!(txt.contains("Drop-out: Chettam from 2023-10-05\n"));
        assert!(txt.contains("Warnings: 4\n"));
        assert!(txt.contains("Bulstrode"));
    }

    #[test]
    fn long_names_are_truncated() {
        assert_eq!(truncate("Tertius Lydgate-Vincy", 8), "Tertius.");
        assert_eq!(truncate("Vincy", 8), "Vincy");
    }
}
