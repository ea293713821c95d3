//! The polling pipeline, stage by stage.
//!
//! Load -> Clean -> Deduplicate -> Split -> Weight -> Smooth, then Export.
//!
//! Every stage consumes its predecessor's output in full and either succeeds
//! or aborts the run; nothing is written until all series are computed. Each
//! stage reports a `StageCompleted` diagnostic with its wall time.

use std::path::PathBuf;
use std::time::Instant;

use crate::data::load_source_text;
use crate::domain::{CandidateSeries, PipelineConfig, PollingTable};
use crate::engineering::{
    CleaningReport, DedupReport, SplitReport, clean_data, resolve_duplicate_pollster_entries,
    split_all_multi_response_rows,
};
use crate::error::AppError;
use crate::io::export::{
    CLEANED_TABLE_FILE, OutputPaths, write_cleaned_table, write_outputs, write_pollster_splits,
};
use crate::io::ingest::parse_polling_csv;
use crate::io::summary::{LatestValue, RowCounts, RunSummary, SUMMARY_FILE, Settings, write_summary_json};
use crate::plot::write_svg_chart;
use crate::report::{Diagnostic, Reporter, Severity, Stage};
use crate::science::{AverageOptions, Truncation, apply_dropouts, compute_polling_averages, compute_trends};

/// Pixel size of the SVG chart.
pub const CHART_SIZE: (u32, u32) = (1000, 600);

/// Everything a run computed, before anything is written.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub source: String,
    pub rows_read: usize,
    /// The engineered table that went into weighting.
    pub table: PollingTable,
    pub cleaning: CleaningReport,
    pub dedup: DedupReport,
    pub split: SplitReport,
    pub averages: CandidateSeries,
    pub trends: CandidateSeries,
    pub truncations: Vec<Truncation>,
    /// Warning diagnostics emitted during the run.
    pub warnings: usize,
}

/// Where `write_artifacts` put things.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub outputs: OutputPaths,
    pub summary: PathBuf,
    pub interim: Vec<PathBuf>,
    pub chart: Option<PathBuf>,
}

/// Counts warnings on their way to the caller's reporter.
struct CountingReporter<'a> {
    inner: &'a mut dyn Reporter,
    warnings: usize,
}

impl<'a> CountingReporter<'a> {
    fn new(inner: &'a mut dyn Reporter) -> Self {
        Self { inner, warnings: 0 }
    }
}

impl Reporter for CountingReporter<'_> {
    fn report(&mut self, diagnostic: Diagnostic) {
        if diagnostic.severity() == Severity::Warning {
            self.warnings += 1;
        }
        self.inner.report(diagnostic);
    }
}

fn timed<T>(
    stage: Stage,
    reporter: &mut dyn Reporter,
    f: impl FnOnce(&mut dyn Reporter) -> Result<T, AppError>,
) -> Result<T, AppError> {
    let started = Instant::now();
    let out = f(reporter)?;
    reporter.report(Diagnostic::StageCompleted {
        stage,
        elapsed_ms: started.elapsed().as_millis(),
    });
    Ok(out)
}

/// Load the configured source and run every computing stage.
pub fn run_pipeline(config: &PipelineConfig, reporter: &mut dyn Reporter) -> Result<RunOutput, AppError> {
    validate(config)?;
    let mut counting = CountingReporter::new(reporter);
    let loaded = timed(Stage::Load, &mut counting, |r| load_source_text(config, r))?;
    process(loaded.origin, &loaded.text, config, &mut counting)
}

/// Run the computing stages on already-loaded CSV text.
pub fn run_pipeline_on_text(
    text: &str,
    origin: &str,
    config: &PipelineConfig,
    reporter: &mut dyn Reporter,
) -> Result<RunOutput, AppError> {
    validate(config)?;
    let mut counting = CountingReporter::new(reporter);
    process(origin.to_string(), text, config, &mut counting)
}

fn validate(config: &PipelineConfig) -> Result<(), AppError> {
    config.trend.validate()?;
    if config.candidates.is_empty() {
        return Err(AppError::Config("at least one candidate is required".to_string()));
    }
    if !(config.anomaly_tolerance.is_finite() && config.anomaly_tolerance >= 0.0) {
        return Err(AppError::Config(format!(
            "anomaly tolerance must be a non-negative number (got {})",
            config.anomaly_tolerance
        )));
    }
    for d in &config.dropouts {
        if !config.candidates.iter().any(|c| c.eq_ignore_ascii_case(&d.candidate)) {
            return Err(AppError::Config(format!(
                "drop-out names unknown candidate '{}'",
                d.candidate
            )));
        }
    }
    Ok(())
}

fn process(
    source: String,
    text: &str,
    config: &PipelineConfig,
    reporter: &mut CountingReporter<'_>,
) -> Result<RunOutput, AppError> {
    let (rows_read, table, cleaning) = timed(Stage::Clean, reporter, |r| {
        let raw = parse_polling_csv(text.as_bytes(), &config.candidates)?;
        let (table, cleaning) = clean_data(&raw, config.anomaly_tolerance, r)?;
        Ok((raw.rows_read, table, cleaning))
    })?;

    let (mut table, dedup) = timed(Stage::Deduplicate, reporter, |r| {
        Ok(resolve_duplicate_pollster_entries(table, r))
    })?;

    let split = timed(Stage::Split, reporter, |r| Ok(split_all_multi_response_rows(&mut table, r)))?;

    let (averages, truncations) = timed(Stage::Weight, reporter, |r| {
        let strategy = config.weight_mode.strategy(&table);
        log::debug!("Weighting pollsters with the '{}' strategy", strategy.name());
        let options = AverageOptions::from_config(config);
        let mut averages = compute_polling_averages(&table, strategy.as_ref(), &options, r)?;

        let truncations = apply_dropouts(&mut averages, &config.dropouts)?;
        for t in &truncations {
            r.report(Diagnostic::CandidateTruncated {
                candidate: t.candidate.clone(),
                from: t.from,
                days: t.days,
            });
        }
        Ok((averages, truncations))
    })?;

    let trends = timed(Stage::Smooth, reporter, |_| {
        let mut trends = compute_trends(&averages, &config.trend);
        apply_dropouts(&mut trends, &config.dropouts)?;
        Ok(trends)
    })?;

    Ok(RunOutput {
        source,
        rows_read,
        table,
        cleaning,
        dedup,
        split,
        averages,
        trends,
        truncations,
        warnings: reporter.warnings,
    })
}

impl RunOutput {
    /// Machine-readable record of this run.
    pub fn summary(&self, config: &PipelineConfig) -> RunSummary {
        let latest = self
            .averages
            .columns
            .iter()
            .map(|(candidate, series)| {
                let last = series.latest();
                LatestValue {
                    candidate: candidate.clone(),
                    date: last.map(|(date, _)| date),
                    average: last.map(|(_, v)| v),
                    trend: last.and_then(|(date, _)| self.trends.column(candidate)?.get(date)),
                    missing_days: series.missing_count(),
                }
            })
            .collect();

        RunSummary {
            tool: format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            source: self.source.clone(),
            rows: RowCounts {
                read: self.rows_read,
                dropped: self.cleaning.rows_dropped,
                duplicates_dropped: self.dedup.rows_dropped(),
                rows_split: self.split.rows_split,
                rows_added: self.split.rows_added,
                weighted: self.table.len(),
            },
            pollsters: self.table.pollsters(),
            start: self.averages.start,
            end: self.averages.end(),
            settings: Settings {
                weight_mode: config.weight_mode,
                gap_fill: config.gap_fill,
                max_gap_days: config.max_gap_days,
                min_reports: config.min_reports,
                trend: config.trend,
                dropouts: config.dropouts.clone(),
            },
            warnings: self.warnings,
            latest,
        }
    }
}

/// Write final tables, the run summary, interim tables and the optional chart.
pub fn write_artifacts(
    output: &RunOutput,
    config: &PipelineConfig,
    reporter: &mut dyn Reporter,
) -> Result<ArtifactPaths, AppError> {
    timed(Stage::Export, reporter, |_| {
        let outputs = write_outputs(&config.output_dir, &output.averages, &output.trends)?;

        let summary = config.output_dir.join(SUMMARY_FILE);
        write_summary_json(&summary, &output.summary(config))?;

        let mut interim = Vec::new();
        if let Some(dir) = &config.interim_dir {
            interim = write_pollster_splits(dir, &output.table)?;
            let cleaned = dir.join(CLEANED_TABLE_FILE);
            write_cleaned_table(&cleaned, &output.table)?;
            interim.push(cleaned);
        }

        let chart = match &config.chart_svg {
            Some(path) => {
                write_svg_chart(path, &output.trends, CHART_SIZE)?;
                Some(path.clone())
            }
            None => None,
        };

        Ok(ArtifactPaths {
            outputs,
            summary,
            interim,
            chart,
        })
    })
}
