//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - loads `.env` and initialises logging
//! - builds the configuration from the environment
//! - runs the pipeline and writes its artifacts
//! - prints the summary and the trend chart

use crate::error::AppError;
use crate::report::LogReporter;

pub mod env;
pub mod pipeline;

/// Entry point for the `polls` binary.
pub fn run() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = env::config_from_env()?;
    log::debug!("Configuration: {config:?}");

    let mut reporter = LogReporter;
    let output = pipeline::run_pipeline(&config, &mut reporter)?;
    let paths = pipeline::write_artifacts(&output, &config, &mut reporter)?;

    println!("{}", crate::report::format_run_summary(&output.summary(&config)));

    if config.plot {
        let plot = crate::plot::render_ascii_chart(&output.trends, config.plot_width, config.plot_height);
        println!("{plot}");
    }

    println!("Polling averages: {}", paths.outputs.polling_averages.display());
    println!("Trends: {}", paths.outputs.trends.display());
    if let Some(chart) = &paths.chart {
        println!("Chart: {}", chart.display());
    }

    Ok(())
}
