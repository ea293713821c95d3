//! Configuration from `POLLS_*` environment variables.
//!
//! Unset or empty variables keep the `PipelineConfig` default. Anything set
//! but unparseable is a configuration error; there is no silent fallback.
//!
//! `config_from_lookup` takes the lookup as a function so tests never touch
//! the process environment.

use std::path::PathBuf;
use std::str::FromStr;

use chrono::NaiveDate;

use crate::domain::{Dropout, GapFill, PipelineConfig, PollSource, WeightMode};
use crate::error::AppError;

/// Build the configuration from the process environment.
pub fn config_from_env() -> Result<PipelineConfig, AppError> {
    config_from_lookup(|key| std::env::var(key).ok())
}

pub fn config_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<PipelineConfig, AppError> {
    let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
    let mut config = PipelineConfig::default();

    if let Some(v) = get("POLLS_SOURCE") {
        config.source = PollSource::parse(&v)?;
    }
    if let Some(v) = get("POLLS_CANDIDATES") {
        config.candidates = parse_candidates(&v)?;
    }
    if let Some(v) = get("POLLS_RAW_DIR") {
        config.raw_dir = optional_dir(&v);
    }
    if let Some(v) = get("POLLS_INTERIM_DIR") {
        config.interim_dir = optional_dir(&v);
    }
    if let Some(v) = get("POLLS_OUTPUT_DIR") {
        config.output_dir = PathBuf::from(v);
    }
    if let Some(v) = get("POLLS_RESET") {
        config.reset = parse_bool("POLLS_RESET", &v)?;
    }

    if let Some(v) = get("POLLS_MAX_GAP_DAYS") {
        config.max_gap_days = parse_number("POLLS_MAX_GAP_DAYS", &v)?;
    }
    if let Some(v) = get("POLLS_GAP_FILL") {
        config.gap_fill = GapFill::from_str(&v)?;
    }
    if let Some(v) = get("POLLS_WEIGHT_MODE") {
        config.weight_mode = WeightMode::from_str(&v)?;
    }
    if let Some(v) = get("POLLS_MIN_REPORTS") {
        config.min_reports = parse_number("POLLS_MIN_REPORTS", &v)?;
    }

    if let Some(v) = get("POLLS_TREND_WINDOW") {
        config.trend.window = parse_number("POLLS_TREND_WINDOW", &v)?;
        // A shorter window cannot satisfy the default min_periods.
        config.trend.min_periods = config.trend.min_periods.min(config.trend.window);
    }
    if let Some(v) = get("POLLS_TREND_STD") {
        config.trend.std = parse_number("POLLS_TREND_STD", &v)?;
    }
    if let Some(v) = get("POLLS_TREND_MIN_PERIODS") {
        config.trend.min_periods = parse_number("POLLS_TREND_MIN_PERIODS", &v)?;
    }
    config.trend.validate()?;

    if let Some(v) = get("POLLS_ANOMALY_TOLERANCE") {
        config.anomaly_tolerance = parse_number("POLLS_ANOMALY_TOLERANCE", &v)?;
    }
    if let Some(v) = get("POLLS_DROPOUTS") {
        config.dropouts = parse_dropouts(&v)?;
    }

    if let Some(v) = get("POLLS_PLOT") {
        config.plot = parse_bool("POLLS_PLOT", &v)?;
    }
    if let Some(v) = get("POLLS_CHART_SVG") {
        config.chart_svg = Some(PathBuf::from(v));
    }

    Ok(config)
}

fn parse_candidates(raw: &str) -> Result<Vec<String>, AppError> {
    let mut out: Vec<String> = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if out.iter().any(|c| c.eq_ignore_ascii_case(name)) {
            return Err(AppError::Config(format!("candidate '{name}' is listed twice")));
        }
        out.push(name.to_string());
    }
    if out.is_empty() {
        return Err(AppError::Config("POLLS_CANDIDATES names no candidate".to_string()));
    }
    Ok(out)
}

/// `Name@YYYY-MM-DD`, comma separated.
fn parse_dropouts(raw: &str) -> Result<Vec<Dropout>, AppError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|item| {
            let (name, date) = item.rsplit_once('@').ok_or_else(|| {
                AppError::Config(format!("drop-out '{item}' is not of the form Name@YYYY-MM-DD"))
            })?;
            let from = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
                .map_err(|e| AppError::Config(format!("drop-out '{item}' has an invalid date: {e}")))?;
            let candidate = name.trim();
            if candidate.is_empty() {
                return Err(AppError::Config(format!("drop-out '{item}' has no candidate name")));
            }
            Ok(Dropout {
                candidate: candidate.to_string(),
                from,
            })
        })
        .collect()
}

fn optional_dir(raw: &str) -> Option<PathBuf> {
    if raw.eq_ignore_ascii_case("none") {
        None
    } else {
        Some(PathBuf::from(raw))
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, AppError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(AppError::Config(format!("{key} must be a boolean (got '{raw}')"))),
    }
}

fn parse_number<T>(key: &str, raw: &str) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| AppError::Config(format!("{key}='{raw}' is not a valid number: {e}")))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<PipelineConfig, AppError> {
        let vars: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        config_from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let config = from_pairs(&[]).unwrap();
        assert_eq!(config.source, PollSource::Synthetic { seed: 42 });
        assert_eq!(config.max_gap_days, 14);
        assert_eq!(config.candidates.len(), 6);
        assert!(config.plot);
    }

    #[test]
    fn variables_override_defaults() {
        let config = from_pairs(&[
            ("POLLS_SOURCE", "data/01_raw/polls.csv"),
            ("POLLS_CANDIDATES", "Bulstrode, Vincy ,Others"),
            ("POLLS_RAW_DIR", "none"),
            ("POLLS_RESET", "yes"),
            ("POLLS_MAX_GAP_DAYS", "10"),
            ("POLLS_GAP_FILL", "strict"),
            ("POLLS_WEIGHT_MODE", "inverse-variance"),
            ("POLLS_TREND_WINDOW", "5"),
            ("POLLS_DROPOUTS", "Vincy@2023-11-02"),
            ("POLLS_PLOT", "off"),
            ("POLLS_CHART_SVG", "out/trends.svg"),
        ])
        .unwrap();

        assert_eq!(config.source, PollSource::File(PathBuf::from("data/01_raw/polls.csv")));
        assert_eq!(config.candidates, vec!["Bulstrode", "Vincy", "Others"]);
        assert_eq!(config.raw_dir, None);
        assert!(config.reset);
        assert_eq!(config.max_gap_days, 10);
        assert_eq!(config.gap_fill, GapFill::Strict);
        assert_eq!(config.weight_mode, WeightMode::InverseVariance);
        assert_eq!(config.trend.window, 5);
        assert_eq!(config.trend.min_periods, 5);
        assert_eq!(
            config.dropouts,
            vec![Dropout {
                candidate: "Vincy".to_string(),
                from: NaiveDate::from_ymd_opt(2023, 11, 2).unwrap(),
            }]
        );
        assert!(!config.plot);
        assert_eq!(config.chart_svg, Some(PathBuf::from("out/trends.svg")));
    }

    #[test]
    fn blank_values_are_ignored() {
        let config = from_pairs(&[("POLLS_MAX_GAP_DAYS", "  ")]).unwrap();
        assert_eq!(config.max_gap_days, 14);
    }

    #[test]
    fn invalid_values_are_config_errors() {
        for pairs in [
            [("POLLS_MAX_GAP_DAYS", "two weeks")],
            [("POLLS_RESET", "maybe")],
            [("POLLS_WEIGHT_MODE", "vibes")],
            [("POLLS_DROPOUTS", "Vincy")],
            [("POLLS_DROPOUTS", "Vincy@02/11/2023")],
            [("POLLS_CANDIDATES", "Vincy,vincy")],
            [("POLLS_TREND_MIN_PERIODS", "9")],
        ] {
            let err = from_pairs(&pairs).unwrap_err();
            assert!(matches!(err, AppError::Config(_)), "{pairs:?} gave {err}");
            assert_eq!(err.exit_code(), 2);
        }
    }
}
