//! Loading raw polling text from a URL, a file or the synthetic generator.
//!
//! Downloads are cached in the raw data directory and reused on later runs
//! unless `reset` is set. HTML pages (cached as downloaded) are reduced to
//! their first table.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::blocking::Client;

use crate::data::html::{first_table_csv, looks_like_html};
use crate::data::sample::{SampleConfig, generate_polling_csv};
use crate::domain::{PipelineConfig, PollSource};
use crate::error::AppError;
use crate::report::{Diagnostic, Reporter};

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_CACHE_NAME: &str = "polls.csv";

impl PollSource {
    /// Classify a source string.
    ///
    /// - `synthetic` or `synthetic:<seed>`
    /// - `http://...` / `https://...`
    /// - anything else is a file path
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(AppError::Config("polling source is empty".to_string()));
        }

        if let Some(rest) = raw.strip_prefix("synthetic") {
            if rest.is_empty() {
                return Ok(PollSource::Synthetic { seed: 42 });
            }
            if let Some(seed) = rest.strip_prefix(':') {
                let seed = seed
                    .parse::<u64>()
                    .map_err(|_| AppError::Config(format!("invalid synthetic seed '{seed}'")))?;
                return Ok(PollSource::Synthetic { seed });
            }
        }

        let lower = raw.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            validate_url(raw)?;
            return Ok(PollSource::Url(raw.to_string()));
        }

        Ok(PollSource::File(PathBuf::from(raw)))
    }
}

pub fn validate_url(raw: &str) -> Result<reqwest::Url, AppError> {
    let url = reqwest::Url::parse(raw).map_err(|e| AppError::Config(format!("invalid source URL '{raw}': {e}")))?;
    if url.host_str().is_none() {
        return Err(AppError::Config(format!("source URL '{raw}' has no host")));
    }
    Ok(url)
}

/// Raw text plus where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedSource {
    pub text: String,
    pub origin: String,
    pub cached: bool,
}

/// Blocking HTTP client for polling tables.
pub struct PollClient {
    client: Client,
}

impl PollClient {
    pub fn new() -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(concat!("poll-trends/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::Fetch(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    pub fn fetch_text(&self, url: &str) -> Result<String, AppError> {
        let resp = self
            .client
            .get(url)
            .send()
            .map_err(|e| AppError::Fetch(format!("request to {url} failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(AppError::Fetch(format!(
                "request to {url} failed with status {}",
                resp.status()
            )));
        }

        resp.text()
            .map_err(|e| AppError::Fetch(format!("failed to read response from {url}: {e}")))
    }
}

/// Load the configured source as text.
pub fn load_source_text(config: &PipelineConfig, reporter: &mut dyn Reporter) -> Result<LoadedSource, AppError> {
    let loaded = match &config.source {
        PollSource::Synthetic { seed } => {
            let sample = SampleConfig {
                seed: *seed,
                candidates: config.candidates.clone(),
                ..SampleConfig::default()
            };
            LoadedSource {
                text: generate_polling_csv(&sample)?,
                origin: config.source.to_string(),
                cached: false,
            }
        }
        PollSource::File(path) => LoadedSource {
            text: read_text(path)?,
            origin: path.display().to_string(),
            cached: false,
        },
        PollSource::Url(url) => load_url(url, config.raw_dir.as_deref(), config.reset)?,
    };
    let loaded = if looks_like_html(&loaded.text) {
        log::debug!("Reading the first HTML table of {}", loaded.origin);
        LoadedSource {
            text: first_table_csv(&loaded.text)?,
            ..loaded
        }
    } else {
        loaded
    };

    reporter.report(Diagnostic::SourceLoaded {
        source: loaded.origin.clone(),
        bytes: loaded.text.len(),
        cached: loaded.cached,
    });
    Ok(loaded)
}

fn load_url(url: &str, raw_dir: Option<&Path>, reset: bool) -> Result<LoadedSource, AppError> {
    let cache_path = raw_dir.map(|dir| dir.join(cache_file_name(url)));

    if let Some(path) = &cache_path {
        if !reset && path.is_file() {
            log::debug!("Reusing cached download {}", path.display());
            return Ok(LoadedSource {
                text: read_text(path)?,
                origin: url.to_string(),
                cached: true,
            });
        }
    }

    let text = PollClient::new()?.fetch_text(url)?;

    if let Some(path) = &cache_path {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| AppError::io(dir, e))?;
        }
        fs::write(path, &text).map_err(|e| AppError::io(path, e))?;
    }

    Ok(LoadedSource {
        text,
        origin: url.to_string(),
        cached: false,
    })
}

fn read_text(path: &Path) -> Result<String, AppError> {
    fs::read_to_string(path).map_err(|e| AppError::io(path, e))
}

/// File name used to cache a download: the last URL path segment, sanitised.
pub fn cache_file_name(url: &str) -> String {
    let segment = reqwest::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.rfind(|s| !s.is_empty()).map(str::to_string))
        })
        .unwrap_or_default();

    let name: String = segment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if name.is_empty() {
        DEFAULT_CACHE_NAME.to_string()
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::CollectingReporter;

    #[test]
    fn parses_each_kind_of_source() {
        assert_eq!(PollSource::parse("synthetic").unwrap(), PollSource::Synthetic { seed: 42 });
        assert_eq!(PollSource::parse("synthetic:7").unwrap(), PollSource::Synthetic { seed: 7 });
        assert_eq!(
            PollSource::parse("https://example.org/polls.csv").unwrap(),
            PollSource::Url("https://example.org/polls.csv".to_string())
        );
        assert_eq!(
            PollSource::parse("data/01_raw/polls.csv").unwrap(),
            PollSource::File(PathBuf::from("data/01_raw/polls.csv"))
        );
        assert!(PollSource::parse("synthetic:abc").is_err());
        assert!(PollSource::parse("https://").is_err());
        assert!(PollSource::parse("  ").is_err());
    }

    #[test]
    fn cache_names_come_from_the_url_path() {
        assert_eq!(cache_file_name("https://example.org/data/polls.csv"), "polls.csv");
        assert_eq!(cache_file_name("https://example.org/a/b%20c/"), "b_20c");
        assert_eq!(cache_file_name("https://example.org"), "polls.csv");
    }

    #[test]
    fn cached_download_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let url = "https://example.invalid/polls.csv";
        fs::write(dir.path().join("polls.csv"), "Date,Pollster\n").unwrap();

        let config = PipelineConfig {
            source: PollSource::Url(url.to_string()),
            raw_dir: Some(dir.path().to_path_buf()),
            ..PipelineConfig::default()
        };
        let mut reporter = CollectingReporter::new();
        let loaded = load_source_text(&config, &mut reporter).unwrap();

        assert!(loaded.cached);
        assert_eq!(loaded.text, "Date,Pollster\n");
        assert_eq!(
            reporter.diagnostics,
            vec![Diagnostic::SourceLoaded {
                source: url.to_string(),
                bytes: 14,
                cached: true,
            }]
        );
    }

    #[test]
    fn html_page_is_read_through_its_first_table() {
        let dir = tempfile::tempdir().unwrap();
        let url = "https://example.invalid/wiki/Opinion_polling";
        fs::write(
            dir.path().join("Opinion_polling"),
            "<html><body><table><tr><th>Date</th><th>Pollster</th></tr>\
             <tr><td>10/01/23</td><td>Bardi University</td></tr></table></body></html>",
        )
        .unwrap();

        let config = PipelineConfig {
            source: PollSource::Url(url.to_string()),
            raw_dir: Some(dir.path().to_path_buf()),
            ..PipelineConfig::default()
        };
        let mut reporter = CollectingReporter::new();
        let loaded = load_source_text(&config, &mut reporter).unwrap();

        assert!(loaded.cached);
        assert_eq!(loaded.text, "Date,Pollster\n10/01/23,Bardi University\n");
    }

    #[test]
    fn missing_file_is_an_input_error() {
        let config = PipelineConfig {
            source: PollSource::File(PathBuf::from("definitely/not/here.csv")),
            ..PipelineConfig::default()
        };
        let mut reporter = CollectingReporter::new();
        let err = load_source_text(&config, &mut reporter).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(reporter.diagnostics.is_empty());
    }
}
