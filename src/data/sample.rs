//! Synthetic polling data.
//!
//! Generates a CSV in the same shape (and with the same kinds of mess) as
//! published polling tables, so the whole pipeline can be run offline:
//!
//! - a latent daily support path per candidate (Gaussian random walk on
//!   positive weights, normalised to sum to 1)
//! - pollsters publishing on their own cadence, with a house effect and
//!   binomial sampling noise
//! - formatting noise: missing `%` signs, footnote markers, thousands
//!   separators, `*` samples, duplicate re-publications, multi-response cells
//!   and omitted candidates
//!
//! Output is fully determined by the seed and the configuration.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use chrono::{Days, NaiveDate};
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::domain::DEFAULT_CANDIDATES;
use crate::error::AppError;
use crate::io::ingest::{COL_DATE, COL_POLLSTER, COL_SAMPLE, COL_TIMESTAMP};

/// Daily std of the latent support random walk (on unnormalised weights).
const DRIFT_STD: f64 = 0.004;

#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticPollster {
    pub name: String,
    /// Typical sample size.
    pub sample: u32,
    /// Days between publications.
    pub cadence: u32,
    /// Std of this pollster's per-candidate house effect.
    pub house_std: f64,
}

impl SyntheticPollster {
    fn new(name: &str, sample: u32, cadence: u32, house_std: f64) -> Self {
        Self {
            name: name.to_string(),
            sample,
            cadence,
            house_std,
        }
    }
}

/// Probabilities of each kind of formatting noise, per row or per cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseRates {
    pub missing_percent: f64,
    pub footnote: f64,
    pub overseas_sample: f64,
    pub duplicate: f64,
    pub multi_response: f64,
    pub omitted: f64,
}

impl Default for NoiseRates {
    fn default() -> Self {
        Self {
            missing_percent: 0.05,
            footnote: 0.02,
            overseas_sample: 0.04,
            duplicate: 0.03,
            multi_response: 0.03,
            omitted: 0.01,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SampleConfig {
    pub seed: u64,
    pub candidates: Vec<String>,
    pub start: NaiveDate,
    pub days: usize,
    pub pollsters: Vec<SyntheticPollster>,
    pub noise: NoiseRates,
}

impl Default for SampleConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            candidates: DEFAULT_CANDIDATES.iter().map(|c| c.to_string()).collect(),
            start: NaiveDate::from_ymd_opt(2023, 6, 1).unwrap_or(NaiveDate::MIN),
            days: 150,
            pollsters: vec![
                SyntheticPollster::new("Bardi University", 683, 4, 0.01),
                SyntheticPollster::new("Brooke Research", 1204, 3, 0.008),
                SyntheticPollster::new("Garth Polling", 950, 7, 0.012),
                SyntheticPollster::new("Tyke Analytics", 520, 5, 0.015),
            ],
            noise: NoiseRates::default(),
        }
    }
}

/// One generated publication, before formatting.
#[derive(Debug, Clone)]
struct Publication {
    date: NaiveDate,
    /// Hours after midnight of `date`.
    published_hour: u32,
    pollster: usize,
    sample: u32,
    shares: Vec<f64>,
}

pub fn generate_polling_csv(config: &SampleConfig) -> Result<String, AppError> {
    if config.candidates.len() < 2 {
        return Err(AppError::Config("synthetic data needs at least two candidates".to_string()));
    }
    if config.days == 0 || config.pollsters.is_empty() {
        return Err(AppError::Config(
            "synthetic data needs at least one day and one pollster".to_string(),
        ));
    }
    if config.pollsters.iter().any(|p| p.cadence == 0 || p.sample == 0) {
        return Err(AppError::Config(
            "synthetic pollsters need a positive cadence and sample size".to_string(),
        ));
    }

    let mut rng = StdRng::seed_from_u64(sample_seed(config));
    let unit = Normal::new(0.0, 1.0).map_err(|e| AppError::Config(format!("noise distribution error: {e}")))?;

    let support = latent_support(&mut rng, &unit, config.candidates.len(), config.days);
    let house: Vec<Vec<f64>> = config
        .pollsters
        .iter()
        .map(|p| {
            (0..config.candidates.len())
                .map(|_| unit.sample(&mut rng) * p.house_std)
                .collect()
        })
        .collect();

    let mut publications = Vec::new();
    for (pi, pollster) in config.pollsters.iter().enumerate() {
        let mut day = rng.gen_range(0..pollster.cadence as usize);
        while day < config.days {
            let Some(date) = config.start.checked_add_days(Days::new(day as u64)) else {
                break;
            };
            let scale: f64 = rng.gen_range(0.8..1.2);
            let sample = ((pollster.sample as f64 * scale).round() as u32).max(50);
            let shares = observe(&mut rng, &unit, &support[day], &house[pi], sample);
            publications.push(Publication {
                date,
                published_hour: rng.gen_range(6..20),
                pollster: pi,
                sample,
                shares,
            });
            // Jitter the cadence by a day either way.
            let step = pollster.cadence as i64 + rng.gen_range(-1..=1);
            day += step.max(1) as usize;
        }
    }
    publications.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.pollster.cmp(&b.pollster)));

    let mut writer = csv::Writer::from_writer(Vec::new());
    let mut header = vec![
        COL_DATE.to_string(),
        COL_POLLSTER.to_string(),
        COL_SAMPLE.to_string(),
        COL_TIMESTAMP.to_string(),
    ];
    header.extend(config.candidates.iter().cloned());
    writer.write_record(&header)?;

    let no_house = vec![0.0; config.candidates.len()];
    for publication in &publications {
        let row = format_row(&mut rng, config, publication, 0);
        writer.write_record(&row)?;

        if rng.r#gen::<f64>() < config.noise.duplicate {
            // A correction published a day later for the same poll date.
            let mut corrected = publication.clone();
            corrected.shares = observe(&mut rng, &unit, &publication.shares, &no_house, corrected.sample * 4);
            let row = format_row(&mut rng, config, &corrected, 24);
            writer.write_record(&row)?;
        }
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| AppError::Config(format!("failed to finish synthetic CSV: {e}")))?;
    String::from_utf8(bytes).map_err(|e| AppError::Config(format!("synthetic CSV is not UTF-8: {e}")))
}

fn latent_support(rng: &mut StdRng, unit: &Normal<f64>, candidates: usize, days: usize) -> Vec<Vec<f64>> {
    // Leading candidates get more initial weight; the last column ("Others")
    // stays small.
    let mut weights: Vec<f64> = (0..candidates)
        .map(|i| {
            let base = 1.0 / (i as f64 + 1.5);
            base * rng.gen_range(0.7..1.3)
        })
        .collect();

    let mut path = Vec::with_capacity(days);
    for _ in 0..days {
        for w in weights.iter_mut() {
            *w = (*w + unit.sample(rng) * DRIFT_STD).max(0.01);
        }
        path.push(normalise(&weights));
    }
    path
}

/// Noisy poll reading of `truth` with house effect and sampling error.
fn observe(rng: &mut StdRng, unit: &Normal<f64>, truth: &[f64], house: &[f64], sample: u32) -> Vec<f64> {
    let n = sample.max(1) as f64;
    let raw: Vec<f64> = truth
        .iter()
        .zip(house)
        .map(|(&p, &h)| {
            let se = (p * (1.0 - p) / n).sqrt();
            (p + h + unit.sample(rng) * se).max(0.001)
        })
        .collect();
    normalise(&raw)
}

fn normalise(values: &[f64]) -> Vec<f64> {
    let sum: f64 = values.iter().sum();
    if sum <= 0.0 {
        return vec![1.0 / values.len() as f64; values.len()];
    }
    values.iter().map(|v| v / sum).collect()
}

fn format_row(rng: &mut StdRng, config: &SampleConfig, publication: &Publication, delay_hours: u32) -> Vec<String> {
    let noise = &config.noise;
    let pollster = &config.pollsters[publication.pollster];

    let mut sample = thousands(publication.sample);
    if rng.r#gen::<f64>() < noise.overseas_sample {
        sample.push('*');
    }

    let hour = publication.published_hour + delay_hours;
    let timestamp = publication
        .date
        .checked_add_days(Days::new(u64::from(hour / 24)))
        .unwrap_or(publication.date)
        .and_hms_opt(hour % 24, 0, 0)
        .map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default();

    let mut row = vec![
        publication.date.format("%m/%d/%y").to_string(),
        pollster.name.clone(),
        sample,
        timestamp,
    ];

    let multi_at = (rng.r#gen::<f64>() < noise.multi_response).then(|| rng.gen_range(0..publication.shares.len()));
    let last = publication.shares.len() - 1;

    for (ci, &share) in publication.shares.iter().enumerate() {
        if ci == last && rng.r#gen::<f64>() < noise.omitted {
            row.push(String::new());
            continue;
        }

        let mut cell = if multi_at == Some(ci) {
            // Headline answer and an alternate-scenario answer in one cell.
            let alt = (share + rng.gen_range(-0.03..0.03)).clamp(0.001, 0.999);
            format!("{} / {}", percent(share), percent(alt))
        } else if rng.r#gen::<f64>() < noise.missing_percent {
            format!("{:.0}", share * 100.0)
        } else {
            percent(share)
        };
        if rng.r#gen::<f64>() < noise.footnote {
            cell.push('*');
        }
        row.push(cell);
    }
    row
}

fn percent(share: f64) -> String {
    format!("{:.0}%", share * 100.0)
}

fn thousands(n: u32) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn sample_seed(config: &SampleConfig) -> u64 {
    let mut hasher = DefaultHasher::new();
    config.seed.hash(&mut hasher);
    config.candidates.hash(&mut hasher);
    config.start.hash(&mut hasher);
    config.days.hash(&mut hasher);
    for p in &config.pollsters {
        p.name.hash(&mut hasher);
        p.sample.hash(&mut hasher);
        p.cadence.hash(&mut hasher);
    }
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engineering::clean_data;
    use crate::io::ingest::parse_polling_csv;
    use crate::report::CollectingReporter;

    #[test]
    fn same_seed_same_output() {
        let config = SampleConfig::default();
        let a = generate_polling_csv(&config).unwrap();
        let b = generate_polling_csv(&config).unwrap();
        assert_eq!(a, b);

        let other = SampleConfig {
            seed: 43,
            ..SampleConfig::default()
        };
        assert_ne!(a, generate_polling_csv(&other).unwrap());
    }

    #[test]
    fn generated_table_is_ingestible_and_messy() {
        let config = SampleConfig::default();
        let csv = generate_polling_csv(&config).unwrap();
        let raw = parse_polling_csv(csv.as_bytes(), &config.candidates).unwrap();
        assert!(raw.row_errors.is_empty());
        assert!(raw.rows.len() > 50);

        let mut reporter = CollectingReporter::new();
        let (table, report) = clean_data(&raw, 0.05, &mut reporter).unwrap();
        assert_eq!(table.len(), raw.rows.len());
        assert!(report.columns.iter().any(|c| c.repaired > 0));
        assert_eq!(table.pollsters().len(), config.pollsters.len());
    }

    #[test]
    fn noise_free_rows_sum_to_about_one() {
        let config = SampleConfig {
            noise: NoiseRates {
                missing_percent: 0.0,
                footnote: 0.0,
                overseas_sample: 0.0,
                duplicate: 0.0,
                multi_response: 0.0,
                omitted: 0.0,
            },
            ..SampleConfig::default()
        };
        let csv = generate_polling_csv(&config).unwrap();
        let raw = parse_polling_csv(csv.as_bytes(), &config.candidates).unwrap();
        let mut reporter = CollectingReporter::new();
        let (table, _) = clean_data(&raw, 0.05, &mut reporter).unwrap();
        for r in &table.records {
            let sum = r.complete_share_sum().unwrap();
            assert!((sum - 1.0).abs() < 0.05, "row {} sums to {sum}", r.line);
        }
    }

    #[test]
    fn thousands_separators() {
        assert_eq!(thousands(683), "683");
        assert_eq!(thousands(1204), "1,204");
        assert_eq!(thousands(1234567), "1,234,567");
    }

    #[test]
    fn rejects_degenerate_configs() {
        let config = SampleConfig {
            candidates: vec!["Solo".to_string()],
            ..SampleConfig::default()
        };
        assert!(generate_polling_csv(&config).is_err());
    }
}
