//! Data sources.
//!
//! - `source`: classify and load the configured source (URL with raw-file
//!   cache, local file, synthetic)
//! - `html`: first table of an HTML page as CSV text
//! - `sample`: seeded synthetic polling tables

pub mod html;
pub mod sample;
pub mod source;

pub use sample::{NoiseRates, SampleConfig, SyntheticPollster, generate_polling_csv};
pub use source::{LoadedSource, PollClient, cache_file_name, load_source_text, validate_url};
