//! Error taxonomy for the pipeline.
//!
//! Only fatal problems are errors. Malformed cells, duplicates and sparse
//! pollsters are recovered in place and surfaced as diagnostics instead
//! (see `report`).
//!
//! Exit codes:
//! - `2`: configuration, schema or input file problems
//! - `3`: a stage produced no usable data
//! - `4`: external collaborators (network, serialization, chart rendering)

use std::path::PathBuf;

use crate::report::Stage;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Missing required column: `{0}`")]
    MissingColumn(String),

    #[error("Failed to access '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to fetch polling data: {0}")]
    Fetch(String),

    #[error("{stage} stage produced no usable data: {message}")]
    NoData { stage: Stage, message: String },

    #[error("{stage} stage failed: {message}")]
    Stage { stage: Stage, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Chart rendering failed: {0}")]
    Plot(String),
}

impl AppError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AppError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn no_data(stage: Stage, message: impl Into<String>) -> Self {
        AppError::NoData {
            stage,
            message: message.into(),
        }
    }

    pub fn stage(stage: Stage, message: impl Into<String>) -> Self {
        AppError::Stage {
            stage,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::Config(_) | AppError::MissingColumn(_) | AppError::Io { .. } | AppError::Csv(_) => 2,
            AppError::NoData { .. } | AppError::Stage { .. } => 3,
            AppError::Fetch(_) | AppError::Json(_) | AppError::Plot(_) => 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_errors_exit_with_input_code() {
        let err = AppError::MissingColumn("Pollster".to_string());
        assert_eq!(err.exit_code(), 2);
        assert_eq!(err.to_string(), "Missing required column: `Pollster`");
    }

    #[test]
    fn stage_errors_name_the_stage() {
        let err = AppError::no_data(Stage::Clean, "every row was dropped");
        assert_eq!(err.exit_code(), 3);
        assert_eq!(err.to_string(), "clean stage produced no usable data: every row was dropped");
    }
}
