//! Error types for the fleet_forecast crate

use polars::prelude::PolarsError;
use thiserror::Error;

/// Custom error types for the fleet_forecast crate
#[derive(Debug, Error)]
pub enum ForecastError {
    /// A required date or target column could not be resolved
    #[error("Missing column: no {kind} column found among {found:?} (expected one of {candidates:?})")]
    MissingColumn {
        kind: &'static str,
        candidates: Vec<String>,
        found: Vec<String>,
    },

    /// The source had no rows, or none survived cleaning
    #[error("Empty dataset: {0}")]
    EmptyDataset(String),

    /// The requested test window cannot be carved out of the dataset
    #[error("Invalid split: test size {test_size} must be positive and smaller than dataset length {len}")]
    InvalidSplit { test_size: usize, len: usize },

    /// Not enough observations to fit a model
    #[error("Insufficient data for {model}: need at least {needed} observations, got {got}")]
    InsufficientData {
        model: String,
        needed: usize,
        got: usize,
    },

    /// `predict` was called before `fit`
    #[error("Model {0} must be fitted before calling predict")]
    NotFitted(String),

    /// Actual and predicted series differ in length
    #[error("Length mismatch: {actual} actual values vs {predicted} predicted values")]
    LengthMismatch { actual: usize, predicted: usize },

    /// The model name is not in the registry
    #[error("Unknown model '{name}'. Options: {available:?}")]
    UnknownModel {
        name: String,
        available: Vec<String>,
    },

    /// Every candidate in the fallback chain failed
    #[error("All models failed: {}", format_attempts(.0))]
    AllModelsFailed(Vec<(String, String)>),

    /// The forecast horizon must be positive
    #[error("Invalid horizon: periods must be positive, got {0}")]
    InvalidHorizon(usize),

    /// Future forecasting needs at least one history row
    #[error("Empty history: cannot extend an empty time series")]
    EmptyHistory,

    /// A persisted blob did not decode into a forecast model
    #[error("Invalid model artifact: {0}")]
    InvalidModelArtifact(String),

    /// Error related to parameter validation
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Error related to forecasting operations
    #[error("Forecasting error: {0}")]
    ForecastingError(String),

    /// Error from configuration loading
    #[error("Config error: {0}")]
    ConfigError(String),

    /// Error from IO operations
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error from CSV parsing or writing
    #[error("CSV error: {0}")]
    CsvError(String),

    /// Error from Polars operations
    #[error("Polars error: {0}")]
    PolarsError(String),

    /// Error from model (de)serialization
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Result type with our custom error
pub type Result<T> = std::result::Result<T, ForecastError>;

fn format_attempts(attempts: &[(String, String)]) -> String {
    attempts
        .iter()
        .map(|(name, message)| format!("{}: {}", name, message))
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<PolarsError> for ForecastError {
    fn from(err: PolarsError) -> Self {
        ForecastError::PolarsError(err.to_string())
    }
}

impl From<csv::Error> for ForecastError {
    fn from(err: csv::Error) -> Self {
        ForecastError::CsvError(err.to_string())
    }
}

impl From<serde_json::Error> for ForecastError {
    fn from(err: serde_json::Error) -> Self {
        ForecastError::SerializationError(err.to_string())
    }
}
