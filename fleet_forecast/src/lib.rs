//! # Fleet Forecast
//!
//! Forecasting of daily fleet vehicle-utilization rates.
//!
//! ## Features
//!
//! - Permissive loading of delimited fleet statistics with row-level cleaning
//! - Chronological train/test splitting
//! - Two forecasting models behind one trait: an additive trend + seasonality
//!   decomposition and ARIMA
//! - Backtest evaluation with RMSE, MAE and MAPE
//! - A training pipeline with an ordered fallback chain across models
//! - Extrapolation past the end of the history, CSV export and model persistence
//!
//! ## Quick Start
//!
//! ```no_run
//! use fleet_forecast::{load_dataset, run_training_pipeline, TrainingRequest};
//!
//! # fn main() -> fleet_forecast::error::Result<()> {
//! let dataset = load_dataset(std::path::PathBuf::from("fleet.csv"))?;
//!
//! let request = TrainingRequest::new("seasonal")
//!     .with_dataset(dataset.clone())
//!     .with_test_days(30);
//! let result = run_training_pipeline(&request)?;
//! println!("{} {}", result.model_name, result.metrics);
//!
//! let future = result.forecast_future(&dataset, 30)?;
//! fleet_forecast::export::write_point_csv(&future, "forecast.csv")?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod data;
pub mod error;
pub mod export;
pub mod metrics;
pub mod models;
pub mod numeric;
pub mod pipeline;
pub mod utils;

// Re-export commonly used types
pub use crate::cache::TrainingCache;
pub use crate::config::PipelineConfig;
pub use crate::data::{load_dataset, train_test_split, DataLoader, Dataset, DatasetSource};
pub use crate::error::ForecastError;
pub use crate::metrics::{evaluate, Metrics};
pub use crate::models::{
    accepted_model_names, available_models, create_model, ForecastFrame, ForecastModel, Model,
    ModelKind,
};
pub use crate::pipeline::{forecast_future, run_training_pipeline, PipelineResult, TrainingRequest};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
