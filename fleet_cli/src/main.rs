//! # fleet-forecast
//!
//! Command-line interface for training fleet utilization forecasts.

use anyhow::{Context, Result};
use clap::builder::PossibleValuesParser;
use clap::Parser;
use fleet_forecast::export::{date_format, write_interval_csv, write_point_csv};
use fleet_forecast::{
    accepted_model_names, forecast_future, run_training_pipeline, ForecastFrame, ForecastModel,
    PipelineConfig, TrainingRequest,
};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Rows of the future forecast printed to the terminal
const PREVIEW_ROWS: usize = 5;

#[derive(Parser, Debug)]
#[command(name = "fleet-forecast")]
#[command(about = "Train and extrapolate fleet utilization forecasts", long_about = None)]
struct Cli {
    /// Model to train first (defaults to the configured model)
    #[arg(short, long, value_parser = PossibleValuesParser::new(accepted_model_names()))]
    model: Option<String>,

    /// Delimited dataset file (defaults to the packaged sample)
    #[arg(short, long)]
    dataset: Option<PathBuf>,

    /// Trailing days held out for the backtest
    #[arg(long)]
    test_days: Option<usize>,

    /// Days to forecast past the end of the dataset
    #[arg(long)]
    future_periods: Option<usize>,

    /// Write the future forecast to this CSV file
    #[arg(short, long)]
    export: Option<PathBuf>,

    /// Export interval bounds as well as the point forecast
    #[arg(long)]
    with_intervals: bool,

    /// JSON pipeline configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Persist the model refit on the full dataset
    #[arg(long)]
    save_model: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    run(Cli::parse())
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    let model_name = cli.model.unwrap_or_else(|| config.default_model.clone());
    let test_days = cli.test_days.unwrap_or(config.test_days);
    let periods = cli.future_periods.unwrap_or(config.horizon);

    let mut request = TrainingRequest::new(model_name)
        .with_config(config.clone())
        .with_test_days(test_days);
    if let Some(path) = &cli.dataset {
        request = request.with_path(path);
    }
    request.candidates()?;

    let dataset = request.load().context("Failed to load dataset")?;
    let request = request.with_dataset(dataset.clone());
    let result = run_training_pipeline(&request)?;

    for (name, message) in &result.attempts {
        println!("Model {} failed: {}", name, message);
    }
    println!("Model: {}", result.model_name);
    println!("{}", result.metrics);

    // Extrapolate from the whole history, not just the training window
    let mut model = result.model.kind().build(&config);
    model.fit(&dataset)?;
    let future = forecast_future(&model, &dataset, periods)?;

    print_preview(&future);

    if let Some(path) = &cli.export {
        if cli.with_intervals {
            write_interval_csv(&future, path)?;
        } else {
            write_point_csv(&future, path)?;
        }
        info!(path = %path.display(), rows = future.len(), "Exported forecast");
    }

    if let Some(path) = &cli.save_model {
        model
            .save(path)
            .with_context(|| format!("Failed to save model to {}", path.display()))?;
        info!(path = %path.display(), "Saved model");
    }

    Ok(())
}

fn print_preview(frame: &ForecastFrame) {
    println!(
        "{:<20} {:>10} {:>10} {:>10}",
        "date", "yhat", "lower", "upper"
    );
    let format = date_format(frame);
    for point in frame.iter().take(PREVIEW_ROWS) {
        println!(
            "{:<20} {:>10.4} {:>10.4} {:>10.4}",
            point.ds.format(format).to_string(),
            point.yhat,
            point.yhat_lower,
            point.yhat_upper
        );
    }
}
