//! Training pipeline: load, split, fit with fallback, backtest, extrapolate

use crate::config::PipelineConfig;
use crate::data::{load_dataset, train_test_split, Dataset, DatasetSource};
use crate::error::{ForecastError, Result};
use crate::metrics::{evaluate, Metrics};
use crate::models::{ForecastFrame, ForecastModel, Model, ModelKind};
use crate::utils::{future_timestamps, infer_frequency, median_gap};
use chrono::Duration;
use std::path::PathBuf;
use tracing::{info, warn};

/// Inputs of one training run.
///
/// The dataset is resolved in priority order: an explicit in-memory dataset, then a
/// path, then the packaged sample. Unset options fall back to the configuration.
#[derive(Debug, Clone, Default)]
pub struct TrainingRequest {
    model_name: Option<String>,
    dataset: Option<Dataset>,
    path: Option<PathBuf>,
    test_days: Option<usize>,
    fallback_order: Option<Vec<String>>,
    config: PipelineConfig,
}

impl TrainingRequest {
    /// Request training of the named model
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: Some(model_name.into()),
            ..Self::default()
        }
    }

    pub fn with_dataset(mut self, dataset: Dataset) -> Self {
        self.dataset = Some(dataset);
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Number of trailing rows held out for the backtest
    pub fn with_test_days(mut self, test_days: usize) -> Self {
        self.test_days = Some(test_days);
        self
    }

    pub fn with_fallback_order<I, S>(mut self, order: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fallback_order = Some(order.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn model_name(&self) -> &str {
        self.model_name
            .as_deref()
            .unwrap_or(&self.config.default_model)
    }

    pub fn test_days(&self) -> usize {
        self.test_days.unwrap_or(self.config.test_days)
    }

    pub fn fallback_order(&self) -> &[String] {
        self.fallback_order
            .as_deref()
            .unwrap_or(&self.config.fallback_order)
    }

    /// Distinct model kinds to try: the requested model first, then the fallbacks.
    ///
    /// Every name is checked against the registry, so an unknown name fails here
    /// before any data is read.
    pub fn candidates(&self) -> Result<Vec<ModelKind>> {
        let mut kinds: Vec<ModelKind> = Vec::new();
        let names = std::iter::once(self.model_name())
            .chain(self.fallback_order().iter().map(String::as_str));
        for name in names {
            let kind = name.parse::<ModelKind>()?;
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        Ok(kinds)
    }

    /// Resolve the dataset this request trains on
    pub fn load(&self) -> Result<Dataset> {
        if let Some(dataset) = &self.dataset {
            return Ok(dataset.clone());
        }
        match &self.path {
            Some(path) => load_dataset(path.clone()),
            None => load_dataset(DatasetSource::Sample),
        }
    }
}

/// Outcome of a successful training run
#[derive(Debug, Clone)]
pub struct PipelineResult {
    /// Registry name of the model that succeeded
    pub model_name: String,
    pub metrics: Metrics,
    /// Backtest forecast over the test window
    pub forecast: ForecastFrame,
    /// The fitted model, trained on `train`
    pub model: Model,
    pub train: Dataset,
    pub test: Dataset,
    /// Candidates that failed before this one, with their error messages
    pub attempts: Vec<(String, String)>,
}

impl PipelineResult {
    /// Extrapolate the fitted model beyond the end of `history`
    pub fn forecast_future(&self, history: &Dataset, periods: usize) -> Result<ForecastFrame> {
        forecast_future(&self.model, history, periods)
    }
}

/// Train a model with backtest evaluation, falling back through the configured
/// candidates until one succeeds.
pub fn run_training_pipeline(request: &TrainingRequest) -> Result<PipelineResult> {
    let candidates = request.candidates()?;
    let dataset = request.load()?;
    run_on_dataset(request, &candidates, dataset)
}

pub(crate) fn run_on_dataset(
    request: &TrainingRequest,
    candidates: &[ModelKind],
    dataset: Dataset,
) -> Result<PipelineResult> {
    let (train, test) = train_test_split(&dataset, request.test_days())?;

    info!(
        rows = dataset.len(),
        train = train.len(),
        test = test.len(),
        candidates = ?candidates.iter().map(ModelKind::name).collect::<Vec<_>>(),
        "Starting training pipeline"
    );

    let mut attempts = Vec::new();
    for kind in candidates {
        match backtest(*kind, request.config(), &train, &test) {
            Ok((model, forecast, metrics)) => {
                info!(
                    model = kind.name(),
                    rmse = metrics.rmse,
                    mae = metrics.mae,
                    mape = metrics.mape,
                    "Model trained"
                );
                return Ok(PipelineResult {
                    model_name: kind.name().to_string(),
                    metrics,
                    forecast,
                    model,
                    train,
                    test,
                    attempts,
                });
            }
            Err(e) => {
                warn!(model = kind.name(), error = %e, "Model failed, trying next candidate");
                attempts.push((kind.name().to_string(), e.to_string()));
            }
        }
    }

    Err(ForecastError::AllModelsFailed(attempts))
}

/// Fit on `train`, predict the `test` timestamps and score the forecast
fn backtest(
    kind: ModelKind,
    config: &PipelineConfig,
    train: &Dataset,
    test: &Dataset,
) -> Result<(Model, ForecastFrame, Metrics)> {
    let mut model = kind.build(config);
    model.fit(train)?;

    let forecast = model.predict(test.timestamps())?;
    if forecast.len() != test.len() {
        return Err(ForecastError::ValidationError(format!(
            "Forecast has {} rows for a test window of {}",
            forecast.len(),
            test.len()
        )));
    }
    forecast.validate()?;

    let metrics = evaluate(test.target(), &forecast.yhat())?;
    Ok((model, forecast, metrics))
}

/// Forecast `periods` steps past the end of `history`.
///
/// The step is the dataset's recorded frequency, else a frequency inferred from the
/// timestamps, else the median gap, else one day.
pub fn forecast_future<M>(model: &M, history: &Dataset, periods: usize) -> Result<ForecastFrame>
where
    M: ForecastModel + ?Sized,
{
    if periods == 0 {
        return Err(ForecastError::InvalidHorizon(periods));
    }
    let last = history.last_timestamp().ok_or(ForecastError::EmptyHistory)?;

    let timestamps = history.timestamps();
    let step = history
        .frequency()
        .or_else(|| infer_frequency(timestamps))
        .or_else(|| median_gap(timestamps))
        .filter(|step| *step > Duration::zero())
        .unwrap_or_else(|| Duration::days(1));

    let future = future_timestamps(last, periods, step)?;
    model.predict(&future)
}
