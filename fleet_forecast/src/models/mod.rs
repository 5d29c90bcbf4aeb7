//! Forecasting models for fleet utilization series

use crate::config::PipelineConfig;
use crate::data::{series_timestamps, Dataset, TIMESTAMP_COLUMN};
use crate::error::{ForecastError, Result};
use crate::utils::to_epoch_millis;
use chrono::NaiveDateTime;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};
use std::path::Path;
use std::str::FromStr;

pub mod arima;
pub mod seasonal;

pub use arima::ArimaModel;
pub use seasonal::{SeasonalComponents, SeasonalModel};

/// Forecast for a single timestamp
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub ds: NaiveDateTime,
    /// Point estimate
    pub yhat: f64,
    pub yhat_lower: f64,
    pub yhat_upper: f64,
}

/// Forecast rows, one per requested timestamp, in request order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForecastFrame {
    points: Vec<ForecastPoint>,
}

impl ForecastFrame {
    /// Create an empty forecast frame
    pub fn new() -> Self {
        Self::default()
    }

    /// Assemble a frame from point estimates and optional interval bounds.
    ///
    /// Missing bounds collapse onto the point estimate. Bounds are ordered so that
    /// `yhat_lower <= yhat <= yhat_upper` holds on every row.
    pub fn from_parts(
        timestamps: &[NaiveDateTime],
        values: Vec<f64>,
        bounds: Option<(Vec<f64>, Vec<f64>)>,
    ) -> Result<Self> {
        if values.len() != timestamps.len() {
            return Err(ForecastError::ValidationError(format!(
                "Values length ({}) doesn't match timestamps ({})",
                values.len(),
                timestamps.len()
            )));
        }

        let (lower, upper) = bounds.unwrap_or_else(|| (values.clone(), values.clone()));
        if lower.len() != values.len() || upper.len() != values.len() {
            return Err(ForecastError::ValidationError(format!(
                "Values length ({}) doesn't match intervals length ({}, {})",
                values.len(),
                lower.len(),
                upper.len()
            )));
        }

        let points = timestamps
            .iter()
            .zip(values)
            .zip(lower.into_iter().zip(upper))
            .map(|((&ds, yhat), (lo, hi))| ForecastPoint {
                ds,
                yhat,
                yhat_lower: lo.min(hi).min(yhat),
                yhat_upper: hi.max(lo).max(yhat),
            })
            .collect();

        Ok(Self { points })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[ForecastPoint] {
        &self.points
    }

    pub fn iter(&self) -> impl Iterator<Item = &ForecastPoint> {
        self.points.iter()
    }

    pub fn timestamps(&self) -> Vec<NaiveDateTime> {
        self.points.iter().map(|p| p.ds).collect()
    }

    /// Point estimates in row order
    pub fn yhat(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.yhat).collect()
    }

    pub fn lower(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.yhat_lower).collect()
    }

    pub fn upper(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.yhat_upper).collect()
    }

    /// Check that every point estimate is a finite number
    pub fn validate(&self) -> Result<()> {
        match self.points.iter().find(|p| !p.yhat.is_finite()) {
            Some(point) => Err(ForecastError::ForecastingError(format!(
                "Non-finite point estimate at {}",
                point.ds
            ))),
            None => Ok(()),
        }
    }

    /// Export as a polars frame with columns `ds, yhat, yhat_lower, yhat_upper`
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let millis: Vec<i64> = self.points.iter().map(|p| to_epoch_millis(&p.ds)).collect();
        let ds = Series::new(TIMESTAMP_COLUMN, millis)
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?;

        Ok(DataFrame::new(vec![
            ds,
            Series::new("yhat", self.yhat()),
            Series::new("yhat_lower", self.lower()),
            Series::new("yhat_upper", self.upper()),
        ])?)
    }
}

/// Common interface for forecasting models.
///
/// Models move from unfit to fit through [`ForecastModel::fit`]; calling `predict`
/// earlier fails with [`ForecastError::NotFitted`].
pub trait ForecastModel: Debug + Send + Sync {
    /// Registry name of the model
    fn name(&self) -> &str;

    /// Train the model on a cleaned history
    fn fit(&mut self, history: &Dataset) -> Result<()>;

    /// Forecast the target for each timestamp, in the given order.
    ///
    /// An empty index yields an empty frame.
    fn predict(&self, future: &[NaiveDateTime]) -> Result<ForecastFrame>;

    /// Whether `fit` has completed successfully
    fn is_fitted(&self) -> bool;
}

/// Registered model variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    /// Additive trend + yearly/weekly seasonality
    Seasonal,
    /// Autoregressive integrated moving average
    Arima,
}

impl ModelKind {
    /// All registered kinds, in default fallback order
    pub const ALL: [ModelKind; 2] = [ModelKind::Seasonal, ModelKind::Arima];

    /// Alternative names resolving to a registered kind
    pub const ALIASES: [(&'static str, ModelKind); 1] = [("prophet", ModelKind::Seasonal)];

    pub fn name(&self) -> &'static str {
        match self {
            ModelKind::Seasonal => "seasonal",
            ModelKind::Arima => "arima",
        }
    }

    /// Create an unfit model of this kind
    pub fn build(&self, config: &PipelineConfig) -> Model {
        match self {
            ModelKind::Seasonal => Model::Seasonal(SeasonalModel::new(config.seasonal.clone())),
            ModelKind::Arima => Model::Arima(ArimaModel::new(config.arima.clone())),
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelKind {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_lowercase();
        ModelKind::ALL
            .iter()
            .map(|kind| (kind.name(), *kind))
            .chain(ModelKind::ALIASES)
            .find(|(name, _)| *name == wanted)
            .map(|(_, kind)| kind)
            .ok_or_else(|| ForecastError::UnknownModel {
                name: s.to_string(),
                available: available_models().iter().map(|m| m.to_string()).collect(),
            })
    }
}

/// Registered model names, in default fallback order
pub fn available_models() -> Vec<&'static str> {
    ModelKind::ALL.iter().map(|kind| kind.name()).collect()
}

/// Every name [`create_model`] accepts, aliases included
pub fn accepted_model_names() -> Vec<&'static str> {
    available_models()
        .into_iter()
        .chain(ModelKind::ALIASES.iter().map(|(alias, _)| *alias))
        .collect()
}

/// Create an unfit model by registry name
pub fn create_model(name: &str, config: &PipelineConfig) -> Result<Model> {
    Ok(name.parse::<ModelKind>()?.build(config))
}

/// A forecasting model of any registered kind.
///
/// This is also the unit of persistence: a fitted `Model` serializes to an opaque
/// JSON blob and restores into the same capability set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Model {
    Seasonal(SeasonalModel),
    Arima(ArimaModel),
}

impl Model {
    pub fn kind(&self) -> ModelKind {
        match self {
            Model::Seasonal(_) => ModelKind::Seasonal,
            Model::Arima(_) => ModelKind::Arima,
        }
    }

    pub fn as_seasonal(&self) -> Option<&SeasonalModel> {
        match self {
            Model::Seasonal(model) => Some(model),
            Model::Arima(_) => None,
        }
    }

    pub fn as_arima(&self) -> Option<&ArimaModel> {
        match self {
            Model::Arima(model) => Some(model),
            Model::Seasonal(_) => None,
        }
    }

    /// Serialize the model (fitted or not) into a blob
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Restore a model from a blob produced by [`Model::to_bytes`]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| ForecastError::InvalidModelArtifact(e.to_string()))
    }

    /// Write the model blob to durable storage
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_bytes()?)?;
        Ok(())
    }

    /// Read a model blob back from durable storage
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }
}

impl ForecastModel for Model {
    fn name(&self) -> &str {
        match self {
            Model::Seasonal(model) => model.name(),
            Model::Arima(model) => model.name(),
        }
    }

    fn fit(&mut self, history: &Dataset) -> Result<()> {
        match self {
            Model::Seasonal(model) => model.fit(history),
            Model::Arima(model) => model.fit(history),
        }
    }

    fn predict(&self, future: &[NaiveDateTime]) -> Result<ForecastFrame> {
        match self {
            Model::Seasonal(model) => model.predict(future),
            Model::Arima(model) => model.predict(future),
        }
    }

    fn is_fitted(&self) -> bool {
        match self {
            Model::Seasonal(model) => model.is_fitted(),
            Model::Arima(model) => model.is_fitted(),
        }
    }
}

/// Extract the timestamp index of a polars frame.
///
/// Uses the `ds` column when present, otherwise the first column stands in for the
/// index. Timezone-aware values become naive UTC; unparseable entries are dropped.
pub fn timestamps_from_frame(df: &DataFrame) -> Result<Vec<NaiveDateTime>> {
    let columns = df.get_columns();
    let series = columns
        .iter()
        .find(|s| s.name().trim().eq_ignore_ascii_case(TIMESTAMP_COLUMN))
        .or_else(|| columns.first())
        .ok_or_else(|| ForecastError::ValidationError("Frame has no columns".to_string()))?;

    Ok(series_timestamps(series)?.into_iter().flatten().collect())
}

/// Predict for the timestamps carried by a polars frame
pub fn predict_frame(model: &dyn ForecastModel, df: &DataFrame) -> Result<ForecastFrame> {
    let timestamps = timestamps_from_frame(df)?;
    model.predict(&timestamps)
}
