//! Pipeline configuration

use crate::error::{ForecastError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration for training and forecasting runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Model tried first when the caller does not name one
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Trailing rows held out for the backtest
    #[serde(default = "default_test_days")]
    pub test_days: usize,

    /// Periods forecast beyond the history
    #[serde(default = "default_horizon")]
    pub horizon: usize,

    /// Candidates tried, in order, after the requested model fails
    #[serde(default = "default_fallback_order")]
    pub fallback_order: Vec<String>,

    #[serde(default)]
    pub seasonal: SeasonalConfig,

    #[serde(default)]
    pub arima: ArimaConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            test_days: default_test_days(),
            horizon: default_horizon(),
            fallback_order: default_fallback_order(),
            seasonal: SeasonalConfig::default(),
            arima: ArimaConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Parse and validate a JSON configuration document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ForecastError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Check value ranges that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.test_days == 0 {
            return Err(ForecastError::ConfigError(
                "test_days must be positive".to_string(),
            ));
        }
        if self.horizon == 0 {
            return Err(ForecastError::ConfigError(
                "horizon must be positive".to_string(),
            ));
        }
        self.seasonal.validate()?;
        self.arima.validate()
    }
}

/// Settings of the additive trend + seasonality model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeasonalConfig {
    #[serde(default = "default_true")]
    pub yearly_seasonality: bool,
    #[serde(default = "default_true")]
    pub weekly_seasonality: bool,
    /// Fourier order of the yearly component
    #[serde(default = "default_yearly_order")]
    pub yearly_order: usize,
    /// Fourier order of the weekly component
    #[serde(default = "default_weekly_order")]
    pub weekly_order: usize,
    /// Potential trend changepoints placed over the early history
    #[serde(default = "default_n_changepoints")]
    pub n_changepoints: usize,
    /// Share of the history in which changepoints may be placed
    #[serde(default = "default_changepoint_range")]
    pub changepoint_range: f64,
    /// Prior scale of the trend rate changes; smaller is stiffer
    #[serde(default = "default_changepoint_prior_scale")]
    pub changepoint_prior_scale: f64,
    /// Prior scale of the Fourier coefficients
    #[serde(default = "default_seasonality_prior_scale")]
    pub seasonality_prior_scale: f64,
    #[serde(default = "default_interval_width")]
    pub interval_width: f64,
}

impl Default for SeasonalConfig {
    fn default() -> Self {
        Self {
            yearly_seasonality: true,
            weekly_seasonality: true,
            yearly_order: default_yearly_order(),
            weekly_order: default_weekly_order(),
            n_changepoints: default_n_changepoints(),
            changepoint_range: default_changepoint_range(),
            changepoint_prior_scale: default_changepoint_prior_scale(),
            seasonality_prior_scale: default_seasonality_prior_scale(),
            interval_width: default_interval_width(),
        }
    }
}

impl SeasonalConfig {
    pub fn validate(&self) -> Result<()> {
        validate_width(self.interval_width)?;
        if !(self.changepoint_range > 0.0 && self.changepoint_range <= 1.0) {
            return Err(ForecastError::ConfigError(format!(
                "changepoint_range must be in (0, 1], got {}",
                self.changepoint_range
            )));
        }
        if !(self.changepoint_prior_scale > 0.0 && self.seasonality_prior_scale > 0.0) {
            return Err(ForecastError::ConfigError(
                "prior scales must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Settings of the ARIMA model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArimaConfig {
    /// (p, d, q)
    #[serde(default = "default_order")]
    pub order: (usize, usize, usize),
    #[serde(default = "default_interval_width")]
    pub interval_width: f64,
    /// Iteration cap of the conditional-sum-of-squares optimiser
    #[serde(default = "default_max_iter")]
    pub max_iter: usize,
}

impl Default for ArimaConfig {
    fn default() -> Self {
        Self {
            order: default_order(),
            interval_width: default_interval_width(),
            max_iter: default_max_iter(),
        }
    }
}

impl ArimaConfig {
    pub fn validate(&self) -> Result<()> {
        validate_width(self.interval_width)?;
        if self.max_iter == 0 {
            return Err(ForecastError::ConfigError(
                "max_iter must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn validate_width(width: f64) -> Result<()> {
    if width > 0.0 && width < 1.0 {
        Ok(())
    } else {
        Err(ForecastError::ConfigError(format!(
            "interval_width must be in (0, 1), got {}",
            width
        )))
    }
}

fn default_model() -> String {
    "seasonal".to_string()
}
fn default_test_days() -> usize {
    30
}
fn default_horizon() -> usize {
    30
}
fn default_fallback_order() -> Vec<String> {
    vec!["seasonal".to_string(), "arima".to_string()]
}
fn default_true() -> bool {
    true
}
fn default_yearly_order() -> usize {
    10
}
fn default_weekly_order() -> usize {
    3
}
fn default_n_changepoints() -> usize {
    25
}
fn default_changepoint_range() -> f64 {
    0.8
}
fn default_changepoint_prior_scale() -> f64 {
    0.05
}
fn default_seasonality_prior_scale() -> f64 {
    10.0
}
fn default_interval_width() -> f64 {
    0.95
}
fn default_order() -> (usize, usize, usize) {
    (2, 1, 2)
}
fn default_max_iter() -> usize {
    1000
}
