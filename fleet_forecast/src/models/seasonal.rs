//! Additive decomposition model: piecewise-linear trend plus Fourier seasonality
//!
//! The target is modelled as
//!
//! ```text
//! y(t) = k + m*t + sum_j delta_j * (t - s_j)+ + yearly(t) + weekly(t) + e
//! ```
//!
//! where `t` is time rescaled to `[0, 1]` over the training span and `s_j` are
//! potential changepoints spread over the early part of the history. All
//! coefficients are estimated jointly with ridge-penalised least squares; the
//! penalty on the changepoint slopes and Fourier terms is derived from the
//! configured prior scales.

use crate::config::SeasonalConfig;
use crate::data::Dataset;
use crate::error::{ForecastError, Result};
use crate::models::{ForecastFrame, ForecastModel};
use crate::numeric::{interval_z, ridge_solve};
use crate::utils::epoch_days;
use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::debug;

/// Fewest observations the model will fit on
pub const MIN_OBSERVATIONS: usize = 15;

const YEAR_DAYS: f64 = 365.25;
const WEEK_DAYS: f64 = 7.0;
/// Near-flat prior on the base intercept and growth rate
const BASE_PENALTY: f64 = 1e-9;

/// Trend/seasonality decomposition forecaster
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeasonalModel {
    config: SeasonalConfig,
    fit: Option<SeasonalFit>,
}

/// Parameters learned by `fit`
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SeasonalFit {
    start: NaiveDateTime,
    span_days: f64,
    y_scale: f64,
    /// Changepoint locations on the rescaled time axis
    changepoints: Vec<f64>,
    coefficients: Vec<f64>,
    /// Residual standard deviation, in target units
    sigma: f64,
    z: f64,
}

/// Per-timestamp breakdown of a seasonal forecast
#[derive(Debug, Clone, PartialEq)]
pub struct SeasonalComponents {
    pub timestamps: Vec<NaiveDateTime>,
    pub trend: Vec<f64>,
    pub yearly: Vec<f64>,
    pub weekly: Vec<f64>,
}

/// Column ranges of the design matrix
struct Layout {
    changepoints: usize,
    yearly: usize,
    weekly: usize,
}

impl Layout {
    fn width(&self) -> usize {
        2 + self.changepoints + 2 * self.yearly + 2 * self.weekly
    }

    fn yearly_start(&self) -> usize {
        2 + self.changepoints
    }

    fn weekly_start(&self) -> usize {
        self.yearly_start() + 2 * self.yearly
    }
}

impl SeasonalModel {
    /// Create an unfit model
    pub fn new(config: SeasonalConfig) -> Self {
        Self { config, fit: None }
    }

    pub fn config(&self) -> &SeasonalConfig {
        &self.config
    }

    /// Trend changepoint locations, empty before `fit`
    pub fn changepoints(&self) -> Vec<NaiveDateTime> {
        match &self.fit {
            Some(fit) => fit
                .changepoints
                .iter()
                .map(|&s| fit.start + days_to_duration(s * fit.span_days))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Residual standard deviation of the fitted model
    pub fn sigma(&self) -> Option<f64> {
        self.fit.as_ref().map(|fit| fit.sigma)
    }

    /// Decompose the forecast at each timestamp into trend and seasonal parts
    pub fn components(&self, timestamps: &[NaiveDateTime]) -> Result<SeasonalComponents> {
        let fit = self.fitted()?;
        let layout = self.layout(fit.changepoints.len());

        let mut trend = Vec::with_capacity(timestamps.len());
        let mut yearly = Vec::with_capacity(timestamps.len());
        let mut weekly = Vec::with_capacity(timestamps.len());
        for ts in timestamps {
            let row = self.design_row(fit, &layout, ts);
            let dot = |range: std::ops::Range<usize>| -> f64 {
                range.map(|i| row[i] * fit.coefficients[i]).sum::<f64>() * fit.y_scale
            };
            trend.push(dot(0..layout.yearly_start()));
            yearly.push(dot(layout.yearly_start()..layout.weekly_start()));
            weekly.push(dot(layout.weekly_start()..layout.width()));
        }

        Ok(SeasonalComponents {
            timestamps: timestamps.to_vec(),
            trend,
            yearly,
            weekly,
        })
    }

    fn fitted(&self) -> Result<&SeasonalFit> {
        self.fit
            .as_ref()
            .ok_or_else(|| ForecastError::NotFitted(self.name().to_string()))
    }

    fn layout(&self, changepoints: usize) -> Layout {
        let order = |enabled: bool, order: usize| if enabled { order } else { 0 };
        Layout {
            changepoints,
            yearly: order(self.config.yearly_seasonality, self.config.yearly_order),
            weekly: order(self.config.weekly_seasonality, self.config.weekly_order),
        }
    }

    fn design_row(&self, fit: &SeasonalFit, layout: &Layout, ts: &NaiveDateTime) -> Vec<f64> {
        let days = epoch_days(ts);
        let t = (days - epoch_days(&fit.start)) / fit.span_days;

        let mut row = Vec::with_capacity(layout.width());
        row.push(1.0);
        row.push(t);
        row.extend(fit.changepoints.iter().map(|&s| (t - s).max(0.0)));
        push_fourier(&mut row, days, YEAR_DAYS, layout.yearly);
        push_fourier(&mut row, days, WEEK_DAYS, layout.weekly);
        row
    }

    /// Changepoint positions on the rescaled axis, taken at evenly spaced rows
    /// of the first `changepoint_range` share of the history
    fn place_changepoints(&self, scaled: &[f64]) -> Vec<f64> {
        let hist_size = (scaled.len() as f64 * self.config.changepoint_range).floor() as usize;
        let count = self.config.n_changepoints.min(hist_size.saturating_sub(1));
        if count == 0 {
            return Vec::new();
        }

        let last = (hist_size - 1) as f64;
        (1..=count)
            .map(|i| {
                let idx = (i as f64 * last / count as f64).round() as usize;
                scaled[idx.min(scaled.len() - 1)]
            })
            .collect()
    }
}

impl ForecastModel for SeasonalModel {
    fn name(&self) -> &str {
        "seasonal"
    }

    fn fit(&mut self, history: &Dataset) -> Result<()> {
        let n = history.len();
        if n < MIN_OBSERVATIONS {
            return Err(ForecastError::InsufficientData {
                model: self.name().to_string(),
                needed: MIN_OBSERVATIONS,
                got: n,
            });
        }

        let timestamps = history.timestamps();
        let start = timestamps[0];
        let span_days = epoch_days(&timestamps[n - 1]) - epoch_days(&start);
        if !(span_days > 0.0) {
            return Err(ForecastError::ForecastingError(
                "History must span a positive time range".to_string(),
            ));
        }

        let y_max = history.target().iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
        let y_scale = if y_max > 0.0 { y_max } else { 1.0 };
        let y: Vec<f64> = history.target().iter().map(|v| v / y_scale).collect();

        let scaled: Vec<f64> = timestamps
            .iter()
            .map(|ts| (epoch_days(ts) - epoch_days(&start)) / span_days)
            .collect();

        let mut fit = SeasonalFit {
            start,
            span_days,
            y_scale,
            changepoints: self.place_changepoints(&scaled),
            coefficients: Vec::new(),
            sigma: 0.0,
            z: interval_z(self.config.interval_width)?,
        };
        let layout = self.layout(fit.changepoints.len());

        let rows: Vec<Vec<f64>> = timestamps
            .iter()
            .map(|ts| self.design_row(&fit, &layout, ts))
            .collect();

        let trend_penalty = 0.01 / self.config.changepoint_prior_scale.powi(2);
        let season_penalty = 0.01 / self.config.seasonality_prior_scale.powi(2);
        let mut penalties = vec![BASE_PENALTY, BASE_PENALTY];
        penalties.extend(std::iter::repeat(trend_penalty).take(layout.changepoints));
        penalties
            .extend(std::iter::repeat(season_penalty).take(2 * (layout.yearly + layout.weekly)));

        fit.coefficients = ridge_solve(&rows, &y, &penalties)?;

        let sse: f64 = rows
            .iter()
            .zip(&y)
            .map(|(row, target)| {
                let fitted: f64 = row.iter().zip(&fit.coefficients).map(|(x, b)| x * b).sum();
                (target - fitted).powi(2)
            })
            .sum();
        fit.sigma = (sse / (n - 1) as f64).sqrt() * y_scale;
        if !fit.sigma.is_finite() {
            return Err(ForecastError::ForecastingError(
                "Seasonal fit produced a non-finite residual scale".to_string(),
            ));
        }

        debug!(
            observations = n,
            changepoints = layout.changepoints,
            sigma = fit.sigma,
            "Fitted seasonal model"
        );
        self.fit = Some(fit);
        Ok(())
    }

    fn predict(&self, future: &[NaiveDateTime]) -> Result<ForecastFrame> {
        let fit = self.fitted()?;
        if future.is_empty() {
            return Ok(ForecastFrame::new());
        }

        let layout = self.layout(fit.changepoints.len());
        let values: Vec<f64> = future
            .iter()
            .map(|ts| {
                let row = self.design_row(fit, &layout, ts);
                row.iter().zip(&fit.coefficients).map(|(x, b)| x * b).sum::<f64>() * fit.y_scale
            })
            .collect();

        let margin = fit.z * fit.sigma;
        let lower = values.iter().map(|v| v - margin).collect();
        let upper = values.iter().map(|v| v + margin).collect();

        ForecastFrame::from_parts(future, values, Some((lower, upper)))
    }

    fn is_fitted(&self) -> bool {
        self.fit.is_some()
    }
}

fn push_fourier(row: &mut Vec<f64>, days: f64, period: f64, order: usize) {
    for k in 1..=order {
        let angle = 2.0 * PI * k as f64 * days / period;
        row.push(angle.sin());
        row.push(angle.cos());
    }
}

fn days_to_duration(days: f64) -> Duration {
    Duration::milliseconds((days * 86_400_000.0).round() as i64)
}
