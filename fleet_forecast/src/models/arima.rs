//! ARIMA models for time series forecasting
//!
//! Coefficients are estimated by minimising the conditional sum of squares of
//! the `d`-times differenced series with a bounded Nelder-Mead search.

use crate::config::ArimaConfig;
use crate::data::Dataset;
use crate::error::{ForecastError, Result};
use crate::models::{ForecastFrame, ForecastModel};
use crate::numeric::{interval_z, nelder_mead};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Coefficient bound keeping the AR and MA polynomials away from the unit circle
const COEFFICIENT_BOUND: f64 = 0.99;
const TOLERANCE: f64 = 1e-10;

/// ARIMA model (AutoRegressive Integrated Moving Average)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArimaModel {
    config: ArimaConfig,
    fit: Option<ArimaFit>,
}

/// Parameters and state learned by `fit`
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ArimaFit {
    intercept: f64,
    ar: Vec<f64>,
    ma: Vec<f64>,
    /// Training series after differencing
    differenced: Vec<f64>,
    /// In-sample one-step errors of the differenced series
    residuals: Vec<f64>,
    /// Last value of the series differenced 0..d times
    anchors: Vec<f64>,
    sigma2: f64,
    aic: Option<f64>,
    z: f64,
    last_timestamp: NaiveDateTime,
}

impl ArimaModel {
    /// Create an unfit model
    pub fn new(config: ArimaConfig) -> Self {
        Self { config, fit: None }
    }

    pub fn config(&self) -> &ArimaConfig {
        &self.config
    }

    /// (p, d, q)
    pub fn order(&self) -> (usize, usize, usize) {
        self.config.order
    }

    /// Fewest observations an order needs
    pub fn min_observations(&self) -> usize {
        let (p, d, q) = self.config.order;
        d + p.max(q) + 2
    }

    pub fn ar_coefficients(&self) -> &[f64] {
        self.fit.as_ref().map(|fit| fit.ar.as_slice()).unwrap_or(&[])
    }

    pub fn ma_coefficients(&self) -> &[f64] {
        self.fit.as_ref().map(|fit| fit.ma.as_slice()).unwrap_or(&[])
    }

    /// Mean of the differenced series
    pub fn intercept(&self) -> Option<f64> {
        self.fit.as_ref().map(|fit| fit.intercept)
    }

    /// Innovation variance
    pub fn sigma2(&self) -> Option<f64> {
        self.fit.as_ref().map(|fit| fit.sigma2)
    }

    /// Akaike information criterion of the conditional fit
    pub fn aic(&self) -> Option<f64> {
        self.fit.as_ref().and_then(|fit| fit.aic)
    }

    pub fn residuals(&self) -> &[f64] {
        self.fit
            .as_ref()
            .map(|fit| fit.residuals.as_slice())
            .unwrap_or(&[])
    }

    fn fitted(&self) -> Result<&ArimaFit> {
        self.fit
            .as_ref()
            .ok_or_else(|| ForecastError::NotFitted(self.name().to_string()))
    }
}

/// Apply `d` rounds of first differencing
fn difference(series: &[f64], d: usize) -> Vec<f64> {
    let mut result = series.to_vec();
    for _ in 0..d {
        if result.len() <= 1 {
            break;
        }
        result = result.windows(2).map(|w| w[1] - w[0]).collect();
    }
    result
}

/// One-step errors of an ARMA recursion over `x`; the first `max(p, q)` are zero
fn arma_residuals(x: &[f64], intercept: f64, ar: &[f64], ma: &[f64]) -> Vec<f64> {
    let start = ar.len().max(ma.len());
    let mut residuals = vec![0.0; x.len()];

    for t in start..x.len() {
        let mut pred = intercept;
        for (i, phi) in ar.iter().enumerate() {
            pred += phi * (x[t - 1 - i] - intercept);
        }
        for (j, theta) in ma.iter().enumerate() {
            pred += theta * residuals[t - 1 - j];
        }
        residuals[t] = x[t] - pred;
    }

    residuals
}

fn css(x: &[f64], intercept: f64, ar: &[f64], ma: &[f64]) -> f64 {
    let start = ar.len().max(ma.len());
    arma_residuals(x, intercept, ar, ma)[start..]
        .iter()
        .map(|e| e * e)
        .sum()
}

/// MA(infinity) weights of the integrated process, used for interval widths
fn psi_weights(ar: &[f64], ma: &[f64], d: usize, horizon: usize) -> Vec<f64> {
    let mut psi = vec![0.0; horizon];
    if horizon == 0 {
        return psi;
    }
    psi[0] = 1.0;
    for j in 1..horizon {
        let mut value = ma.get(j - 1).copied().unwrap_or(0.0);
        for (i, phi) in ar.iter().enumerate().take(j) {
            value += phi * psi[j - 1 - i];
        }
        psi[j] = value;
    }

    // Each level of integration accumulates the weights
    for _ in 0..d {
        let mut acc = 0.0;
        for value in psi.iter_mut() {
            acc += *value;
            *value = acc;
        }
    }
    psi
}

impl ForecastModel for ArimaModel {
    fn name(&self) -> &str {
        "arima"
    }

    fn fit(&mut self, history: &Dataset) -> Result<()> {
        let (p, d, q) = self.config.order;
        let series = history.target();
        let needed = self.min_observations();
        if series.len() < needed {
            return Err(ForecastError::InsufficientData {
                model: self.name().to_string(),
                needed,
                got: series.len(),
            });
        }

        let anchors: Vec<f64> = (0..d)
            .map(|k| difference(series, k).last().copied().unwrap_or(0.0))
            .collect();
        let differenced = difference(series, d);
        let mean = differenced.iter().sum::<f64>() / differenced.len() as f64;

        let (intercept, ar, ma, iterations) = if p + q == 0 {
            (mean, Vec::new(), Vec::new(), 0)
        } else {
            let mut initial = vec![mean];
            initial.extend((0..p).map(|i| 0.1 / (i + 1) as f64));
            initial.extend((0..q).map(|j| 0.1 / (j + 1) as f64));

            let mut bounds = vec![(f64::NEG_INFINITY, f64::INFINITY)];
            bounds.extend(std::iter::repeat((-COEFFICIENT_BOUND, COEFFICIENT_BOUND)).take(p + q));

            let result = nelder_mead(
                |params| css(&differenced, params[0], &params[1..1 + p], &params[1 + p..]),
                &initial,
                &bounds,
                self.config.max_iter,
                TOLERANCE,
            );
            if !result.converged {
                debug!(
                    iterations = result.iterations,
                    "ARIMA optimiser stopped at the iteration cap"
                );
            }
            let point = result.point;
            (
                point[0],
                point[1..1 + p].to_vec(),
                point[1 + p..].to_vec(),
                result.iterations,
            )
        };

        if !intercept.is_finite() || ar.iter().chain(&ma).any(|c| !c.is_finite()) {
            return Err(ForecastError::ForecastingError(
                "ARIMA estimation produced non-finite coefficients".to_string(),
            ));
        }

        let residuals = arma_residuals(&differenced, intercept, &ar, &ma);
        let start = p.max(q);
        let effective = (differenced.len() - start) as f64;
        let sum_sq: f64 = residuals[start..].iter().map(|e| e * e).sum();
        let sigma2 = sum_sq / effective;
        if !sigma2.is_finite() {
            return Err(ForecastError::ForecastingError(
                "ARIMA fit produced a non-finite innovation variance".to_string(),
            ));
        }
        let aic = Some(effective * sigma2.ln() + 2.0 * (p + q + 1) as f64).filter(|v| v.is_finite());

        debug!(
            order = ?self.config.order,
            iterations,
            sigma2,
            "Fitted ARIMA model"
        );

        self.fit = Some(ArimaFit {
            intercept,
            ar,
            ma,
            differenced,
            residuals,
            anchors,
            sigma2,
            aic,
            z: interval_z(self.config.interval_width)?,
            last_timestamp: history.timestamps()[history.len() - 1],
        });
        Ok(())
    }

    /// Forecast one step per requested timestamp, continuing from the end of the
    /// training series. Rows follow the order of `future`.
    fn predict(&self, future: &[NaiveDateTime]) -> Result<ForecastFrame> {
        let fit = self.fitted()?;
        if future.is_empty() {
            return Ok(ForecastFrame::new());
        }
        if future[0] <= fit.last_timestamp {
            warn!(
                first = %future[0],
                last_trained = %fit.last_timestamp,
                "ARIMA forecasts are positional; requested timestamps overlap the training range"
            );
        }

        let horizon = future.len();
        let mut x = fit.differenced.clone();
        let mut errors = fit.residuals.clone();
        let mut steps = Vec::with_capacity(horizon);
        for _ in 0..horizon {
            let t = x.len();
            let mut pred = fit.intercept;
            for (i, phi) in fit.ar.iter().enumerate() {
                pred += phi * (x[t - 1 - i] - fit.intercept);
            }
            for (j, theta) in fit.ma.iter().enumerate() {
                pred += theta * errors[t - 1 - j];
            }
            x.push(pred);
            errors.push(0.0);
            steps.push(pred);
        }

        let mut values = steps;
        for anchor in fit.anchors.iter().rev() {
            let mut acc = *anchor;
            for value in values.iter_mut() {
                acc += *value;
                *value = acc;
            }
        }

        if values.iter().any(|v| !v.is_finite()) {
            return Err(ForecastError::ForecastingError(
                "ARIMA forecast diverged".to_string(),
            ));
        }

        let (_, d, _) = self.config.order;
        let psi = psi_weights(&fit.ar, &fit.ma, d, horizon);
        let mut cumulative = 0.0;
        let margins: Vec<f64> = psi
            .iter()
            .map(|w| {
                cumulative += w * w;
                fit.z * (fit.sigma2 * cumulative).sqrt()
            })
            .collect();

        let lower = values.iter().zip(&margins).map(|(v, m)| v - m).collect();
        let upper = values.iter().zip(&margins).map(|(v, m)| v + m).collect();

        ForecastFrame::from_parts(future, values, Some((lower, upper)))
    }

    fn is_fitted(&self) -> bool {
        self.fit.is_some()
    }
}
