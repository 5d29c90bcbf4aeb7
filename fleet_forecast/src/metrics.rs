//! Metrics for evaluating forecast performance

use crate::error::{ForecastError, Result};
use serde::{Deserialize, Serialize};

/// Accuracy of a backtest forecast against held-out actuals
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    /// Root Mean Squared Error
    pub rmse: f64,
    /// Mean Absolute Error
    pub mae: f64,
    /// Mean Absolute Percentage Error, in percent
    pub mape: f64,
}

impl std::fmt::Display for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Forecast Performance Metrics:")?;
        writeln!(f, "  RMSE:    {:.4}", self.rmse)?;
        writeln!(f, "  MAE:     {:.4}", self.mae)?;
        writeln!(f, "  MAPE:    {:.4}%", self.mape)?;
        Ok(())
    }
}

/// Compare predictions with actual values.
///
/// Positions where the percentage error is not finite (an actual of exactly zero)
/// contribute zero to MAPE but still count in its denominator.
pub fn evaluate(actual: &[f64], predicted: &[f64]) -> Result<Metrics> {
    if actual.len() != predicted.len() {
        return Err(ForecastError::LengthMismatch {
            actual: actual.len(),
            predicted: predicted.len(),
        });
    }
    if actual.is_empty() {
        return Err(ForecastError::ValidationError(
            "Cannot evaluate an empty forecast".to_string(),
        ));
    }

    let n = actual.len() as f64;
    let (mut squared, mut absolute, mut percentage) = (0.0, 0.0, 0.0);
    for (a, p) in actual.iter().zip(predicted) {
        let error = (a - p).abs();
        squared += error * error;
        absolute += error;

        let ratio = error / a.abs();
        if ratio.is_finite() {
            percentage += ratio;
        }
    }

    Ok(Metrics {
        rmse: (squared / n).sqrt(),
        mae: absolute / n,
        mape: percentage / n * 100.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_uses_four_decimals() {
        let metrics = Metrics {
            rmse: 0.123456,
            mae: 0.1,
            mape: 12.5,
        };
        let text = metrics.to_string();
        assert!(text.contains("RMSE:    0.1235"));
        assert!(text.contains("MAPE:    12.5000%"));
    }
}
