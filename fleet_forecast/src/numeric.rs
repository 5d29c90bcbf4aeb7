//! Numerical building blocks used by the forecasting models

use crate::error::{ForecastError, Result};
use statrs::distribution::{ContinuousCDF, Normal};

/// Two-sided standard normal quantile for an interval of the given width (0.95 -> ~1.96)
pub fn interval_z(width: f64) -> Result<f64> {
    if !(width > 0.0 && width < 1.0) {
        return Err(ForecastError::ValidationError(format!(
            "Interval width must be between 0 and 1, got {}",
            width
        )));
    }

    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| ForecastError::ForecastingError(format!("Normal distribution: {}", e)))?;
    Ok(normal.inverse_cdf((1.0 + width) / 2.0))
}

/// Outcome of a Nelder-Mead minimisation
#[derive(Debug, Clone)]
pub struct Minimum {
    pub point: Vec<f64>,
    pub value: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// Minimise `objective` with the Nelder-Mead simplex method.
///
/// Each coordinate is clamped into its `(min, max)` bound after every move.
pub fn nelder_mead<F>(
    objective: F,
    initial: &[f64],
    bounds: &[(f64, f64)],
    max_iter: usize,
    tolerance: f64,
) -> Minimum
where
    F: Fn(&[f64]) -> f64,
{
    let n = initial.len();
    let clamp = |mut v: Vec<f64>| {
        for (x, &(lo, hi)) in v.iter_mut().zip(bounds) {
            *x = x.clamp(lo, hi);
        }
        v
    };
    // NaN objective values sort last
    let eval = |v: &[f64]| {
        let value = objective(v);
        if value.is_nan() {
            f64::INFINITY
        } else {
            value
        }
    };

    if n == 0 {
        return Minimum {
            point: Vec::new(),
            value: eval(&[]),
            iterations: 0,
            converged: true,
        };
    }

    let mut simplex = vec![clamp(initial.to_vec())];
    for i in 0..n {
        let mut vertex = initial.to_vec();
        vertex[i] += if initial[i].abs() > 1e-10 {
            0.05 * initial[i].abs()
        } else {
            0.05
        };
        simplex.push(clamp(vertex));
    }
    let mut values: Vec<f64> = simplex.iter().map(|v| eval(v)).collect();

    let mut iterations = 0;
    let mut converged = false;

    while iterations < max_iter {
        iterations += 1;

        let mut order: Vec<usize> = (0..=n).collect();
        order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
        let (best, second_worst, worst) = (order[0], order[n - 1], order[n]);

        if (values[worst] - values[best]).abs() < tolerance {
            converged = true;
            break;
        }

        let mut centroid = vec![0.0; n];
        for (i, vertex) in simplex.iter().enumerate() {
            if i != worst {
                for (c, x) in centroid.iter_mut().zip(vertex) {
                    *c += x / n as f64;
                }
            }
        }
        let towards = |from: &[f64], coef: f64| -> Vec<f64> {
            clamp(
                centroid
                    .iter()
                    .zip(from)
                    .map(|(c, p)| c + coef * (p - c))
                    .collect(),
            )
        };

        let reflected = towards(&simplex[worst], -1.0);
        let reflected_value = eval(&reflected);

        if reflected_value < values[best] {
            let expanded = towards(&simplex[worst], -2.0);
            let expanded_value = eval(&expanded);
            if expanded_value < reflected_value {
                simplex[worst] = expanded;
                values[worst] = expanded_value;
            } else {
                simplex[worst] = reflected;
                values[worst] = reflected_value;
            }
            continue;
        }

        if reflected_value < values[second_worst] {
            simplex[worst] = reflected;
            values[worst] = reflected_value;
            continue;
        }

        let (contracted, threshold) = if reflected_value < values[worst] {
            (towards(&reflected, 0.5), reflected_value)
        } else {
            (towards(&simplex[worst], 0.5), values[worst])
        };
        let contracted_value = eval(&contracted);
        if contracted_value < threshold {
            simplex[worst] = contracted;
            values[worst] = contracted_value;
            continue;
        }

        // Shrink towards the best vertex
        let anchor = simplex[best].clone();
        for i in 0..=n {
            if i != best {
                let shrunk = anchor
                    .iter()
                    .zip(&simplex[i])
                    .map(|(a, x)| a + 0.5 * (x - a))
                    .collect();
                simplex[i] = clamp(shrunk);
                values[i] = eval(&simplex[i]);
            }
        }
    }

    let best = (0..=n)
        .min_by(|&a, &b| values[a].total_cmp(&values[b]))
        .unwrap_or(0);

    Minimum {
        point: simplex[best].clone(),
        value: values[best],
        iterations,
        converged,
    }
}

/// Solve the penalised least-squares problem `min |y - X b|^2 + sum(penalty_j * b_j^2)`.
///
/// `rows` holds the design matrix row by row; `penalties` has one entry per column.
/// The normal equations are solved with a Cholesky factorisation.
pub fn ridge_solve(rows: &[Vec<f64>], y: &[f64], penalties: &[f64]) -> Result<Vec<f64>> {
    let k = penalties.len();
    if rows.len() != y.len() {
        return Err(ForecastError::ValidationError(format!(
            "Design has {} rows but target has {} values",
            rows.len(),
            y.len()
        )));
    }
    if rows.iter().any(|row| row.len() != k) {
        return Err(ForecastError::ValidationError(format!(
            "Design rows must have {} columns",
            k
        )));
    }

    let mut gram = vec![vec![0.0; k]; k];
    let mut rhs = vec![0.0; k];
    for (row, &target) in rows.iter().zip(y) {
        for i in 0..k {
            rhs[i] += row[i] * target;
            for j in 0..=i {
                gram[i][j] += row[i] * row[j];
            }
        }
    }
    for i in 0..k {
        gram[i][i] += penalties[i];
        for j in 0..i {
            gram[j][i] = gram[i][j];
        }
    }

    // Lower-triangular factor, in place
    let mut lower = vec![vec![0.0; k]; k];
    for i in 0..k {
        for j in 0..=i {
            let sum: f64 = (0..j).map(|m| lower[i][m] * lower[j][m]).sum();
            if i == j {
                let diag = gram[i][i] - sum;
                if !(diag > 1e-12 * gram[i][i].abs().max(1e-300)) || !diag.is_finite() {
                    return Err(ForecastError::ForecastingError(
                        "Design matrix is not positive definite".to_string(),
                    ));
                }
                lower[i][i] = diag.sqrt();
            } else {
                lower[i][j] = (gram[i][j] - sum) / lower[j][j];
            }
        }
    }

    // Forward then backward substitution
    let mut z = vec![0.0; k];
    for i in 0..k {
        let sum: f64 = (0..i).map(|m| lower[i][m] * z[m]).sum();
        z[i] = (rhs[i] - sum) / lower[i][i];
    }
    let mut beta = vec![0.0; k];
    for i in (0..k).rev() {
        let sum: f64 = (i + 1..k).map(|m| lower[m][i] * beta[m]).sum();
        beta[i] = (z[i] - sum) / lower[i][i];
    }

    Ok(beta)
}
