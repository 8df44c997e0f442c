//! Least squares and long-run variance routines used by the unit-root tests.
//!
//! Design matrices are row-major (`x[row][col]`), one row per observation.

use crate::errors::{validate_data_length, PrepResult, SeriesPrepError};
use nalgebra::{Cholesky, DMatrix, DVector};
use std::f64::consts::PI;

/// Validates that a design matrix contains no NaN or Inf values
fn ensure_finite_matrix(a: &[Vec<f64>], operation: &str) -> PrepResult<()> {
    for (i, row) in a.iter().enumerate() {
        for (j, &val) in row.iter().enumerate() {
            if !val.is_finite() {
                return Err(SeriesPrepError::numerical(
                    format!("Non-finite value ({}) at position [{},{}]", val, i, j),
                    operation,
                ));
            }
        }
    }
    Ok(())
}

/// Validates that a matrix is rectangular (not ragged) and non-empty
fn ensure_rectangular_matrix(a: &[Vec<f64>]) -> PrepResult<(usize, usize)> {
    if a.is_empty() {
        return Err(SeriesPrepError::numerical("Empty matrix provided", "matrix_validation"));
    }

    let k = a[0].len();
    if k == 0 {
        return Err(SeriesPrepError::numerical(
            "Zero-width matrix (no columns)",
            "matrix_validation",
        ));
    }

    if !a.iter().all(|row| row.len() == k) {
        return Err(SeriesPrepError::numerical(
            "Ragged matrix (inconsistent row lengths)",
            "matrix_validation",
        ));
    }

    Ok((a.len(), k))
}

/// Ordinary least squares fit.
#[derive(Debug, Clone, PartialEq)]
pub struct OlsFit {
    /// Estimated coefficients, one per design column
    pub coefficients: Vec<f64>,
    /// Classical (homoskedastic) standard errors
    pub std_errors: Vec<f64>,
    /// Sum of squared residuals
    pub ssr: f64,
    /// Number of observations
    pub nobs: usize,
}

impl OlsFit {
    /// t-statistic of coefficient `j`.
    pub fn t_value(&self, j: usize) -> f64 {
        self.coefficients[j] / self.std_errors[j]
    }

    /// Gaussian log-likelihood at the fitted coefficients.
    pub fn log_likelihood(&self) -> f64 {
        let nobs = self.nobs as f64;
        let half = nobs / 2.0;
        -half * (2.0 * PI).ln() - half * (self.ssr / nobs).ln() - half
    }

    /// Akaike information criterion, counting every regressor.
    pub fn aic(&self) -> f64 {
        -2.0 * self.log_likelihood() + 2.0 * self.coefficients.len() as f64
    }
}

/// Solve `min ||y - X b||²` through the Cholesky factor of `X'X`.
///
/// Fails with `NumericalError` when `X'X` is not positive definite (collinear
/// columns, e.g. a level regressor that is constant next to an intercept) and
/// with `InsufficientData` when there are no residual degrees of freedom.
pub fn ols(x: &[Vec<f64>], y: &[f64]) -> PrepResult<OlsFit> {
    let (nobs, k) = ensure_rectangular_matrix(x)?;
    ensure_finite_matrix(x, "ols")?;
    if nobs != y.len() {
        return Err(SeriesPrepError::numerical(
            format!("design has {} rows but response has {} values", nobs, y.len()),
            "ols",
        ));
    }
    validate_data_length(y, k + 1)?;

    let design = DMatrix::from_fn(nobs, k, |r, c| x[r][c]);
    let response = DVector::from_column_slice(y);
    let xtx = design.transpose() * &design;
    let xty = design.transpose() * &response;

    let max_diag = xtx.diagonal().iter().copied().fold(0.0_f64, f64::max);
    let chol = Cholesky::new(xtx)
        .ok_or_else(|| SeriesPrepError::numerical("X'X is not positive definite", "ols"))?;
    // Near-collinear designs factor with a vanishing pivot.
    let min_pivot = chol.l_dirty().diagonal().iter().copied().fold(f64::INFINITY, f64::min);
    if !(min_pivot * min_pivot > 1e-12 * max_diag) {
        return Err(SeriesPrepError::numerical("design matrix is rank deficient", "ols"));
    }

    let beta = chol.solve(&xty);
    let residuals = &response - &design * &beta;
    let ssr = residuals.dot(&residuals);
    let sigma2 = ssr / (nobs - k) as f64;
    let xtx_inv = chol.inverse();
    let std_errors = (0..k).map(|j| (sigma2 * xtx_inv[(j, j)]).max(0.0).sqrt()).collect();

    Ok(OlsFit {
        coefficients: beta.iter().copied().collect(),
        std_errors,
        ssr,
        nobs,
    })
}

/// Lag-`lag` cross product `sum_t r[t] * r[t - lag]`.
fn lagged_dot(residuals: &[f64], lag: usize) -> f64 {
    residuals[lag..]
        .iter()
        .zip(&residuals[..residuals.len() - lag])
        .map(|(a, b)| a * b)
        .sum()
}

/// Hobijn, Franses and Ooms (1998) automatic bandwidth for KPSS.
///
/// Returns `None` when the residuals carry no variation.
pub fn hobijn_bandwidth(residuals: &[f64]) -> Option<usize> {
    let n = residuals.len();
    if n == 0 {
        return None;
    }
    let nf = n as f64;
    let covlags = nf.powf(2.0 / 9.0) as usize;
    let mut s0 = residuals.iter().map(|r| r * r).sum::<f64>() / nf;
    let mut s1 = 0.0;
    for i in 1..=covlags.min(n - 1) {
        let prod = lagged_dot(residuals, i) / (nf / 2.0);
        s0 += prod;
        s1 += i as f64 * prod;
    }
    let ratio = s1 / s0;
    let gamma_hat = 1.1447 * (ratio * ratio).powf(1.0 / 3.0);
    let lags = gamma_hat * nf.powf(1.0 / 3.0);
    if lags.is_finite() {
        Some(lags as usize)
    } else {
        None
    }
}

/// Bartlett-weighted long-run variance of already-centered residuals.
///
/// `(sum r² + 2 sum_{i=1..L} (1 - i/(L+1)) sum_t r[t] r[t-i]) / n`, with `L`
/// capped at `n - 1`.
pub fn bartlett_long_run_variance(residuals: &[f64], lags: usize) -> f64 {
    let n = residuals.len();
    if n == 0 {
        return f64::NAN;
    }
    let lags = lags.min(n - 1);
    let mut s_hat = residuals.iter().map(|r| r * r).sum::<f64>();
    for i in 1..=lags {
        let weight = 1.0 - i as f64 / (lags as f64 + 1.0);
        s_hat += 2.0 * weight * lagged_dot(residuals, i);
    }
    s_hat / n as f64
}
