//! Ordinary least squares.
//!
//! The linear fit path regresses a transformed intensity on time:
//!
//! ```text
//! minimize Σ (v_i - (β0 + β1 t_i))^2
//! ```
//!
//! Implementation choices:
//! - We use SVD to solve the least-squares problem robustly for tall design
//!   matrices (more rows than columns).
//!   (Nalgebra's `QR::solve` is intended for square systems and will panic for
//!   non-square matrices.)
//! - Standard errors come from `σ² (XᵀX)⁻¹` with `σ² = SSE / (n - 2)`.

use nalgebra::{DMatrix, DVector};

use crate::error::EpiError;
use crate::math::stats::pseudo_r_squared;

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Straight-line regression `y = intercept + slope·x` with inference.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearRegression {
    pub intercept: f64,
    pub slope: f64,
    pub se_intercept: f64,
    pub se_slope: f64,
    pub r_squared: f64,
    /// Residual degrees of freedom (`n - 2`).
    pub df: usize,
}

/// Fit `y = a + b·x` by OLS. Needs at least 3 points and non-constant `x`.
pub fn simple_regression(x: &[f64], y: &[f64]) -> Result<LinearRegression, EpiError> {
    let n = x.len();
    if y.len() != n {
        return Err(EpiError::invalid(format!("regression length mismatch: {n} vs {}", y.len())));
    }
    if n < 3 {
        return Err(EpiError::insufficient(3, n, "linear regression"));
    }

    let mean_x = x.iter().sum::<f64>() / n as f64;
    let sxx: f64 = x.iter().map(|v| (v - mean_x).powi(2)).sum();
    if sxx <= f64::EPSILON {
        return Err(EpiError::invalid("all time values are identical; slope is not identifiable"));
    }

    let design = DMatrix::from_fn(n, 2, |i, j| if j == 0 { 1.0 } else { x[i] });
    let obs = DVector::from_column_slice(y);
    let beta = solve_least_squares(&design, &obs)
        .ok_or_else(|| EpiError::invalid("ill-conditioned regression design"))?;

    let fitted = &design * &beta;
    let sse = (&obs - &fitted).norm_squared();
    let df = n - 2;
    let sigma2 = sse / df as f64;

    let xtx = design.transpose() * &design;
    let cov = xtx
        .try_inverse()
        .ok_or_else(|| EpiError::invalid("singular normal equations in regression"))?
        * sigma2;

    Ok(LinearRegression {
        intercept: beta[0],
        slope: beta[1],
        se_intercept: cov[(0, 0)].max(0.0).sqrt(),
        se_slope: cov[(1, 1)].max(0.0).sqrt(),
        r_squared: pseudo_r_squared(y, fitted.as_slice()),
        df,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_squares_solves_simple_system() {
        // Fit y = 2 + 3x on x = [0,1,2]
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[2.0, 5.0, 8.0]);

        let beta = solve_least_squares(&x, &y).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-10);
        assert!((beta[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn regression_reports_textbook_standard_errors() {
        // y = 1 + 2x with residuals (+0.1, -0.2, +0.2, -0.1) at x = 0..3.
        let x = [0.0, 1.0, 2.0, 3.0];
        let y = [1.1, 2.8, 5.2, 6.9];
        let fit = simple_regression(&x, &y).unwrap();

        // Closed form: slope = Sxy / Sxx.
        let sxx = 5.0;
        let mean_y = y.iter().sum::<f64>() / 4.0;
        let sxy: f64 = x.iter().zip(&y).map(|(a, b)| (a - 1.5) * (b - mean_y)).sum();
        assert!((fit.slope - sxy / sxx).abs() < 1e-10);

        let sse: f64 = x
            .iter()
            .zip(&y)
            .map(|(a, b)| (b - fit.intercept - fit.slope * a).powi(2))
            .sum();
        let sigma = (sse / 2.0).sqrt();
        assert!((fit.se_slope - sigma / sxx.sqrt()).abs() < 1e-10);
        assert!((fit.se_intercept - sigma * (0.25 + 1.5 * 1.5 / sxx).sqrt()).abs() < 1e-10);
        assert_eq!(fit.df, 2);
        assert!(fit.r_squared > 0.99 && fit.r_squared < 1.0);
    }

    #[test]
    fn regression_requires_three_distinct_points() {
        assert!(matches!(
            simple_regression(&[0.0, 1.0], &[0.0, 1.0]),
            Err(EpiError::InsufficientData { needed: 3, got: 2, .. })
        ));
        assert!(simple_regression(&[2.0, 2.0, 2.0], &[0.0, 1.0, 2.0]).is_err());
    }
}
