//! Goodness-of-fit statistics and Student-t quantiles.

use statrs::distribution::{ContinuousCDF, StudentsT};

use crate::error::EpiError;

/// Lin's concordance correlation coefficient between `predicted` and `observed`.
///
/// `ρc = 2 s_xy / (s_x² + s_y² + (x̄ - ȳ)²)` with population moments. Two
/// identical constant series are in perfect agreement (1.0).
pub fn concordance_correlation(predicted: &[f64], observed: &[f64]) -> f64 {
    let n = predicted.len().min(observed.len());
    if n == 0 {
        return 0.0;
    }
    let nf = n as f64;
    let mx = predicted[..n].iter().sum::<f64>() / nf;
    let my = observed[..n].iter().sum::<f64>() / nf;

    let mut sxx = 0.0;
    let mut syy = 0.0;
    let mut sxy = 0.0;
    for (x, y) in predicted[..n].iter().zip(&observed[..n]) {
        sxx += (x - mx).powi(2);
        syy += (y - my).powi(2);
        sxy += (x - mx) * (y - my);
    }
    let denom = sxx / nf + syy / nf + (mx - my).powi(2);
    if denom <= f64::EPSILON * f64::EPSILON {
        return 1.0;
    }
    2.0 * (sxy / nf) / denom
}

/// `sqrt(Σ residual² / (n - p))`.
pub fn residual_standard_error(residuals: &[f64], n_params: usize) -> Result<f64, EpiError> {
    let n = residuals.len();
    if n <= n_params {
        return Err(EpiError::insufficient(n_params + 1, n, "residual standard error"));
    }
    let sse: f64 = residuals.iter().map(|r| r * r).sum();
    Ok((sse / (n - n_params) as f64).sqrt())
}

/// `1 - SS_res / SS_tot`.
///
/// With constant observations the ratio is undefined; an exact fit then scores
/// 1 and anything else 0.
pub fn pseudo_r_squared(observed: &[f64], predicted: &[f64]) -> f64 {
    let n = observed.len().min(predicted.len());
    if n == 0 {
        return 0.0;
    }
    let mean = observed[..n].iter().sum::<f64>() / n as f64;
    let ss_tot: f64 = observed[..n].iter().map(|y| (y - mean).powi(2)).sum();
    let ss_res: f64 = observed[..n]
        .iter()
        .zip(&predicted[..n])
        .map(|(y, f)| (y - f).powi(2))
        .sum();
    if ss_tot <= f64::EPSILON {
        return if ss_res <= f64::EPSILON { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

/// Two-sided Student-t critical value for a `confidence` interval with `df`
/// degrees of freedom.
pub fn t_quantile(df: usize, confidence: f64) -> Result<f64, EpiError> {
    if !(confidence.is_finite() && confidence > 0.0 && confidence < 1.0) {
        return Err(EpiError::invalid(format!("confidence must lie in (0, 1), got {confidence}")));
    }
    if df == 0 {
        return Err(EpiError::insufficient(1, 0, "t quantile degrees of freedom"));
    }
    let dist = StudentsT::new(0.0, 1.0, df as f64)
        .map_err(|e| EpiError::invalid(format!("Student-t distribution error: {e}")))?;
    Ok(dist.inverse_cdf(0.5 + confidence / 2.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ccc_is_one_for_identical_series_and_penalizes_bias() {
        let obs = [0.1, 0.3, 0.5, 0.7];
        assert!((concordance_correlation(&obs, &obs) - 1.0).abs() < 1e-12);

        // Perfectly correlated but shifted: Pearson would say 1, CCC does not.
        let shifted: Vec<f64> = obs.iter().map(|v| v + 0.2).collect();
        let ccc = concordance_correlation(&shifted, &obs);
        assert!(ccc < 0.9 && ccc > 0.0, "ccc={ccc}");

        assert!((concordance_correlation(&[0.2, 0.2], &[0.2, 0.2]) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn rse_uses_residual_degrees_of_freedom() {
        let rse = residual_standard_error(&[0.1, -0.1, 0.2, -0.2], 2).unwrap();
        assert!((rse - (0.1f64 / 2.0).sqrt()).abs() < 1e-12);
        assert!(residual_standard_error(&[0.1, 0.2], 2).is_err());
    }

    #[test]
    fn pseudo_r_squared_handles_constant_observations() {
        assert!((pseudo_r_squared(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]) - 1.0).abs() < 1e-12);
        assert_eq!(pseudo_r_squared(&[0.5, 0.5], &[0.5, 0.5]), 1.0);
        assert_eq!(pseudo_r_squared(&[0.5, 0.5], &[0.4, 0.6]), 0.0);
    }

    #[test]
    fn t_quantile_matches_tables() {
        assert!((t_quantile(10, 0.95).unwrap() - 2.228_138_85).abs() < 1e-5);
        assert!((t_quantile(1, 0.95).unwrap() - 12.706_204_7).abs() < 1e-3);
        assert!(t_quantile(5, 1.0).is_err());
        assert!(t_quantile(0, 0.95).is_err());
    }
}
