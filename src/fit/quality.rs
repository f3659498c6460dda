//! Helpers shared by the linear and nonlinear fit paths: prediction tables,
//! goodness-of-fit and parameter summaries.

use crate::domain::{GoodnessOfFit, ModelParams, ParamEstimate, PredictionRow, ProgressCurve};
use crate::error::EpiError;
use crate::math::{concordance_correlation, residual_standard_error};

/// Observed vs predicted vs residual for every observation of `curve`.
pub fn prediction_table(params: &ModelParams, curve: &ProgressCurve) -> Result<Vec<PredictionRow>, EpiError> {
    let mut out = Vec::with_capacity(curve.len());
    for o in curve.observations() {
        let predicted = params.predict(o.time);
        if !predicted.is_finite() {
            return Err(EpiError::invalid(format!(
                "{} prediction is not finite at t={} ({params})",
                params.kind().display_name(),
                o.time
            )));
        }
        out.push(PredictionRow {
            time: o.time,
            observed: o.intensity,
            predicted,
            residual: o.intensity - predicted,
        });
    }
    Ok(out)
}

/// CCC and RSE on the intensity scale; `r_squared` is supplied by the caller
/// because its definition depends on the fit path.
pub fn goodness_of_fit(
    predictions: &[PredictionRow],
    n_params: usize,
    r_squared: f64,
) -> Result<GoodnessOfFit, EpiError> {
    let predicted: Vec<f64> = predictions.iter().map(|p| p.predicted).collect();
    let observed: Vec<f64> = predictions.iter().map(|p| p.observed).collect();
    let residuals: Vec<f64> = predictions.iter().map(|p| p.residual).collect();
    let n = predictions.len();

    Ok(GoodnessOfFit {
        ccc: concordance_correlation(&predicted, &observed),
        rse: residual_standard_error(&residuals, n_params)?,
        r_squared,
        n,
        df: n.saturating_sub(n_params),
    })
}

/// Symmetric `estimate ± t·se` summary.
pub fn symmetric_estimate(name: &str, estimate: f64, std_error: Option<f64>, t_crit: f64) -> ParamEstimate {
    ParamEstimate {
        name: name.to_string(),
        estimate,
        std_error,
        ci_lower: std_error.map(|se| estimate - t_crit * se),
        ci_upper: std_error.map(|se| estimate + t_crit * se),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prediction_table_residuals_are_observed_minus_predicted() {
        let curve = ProgressCurve::from_pairs(&[0.0, 10.0], &[0.1, 0.5]).unwrap();
        let params = ModelParams::Exponential { y0: 0.1, r: 0.1 };
        let rows = prediction_table(&params, &curve).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].residual.abs() < 1e-12);
        let expected = 0.5 - 0.1 * 1.0f64.exp();
        assert!((rows[1].residual - expected).abs() < 1e-12);
    }

    #[test]
    fn symmetric_estimate_without_se_has_no_interval() {
        let e = symmetric_estimate("r", 0.2, None, 2.0);
        assert!(e.ci_lower.is_none() && e.ci_upper.is_none());
        let e = symmetric_estimate("r", 0.2, Some(0.05), 2.0);
        assert!((e.ci_lower.unwrap() - 0.1).abs() < 1e-12);
        assert!((e.ci_upper.unwrap() - 0.3).abs() < 1e-12);
    }
}
