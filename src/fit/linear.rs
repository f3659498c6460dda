//! Linearized fits.
//!
//! Each model has a transform `v = g(y)` that makes the curve a straight line in
//! time (with the asymptote fixed at 1). We regress `v` on `t` by OLS and map
//! the intercept back through `g⁻¹` to obtain `y0`; the slope is `r`.
//!
//! Goodness-of-fit (CCC, RSE) is computed on the back-transformed predictions
//! against the original intensities; R² is the regression's own R² on the
//! transformed scale.

use tracing::debug;

use crate::domain::{FitMethod, FitResult, ModelKind, ModelParams, ParamEstimate, ProgressCurve};
use crate::error::EpiError;
use crate::fit::quality::{goodness_of_fit, prediction_table, symmetric_estimate};
use crate::math::{simple_regression, t_quantile};
use crate::models::{clamp_intensity, delinearize, delinearize_slope, linearize};

/// Default two-sided confidence level for parameter intervals.
pub const DEFAULT_CONFIDENCE: f64 = 0.95;

/// Options for the linearized fit path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearOptions {
    /// Clamp intensities into `[INTENSITY_EPS, 1 - INTENSITY_EPS]` before
    /// transforming. When disabled, a 0 or 1 raises `DegenerateTransform`.
    pub clamp: bool,
    pub confidence: f64,
}

impl Default for LinearOptions {
    fn default() -> Self {
        Self {
            clamp: true,
            confidence: DEFAULT_CONFIDENCE,
        }
    }
}

/// Fit `model` to `curve` by OLS on the linearized intensity.
pub fn fit_linear(curve: &ProgressCurve, model: ModelKind, opts: &LinearOptions) -> Result<FitResult, EpiError> {
    let n = curve.len();
    if n < 3 {
        return Err(EpiError::insufficient(
            3,
            n,
            format!("{} linear fit", model.display_name()),
        ));
    }

    let times = curve.times();
    let transformed = curve
        .observations()
        .iter()
        .map(|o| {
            let y = if opts.clamp {
                clamp_intensity(model, o.intensity)
            } else {
                o.intensity
            };
            linearize(model, y)
        })
        .collect::<Result<Vec<f64>, EpiError>>()?;

    let reg = simple_regression(&times, &transformed)?;
    let t_crit = t_quantile(reg.df, opts.confidence)?;

    let y0 = delinearize(model, reg.intercept);
    let params = ModelParams::new(model, y0, reg.slope, None);

    // y0 interval is the back-transformed intercept interval (g⁻¹ is increasing).
    let y0_estimate = ParamEstimate {
        name: "y0".to_string(),
        estimate: y0,
        std_error: Some(delinearize_slope(model, reg.intercept) * reg.se_intercept),
        ci_lower: Some(delinearize(model, reg.intercept - t_crit * reg.se_intercept)),
        ci_upper: Some(delinearize(model, reg.intercept + t_crit * reg.se_intercept)),
    };
    let r_estimate = symmetric_estimate("r", reg.slope, Some(reg.se_slope), t_crit);

    let predictions = prediction_table(&params, curve)?;
    let quality = goodness_of_fit(&predictions, 2, reg.r_squared)?;

    debug!(
        model = model.display_name(),
        n,
        y0,
        r = reg.slope,
        r_squared = reg.r_squared,
        "linear fit"
    );

    Ok(FitResult {
        model,
        method: FitMethod::Linear,
        params,
        estimates: vec![y0_estimate, r_estimate],
        quality,
        predictions,
        iterations: None,
    })
}
