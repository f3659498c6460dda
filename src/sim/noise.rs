//! Mean-preserving Beta noise around a deterministic intensity.
//!
//! For a mean `m ∈ (0,1)` and dispersion `alpha > 0` we draw
//!
//! ```text
//! X ~ Beta(m·φ, (1 - m)·φ),   φ = 1 / alpha
//! ```
//!
//! so `E[X] = m` and `Var[X] = m(1 - m) · alpha / (1 + alpha)`. `alpha = 0`
//! means no noise. Means on or outside the unit interval degenerate to the
//! nearest boundary.

use rand::Rng;
use rand_distr::{Beta, Distribution};

use crate::error::EpiError;

/// Draw a noisy intensity with mean `mean`.
pub fn noisy_intensity<R: Rng + ?Sized>(rng: &mut R, mean: f64, alpha: f64) -> Result<f64, EpiError> {
    if !(alpha.is_finite() && alpha >= 0.0) {
        return Err(EpiError::invalid(format!("noise alpha must be finite and >= 0, got {alpha}")));
    }
    if alpha == 0.0 {
        return Ok(mean);
    }
    if mean <= 0.0 {
        return Ok(0.0);
    }
    if mean >= 1.0 {
        return Ok(1.0);
    }

    let phi = 1.0 / alpha;
    let beta = Beta::new(mean * phi, (1.0 - mean) * phi)
        .map_err(|e| EpiError::invalid(format!("noise distribution error: {e}")))?;
    Ok(beta.sample(rng).clamp(0.0, 1.0))
}
