//! Area under the disease progress curve (AUDPC) and stairs (AUDPS).
//!
//! AUDPC is the trapezoidal integral of intensity over time.
//!
//! AUDPS treats the observations as a right-continuous step function: each
//! value holds until the next assessment, and the last one holds for the mean
//! interval width `D / (n - 1)` with `D = t_last - t_first`. The stairs then
//! cover `D·n/(n-1)`, so the sum is rescaled by `(n - 1)/n` to cover `D`:
//!
//! ```text
//! AUDPS = (n-1)/n · [ Σ_{i<n} (t[i+1] - t[i])·y[i]  +  y[n]·D/(n-1) ]
//! ```
//!
//! With two assessments this coincides with AUDPC, and a flat curve `y = c`
//! gives `c·D` for both.

use std::collections::BTreeMap;

use crate::domain::{AreaRow, ProgressCurve, StratumKey};
use crate::error::EpiError;

fn require_points(curve: &ProgressCurve, metric: &str) -> Result<(), EpiError> {
    if curve.len() < 2 {
        return Err(EpiError::insufficient(2, curve.len(), metric));
    }
    Ok(())
}

/// Trapezoidal area under the progress curve.
pub fn audpc(curve: &ProgressCurve) -> Result<f64, EpiError> {
    require_points(curve, "AUDPC")?;
    let area = curve
        .observations()
        .windows(2)
        .map(|w| (w[1].time - w[0].time) * (w[0].intensity + w[1].intensity) / 2.0)
        .sum();
    Ok(area)
}

/// Span-normalised area under the progress stairs.
pub fn audps(curve: &ProgressCurve) -> Result<f64, EpiError> {
    require_points(curve, "AUDPS")?;
    let obs = curve.observations();
    let n = obs.len() as f64;

    let held: f64 = obs
        .windows(2)
        .map(|w| (w[1].time - w[0].time) * w[0].intensity)
        .sum();
    let last = obs[obs.len() - 1].intensity;
    let final_width = curve.span() / (n - 1.0);

    Ok((n - 1.0) / n * (held + last * final_width))
}

/// Express an area as a fraction of the maximum attainable (intensity 1 over
/// the curve's time span).
pub fn relative_area(area: f64, curve: &ProgressCurve) -> Result<f64, EpiError> {
    let span = curve.span();
    if !(span.is_finite() && span > 0.0) {
        return Err(EpiError::invalid("relative area needs a positive time span"));
    }
    Ok(area / span)
}

/// Absolute and relative AUDPC/AUDPS per (stratum, replicate) curve.
///
/// Curves with fewer than two assessments make the whole table fail; callers
/// decide whether to drop them beforehand.
pub fn area_table(curves: &BTreeMap<(StratumKey, String), ProgressCurve>) -> Result<Vec<AreaRow>, EpiError> {
    let mut rows = Vec::with_capacity(curves.len());
    for ((stratum, replicate), curve) in curves {
        let c = audpc(curve)?;
        let s = audps(curve)?;
        rows.push(AreaRow {
            stratum: stratum.clone(),
            replicate: replicate.clone(),
            n: curve.len(),
            audpc: c,
            audps: s,
            relative_audpc: relative_area(c, curve)?,
            relative_audps: relative_area(s, curve)?,
        });
    }
    Ok(rows)
}
