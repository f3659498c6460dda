//! Model evaluation for the four disease progress laws.
//!
//! The fitter relies on three primitive operations:
//! - predict y(t) given parameters (for residuals, simulation, plots)
//! - the gradient of y(t) with respect to the free parameters (for Levenberg–Marquardt)
//! - a linearizing transform of intensity and its inverse (for the OLS path)
//!
//! These are implemented here for each model kind.

use crate::domain::{ModelKind, ModelParams};
use crate::error::EpiError;

/// Distance from the transform singularities at 0 and 1 used when clamping.
pub const INTENSITY_EPS: f64 = 1e-4;

impl ModelParams {
    /// Intensity at time `t`.
    pub fn predict(&self, t: f64) -> f64 {
        match *self {
            ModelParams::Exponential { y0, r } => y0 * (r * t).exp(),
            ModelParams::Monomolecular { y0, r } => 1.0 - (1.0 - y0) * (-r * t).exp(),
            ModelParams::Logistic { y0, r, k } => k / (1.0 + ((k - y0) / y0) * (-r * k * t).exp()),
            ModelParams::Gompertz { y0, r, k } => k * ((y0 / k).ln() * (-r * t).exp()).exp(),
        }
    }

    /// Partial derivatives of `predict(t)` with respect to `(y0, r[, K])`.
    ///
    /// When `with_k` is false the asymptote is treated as fixed and only two
    /// entries are written. `out` must hold at least that many entries.
    pub fn gradient(&self, t: f64, with_k: bool, out: &mut [f64]) {
        match *self {
            ModelParams::Exponential { y0, r } => {
                let e = (r * t).exp();
                out[0] = e;
                out[1] = t * y0 * e;
            }
            ModelParams::Monomolecular { y0, r } => {
                let e = (-r * t).exp();
                out[0] = e;
                out[1] = t * (1.0 - y0) * e;
            }
            ModelParams::Logistic { y0, r, k } => {
                let c = (k - y0) / y0;
                let e = (-r * k * t).exp();
                let d = 1.0 + c * e;
                let d2 = d * d;
                out[0] = k * k * e / (y0 * y0 * d2);
                out[1] = k * k * c * e * t / d2;
                if with_k {
                    out[2] = 1.0 / d - k * e * (1.0 / y0 - c * r * t) / d2;
                }
            }
            ModelParams::Gompertz { y0, r, k } => {
                let l = (y0 / k).ln();
                let g = (-r * t).exp();
                let inner = (l * g).exp();
                let y = k * inner;
                out[0] = y * g / y0;
                out[1] = -y * l * t * g;
                if with_k {
                    out[2] = inner * (1.0 - g);
                }
            }
        }
    }

    /// Point of inflection `(t, y)` for the sigmoid models.
    ///
    /// Logistic inflects at `y = K/2`, Gompertz at `y = K/e`. Exponential and
    /// monomolecular curves have none. `None` is also returned when the curve
    /// starts above its inflection level or `r <= 0`.
    pub fn inflection_point(&self) -> Option<(f64, f64)> {
        match *self {
            ModelParams::Logistic { y0, r, k } => {
                let y = k / 2.0;
                if r <= 0.0 || y0 >= y {
                    return None;
                }
                Some((((k - y0) / y0).ln() / (r * k), y))
            }
            ModelParams::Gompertz { y0, r, k } => {
                let y = k / std::f64::consts::E;
                if r <= 0.0 || y0 >= y {
                    return None;
                }
                Some(((-(y0 / k).ln()).ln() / r, y))
            }
            _ => None,
        }
    }
}

/// Move an intensity away from the singularities of `model`'s transform.
pub fn clamp_intensity(model: ModelKind, y: f64) -> f64 {
    match model {
        ModelKind::Exponential => y.max(INTENSITY_EPS),
        _ => y.clamp(INTENSITY_EPS, 1.0 - INTENSITY_EPS),
    }
}

/// Linearizing transform of intensity, such that `v(t) = v0 + r·t`
/// (with `K = 1` for the sigmoid models).
///
/// - exponential: `ln y`
/// - monomolecular: `ln(1 / (1 - y))`
/// - logistic: `ln(y / (1 - y))`
/// - Gompertz: `-ln(-ln y)`
///
/// Fails with `DegenerateTransform` when `y` sits on (or beyond) a singularity;
/// use `clamp_intensity` first to avoid that.
pub fn linearize(model: ModelKind, y: f64) -> Result<f64, EpiError> {
    let degenerate = || EpiError::DegenerateTransform { model, intensity: y };
    let upper_ok = model == ModelKind::Exponential || y < 1.0;
    if !(y.is_finite() && y > 0.0 && upper_ok) {
        return Err(degenerate());
    }
    let v = match model {
        ModelKind::Exponential => y.ln(),
        ModelKind::Monomolecular => -(-y).ln_1p(),
        ModelKind::Logistic => (y / (1.0 - y)).ln(),
        ModelKind::Gompertz => -(-y.ln()).ln(),
    };
    if v.is_finite() { Ok(v) } else { Err(degenerate()) }
}

/// Inverse of `linearize`.
pub fn delinearize(model: ModelKind, v: f64) -> f64 {
    match model {
        ModelKind::Exponential => v.exp(),
        ModelKind::Monomolecular => -(-v).exp_m1(),
        ModelKind::Logistic => 1.0 / (1.0 + (-v).exp()),
        ModelKind::Gompertz => (-(-v).exp()).exp(),
    }
}

/// Derivative of `delinearize` at `v` (used for delta-method standard errors).
pub fn delinearize_slope(model: ModelKind, v: f64) -> f64 {
    match model {
        ModelKind::Exponential => v.exp(),
        ModelKind::Monomolecular => (-v).exp(),
        ModelKind::Logistic => {
            let y = delinearize(model, v);
            y * (1.0 - y)
        }
        ModelKind::Gompertz => delinearize(model, v) * (-v).exp(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_params() -> Vec<ModelParams> {
        vec![
            ModelParams::Exponential { y0: 0.02, r: 0.1 },
            ModelParams::Monomolecular { y0: 0.05, r: 0.08 },
            ModelParams::Logistic { y0: 0.01, r: 0.25, k: 0.9 },
            ModelParams::Gompertz { y0: 0.01, r: 0.12, k: 0.85 },
        ]
    }

    #[test]
    fn predict_at_zero_is_y0() {
        for p in all_params() {
            assert!((p.predict(0.0) - p.y0()).abs() < 1e-12, "{p:?}");
        }
    }

    #[test]
    fn gradient_matches_finite_differences() {
        let h = 1e-7;
        for p in all_params() {
            let with_k = p.k().is_some();
            let n = if with_k { 3 } else { 2 };
            for &t in &[0.0, 3.0, 10.0, 25.0] {
                let mut g = [0.0; 3];
                p.gradient(t, with_k, &mut g);
                for j in 0..n {
                    let bump = |d: f64| {
                        let (mut y0, mut r, mut k) = (p.y0(), p.r(), p.k());
                        match j {
                            0 => y0 += d,
                            1 => r += d,
                            _ => k = k.map(|v| v + d),
                        }
                        ModelParams::new(p.kind(), y0, r, k).predict(t)
                    };
                    let fd = (bump(h) - bump(-h)) / (2.0 * h);
                    assert!(
                        (fd - g[j]).abs() < 1e-5 * (1.0 + fd.abs()),
                        "{:?} t={t} j={j}: analytic={} fd={fd}",
                        p.kind(),
                        g[j]
                    );
                }
            }
        }
    }

    #[test]
    fn monomolecular_increases_towards_one() {
        let p = ModelParams::Monomolecular { y0: 0.1, r: 0.2 };
        let mut prev = p.predict(0.0);
        for i in 1..200 {
            let y = p.predict(i as f64);
            assert!(y >= prev);
            assert!(y < 1.0 + 1e-15);
            prev = y;
        }
        assert!((1.0 - p.predict(500.0)).abs() < 1e-12);
    }

    #[test]
    fn inflection_levels_differ_between_logistic_and_gompertz() {
        let (y0, r, k) = (0.01, 0.2, 0.8);
        let logistic = ModelParams::Logistic { y0, r, k };
        let gompertz = ModelParams::Gompertz { y0, r, k };

        let (tl, yl) = logistic.inflection_point().unwrap();
        let (tg, yg) = gompertz.inflection_point().unwrap();
        assert!((yl - k / 2.0).abs() < 1e-12);
        assert!((yg - k / std::f64::consts::E).abs() < 1e-12);
        assert!((logistic.predict(tl) - yl).abs() < 1e-9);
        assert!((gompertz.predict(tg) - yg).abs() < 1e-9);
        assert!((tl - tg).abs() > 1e-3);

        // Second difference changes sign across the inflection time.
        for (p, t) in [(logistic, tl), (gompertz, tg)] {
            let h = 0.5;
            let curv = |x: f64| p.predict(x + h) - 2.0 * p.predict(x) + p.predict(x - h);
            assert!(curv(t - 2.0) > 0.0);
            assert!(curv(t + 2.0) < 0.0);
        }
    }

    #[test]
    fn transform_round_trips() {
        for model in ModelKind::ALL {
            for &y in &[0.01, 0.2, 0.5, 0.9] {
                let v = linearize(model, y).unwrap();
                assert!((delinearize(model, v) - y).abs() < 1e-12, "{model:?} y={y}");
            }
        }
    }

    #[test]
    fn transform_rejects_singularities_unless_clamped() {
        for model in ModelKind::ALL {
            assert!(matches!(
                linearize(model, 0.0),
                Err(EpiError::DegenerateTransform { .. })
            ));
            assert!(linearize(model, clamp_intensity(model, 0.0)).is_ok());
            assert!(linearize(model, clamp_intensity(model, 1.0)).is_ok());
        }
        assert!(linearize(ModelKind::Logistic, 1.0).is_err());
        assert!(linearize(ModelKind::Exponential, 1.0).is_ok());
    }

    #[test]
    fn delinearize_slope_matches_finite_difference() {
        let h = 1e-6;
        for model in ModelKind::ALL {
            let v = linearize(model, 0.3).unwrap();
            let fd = (delinearize(model, v + h) - delinearize(model, v - h)) / (2.0 * h);
            assert!((fd - delinearize_slope(model, v)).abs() < 1e-6, "{model:?}");
        }
    }
}
