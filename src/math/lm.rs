//! Levenberg–Marquardt nonlinear least squares.
//!
//! Minimizes `Σ r_i(θ)²` with `r_i = y_i - f(t_i; θ)`. Each iteration solves
//!
//! ```text
//! (JᵀJ + λ·diag(JᵀJ)) δ = Jᵀ r
//! ```
//!
//! where `J` is the Jacobian of `f`. Steps that increase the SSE or leave the
//! admissible region are rejected and `λ` grows geometrically. Accepted steps
//! rescale `λ` by the gain ratio ρ (actual over predicted SSE decrease) with
//! Nielsen's factor `max(1/3, 1 - (2ρ - 1)³)`: a step that matches the local
//! quadratic model cuts damping threefold, a poor one doubles it. The iteration
//! count is hard-capped so a pathological curve cannot spin.

use nalgebra::{DMatrix, DVector};

const LAMBDA_INIT: f64 = 1e-3;
const LAMBDA_MIN: f64 = 1e-12;
const LAMBDA_MAX: f64 = 1e16;
/// SSE below which the fit is exact to working precision.
const SSE_FLOOR: f64 = 1e-24;
/// Largest `|cos|` between the residual and a Jacobian column at a stationary point.
const STATIONARY_COSINE: f64 = 1e-6;

/// Stopping rules.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LmSettings {
    pub max_iterations: usize,
    /// Relative SSE decrease below which we stop, provided the step is also
    /// relatively this small or the gradient vanishes.
    pub tolerance: f64,
}

/// Final state of a solve (converged or not).
#[derive(Debug, Clone)]
pub struct LmOutcome {
    pub params: DVector<f64>,
    pub sse: f64,
    pub iterations: usize,
    pub converged: bool,
    /// Jacobian of the model at `params`.
    pub jacobian: DMatrix<f64>,
}

/// Run Levenberg–Marquardt from `initial`.
///
/// `eval` returns the residual vector and the model Jacobian at θ;
/// `admissible` rejects parameter vectors outside the model's domain. The
/// caller guarantees `initial` is admissible.
pub fn levenberg_marquardt<E, A>(
    initial: DVector<f64>,
    settings: &LmSettings,
    eval: E,
    admissible: A,
) -> LmOutcome
where
    E: Fn(&DVector<f64>) -> (DVector<f64>, DMatrix<f64>),
    A: Fn(&DVector<f64>) -> bool,
{
    let p = initial.len();
    let mut theta = initial;
    let (mut resid, mut jac) = eval(&theta);
    let mut sse = resid.norm_squared();
    let mut lambda = LAMBDA_INIT;
    let mut growth = 2.0;
    let tol = settings.tolerance;

    let done = |theta: DVector<f64>, sse: f64, jac: DMatrix<f64>, iterations: usize, converged: bool| LmOutcome {
        params: theta,
        sse,
        iterations,
        converged,
        jacobian: jac,
    };

    if sse <= SSE_FLOOR {
        return done(theta, sse, jac, 0, true);
    }

    for iter in 1..=settings.max_iterations {
        let jtj = jac.transpose() * &jac;
        let grad = jac.transpose() * &resid;
        let scale = DVector::from_fn(p, |i, _| jtj[(i, i)].max(1e-12));

        let mut damped = jtj;
        for i in 0..p {
            damped[(i, i)] += lambda * scale[i];
        }

        let step = damped.cholesky().map(|c| c.solve(&grad));
        let candidate = step.as_ref().map(|s| &theta + s);

        // Gain ratio of the accepted step, if any.
        let gain = match (&step, candidate) {
            (Some(step), Some(candidate))
                if candidate.iter().all(|v| v.is_finite()) && admissible(&candidate) =>
            {
                let (r_new, j_new) = eval(&candidate);
                let sse_new = r_new.norm_squared();
                if sse_new.is_finite() && sse_new <= sse {
                    let predicted = step.dot(&(step.component_mul(&scale) * lambda + &grad));
                    let gain = if predicted > 0.0 { (sse - sse_new) / predicted } else { 0.0 };
                    let small_decrease = sse - sse_new <= tol * sse;
                    let small_step = step.norm() <= tol * (theta.norm() + tol);
                    theta = candidate;
                    resid = r_new;
                    jac = j_new;
                    sse = sse_new;

                    let flat = small_step || gradient_cosine(&jac, &resid) <= STATIONARY_COSINE;
                    if sse <= SSE_FLOOR || (small_decrease && flat) {
                        return done(theta, sse, jac, iter, true);
                    }
                    Some(gain)
                } else {
                    None
                }
            }
            _ => None,
        };

        match gain {
            Some(gain) => {
                lambda = (lambda * (1.0 - (2.0 * gain - 1.0).powi(3)).max(1.0 / 3.0)).max(LAMBDA_MIN);
                growth = 2.0;
            }
            None => {
                lambda *= growth;
                growth *= 2.0;
                if lambda > LAMBDA_MAX {
                    // No step improves the SSE: stationary only if the gradient vanished.
                    let stationary = gradient_cosine(&jac, &resid) <= STATIONARY_COSINE;
                    return done(theta, sse, jac, iter, stationary);
                }
            }
        }
    }

    let iterations = settings.max_iterations;
    done(theta, sse, jac, iterations, false)
}

/// Largest `|cos|` of the angle between the residual and a Jacobian column.
///
/// Scale-free first-order optimality: zero at a stationary point whatever the
/// units of θ or y.
fn gradient_cosine(jac: &DMatrix<f64>, resid: &DVector<f64>) -> f64 {
    let r_norm = resid.norm();
    if r_norm == 0.0 {
        return 0.0;
    }
    jac.column_iter()
        .map(|col| {
            let c_norm = col.norm();
            if c_norm == 0.0 { 0.0 } else { col.dot(resid).abs() / (c_norm * r_norm) }
        })
        .fold(0.0, f64::max)
}
