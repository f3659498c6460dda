//! Synthetic epidemics from model parameters.
//!
//! Each replicate evaluates the model deterministically on the grid
//! `t = 0, dt, 2·dt, …, (N-1)·dt` and perturbs every point with Beta noise.
//! Randomness comes from a `StdRng` seeded from `SimOptions::seed`, so the same
//! options always reproduce the same curve.

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::domain::{ModelParams, SimulatedCurve, SimulatedPoint};
use crate::error::EpiError;
use crate::sim::noise::noisy_intensity;

/// Grid, replication and noise settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimOptions {
    pub dt: f64,
    pub n_steps: usize,
    pub n_replicates: usize,
    /// Beta dispersion; 0 disables noise.
    pub noise_alpha: f64,
    pub seed: u64,
}

/// Simulate `n_replicates` noisy copies of the curve defined by `params`.
///
/// Replicates are numbered from 1. Points are ordered by replicate, then time.
pub fn simulate(params: &ModelParams, opts: &SimOptions) -> Result<SimulatedCurve, EpiError> {
    params.validate()?;
    if !(opts.dt.is_finite() && opts.dt > 0.0) {
        return Err(EpiError::invalid(format!("time step must be finite and > 0, got {}", opts.dt)));
    }
    if opts.n_steps == 0 {
        return Err(EpiError::invalid("n_steps must be >= 1"));
    }
    if opts.n_replicates == 0 {
        return Err(EpiError::invalid("n_replicates must be >= 1"));
    }
    if !(opts.noise_alpha.is_finite() && opts.noise_alpha >= 0.0) {
        return Err(EpiError::invalid(format!(
            "noise alpha must be finite and >= 0, got {}",
            opts.noise_alpha
        )));
    }

    let deterministic: Vec<(f64, f64)> = (0..opts.n_steps)
        .map(|i| {
            let t = i as f64 * opts.dt;
            (t, params.predict(t))
        })
        .collect();

    let mut rng = StdRng::seed_from_u64(opts.seed);
    let mut points = Vec::with_capacity(opts.n_steps * opts.n_replicates);
    for replicate in 1..=opts.n_replicates {
        for &(time, y) in &deterministic {
            let random_y = noisy_intensity(&mut rng, y, opts.noise_alpha)?;
            points.push(SimulatedPoint {
                replicate,
                time,
                y,
                random_y,
            });
        }
    }

    Ok(SimulatedCurve {
        params: *params,
        points,
    })
}
