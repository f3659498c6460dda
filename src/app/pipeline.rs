//! Shared pipeline logic behind the `fit`, `area` and `simulate` commands.
//!
//! Keeping this in one place avoids mixing the core workflow with printing:
//! ingest -> group into curves -> fit / measure / simulate
//!
//! The command handlers in `app` then focus on presentation and exports.

use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::area::area_table;
use crate::domain::{AreaConfig, AreaRow, FitConfig, ProgressCurve, SimConfig, SimulatedCurve, StratumKey};
use crate::error::AppError;
use crate::fit::{fit_multi, LinearOptions, MultiFit, MultiFitOptions, NonlinearOptions, DEFAULT_TOLERANCE};
use crate::io::ingest::{curves_by_replicate, curves_by_stratum, load_records, IngestedData};
use crate::sim::{simulate, SimOptions};

/// All computed outputs of a single `epi fit` run.
#[derive(Debug, Clone)]
pub struct FitRun {
    pub ingest: IngestedData,
    pub curves: BTreeMap<StratumKey, ProgressCurve>,
    pub fits: MultiFit,
}

/// All computed outputs of a single `epi area` run.
#[derive(Debug, Clone)]
pub struct AreaRun {
    pub ingest: IngestedData,
    pub rows: Vec<AreaRow>,
}

pub fn multi_fit_options(config: &FitConfig) -> MultiFitOptions {
    MultiFitOptions {
        method: config.method,
        estimate_k: config.estimate_k,
        fallback_linear: config.fallback_linear,
        linear: LinearOptions {
            clamp: true,
            confidence: config.confidence,
        },
        nonlinear: NonlinearOptions {
            max_iterations: config.max_iterations,
            tolerance: DEFAULT_TOLERANCE,
            confidence: config.confidence,
        },
    }
}

/// Execute the fitting pipeline and return the computed outputs.
pub fn run_fit(config: &FitConfig) -> Result<FitRun, AppError> {
    if !(config.confidence > 0.0 && config.confidence < 1.0) {
        return Err(AppError::new(
            2,
            format!("Confidence must lie in (0, 1), got {}", config.confidence),
        ));
    }
    if config.models.is_empty() {
        return Err(AppError::new(2, "No models selected."));
    }

    let ingest = load_records(&config.input)?;
    info!(
        rows = ingest.rows_used,
        strata = ingest.stats.n_strata,
        "loaded assessment table"
    );

    let curves = curves_by_stratum(&ingest.records, config.input.bounds)?;
    let fits = fit_multi(&curves, &config.models, &multi_fit_options(config));
    info!(
        fits = fits.iter().count(),
        failures = fits.failures.len(),
        "fitted strata"
    );

    if fits.fits.is_empty() {
        // Report the first cause; every cell failed.
        return Err(match fits.failures.first() {
            Some(f) => AppError::from(f.error.clone()),
            None => AppError::new(3, "No curves to fit."),
        });
    }

    Ok(FitRun { ingest, curves, fits })
}

/// Execute the area pipeline: one row per (stratum, replicate) curve.
pub fn run_area(config: &AreaConfig) -> Result<AreaRun, AppError> {
    let ingest = load_records(&config.input)?;
    let mut curves = curves_by_replicate(&ingest.records, config.input.bounds)?;

    curves.retain(|(stratum, replicate), curve| {
        let keep = curve.len() >= 2;
        if !keep {
            warn!(stratum = %stratum, replicate = %replicate, "single-assessment curve skipped");
        }
        keep
    });
    if curves.is_empty() {
        return Err(AppError::new(3, "No curve has at least two assessments."));
    }

    let rows = area_table(&curves)?;
    info!(curves = rows.len(), "computed epidemic areas");
    Ok(AreaRun { ingest, rows })
}

/// Execute a simulation run.
pub fn run_simulation(config: &SimConfig) -> Result<SimulatedCurve, AppError> {
    let opts = SimOptions {
        dt: config.dt,
        n_steps: config.n_steps,
        n_replicates: config.n_replicates,
        noise_alpha: config.noise_alpha,
        seed: config.seed,
    };
    let sim = simulate(&config.params, &opts)?;
    info!(points = sim.points.len(), seed = config.seed, "simulated epidemic");
    Ok(sim)
}
