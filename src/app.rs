//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - initializes logging
//! - parses CLI arguments
//! - runs fitting, area or simulation pipelines
//! - prints reports/plots
//! - writes optional exports

use std::sync::Once;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::cli::{AreaArgs, Command, FitArgs, InputArgs, SimulateArgs};
use crate::domain::{AreaConfig, FitConfig, InputSpec, IntensityBounds, ModelKind, ModelParams, SimConfig};
use crate::error::AppError;
use crate::report::rank_fits;

pub mod pipeline;

/// Environment variable holding the log filter (e.g. `EPI_LOG=epi_curves=debug`).
pub const LOG_ENV: &str = "EPI_LOG";

static INIT: Once = Once::new();

/// Install the stderr log subscriber. Safe to call more than once.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("epi_curves=info"));

        let _ = tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
            .with(filter)
            .try_init();
    });
}

/// Entry point for the `epi` binary.
pub fn run() -> Result<(), AppError> {
    init_tracing();
    let cli = crate::cli::Cli::parse();

    match cli.command {
        Command::Fit(args) => handle_fit(&args),
        Command::Area(args) => handle_area(&args),
        Command::Simulate(args) => handle_simulate(&args),
    }
}

fn handle_fit(args: &FitArgs) -> Result<(), AppError> {
    let config = fit_config_from_args(args);
    let run = pipeline::run_fit(&config)?;

    println!(
        "{}",
        crate::report::format_fit_summary(&run.ingest, &run.fits, &config)
    );

    for (stratum, models) in &run.fits.fits {
        let Some(best) = rank_fits(models, config.rank_by).into_iter().next() else {
            continue;
        };
        println!("Best for {stratum}: {}", crate::report::format_estimates(best));

        if config.plot {
            if let Some(curve) = run.curves.get(stratum) {
                let plot = crate::plot::render_fit_plot(curve, best, config.plot_width, config.plot_height);
                println!("{plot}");
            }
        }
    }

    // Optional exports.
    if let Some(path) = &config.export_params {
        crate::io::write_params_csv(path, &run.fits)?;
        info!(path = %path.display(), "wrote parameter table");
    }
    if let Some(path) = &config.export_predictions {
        crate::io::write_predictions_csv(path, &run.fits)?;
        info!(path = %path.display(), "wrote prediction table");
    }
    if let Some(path) = &config.export_json {
        let bundle = crate::io::FitBundle::from_multi(&run.fits, config.method, config.confidence, config.estimate_k);
        crate::io::write_bundle_json(path, &bundle)?;
        info!(path = %path.display(), "wrote fit bundle");
    }

    Ok(())
}

fn handle_area(args: &AreaArgs) -> Result<(), AppError> {
    let config = area_config_from_args(args);
    let run = pipeline::run_area(&config)?;

    println!("{}", crate::report::format_area_table(&run.rows));

    if let Some(path) = &config.export {
        crate::io::write_areas_csv(path, &run.rows)?;
        info!(path = %path.display(), "wrote area table");
    }
    Ok(())
}

fn handle_simulate(args: &SimulateArgs) -> Result<(), AppError> {
    let config = sim_config_from_args(args);
    let sim = pipeline::run_simulation(&config)?;

    println!("{}", crate::report::format_simulation_summary(&sim, &config));
    if config.plot {
        let plot = crate::plot::render_simulation_plot(&sim, config.plot_width, config.plot_height);
        println!("{plot}");
    }

    if let Some(path) = &config.export {
        crate::io::write_simulated_csv(path, &sim)?;
        info!(path = %path.display(), "wrote simulated curve");
    }
    Ok(())
}

pub fn input_spec_from_args(args: &InputArgs) -> InputSpec {
    InputSpec {
        path: args.input.clone(),
        time_col: args.time_col.clone(),
        intensity_col: args.intensity_col.clone(),
        replicate_col: Some(args.replicate_col.clone()).filter(|c| !c.is_empty()),
        stratum_cols: args.strata.clone(),
        scale: args.scale,
        bounds: if args.unbounded {
            IntensityBounds::Unbounded
        } else {
            IntensityBounds::Unit
        },
    }
}

pub fn fit_config_from_args(args: &FitArgs) -> FitConfig {
    let models = if args.models.is_empty() {
        ModelKind::ALL.to_vec()
    } else {
        args.models.clone()
    };
    FitConfig {
        input: input_spec_from_args(&args.input),
        models,
        method: args.method,
        estimate_k: args.estimate_k,
        fallback_linear: args.fallback_linear,
        max_iterations: args.max_iter,
        confidence: args.confidence,
        rank_by: args.rank_by,
        plot: args.plot,
        plot_width: args.plot_size.width,
        plot_height: args.plot_size.height,
        export_params: args.export_params.clone(),
        export_predictions: args.export_predictions.clone(),
        export_json: args.export_json.clone(),
    }
}

pub fn area_config_from_args(args: &AreaArgs) -> AreaConfig {
    AreaConfig {
        input: input_spec_from_args(&args.input),
        export: args.export.clone(),
    }
}

pub fn sim_config_from_args(args: &SimulateArgs) -> SimConfig {
    SimConfig {
        params: ModelParams::new(args.model, args.y0, args.rate, Some(args.k)),
        dt: args.dt,
        n_steps: args.steps,
        n_replicates: args.replicates,
        noise_alpha: args.alpha,
        seed: args.seed,
        plot: !args.no_plot,
        plot_width: args.plot_size.width,
        plot_height: args.plot_size.height,
        export: args.export.clone(),
    }
}
