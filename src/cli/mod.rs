//! Command-line parsing for the disease progress curve toolkit.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the modeling/math code.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::{FitMethod, IntensityScale, ModelKind, RankRule};
use crate::fit::{DEFAULT_CONFIDENCE, DEFAULT_MAX_ITERATIONS};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "epi", version, about = "Plant disease progress curves: fit, simulate, and measure")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit progress models to every stratum of a CSV table and rank them.
    Fit(FitArgs),
    /// Compute AUDPC/AUDPS for every (stratum, replicate) curve.
    Area(AreaArgs),
    /// Generate a synthetic epidemic from model parameters.
    Simulate(SimulateArgs),
}

/// Where the assessment table lives and how to read it.
#[derive(Debug, Args, Clone)]
pub struct InputArgs {
    /// Long-format CSV (one row per assessment).
    #[arg(short = 'i', long, value_name = "CSV")]
    pub input: PathBuf,

    /// Time column name.
    #[arg(long, default_value = "time")]
    pub time_col: String,

    /// Intensity column name.
    #[arg(long, default_value = "intensity")]
    pub intensity_col: String,

    /// Replicate column name (ignored when absent from the table).
    #[arg(long, default_value = "rep")]
    pub replicate_col: String,

    /// Stratum column(s); values are joined with `/`.
    #[arg(short = 's', long = "stratum", value_delimiter = ',')]
    pub strata: Vec<String>,

    /// Scale of the intensity column.
    #[arg(long, value_enum, default_value_t = IntensityScale::Proportion)]
    pub scale: IntensityScale,

    /// Accept intensities above 1 (counts, lesion sizes).
    #[arg(long)]
    pub unbounded: bool,
}

#[derive(Debug, Args, Clone)]
pub struct FitArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Model(s) to fit (default: all four).
    #[arg(short = 'm', long = "model", value_enum, value_delimiter = ',')]
    pub models: Vec<ModelKind>,

    /// Estimation method.
    #[arg(long, value_enum, default_value_t = FitMethod::Linear)]
    pub method: FitMethod,

    /// Estimate the asymptote K for logistic/Gompertz (nonlinear only).
    #[arg(long)]
    pub estimate_k: bool,

    /// Use the linear fit when a nonlinear fit does not converge.
    #[arg(long)]
    pub fallback_linear: bool,

    /// Iteration budget of the nonlinear solver.
    #[arg(long, default_value_t = DEFAULT_MAX_ITERATIONS)]
    pub max_iter: usize,

    /// Confidence level of parameter intervals.
    #[arg(long, default_value_t = DEFAULT_CONFIDENCE)]
    pub confidence: f64,

    /// Rule used to rank the models of each stratum.
    #[arg(long, value_enum, default_value_t = RankRule::Rse)]
    pub rank_by: RankRule,

    /// Render an ASCII plot of the best model per stratum.
    #[arg(long)]
    pub plot: bool,

    #[command(flatten)]
    pub plot_size: PlotSizeArgs,

    /// Export the parameter table to CSV.
    #[arg(long)]
    pub export_params: Option<PathBuf>,

    /// Export observed vs predicted values to CSV.
    #[arg(long)]
    pub export_predictions: Option<PathBuf>,

    /// Export every fit (with estimates and predictions) to JSON.
    #[arg(long)]
    pub export_json: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct AreaArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Export the area table to CSV.
    #[arg(long)]
    pub export: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct SimulateArgs {
    /// Model to simulate.
    #[arg(short = 'm', long, value_enum)]
    pub model: ModelKind,

    /// Initial intensity.
    #[arg(long)]
    pub y0: f64,

    /// Apparent infection rate.
    #[arg(short = 'r', long)]
    pub rate: f64,

    /// Asymptote (logistic/Gompertz only).
    #[arg(short = 'k', long, default_value_t = 1.0)]
    pub k: f64,

    /// Time step between assessments.
    #[arg(long, default_value_t = 1.0)]
    pub dt: f64,

    /// Number of assessments per replicate.
    #[arg(long, default_value_t = 50)]
    pub steps: usize,

    /// Number of replicates.
    #[arg(long, default_value_t = 1)]
    pub replicates: usize,

    /// Beta noise dispersion (0 = no noise).
    #[arg(long, default_value_t = 0.0)]
    pub alpha: f64,

    /// Random seed.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Disable the terminal plot.
    #[arg(long)]
    pub no_plot: bool,

    #[command(flatten)]
    pub plot_size: PlotSizeArgs,

    /// Export the simulated curve to CSV.
    #[arg(long)]
    pub export: Option<PathBuf>,
}

#[derive(Debug, Args, Clone, Copy)]
pub struct PlotSizeArgs {
    /// Plot width (columns).
    #[arg(long, default_value_t = 80)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 20)]
    pub height: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn fit_parses_models_and_strata() {
        let cli = Cli::parse_from([
            "epi", "fit", "-i", "data.csv", "-s", "irr,cv", "-m", "logistic,gompertz", "--method",
            "nonlinear", "--estimate-k", "--rank-by", "r2",
        ]);
        let Command::Fit(args) = cli.command else {
            panic!("expected fit");
        };
        assert_eq!(args.input.strata, vec!["irr", "cv"]);
        assert_eq!(args.models, vec![ModelKind::Logistic, ModelKind::Gompertz]);
        assert_eq!(args.method, FitMethod::Nonlinear);
        assert!(args.estimate_k);
        assert_eq!(args.rank_by, RankRule::RSquared);
        assert_eq!(args.max_iter, DEFAULT_MAX_ITERATIONS);
    }

    #[test]
    fn simulate_parses_parameters() {
        let cli = Cli::parse_from([
            "epi", "simulate", "-m", "gompertz", "--y0", "0.01", "-r", "0.1", "--steps", "10",
            "--alpha", "0.2", "--seed", "7",
        ]);
        let Command::Simulate(args) = cli.command else {
            panic!("expected simulate");
        };
        assert_eq!(args.model, ModelKind::Gompertz);
        assert_eq!(args.k, 1.0);
        assert_eq!(args.steps, 10);
        assert_eq!(args.seed, 7);
    }
}
