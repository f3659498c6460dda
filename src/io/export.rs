//! Export fit, simulation and area results to CSV.
//!
//! The exports are meant to be easy to consume in spreadsheets or downstream scripts.
//! Each table has a `write_*` function over any `io::Write` and a `*_csv`
//! wrapper that creates the file.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::domain::{AreaRow, ParamEstimate, SimulatedCurve};
use crate::error::AppError;
use crate::fit::MultiFit;

const PARAM_NAMES: [&str; 3] = ["y0", "r", "K"];

fn create(path: &Path, what: &str) -> Result<File, AppError> {
    File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create {what} CSV '{}': {e}", path.display())))
}

fn csv_err(e: csv::Error) -> AppError {
    AppError::new(2, format!("Failed to write export CSV: {e}"))
}

fn opt(v: Option<f64>) -> String {
    v.map(|v| format!("{v:.10}")).unwrap_or_default()
}

/// One row per (stratum, model): estimates with SE/CI, then fit quality.
pub fn write_params<W: Write>(writer: W, fits: &MultiFit) -> Result<(), AppError> {
    let mut w = csv::Writer::from_writer(writer);

    let mut header = vec!["stratum".to_string(), "model".to_string(), "method".to_string()];
    for name in PARAM_NAMES {
        for suffix in ["", "_se", "_lower", "_upper"] {
            header.push(format!("{name}{suffix}"));
        }
    }
    header.extend(["ccc", "rse", "r_squared", "n", "df", "iterations"].map(String::from));
    w.write_record(&header).map_err(csv_err)?;

    for (stratum, fit) in fits.iter() {
        let mut row = vec![
            stratum.to_string(),
            fit.model.display_name().to_lowercase(),
            format!("{:?}", fit.method).to_lowercase(),
        ];
        for name in PARAM_NAMES {
            match fit.estimate(name) {
                Some(ParamEstimate {
                    estimate,
                    std_error,
                    ci_lower,
                    ci_upper,
                    ..
                }) => {
                    row.push(format!("{estimate:.10}"));
                    row.push(opt(*std_error));
                    row.push(opt(*ci_lower));
                    row.push(opt(*ci_upper));
                }
                // Fixed K is reported without uncertainty.
                None if name == "K" => {
                    row.push(opt(fit.params.k()));
                    row.extend(std::iter::repeat(String::new()).take(3));
                }
                None => row.extend(std::iter::repeat(String::new()).take(4)),
            }
        }
        let q = &fit.quality;
        row.push(format!("{:.10}", q.ccc));
        row.push(format!("{:.10}", q.rse));
        row.push(format!("{:.10}", q.r_squared));
        row.push(q.n.to_string());
        row.push(q.df.to_string());
        row.push(fit.iterations.map(|i| i.to_string()).unwrap_or_default());
        w.write_record(&row).map_err(csv_err)?;
    }
    w.flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush export CSV: {e}")))
}

pub fn write_params_csv(path: &Path, fits: &MultiFit) -> Result<(), AppError> {
    write_params(create(path, "parameter")?, fits)
}

/// Observed vs predicted values for every successful fit.
pub fn write_predictions<W: Write>(writer: W, fits: &MultiFit) -> Result<(), AppError> {
    let mut w = csv::Writer::from_writer(writer);
    w.write_record(["stratum", "model", "time", "observed", "predicted", "residual"])
        .map_err(csv_err)?;
    for (stratum, fit) in fits.iter() {
        for p in &fit.predictions {
            w.write_record([
                stratum.to_string(),
                fit.model.display_name().to_lowercase(),
                p.time.to_string(),
                format!("{:.10}", p.observed),
                format!("{:.10}", p.predicted),
                format!("{:.10}", p.residual),
            ])
            .map_err(csv_err)?;
        }
    }
    w.flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush export CSV: {e}")))
}

pub fn write_predictions_csv(path: &Path, fits: &MultiFit) -> Result<(), AppError> {
    write_predictions(create(path, "prediction")?, fits)
}

/// Simulated epidemic in long format.
pub fn write_simulated<W: Write>(writer: W, sim: &SimulatedCurve) -> Result<(), AppError> {
    let mut w = csv::Writer::from_writer(writer);
    w.write_record(["replicate", "time", "y", "random_y"]).map_err(csv_err)?;
    for p in &sim.points {
        w.write_record([
            p.replicate.to_string(),
            p.time.to_string(),
            format!("{:.10}", p.y),
            format!("{:.10}", p.random_y),
        ])
        .map_err(csv_err)?;
    }
    w.flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush export CSV: {e}")))
}

pub fn write_simulated_csv(path: &Path, sim: &SimulatedCurve) -> Result<(), AppError> {
    write_simulated(create(path, "simulation")?, sim)
}

/// Area table, serialized through serde.
pub fn write_areas<W: Write>(writer: W, rows: &[AreaRow]) -> Result<(), AppError> {
    let mut w = csv::Writer::from_writer(writer);
    for row in rows {
        w.serialize(row).map_err(csv_err)?;
    }
    w.flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush export CSV: {e}")))
}

pub fn write_areas_csv(path: &Path, rows: &[AreaRow]) -> Result<(), AppError> {
    write_areas(create(path, "area")?, rows)
}
