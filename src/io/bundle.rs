//! Read/write fit bundle JSON files.
//!
//! A fit bundle is the portable record of an `epi fit` run:
//! - run metadata (method, confidence, whether K was estimated)
//! - every successful fit, grouped by stratum
//! - the cells that failed, with their error message

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::{FitMethod, FitResult, ModelKind, StratumKey};
use crate::error::AppError;
use crate::fit::MultiFit;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitBundle {
    pub tool: String,
    pub method: FitMethod,
    pub confidence: f64,
    pub estimate_k: bool,
    pub strata: BTreeMap<StratumKey, Vec<FitResult>>,
    pub failures: Vec<FailedCell>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedCell {
    pub stratum: StratumKey,
    pub model: ModelKind,
    pub error: String,
}

impl FitBundle {
    pub fn from_multi(fits: &MultiFit, method: FitMethod, confidence: f64, estimate_k: bool) -> Self {
        let strata = fits
            .fits
            .iter()
            .map(|(stratum, models)| (stratum.clone(), models.values().cloned().collect()))
            .collect();
        let failures = fits
            .failures
            .iter()
            .map(|f| FailedCell {
                stratum: f.stratum.clone(),
                model: f.model,
                error: f.error.to_string(),
            })
            .collect();
        Self {
            tool: "epi".to_string(),
            method,
            confidence,
            estimate_k,
            strata,
            failures,
        }
    }
}

pub fn write_bundle<W: Write>(writer: W, bundle: &FitBundle) -> Result<(), AppError> {
    serde_json::to_writer_pretty(writer, bundle)
        .map_err(|e| AppError::new(2, format!("Failed to write fit JSON: {e}")))
}

pub fn read_bundle<R: Read>(reader: R) -> Result<FitBundle, AppError> {
    serde_json::from_reader(reader).map_err(|e| AppError::new(2, format!("Invalid fit JSON: {e}")))
}

/// Write a fit bundle JSON file.
pub fn write_bundle_json(path: &Path, bundle: &FitBundle) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create fit JSON '{}': {e}", path.display())))?;
    write_bundle(file, bundle)
}
