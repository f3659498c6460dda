//! Error types.
//!
//! - `EpiError` is what the modeling library returns. Each variant is one of the
//!   failure kinds a caller can act on (e.g. fall back to a linear fit when a
//!   nonlinear fit does not converge).
//! - `AppError` is what the `epi` binary reports: a message plus a process exit code.

use thiserror::Error;

use crate::domain::{ModelKind, ModelParams};

/// Failures raised by the fitting, simulation and area routines.
#[derive(Debug, Clone, Error)]
pub enum EpiError {
    /// Fewer observations than the model or metric needs.
    #[error("insufficient data for {context}: need at least {needed} points, got {got}")]
    InsufficientData {
        needed: usize,
        got: usize,
        context: String,
    },

    /// A parameter or option is outside its domain (e.g. `y0 ∉ (0,1)`, `K <= y0`).
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Nonlinear least squares exhausted its iteration budget.
    #[error("{} fit did not converge after {iterations} iterations (last iterate: {last})", model.display_name())]
    NoConvergence {
        model: ModelKind,
        iterations: usize,
        last: ModelParams,
    },

    /// An intensity sits on a singularity of the linearizing transform and
    /// clamping was disabled.
    #[error("intensity {intensity} is a singular point of the {} transform", model.display_name())]
    DegenerateTransform { model: ModelKind, intensity: f64 },
}

impl EpiError {
    pub fn insufficient(needed: usize, got: usize, context: impl Into<String>) -> Self {
        EpiError::InsufficientData {
            needed,
            got,
            context: context.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        EpiError::InvalidParameter(message.into())
    }
}

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

/// Exit codes: 2 = invalid input, 3 = insufficient data, 4 = numerical failure.
impl From<EpiError> for AppError {
    fn from(err: EpiError) -> Self {
        let code = match &err {
            EpiError::InvalidParameter(_) => 2,
            EpiError::InsufficientData { .. } => 3,
            EpiError::NoConvergence { .. } | EpiError::DegenerateTransform { .. } => 4,
        };
        AppError::new(code, err.to_string())
    }
}
