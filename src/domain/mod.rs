//! Domain types used throughout the library.
//!
//! This module defines:
//!
//! - observations and progress curves (`Observation`, `ProgressCurve`, `StratumKey`)
//! - model families and parameters (`ModelKind`, `ModelParams`)
//! - fit / simulation / area outputs (`FitResult`, `SimulatedCurve`, `AreaRow`)
//! - run configuration assembled from CLI flags

pub mod types;

pub use types::*;
