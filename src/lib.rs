//! `epi-curves` library crate.
//!
//! Plant disease progress curves: fit exponential, monomolecular, logistic and
//! Gompertz models, simulate noisy epidemics, and measure epidemic area
//! (AUDPC/AUDPS).
//!
//! The binary (`epi`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - modules are reusable from other tools

pub mod app;
pub mod area;
pub mod cli;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod plot;
pub mod report;
pub mod sim;
