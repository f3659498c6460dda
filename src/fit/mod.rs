//! Curve fitting.
//!
//! Responsibilities:
//!
//! - linearized OLS fits (`linear`)
//! - Levenberg–Marquardt fits on the raw intensity (`nonlinear`)
//! - independent fits across strata and models (`multi`)

pub mod linear;
pub mod multi;
pub mod nonlinear;
pub mod quality;

pub use linear::*;
pub use multi::*;
pub use nonlinear::*;
