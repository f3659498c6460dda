//! Epidemic area metrics (AUDPC / AUDPS).

pub mod metrics;

pub use metrics::*;
