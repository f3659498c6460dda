//! Epidemic simulation.
//!
//! - deterministic model evaluation on a regular time grid (`simulate`)
//! - Beta-distributed observation noise (`noise`)

pub mod noise;
pub mod simulate;

pub use noise::*;
pub use simulate::*;
