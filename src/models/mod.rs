//! Disease progress model implementations.
//!
//! Models are implemented as small, pure functions so that fitting/simulation
//! code can stay generic over the model family.

pub mod model;

pub use model::*;
