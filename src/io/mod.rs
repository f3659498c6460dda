//! Input/output helpers.
//!
//! - CSV ingest + validation + grouping into curves (`ingest`)
//! - result exports to CSV (`export`)
//! - fit bundle JSON read/write (`bundle`)

pub mod bundle;
pub mod export;
pub mod ingest;

pub use bundle::*;
pub use export::*;
pub use ingest::*;
