//! Input/output helpers.
//!
//! - CSV ingest + validation (`ingest`)
//! - earnings-model coefficient JSON read/write (`coefficients`)
//! - result exports to CSV (`export`)

pub mod coefficients;
pub mod export;
pub mod ingest;

pub use coefficients::*;
pub use export::*;
pub use ingest::*;
