//! Mathematical utilities: weighted least squares and fit diagnostics.

pub mod ols;

pub use ols::*;
