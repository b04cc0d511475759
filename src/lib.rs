//! `roi-equity` library crate.
//!
//! The binary (`roi`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - the decomposer, earnings model and SES resolver are reusable on their own
//! - code stays easy to navigate as the project grows

pub mod analysis;
pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod earnings;
pub mod equity;
pub mod error;
pub mod io;
pub mod logging;
pub mod math;
pub mod outcomes;
pub mod report;
pub mod ses;
