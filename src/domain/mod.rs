//! Domain types used throughout the crate.
//!
//! This module defines:
//!
//! - the inequality method tag (`InequalityMethod`)
//! - partition keys (`GroupKey`)
//! - the in-memory tabular dataset (`Dataset`, `Column`) and its row view (`Observation`)

pub mod types;

pub use types::*;
