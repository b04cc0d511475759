//! Read/write earnings-model coefficient JSON files.
//!
//! The coefficient file is the portable artifact produced by `roi fit` and
//! consumed by `roi premium`. The schema is [`EarningsModelCoefficients`];
//! files written by an incompatible version are rejected on read.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use tracing::info;

use crate::earnings::EarningsModelCoefficients;
use crate::error::RoiError;

/// Write a coefficient JSON file.
pub fn write_coefficients_json(
    path: &Path,
    coefficients: &EarningsModelCoefficients,
) -> Result<(), RoiError> {
    let file = File::create(path).map_err(|e| {
        RoiError::io(format!(
            "failed to create coefficients JSON '{}': {e}",
            path.display()
        ))
    })?;
    serde_json::to_writer_pretty(file, coefficients)
        .map_err(|e| RoiError::io(format!("failed to write coefficients JSON: {e}")))?;
    info!(path = %path.display(), "wrote earnings model coefficients");
    Ok(())
}

/// Read and validate a coefficient JSON file.
pub fn read_coefficients_json(path: &Path) -> Result<EarningsModelCoefficients, RoiError> {
    let file = File::open(path).map_err(|e| {
        RoiError::io(format!(
            "failed to open coefficients JSON '{}': {e}",
            path.display()
        ))
    })?;
    let coefficients: EarningsModelCoefficients = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| RoiError::invalid(format!("invalid coefficients JSON: {e}")))?;
    coefficients.validate()?;
    Ok(coefficients)
}
