//! External and synthetic data sources.
//!
//! - [`bls`]: BLS public API client (CPI-U and state labor series)
//! - [`cpi`]: annual CPI table for constant-dollar restatement
//! - [`sample`]: seeded synthetic survey, cohort and offline geocoder

pub mod bls;
pub mod cpi;
pub mod sample;

pub use bls::{
    BlsClient, BlsConfig, CPI_U_SERIES, LausMeasure, SeriesPoint, TimeSeries, employment_series_id,
};
pub use cpi::CpiTable;
pub use sample::{
    DirectoryGeocoder, Participant, SyntheticCohort, SyntheticConfig, generate_cohort,
    generate_survey,
};
