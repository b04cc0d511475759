//! Socioeconomic status (SES) resolution.
//!
//! - [`table`]: the deprivation-index lookup and quintile bands
//! - [`geocoder`]: the address → block-group contract and the Census client
//! - [`resolver`]: batch resolution with bounded concurrency, timeouts, retries
//!   and cancellation

pub mod cancel;
pub mod geocoder;
pub mod resolver;
pub mod table;

pub use cancel::CancellationToken;
pub use geocoder::{CensusGeocoder, GeocodeFailure, Geocoder, parse_geocoder_response};
pub use resolver::{
    AddressRecord, BatchResolution, CoverageReport, KnownUnitRecord, MAX_ATTEMPTS_LIMIT,
    MAX_BACKOFF, Resolution, ResolutionState, ResolvedRecord, ResolverConfig, SesResolver,
    UnresolvedReason,
};
pub use table::{DeprivationEntry, DeprivationIndex, GeoUnitId, SesBand, SesScore};
