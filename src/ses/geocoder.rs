//! Geocoding contract and the Census geocoder client.
//!
//! The resolver only depends on [`Geocoder`]: an address goes in, a block-group
//! id or a structured [`GeocodeFailure`] comes out. [`CensusGeocoder`] talks to
//! the Census Bureau "onelineaddress" geographies endpoint.

use std::future::Future;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::table::GeoUnitId;
use crate::error::RoiError;

const DEFAULT_BASE_URL: &str = "https://geocoding.geo.census.gov/geocoder/geographies/onelineaddress";
const BENCHMARK: &str = "Public_AR_Current";
const VINTAGE: &str = "Current_Current";

/// Why an address could not be geocoded.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeocodeFailure {
    #[error("address not found")]
    NotFound,
    #[error("address matched more than one block group")]
    Ambiguous,
    #[error("malformed address")]
    Malformed,
    #[error("geocoder timed out")]
    Timeout,
    #[error("geocoder transport error: {reason}")]
    Transport { reason: String },
}

impl GeocodeFailure {
    /// Failures worth retrying: the same request may succeed later.
    pub fn is_transient(&self) -> bool {
        matches!(self, GeocodeFailure::Timeout | GeocodeFailure::Transport { .. })
    }

    pub fn code(&self) -> &'static str {
        match self {
            GeocodeFailure::NotFound => "not_found",
            GeocodeFailure::Ambiguous => "ambiguous",
            GeocodeFailure::Malformed => "malformed",
            GeocodeFailure::Timeout => "timeout",
            GeocodeFailure::Transport { .. } => "transport",
        }
    }
}

/// Address → block group.
///
/// Implementations must be shareable across tasks; the resolver calls
/// `geocode` concurrently from several tasks on the same instance.
pub trait Geocoder: Send + Sync {
    fn geocode(
        &self,
        address: &str,
    ) -> impl Future<Output = Result<GeoUnitId, GeocodeFailure>> + Send;
}

/// Census Bureau geocoder client.
#[derive(Debug, Clone)]
pub struct CensusGeocoder {
    client: Client,
    base_url: String,
}

impl CensusGeocoder {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, RoiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RoiError::Collaborator {
                collaborator: "geocoder",
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// Use `ROI_GEOCODER_URL` if set, otherwise the public Census endpoint.
    pub fn from_env(timeout: Duration) -> Result<Self, RoiError> {
        dotenvy::dotenv().ok();
        let base_url =
            std::env::var("ROI_GEOCODER_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self::new(base_url, timeout)
    }

    async fn request(&self, address: &str) -> Result<GeoUnitId, GeocodeFailure> {
        let resp = self
            .client
            .get(&self.base_url)
            .query(&[
                ("address", address),
                ("benchmark", BENCHMARK),
                ("vintage", VINTAGE),
                ("format", "json"),
            ])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GeocodeFailure::Timeout
                } else {
                    GeocodeFailure::Transport {
                        reason: e.to_string(),
                    }
                }
            })?;

        match resp.status() {
            s if s.is_success() => {}
            StatusCode::BAD_REQUEST => return Err(GeocodeFailure::Malformed),
            s => {
                return Err(GeocodeFailure::Transport {
                    reason: format!("status {s}"),
                });
            }
        }

        let body: Value = resp.json().await.map_err(|e| GeocodeFailure::Transport {
            reason: format!("invalid JSON: {e}"),
        })?;
        parse_geocoder_response(&body)
    }
}

impl Geocoder for CensusGeocoder {
    fn geocode(
        &self,
        address: &str,
    ) -> impl Future<Output = Result<GeoUnitId, GeocodeFailure>> + Send {
        async move {
            if address.trim().is_empty() {
                return Err(GeocodeFailure::Malformed);
            }
            self.request(address.trim()).await
        }
    }
}

/// Extract the block group from a geographies response.
///
/// Each address match carries a tract layer (`GEOID`, 11 digits) and a block
/// layer (`BLKGRP`, 1 digit); the layer names vary by vintage, so they are
/// matched by substring. Several matches are fine as long as they agree on
/// the block group.
pub fn parse_geocoder_response(body: &Value) -> Result<GeoUnitId, GeocodeFailure> {
    let matches = body
        .pointer("/result/addressMatches")
        .and_then(Value::as_array)
        .ok_or_else(|| GeocodeFailure::Transport {
            reason: "response has no result.addressMatches".to_string(),
        })?;

    let mut units: Vec<GeoUnitId> = matches
        .iter()
        .map(block_group_of_match)
        .collect::<Result<_, _>>()?;
    units.sort();
    units.dedup();

    match units.len() {
        0 => Err(GeocodeFailure::NotFound),
        1 => Ok(units.remove(0)),
        _ => Err(GeocodeFailure::Ambiguous),
    }
}

fn block_group_of_match(m: &Value) -> Result<GeoUnitId, GeocodeFailure> {
    let geographies = m
        .get("geographies")
        .and_then(Value::as_object)
        .ok_or_else(|| missing("geographies"))?;

    let layer_field = |layer: &str, field: &str| -> Option<String> {
        geographies
            .iter()
            .find(|(name, _)| name.contains(layer))
            .and_then(|(_, v)| v.as_array())
            .and_then(|a| a.first())
            .and_then(|g| g.get(field))
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    let tract = layer_field("Census Tracts", "GEOID").ok_or_else(|| missing("tract GEOID"))?;
    let group = layer_field("Census Blocks", "BLKGRP").ok_or_else(|| missing("BLKGRP"))?;

    GeoUnitId::parse(&format!("{tract}{group}")).map_err(|e| GeocodeFailure::Transport {
        reason: e.to_string(),
    })
}

fn missing(what: &str) -> GeocodeFailure {
    GeocodeFailure::Transport {
        reason: format!("address match lacks {what}"),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn address_match(tract: &str, blkgrp: &str) -> Value {
        json!({
            "matchedAddress": "1 MAIN ST, DENVER, CO, 80202",
            "geographies": {
                "Census Tracts": [{ "GEOID": tract, "STATE": "08" }],
                "2020 Census Blocks": [{ "BLKGRP": blkgrp, "GEOID": format!("{tract}{blkgrp}000") }],
                "States": [{ "STUSAB": "CO" }]
            }
        })
    }

    #[test]
    fn single_match_joins_tract_and_block_group() {
        let body = json!({ "result": { "addressMatches": [address_match("08031001702", "2")] } });
        let unit = parse_geocoder_response(&body).unwrap();
        assert_eq!(unit.as_str(), "080310017022");
    }

    #[test]
    fn no_match_is_not_found() {
        let body = json!({ "result": { "addressMatches": [] } });
        assert_eq!(parse_geocoder_response(&body), Err(GeocodeFailure::NotFound));
    }

    #[test]
    fn disagreeing_matches_are_ambiguous() {
        let body = json!({ "result": { "addressMatches": [
            address_match("08031001702", "2"),
            address_match("08031001702", "3"),
        ] } });
        assert_eq!(parse_geocoder_response(&body), Err(GeocodeFailure::Ambiguous));

        let same = json!({ "result": { "addressMatches": [
            address_match("08031001702", "2"),
            address_match("08031001702", "2"),
        ] } });
        assert!(parse_geocoder_response(&same).is_ok());
    }

    #[test]
    fn unexpected_shapes_are_transport_errors() {
        let err = parse_geocoder_response(&json!({ "errors": ["bad"] })).unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn only_timeouts_and_transport_errors_are_transient() {
        assert!(GeocodeFailure::Timeout.is_transient());
        assert!(!GeocodeFailure::NotFound.is_transient());
        assert!(!GeocodeFailure::Malformed.is_transient());
        assert_eq!(GeocodeFailure::Ambiguous.code(), "ambiguous");
    }
}
