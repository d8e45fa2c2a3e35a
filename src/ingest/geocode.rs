//! Geocoder client (C5 support): resolves a street address to `(lat, lon)`
//! via an external HTTP service. Failures are per-address, never fatal to
//! the surrounding ingest — a building whose address fails to geocode is
//! dropped, not the whole archive (§4.4 step 4).

use std::time::Duration;

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GeoResponse {
    Ok { lat: f64, lon: f64 },
    Err { error: String },
}

pub struct Geocoder {
    client: reqwest::blocking::Client,
    base: String,
}

impl Geocoder {
    pub fn new(base: impl Into<String>) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .expect("failed to build geocoder HTTP client");
        Geocoder { client, base: base.into() }
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    /// Resolves one address. `Ok(None)` means the geocoder itself reported
    /// a failure for this address (not a transport error) — per spec this
    /// is the normal "skip this building" outcome, not a hard error.
    pub fn resolve(&self, address: &str) -> Option<(f64, f64)> {
        let encoded = utf8_percent_encode(address, NON_ALPHANUMERIC).to_string();
        let url = format!("{}/{encoded}", self.base.trim_end_matches('/'));
        let response = match self.client.get(&url).send() {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(address, error = %e, "geocoder request failed");
                return None;
            }
        };
        let parsed: GeoResponse = match response.json() {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(address, error = %e, "geocoder response was not valid JSON");
                return None;
            }
        };
        match parsed {
            GeoResponse::Ok { lat, lon } => Some((lat, lon)),
            GeoResponse::Err { error } => {
                tracing::debug!(address, error, "geocoder reported no result for address");
                None
            }
        }
    }
}
