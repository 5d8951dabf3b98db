//! FCC Census Area API client.
//!
//! Free reverse lookup of the census block, county, and state containing a
//! point. No API key required.
//!
//! - `GET {base_url}?lat={lat}&lon={lon}&format=json`
//! - County name lives at `results[0].county_name`
//!
//! See <https://geo.fcc.gov/api/census/>

use async_trait::async_trait;

use crate::{GeocodeError, RegionLookup};

/// Reverse geocoder backed by the FCC Area API.
#[derive(Debug, Clone)]
pub struct FccAreaLookup {
    client: reqwest::Client,
    base_url: String,
}

impl FccAreaLookup {
    /// Creates a client for the given endpoint.
    #[must_use]
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl RegionLookup for FccAreaLookup {
    fn id(&self) -> &str {
        "fcc"
    }

    async fn lookup(&self, latitude: f64, longitude: f64) -> Result<String, GeocodeError> {
        let resp = self
            .client
            .get(&self.base_url)
            .query(&[
                ("lat", latitude.to_string()),
                ("lon", longitude.to_string()),
                ("format", "json".to_string()),
            ])
            .send()
            .await?;

        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(GeocodeError::RateLimited);
        }

        let body: serde_json::Value = resp.error_for_status()?.json().await?;
        parse_response(&body)
    }
}

/// Extracts the county name from an Area API response.
fn parse_response(body: &serde_json::Value) -> Result<String, GeocodeError> {
    let results = body["results"]
        .as_array()
        .ok_or_else(|| GeocodeError::Parse {
            message: "Missing results array".to_string(),
        })?;

    let Some(first) = results.first() else {
        return Err(GeocodeError::MissingRegion);
    };

    first["county_name"]
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .ok_or(GeocodeError::MissingRegion)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_county_name() {
        let body = serde_json::json!({
            "input": { "lat": 30.2672, "lon": -97.7431 },
            "results": [{
                "block_fips": "484530011001004",
                "county_fips": "48453",
                "county_name": "Travis",
                "state_code": "TX",
                "state_name": "Texas"
            }]
        });
        assert_eq!(parse_response(&body).unwrap(), "Travis");
    }

    #[test]
    fn empty_results_is_missing_region() {
        let body = serde_json::json!({ "results": [] });
        assert!(matches!(
            parse_response(&body),
            Err(GeocodeError::MissingRegion)
        ));
    }

    #[test]
    fn null_county_is_missing_region() {
        let body = serde_json::json!({ "results": [{ "county_name": null }] });
        assert!(matches!(
            parse_response(&body),
            Err(GeocodeError::MissingRegion)
        ));
    }

    #[test]
    fn unexpected_shape_is_parse_error() {
        let body = serde_json::json!({ "status": "error", "message": "bad request" });
        assert!(matches!(
            parse_response(&body),
            Err(GeocodeError::Parse { .. })
        ));
    }
}
