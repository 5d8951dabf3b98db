#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Reverse geocoding for sighting data.
//!
//! Maps a latitude/longitude pair to the administrative region (county)
//! that contains it. Providers are configured via TOML files in
//! `services/` and loaded through the [`service_registry`]:
//!
//! 1. **FCC Census Area API** (priority 1): no API key, returns the
//!    county name for a point.
//! 2. **Nominatim / OpenStreetMap** (priority 2): 1 req/sec rate limit,
//!    reverse lookup at county zoom.
//!
//! Every provider implements [`RegionLookup`]. The [`resolver`] wraps a
//! provider with a coordinate cache, a per-call timeout, and a failure
//! policy that turns every network or response problem into
//! [`Resolution::Unresolved`](monarch_map_region_models::Resolution)
//! instead of an error.

pub mod cache;
pub mod fcc;
pub mod nominatim;
pub mod resolver;
pub mod service_registry;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use cache::{CoordinateKey, MemoryRegionCache, RegionCache};
pub use resolver::{LookupFailure, RegionResolver, ResolverConfig, ResolverStats, ResolverStatsSnapshot};

/// User-Agent sent with every lookup. Nominatim's usage policy rejects
/// requests without an identifying agent.
const USER_AGENT: &str = concat!("monarch-map/", env!("CARGO_PKG_VERSION"));

/// Errors from geocoding operations.
#[derive(Debug, Error)]
pub enum GeocodeError {
    /// Latitude or longitude outside the valid WGS84 range (or not finite).
    #[error("Invalid coordinate ({latitude}, {longitude})")]
    InvalidCoordinate {
        /// Offending latitude.
        latitude: f64,
        /// Offending longitude.
        longitude: f64,
    },

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body was not in the expected shape.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of the parsing failure.
        message: String,
    },

    /// Response was well formed but carried no region name.
    #[error("No region in response")]
    MissingRegion,

    /// Rate limit exceeded.
    #[error("Rate limit exceeded")]
    RateLimited,

    /// An embedded provider definition could not be parsed.
    #[error("Invalid service definition {id:?}: {message}")]
    ServiceConfig {
        /// File stem of the definition.
        id: String,
        /// Parser message.
        message: String,
    },
}

/// A reverse-geocoding provider.
///
/// Implementations perform exactly one remote (or local) lookup per call
/// and return the raw, unnormalized region name. Caching, timeouts, and
/// the failure policy live in [`RegionResolver`], not here.
#[async_trait]
pub trait RegionLookup: Send + Sync {
    /// Short provider identifier used in logs (e.g. `"fcc"`).
    fn id(&self) -> &str;

    /// Waits until the provider will accept another request.
    ///
    /// Rate-limited providers queue callers here. The resolver awaits this
    /// before starting its timeout, so time spent queueing never counts
    /// against a lookup. Callers invoking [`Self::lookup`] directly must
    /// await it first.
    async fn ready(&self) {}

    /// Looks up the region containing the given point.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError`] if the request fails, the response cannot
    /// be parsed, or it does not name a region.
    async fn lookup(&self, latitude: f64, longitude: f64) -> Result<String, GeocodeError>;
}

/// Checks that a coordinate is finite and within WGS84 bounds.
///
/// # Errors
///
/// Returns [`GeocodeError::InvalidCoordinate`] if latitude is outside
/// `[-90, 90]` or longitude is outside `[-180, 180]`.
pub fn validate_coordinate(latitude: f64, longitude: f64) -> Result<(), GeocodeError> {
    if (-90.0..=90.0).contains(&latitude) && (-180.0..=180.0).contains(&longitude) {
        Ok(())
    } else {
        Err(GeocodeError::InvalidCoordinate {
            latitude,
            longitude,
        })
    }
}

/// Builds a `reqwest::Client` for provider requests.
///
/// `timeout` bounds each whole request; the resolver applies its own
/// timeout on top so a stalled provider never blocks a batch.
///
/// # Errors
///
/// Returns [`GeocodeError`] if the client cannot be built.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client, GeocodeError> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_boundary_coordinates() {
        assert!(validate_coordinate(90.0, 180.0).is_ok());
        assert!(validate_coordinate(-90.0, -180.0).is_ok());
        assert!(validate_coordinate(30.267, -97.743).is_ok());
    }

    #[test]
    fn rejects_out_of_range_coordinates() {
        assert!(matches!(
            validate_coordinate(90.5, 0.0),
            Err(GeocodeError::InvalidCoordinate { .. })
        ));
        assert!(validate_coordinate(0.0, -180.01).is_err());
        assert!(validate_coordinate(f64::NAN, 0.0).is_err());
        assert!(validate_coordinate(0.0, f64::INFINITY).is_err());
    }
}
