//! Nominatim / OpenStreetMap reverse geocoder client.
//!
//! Used when the FCC endpoint is unavailable or for points outside the
//! US. Nominatim has strict rate limits: **1 request per second**
//! maximum, enforced by [`RegionLookup::ready`] spacing calls at least
//! `rate_limit_ms` apart.
//!
//! See <https://nominatim.org/release-docs/develop/api/Reverse/>

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::{GeocodeError, RegionLookup};

/// Zoom level at which Nominatim reports county-level address parts.
const COUNTY_ZOOM: &str = "8";

/// Reverse geocoder backed by a Nominatim instance.
#[derive(Debug)]
pub struct NominatimReverseLookup {
    client: reqwest::Client,
    base_url: String,
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl NominatimReverseLookup {
    /// Creates a client that issues at most one request per
    /// `rate_limit_ms` milliseconds.
    #[must_use]
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, rate_limit_ms: u64) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            min_interval: Duration::from_millis(rate_limit_ms),
            last_request: Mutex::new(None),
        }
    }

    /// Waits until the rate limit allows another request and claims the
    /// slot. The lock is held across the sleep so concurrent callers queue
    /// up in order.
    async fn throttle(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let ready_at = prev + self.min_interval;
            if ready_at > Instant::now() {
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[async_trait]
impl RegionLookup for NominatimReverseLookup {
    fn id(&self) -> &str {
        "nominatim"
    }

    async fn ready(&self) {
        self.throttle().await;
    }

    async fn lookup(&self, latitude: f64, longitude: f64) -> Result<String, GeocodeError> {
        let resp = self
            .client
            .get(&self.base_url)
            .query(&[
                ("lat", latitude.to_string()),
                ("lon", longitude.to_string()),
                ("format", "jsonv2".to_string()),
                ("zoom", COUNTY_ZOOM.to_string()),
                ("addressdetails", "1".to_string()),
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

/// Extracts the county from a reverse response.
///
/// Nominatim reports `"Travis County"` where census sources say
/// `"Travis"`, so a trailing `County` is dropped.
fn parse_response(body: &serde_json::Value) -> Result<String, GeocodeError> {
    if body.get("error").is_some() {
        return Err(GeocodeError::MissingRegion);
    }

    let address = body["address"]
        .as_object()
        .ok_or_else(|| GeocodeError::Parse {
            message: "Nominatim response has no address object".to_string(),
        })?;

    let county = address
        .get("county")
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(GeocodeError::MissingRegion)?;

    let stripped = county
        .strip_suffix(" County")
        .map_or(county, str::trim_end);

    Ok(stripped.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_county_and_drops_suffix() {
        let body = serde_json::json!({
            "lat": "30.2672",
            "lon": "-97.7431",
            "display_name": "Austin, Travis County, Texas, United States",
            "address": {
                "city": "Austin",
                "county": "Travis County",
                "state": "Texas",
                "country_code": "us"
            }
        });
        assert_eq!(parse_response(&body).unwrap(), "Travis");
    }

    #[test]
    fn keeps_names_without_suffix() {
        let body = serde_json::json!({ "address": { "county": "Orleans Parish" } });
        assert_eq!(parse_response(&body).unwrap(), "Orleans Parish");
    }

    #[test]
    fn error_object_is_missing_region() {
        let body = serde_json::json!({ "error": "Unable to geocode" });
        assert!(matches!(
            parse_response(&body),
            Err(GeocodeError::MissingRegion)
        ));
    }

    #[test]
    fn address_without_county_is_missing_region() {
        let body = serde_json::json!({ "address": { "city": "Washington" } });
        assert!(matches!(
            parse_response(&body),
            Err(GeocodeError::MissingRegion)
        ));
    }

    #[test]
    fn non_object_is_parse_error() {
        let body = serde_json::json!([]);
        assert!(matches!(
            parse_response(&body),
            Err(GeocodeError::Parse { .. })
        ));
    }

    #[tokio::test]
    async fn throttle_spaces_requests() {
        let client = reqwest::Client::new();
        let lookup = NominatimReverseLookup::new(client, "http://localhost", 50);

        let start = Instant::now();
        lookup.throttle().await;
        lookup.throttle().await;
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    /// Serves `body` as a JSON 200 to every connection until dropped.
    async fn serve_json(body: &'static str) -> String {
        use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let mut buf = [0_u8; 1024];
                    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => request.extend_from_slice(&buf[..n]),
                        }
                    }
                    let response = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        format!("http://{addr}/reverse")
    }

    #[tokio::test]
    async fn queueing_for_rate_limit_does_not_time_out() {
        use std::sync::Arc;

        use monarch_map_region_models::{RegionKey, Resolution};

        use crate::{RegionResolver, ResolverConfig};

        let url = serve_json(r#"{"address":{"county":"Travis County"}}"#).await;
        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        let lookup = NominatimReverseLookup::new(client, url, 110);
        let resolver = Arc::new(RegionResolver::new(
            Arc::new(lookup),
            ResolverConfig {
                timeout: Duration::from_millis(500),
                ..ResolverConfig::default()
            },
        ));

        let handles: Vec<_> = (0..8_u32)
            .map(|i| {
                let resolver = Arc::clone(&resolver);
                tokio::spawn(async move {
                    resolver
                        .resolve(30.0 + f64::from(i) * 0.01, -97.0)
                        .await
                        .unwrap()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(
                handle.await.unwrap(),
                Resolution::Resolved(RegionKey::new("travis").unwrap())
            );
        }
        let stats = resolver.stats();
        assert_eq!(stats.lookups, 8);
        assert_eq!(stats.resolved, 8);
        assert_eq!(stats.timeouts, 0);
    }
}
