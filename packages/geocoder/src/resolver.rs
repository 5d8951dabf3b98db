//! Cached, failure-absorbing region resolution.
//!
//! [`RegionResolver::resolve`] is the single entry point the pipeline
//! uses to attribute a coordinate to a region:
//!
//! 1. Reject out-of-range coordinates with
//!    [`GeocodeError::InvalidCoordinate`] before any I/O
//! 2. Round to a [`CoordinateKey`] and consult the [`RegionCache`]
//! 3. On a miss, wait for the provider to be [ready](RegionLookup::ready),
//!    then issue exactly one lookup bounded by [`ResolverConfig::timeout`]
//! 4. Normalize the returned name into a `RegionKey`, or classify the
//!    failure as a [`LookupFailure`], and cache the outcome
//!
//! Network-level failures never escape: they are counted in
//! [`ResolverStats`] and returned as [`Resolution::Unresolved`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use monarch_map_region_models::{RegionKey, Resolution};
use serde::Serialize;
use strum_macros::{AsRefStr, Display};

use crate::cache::{CoordinateKey, MemoryRegionCache, RegionCache};
use crate::{GeocodeError, RegionLookup, validate_coordinate};

/// Default rounding precision (4 decimal places, about 11 m).
pub const DEFAULT_PRECISION: u32 = 4;

/// Default per-lookup timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default number of concurrent lookups in a batch.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Tuning knobs for a [`RegionResolver`] and the batches that drive it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Decimal places coordinates are rounded to before caching.
    pub precision: u32,
    /// Upper bound on a single provider call.
    pub timeout: Duration,
    /// Maximum in-flight lookups when resolving a batch.
    pub concurrency: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            precision: DEFAULT_PRECISION,
            timeout: DEFAULT_TIMEOUT,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

/// Why a lookup ended in [`Resolution::Unresolved`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum LookupFailure {
    /// The provider did not answer within [`ResolverConfig::timeout`].
    Timeout,
    /// Connection, TLS, HTTP status, or rate-limit failure.
    Transport,
    /// The response body was not in the provider's documented shape.
    Malformed,
    /// The response parsed but carried no usable region name.
    MissingRegion,
}

impl LookupFailure {
    /// Classifies a provider error.
    #[must_use]
    pub fn classify(error: &GeocodeError) -> Self {
        match error {
            GeocodeError::Http(e) if e.is_timeout() => Self::Timeout,
            GeocodeError::Http(e) if e.is_decode() => Self::Malformed,
            GeocodeError::Http(_) | GeocodeError::RateLimited => Self::Transport,
            GeocodeError::Parse { .. } | GeocodeError::ServiceConfig { .. } => Self::Malformed,
            GeocodeError::MissingRegion | GeocodeError::InvalidCoordinate { .. } => {
                Self::MissingRegion
            }
        }
    }
}

/// Lock-free counters describing resolver activity.
#[derive(Debug, Default)]
pub struct ResolverStats {
    cache_hits: AtomicU64,
    lookups: AtomicU64,
    resolved: AtomicU64,
    timeouts: AtomicU64,
    transport_errors: AtomicU64,
    malformed_responses: AtomicU64,
    missing_region: AtomicU64,
    invalid_coordinates: AtomicU64,
}

impl ResolverStats {
    fn record_failure(&self, failure: LookupFailure) {
        let counter = match failure {
            LookupFailure::Timeout => &self.timeouts,
            LookupFailure::Transport => &self.transport_errors,
            LookupFailure::Malformed => &self.malformed_responses,
            LookupFailure::MissingRegion => &self.missing_region,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Takes a point-in-time copy of the counters.
    #[must_use]
    pub fn snapshot(&self) -> ResolverStatsSnapshot {
        ResolverStatsSnapshot {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            lookups: self.lookups.load(Ordering::Relaxed),
            resolved: self.resolved.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
            malformed_responses: self.malformed_responses.load(Ordering::Relaxed),
            missing_region: self.missing_region.load(Ordering::Relaxed),
            invalid_coordinates: self.invalid_coordinates.load(Ordering::Relaxed),
        }
    }
}

/// Serializable copy of [`ResolverStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolverStatsSnapshot {
    /// Resolutions answered from the cache.
    pub cache_hits: u64,
    /// Provider calls issued.
    pub lookups: u64,
    /// Provider calls that produced a region.
    pub resolved: u64,
    /// Provider calls abandoned after the timeout.
    pub timeouts: u64,
    /// Provider calls that failed at the transport level.
    pub transport_errors: u64,
    /// Provider responses that could not be parsed.
    pub malformed_responses: u64,
    /// Provider responses without a region name.
    pub missing_region: u64,
    /// Coordinates rejected before lookup.
    pub invalid_coordinates: u64,
}

impl ResolverStatsSnapshot {
    /// Total provider calls that ended unresolved.
    #[must_use]
    pub const fn failures(&self) -> u64 {
        self.timeouts + self.transport_errors + self.malformed_responses + self.missing_region
    }
}

/// Resolves coordinates to region keys through a provider and a cache.
///
/// Safe to share between concurrent tasks (`&self` everywhere). Two
/// tasks racing on the same uncached key may both call the provider,
/// but only one result is ever cached and both callers receive it.
pub struct RegionResolver {
    lookup: Arc<dyn RegionLookup>,
    cache: Arc<dyn RegionCache>,
    config: ResolverConfig,
    stats: ResolverStats,
}

impl RegionResolver {
    /// Creates a resolver backed by a fresh [`MemoryRegionCache`].
    #[must_use]
    pub fn new(lookup: Arc<dyn RegionLookup>, config: ResolverConfig) -> Self {
        Self::with_cache(lookup, Arc::new(MemoryRegionCache::new()), config)
    }

    /// Creates a resolver backed by a caller-supplied cache.
    #[must_use]
    pub fn with_cache(
        lookup: Arc<dyn RegionLookup>,
        cache: Arc<dyn RegionCache>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            lookup,
            cache,
            config,
            stats: ResolverStats::default(),
        }
    }

    /// The resolver's configuration.
    #[must_use]
    pub const fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// The provider this resolver calls on cache misses.
    #[must_use]
    pub fn provider_id(&self) -> &str {
        self.lookup.id()
    }

    /// Current activity counters.
    #[must_use]
    pub fn stats(&self) -> ResolverStatsSnapshot {
        self.stats.snapshot()
    }

    /// Number of coordinate keys currently cached.
    #[must_use]
    pub fn cached_keys(&self) -> usize {
        self.cache.len()
    }

    /// Validates a coordinate and rounds it to this resolver's cache key.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::InvalidCoordinate`] for out-of-range input.
    pub fn cache_key(&self, latitude: f64, longitude: f64) -> Result<CoordinateKey, GeocodeError> {
        if let Err(e) = validate_coordinate(latitude, longitude) {
            self.stats
                .invalid_coordinates
                .fetch_add(1, Ordering::Relaxed);
            return Err(e);
        }
        Ok(CoordinateKey::new(
            latitude,
            longitude,
            self.config.precision,
        ))
    }

    /// Resolves a coordinate to a region.
    ///
    /// Never fails for in-range input: provider failures come back as
    /// [`Resolution::Unresolved`].
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::InvalidCoordinate`] without contacting the
    /// provider if the coordinate is out of range.
    pub async fn resolve(&self, latitude: f64, longitude: f64) -> Result<Resolution, GeocodeError> {
        let key = self.cache_key(latitude, longitude)?;
        Ok(self.resolve_key(key).await)
    }

    /// Resolves an already-validated cache key.
    pub async fn resolve_key(&self, key: CoordinateKey) -> Resolution {
        if let Some(cached) = self.cache.get(&key) {
            log::debug!("Cache hit for {key}");
            self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
            return cached;
        }

        self.lookup.ready().await;
        self.stats.lookups.fetch_add(1, Ordering::Relaxed);
        let outcome = tokio::time::timeout(
            self.config.timeout,
            self.lookup.lookup(key.latitude(), key.longitude()),
        )
        .await;

        let resolution = match outcome {
            Ok(Ok(name)) => {
                if let Some(region) = RegionKey::new(&name) {
                    self.stats.resolved.fetch_add(1, Ordering::Relaxed);
                    Resolution::Resolved(region)
                } else {
                    self.fail(key, LookupFailure::MissingRegion, &format!("blank name {name:?}"))
                }
            }
            Ok(Err(e)) => self.fail(key, LookupFailure::classify(&e), &e.to_string()),
            Err(_) => self.fail(
                key,
                LookupFailure::Timeout,
                &format!("no answer within {:?}", self.config.timeout),
            ),
        };

        self.cache.insert(key, resolution)
    }

    fn fail(&self, key: CoordinateKey, failure: LookupFailure, detail: &str) -> Resolution {
        log::warn!(
            "{} lookup for ({key}) unresolved [{failure}]: {detail}",
            self.lookup.id()
        );
        self.stats.record_failure(failure);
        Resolution::Unresolved
    }
}
