#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Batch enrichment of sighting observations.
//!
//! A run takes parsed observations and a boundary catalog and produces a
//! per-region sighting map:
//!
//! 1. Coordinates are validated and grouped by their rounded
//!    [`CoordinateKey`], so each distinct point is looked up once.
//! 2. Keys are resolved concurrently through the shared
//!    [`RegionResolver`]. A [`CancellationFlag`] is checked before each key
//!    is started; lookups already in flight finish and are kept.
//! 3. Resolutions are fanned back out to observations, aggregated per
//!    region, and left-joined onto the boundaries.
//!
//! Network trouble never fails a run; it shows up as unresolved sightings
//! and resolver counters in the [`PipelineReport`].

pub mod cancel;
pub mod progress;

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future;
use futures::stream::{self, StreamExt as _};
use monarch_map_analytics::AnalyticsError;
use monarch_map_analytics::aggregate::aggregate;
use monarch_map_geocoder::{CoordinateKey, RegionResolver, ResolverStatsSnapshot};
use monarch_map_region_models::{
    Observation, RegionAggregate, Resolution, ResolvedObservation,
};
use monarch_map_spatial::{
    GeometryJoiner, JoinReport, JoinSummary, JoinedRegion, RegionGeometry, RegionMatcher,
    UnmatchedRegion,
};
use serde::Serialize;
use thiserror::Error;

pub use cancel::CancellationFlag;
pub use progress::{NullProgress, ProgressCallback, null_progress};

/// Errors that abort an enrichment run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The observation data itself is malformed.
    #[error(transparent)]
    Analytics(#[from] AnalyticsError),
}

/// Per-run settings not owned by the resolver.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineOptions {
    /// Maximum lookups in flight. `None` uses the resolver's configured
    /// concurrency.
    pub concurrency: Option<usize>,
}

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    /// Provider the resolver called on cache misses.
    pub provider: String,
    /// Boundaries with their sighting counts, plus unmatched aggregates.
    pub join: JoinReport,
    /// Per-region sighting totals, ordered by key.
    pub aggregates: Vec<RegionAggregate>,
    /// Processed observations with their resolution, in input order.
    pub resolved: Vec<ResolvedObservation>,
    /// Sightings in processed observations that did not resolve.
    pub unresolved_count: u64,
    /// Sightings across all processed observations.
    pub total_sightings: u64,
    /// Observations rejected for out-of-range coordinates (tagged
    /// unresolved, never looked up).
    pub invalid_coordinates: usize,
    /// Observations handed to the run.
    pub total_observations: usize,
    /// Observations that made it into the aggregates.
    pub processed_observations: usize,
    /// Distinct coordinate keys among valid observations.
    pub unique_keys: usize,
    /// Coordinate keys whose resolution completed.
    pub resolved_keys: usize,
    /// Whether cancellation left some observations unprocessed.
    pub partial: bool,
    /// Resolver counters at the end of the run.
    pub resolver_stats: ResolverStatsSnapshot,
}

impl PipelineReport {
    /// Boundaries with their joined counts, in catalog order.
    #[must_use]
    pub fn joined(&self) -> &[JoinedRegion] {
        &self.join.joined
    }

    /// Aggregates that matched no boundary.
    #[must_use]
    pub fn unmatched(&self) -> &[UnmatchedRegion] {
        &self.join.unmatched
    }

    /// Observations skipped because the run was cancelled first.
    #[must_use]
    pub const fn pending_observations(&self) -> usize {
        self.total_observations - self.processed_observations
    }

    /// Serializable digest of the run (no geometry, no per-row data).
    #[must_use]
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            provider: self.provider.clone(),
            partial: self.partial,
            total_observations: self.total_observations,
            processed_observations: self.processed_observations,
            pending_observations: self.pending_observations(),
            invalid_coordinates: self.invalid_coordinates,
            unique_keys: self.unique_keys,
            resolved_keys: self.resolved_keys,
            total_sightings: self.total_sightings,
            unresolved_sightings: self.unresolved_count,
            aggregates: self.aggregates.clone(),
            join: self.join.summary(),
            resolver_stats: self.resolver_stats,
        }
    }
}

/// JSON-friendly run report written next to the map output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    /// Resolver provider id.
    pub provider: String,
    /// Whether the run was cut short.
    pub partial: bool,
    /// Observations handed to the run.
    pub total_observations: usize,
    /// Observations included in the aggregates.
    pub processed_observations: usize,
    /// Observations skipped by cancellation.
    pub pending_observations: usize,
    /// Observations with out-of-range coordinates.
    pub invalid_coordinates: usize,
    /// Distinct coordinate keys.
    pub unique_keys: usize,
    /// Keys whose resolution completed.
    pub resolved_keys: usize,
    /// Sightings across processed observations.
    pub total_sightings: u64,
    /// Sightings that could not be attributed to a region.
    pub unresolved_sightings: u64,
    /// Per-region totals.
    pub aggregates: Vec<RegionAggregate>,
    /// Join diagnostics.
    pub join: JoinSummary,
    /// Resolver counters.
    pub resolver_stats: ResolverStatsSnapshot,
}

/// Runs the enrichment pipeline over `observations`.
///
/// Progress advances by the number of observations behind each completed
/// key (invalid coordinates count immediately).
///
/// # Errors
///
/// Returns [`PipelineError::Analytics`] if an observation carries a
/// negative count. Lookup failures never produce an error.
pub async fn run(
    resolver: &RegionResolver,
    observations: &[Observation],
    geometries: &[RegionGeometry],
    matcher: Box<dyn RegionMatcher>,
    options: &PipelineOptions,
    cancel: &CancellationFlag,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<PipelineReport, PipelineError> {
    let concurrency = options
        .concurrency
        .unwrap_or(resolver.config().concurrency)
        .max(1);

    progress.set_total(observations.len() as u64);
    progress.set_message(format!("Resolving via {}", resolver.provider_id()));

    // Rounded key per observation; `None` marks an invalid coordinate.
    let mut keys: Vec<Option<CoordinateKey>> = Vec::with_capacity(observations.len());
    let mut rows_per_key: BTreeMap<CoordinateKey, u64> = BTreeMap::new();
    let mut invalid_coordinates = 0usize;

    for (index, observation) in observations.iter().enumerate() {
        match resolver.cache_key(observation.latitude, observation.longitude) {
            Ok(key) => {
                *rows_per_key.entry(key).or_default() += 1;
                keys.push(Some(key));
            }
            Err(e) => {
                log::debug!("Observation {index}: {e}");
                invalid_coordinates += 1;
                keys.push(None);
            }
        }
    }

    if invalid_coordinates > 0 {
        log::warn!("{invalid_coordinates} observations have invalid coordinates");
        progress.inc(invalid_coordinates as u64);
    }

    log::info!(
        "Resolving {} unique coordinates for {} observations (concurrency={concurrency})",
        rows_per_key.len(),
        observations.len()
    );

    let resolutions: BTreeMap<CoordinateKey, Resolution> =
        stream::iter(rows_per_key.iter().map(|(key, rows)| (*key, *rows)))
            .take_while(|_| future::ready(!cancel.is_cancelled()))
            .map(|(key, rows)| async move {
                let resolution = resolver.resolve_key(key).await;
                progress.inc(rows);
                (key, resolution)
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

    let mut resolved = Vec::with_capacity(observations.len());
    for (observation, key) in observations.iter().zip(&keys) {
        let resolution = match key {
            None => Resolution::Unresolved,
            Some(key) => match resolutions.get(key) {
                Some(resolution) => resolution.clone(),
                None => continue,
            },
        };
        resolved.push(ResolvedObservation {
            observation: observation.clone(),
            resolution,
        });
    }

    let partial = resolved.len() < observations.len();
    if partial {
        log::warn!(
            "Run cancelled: {} of {} coordinate keys resolved, {} observations pending",
            resolutions.len(),
            rows_per_key.len(),
            observations.len() - resolved.len()
        );
    } else if cancel.is_cancelled() {
        log::warn!("Cancellation requested after every coordinate had started; run is complete");
    }

    let summary = aggregate(&resolved)?;
    let join = GeometryJoiner::new(matcher).join(&summary.aggregates, geometries);

    log::info!(
        "Resolved {} regions; {} sightings unresolved, {} regions unmatched",
        summary.aggregates.len(),
        summary.unresolved_count,
        join.unmatched_count()
    );

    progress.finish(format!(
        "{} observations processed{}",
        resolved.len(),
        if partial { " (partial)" } else { "" }
    ));

    Ok(PipelineReport {
        provider: resolver.provider_id().to_string(),
        join,
        unresolved_count: summary.unresolved_count,
        total_sightings: summary.total_count,
        aggregates: summary.aggregates,
        processed_observations: resolved.len(),
        resolved,
        invalid_coordinates,
        total_observations: observations.len(),
        unique_keys: rows_per_key.len(),
        resolved_keys: resolutions.len(),
        partial,
        resolver_stats: resolver.stats(),
    })
}
