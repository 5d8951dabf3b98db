#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Point observation and region aggregate types.
//!
//! An [`Observation`] is a single sighting row (coordinates, optional date,
//! optional count). Reverse geocoding turns it into a
//! [`ResolvedObservation`] tagged with a [`Resolution`], and aggregation
//! folds those into one [`RegionAggregate`] per [`RegionKey`] plus a
//! separately counted unresolved bucket.

pub mod key;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub use key::{EmptyRegionKeyError, RegionKey, normalize_region_name};

/// A single point observation as loaded from a source row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    /// Latitude (WGS84).
    pub latitude: f64,
    /// Longitude (WGS84).
    pub longitude: f64,
    /// Observation date. `None` when the source date could not be parsed;
    /// such rows still count spatially but are skipped by time-keyed
    /// aggregation.
    pub timestamp: Option<NaiveDate>,
    /// Number of individuals sighted. `None` counts as one.
    pub count: Option<i64>,
    /// State or province as reported by the source, if any.
    pub state: Option<String>,
}

impl Observation {
    /// Creates an observation of a single individual with no date.
    #[must_use]
    pub const fn at(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            timestamp: None,
            count: None,
            state: None,
        }
    }

    /// Sets the sighting count.
    #[must_use]
    pub fn with_count(mut self, count: i64) -> Self {
        self.count = Some(count);
        self
    }

    /// Sets the observation date.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: NaiveDate) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Sets the state/province.
    #[must_use]
    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    /// Count this row contributes to aggregates (defaults to 1).
    #[must_use]
    pub fn effective_count(&self) -> i64 {
        self.count.unwrap_or(1)
    }
}

/// Outcome of reverse geocoding a coordinate.
///
/// `Unresolved` is a terminal outcome, not an absent value: it is counted
/// and reported, never folded into a region.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "status", content = "region", rename_all = "camelCase")]
pub enum Resolution {
    /// The coordinate falls within this region.
    Resolved(RegionKey),
    /// The coordinate could not be attributed to any region.
    Unresolved,
}

impl Resolution {
    /// Returns the region key if resolved.
    #[must_use]
    pub const fn region(&self) -> Option<&RegionKey> {
        match self {
            Self::Resolved(key) => Some(key),
            Self::Unresolved => None,
        }
    }

    /// Whether this is [`Resolution::Unresolved`].
    #[must_use]
    pub const fn is_unresolved(&self) -> bool {
        matches!(self, Self::Unresolved)
    }
}

/// An observation paired with its resolution outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedObservation {
    /// The source observation.
    pub observation: Observation,
    /// Where it resolved to.
    pub resolution: Resolution,
}

/// Summed sighting count for one region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionAggregate {
    /// Normalized region key.
    pub region: RegionKey,
    /// Sum of observation counts resolved to this region.
    pub sighting_count: u64,
}

/// Output of aggregating a batch of resolved observations.
///
/// Invariant: the sum of all `aggregates[].sighting_count` plus
/// `unresolved_count` equals `total_count`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateSummary {
    /// One entry per distinct resolved region, ordered by key.
    pub aggregates: Vec<RegionAggregate>,
    /// Summed count of observations tagged [`Resolution::Unresolved`].
    pub unresolved_count: u64,
    /// Number of observation rows aggregated.
    pub observation_rows: usize,
    /// Summed count over every aggregated row.
    pub total_count: u64,
}

impl AggregateSummary {
    /// Sum of sighting counts across all resolved regions.
    #[must_use]
    pub fn resolved_count(&self) -> u64 {
        self.aggregates.iter().map(|a| a.sighting_count).sum()
    }

    /// Looks up the aggregate count for `region`.
    #[must_use]
    pub fn count_for(&self, region: &RegionKey) -> Option<u64> {
        self.aggregates
            .binary_search_by(|a| a.region.cmp(region))
            .ok()
            .map(|i| self.aggregates[i].sighting_count)
    }
}
