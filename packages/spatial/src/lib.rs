#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Region geometry handling for the sightings map.
//!
//! Loads named region polygons from `GeoJSON`, left-joins per-region
//! sighting counts onto them, and writes the joined regions back out as
//! a `GeoJSON` feature collection for choropleth rendering. Also provides
//! an R-tree backed [`BoundaryIndex`] that resolves points to regions
//! locally, as an offline stand-in for a remote reverse geocoder.

pub mod boundaries;
pub mod index;
pub mod join;
pub mod output;

use thiserror::Error;

pub use boundaries::{LoadedBoundaries, RegionGeometry, load_boundaries};
pub use index::BoundaryIndex;
pub use join::{
    AliasMatcher, ExactMatcher, GeometryJoiner, JoinReport, JoinSummary, JoinedRegion,
    RegionMatcher, UnmatchedRegion,
};

/// Errors that can occur while loading or joining region geometry.
#[derive(Debug, Error)]
pub enum SpatialError {
    /// `GeoJSON` parsing failed.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// TOML alias table parsing failed.
    #[error("Alias table error: {0}")]
    Toml(#[from] toml::de::Error),

    /// The document was valid `GeoJSON` but not a feature collection.
    #[error("Expected a GeoJSON FeatureCollection, found {found}")]
    NotFeatureCollection {
        /// What was found instead.
        found: &'static str,
    },
}

