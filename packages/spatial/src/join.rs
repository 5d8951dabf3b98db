//! Left join of per-region sighting counts onto region polygons.
//!
//! Every [`RegionGeometry`] appears in the output exactly once, with a
//! count of zero when nothing matched it. Aggregates that match no
//! geometry are not rendered but are returned as [`UnmatchedRegion`]s so
//! naming mismatches between the geocoder and the boundary catalog show
//! up in the run report instead of disappearing.
//!
//! Matching goes through a [`RegionMatcher`]. The default
//! [`ExactMatcher`] compares normalized keys only; [`AliasMatcher`] adds a
//! configured rename table on top.

use std::collections::{BTreeMap, BTreeSet};

use geo::MultiPolygon;
use monarch_map_region_models::{RegionAggregate, RegionKey};
use serde::{Deserialize, Serialize};

use crate::SpatialError;
use crate::boundaries::RegionGeometry;

/// Strategy for pairing an aggregate's key with a geometry key.
pub trait RegionMatcher: Send + Sync {
    /// Returns the geometry key `aggregate` should be counted toward, or
    /// `None` if it matches nothing in `geometry_keys`.
    fn match_key(
        &self,
        aggregate: &RegionKey,
        geometry_keys: &BTreeSet<RegionKey>,
    ) -> Option<RegionKey>;
}

/// Matches normalized keys exactly.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactMatcher;

impl RegionMatcher for ExactMatcher {
    fn match_key(
        &self,
        aggregate: &RegionKey,
        geometry_keys: &BTreeSet<RegionKey>,
    ) -> Option<RegionKey> {
        geometry_keys.get(aggregate).cloned()
    }
}

/// Exact matching with a fallback rename table.
///
/// Loaded from TOML:
///
/// ```toml
/// [aliases]
/// "St Louis City" = "St. Louis"
/// "De Kalb" = "DeKalb"
/// ```
///
/// Both sides are normalized, so the table only needs entries for
/// differences normalization cannot absorb (abbreviations, spelling).
#[derive(Debug, Clone, Default)]
pub struct AliasMatcher {
    aliases: BTreeMap<RegionKey, RegionKey>,
}

#[derive(Deserialize)]
struct AliasFile {
    #[serde(default)]
    aliases: BTreeMap<String, String>,
}

impl AliasMatcher {
    /// Builds a matcher from raw `(from, to)` name pairs. Pairs where
    /// either side normalizes to nothing are skipped.
    #[must_use]
    pub fn new<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut aliases = BTreeMap::new();
        for (from, to) in pairs {
            match (RegionKey::new(from), RegionKey::new(to)) {
                (Some(from), Some(to)) => {
                    aliases.insert(from, to);
                }
                _ => log::warn!("Ignoring empty region alias {from:?} = {to:?}"),
            }
        }
        Self { aliases }
    }

    /// Parses an alias table from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::Toml`] if the text is not valid TOML or the
    /// `aliases` table does not map strings to strings.
    pub fn from_toml_str(text: &str) -> Result<Self, SpatialError> {
        let file: AliasFile = toml::from_str(text)?;
        Ok(Self::new(
            file.aliases.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        ))
    }

    /// Number of aliases.
    #[must_use]
    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}

impl RegionMatcher for AliasMatcher {
    fn match_key(
        &self,
        aggregate: &RegionKey,
        geometry_keys: &BTreeSet<RegionKey>,
    ) -> Option<RegionKey> {
        ExactMatcher.match_key(aggregate, geometry_keys).or_else(|| {
            self.aliases
                .get(aggregate)
                .filter(|target| geometry_keys.contains(*target))
                .cloned()
        })
    }
}

/// A region polygon with its joined sighting count.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedRegion {
    /// Normalized region key.
    pub region: RegionKey,
    /// Source display name.
    pub name: String,
    /// Region outline.
    pub polygon: MultiPolygon<f64>,
    /// Sightings attributed to this region (0 when unmatched).
    pub sighting_count: u64,
}

/// An aggregate that matched no geometry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnmatchedRegion {
    /// The aggregate's region key.
    pub region: RegionKey,
    /// Sightings that could not be placed on the map.
    pub sighting_count: u64,
}

/// Output of [`GeometryJoiner::join`].
#[derive(Debug, Clone, Default)]
pub struct JoinReport {
    /// One entry per input geometry, in input order.
    pub joined: Vec<JoinedRegion>,
    /// Aggregates with no matching geometry, ordered by key.
    pub unmatched: Vec<UnmatchedRegion>,
    /// Geometry keys that appear more than once in the catalog. Each copy
    /// receives the full matched count.
    pub duplicate_geometry_keys: Vec<RegionKey>,
}

/// Serializable digest of a [`JoinReport`] (no polygons).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinSummary {
    /// Number of geometries in the output.
    pub geometry_count: usize,
    /// Geometries that received a non-zero count.
    pub regions_with_sightings: usize,
    /// Sightings placed on the map.
    pub matched_sightings: u64,
    /// Number of aggregates with no matching geometry.
    pub unmatched_count: usize,
    /// Sightings in unmatched aggregates.
    pub unmatched_sightings: u64,
    /// The unmatched aggregates themselves.
    pub unmatched: Vec<UnmatchedRegion>,
    /// Geometry keys that appear more than once.
    pub duplicate_geometry_keys: Vec<RegionKey>,
}

impl JoinReport {
    /// Number of aggregates that matched no geometry.
    #[must_use]
    pub fn unmatched_count(&self) -> usize {
        self.unmatched.len()
    }

    /// Summarizes the join without geometry.
    #[must_use]
    pub fn summary(&self) -> JoinSummary {
        let mut matched_regions = BTreeSet::new();
        let mut matched_sightings = 0;
        for region in &self.joined {
            if region.sighting_count > 0 && matched_regions.insert(&region.region) {
                matched_sightings += region.sighting_count;
            }
        }

        JoinSummary {
            geometry_count: self.joined.len(),
            regions_with_sightings: self.joined.iter().filter(|r| r.sighting_count > 0).count(),
            matched_sightings,
            unmatched_count: self.unmatched.len(),
            unmatched_sightings: self.unmatched.iter().map(|u| u.sighting_count).sum(),
            unmatched: self.unmatched.clone(),
            duplicate_geometry_keys: self.duplicate_geometry_keys.clone(),
        }
    }
}

/// Joins aggregates onto geometries using a [`RegionMatcher`].
pub struct GeometryJoiner {
    matcher: Box<dyn RegionMatcher>,
}

impl Default for GeometryJoiner {
    fn default() -> Self {
        Self::new(Box::new(ExactMatcher))
    }
}

impl GeometryJoiner {
    /// Creates a joiner with the given matching strategy.
    #[must_use]
    pub fn new(matcher: Box<dyn RegionMatcher>) -> Self {
        Self { matcher }
    }

    /// Left-joins `aggregates` onto `geometries`.
    ///
    /// The output has exactly `geometries.len()` entries. Several
    /// aggregates mapped to the same geometry (through aliases) are summed.
    #[must_use]
    pub fn join(&self, aggregates: &[RegionAggregate], geometries: &[RegionGeometry]) -> JoinReport {
        let mut geometry_keys = BTreeSet::new();
        let mut duplicates = BTreeSet::new();
        for geometry in geometries {
            if !geometry_keys.insert(geometry.region.clone()) {
                duplicates.insert(geometry.region.clone());
            }
        }

        if !duplicates.is_empty() {
            log::warn!(
                "{} region keys appear more than once in the boundary catalog: {}",
                duplicates.len(),
                duplicates
                    .iter()
                    .map(RegionKey::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        let mut counts: BTreeMap<RegionKey, u64> = BTreeMap::new();
        let mut unmatched: BTreeMap<RegionKey, u64> = BTreeMap::new();

        for aggregate in aggregates {
            match self.matcher.match_key(&aggregate.region, &geometry_keys) {
                Some(target) => *counts.entry(target).or_default() += aggregate.sighting_count,
                None => *unmatched.entry(aggregate.region.clone()).or_default() += aggregate.sighting_count,
            }
        }

        let joined: Vec<JoinedRegion> = geometries
            .iter()
            .map(|g| JoinedRegion {
                region: g.region.clone(),
                name: g.name.clone(),
                polygon: g.polygon.clone(),
                sighting_count: counts.get(&g.region).copied().unwrap_or(0),
            })
            .collect();

        let unmatched: Vec<UnmatchedRegion> = unmatched
            .into_iter()
            .map(|(region, sighting_count)| UnmatchedRegion {
                region,
                sighting_count,
            })
            .collect();

        if !unmatched.is_empty() {
            log::warn!(
                "{} aggregated regions matched no boundary: {}",
                unmatched.len(),
                unmatched
                    .iter()
                    .map(|u| format!("{} ({})", u.region, u.sighting_count))
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        JoinReport {
            joined,
            unmatched,
            duplicate_geometry_keys: duplicates.into_iter().collect(),
        }
    }
}
