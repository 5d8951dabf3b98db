//! Loads named region polygons from a `GeoJSON` feature collection.
//!
//! The boundary catalog names regions in a property whose key varies by
//! source (`NAME` for census county shapefiles, `county` elsewhere), so
//! the caller supplies it. Names are normalized into [`RegionKey`]s the
//! same way reverse-geocoded names are, so the two sides can be joined.

use geo::MultiPolygon;
use geojson::{Feature, GeoJson};
use monarch_map_region_models::RegionKey;

use crate::SpatialError;

/// A named region polygon from the boundary catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionGeometry {
    /// Normalized join key.
    pub region: RegionKey,
    /// Name exactly as it appeared in the source.
    pub name: String,
    /// Region outline (WGS84, lon/lat order).
    pub polygon: MultiPolygon<f64>,
}

impl RegionGeometry {
    /// Builds a region from a raw name, normalizing it into a key.
    /// Returns `None` if the name normalizes to nothing.
    #[must_use]
    pub fn new(name: &str, polygon: MultiPolygon<f64>) -> Option<Self> {
        Some(Self {
            region: RegionKey::new(name)?,
            name: name.trim().to_string(),
            polygon,
        })
    }
}

/// Result of loading a boundary file.
#[derive(Debug, Clone, Default)]
pub struct LoadedBoundaries {
    /// Regions in source order.
    pub geometries: Vec<RegionGeometry>,
    /// Features dropped for a missing name or unusable geometry.
    pub skipped: usize,
}

/// Parses a `GeoJSON` `FeatureCollection` into region geometries.
///
/// Features without a usable name in `name_property`, or whose geometry
/// is not a `Polygon`/`MultiPolygon`, are skipped and counted.
///
/// # Errors
///
/// Returns [`SpatialError`] if the text is not valid `GeoJSON` or is not a
/// feature collection.
pub fn load_boundaries(geojson: &str, name_property: &str) -> Result<LoadedBoundaries, SpatialError> {
    let parsed: GeoJson = geojson.parse()?;

    let features = match parsed {
        GeoJson::FeatureCollection(fc) => fc.features,
        GeoJson::Feature(_) => {
            return Err(SpatialError::NotFeatureCollection { found: "Feature" });
        }
        GeoJson::Geometry(_) => {
            return Err(SpatialError::NotFeatureCollection { found: "Geometry" });
        }
    };

    let mut loaded = LoadedBoundaries::default();

    for (i, feature) in features.into_iter().enumerate() {
        match normalize_feature(feature, name_property) {
            Some(geometry) => loaded.geometries.push(geometry),
            None => {
                log::warn!("Skipping boundary feature {i}: no usable {name_property:?} or polygon");
                loaded.skipped += 1;
            }
        }
    }

    log::info!(
        "Loaded {} region boundaries ({} skipped)",
        loaded.geometries.len(),
        loaded.skipped
    );

    Ok(loaded)
}

/// Converts one feature, returning `None` if it cannot be used.
fn normalize_feature(feature: Feature, name_property: &str) -> Option<RegionGeometry> {
    let name = match feature.property(name_property)? {
        serde_json::Value::String(s) => s.trim().to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        _ => return None,
    };

    let polygon = to_multipolygon(feature.geometry?)?;
    RegionGeometry::new(&name, polygon)
}

/// Converts a `GeoJSON` geometry into a [`MultiPolygon`].
/// Handles both `Polygon` and `MultiPolygon` geometry types.
fn to_multipolygon(geometry: geojson::Geometry) -> Option<MultiPolygon<f64>> {
    let geo_geom: geo::Geometry<f64> = geometry.try_into().ok()?;
    match geo_geom {
        geo::Geometry::MultiPolygon(mp) => Some(mp),
        geo::Geometry::Polygon(p) => Some(MultiPolygon(vec![p])),
        _ => None,
    }
}
