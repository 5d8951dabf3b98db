//! In-memory spatial index for offline region attribution.
//!
//! Builds an R-tree over the boundary polygons and answers
//! point-in-polygon lookups locally. Implements [`RegionLookup`] so it can
//! stand in for a remote reverse geocoder when the boundary catalog is
//! already at hand.

use async_trait::async_trait;
use geo::{Area, BoundingRect, Contains, MultiPolygon, Point};
use monarch_map_geocoder::{GeocodeError, RegionLookup};
use rstar::{AABB, RTree, RTreeObject};

use crate::boundaries::RegionGeometry;

/// One indexed region.
struct BoundaryEntry {
    name: String,
    area: f64,
    bounds: AABB<[f64; 2]>,
    polygon: MultiPolygon<f64>,
}

impl BoundaryEntry {
    /// `None` for an empty polygon, which has no bounding box.
    fn new(geometry: &RegionGeometry) -> Option<Self> {
        let rect = geometry.polygon.bounding_rect()?;
        Some(Self {
            name: geometry.name.clone(),
            area: geometry.polygon.unsigned_area(),
            bounds: AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
            polygon: geometry.polygon.clone(),
        })
    }
}

impl RTreeObject for BoundaryEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.bounds
    }
}

/// R-tree of region polygons.
pub struct BoundaryIndex {
    regions: RTree<BoundaryEntry>,
}

impl BoundaryIndex {
    /// Indexes the given regions. Empty polygons are left out.
    #[must_use]
    pub fn new(geometries: &[RegionGeometry]) -> Self {
        let entries: Vec<BoundaryEntry> = geometries.iter().filter_map(BoundaryEntry::new).collect();
        if entries.len() < geometries.len() {
            log::warn!(
                "{} empty boundaries left out of the spatial index",
                geometries.len() - entries.len()
            );
        }

        let regions = RTree::bulk_load(entries);
        log::info!("Indexed {} region boundaries", regions.size());
        Self { regions }
    }

    /// Number of indexed regions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.regions.size()
    }

    /// Whether the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.regions.size() == 0
    }

    /// Returns the source name of the region containing the point.
    ///
    /// Regions can overlap (nested or sloppy catalogs); the smallest
    /// containing area wins.
    #[must_use]
    pub fn locate(&self, lng: f64, lat: f64) -> Option<&str> {
        let point = Point::new(lng, lat);
        self.regions
            .locate_in_envelope_intersecting(&AABB::from_point([lng, lat]))
            .filter(|entry| entry.polygon.contains(&point))
            .min_by(|a, b| a.area.total_cmp(&b.area))
            .map(|entry| entry.name.as_str())
    }
}

#[async_trait]
impl RegionLookup for BoundaryIndex {
    fn id(&self) -> &str {
        "boundary_index"
    }

    async fn lookup(&self, latitude: f64, longitude: f64) -> Result<String, GeocodeError> {
        self.locate(longitude, latitude)
            .map(String::from)
            .ok_or(GeocodeError::MissingRegion)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use geo::polygon;
    use monarch_map_geocoder::{RegionResolver, ResolverConfig};
    use monarch_map_region_models::{RegionKey, Resolution};

    use super::*;

    fn rect(name: &str, x0: f64, y0: f64, x1: f64, y1: f64) -> RegionGeometry {
        let p = polygon![
            (x: x0, y: y0),
            (x: x1, y: y0),
            (x: x1, y: y1),
            (x: x0, y: y1),
        ];
        RegionGeometry::new(name, MultiPolygon(vec![p])).unwrap()
    }

    fn index() -> BoundaryIndex {
        BoundaryIndex::new(&[
            rect("Travis", -98.2, 30.0, -97.3, 30.6),
            rect("Hays", -98.3, 29.7, -97.7, 30.0),
            rect("Downtown", -97.8, 30.2, -97.7, 30.3),
        ])
    }

    #[test]
    fn locates_containing_region() {
        let index = index();
        assert_eq!(index.len(), 3);
        assert_eq!(index.locate(-98.0, 29.8), Some("Hays"));
        assert_eq!(index.locate(-97.5, 30.5), Some("Travis"));
        assert_eq!(index.locate(-90.0, 40.0), None);
    }

    #[test]
    fn smallest_region_wins_on_overlap() {
        assert_eq!(index().locate(-97.75, 30.25), Some("Downtown"));
    }

    #[tokio::test]
    async fn works_as_resolver_backend() {
        let resolver = RegionResolver::new(Arc::new(index()), ResolverConfig::default());

        assert_eq!(
            resolver.resolve(29.8, -98.0).await.unwrap(),
            Resolution::Resolved(RegionKey::new("hays").unwrap())
        );
        assert_eq!(
            resolver.resolve(40.0, -90.0).await.unwrap(),
            Resolution::Unresolved
        );
        assert_eq!(resolver.stats().missing_region, 1);
    }
}
