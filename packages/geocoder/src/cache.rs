//! Coordinate-keyed resolution cache.
//!
//! Coordinates are rounded to a fixed number of decimal places (4 by
//! default, roughly 11 m) to form a [`CoordinateKey`]. Both successful
//! resolutions and [`Resolution::Unresolved`] outcomes are cached so a
//! broken endpoint is not hammered for the same degenerate point.
//!
//! [`RegionCache`] is the seam for swapping in a persistent store; the
//! default [`MemoryRegionCache`] lives for the duration of the process.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};

use monarch_map_region_models::Resolution;

/// Highest supported rounding precision. Keeps the scaled integer
/// representation of a longitude well inside `i64`.
pub const MAX_PRECISION: u32 = 9;

/// A coordinate rounded to a fixed decimal precision.
///
/// Stored as scaled integers so that equality and ordering are exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CoordinateKey {
    lat_scaled: i64,
    lon_scaled: i64,
    precision: u32,
}

impl CoordinateKey {
    /// Rounds `(latitude, longitude)` to `precision` decimal places
    /// (clamped to [`MAX_PRECISION`]).
    ///
    /// Callers are expected to have validated the coordinate range.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(latitude: f64, longitude: f64, precision: u32) -> Self {
        let precision = precision.min(MAX_PRECISION);
        let scale = scale(precision);
        Self {
            lat_scaled: (latitude * scale).round() as i64,
            lon_scaled: (longitude * scale).round() as i64,
            precision,
        }
    }

    /// Latitude of the rounded point.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn latitude(&self) -> f64 {
        self.lat_scaled as f64 / scale(self.precision)
    }

    /// Longitude of the rounded point.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn longitude(&self) -> f64 {
        self.lon_scaled as f64 / scale(self.precision)
    }

    /// Number of decimal places this key was rounded to.
    #[must_use]
    pub const fn precision(&self) -> u32 {
        self.precision
    }
}

impl fmt::Display for CoordinateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p = self.precision as usize;
        write!(f, "{:.p$},{:.p$}", self.latitude(), self.longitude())
    }
}

fn scale(precision: u32) -> f64 {
    10f64.powi(i32::try_from(precision).unwrap_or(0))
}

/// Storage for resolved coordinate keys.
///
/// Implementations must tolerate concurrent readers and writers.
/// [`RegionCache::insert`] keeps at most one result per key: when two
/// callers race to insert the same key, the first stored value wins and
/// is returned to both.
pub trait RegionCache: Send + Sync {
    /// Returns the cached resolution for `key`, if any.
    fn get(&self, key: &CoordinateKey) -> Option<Resolution>;

    /// Stores `resolution` for `key` unless a value is already present.
    /// Returns the value that is cached after the call.
    fn insert(&self, key: CoordinateKey, resolution: Resolution) -> Resolution;

    /// Number of cached keys.
    fn len(&self) -> usize;

    /// Whether the cache holds no keys.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Process-scoped in-memory [`RegionCache`].
#[derive(Debug, Default)]
pub struct MemoryRegionCache {
    entries: RwLock<BTreeMap<CoordinateKey, Resolution>>,
}

impl MemoryRegionCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies out every cached entry, ordered by key.
    #[must_use]
    pub fn entries(&self) -> Vec<(CoordinateKey, Resolution)> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(k, v)| (*k, v.clone()))
            .collect()
    }
}

impl RegionCache for MemoryRegionCache {
    fn get(&self, key: &CoordinateKey) -> Option<Resolution> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn insert(&self, key: CoordinateKey, resolution: Resolution) -> Resolution {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_insert(resolution)
            .clone()
    }

    fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use monarch_map_region_models::RegionKey;

    #[test]
    fn nearby_points_share_a_key() {
        let a = CoordinateKey::new(30.267_14, -97.743_06, 4);
        let b = CoordinateKey::new(30.267_11, -97.743_09, 4);
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "30.2671,-97.7431");
    }

    #[test]
    fn distinct_points_get_distinct_keys() {
        let a = CoordinateKey::new(30.2671, -97.7431, 4);
        let b = CoordinateKey::new(30.2672, -97.7431, 4);
        assert_ne!(a, b);
    }

    #[test]
    fn precision_is_clamped() {
        let key = CoordinateKey::new(89.999_999_999_9, 179.999_999_999_9, 20);
        assert_eq!(key.precision(), MAX_PRECISION);
        assert!((key.longitude() - 180.0).abs() < 1e-6);
    }

    #[test]
    fn first_insert_wins() {
        let cache = MemoryRegionCache::new();
        let key = CoordinateKey::new(1.0, 2.0, 4);
        let travis = Resolution::Resolved(RegionKey::new("Travis").unwrap());

        assert_eq!(cache.insert(key, travis.clone()), travis);
        assert_eq!(cache.insert(key, Resolution::Unresolved), travis);
        assert_eq!(cache.get(&key), Some(travis));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn caches_unresolved() {
        let cache = MemoryRegionCache::new();
        let key = CoordinateKey::new(0.0, 0.0, 4);
        assert!(cache.get(&key).is_none());
        cache.insert(key, Resolution::Unresolved);
        assert_eq!(cache.get(&key), Some(Resolution::Unresolved));
    }

    #[test]
    fn concurrent_inserts_keep_one_value() {
        let cache = std::sync::Arc::new(MemoryRegionCache::new());
        let key = CoordinateKey::new(10.0, 10.0, 4);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = std::sync::Arc::clone(&cache);
                std::thread::spawn(move || {
                    let name = format!("region {i}");
                    cache.insert(key, Resolution::Resolved(RegionKey::new(&name).unwrap()))
                })
            })
            .collect();

        let results: Vec<Resolution> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let stored = cache.get(&key).unwrap();
        assert!(results.iter().all(|r| *r == stored));
        assert_eq!(cache.len(), 1);
    }
}
