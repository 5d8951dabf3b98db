//! Region key normalization.
//!
//! Region names arrive from two independently maintained sources (the
//! reverse geocoder and the boundary catalog) and routinely disagree in
//! casing, spacing, and punctuation. Both sides are run through the same
//! [`normalize_region_name`] pipeline before they are compared, so
//! `"St. Mary's  Parish"` and `"st marys parish"` produce the same key.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Apostrophes are dropped without leaving a gap (`Mary's` -> `marys`).
static APOSTROPHE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"['’`]").expect("valid regex"));

/// Any other non-alphanumeric character separates words.
static SEPARATOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{L}\p{N}\s]+").expect("valid regex"));

/// Normalizes a raw region name.
///
/// The pipeline:
/// 1. Lowercase
/// 2. Spell out `&` as `and`
/// 3. Drop apostrophes
/// 4. Replace remaining punctuation with spaces
/// 5. Collapse whitespace and trim
#[must_use]
pub fn normalize_region_name(raw: &str) -> String {
    let lower = raw.to_lowercase().replace('&', " and ");
    let no_apostrophes = APOSTROPHE_RE.replace_all(&lower, "");
    let spaced = SEPARATOR_RE.replace_all(&no_apostrophes, " ");
    spaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// A normalized administrative region identifier (e.g. a county name).
///
/// Can only be built through [`RegionKey::new`], which guarantees the
/// inner string is normalized and non-empty.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RegionKey(String);

impl RegionKey {
    /// Normalizes `raw` into a key. Returns `None` when nothing is left
    /// after normalization (blank or punctuation-only names).
    #[must_use]
    pub fn new(raw: &str) -> Option<Self> {
        let normalized = normalize_region_name(raw);
        if normalized.is_empty() {
            None
        } else {
            Some(Self(normalized))
        }
    }

    /// Returns the normalized key text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RegionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RegionKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Error returned when a string normalizes to an empty region key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmptyRegionKeyError {
    /// The raw value that was rejected.
    pub raw: String,
}

impl fmt::Display for EmptyRegionKeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "region name {:?} is empty after normalization", self.raw)
    }
}

impl std::error::Error for EmptyRegionKeyError {}

impl TryFrom<String> for RegionKey {
    type Error = EmptyRegionKeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value).ok_or(EmptyRegionKeyError { raw: value })
    }
}

impl From<RegionKey> for String {
    fn from(key: RegionKey) -> Self {
        key.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_and_whitespace_collapse_to_same_key() {
        assert_eq!(RegionKey::new("Travis"), RegionKey::new("  travis "));
        assert_eq!(RegionKey::new("TRAVIS"), RegionKey::new("travis"));
        assert_eq!(
            RegionKey::new("San   Luis\tObispo"),
            RegionKey::new("san luis obispo")
        );
    }

    #[test]
    fn strips_punctuation() {
        assert_eq!(normalize_region_name("St. Mary's  Parish"), "st marys parish");
        assert_eq!(normalize_region_name("Miami-Dade"), "miami dade");
        assert_eq!(normalize_region_name("O’Brien"), "obrien");
    }

    #[test]
    fn spells_out_ampersand() {
        assert_eq!(
            normalize_region_name("Lewis & Clark"),
            normalize_region_name("Lewis and Clark")
        );
    }

    #[test]
    fn keeps_non_ascii_letters() {
        assert_eq!(normalize_region_name("Doña Ana"), "doña ana");
    }

    #[test]
    fn rejects_empty_names() {
        assert!(RegionKey::new("").is_none());
        assert!(RegionKey::new("  ... ").is_none());
    }

    #[test]
    fn deserializes_through_normalization() {
        let key: RegionKey = serde_json::from_str("\"  HAYS \"").unwrap();
        assert_eq!(key.as_str(), "hays");
        assert!(serde_json::from_str::<RegionKey>("\"--\"").is_err());
    }
}
