//! `GeoJSON` export of joined regions.
//!
//! Produces the feature collection a choropleth layer consumes: one
//! feature per region with `region`, `name`, and `sightings` properties.

use geojson::{Feature, FeatureCollection, Geometry, JsonObject};

use crate::join::JoinedRegion;

/// Converts joined regions into a `GeoJSON` feature collection.
#[must_use]
pub fn to_feature_collection(joined: &[JoinedRegion]) -> FeatureCollection {
    let features = joined.iter().map(to_feature).collect();

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

fn to_feature(region: &JoinedRegion) -> Feature {
    let mut properties = JsonObject::new();
    properties.insert("region".to_string(), region.region.as_str().into());
    properties.insert("name".to_string(), region.name.clone().into());
    properties.insert("sightings".to_string(), region.sighting_count.into());

    Feature {
        bbox: None,
        geometry: Some(Geometry::new(geojson::Value::from(&region.polygon))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

#[cfg(test)]
mod tests {
    use geo::{MultiPolygon, polygon};
    use monarch_map_region_models::RegionKey;

    use super::*;

    #[test]
    fn writes_one_feature_per_region() {
        let square = polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
            (x: 0.0, y: 1.0),
        ];
        let joined = vec![JoinedRegion {
            region: RegionKey::new("Travis").unwrap(),
            name: "Travis".to_string(),
            polygon: MultiPolygon(vec![square]),
            sighting_count: 5,
        }];

        let fc = to_feature_collection(&joined);
        assert_eq!(fc.features.len(), 1);

        let value: serde_json::Value = serde_json::from_str(&fc.to_string()).unwrap();
        let feature = &value["features"][0];
        assert_eq!(feature["properties"]["region"], "travis");
        assert_eq!(feature["properties"]["name"], "Travis");
        assert_eq!(feature["properties"]["sightings"], 5);
        assert_eq!(feature["geometry"]["type"], "MultiPolygon");
    }
}
