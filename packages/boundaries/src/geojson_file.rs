//! `GeoJSON` boundary files.
//!
//! Polygon and multi-polygon features contribute their outer rings as
//! boundaries (one per polygon, sharing the feature name). Point features
//! and features carrying `latitude`/`longitude` properties become markers.

use std::collections::BTreeMap;

use geojson::{Feature, GeoJson, Value};
use patrol_map_geometry_models::{BoundaryMarker, BoundaryPolygon, LatLng};

use crate::{BoundaryError, BoundaryFile, fallback_name, position_from_properties};

/// Property keys tried, in order, for a feature's name.
const NAME_KEYS: &[&str] = &["name", "Name", "NAME", "title"];

/// Parses a `GeoJSON` document into boundaries and markers.
///
/// # Errors
///
/// Returns [`BoundaryError::GeoJson`] if the document is not valid
/// `GeoJSON`.
pub fn parse_geojson(text: &str) -> Result<BoundaryFile, BoundaryError> {
    let features = match text.parse::<GeoJson>()? {
        GeoJson::FeatureCollection(fc) => fc.features,
        GeoJson::Feature(f) => vec![f],
        GeoJson::Geometry(g) => vec![Feature {
            geometry: Some(g),
            ..Feature::default()
        }],
    };

    let mut file = BoundaryFile::default();
    for (index, feature) in features.iter().enumerate() {
        add_feature(feature, index, &mut file);
    }

    Ok(file)
}

fn add_feature(feature: &Feature, index: usize, file: &mut BoundaryFile) {
    let properties = flatten_properties(feature);
    let name = NAME_KEYS
        .iter()
        .find_map(|key| properties.get(*key))
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| fallback_name(index));

    let mut point = None;
    match feature.geometry.as_ref().map(|g| &g.value) {
        Some(Value::Polygon(rings)) => {
            push_ring(file, &name, &properties, rings.first());
        }
        Some(Value::MultiPolygon(polygons)) => {
            for rings in polygons {
                push_ring(file, &name, &properties, rings.first());
            }
        }
        Some(Value::Point(position)) => point = to_lat_lng(position),
        _ => {}
    }

    if let Some(position) = position_from_properties(&properties).or(point) {
        file.markers.push(BoundaryMarker {
            title: name,
            position,
            properties,
        });
    }
}

fn push_ring(
    file: &mut BoundaryFile,
    name: &str,
    properties: &BTreeMap<String, String>,
    ring: Option<&Vec<Vec<f64>>>,
) {
    let vertices: Vec<LatLng> = ring
        .map(|r| r.iter().filter_map(|p| to_lat_lng(p)).collect())
        .unwrap_or_default();

    if vertices.len() >= 3 {
        file.boundaries.push(BoundaryPolygon {
            name: name.to_string(),
            properties: properties.clone(),
            vertices,
        });
    }
}

fn to_lat_lng(position: &[f64]) -> Option<LatLng> {
    match position {
        [lng, lat, ..] if lat.is_finite() && lng.is_finite() => Some(LatLng::new(*lat, *lng)),
        _ => None,
    }
}

/// Flattens scalar feature properties to strings; nested values and nulls
/// are dropped.
fn flatten_properties(feature: &Feature) -> BTreeMap<String, String> {
    feature
        .properties
        .iter()
        .flatten()
        .filter_map(|(key, value)| {
            let text = match value {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Bool(b) => b.to_string(),
                _ => return None,
            };
            Some((key.clone(), text))
        })
        .collect()
}
