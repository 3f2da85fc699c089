//! Counts of cached records near a route.

use patrol_map_geometry::is_point_near_path;
use patrol_map_geometry_models::LatLng;
use patrol_map_record_models::{AccidentRecord, EmergencyCallRecord, GeoRecord};
use serde::{Deserialize, Serialize};

/// Distance from the path within which a record counts as nearby.
pub const PROXIMITY_METERS: f64 = 500.0;

/// Nearby record counts for one route.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteStats {
    /// Emergency calls within [`PROXIMITY_METERS`].
    pub calls_nearby: usize,
    /// Accident cells within [`PROXIMITY_METERS`].
    pub accidents_nearby: usize,
}

/// Counts records within `threshold_meters` of `path`.
#[must_use]
pub fn count_near_path<R: GeoRecord>(records: &[R], path: &[LatLng], threshold_meters: f64) -> usize {
    records
        .iter()
        .filter(|r| {
            is_point_near_path(
                LatLng::new(r.latitude(), r.longitude()),
                path,
                threshold_meters,
            )
        })
        .count()
}

/// Counts cached calls and accidents near `path`.
#[must_use]
pub fn route_stats(path: &[LatLng], calls: &[EmergencyCallRecord], accidents: &[AccidentRecord]) -> RouteStats {
    RouteStats {
        calls_nearby: count_near_path(calls, path, PROXIMITY_METERS),
        accidents_nearby: count_near_path(accidents, path, PROXIMITY_METERS),
    }
}
