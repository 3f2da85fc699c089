//! Proximity searches along a route path.

use geo::{BoundingRect as _, Closest, ClosestPoint as _, Coord, Intersects as _, Line, LineString, Point, Rect};
use patrol_map_geometry_models::{LatLng, StationLike};

use crate::distance_meters;

/// Upper bound on the number of path samples examined by
/// [`nearest_station_along_path`].
pub const MAX_PATH_SAMPLES: usize = 100;

/// Meters spanned by one degree of latitude.
const METERS_PER_DEGREE: f64 = 111_320.0;

/// The closest station found along a path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearestStation<'a> {
    /// The station.
    pub station: &'a StationLike,
    /// Distance from the closest sampled path point, in meters.
    pub distance_meters: f64,
}

/// Finds the station closest to any sampled point of `path`.
///
/// The path is sampled every `max(1, len / 100)` points so the cost stays
/// near `100 * stations` regardless of path length. Stations with
/// non-finite coordinates are ignored. Ties keep the first candidate seen.
#[must_use]
pub fn nearest_station_along_path<'a>(
    path: &[LatLng],
    stations: &'a [StationLike],
) -> Option<NearestStation<'a>> {
    if path.is_empty() || stations.is_empty() {
        return None;
    }

    let step = (path.len() / MAX_PATH_SAMPLES).max(1);
    let mut best: Option<NearestStation<'a>> = None;

    for point in path.iter().step_by(step) {
        for station in stations {
            if !station.lat.is_finite() || !station.lng.is_finite() {
                continue;
            }
            let distance = distance_meters(*point, station.position());
            if best.is_none_or(|b| distance < b.distance_meters) {
                best = Some(NearestStation {
                    station,
                    distance_meters: distance,
                });
            }
        }
    }

    best
}

/// Returns `true` if `point` is within `threshold_meters` of any segment
/// of `path`.
///
/// Points outside the path's bounding box, grown by the threshold, are
/// rejected before any per-segment work. A single-point path is treated
/// as a point.
#[must_use]
pub fn is_point_near_path(point: LatLng, path: &[LatLng], threshold_meters: f64) -> bool {
    if path.is_empty() || !point.lat.is_finite() || !point.lng.is_finite() {
        return false;
    }

    let line: LineString<f64> = path.iter().map(|p| to_coord(*p)).collect();
    let Some(envelope) = line.bounding_rect() else {
        return false;
    };
    let envelope = expand_by_meters(envelope, threshold_meters);
    let query = to_coord(point);
    if !envelope.intersects(&query) {
        return false;
    }

    if path.len() == 1 {
        return distance_meters(point, path[0]) <= threshold_meters;
    }

    let query = Point::from(query);
    line.lines().any(|segment| {
        segment_distance_meters(&segment, &query).is_some_and(|d| d <= threshold_meters)
    })
}

/// Distance from `point` to the nearest location on `segment`.
///
/// The closest location is found in degree space and then measured with
/// haversine; at route scales the distortion is negligible.
fn segment_distance_meters(segment: &Line<f64>, point: &Point<f64>) -> Option<f64> {
    match segment.closest_point(point) {
        Closest::Intersection(p) | Closest::SinglePoint(p) => Some(distance_meters(
            LatLng::new(point.y(), point.x()),
            LatLng::new(p.y(), p.x()),
        )),
        Closest::Indeterminate => None,
    }
}

fn expand_by_meters(rect: Rect<f64>, meters: f64) -> Rect<f64> {
    let d_lat = meters / METERS_PER_DEGREE;
    let mid_lat = f64::midpoint(rect.min().y, rect.max().y).to_radians();
    let d_lng = meters / (METERS_PER_DEGREE * mid_lat.cos().abs().max(0.01));

    Rect::new(
        Coord {
            x: rect.min().x - d_lng,
            y: rect.min().y - d_lat,
        },
        Coord {
            x: rect.max().x + d_lng,
            y: rect.max().y + d_lat,
        },
    )
}

const fn to_coord(p: LatLng) -> Coord<f64> {
    Coord { x: p.lng, y: p.lat }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn station(name: &str, lat: f64, lng: f64) -> StationLike {
        StationLike {
            name: name.to_string(),
            lat,
            lng,
        }
    }

    /// A straight east-west path of `n` points starting at (20.0, 73.0).
    fn east_west_path(n: usize) -> Vec<LatLng> {
        (0..n)
            .map(|i| {
                #[allow(clippy::cast_precision_loss)]
                let step = i as f64 * 0.0001;
                LatLng::new(20.0, 73.0 + step)
            })
            .collect()
    }

    #[test]
    fn finds_nearest_station() {
        let path = east_west_path(50);
        let stations = vec![
            station("Far", 20.5, 73.0),
            station("Close", 20.001, 73.002),
            station("Medium", 20.01, 73.0),
        ];
        let nearest = nearest_station_along_path(&path, &stations).unwrap();
        assert_eq!(nearest.station.name, "Close");
        assert!(nearest.distance_meters < 200.0);
    }

    #[test]
    fn nearest_station_handles_empty_inputs() {
        assert!(nearest_station_along_path(&[], &[station("A", 0.0, 0.0)]).is_none());
        assert!(nearest_station_along_path(&east_west_path(3), &[]).is_none());
    }

    #[test]
    fn nearest_station_skips_non_finite_coordinates() {
        let path = east_west_path(3);
        let stations = vec![station("Broken", f64::NAN, 73.0), station("Ok", 20.1, 73.0)];
        let nearest = nearest_station_along_path(&path, &stations).unwrap();
        assert_eq!(nearest.station.name, "Ok");
    }

    #[test]
    fn long_paths_are_sampled() {
        // 1000 points -> stride 10; the exact point at index 5 is skipped,
        // so the best distance comes from a sampled neighbour.
        let path = east_west_path(1000);
        let target = path[5];
        let stations = vec![station("On path", target.lat, target.lng)];
        let nearest = nearest_station_along_path(&path, &stations).unwrap();
        assert!(nearest.distance_meters > 0.0);
        assert!(nearest.distance_meters < 100.0);
    }

    #[test]
    fn point_near_segment_interior() {
        let path = vec![LatLng::new(20.0, 73.0), LatLng::new(20.0, 73.01)];
        // ~55 m north of the middle of the segment.
        assert!(is_point_near_path(LatLng::new(20.0005, 73.005), &path, 100.0));
        assert!(!is_point_near_path(LatLng::new(20.0005, 73.005), &path, 30.0));
    }

    #[test]
    fn far_point_rejected() {
        let path = east_west_path(20);
        assert!(!is_point_near_path(LatLng::new(21.0, 74.0), &path, 500.0));
    }

    #[test]
    fn point_beyond_segment_end_uses_endpoint_distance() {
        let path = vec![LatLng::new(20.0, 73.0), LatLng::new(20.0, 73.01)];
        // ~105 m east of the eastern endpoint.
        let point = LatLng::new(20.0, 73.011);
        assert!(is_point_near_path(point, &path, 150.0));
        assert!(!is_point_near_path(point, &path, 80.0));
    }

    #[test]
    fn single_point_path() {
        let path = vec![LatLng::new(20.0, 73.0)];
        assert!(is_point_near_path(LatLng::new(20.0, 73.0), &path, 1.0));
        assert!(!is_point_near_path(LatLng::new(20.01, 73.0), &path, 500.0));
        assert!(!is_point_near_path(LatLng::new(20.0, 73.0), &[], 500.0));
    }
}
