#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Boundary attribution geometry.
//!
//! Pure functions over WGS84 positions: ray-casting point-in-polygon,
//! haversine distance, nearest-boundary and nearest-station searches, and
//! point-to-path proximity. Searches are linear scans bounded by
//! construction; boundary and station sets are in the hundreds.

pub mod path;

use std::collections::BTreeMap;

use patrol_map_geometry_models::{BoundaryPolygon, LatLng};

pub use path::{NearestStation, is_point_near_path, nearest_station_along_path};

/// Mean Earth radius used for haversine distances, in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Returns `true` if `point` lies inside `polygon`.
///
/// Uses crossing-number parity: a ray cast toward positive longitude
/// toggles the result at every edge it crosses. Rings with fewer than
/// three vertices contain nothing. Points exactly on an edge get whatever
/// the parity test yields; for an axis-aligned square the bottom and left
/// edges count as inside while the top and right edges do not.
#[must_use]
pub fn point_in_polygon(point: LatLng, polygon: &[LatLng]) -> bool {
    if polygon.len() < 3 {
        return false;
    }

    let x = point.lng;
    let y = point.lat;
    let mut inside = false;

    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let (xi, yi) = (polygon[i].lng, polygon[i].lat);
        let (xj, yj) = (polygon[j].lng, polygon[j].lat);

        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }

    inside
}

/// Returns the first boundary in list order that contains `point`.
///
/// Boundaries are expected not to overlap; when they do, list order is
/// the tie-break.
#[must_use]
pub fn find_containing_boundary(
    point: LatLng,
    boundaries: &[BoundaryPolygon],
) -> Option<&BoundaryPolygon> {
    boundaries
        .iter()
        .find(|b| point_in_polygon(point, &b.vertices))
}

/// Returns the vertex average of a ring, or `(0, 0)` for an empty ring.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn polygon_center(vertices: &[LatLng]) -> LatLng {
    if vertices.is_empty() {
        return LatLng::new(0.0, 0.0);
    }

    let (lat_sum, lng_sum) = vertices
        .iter()
        .fold((0.0, 0.0), |(lat, lng), v| (lat + v.lat, lng + v.lng));
    let n = vertices.len() as f64;

    LatLng::new(lat_sum / n, lng_sum / n)
}

/// Great-circle distance between two positions in meters.
#[must_use]
pub fn distance_meters(a: LatLng, b: LatLng) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_METERS * c
}

/// A boundary together with its distance from a query point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearestBoundary<'a> {
    /// The closest boundary.
    pub boundary: &'a BoundaryPolygon,
    /// Distance from the query point to the boundary's center, in meters.
    pub distance_meters: f64,
}

/// Finds the boundary whose center is closest to `point`.
///
/// Distance is measured to the [`polygon_center`], not to the nearest
/// edge. Ties keep the earlier boundary.
#[must_use]
pub fn nearest_boundary(point: LatLng, boundaries: &[BoundaryPolygon]) -> Option<NearestBoundary<'_>> {
    let mut best: Option<NearestBoundary<'_>> = None;

    for boundary in boundaries {
        let distance = distance_meters(point, polygon_center(&boundary.vertices));
        if best.is_none_or(|b| distance < b.distance_meters) {
            best = Some(NearestBoundary {
                boundary,
                distance_meters: distance,
            });
        }
    }

    best
}

/// Keeps the items whose position falls inside `boundary`.
pub fn filter_points_in_boundary<'a, T>(
    items: &'a [T],
    boundary: &BoundaryPolygon,
    position: impl Fn(&T) -> LatLng,
) -> Vec<&'a T> {
    items
        .iter()
        .filter(|item| point_in_polygon(position(item), &boundary.vertices))
        .collect()
}

/// Finds a boundary by name, ignoring case.
///
/// An exact match wins; otherwise the first boundary whose name contains
/// the search term, or is contained in it, is returned.
#[must_use]
pub fn find_boundary_by_name<'a>(
    name: &str,
    boundaries: &'a [BoundaryPolygon],
) -> Option<&'a BoundaryPolygon> {
    let term = name.trim().to_lowercase();
    if term.is_empty() {
        return None;
    }

    boundaries
        .iter()
        .find(|b| b.name.to_lowercase() == term)
        .or_else(|| {
            boundaries.iter().find(|b| {
                let candidate = b.name.to_lowercase();
                candidate.contains(&term) || term.contains(&candidate)
            })
        })
}

/// Groups items by the boundary that contains them.
///
/// Every boundary name is present in the result, with an empty list if no
/// item falls inside it. Items outside all boundaries are dropped.
pub fn group_points_by_boundary<'a, 'b, T>(
    items: &'b [T],
    boundaries: &'a [BoundaryPolygon],
    position: impl Fn(&T) -> LatLng,
) -> BTreeMap<&'a str, Vec<&'b T>> {
    let mut groups: BTreeMap<&'a str, Vec<&'b T>> = boundaries
        .iter()
        .map(|b| (b.name.as_str(), Vec::new()))
        .collect();

    for item in items {
        if let Some(boundary) = find_containing_boundary(position(item), boundaries)
            && let Some(group) = groups.get_mut(boundary.name.as_str())
        {
            group.push(item);
        }
    }

    groups
}
