#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Coordinate, boundary, station and viewport types.
//!
//! Everything here is plain data in WGS84 degrees. Boundary polygons and
//! markers come from the reference boundary file; stations come from the
//! station API or fall back to those markers; viewport bounds come from
//! the map widget's idle events.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A WGS84 position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
}

impl LatLng {
    /// Creates a position from latitude and longitude.
    #[must_use]
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// A named closed region (e.g. a village) used for attribution.
///
/// The ring may or may not repeat its first vertex at the end; both forms
/// are treated as closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryPolygon {
    /// Boundary name.
    pub name: String,
    /// Flat key/value metadata attached to the placemark.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    /// Ordered ring of vertices.
    pub vertices: Vec<LatLng>,
}

/// A named point from the boundary file (typically a police station).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryMarker {
    /// Marker title.
    pub title: String,
    /// Marker position.
    pub position: LatLng,
    /// Flat key/value metadata attached to the placemark.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

/// Anything with a name and a position that can serve as a station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationLike {
    /// Station name.
    pub name: String,
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
}

impl StationLike {
    /// Returns the station position.
    #[must_use]
    pub const fn position(&self) -> LatLng {
        LatLng::new(self.lat, self.lng)
    }
}

impl From<&BoundaryMarker> for StationLike {
    fn from(marker: &BoundaryMarker) -> Self {
        Self {
            name: marker.title.clone(),
            lat: marker.position.lat,
            lng: marker.position.lng,
        }
    }
}

/// The visible map rectangle plus the current zoom level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportBounds {
    /// Northern latitude boundary.
    pub north: f64,
    /// Southern latitude boundary.
    pub south: f64,
    /// Eastern longitude boundary.
    pub east: f64,
    /// Western longitude boundary.
    pub west: f64,
    /// Map zoom level.
    pub zoom: u32,
}

impl ViewportBounds {
    /// Creates viewport bounds.
    #[must_use]
    pub const fn new(north: f64, south: f64, east: f64, west: f64, zoom: u32) -> Self {
        Self {
            north,
            south,
            east,
            west,
            zoom,
        }
    }

    /// Returns `true` if the position lies inside the rectangle, edges
    /// included.
    #[must_use]
    pub fn contains(&self, lat: f64, lng: f64) -> bool {
        lat >= self.south && lat <= self.north && lng >= self.west && lng <= self.east
    }
}
