#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Picks which cached records to draw.
//!
//! In viewport mode the visible set is every record inside the viewport
//! whose cache index is a multiple of the zoom's skip factor. Sampling by
//! index keeps the output identical for identical inputs and stable as the
//! cache grows. In area mode the visible set is every record inside the
//! selected boundary, undecimated.

pub mod tracker;

use patrol_map_geometry::point_in_polygon;
use patrol_map_geometry_models::{BoundaryPolygon, LatLng, ViewportBounds};
use patrol_map_record_models::GeoRecord;
use serde::{Deserialize, Serialize};

pub use tracker::{ViewportTracker, spawn_tracker};

/// Zoom break points and the skip factor used below each one.
const SKIP_FACTORS: [(u32, usize); 4] = [(10, 50), (12, 20), (14, 10), (16, 5)];

/// Returns the decimation stride for a zoom level.
///
/// `zoom < 10 -> 50`, `10..=11 -> 20`, `12..=13 -> 10`, `14..=15 -> 5`,
/// otherwise `1`. Never increases as zoom increases.
#[must_use]
pub fn skip_factor(zoom: u32) -> usize {
    SKIP_FACTORS
        .iter()
        .find(|(below, _)| zoom < *below)
        .map_or(1, |(_, k)| *k)
}

/// What the map is currently focused on.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ViewMode {
    /// No viewport reported yet.
    #[default]
    Unknown,
    /// Free panning; clip to the viewport and decimate by zoom.
    Viewport(ViewportBounds),
    /// A selected boundary; show everything inside it.
    Area(BoundaryPolygon),
}

/// The records selected for drawing.
#[derive(Debug, Clone, PartialEq)]
pub struct VisibleSet<R> {
    /// Stride that was applied (1 in area mode).
    pub skip_factor: usize,
    /// Cache indices of the selected records, ascending.
    pub indices: Vec<usize>,
    /// The selected records, in cache order.
    pub records: Vec<R>,
}

impl<R> Default for VisibleSet<R> {
    fn default() -> Self {
        Self {
            skip_factor: 1,
            indices: Vec::new(),
            records: Vec::new(),
        }
    }
}

impl<R> VisibleSet<R> {
    /// Number of selected records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if nothing is selected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Decimates `records` for a viewport.
///
/// Unknown bounds or an empty cache give an empty set.
#[must_use]
pub fn decimate<R: GeoRecord>(records: &[R], bounds: Option<&ViewportBounds>) -> VisibleSet<R> {
    let Some(bounds) = bounds else {
        return VisibleSet::default();
    };
    let k = skip_factor(bounds.zoom);

    let mut visible = VisibleSet {
        skip_factor: k,
        ..VisibleSet::default()
    };
    for (index, record) in records.iter().enumerate() {
        if index % k == 0 && bounds.contains(record.latitude(), record.longitude()) {
            visible.indices.push(index);
            visible.records.push(record.clone());
        }
    }

    visible
}

/// Every record inside `area`, without decimation.
#[must_use]
pub fn filter_in_area<R: GeoRecord>(records: &[R], area: &BoundaryPolygon) -> VisibleSet<R> {
    let mut visible = VisibleSet::default();
    for (index, record) in records.iter().enumerate() {
        if point_in_polygon(position(record), &area.vertices) {
            visible.indices.push(index);
            visible.records.push(record.clone());
        }
    }
    visible
}

/// Selects records for `mode`.
#[must_use]
pub fn visible_set<R: GeoRecord>(records: &[R], mode: &ViewMode) -> VisibleSet<R> {
    match mode {
        ViewMode::Unknown => VisibleSet::default(),
        ViewMode::Viewport(bounds) => decimate(records, Some(bounds)),
        ViewMode::Area(area) => filter_in_area(records, area),
    }
}

/// One weighted heatmap sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeatPoint {
    /// Latitude.
    pub lat: f64,
    /// Longitude.
    pub lng: f64,
    /// Relative intensity.
    pub weight: f64,
}

/// Heatmap input for every record; heatmaps are never decimated.
#[must_use]
pub fn heatmap_points<'a, R: GeoRecord>(records: impl IntoIterator<Item = &'a R>) -> Vec<HeatPoint> {
    records
        .into_iter()
        .map(|r| HeatPoint {
            lat: r.latitude(),
            lng: r.longitude(),
            weight: r.heat_weight(),
        })
        .collect()
}

/// Heatmap input for `mode`: the whole cache, or only the selected area.
#[must_use]
pub fn heatmap_for<R: GeoRecord>(records: &[R], mode: &ViewMode) -> Vec<HeatPoint> {
    match mode {
        ViewMode::Area(area) => heatmap_points(
            records
                .iter()
                .filter(|r| point_in_polygon(position(*r), &area.vertices)),
        ),
        ViewMode::Unknown | ViewMode::Viewport(_) => heatmap_points(records),
    }
}

fn position<R: GeoRecord>(record: &R) -> LatLng {
    LatLng::new(record.latitude(), record.longitude())
}
