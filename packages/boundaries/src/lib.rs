#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Reference boundary files.
//!
//! Parses village/police-station boundary files into named polygons and
//! point markers, and caches the parsed result for the session. KML is the
//! primary format (named placemarks, coordinate lists and `SimpleData`
//! metadata); `GeoJSON` feature collections are accepted as well.
//!
//! Loads go through [`cache::BoundaryCache`], which loads at most once and
//! lets a newer request abort an older in-flight one.

pub mod cache;
pub mod geojson_file;
pub mod kml;
pub mod source;

use std::collections::BTreeMap;

use patrol_map_geometry_models::{BoundaryMarker, BoundaryPolygon, LatLng};
use thiserror::Error;

pub use cache::BoundaryCache;
pub use source::{BoundaryFetcher, BoundaryFormat, BoundaryProvider, BoundarySource};

/// Errors that can occur while loading a boundary file.
#[derive(Debug, Error)]
pub enum BoundaryError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Remote server answered with a non-success status.
    #[error("Failed to fetch {url}: HTTP {status}")]
    Status {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// I/O error reading a local file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// KML markup was malformed.
    #[error("KML parse error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// `GeoJSON` document was malformed.
    #[error("GeoJSON parse error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// The load was superseded by a newer request.
    #[error("Boundary load was cancelled")]
    Cancelled,
}

impl BoundaryError {
    /// Returns `true` if the load was cancelled rather than failed.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// The parsed contents of a boundary reference file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundaryFile {
    /// Named polygons with at least three vertices.
    pub boundaries: Vec<BoundaryPolygon>,
    /// Point markers (typically police stations).
    pub markers: Vec<BoundaryMarker>,
}

/// Parses a boundary file in the given format.
///
/// # Errors
///
/// Returns [`BoundaryError`] if the document is malformed.
pub fn parse_boundary_file(text: &str, format: BoundaryFormat) -> Result<BoundaryFile, BoundaryError> {
    let file = match format {
        BoundaryFormat::Kml => kml::parse_kml(text)?,
        BoundaryFormat::GeoJson => geojson_file::parse_geojson(text)?,
    };

    log::info!(
        "Parsed {} boundaries and {} markers",
        file.boundaries.len(),
        file.markers.len()
    );

    Ok(file)
}

/// Default name for the `index`-th (0-based) placemark without a name.
fn fallback_name(index: usize) -> String {
    format!("Location {}", index + 1)
}

/// Reads a marker position from `latitude`/`longitude` properties.
fn position_from_properties(properties: &BTreeMap<String, String>) -> Option<LatLng> {
    let lat = properties.get("latitude")?.trim().parse::<f64>().ok()?;
    let lng = properties.get("longitude")?.trim().parse::<f64>().ok()?;
    (lat.is_finite() && lng.is_finite()).then_some(LatLng::new(lat, lng))
}
