#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Route click enrichment.
//!
//! When a route is clicked, the boundary containing its start point (or
//! end point) and the police station nearest to its path are looked up and
//! merged into the route's display metadata. Reference data is loaded on
//! first use and kept for the session; load failures leave the affected
//! fields empty instead of failing the click.

pub mod stations;
pub mod stats;

use std::sync::Arc;

use patrol_map_boundaries::{BoundaryCache, BoundaryError};
use patrol_map_geometry::{find_containing_boundary, nearest_station_along_path};
use patrol_map_geometry_models::{BoundaryPolygon, LatLng, StationLike};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::OnceCell;

pub use stations::{HttpStationSource, StationSource, parse_stations};
pub use stats::{PROXIMITY_METERS, RouteStats, count_near_path, route_stats};

/// Errors that can occur while loading enrichment reference data.
#[derive(Debug, Error)]
pub enum EnrichmentError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Station endpoint answered with a non-success status.
    #[error("Failed to fetch {url}: HTTP {status}")]
    Status {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// Boundary file could not be loaded.
    #[error("Boundary error: {0}")]
    Boundary(#[from] BoundaryError),

    /// Route JSON could not be decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A clicked route and its display metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Ordered path points from start to end.
    pub path: Vec<LatLng>,
    /// Village the route belongs to, if known.
    #[serde(default)]
    pub village: Option<String>,
    /// Responsible police station, if known.
    #[serde(default)]
    pub police_station: Option<String>,
}

impl Route {
    /// Parses a route from its JSON form.
    ///
    /// # Errors
    ///
    /// Returns [`EnrichmentError::Json`] if the JSON is malformed.
    pub fn from_json(text: &str) -> Result<Self, EnrichmentError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Overrides the village and police station with whatever `result`
    /// found, keeping the route's own values otherwise.
    pub fn apply(&mut self, result: &EnrichmentResult) {
        if let Some(name) = &result.boundary_name {
            self.village = Some(name.clone());
        }
        if let Some(name) = &result.nearest_station_name {
            self.police_station = Some(name.clone());
        }
    }
}

/// What enrichment found for one route.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentResult {
    /// Boundary containing the start (or end) point.
    pub boundary_name: Option<String>,
    /// Station nearest to any sampled path point.
    pub nearest_station_name: Option<String>,
    /// Distance to that station in meters.
    pub nearest_station_distance: Option<f64>,
}

/// Finds the boundary containing the start point, falling back to the end
/// point.
#[must_use]
pub fn boundary_for_route<'a>(path: &[LatLng], boundaries: &'a [BoundaryPolygon]) -> Option<&'a BoundaryPolygon> {
    let start = path.first()?;
    find_containing_boundary(*start, boundaries).or_else(|| {
        path.last()
            .and_then(|end| find_containing_boundary(*end, boundaries))
    })
}

/// Enriches routes against lazily loaded reference data.
pub struct RouteEnricher {
    boundaries: Arc<BoundaryCache>,
    station_source: Option<Arc<dyn StationSource>>,
    stations: OnceCell<Arc<Vec<StationLike>>>,
}

impl RouteEnricher {
    /// Creates an enricher.
    ///
    /// With no `station_source`, stations come from the boundary file's
    /// point markers.
    #[must_use]
    pub fn new(boundaries: Arc<BoundaryCache>, station_source: Option<Arc<dyn StationSource>>) -> Self {
        Self {
            boundaries,
            station_source,
            stations: OnceCell::new(),
        }
    }

    /// The station pool, loading it on first use.
    ///
    /// Stations come from the station source; when it fails or returns
    /// nothing, the boundary file's markers are used instead. Only a
    /// successful load is cached.
    ///
    /// # Errors
    ///
    /// Returns [`EnrichmentError`] if the station source yields nothing
    /// and the boundary file cannot be loaded.
    pub async fn stations(&self) -> Result<Arc<Vec<StationLike>>, EnrichmentError> {
        self.stations
            .get_or_try_init(|| async {
                let mut pool = Vec::new();
                if let Some(source) = &self.station_source {
                    match source.stations().await {
                        Ok(stations) => pool = stations,
                        Err(e) => log::warn!("Station source unavailable: {e}"),
                    }
                }

                if pool.is_empty() {
                    let file = self.boundaries.load().await?;
                    log::info!(
                        "Using {} boundary markers as the station pool",
                        file.markers.len()
                    );
                    pool = file.markers.iter().map(StationLike::from).collect();
                }

                Ok::<_, EnrichmentError>(Arc::new(pool))
            })
            .await
            .cloned()
    }

    /// Enriches one route path.
    ///
    /// Never fails: fields whose reference data could not be loaded are
    /// left `None`.
    pub async fn enrich(&self, path: &[LatLng]) -> EnrichmentResult {
        let mut result = EnrichmentResult::default();

        match self.boundaries.load().await {
            Ok(file) => {
                result.boundary_name = boundary_for_route(path, &file.boundaries).map(|b| b.name.clone());
            }
            Err(e) if e.is_cancelled() => log::debug!("Boundary load superseded"),
            Err(e) => log::warn!("Boundary lookup skipped: {e}"),
        }

        match self.stations().await {
            Ok(stations) => {
                if let Some(nearest) = nearest_station_along_path(path, &stations) {
                    result.nearest_station_name = Some(nearest.station.name.clone());
                    result.nearest_station_distance = Some(nearest.distance_meters);
                }
            }
            Err(EnrichmentError::Boundary(e)) if e.is_cancelled() => {
                log::debug!("Station load superseded");
            }
            Err(e) => log::warn!("Nearest station lookup skipped: {e}"),
        }

        result
    }

    /// Enriches `route` in place and returns what was found.
    pub async fn enrich_route(&self, route: &mut Route) -> EnrichmentResult {
        let result = self.enrich(&route.path).await;
        route.apply(&result);
        result
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use patrol_map_boundaries::{BoundaryFile, BoundaryProvider};
    use patrol_map_geometry::distance_meters;
    use patrol_map_geometry_models::BoundaryMarker;

    use super::*;

    fn square(name: &str, south: f64, west: f64, size: f64) -> BoundaryPolygon {
        BoundaryPolygon {
            name: name.to_string(),
            properties: BTreeMap::new(),
            vertices: vec![
                LatLng::new(south, west),
                LatLng::new(south, west + size),
                LatLng::new(south + size, west + size),
                LatLng::new(south + size, west),
            ],
        }
    }

    struct StaticBoundaries {
        file: Option<BoundaryFile>,
        loads: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl BoundaryProvider for StaticBoundaries {
        async fn load(&self) -> Result<BoundaryFile, BoundaryError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            self.file.clone().ok_or(BoundaryError::Status {
                url: "http://localhost/villages.kml".to_string(),
                status: 404,
            })
        }
    }

    struct FixedStations(Result<Vec<StationLike>, u16>);

    #[async_trait::async_trait]
    impl StationSource for FixedStations {
        async fn stations(&self) -> Result<Vec<StationLike>, EnrichmentError> {
            self.0.clone().map_err(|status| EnrichmentError::Status {
                url: "http://localhost/stations".to_string(),
                status,
            })
        }
    }

    fn boundaries(file: Option<BoundaryFile>) -> (Arc<BoundaryCache>, Arc<StaticBoundaries>) {
        let provider = Arc::new(StaticBoundaries {
            file,
            loads: AtomicUsize::new(0),
        });
        (Arc::new(BoundaryCache::new(provider.clone())), provider)
    }

    fn station(name: &str, lat: f64, lng: f64) -> StationLike {
        StationLike {
            name: name.to_string(),
            lat,
            lng,
        }
    }

    /// Eastward path starting inside "Village X".
    fn route_path() -> Vec<LatLng> {
        (0..=20)
            .map(|i| LatLng::new(20.05, 73.05 + f64::from(i) * 0.005))
            .collect()
    }

    #[tokio::test]
    async fn resolves_village_and_nearest_station() {
        let file = BoundaryFile {
            boundaries: vec![square("Village W", 21.0, 74.0, 0.1), square("Village X", 20.0, 73.0, 0.1)],
            markers: vec![],
        };
        let (cache, _) = boundaries(Some(file));
        let path = route_path();
        // ~67 m north of the path midpoint.
        let station_y = station("Station Y", 20.0506, 73.1);
        let stations = vec![
            station("Station Z", 20.2, 73.1),
            station_y.clone(),
            station("Station Q", 20.06, 73.3),
        ];
        let enricher = RouteEnricher::new(cache, Some(Arc::new(FixedStations(Ok(stations)))));

        let mut route = Route {
            name: "Procession 4".to_string(),
            path,
            village: Some("Unknown".to_string()),
            police_station: None,
        };
        let result = enricher.enrich_route(&mut route).await;

        assert_eq!(result.boundary_name.as_deref(), Some("Village X"));
        assert_eq!(result.nearest_station_name.as_deref(), Some("Station Y"));
        let distance = result.nearest_station_distance.unwrap();
        assert!(distance < 80.0, "{distance}");
        assert!((distance - distance_meters(LatLng::new(20.05, 73.1), station_y.position())).abs() < 1e-6);
        assert_eq!(route.village.as_deref(), Some("Village X"));
        assert_eq!(route.police_station.as_deref(), Some("Station Y"));
    }

    #[tokio::test]
    async fn falls_back_to_end_point() {
        let file = BoundaryFile {
            boundaries: vec![square("Village E", 20.0, 73.1, 0.1)],
            markers: vec![],
        };
        let (cache, _) = boundaries(Some(file));
        let enricher = RouteEnricher::new(cache, Some(Arc::new(FixedStations(Ok(vec![])))));

        let result = enricher.enrich(&route_path()).await;
        assert_eq!(result.boundary_name.as_deref(), Some("Village E"));
        assert_eq!(result.nearest_station_name, None);
    }

    #[tokio::test]
    async fn uses_boundary_markers_when_source_fails() {
        let file = BoundaryFile {
            boundaries: vec![],
            markers: vec![BoundaryMarker {
                title: "Marker PS".to_string(),
                position: LatLng::new(20.05, 73.06),
                properties: BTreeMap::new(),
            }],
        };
        let (cache, provider) = boundaries(Some(file));
        let enricher = RouteEnricher::new(cache, Some(Arc::new(FixedStations(Err(503)))));

        let result = enricher.enrich(&route_path()).await;
        assert_eq!(result.boundary_name, None);
        assert_eq!(result.nearest_station_name.as_deref(), Some("Marker PS"));

        enricher.enrich(&route_path()).await;
        assert_eq!(provider.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn load_failures_leave_fields_empty() {
        let (cache, _) = boundaries(None);
        let enricher = RouteEnricher::new(cache, None);

        let mut route = Route {
            name: String::new(),
            path: route_path(),
            village: Some("Kept".to_string()),
            police_station: Some("Kept PS".to_string()),
        };
        let result = enricher.enrich_route(&mut route).await;

        assert_eq!(result, EnrichmentResult::default());
        assert_eq!(route.village.as_deref(), Some("Kept"));
        assert_eq!(route.police_station.as_deref(), Some("Kept PS"));
        assert!(enricher.stations().await.is_err());
    }

    #[test]
    fn route_json_shape() {
        let route = Route::from_json(
            r#"{"name":"R1","path":[{"lat":20.0,"lng":73.0}],"policeStation":"Sinnar"}"#,
        )
        .unwrap();
        assert_eq!(route.path, vec![LatLng::new(20.0, 73.0)]);
        assert_eq!(route.police_station.as_deref(), Some("Sinnar"));
        assert_eq!(route.village, None);
        assert!(matches!(Route::from_json("{}"), Err(EnrichmentError::Json(_))));
    }
}
