//! `enrich`: resolve a clicked route's village and nearest police station.

use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use patrol_map_boundaries::{BoundaryCache, BoundaryFetcher, BoundarySource};
use patrol_map_enrichment::{
    EnrichmentResult, HttpStationSource, Route, RouteEnricher, RouteStats, StationSource,
    route_stats,
};
use patrol_map_record_models::RecordKind;
use patrol_map_records::registry::all_layers;
use patrol_map_stream::{HttpRowSource, LayerManager, RowSource};
use serde::Serialize;

use crate::consume::collect;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Report {
    route: Route,
    enrichment: EnrichmentResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    stats: Option<RouteStats>,
}

/// Enriches the route in `route_file` and prints the updated route.
///
/// # Errors
///
/// Returns an error if the route file cannot be read or parsed.
/// Reference data that fails to load only leaves fields unset.
pub async fn run(
    boundaries: &str,
    route_file: &Path,
    stations: Option<String>,
    server: Option<&str>,
) -> Result<(), Box<dyn Error>> {
    let text = tokio::fs::read_to_string(route_file).await?;
    let mut route = Route::from_json(&text)?;

    let fetcher = BoundaryFetcher::new(BoundarySource::parse(boundaries));
    let cache = Arc::new(BoundaryCache::new(Arc::new(fetcher)));
    let station_source =
        stations.map(|url| Arc::new(HttpStationSource::new(url)) as Arc<dyn StationSource>);
    let enricher = RouteEnricher::new(cache, station_source);

    let enrichment = enricher.enrich_route(&mut route).await;
    let stats = match server {
        Some(url) => Some(nearby(&route, url).await?),
        None => None,
    };

    let report = Report {
        route,
        enrichment,
        stats,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}

async fn nearby(route: &Route, url: &str) -> Result<RouteStats, Box<dyn Error>> {
    let source: Arc<dyn RowSource> = Arc::new(HttpRowSource::new(url));
    let mut manager = LayerManager::new(source, all_layers());
    manager.activate(RecordKind::EmergencyCall)?;
    manager.activate(RecordKind::Accident)?;

    let calls = manager.calls().ok_or("emergency call layer is not active")?;
    let accidents = manager.accidents().ok_or("accident layer is not active")?;
    let (calls, accidents) = tokio::join!(
        collect(calls, RecordKind::EmergencyCall.as_ref()),
        collect(accidents, RecordKind::Accident.as_ref()),
    );

    for (kind, complete) in [
        (RecordKind::EmergencyCall, calls.is_complete()),
        (RecordKind::Accident, accidents.is_complete()),
    ] {
        if !complete {
            log::warn!("{kind} stream did not complete; counts are partial");
        }
    }

    Ok(route_stats(&route.path, calls.records(), accidents.records()))
}
