//! `consume`: stream a layer into a local cache and report what arrived.

use std::error::Error;
use std::sync::Arc;

use patrol_map_boundaries::{BoundaryFetcher, BoundaryProvider, BoundarySource};
use patrol_map_geometry::find_boundary_by_name;
use patrol_map_geometry_models::ViewportBounds;
use patrol_map_record_models::{GeoRecord, RecordKind};
use patrol_map_records::registry::all_layers;
use patrol_map_stream::{HttpRowSource, LayerManager, RecordCache, RowSource};
use patrol_map_viewport::{ViewMode, heatmap_for, visible_set};
use tokio::sync::watch;

/// Parses `north,south,east,west`.
pub fn parse_bbox(value: &str) -> Result<[f64; 4], String> {
    let parts = value
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid coordinate: {e}"))?;

    let [north, south, east, west] = parts[..] else {
        return Err(format!("expected 4 values, got {}", parts.len()));
    };
    if north < south {
        return Err("north must not be below south".to_string());
    }

    Ok([north, south, east, west])
}

/// Builds the view mode from the command-line options.
///
/// # Errors
///
/// Returns an error if the boundary file cannot be loaded or has no
/// boundary matching `area`.
pub async fn view_mode(
    bbox: Option<[f64; 4]>,
    zoom: Option<u32>,
    area: Option<&str>,
    boundaries: Option<&str>,
) -> Result<ViewMode, Box<dyn Error>> {
    if let (Some(name), Some(location)) = (area, boundaries) {
        let file = BoundaryFetcher::new(BoundarySource::parse(location))
            .load()
            .await?;
        let boundary = find_boundary_by_name(name, &file.boundaries)
            .ok_or_else(|| format!("no boundary named '{name}' in {location}"))?;
        log::info!("Showing records inside {}", boundary.name);
        return Ok(ViewMode::Area(boundary.clone()));
    }

    Ok(match (bbox, zoom) {
        (Some([north, south, east, west]), Some(zoom)) => {
            ViewMode::Viewport(ViewportBounds::new(north, south, east, west, zoom))
        }
        _ => ViewMode::Unknown,
    })
}

/// Waits for a layer's cache to finish filling and returns a snapshot.
///
/// Each sealed batch is logged as it lands. A stream that ends without
/// its completion event yields whatever was cached so far, unmarked.
pub async fn collect<R: Clone>(mut rx: watch::Receiver<RecordCache<R>>, label: &str) -> RecordCache<R> {
    let mut seen = 0;
    loop {
        {
            let cache = rx.borrow_and_update();
            if cache.batches() > seen {
                seen = cache.batches();
                log::info!("{label}: batch {seen}, {} records cached", cache.len());
            }
            if cache.is_complete() {
                break;
            }
        }
        if rx.changed().await.is_err() {
            break;
        }
    }

    rx.borrow().clone()
}

/// Streams `kind` from the server at `url` and prints the result for `mode`.
///
/// # Errors
///
/// Returns an error if the layer is not registered or the stream ends
/// before completing.
pub async fn run(kind: RecordKind, url: &str, mode: &ViewMode, heatmap: bool) -> Result<(), Box<dyn Error>> {
    let source: Arc<dyn RowSource> = Arc::new(HttpRowSource::new(url));
    let mut manager = LayerManager::new(source, all_layers());
    manager.activate(kind)?;

    match kind {
        RecordKind::EmergencyCall => {
            let rx = manager.calls().ok_or("emergency call layer is not active")?;
            report(collect(rx, kind.as_ref()).await, mode, heatmap)
        }
        RecordKind::Accident => {
            let rx = manager.accidents().ok_or("accident layer is not active")?;
            report(collect(rx, kind.as_ref()).await, mode, heatmap)
        }
    }
}

fn report<R: GeoRecord>(cache: RecordCache<R>, mode: &ViewMode, heatmap: bool) -> Result<(), Box<dyn Error>> {
    println!(
        "{} {} records in {} batches",
        cache.len(),
        R::KIND,
        cache.batches()
    );

    if heatmap {
        let points = heatmap_for(cache.records(), mode);
        println!("{}", serde_json::to_string_pretty(&points)?);
    } else if !matches!(mode, ViewMode::Unknown) {
        let visible = visible_set(cache.records(), mode);
        println!(
            "{} visible (every {} records)",
            visible.len(),
            visible.skip_factor
        );
        println!("{}", serde_json::to_string_pretty(&visible.records)?);
    }

    if cache.is_complete() {
        Ok(())
    } else {
        Err(format!("{} stream ended before completing", R::KIND).into())
    }
}
