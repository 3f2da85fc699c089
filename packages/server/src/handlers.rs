//! HTTP handler functions for the patrol map API.

use actix_web::{HttpResponse, web};
use patrol_map_records::registry::LayerDefinition;
use patrol_map_server_models::{ApiError, ApiHealth, ApiLayer};
use patrol_map_stream::StreamError;
use patrol_map_stream::producer::{open_source, spawn_for_kind};
use patrol_map_stream_models::{CONTENT_TYPE, STREAM_HEADERS};

use crate::AppState;

/// `GET /api/health`
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(ApiHealth {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `GET /api/layers`
///
/// Lists the streamable layers and whether their backing files exist.
pub async fn layers(state: web::Data<AppState>) -> HttpResponse {
    let mut listing = Vec::with_capacity(state.layers.len());
    for layer in &state.layers {
        let available = tokio::fs::try_exists(state.data_dir.join(&layer.file))
            .await
            .unwrap_or(false);
        listing.push(ApiLayer::new(layer, available));
    }

    HttpResponse::Ok().json(listing)
}

/// `GET <layer endpoint>`
///
/// Streams the layer's backing file as `row` events. A missing file is
/// reported as a 404 JSON body before any stream frame is written.
pub async fn stream(state: web::Data<AppState>, layer: web::Data<LayerDefinition>) -> HttpResponse {
    let path = state.data_dir.join(&layer.file);

    let file = match open_source(&path).await {
        Ok(file) => file,
        Err(StreamError::NotFound { path }) => {
            log::error!("CSV file not found: {}", path.display());
            return HttpResponse::NotFound().json(ApiError::new("CSV file not found"));
        }
        Err(e) => {
            log::error!("Failed to open {}: {e}", path.display());
            return HttpResponse::InternalServerError().json(ApiError::new("Failed to open CSV file"));
        }
    };

    log::debug!("Opened {} for {}", path.display(), layer.endpoint);
    let mut frames = spawn_for_kind(layer.kind, file);
    let body = async_stream::stream! {
        while let Some(frame) = frames.recv().await {
            yield Ok::<_, std::convert::Infallible>(web::Bytes::from(frame));
        }
    };

    let mut response = HttpResponse::Ok();
    response.content_type(CONTENT_TYPE);
    for header in STREAM_HEADERS {
        response.insert_header(header);
    }
    response.streaming(body)
}
