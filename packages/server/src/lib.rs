#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web server for the patrol map.
//!
//! Each registered layer gets a `text/event-stream` endpoint that replays
//! its backing CSV as `row` events. The boundary reference file is served
//! as a static asset under `/reference` so clients can fetch it directly.

mod handlers;

use std::path::PathBuf;

use actix_cors::Cors;
use actix_files::Files;
use actix_web::{App, HttpServer, middleware, web};
use patrol_map_records::RecordError;
use patrol_map_records::registry::{LayerDefinition, all_layers, load_layers};

/// Default data directory holding the layer CSV files.
pub const DEFAULT_DATA_DIR: &str = "emergency-data";

/// Server settings read from the environment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind.
    pub bind_addr: String,
    /// Port to bind.
    pub port: u16,
    /// Directory the layer files are resolved against.
    pub data_dir: PathBuf,
    /// Boundary reference file served under `/reference`.
    pub boundary_file: Option<PathBuf>,
    /// Streamable layers.
    pub layers: Vec<LayerDefinition>,
}

impl ServerConfig {
    /// Reads `BIND_ADDR`, `PORT`, `PATROL_MAP_DATA_DIR`,
    /// `PATROL_MAP_BOUNDARY_FILE` and `PATROL_MAP_LAYERS_FILE`.
    ///
    /// Without `PATROL_MAP_LAYERS_FILE` the built-in layers are used.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError`] if a layers file is configured but cannot be
    /// read or parsed.
    pub fn from_env() -> Result<Self, RecordError> {
        let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);
        let data_dir = std::env::var("PATROL_MAP_DATA_DIR")
            .map_or_else(|_| PathBuf::from(DEFAULT_DATA_DIR), PathBuf::from);
        let boundary_file = std::env::var("PATROL_MAP_BOUNDARY_FILE")
            .ok()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        let layers = match std::env::var("PATROL_MAP_LAYERS_FILE") {
            Ok(path) if !path.is_empty() => {
                log::info!("Loading layers from {path}");
                load_layers(path.as_ref())?
            }
            _ => all_layers(),
        };

        Ok(Self {
            bind_addr,
            port,
            data_dir,
            boundary_file,
            layers,
        })
    }
}

/// Shared application state.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Directory the layer files are resolved against.
    pub data_dir: PathBuf,
    /// Streamable layers.
    pub layers: Vec<LayerDefinition>,
}

/// Registers the stream endpoints and the `/api` scope.
pub fn configure(cfg: &mut web::ServiceConfig, state: &web::Data<AppState>) {
    cfg.app_data(state.clone());

    for layer in &state.layers {
        log::debug!("Registering {} stream at {}", layer.kind, layer.endpoint);
        cfg.service(
            web::resource(layer.endpoint.as_str())
                .app_data(web::Data::new(layer.clone()))
                .route(web::get().to(handlers::stream)),
        );
    }

    cfg.service(
        web::scope("/api")
            .route("/health", web::get().to(handlers::health))
            .route("/layers", web::get().to(handlers::layers)),
    );
}

/// Starts the patrol map server.
///
/// The caller is responsible for providing the async runtime (e.g. via
/// `#[actix_web::main]`) and for initialising logging.
///
/// # Errors
///
/// Returns an `std::io::Result` error if the HTTP server fails to bind or
/// encounters a runtime error.
#[allow(clippy::future_not_send)]
pub async fn run_server(config: ServerConfig) -> std::io::Result<()> {
    let ServerConfig {
        bind_addr,
        port,
        data_dir,
        boundary_file,
        layers,
    } = config;

    log::info!(
        "Serving {} layers from {}",
        layers.len(),
        data_dir.display()
    );

    let reference_dir = boundary_file.as_deref().map(|file| {
        let dir = file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), PathBuf::from);
        log::info!(
            "Serving boundary reference {} under /reference",
            file.display()
        );
        dir
    });

    let state = web::Data::new(AppState { data_dir, layers });

    log::info!("Starting server on {bind_addr}:{port}");

    HttpServer::new(move || {
        let cors = Cors::permissive();

        let mut app = App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .configure(|cfg| configure(cfg, &state));

        if let Some(dir) = &reference_dir {
            app = app.service(Files::new("/reference", dir));
        }

        app
    })
    .bind((bind_addr, port))?
    .run()
    .await
}

#[cfg(test)]
mod tests {
    use actix_web::http::StatusCode;
    use actix_web::test;
    use patrol_map_record_models::RecordKind;

    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "patrol_map_server_{name}_{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn state(data_dir: PathBuf) -> web::Data<AppState> {
        web::Data::new(AppState {
            data_dir,
            layers: all_layers(),
        })
    }

    #[actix_web::test]
    async fn missing_file_is_404_json() {
        let state = state(scratch_dir("missing"));
        let app = test::init_service(App::new().configure(|cfg| configure(cfg, &state))).await;

        let req = test::TestRequest::get()
            .uri("/stream/emergency-calls")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "CSV file not found");
    }

    #[actix_web::test]
    async fn streams_rows_then_done() {
        let dir = scratch_dir("stream");
        std::fs::write(
            dir.join("dial112.csv"),
            "#,Event_Id,Police_Station,Call_Type,Latitude,Longitude,Call_Recieved_Time\n\
             1,E1,Sinnar,Theft,19.85,74.0,2024-01-01 10:00\n\
             2,E2,Sinnar,Theft,bad,74.0,2024-01-01 10:05\n\
             3,E3,Nashik Road,Fire,19.95,73.84,2024-01-01 10:10\n",
        )
        .unwrap();

        let state = state(dir);
        let app = test::init_service(App::new().configure(|cfg| configure(cfg, &state))).await;

        let req = test::TestRequest::get()
            .uri("/stream/emergency-calls")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get("content-type").unwrap(),
            "text/event-stream"
        );
        assert_eq!(resp.headers().get("cache-control").unwrap(), "no-cache");
        assert_eq!(resp.headers().get("x-accel-buffering").unwrap(), "no");

        let body = test::read_body(resp).await;
        let body = std::str::from_utf8(&body).unwrap();
        assert!(body.starts_with(": stream start\n\n"));
        assert_eq!(body.matches("event: row\n").count(), 2);
        assert!(body.contains("\"eventId\":\"E3\""));
        assert!(body.ends_with("event: done\ndata: end\n\n"));
    }

    #[actix_web::test]
    async fn lists_layers_with_availability() {
        let dir = scratch_dir("layers");
        std::fs::write(dir.join("accident_data.csv"), "").unwrap();
        let state = state(dir);
        let app = test::init_service(App::new().configure(|cfg| configure(cfg, &state))).await;

        let req = test::TestRequest::get().uri("/api/layers").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        let layers = body.as_array().unwrap();
        assert_eq!(layers.len(), 2);

        for layer in layers {
            let kind: RecordKind = serde_json::from_value(layer["kind"].clone()).unwrap();
            let expected = kind == RecordKind::Accident;
            assert_eq!(layer["available"], expected);
        }
    }

    #[actix_web::test]
    async fn health_reports_version() {
        let state = state(scratch_dir("health"));
        let app = test::init_service(App::new().configure(|cfg| configure(cfg, &state))).await;

        let req = test::TestRequest::get().uri("/api/health").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["healthy"], true);
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }
}
