#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line entry point for the patrol map toolchain.
//!
//! ```text
//! patrol_map serve [--port 8080] [--data-dir emergency-data]
//! patrol_map consume emergency_call --url http://127.0.0.1:8080 [--bbox N,S,E,W --zoom 12]
//! patrol_map consume accident --url http://127.0.0.1:8080 --boundaries villages.kml --area Sinnar
//! patrol_map enrich --boundaries villages.kml --route route.json [--stations URL] [--server URL]
//! ```

mod consume;
mod enrich;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use patrol_map_record_models::RecordKind;
use patrol_map_server::ServerConfig;

#[derive(Parser)]
#[command(name = "patrol_map", about = "Patrol map streaming and enrichment tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the stream server
    Serve {
        /// Port to bind (overrides PORT)
        #[arg(long)]
        port: Option<u16>,
        /// Directory holding the layer CSV files (overrides `PATROL_MAP_DATA_DIR`)
        #[arg(long)]
        data_dir: Option<PathBuf>,
        /// Boundary file to serve under /reference
        #[arg(long)]
        boundary_file: Option<PathBuf>,
    },
    /// Stream one layer from a running server into a local cache
    Consume {
        /// Record kind (`emergency_call` or `accident`)
        #[arg(value_parser = parse_kind)]
        kind: RecordKind,
        /// Base URL of the server
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        url: String,
        /// Viewport as `north,south,east,west`
        #[arg(long, value_parser = consume::parse_bbox, requires = "zoom")]
        bbox: Option<[f64; 4]>,
        /// Map zoom level for the viewport
        #[arg(long)]
        zoom: Option<u32>,
        /// Show every record inside the named boundary instead of a viewport
        #[arg(long, requires = "boundaries", conflicts_with = "bbox")]
        area: Option<String>,
        /// Boundary file path or URL used by --area
        #[arg(long)]
        boundaries: Option<String>,
        /// Print heatmap points instead of records
        #[arg(long)]
        heatmap: bool,
    },
    /// Resolve the village and nearest police station for a route
    Enrich {
        /// Boundary file path or URL (KML or GeoJSON)
        #[arg(long)]
        boundaries: String,
        /// Route JSON file
        #[arg(long)]
        route: PathBuf,
        /// Police station list URL
        #[arg(long)]
        stations: Option<String>,
        /// Server base URL; when set, nearby calls and accidents are counted
        #[arg(long)]
        server: Option<String>,
    },
}

fn parse_kind(value: &str) -> Result<RecordKind, String> {
    value.parse().map_err(|_| {
        let known: Vec<&str> = RecordKind::all().iter().map(|k| k.as_ref()).collect();
        format!("unknown record kind '{value}' (expected one of: {})", known.join(", "))
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init_custom_env("RUST_LOG");
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            port,
            data_dir,
            boundary_file,
        } => {
            let mut config = ServerConfig::from_env()?;
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(data_dir) = data_dir {
                config.data_dir = data_dir;
            }
            if boundary_file.is_some() {
                config.boundary_file = boundary_file;
            }

            // The server uses actix-web's runtime, so run it in a blocking
            // task to avoid nesting tokio runtimes.
            tokio::task::spawn_blocking(move || {
                actix_web::rt::System::new().block_on(patrol_map_server::run_server(config))
            })
            .await??;
        }
        Commands::Consume {
            kind,
            url,
            bbox,
            zoom,
            area,
            boundaries,
            heatmap,
        } => {
            let mode = consume::view_mode(bbox, zoom, area.as_deref(), boundaries.as_deref()).await?;
            consume::run(kind, &url, &mode, heatmap).await?;
        }
        Commands::Enrich {
            boundaries,
            route,
            stations,
            server,
        } => {
            enrich::run(&boundaries, &route, stations, server.as_deref()).await?;
        }
    }

    Ok(())
}
