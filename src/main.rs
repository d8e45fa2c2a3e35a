//! campus-insight binary — thin CLI shell over the [`campus_insight`]
//! library crate.

use std::path::PathBuf;
use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use clap::Parser;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use campus_insight::api::{delete_dataset, echo, list_datasets, put_dataset, query, AppState};
use campus_insight::config::Config;
use campus_insight::facade::Facade;
use campus_insight::ingest::geocode::Geocoder;
use campus_insight::store::Store;

/// Single-node analytical data service for university course and campus-room data.
#[derive(Parser)]
#[command(name = "campus-insight", version, about, long_about = None)]
struct Cli {
    /// Load settings from a TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory datasets are persisted under (overrides config file)
    #[arg(long)]
    storage_dir: Option<PathBuf>,

    /// Base URL of the geocoder service (overrides config file)
    #[arg(long)]
    geocoder_base: Option<String>,

    /// Maximum accepted archive size in bytes (overrides config file)
    #[arg(long)]
    max_archive_bytes: Option<u64>,

    /// Bind to 0.0.0.0 instead of 127.0.0.1 (localhost)
    #[arg(long)]
    bind_all: bool,

    /// Listen port (otherwise auto-scanned; honors $PORT too)
    #[arg(long)]
    port: Option<u16>,
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("received SIGINT, shutting down"),
            _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.expect("failed to listen for Ctrl+C");
        info!("received Ctrl+C, shutting down");
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("campus_insight=info".parse().unwrap()),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref());
    if let Some(dir) = cli.storage_dir {
        config.storage_dir = dir;
    }
    if let Some(base) = cli.geocoder_base {
        config.geocoder_base = base;
    }
    if let Some(max) = cli.max_archive_bytes {
        config.max_archive_bytes = max;
    }
    if cli.bind_all {
        config.bind_all = true;
    }

    let store = Store::new(config.storage_dir.clone());
    let geocoder = Geocoder::new(config.geocoder_base.clone());
    let facade = Facade::new(store, geocoder);
    let state = Arc::new(AppState { facade, max_archive_bytes: config.max_archive_bytes });

    let bind_addr = if config.bind_all { "0.0.0.0" } else { "127.0.0.1" };
    let explicit_port: Option<u16> =
        cli.port.or_else(|| std::env::var("PORT").ok().and_then(|p| p.parse().ok()));

    let listener = if let Some(port) = explicit_port {
        tokio::net::TcpListener::bind(format!("{bind_addr}:{port}")).await.unwrap_or_else(|e| {
            error!(port = port, error = %e, "could not bind to port");
            std::process::exit(1);
        })
    } else {
        const BASE: u16 = 8712;
        const RANGE: u16 = 10;
        let mut found = None;
        for port in BASE..BASE + RANGE {
            if let Ok(l) = tokio::net::TcpListener::bind(format!("{bind_addr}:{port}")).await {
                found = Some(l);
                break;
            }
        }
        found.unwrap_or_else(|| {
            error!(range_start = BASE, range_end = BASE + RANGE - 1, "no free port found");
            std::process::exit(1);
        })
    };

    let port = listener.local_addr().unwrap().port();

    let app = Router::new()
        .route("/dataset/{id}/{kind}", axum::routing::put(put_dataset))
        .route("/dataset/{id}", delete(delete_dataset))
        .route("/datasets", get(list_datasets))
        .route("/query", post(query))
        .route("/echo/{msg}", get(echo))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    info!(storage_dir = %config.storage_dir.display(), "storage directory");
    info!(port = port, "http://{bind_addr}:{port}");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await.unwrap();
}
