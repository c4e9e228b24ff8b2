//! swatch-catalog - Product catalog service
//!
//! Loads products from CSV, enriches them with the dominant color of their
//! image and serves nearest-color suggestions over HTTP.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use swatch_catalog::services::{Enricher, EnrichmentConfig, VisionClient};
use swatch_catalog::store::{CatalogStore, StoreOptions};
use swatch_catalog::AppState;
use swatch_common::config::{default_config_path, load_toml_config};

/// Command-line arguments for swatch-catalog
#[derive(Parser, Debug)]
#[command(name = "swatch-catalog")]
#[command(about = "Product catalog with color suggestions")]
#[command(version)]
struct Args {
    /// Config file (defaults to the per-user swatch config directory)
    #[arg(short, long, env = "SWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "SWATCH_PORT")]
    port: Option<u16>,

    /// Catalog snapshot file
    #[arg(long, env = "SWATCH_STORE_FILE")]
    store_file: Option<PathBuf>,

    /// Google Cloud Vision API key
    #[arg(long, env = "SWATCH_VISION_API_KEY", hide_env_values = true)]
    vision_api_key: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args
        .config
        .clone()
        .or_else(|| default_config_path("swatch-catalog"));
    let mut config =
        load_toml_config(config_path.as_deref()).context("Failed to load configuration")?;

    // Command line and environment override the file
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(store_file) = args.store_file {
        config.store.file_path = store_file;
    }
    if args.vision_api_key.is_some() {
        config.vision.api_key = args.vision_api_key;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "swatch_catalog={level},swatch_common={level},tower_http=debug",
                    level = config.logging.level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting swatch-catalog on port {}", config.server.port);
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &config_path {
        info!("Config file: {}", path.display());
    }

    let store = CatalogStore::open(StoreOptions::from_config(&config.store))
        .await
        .context("Failed to open catalog store")?;
    info!(
        "Catalog store: {} ({} products)",
        config.store.file_path.display(),
        store.len().await
    );

    let enricher = match config.vision.api_key.as_deref() {
        Some(key) if !key.trim().is_empty() => {
            let client = VisionClient::new(&config.vision, key)
                .map_err(|e| anyhow::anyhow!("Failed to create Vision client: {}", e))?;
            Some(Arc::new(Enricher::new(
                store.clone(),
                Arc::new(client),
                EnrichmentConfig::from_config(&config.vision),
            )))
        }
        _ => {
            warn!("No Vision API key configured, color enrichment is disabled");
            None
        }
    };

    let state = AppState::new(store.clone(), enricher)
        .with_ingest_config(config.ingest.clone())
        .with_search_config(config.search.clone());
    let shutdown = state.shutdown.clone();

    let app = swatch_catalog::build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .context("Server error")?;

    store
        .flush()
        .await
        .context("Failed to write catalog on shutdown")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
///
/// Cancels `shutdown` once a signal arrives so an enrichment run in
/// progress stops dispatching and its request can complete.
async fn shutdown_signal(shutdown: tokio_util::sync::CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
    shutdown.cancel();
}
