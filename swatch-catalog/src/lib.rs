//! swatch-catalog library interface
//!
//! Product catalog with dominant-color enrichment and nearest-color
//! suggestions. Exposes the store, services and router for the binary and
//! for integration tests.

pub mod api;
pub mod error;
pub mod ingest;
pub mod services;
pub mod store;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use services::Enricher;
use std::sync::Arc;
use store::CatalogStore;
use swatch_common::config::{IngestConfig, SearchConfig};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// The one catalog store every handler reads and writes through
    pub store: CatalogStore,
    /// Color enrichment, absent when no color extractor is configured
    pub enricher: Option<Arc<Enricher>>,
    /// CSV layout for catalog loads
    pub ingest: IngestConfig,
    pub search: SearchConfig,
    /// Cancelled on shutdown to abandon enrichment in progress
    pub shutdown: CancellationToken,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(store: CatalogStore, enricher: Option<Arc<Enricher>>) -> Self {
        Self {
            store,
            enricher,
            ingest: IngestConfig::default(),
            search: SearchConfig::default(),
            shutdown: CancellationToken::new(),
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    pub fn with_ingest_config(mut self, ingest: IngestConfig) -> Self {
        self.ingest = ingest;
        self
    }

    pub fn with_search_config(mut self, search: SearchConfig) -> Self {
        self.search = search;
        self
    }

    pub async fn record_error(&self, message: impl Into<String>) {
        *self.last_error.write().await = Some(message.into());
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::product_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
