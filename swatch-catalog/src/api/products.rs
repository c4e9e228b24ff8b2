//! Product catalog endpoints
//!
//! - `GET  /api/private/product/initFromCsv?file=PATH` replace the catalog
//! - `GET  /api/private/product/count` catalog size
//! - `GET  /api/private/product/:id` one product
//! - `POST /api/private/product/enrichColors?limit=N` run color enrichment
//! - `GET  /api/public/product/suggestByColor/:id?count=K` nearest colors

use crate::ingest;
use crate::services::{suggest_by_color, EnrichmentReport};
use crate::{ApiError, ApiResult, AppState};
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use swatch_common::Product;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
pub struct InitFromCsvParams {
    pub file: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InitFromCsvResponse {
    pub success: bool,
    pub loaded: usize,
    pub skipped: usize,
}

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: usize,
    pub enriched: usize,
}

/// Numeric query params arrive as strings so bad input gets a useful 400
#[derive(Debug, Deserialize)]
pub struct EnrichParams {
    pub limit: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SuggestParams {
    pub count: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SuggestResponse {
    pub reference: Product,
    pub products: Vec<Product>,
}

/// Parse an optional positive integer query parameter
fn parse_positive(name: &str, raw: Option<&str>) -> ApiResult<Option<NonZeroUsize>> {
    match raw {
        None => Ok(None),
        Some(value) => value.trim().parse::<NonZeroUsize>().map(Some).map_err(|_| {
            ApiError::BadRequest(format!(
                "query string param named \"{}\" must be a positive integer",
                name
            ))
        }),
    }
}

/// GET /api/private/product/initFromCsv
///
/// Clears the catalog and loads every row of the CSV file named by `file`.
pub async fn init_from_csv(
    State(state): State<AppState>,
    Query(params): Query<InitFromCsvParams>,
) -> ApiResult<Json<InitFromCsvResponse>> {
    let file = params
        .file
        .filter(|f| !f.trim().is_empty())
        .ok_or_else(|| {
            ApiError::BadRequest("query string param named \"file\" is required".to_string())
        })?;

    let path = std::path::PathBuf::from(&file);
    if !path.is_file() {
        return Err(ApiError::BadRequest(format!(
            "file \"{}\" does not exist",
            file
        )));
    }

    let summary = ingest::load_csv(&state.store, &path, &state.ingest).await?;

    Ok(Json(InitFromCsvResponse {
        success: true,
        loaded: summary.loaded,
        skipped: summary.skipped,
    }))
}

/// GET /api/private/product/count
pub async fn count(State(state): State<AppState>) -> Json<CountResponse> {
    Json(CountResponse {
        count: state.store.len().await,
        enriched: state.store.enriched_count().await,
    })
}

/// GET /api/private/product/:id
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Product>> {
    state
        .store
        .get(&id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("product '{}'", id)))
}

/// POST /api/private/product/enrichColors
///
/// Runs enrichment to completion and returns the run summary. The run is
/// spawned so a disconnecting client does not abandon it halfway.
pub async fn enrich_colors(
    State(state): State<AppState>,
    Query(params): Query<EnrichParams>,
) -> ApiResult<Json<EnrichmentReport>> {
    let limit = parse_positive("limit", params.limit.as_deref())?;
    let enricher = state.enricher.clone().ok_or_else(|| {
        ApiError::Unavailable("color extraction is not configured".to_string())
    })?;

    let cancel = state.shutdown.child_token();
    let report = tokio::spawn(async move { enricher.enrich(limit, &cancel).await })
        .await
        .map_err(|e| ApiError::Internal(format!("Enrichment task failed: {}", e)))??;

    if !report.failed.is_empty() {
        warn!(
            failed = report.failed.len(),
            "Some products could not be enriched"
        );
        state
            .record_error(format!(
                "{} of {} products failed color enrichment",
                report.failed.len(),
                report.dispatched
            ))
            .await;
    }
    info!(
        dispatched = report.dispatched,
        enriched = report.enriched,
        "Enrichment request completed"
    );

    Ok(Json(report))
}

/// GET /api/public/product/suggestByColor/:id
pub async fn suggest_by_color_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<SuggestParams>,
) -> ApiResult<Json<SuggestResponse>> {
    let count = parse_positive("count", params.count.as_deref())?
        .map_or(state.search.default_count, NonZeroUsize::get);

    let (reference, products) = suggest_by_color(&state.store, &id, count).await?;

    Ok(Json(SuggestResponse {
        reference,
        products,
    }))
}

/// Build product routes
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/api/private/product/initFromCsv", get(init_from_csv))
        .route("/api/private/product/count", get(count))
        .route("/api/private/product/enrichColors", post(enrich_colors))
        .route("/api/private/product/:id", get(get_product))
        .route(
            "/api/public/product/suggestByColor/:id",
            get(suggest_by_color_handler),
        )
}
