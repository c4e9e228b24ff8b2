//! Color enrichment pipeline
//!
//! Finds every product without a dominant color and asks the color extractor
//! for one, with a fixed number of calls in flight at a time.
//!
//! Each product is handled independently: a product whose extraction keeps
//! failing is reported in the run summary while the rest of the batch
//! carries on. Transient failures are retried up to `max_attempts` times in
//! total; permanent failures are not retried.

use super::color_extractor::{ColorError, ColorExtractor};
use crate::store::CatalogStore;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use swatch_common::config::VisionConfig;
use swatch_common::Product;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Pipeline-level errors
///
/// Per-product failures never surface here; they are collected in
/// [`EnrichmentReport::failed`].
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("An enrichment run is already in progress")]
    AlreadyRunning,
}

/// Enrichment tuning
#[derive(Debug, Clone)]
pub struct EnrichmentConfig {
    /// Simultaneous extractor calls
    pub max_concurrency: usize,
    /// Total attempts per product when failures are transient
    pub max_attempts: u32,
    /// Pause before each retry; zero retries immediately
    pub retry_delay: Duration,
    /// Per-call limit, exceeded calls count as transient failures
    pub request_timeout: Duration,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self::from_config(&VisionConfig::default())
    }
}

impl EnrichmentConfig {
    pub fn from_config(config: &VisionConfig) -> Self {
        Self {
            max_concurrency: config.max_concurrency.max(1),
            max_attempts: config.max_attempts.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            request_timeout: Duration::from_millis(config.request_timeout_ms),
        }
    }
}

/// A product the run could not enrich
#[derive(Debug, Clone, Serialize)]
pub struct EnrichmentFailure {
    pub product_id: String,
    pub attempts: u32,
    pub error: String,
}

/// Summary of one enrichment run
#[derive(Debug, Clone, Default, Serialize)]
pub struct EnrichmentReport {
    /// Products selected for enrichment
    pub dispatched: usize,
    pub enriched: usize,
    pub failed: Vec<EnrichmentFailure>,
    /// Products skipped or abandoned because the run was cancelled
    pub cancelled: usize,
    /// Colors dropped because the product was removed, or given another
    /// image, while its color was being fetched
    pub discarded: usize,
}

enum ProductOutcome {
    Enriched,
    Failed(EnrichmentFailure),
    Cancelled,
    Discarded,
}

/// Runs enrichment against the shared catalog store
pub struct Enricher {
    store: CatalogStore,
    extractor: Arc<dyn ColorExtractor>,
    config: EnrichmentConfig,
    run_lock: Mutex<()>,
}

impl Enricher {
    pub fn new(
        store: CatalogStore,
        extractor: Arc<dyn ColorExtractor>,
        config: EnrichmentConfig,
    ) -> Self {
        Self {
            store,
            extractor,
            config,
            run_lock: Mutex::new(()),
        }
    }

    /// True while a run is in progress
    pub fn is_running(&self) -> bool {
        self.run_lock.try_lock().is_err()
    }

    /// Enrich up to `limit` unenriched products (all of them when `None`)
    ///
    /// Products are picked in catalog order. Each color is written onto the
    /// record as it is stored when the color arrives, never onto the copy
    /// taken at selection. Returns once every dispatched product has an
    /// outcome.
    pub async fn enrich(
        &self,
        limit: Option<NonZeroUsize>,
        cancel: &CancellationToken,
    ) -> Result<EnrichmentReport, PipelineError> {
        let _run = self
            .run_lock
            .try_lock()
            .map_err(|_| PipelineError::AlreadyRunning)?;

        let candidates: Vec<Product> = self
            .store
            .list()
            .await
            .into_iter()
            .filter(|p| !p.is_enriched())
            .take(limit.map_or(usize::MAX, NonZeroUsize::get))
            .collect();

        let mut report = EnrichmentReport {
            dispatched: candidates.len(),
            ..Default::default()
        };

        if candidates.is_empty() {
            info!("No unenriched products, nothing to do");
            return Ok(report);
        }

        let started = Instant::now();
        info!(
            dispatched = report.dispatched,
            max_concurrency = self.config.max_concurrency,
            extractor = self.extractor.name(),
            "Color enrichment started"
        );

        let outcomes: Vec<ProductOutcome> = stream::iter(candidates)
            .map(|product| {
                let worker = Worker {
                    store: self.store.clone(),
                    extractor: Arc::clone(&self.extractor),
                    config: self.config.clone(),
                    cancel: cancel.clone(),
                };
                async move { worker.enrich_product(product).await }
            })
            .buffer_unordered(self.config.max_concurrency)
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                ProductOutcome::Enriched => report.enriched += 1,
                ProductOutcome::Failed(failure) => report.failed.push(failure),
                ProductOutcome::Cancelled => report.cancelled += 1,
                ProductOutcome::Discarded => report.discarded += 1,
            }
        }
        report.failed.sort_by(|a, b| a.product_id.cmp(&b.product_id));

        info!(
            dispatched = report.dispatched,
            enriched = report.enriched,
            failed = report.failed.len(),
            cancelled = report.cancelled,
            discarded = report.discarded,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Color enrichment finished"
        );

        Ok(report)
    }
}

/// Owned handles for one product's extraction, so each in-flight future is
/// independent of the batch that spawned it
struct Worker {
    store: CatalogStore,
    extractor: Arc<dyn ColorExtractor>,
    config: EnrichmentConfig,
    cancel: CancellationToken,
}

impl Worker {
    async fn enrich_product(self, product: Product) -> ProductOutcome {
        let cancel = &self.cancel;
        let mut attempt = 0;

        loop {
            attempt += 1;
            if cancel.is_cancelled() {
                return ProductOutcome::Cancelled;
            }

            let call = tokio::time::timeout(
                self.config.request_timeout,
                self.extractor
                    .extract_dominant_color(&product.image_reference),
            );

            let result = tokio::select! {
                _ = cancel.cancelled() => return ProductOutcome::Cancelled,
                result = call => result.unwrap_or_else(|_| {
                    Err(ColorError::Transient(format!(
                        "Timed out after {} ms",
                        self.config.request_timeout.as_millis()
                    )))
                }),
            };

            match result {
                Ok(rgb) => {
                    let stored = self
                        .store
                        .set_color(&product.id, &product.image_reference, rgb)
                        .await;
                    if !stored {
                        debug!(
                            product_id = %product.id,
                            "Product removed or changed during extraction, color dropped"
                        );
                        return ProductOutcome::Discarded;
                    }
                    debug!(product_id = %product.id, color = %rgb, attempt, "Product enriched");
                    return ProductOutcome::Enriched;
                }
                Err(e) if e.is_transient() && attempt < self.config.max_attempts => {
                    warn!(
                        product_id = %product.id,
                        attempt,
                        max_attempts = self.config.max_attempts,
                        error = %e,
                        "Color extraction failed, retrying"
                    );
                    if !self.config.retry_delay.is_zero() {
                        tokio::select! {
                            _ = cancel.cancelled() => return ProductOutcome::Cancelled,
                            _ = tokio::time::sleep(self.config.retry_delay) => {}
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        product_id = %product.id,
                        attempt,
                        error = %e,
                        "Color extraction failed, giving up"
                    );
                    return ProductOutcome::Failed(EnrichmentFailure {
                        product_id: product.id,
                        attempts: attempt,
                        error: e.to_string(),
                    });
                }
            }
        }
    }
}
