//! Catalog store
//!
//! Owns the authoritative in-memory map of product id → product and keeps a
//! JSON snapshot of it on disk for crash recovery.
//!
//! # Deferred persistence
//!
//! Mutations return as soon as the map is updated. The snapshot write
//! happens later on a single persist path, driven by this state machine:
//!
//! | State                   | mutation                 | timer fires      | persist completes        |
//! |-------------------------|--------------------------|------------------|--------------------------|
//! | `Idle`                  | → `Pending`, arm timer   | -                | -                        |
//! | `Pending`               | (coalesced)              | → `Persisting`   | -                        |
//! | `Persisting`            | → `PersistingWithPending`| (no-op)          | → `Idle`                 |
//! | `PersistingWithPending` | (coalesced)              | (no-op)          | → `Pending`, arm timer   |
//!
//! At most one snapshot write runs at a time, and a mutation that lands
//! while a write is in flight is picked up by the next cycle.
//!
//! Only the most recently armed timer may start a write. `flush` takes over
//! a pending cycle and disarms its timer, so a timer left over from an
//! earlier cycle never cuts a later debounce window short.

pub mod snapshot;

use snapshot::{read_snapshot, JsonFileWriter, Snapshot, SnapshotWriter};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use swatch_common::config::{PersistFailurePolicy, StoreConfig};
use swatch_common::{Product, Rgb};
use thiserror::Error;
use tokio::sync::{Mutex, Notify, RwLock};
use tracing::{debug, error, info};

/// Process exit code used when a snapshot write fails under
/// [`PersistFailurePolicy::Exit`]
pub const PERSIST_FAILURE_EXIT_CODE: i32 = 74;

/// Store errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backing file exists but could not be read
    #[error("Failed to read store file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Backing file content is not a valid snapshot
    #[error("Failed to parse store file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Snapshot could not be written
    #[error("Failed to write store file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Catalog could not be serialized
    #[error("Failed to serialize catalog: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Persistence state, see the module documentation for transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistState {
    Idle,
    Pending,
    Persisting,
    PersistingWithPending,
}

/// Store construction options
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub file_path: PathBuf,
    pub persist_delay: Duration,
    pub on_persist_failure: PersistFailurePolicy,
}

impl StoreOptions {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
            persist_delay: Duration::from_millis(swatch_common::config::DEFAULT_PERSIST_DELAY_MS),
            on_persist_failure: PersistFailurePolicy::default(),
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self {
            file_path: config.file_path.clone(),
            persist_delay: Duration::from_millis(config.persist_delay_ms),
            on_persist_failure: config.on_persist_failure,
        }
    }

    pub fn with_persist_delay(mut self, delay: Duration) -> Self {
        self.persist_delay = delay;
        self
    }

    pub fn with_failure_policy(mut self, policy: PersistFailurePolicy) -> Self {
        self.on_persist_failure = policy;
        self
    }
}

/// Shared handle to the catalog
///
/// Cloning is cheap; every clone refers to the same map and persist path.
#[derive(Clone)]
pub struct CatalogStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    products: RwLock<Snapshot>,
    persist_state: Mutex<PersistState>,
    /// Identifies the one armed timer allowed to act; read and bumped only
    /// while `persist_state` is locked
    timer_epoch: AtomicU64,
    persist_done: Notify,
    writer: Arc<dyn SnapshotWriter>,
    persist_delay: Duration,
    on_persist_failure: PersistFailurePolicy,
}

impl CatalogStore {
    /// Load the catalog from its backing file and start serving it
    ///
    /// A missing file yields an empty catalog. A file that exists but cannot
    /// be read or parsed is an error.
    pub async fn open(options: StoreOptions) -> Result<Self, StorageError> {
        let writer = Arc::new(JsonFileWriter::new(options.file_path.clone()));
        Self::open_with_writer(options, writer).await
    }

    /// Like [`CatalogStore::open`], with snapshots sent to `writer` instead
    /// of the backing file
    pub async fn open_with_writer(
        options: StoreOptions,
        writer: Arc<dyn SnapshotWriter>,
    ) -> Result<Self, StorageError> {
        let started = Instant::now();
        let products = match read_snapshot(&options.file_path).await? {
            Some(snapshot) => {
                info!(
                    path = %options.file_path.display(),
                    records = snapshot.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Catalog store loaded"
                );
                snapshot
            }
            None => {
                info!(
                    path = %options.file_path.display(),
                    "No catalog store file, starting empty"
                );
                Snapshot::new()
            }
        };

        Ok(Self {
            inner: Arc::new(StoreInner {
                products: RwLock::new(products),
                persist_state: Mutex::new(PersistState::Idle),
                timer_epoch: AtomicU64::new(0),
                persist_done: Notify::new(),
                writer,
                persist_delay: options.persist_delay,
                on_persist_failure: options.on_persist_failure,
            }),
        })
    }

    /// Insert or replace the product stored under `product.id`
    pub async fn upsert(&self, product: Product) {
        self.inner
            .products
            .write()
            .await
            .insert(product.id.clone(), product);
        self.inner.schedule_persist().await;
    }

    /// Record `rgb` as the dominant color of the product currently stored
    /// under `id`
    ///
    /// Only the color changes; the rest of the stored record is kept as is.
    /// Returns false, without writing anything, when the product is gone or
    /// now points at a different image than the one the color came from.
    pub async fn set_color(&self, id: &str, image_reference: &str, rgb: Rgb) -> bool {
        let updated = {
            let mut products = self.inner.products.write().await;
            match products.get_mut(id) {
                Some(product) if product.image_reference == image_reference => {
                    product.set_color(rgb);
                    true
                }
                _ => false,
            }
        };
        if updated {
            self.inner.schedule_persist().await;
        }
        updated
    }

    pub async fn get(&self, id: &str) -> Option<Product> {
        self.inner.products.read().await.get(id).cloned()
    }

    /// Snapshot of every product, ordered by id
    pub async fn list(&self) -> Vec<Product> {
        self.inner.products.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.products.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.products.read().await.is_empty()
    }

    /// Number of products that already carry a dominant color
    pub async fn enriched_count(&self) -> usize {
        self.inner
            .products
            .read()
            .await
            .values()
            .filter(|p| p.is_enriched())
            .count()
    }

    /// Remove every product
    pub async fn clear_all(&self) {
        let removed = {
            let mut products = self.inner.products.write().await;
            let removed = products.len();
            products.clear();
            removed
        };
        info!(removed, "Catalog cleared");
        self.inner.schedule_persist().await;
    }

    pub async fn persist_state(&self) -> PersistState {
        *self.inner.persist_state.lock().await
    }

    /// Write pending changes now
    ///
    /// Waits for an in-flight write to finish first. Returns immediately when
    /// nothing is pending.
    pub async fn flush(&self) -> Result<(), StorageError> {
        loop {
            // Register before inspecting state so a completion between the
            // check and the await is not missed
            let notified = self.inner.persist_done.notified();
            {
                let mut state = self.inner.persist_state.lock().await;
                match *state {
                    PersistState::Idle => return Ok(()),
                    PersistState::Pending => {
                        *state = PersistState::Persisting;
                        // Disarm the timer of the cycle taken over here
                        self.inner.timer_epoch.fetch_add(1, Ordering::SeqCst);
                        break;
                    }
                    PersistState::Persisting | PersistState::PersistingWithPending => {}
                }
            }
            notified.await;
        }

        self.inner.persist().await
    }
}

impl StoreInner {
    async fn schedule_persist(self: &Arc<Self>) {
        let mut state = self.persist_state.lock().await;
        match *state {
            PersistState::Idle => {
                *state = PersistState::Pending;
                self.arm_timer();
            }
            PersistState::Persisting => *state = PersistState::PersistingWithPending,
            PersistState::Pending | PersistState::PersistingWithPending => {}
        }
    }

    /// Caller must hold the `persist_state` lock
    fn arm_timer(self: &Arc<Self>) {
        let epoch = self.timer_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(inner.persist_delay).await;
            inner.on_timer(epoch).await;
        });
    }

    async fn on_timer(self: Arc<Self>, epoch: u64) {
        {
            let mut state = self.persist_state.lock().await;
            if self.timer_epoch.load(Ordering::SeqCst) != epoch {
                debug!(epoch, "Superseded persist timer ignored");
                return;
            }
            match *state {
                PersistState::Pending => *state = PersistState::Persisting,
                // A flush took over the pending write, or a write is in
                // flight and its completion will schedule the next cycle
                PersistState::Idle
                | PersistState::Persisting
                | PersistState::PersistingWithPending => return,
            }
        }
        // Failure is logged and handled by policy inside persist()
        let _ = self.persist().await;
    }

    /// Write one snapshot. Caller must have moved the state to `Persisting`.
    async fn persist(self: &Arc<Self>) -> Result<(), StorageError> {
        let snapshot = self.products.read().await.clone();
        let started = Instant::now();

        let result = self.writer.write_snapshot(&snapshot).await;

        let mut state = self.persist_state.lock().await;
        match &result {
            Ok(()) => {
                debug!(
                    records = snapshot.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Catalog snapshot persisted"
                );
            }
            Err(e) => match self.on_persist_failure {
                PersistFailurePolicy::Exit => {
                    error!(error = %e, "Catalog snapshot write failed, terminating");
                    std::process::exit(PERSIST_FAILURE_EXIT_CODE);
                }
                PersistFailurePolicy::Retry => {
                    error!(error = %e, "Catalog snapshot write failed, will retry");
                    *state = PersistState::PersistingWithPending;
                }
            },
        }

        let rearm = *state == PersistState::PersistingWithPending;
        *state = if rearm {
            PersistState::Pending
        } else {
            PersistState::Idle
        };
        if rearm {
            self.arm_timer();
        }
        drop(state);

        self.persist_done.notify_waiters();
        result
    }
}
