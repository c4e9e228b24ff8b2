//! Test Helper Utilities
//!
//! Shared fakes and builders for swatch-catalog integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use swatch_catalog::services::{ColorError, ColorExtractor};
use swatch_catalog::store::snapshot::{Snapshot, SnapshotWriter};
use swatch_catalog::store::{CatalogStore, StorageError, StoreOptions};
use swatch_common::{Product, Rgb};

/// Color returned for images without a scripted outcome
pub const DEFAULT_COLOR: Rgb = Rgb::new(128, 128, 128);

/// Color extractor with scripted per-image outcomes
///
/// Outcomes for an image are consumed in order; the last one repeats once
/// the script runs out.
pub struct FakeExtractor {
    scripts: Mutex<HashMap<String, VecDeque<Result<Rgb, ColorError>>>>,
    calls: Mutex<HashMap<String, u32>>,
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeExtractor {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            delay: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Every call sleeps this long before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn script(
        self,
        image: &str,
        outcomes: impl IntoIterator<Item = Result<Rgb, ColorError>>,
    ) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(image.to_string(), outcomes.into_iter().collect());
        self
    }

    pub fn always(self, image: &str, outcome: Result<Rgb, ColorError>) -> Self {
        self.script(image, [outcome])
    }

    pub fn calls(&self, image: &str) -> u32 {
        self.calls.lock().unwrap().get(image).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> u32 {
        self.calls.lock().unwrap().values().sum()
    }

    /// Highest number of calls observed running at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_outcome(&self, image: &str) -> Result<Rgb, ColorError> {
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(image) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) if queue.len() == 1 => queue[0].clone(),
            _ => Ok(DEFAULT_COLOR),
        }
    }
}

#[async_trait]
impl ColorExtractor for FakeExtractor {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn extract_dominant_color(&self, image_reference: &str) -> Result<Rgb, ColorError> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(image_reference.to_string())
            .or_insert(0) += 1;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.next_outcome(image_reference)
    }
}

/// Snapshot writer that records every snapshot instead of touching disk
pub struct RecordingWriter {
    snapshots: Mutex<Vec<Snapshot>>,
    delay: Duration,
    failures_left: AtomicUsize,
    in_flight: AtomicUsize,
    overlapped: AtomicUsize,
}

impl RecordingWriter {
    pub fn new() -> Self {
        Self {
            snapshots: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
            failures_left: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            overlapped: AtomicUsize::new(0),
        }
    }

    /// Each write takes this long
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail the first `count` writes
    pub fn failing_first(self, count: usize) -> Self {
        self.failures_left.store(count, Ordering::SeqCst);
        self
    }

    pub fn writes(&self) -> usize {
        self.snapshots.lock().unwrap().len()
    }

    pub fn snapshots(&self) -> Vec<Snapshot> {
        self.snapshots.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<Snapshot> {
        self.snapshots.lock().unwrap().last().cloned()
    }

    /// Number of writes that started while another was still running
    pub fn overlapped(&self) -> usize {
        self.overlapped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotWriter for RecordingWriter {
    async fn write_snapshot(&self, snapshot: &Snapshot) -> Result<(), StorageError> {
        if self.in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
            self.overlapped.fetch_add(1, Ordering::SeqCst);
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let remaining = self.failures_left.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_left.store(remaining - 1, Ordering::SeqCst);
            return Err(StorageError::Write {
                path: "recording".into(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
            });
        }

        self.snapshots.lock().unwrap().push(snapshot.clone());
        Ok(())
    }
}

/// Open a store backed by `writer`, with nothing on disk to load
pub async fn recording_store(
    dir: &Path,
    writer: Arc<RecordingWriter>,
    persist_delay: Duration,
) -> CatalogStore {
    let options = StoreOptions::new(dir.join("catalog.json")).with_persist_delay(persist_delay);
    CatalogStore::open_with_writer(options, writer).await.unwrap()
}

pub fn product(id: &str) -> Product {
    Product::new(id, format!("//img.example.com/{}.jpg", id))
}

pub fn colored(id: &str, rgb: Rgb) -> Product {
    product(id).with_color(rgb)
}

pub fn image_of(id: &str) -> String {
    format!("//img.example.com/{}.jpg", id)
}
