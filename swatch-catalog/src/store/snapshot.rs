//! Snapshot file format and write path
//!
//! The backing file holds the whole catalog as one JSON object keyed by
//! product id. It is rewritten in full on every persist cycle.

use super::StorageError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use swatch_common::Product;

/// Full catalog contents, ordered by product id
pub type Snapshot = BTreeMap<String, Product>;

/// Destination for catalog snapshots
///
/// The store calls this from its single persist path, never concurrently.
#[async_trait]
pub trait SnapshotWriter: Send + Sync {
    async fn write_snapshot(&self, snapshot: &Snapshot) -> Result<(), StorageError>;
}

/// Writes snapshots as JSON, atomically replacing the target file
pub struct JsonFileWriter {
    path: PathBuf,
}

impl JsonFileWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl SnapshotWriter for JsonFileWriter {
    async fn write_snapshot(&self, snapshot: &Snapshot) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec(snapshot)?;
        let write_err = |source| StorageError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }

        // Write next to the target then rename, so a crash mid-write never
        // leaves a truncated snapshot behind.
        let temp_path = self.temp_path();
        tokio::fs::write(&temp_path, &bytes).await.map_err(write_err)?;
        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(write_err)?;

        Ok(())
    }
}

/// Read a snapshot file
///
/// Returns `Ok(None)` when the file does not exist.
pub async fn read_snapshot(path: &Path) -> Result<Option<Snapshot>, StorageError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StorageError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let stored: Snapshot = serde_json::from_slice(&bytes).map_err(|source| StorageError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    // Key by the record's own id in case the file was edited by hand
    let snapshot = stored
        .into_values()
        .map(|product| (product.id.clone(), product))
        .collect();

    Ok(Some(snapshot))
}

#[cfg(test)]
mod tests {
    use super::*;
    use swatch_common::Rgb;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_reads_as_none() {
        let temp_dir = TempDir::new().unwrap();
        let result = read_snapshot(&temp_dir.path().join("absent.json")).await;
        assert!(matches!(result, Ok(None)));
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("catalog.json");
        let writer = JsonFileWriter::new(&path);

        let mut snapshot = Snapshot::new();
        let product = Product::new("a", "img-a").with_color(Rgb::new(10, 20, 30));
        snapshot.insert("a".to_string(), product.clone());

        writer.write_snapshot(&snapshot).await.unwrap();

        assert!(!writer.temp_path().exists(), "temp file must be renamed away");
        let loaded = read_snapshot(&path).await.unwrap().unwrap();
        assert_eq!(loaded.get("a"), Some(&product));
    }

    #[tokio::test]
    async fn test_garbage_is_a_parse_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("catalog.json");
        std::fs::write(&path, b"{not json").unwrap();

        let result = read_snapshot(&path).await;
        assert!(matches!(result, Err(StorageError::Parse { .. })));
    }

    #[tokio::test]
    async fn test_records_are_rekeyed_by_id() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("catalog.json");
        std::fs::write(&path, br#"{"wrong-key":{"id":"p1","imageReference":"img"}}"#).unwrap();

        let loaded = read_snapshot(&path).await.unwrap().unwrap();
        assert!(loaded.contains_key("p1"));
        assert!(!loaded.contains_key("wrong-key"));
    }
}
