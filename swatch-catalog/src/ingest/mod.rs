//! Catalog ingestion from CSV
//!
//! The CSV has a header row. One column holds the product id, one the image
//! reference; every other column is kept as a free-form attribute. Loading
//! replaces the whole catalog.

use crate::store::CatalogStore;
use serde::Serialize;
use std::path::{Path, PathBuf};
use swatch_common::config::IngestConfig;
use swatch_common::Product;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Failed to open CSV file {path}: {source}")]
    Open { path: PathBuf, source: csv::Error },

    #[error("CSV file {path} has no '{column}' column")]
    MissingColumn { path: PathBuf, column: String },

    #[error("Malformed CSV in {path} at line {line}: {source}")]
    Malformed {
        path: PathBuf,
        line: u64,
        source: csv::Error,
    },

    #[error("CSV parsing task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Outcome of one catalog load
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub loaded: usize,
    /// Rows without an id or image reference
    pub skipped: usize,
}

/// Parse a catalog CSV file into products
///
/// Returns the products and the number of rows skipped.
pub fn parse_csv(path: &Path, options: &IngestConfig) -> Result<(Vec<Product>, usize), IngestError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(options.delimiter as u8)
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|source| IngestError::Open {
            path: path.to_path_buf(),
            source,
        })?;

    let headers = reader
        .headers()
        .map_err(|source| IngestError::Malformed {
            path: path.to_path_buf(),
            line: 1,
            source,
        })?
        .clone();

    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| IngestError::MissingColumn {
                path: path.to_path_buf(),
                column: name.to_string(),
            })
    };
    let id_index = column(options.id_column.as_str())?;
    let image_index = column(options.image_column.as_str())?;

    let mut products = Vec::new();
    let mut skipped = 0;

    for result in reader.records() {
        let record = result.map_err(|source| IngestError::Malformed {
            path: path.to_path_buf(),
            line: source.position().map_or(0, |p| p.line()),
            source,
        })?;
        let line = record.position().map_or(0, |p| p.line());

        let id = record.get(id_index).unwrap_or_default();
        let image_reference = record.get(image_index).unwrap_or_default();
        if id.is_empty() || image_reference.is_empty() {
            warn!(line, "Skipping CSV row without id or image reference");
            skipped += 1;
            continue;
        }

        let mut product = Product::new(id, image_reference);
        for (index, (header, value)) in headers.iter().zip(record.iter()).enumerate() {
            if index != id_index && index != image_index {
                product.attributes.insert(header.to_string(), value.to_string());
            }
        }
        products.push(product);
    }

    Ok((products, skipped))
}

/// Replace the catalog with the contents of a CSV file
///
/// The file is fully parsed before the catalog is touched, so a malformed
/// file leaves the existing catalog in place.
pub async fn load_csv(
    store: &CatalogStore,
    path: &Path,
    options: &IngestConfig,
) -> Result<IngestSummary, IngestError> {
    let owned_path = path.to_path_buf();
    let owned_options = options.clone();
    let (products, skipped) =
        tokio::task::spawn_blocking(move || parse_csv(&owned_path, &owned_options)).await??;

    store.clear_all().await;
    let loaded = products.len();
    for product in products {
        store.upsert(product).await;
    }

    info!(
        path = %path.display(),
        loaded,
        skipped,
        "Catalog loaded from CSV"
    );

    Ok(IngestSummary { loaded, skipped })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn csv_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_parse_splits_id_image_and_attributes() {
        let file = csv_file(
            "id;title;gender_id;composition;sleeve;photo;url\n\
             L1212-00-001;Polo L.12.12;MAN;100% Coton;Manches courtes;//image1.example.com/a.jpg;https://shop.example/a\n",
        );

        let (products, skipped) = parse_csv(file.path(), &IngestConfig::default()).unwrap();

        assert_eq!(skipped, 0);
        assert_eq!(products.len(), 1);
        let product = &products[0];
        assert_eq!(product.id, "L1212-00-001");
        assert_eq!(product.image_reference, "//image1.example.com/a.jpg");
        assert_eq!(product.attributes["title"], "Polo L.12.12");
        assert_eq!(product.attributes["url"], "https://shop.example/a");
        assert!(!product.attributes.contains_key("id"));
        assert!(!product.attributes.contains_key("photo"));
        assert!(!product.is_enriched());
    }

    #[test]
    fn test_rows_without_id_or_image_are_skipped() {
        let file = csv_file("id;title;photo\n;no id;img\nP2;no image;\nP3;ok;img3\n");

        let (products, skipped) = parse_csv(file.path(), &IngestConfig::default()).unwrap();

        assert_eq!(skipped, 2);
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].id, "P3");
    }

    #[test]
    fn test_missing_column_is_an_error() {
        let file = csv_file("sku;title;photo\nA;t;img\n");

        let result = parse_csv(file.path(), &IngestConfig::default());
        assert!(matches!(result, Err(IngestError::MissingColumn { column, .. }) if column == "id"));
    }

    #[test]
    fn test_custom_layout() {
        let file = csv_file("sku,image_url,color_name\nA,https://img/a.png,navy\n");
        let options = IngestConfig {
            delimiter: ',',
            id_column: "sku".to_string(),
            image_column: "image_url".to_string(),
        };

        let (products, _) = parse_csv(file.path(), &options).unwrap();
        assert_eq!(products[0].id, "A");
        assert_eq!(products[0].attributes["color_name"], "navy");
    }

    #[test]
    fn test_nonexistent_file_is_open_error() {
        let result = parse_csv(Path::new("/definitely/not/here.csv"), &IngestConfig::default());
        assert!(matches!(result, Err(IngestError::Open { .. })));
    }
}
