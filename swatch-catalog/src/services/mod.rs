//! Catalog services
//!
//! - Color extraction (trait + Google Cloud Vision client)
//! - Color enrichment pipeline
//! - Nearest-color search

pub mod color_extractor;
pub mod enrichment;
pub mod search;
pub mod vision_client;

pub use color_extractor::{ColorError, ColorExtractor};
pub use enrichment::{EnrichmentConfig, EnrichmentFailure, EnrichmentReport, Enricher, PipelineError};
pub use search::{nearest, suggest_by_color, SearchError};
pub use vision_client::VisionClient;
