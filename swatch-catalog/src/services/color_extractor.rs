//! Dominant color extraction interface

use async_trait::async_trait;
use swatch_common::Rgb;
use thiserror::Error;

/// Color extraction errors
///
/// The enrichment pipeline retries `Transient` failures and gives up on
/// `Permanent` ones straight away.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ColorError {
    /// Worth retrying: network trouble, rate limiting, image temporarily
    /// unreachable
    #[error("Transient color extraction failure: {0}")]
    Transient(String),

    /// Retrying will not help: rejected request, no color in the response
    #[error("Color extraction failed: {0}")]
    Permanent(String),
}

impl ColorError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ColorError::Transient(_))
    }
}

/// Finds the single most representative color of an image
#[async_trait]
pub trait ColorExtractor: Send + Sync {
    /// Extractor name for logging
    fn name(&self) -> &'static str;

    async fn extract_dominant_color(&self, image_reference: &str) -> Result<Rgb, ColorError>;
}
