//! Common error types for swatch

use thiserror::Error;

/// Common result type for swatch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across swatch services
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),
}
