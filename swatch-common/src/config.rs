//! Bootstrap configuration loading
//!
//! Resolution priority for each setting:
//! 1. Command-line argument / environment variable (applied by the binary)
//! 2. TOML config file
//! 3. Built-in defaults (code constants)
//!
//! A missing config file is not an error. The service logs a warning and
//! starts with defaults.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 3000;
/// Default debounce window between a mutation and the snapshot write
pub const DEFAULT_PERSIST_DELAY_MS: u64 = 50;
/// Default number of simultaneous color extraction calls
pub const DEFAULT_MAX_CONCURRENCY: usize = 5;
/// Default number of attempts per product for transient failures
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
/// Default per-call timeout for color extraction
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;
/// Default number of suggestions returned by nearest-color search
pub const DEFAULT_SUGGESTION_COUNT: usize = 5;
/// Google Cloud Vision annotate endpoint
pub const DEFAULT_VISION_ENDPOINT: &str = "https://vision.googleapis.com/v1/images:annotate";

/// Bootstrap configuration loaded from TOML file
///
/// Every section is optional; omitted keys take their built-in defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub vision: VisionConfig,
    pub ingest: IngestConfig,
    pub search: SearchConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: DEFAULT_PORT }
    }
}

/// What the store does when writing its snapshot fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistFailurePolicy {
    /// Log and terminate the process
    #[default]
    Exit,
    /// Log, keep the changes pending and try again after the next delay
    Retry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backing JSON snapshot file
    pub file_path: PathBuf,
    pub persist_delay_ms: u64,
    pub on_persist_failure: PersistFailurePolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            file_path: default_store_file(),
            persist_delay_ms: DEFAULT_PERSIST_DELAY_MS,
            on_persist_failure: PersistFailurePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    /// Google Cloud API key (required to enrich)
    pub api_key: Option<String>,
    pub endpoint: String,
    pub max_concurrency: usize,
    pub max_attempts: u32,
    /// Pause between attempts; 0 retries immediately
    pub retry_delay_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: DEFAULT_VISION_ENDPOINT.to_string(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay_ms: 0,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

/// CSV layout for catalog ingestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub delimiter: char,
    pub id_column: String,
    pub image_column: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            delimiter: ';',
            id_column: "id".to_string(),
            image_column: "photo".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub default_count: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_count: DEFAULT_SUGGESTION_COUNT,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

fn default_store_file() -> PathBuf {
    std::env::temp_dir().join("swatch-catalog.json")
}

/// Per-user config file location (`~/.config/swatch/<module>.toml` on Linux)
pub fn default_config_path(module_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("swatch").join(format!("{}.toml", module_name)))
}

/// Load the TOML config file, falling back to defaults when it is absent
///
/// A file that exists but cannot be read or parsed is an error; silently
/// ignoring a broken config would start the service with surprising settings.
pub fn load_toml_config(path: Option<&Path>) -> Result<TomlConfig> {
    let Some(path) = path else {
        info!("No config file location available, using built-in defaults");
        return Ok(TomlConfig::default());
    };

    if !path.exists() {
        warn!(
            "Config file {} not found, using built-in defaults",
            path.display()
        );
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;

    config.validate()?;
    info!("Loaded config from {}", path.display());
    Ok(config)
}

impl TomlConfig {
    /// Reject values the services cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.vision.max_concurrency == 0 {
            return Err(Error::Config(
                "vision.max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.vision.max_attempts == 0 {
            return Err(Error::Config(
                "vision.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.search.default_count == 0 {
            return Err(Error::Config(
                "search.default_count must be at least 1".to_string(),
            ));
        }
        if !self.ingest.delimiter.is_ascii() {
            return Err(Error::Config(
                "ingest.delimiter must be a single ASCII character".to_string(),
            ));
        }
        Ok(())
    }
}
