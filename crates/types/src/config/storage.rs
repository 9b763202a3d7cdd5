//! Storage engine and bulk-import configuration.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Minimum cache size: 1 MB.
const MIN_CACHE_SIZE_BYTES: usize = 1024 * 1024;

/// Storage layer configuration.
///
/// # Validation Rules
///
/// - `cache_size_bytes` must be >= 1 MB (1,048,576 bytes)
///
/// # Example
///
/// ```no_run
/// # use folio_types::config::StorageConfig;
/// let config = StorageConfig::builder()
///     .cache_size_bytes(128 * 1024 * 1024)
///     .build()
///     .expect("valid storage config");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct StorageConfig {
    /// Page cache handed to the storage engine, in bytes.
    #[serde(default = "default_cache_size")]
    pub cache_size_bytes: usize,
}

#[bon::bon]
impl StorageConfig {
    /// Creates a new storage configuration with validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if `cache_size_bytes` < 1 MB.
    #[builder]
    pub fn new(
        #[builder(default = default_cache_size())] cache_size_bytes: usize,
    ) -> Result<Self, ConfigError> {
        let config = Self { cache_size_bytes };
        config.validate()?;
        Ok(config)
    }
}

impl StorageConfig {
    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_size_bytes < MIN_CACHE_SIZE_BYTES {
            return Err(ConfigError::Validation {
                message: format!(
                    "cache_size_bytes must be >= {} (1 MB), got {}",
                    MIN_CACHE_SIZE_BYTES, self.cache_size_bytes
                ),
            });
        }
        Ok(())
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { cache_size_bytes: default_cache_size() }
    }
}

fn default_cache_size() -> usize {
    64 * 1024 * 1024 // 64 MB
}

// =========================================================================
// BatchConfig
// =========================================================================

fn default_batch_size() -> usize {
    500
}

/// Bulk-import buffering.
///
/// The batch writer flushes automatically once `batch_size` records are
/// pending. Larger batches mean fewer commits during a library scan and a
/// larger loss window if the process dies before a flush.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BatchConfig {
    /// Pending records that trigger an automatic flush. Must be > 0.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

#[bon::bon]
impl BatchConfig {
    /// Creates a new batch configuration with validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if `batch_size` is zero.
    #[builder]
    pub fn new(
        #[builder(default = default_batch_size())] batch_size: usize,
    ) -> Result<Self, ConfigError> {
        let config = Self { batch_size };
        config.validate()?;
        Ok(config)
    }
}

impl BatchConfig {
    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if `batch_size` is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Validation { message: "batch_size must be > 0".to_string() });
        }
        Ok(())
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { batch_size: default_batch_size() }
    }
}
