//! Configuration types for Folio.
//!
//! All config structs validate their values at construction time via
//! fallible builders. Post-deserialization validation is available via
//! the `validate()` method on each struct. Reading configuration files is
//! the embedding server's concern; this module only defines the shapes.

// The schemars `JsonSchema` derive macro internally uses `.unwrap()` in its
// expansions.
#![allow(clippy::disallowed_methods)]

mod runtime;
mod storage;

pub use runtime::*;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use snafu::Snafu;
pub use storage::*;

/// Configuration validation error.
///
/// Returned when a configuration value is outside its valid range or
/// violates a cross-field constraint.
#[derive(Debug, Snafu)]
pub enum ConfigError {
    /// A configuration value is invalid.
    #[snafu(display("invalid config: {message}"))]
    Validation {
        /// Description of the validation failure.
        message: String,
    },
}

/// Top-level configuration for the store.
///
/// Every section has serde defaults, so an empty document deserializes to
/// a valid configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FolioConfig {
    /// Storage engine settings.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Listing limits.
    #[serde(default)]
    pub pagination: PaginationConfig,
    /// Post-commit side-effect dispatch.
    #[serde(default)]
    pub notifier: NotifierConfig,
    /// Bulk import buffering.
    #[serde(default)]
    pub batch: BatchConfig,
    /// Write transaction retry policy.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl FolioConfig {
    /// Validates every section.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError::Validation`] raised by a section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.storage.validate()?;
        self.pagination.validate()?;
        self.notifier.validate()?;
        self.batch.validate()?;
        self.retry.validate()
    }
}

/// Duration serialization using humantime format.
mod humantime_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        FolioConfig::default().validate().expect("defaults should validate");
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::Validation { message: "test error".to_string() };
        assert_eq!(err.to_string(), "invalid config: test error");
    }

    #[test]
    fn test_pagination_rejects_default_above_max() {
        let result = PaginationConfig::builder().default_limit(500).max_limit(100).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_pagination_defaults() {
        let config = PaginationConfig::builder().build().expect("defaults");
        assert_eq!(config.default_limit, 100);
        assert_eq!(config.max_limit, 1000);
    }

    #[test]
    fn test_notifier_timeout_bounds() {
        assert!(NotifierConfig::builder().timeout(Duration::ZERO).build().is_err());
        assert!(NotifierConfig::builder().timeout(Duration::from_secs(600)).build().is_err());
        let config =
            NotifierConfig::builder().timeout(Duration::from_secs(45)).build().expect("valid");
        assert_eq!(config.timeout, Duration::from_secs(45));
    }

    #[test]
    fn test_retry_requires_an_attempt() {
        assert!(RetryConfig::builder().max_attempts(0).build().is_err());
        assert!(
            RetryConfig::builder()
                .initial_backoff(Duration::from_secs(2))
                .max_backoff(Duration::from_secs(1))
                .build()
                .is_err()
        );
    }

    #[test]
    fn test_batch_size_must_be_positive() {
        assert!(BatchConfig::builder().batch_size(0).build().is_err());
        assert_eq!(BatchConfig::default().batch_size, 500);
    }

    #[test]
    fn test_storage_rejects_tiny_cache() {
        assert!(StorageConfig::builder().cache_size_bytes(1024).build().is_err());
    }
}
