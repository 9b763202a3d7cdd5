//! Request-path configuration: listing limits, side-effect dispatch, write retry.

use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::ConfigError;

// =========================================================================
// PaginationConfig
// =========================================================================

const fn default_page_limit() -> usize {
    100
}

const fn default_max_page_limit() -> usize {
    1000
}

/// Listing limits applied by cursor pagination.
///
/// # Validation Rules
///
/// - `max_limit` must be > 0
/// - `default_limit` must be in `1..=max_limit`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PaginationConfig {
    /// Page size used when the caller does not supply one.
    #[serde(default = "default_page_limit")]
    pub default_limit: usize,
    /// Largest page size a caller may request; larger requests are clamped.
    #[serde(default = "default_max_page_limit")]
    pub max_limit: usize,
}

#[bon::bon]
impl PaginationConfig {
    /// Creates a new pagination configuration with validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if the limits are inconsistent.
    #[builder]
    pub fn new(
        #[builder(default = default_page_limit())] default_limit: usize,
        #[builder(default = default_max_page_limit())] max_limit: usize,
    ) -> Result<Self, ConfigError> {
        let config = Self { default_limit, max_limit };
        config.validate()?;
        Ok(config)
    }
}

impl PaginationConfig {
    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_limit == 0 {
            return Err(ConfigError::Validation { message: "max_limit must be > 0".to_string() });
        }
        if self.default_limit == 0 || self.default_limit > self.max_limit {
            return Err(ConfigError::Validation {
                message: format!(
                    "default_limit must be in 1..={}, got {}",
                    self.max_limit, self.default_limit
                ),
            });
        }
        Ok(())
    }
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self { default_limit: default_page_limit(), max_limit: default_max_page_limit() }
    }
}

// =========================================================================
// NotifierConfig
// =========================================================================

/// Upper bound on a single side-effect task.
const MAX_NOTIFIER_TIMEOUT: Duration = Duration::from_secs(300);

fn default_notifier_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Post-commit side-effect dispatch.
///
/// Search reindexing, event emission and transcode cleanup run as detached
/// tasks after the authoritative write commits. Each task is abandoned once
/// `timeout` elapses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct NotifierConfig {
    /// Deadline for one side-effect task. Must be in (0, 5m].
    #[serde(default = "default_notifier_timeout")]
    #[serde(with = "super::humantime_serde")]
    #[schemars(with = "String")]
    pub timeout: Duration,
}

#[bon::bon]
impl NotifierConfig {
    /// Creates a new notifier configuration with validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if `timeout` is zero or above 5 minutes.
    #[builder]
    pub fn new(
        #[builder(default = default_notifier_timeout())] timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let config = Self { timeout };
        config.validate()?;
        Ok(config)
    }
}

impl NotifierConfig {
    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if `timeout` is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout.is_zero() || self.timeout > MAX_NOTIFIER_TIMEOUT {
            return Err(ConfigError::Validation {
                message: format!(
                    "notifier timeout must be in (0, {}], got {}",
                    humantime::format_duration(MAX_NOTIFIER_TIMEOUT),
                    humantime::format_duration(self.timeout)
                ),
            });
        }
        Ok(())
    }
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self { timeout: default_notifier_timeout() }
    }
}

// =========================================================================
// RetryConfig
// =========================================================================

const fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff() -> Duration {
    Duration::from_millis(10)
}

fn default_max_backoff() -> Duration {
    Duration::from_millis(500)
}

const fn default_multiplier() -> f64 {
    2.0
}

/// Bounded retry of write transactions that fail with a retryable engine error.
///
/// Domain errors (not found, conflicts, invalid input) are never retried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RetryConfig {
    /// Total attempts including the first. Must be >= 1.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry.
    #[serde(default = "default_initial_backoff")]
    #[serde(with = "super::humantime_serde")]
    #[schemars(with = "String")]
    pub initial_backoff: Duration,
    /// Cap on any single delay. Must be >= `initial_backoff`.
    #[serde(default = "default_max_backoff")]
    #[serde(with = "super::humantime_serde")]
    #[schemars(with = "String")]
    pub max_backoff: Duration,
    /// Growth factor between delays. Must be >= 1.0.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

#[bon::bon]
impl RetryConfig {
    /// Creates a new retry configuration with validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any value is out of range.
    #[builder]
    pub fn new(
        #[builder(default = default_max_attempts())] max_attempts: u32,
        #[builder(default = default_initial_backoff())] initial_backoff: Duration,
        #[builder(default = default_max_backoff())] max_backoff: Duration,
        #[builder(default = default_multiplier())] multiplier: f64,
    ) -> Result<Self, ConfigError> {
        let config = Self { max_attempts, initial_backoff, max_backoff, multiplier };
        config.validate()?;
        Ok(config)
    }
}

impl RetryConfig {
    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Validation {
                message: "max_attempts must be >= 1".to_string(),
            });
        }
        if self.max_backoff < self.initial_backoff {
            return Err(ConfigError::Validation {
                message: "max_backoff must be >= initial_backoff".to_string(),
            });
        }
        if self.multiplier < 1.0 {
            return Err(ConfigError::Validation {
                message: format!("multiplier must be >= 1.0, got {}", self.multiplier),
            });
        }
        Ok(())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff: default_initial_backoff(),
            max_backoff: default_max_backoff(),
            multiplier: default_multiplier(),
        }
    }
}
