//! Bounded retry of write transactions.
//!
//! redb serializes writers, so two writes never conflict; a write can still
//! fail transiently while beginning or committing its transaction (I/O
//! pressure, a full page cache). Those failures are retried with exponential
//! backoff. Domain errors are returned on the first attempt.

use std::time::Duration;

use backon::{BlockingRetryable, ExponentialBuilder};
use folio_types::config::RetryConfig;

use crate::error::{Result, StoreError};

/// Runs `operation` until it succeeds, fails with a non-retryable error, or
/// `config.max_attempts` attempts have been made.
///
/// `operation` must open and commit its own write transaction so that each
/// attempt starts from committed state.
pub(crate) fn with_write_retry<T, F>(config: &RetryConfig, operation: &'static str, op: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    // max_times counts retries, not attempts.
    let max_retries = config.max_attempts.saturating_sub(1) as usize;

    let backoff = ExponentialBuilder::new()
        .with_min_delay(config.initial_backoff)
        .with_max_delay(config.max_backoff)
        .with_factor(config.multiplier as f32)
        .with_max_times(max_retries);

    op.retry(backoff)
        .sleep(std::thread::sleep)
        .when(|e: &StoreError| e.is_retryable())
        .notify(|err: &StoreError, dur: Duration| {
            tracing::debug!(
                operation,
                backoff_ms = dur.as_millis() as u64,
                error = %err,
                "retrying write after backoff"
            );
        })
        .call()
}
