//! Retry logic with exponential backoff for transient provider errors.

use crate::error::{ErrorClass, ProviderError};
use crate::types::RetryConfig;
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// Callback trait for retry progress notifications.
pub trait RetryCallback {
    /// Called when an operation is being retried.
    ///
    /// # Arguments
    /// * `attempt` - Current attempt number (1-indexed)
    /// * `max_attempts` - Maximum number of attempts
    /// * `error` - The error that triggered the retry
    /// * `delay` - Time until next attempt
    fn on_retry(&self, attempt: u32, max_attempts: u32, error: &ProviderError, delay: Duration);
}

/// No-op callback that does nothing.
pub struct NoCallback;

impl RetryCallback for NoCallback {
    fn on_retry(&self, _attempt: u32, _max: u32, _error: &ProviderError, _delay: Duration) {}
}

/// Callback that logs retries at warn level.
pub struct LogCallback;

impl RetryCallback for LogCallback {
    fn on_retry(&self, attempt: u32, max_attempts: u32, error: &ProviderError, delay: Duration) {
        log::warn!(
            "attempt {}/{} failed: {}. Retrying in {}ms",
            attempt,
            max_attempts,
            error,
            delay.as_millis()
        );
    }
}

/// Why a retried operation gave up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RetryError {
    /// The error was not transient, so it was never retried
    #[error("{error} ({class})")]
    Failed {
        error: ProviderError,
        class: ErrorClass,
    },

    /// Every attempt failed with a transient error
    #[error("{error} (after {attempts} attempts)")]
    Exhausted { error: ProviderError, attempts: u32 },
}

/// Execute an operation with retry logic.
///
/// Only errors that `classify` maps to [`ErrorClass::Transient`] are
/// retried, with exponential backoff between attempts.
///
/// # Arguments
/// * `config` - Retry configuration
/// * `classify` - Maps a provider error to its class
/// * `callback` - Optional callback for retry notifications
/// * `operation` - The operation to execute
pub fn with_retry<T, C, F>(
    config: &RetryConfig,
    classify: C,
    callback: Option<&dyn RetryCallback>,
    mut operation: F,
) -> Result<T, RetryError>
where
    C: Fn(&ProviderError) -> ErrorClass,
    F: FnMut() -> Result<T, ProviderError>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        let error = match operation() {
            Ok(result) => return Ok(result),
            Err(e) => e,
        };

        let class = classify(&error);
        if !class.is_retryable() {
            return Err(RetryError::Failed { error, class });
        }

        if attempt + 1 >= max_attempts {
            return Err(RetryError::Exhausted {
                error,
                attempts: max_attempts,
            });
        }

        let delay = config.delay_for_attempt(attempt);
        if let Some(cb) = callback {
            cb.on_retry(attempt + 1, max_attempts, &error, delay);
        }

        thread::sleep(delay);
        attempt += 1;
    }
}
