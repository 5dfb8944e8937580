//! Retry logic with exponential backoff for transient errors.

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::types::RetryConfig;

/// Callback trait for retry progress notifications.
pub trait RetryCallback {
    /// Called when an operation is being retried.
    ///
    /// # Arguments
    /// * `attempt` - Current attempt number (1-indexed)
    /// * `max_attempts` - Maximum number of attempts
    /// * `error` - The error that triggered the retry
    /// * `delay_ms` - Milliseconds until next attempt
    fn on_retry(&self, attempt: u32, max_attempts: u32, error: &Error, delay_ms: u64);
}

/// No-op callback that does nothing.
pub struct NoCallback;

impl RetryCallback for NoCallback {
    fn on_retry(&self, _attempt: u32, _max_attempts: u32, _error: &Error, _delay_ms: u64) {}
}

/// Callback that logs retry information at warn level.
pub struct LogCallback;

impl RetryCallback for LogCallback {
    fn on_retry(&self, attempt: u32, max_attempts: u32, error: &Error, delay_ms: u64) {
        log::warn!("Attempt {attempt}/{max_attempts} failed: {error}. Retrying in {delay_ms}ms...");
    }
}

/// Execute an operation with retry logic.
///
/// Retries the operation if it returns a retryable error, using exponential
/// backoff between attempts. When every attempt fails the last error is
/// wrapped in [`Error::RetriesExhausted`].
pub fn with_retry<T, F>(
    config: &RetryConfig,
    cancel: &CancelToken,
    callback: Option<&dyn RetryCallback>,
    operation: F,
) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    with_retry_hook(config, cancel, callback, || Ok(None), operation)
}

/// Like [`with_retry`], but runs `before_retry` ahead of every retry.
///
/// If the hook yields a value, retrying stops and that value is returned.
/// Used to probe whether a non-idempotent call landed before repeating it.
pub fn with_retry_hook<T, H, F>(
    config: &RetryConfig,
    cancel: &CancelToken,
    callback: Option<&dyn RetryCallback>,
    mut before_retry: H,
    mut operation: F,
) -> Result<T>
where
    H: FnMut() -> Result<Option<T>>,
    F: FnMut() -> Result<T>,
{
    let max_attempts = config.max_attempts.max(1);

    for attempt in 0..max_attempts {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        if attempt > 0 {
            if let Some(found) = before_retry()? {
                return Ok(found);
            }
        }

        let e = match operation() {
            Ok(result) => return Ok(result),
            Err(e) => e,
        };

        if !e.is_retryable() {
            return Err(e);
        }

        if attempt + 1 >= max_attempts {
            return Err(Error::RetriesExhausted {
                attempts: max_attempts,
                last: Box::new(e),
            });
        }

        let delay = config.delay_for_attempt(attempt);
        if let Some(cb) = callback {
            cb.on_retry(attempt + 1, max_attempts, &e, delay.as_millis() as u64);
        }

        if !cancel.sleep(delay) {
            return Err(Error::Cancelled);
        }
    }

    Err(Error::Other("retry exhausted".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use std::cell::Cell;
    use std::rc::Rc;
    use std::time::Duration;

    fn fast_config() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            backoff_factor: 1.0,
            max_delay: Duration::from_millis(10),
        }
    }

    fn network() -> Error {
        Error::Network {
            message: "connection reset".to_string(),
        }
    }

    #[test]
    fn test_with_retry_success_first_try() {
        let config = RetryConfig::no_retry();
        let result = with_retry(&config, &CancelToken::new(), None, || Ok::<_, Error>(42));
        assert_eq!(result.unwrap(), 42);
    }

    #[test]
    fn test_with_retry_non_retryable_error() {
        let attempts = Rc::new(Cell::new(0));
        let attempts_clone = attempts.clone();

        let result: Result<()> = with_retry(&fast_config(), &CancelToken::new(), None, || {
            attempts_clone.set(attempts_clone.get() + 1);
            Err(Error::from_response(400, &serde_json::Value::Null))
        });

        assert!(result.is_err());
        // 4xx is never retried
        assert_eq!(attempts.get(), 1);
    }

    #[test]
    fn test_with_retry_eventual_success() {
        let attempts = Rc::new(Cell::new(0));
        let attempts_clone = attempts.clone();

        let result = with_retry(&fast_config(), &CancelToken::new(), None, || {
            let current = attempts_clone.get();
            attempts_clone.set(current + 1);
            if current < 2 { Err(network()) } else { Ok(42) }
        });

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.get(), 3);
    }

    #[test]
    fn test_with_retry_all_attempts_fail() {
        let attempts = Rc::new(Cell::new(0));
        let attempts_clone = attempts.clone();

        let result: Result<()> = with_retry(&fast_config(), &CancelToken::new(), None, || {
            attempts_clone.set(attempts_clone.get() + 1);
            Err(network())
        });

        let err = result.unwrap_err();
        assert!(matches!(err, Error::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(err.category(), ErrorCategory::Upstream);
        assert_eq!(attempts.get(), 3);
    }

    #[test]
    fn test_single_attempt_still_exhausts() {
        let result: Result<()> = with_retry(&RetryConfig::no_retry(), &CancelToken::new(), None, || {
            Err(Error::from_response(503, &serde_json::Value::Null))
        });

        let err = result.unwrap_err();
        assert!(matches!(err, Error::RetriesExhausted { attempts: 1, .. }));
        assert_eq!(err.category(), ErrorCategory::Upstream);
        assert_eq!(err.status(), Some(503));
    }

    #[test]
    fn test_callback_invoked() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicU32, Ordering};

        struct CountingCallback(Arc<AtomicU32>);
        impl RetryCallback for CountingCallback {
            fn on_retry(&self, _: u32, _: u32, _: &Error, _: u64) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let callback_count = Arc::new(AtomicU32::new(0));
        let callback = CountingCallback(callback_count.clone());

        let _: Result<()> = with_retry(
            &fast_config(),
            &CancelToken::new(),
            Some(&callback),
            || Err(network()),
        );

        // Called for each retry (not the first attempt, not the last)
        assert_eq!(callback_count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_hook_short_circuits_retry() {
        let attempts = Rc::new(Cell::new(0));
        let attempts_clone = attempts.clone();

        let result = with_retry_hook(
            &fast_config(),
            &CancelToken::new(),
            None,
            || Ok(Some("already there")),
            || {
                attempts_clone.set(attempts_clone.get() + 1);
                Err(network())
            },
        );

        assert_eq!(result.unwrap(), "already there");
        assert_eq!(attempts.get(), 1);
    }

    #[test]
    fn test_cancelled_before_start() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = with_retry(&fast_config(), &cancel, None, || Ok::<_, Error>(1));
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
