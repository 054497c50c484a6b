//! # Retry Policy
//!
//! Bounded whole-operation retry for transient store failures.
//!
//! The policy wraps an entire ledger operation (one transaction), never a
//! single step inside it. Each retry waits `initial_backoff * 2^(n-1)`,
//! capped at `max_backoff`, and never sleeps past the caller's deadline.

use crate::primitives::{DEFAULT_INITIAL_BACKOFF_MS, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_BACKOFF_MS};
use crate::{Context, HashEqError};
use std::time::Duration;

/// Decides whether an error may be retried.
pub type Classifier = fn(&HashEqError) -> bool;

/// Retry configuration for ledger operations.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
    classifier: Classifier,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_ATTEMPTS,
            Duration::from_millis(DEFAULT_INITIAL_BACKOFF_MS),
            Duration::from_millis(DEFAULT_MAX_BACKOFF_MS),
        )
    }
}

impl RetryPolicy {
    /// Create a policy retrying `HashEqError::is_transient` errors.
    ///
    /// `max_attempts` counts the first try; zero is treated as one.
    #[must_use]
    pub fn new(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            max_backoff: max_backoff.max(initial_backoff),
            classifier: HashEqError::is_transient,
        }
    }

    /// A policy that runs the operation exactly once.
    #[must_use]
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// Replace the error classifier.
    #[must_use]
    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before retry number `retry` (1-based).
    #[must_use]
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// Cancellation and deadline expiry stop the loop immediately, and a
    /// backoff that would outlast the deadline is not slept.
    pub fn run<T, F>(&self, ctx: &Context, operation: &str, mut op: F) -> Result<T, HashEqError>
    where
        F: FnMut(u32) -> Result<T, HashEqError>,
    {
        let mut attempt = 1;
        loop {
            ctx.check()?;
            let err = match op(attempt) {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if attempt >= self.max_attempts || !(self.classifier)(&err) {
                return Err(err);
            }

            let delay = self.backoff(attempt);
            if ctx.remaining().is_some_and(|left| left <= delay) {
                tracing::warn!(operation, attempt, error = %err, "deadline too close to retry");
                return Err(err);
            }

            tracing::warn!(
                operation,
                attempt,
                max_attempts = self.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "transient store error, retrying"
            );
            if !delay.is_zero() {
                std::thread::sleep(delay);
            }
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn transient() -> HashEqError {
        HashEqError::TransientStore {
            operation: "begin_read".to_string(),
            message: "connection reset".to_string(),
        }
    }

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::ZERO, Duration::ZERO)
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(5, Duration::from_millis(10), Duration::from_millis(35));
        assert_eq!(policy.backoff(1), Duration::from_millis(10));
        assert_eq!(policy.backoff(2), Duration::from_millis(20));
        assert_eq!(policy.backoff(3), Duration::from_millis(35));
        assert_eq!(policy.backoff(40), Duration::from_millis(35));
    }

    #[test]
    fn transient_errors_are_retried_until_success() {
        let calls = Cell::new(0);
        let result = fast(3).run(&Context::background(), "test", |_| {
            calls.set(calls.get() + 1);
            if calls.get() < 3 { Err(transient()) } else { Ok(7) }
        });
        assert_eq!(result.expect("third attempt succeeds"), 7);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn attempts_are_bounded() {
        let calls = Cell::new(0);
        let result: Result<(), _> = fast(2).run(&Context::background(), "test", |_| {
            calls.set(calls.get() + 1);
            Err(transient())
        });
        assert!(matches!(result, Err(HashEqError::TransientStore { .. })));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn permanent_errors_are_not_retried() {
        for err in [
            HashEqError::InvalidInput("bad".to_string()),
            HashEqError::NotFound {
                algorithm: "sha256".to_string(),
                digest: "00".to_string(),
            },
            HashEqError::IntegrityViolation {
                operation: "upsert".to_string(),
                key: "k".to_string(),
                rows: 2,
            },
        ] {
            let calls = Cell::new(0);
            let mut pending = Some(err);
            let result: Result<(), _> = fast(5).run(&Context::background(), "test", |_| {
                calls.set(calls.get() + 1);
                Err(pending.take().unwrap_or(HashEqError::Cancelled))
            });
            assert!(result.is_err());
            assert_eq!(calls.get(), 1);
        }
    }

    #[test]
    fn none_runs_once_even_for_transient_errors() {
        let calls = Cell::new(0);
        let result: Result<(), _> = RetryPolicy::none().run(&Context::background(), "test", |_| {
            calls.set(calls.get() + 1);
            Err(transient())
        });
        assert!(matches!(result, Err(HashEqError::TransientStore { .. })));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn custom_classifier_is_honored() {
        let calls = Cell::new(0);
        let policy = fast(3).with_classifier(|_| false);
        let result: Result<(), _> = policy.run(&Context::background(), "test", |_| {
            calls.set(calls.get() + 1);
            Err(transient())
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn cancelled_context_stops_before_first_attempt() {
        let ctx = Context::background();
        ctx.cancel();
        let calls = Cell::new(0);
        let result: Result<(), _> = fast(3).run(&ctx, "test", |_| {
            calls.set(calls.get() + 1);
            Ok(())
        });
        assert!(matches!(result, Err(HashEqError::Cancelled)));
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn backoff_beyond_deadline_is_not_slept() {
        let policy = RetryPolicy::new(3, Duration::from_secs(60), Duration::from_secs(60));
        let ctx = Context::with_timeout(Duration::from_secs(5));
        let calls = Cell::new(0);
        let result: Result<(), _> = policy.run(&ctx, "test", |_| {
            calls.set(calls.get() + 1);
            Err(transient())
        });
        assert!(matches!(result, Err(HashEqError::TransientStore { .. })));
        assert_eq!(calls.get(), 1);
    }
}
