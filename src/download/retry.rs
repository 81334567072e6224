//! Retry logic with exponential backoff for extraction and transfer calls.
//!
//! This module provides the [`RetryPolicy`] configuration and the
//! [`run_with_retry`] executor, which wraps any fallible async operation.
//!
//! # Overview
//!
//! The first attempt runs immediately. After each failure, if attempts
//! remain, the executor sleeps for the current delay and tries again; the
//! delay starts at `initial_delay`, is multiplied by `backoff_multiplier`
//! after every failure and is capped at `max_delay`. Once `max_attempts`
//! attempts have failed, the last error is returned unchanged so callers can
//! inspect the original failure.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use vidgrab_core::download::{RetryPolicy, run_with_retry};
//!
//! # async fn example() {
//! let policy = RetryPolicy::new(3, Duration::from_millis(10), Duration::from_millis(50), 2.0);
//! let result: Result<u32, String> = run_with_retry(&policy, || async { Ok(7) }).await;
//! assert_eq!(result, Ok(7));
//! # }
//! ```

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, info};

/// Default maximum attempts (including the first).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay before the first retry (1 second).
const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(1);

/// Default maximum delay cap (5 seconds).
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(5);

/// Default backoff multiplier (doubles each attempt).
const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Configuration for retry behavior with exponential backoff.
///
/// # Default Values
///
/// - `max_attempts`: 3
/// - `initial_delay`: 1 second
/// - `max_delay`: 5 seconds
/// - `backoff_multiplier`: 2.0
///
/// With defaults the executor waits 1s and then 2s between the three attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial attempt).
    max_attempts: u32,

    /// Delay before the first retry.
    initial_delay: Duration,

    /// Maximum delay cap.
    max_delay: Duration,

    /// Multiplier applied after each failure.
    backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

impl RetryPolicy {
    /// Creates a new retry policy with custom settings.
    ///
    /// `max_attempts` is clamped to at least 1 and `backoff_multiplier` to at
    /// least 1.0 (a non-finite multiplier falls back to the default).
    #[must_use]
    pub fn new(
        max_attempts: u32,
        initial_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        let backoff_multiplier = if backoff_multiplier.is_finite() {
            backoff_multiplier.max(1.0)
        } else {
            DEFAULT_BACKOFF_MULTIPLIER
        };
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            max_delay,
            backoff_multiplier,
        }
    }

    /// Creates a policy with a custom `max_attempts`, using defaults for other settings.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Returns the maximum number of attempts configured.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the delay before the first retry.
    #[must_use]
    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    /// Returns the delay cap.
    #[must_use]
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Returns the backoff multiplier.
    #[must_use]
    pub fn backoff_multiplier(&self) -> f64 {
        self.backoff_multiplier
    }

    /// Returns the sleeps the executor performs when every attempt fails.
    ///
    /// There is one delay between each pair of consecutive attempts, so the
    /// result has `max_attempts - 1` entries.
    #[must_use]
    pub fn delays(&self) -> Vec<Duration> {
        let mut delays = Vec::new();
        let mut delay = self.first_delay();
        for _ in 1..self.max_attempts {
            delays.push(delay);
            delay = self.next_delay(delay);
        }
        delays
    }

    fn first_delay(&self) -> Duration {
        self.initial_delay.min(self.max_delay)
    }

    fn next_delay(&self, current: Duration) -> Duration {
        let scaled = current.as_secs_f64() * self.backoff_multiplier;
        Duration::try_from_secs_f64(scaled)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Runs `operation` until it succeeds or `policy.max_attempts()` attempts fail.
///
/// The executor knows nothing about the operation it wraps; every error is
/// treated as retryable. The final error is returned verbatim.
///
/// # Errors
///
/// Returns the error of the last attempt when all attempts fail.
pub async fn run_with_retry<T, E, F, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt = 1u32;
    let mut delay = policy.first_delay();

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(attempt, "operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) if attempt >= policy.max_attempts => {
                debug!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    error = %error,
                    "max attempts exhausted"
                );
                return Err(error);
            }
            Err(error) => {
                info!(
                    attempt = attempt + 1,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis(),
                    error = %error,
                    "retrying"
                );
                tokio::time::sleep(delay).await;
                delay = policy.next_delay(delay);
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Instant;

    use super::*;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(
            max_attempts,
            Duration::from_millis(1),
            Duration::from_millis(4),
            2.0,
        )
    }

    // ==================== RetryPolicy Tests ====================

    #[test]
    fn test_retry_policy_default_values() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.initial_delay(), Duration::from_secs(1));
        assert_eq!(policy.max_delay(), Duration::from_secs(5));
        assert!((policy.backoff_multiplier() - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_retry_policy_default_delays_are_one_then_two_seconds() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.delays(),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
    }

    #[test]
    fn test_retry_policy_delays_respect_max_delay() {
        let policy = RetryPolicy::new(6, Duration::from_secs(1), Duration::from_secs(5), 2.0);
        assert_eq!(
            policy.delays(),
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(5),
                Duration::from_secs(5),
            ]
        );
    }

    #[test]
    fn test_retry_policy_initial_delay_above_cap_is_capped() {
        let policy = RetryPolicy::new(2, Duration::from_secs(10), Duration::from_secs(3), 2.0);
        assert_eq!(policy.delays(), vec![Duration::from_secs(3)]);
    }

    #[test]
    fn test_retry_policy_max_attempts_minimum_is_one() {
        assert_eq!(RetryPolicy::with_max_attempts(0).max_attempts(), 1);
        assert_eq!(
            RetryPolicy::new(0, Duration::ZERO, Duration::ZERO, 2.0).max_attempts(),
            1
        );
        assert!(RetryPolicy::with_max_attempts(1).delays().is_empty());
    }

    #[test]
    fn test_retry_policy_multiplier_clamped() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1), Duration::from_secs(5), 0.5);
        assert!((policy.backoff_multiplier() - 1.0).abs() < f64::EPSILON);
        let policy = RetryPolicy::new(3, Duration::from_secs(1), Duration::from_secs(5), f64::NAN);
        assert!((policy.backoff_multiplier() - 2.0).abs() < f64::EPSILON);
    }

    // ==================== Executor Tests ====================

    #[tokio::test]
    async fn test_run_with_retry_always_failing_attempts_exactly_max() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result: Result<(), String> = run_with_retry(&fast_policy(4), || {
            let counter = Arc::clone(&counter);
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                Err(format!("failure {n}"))
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        // Last error is surfaced unchanged.
        assert_eq!(result, Err("failure 4".to_string()));
    }

    #[tokio::test]
    async fn test_run_with_retry_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result: Result<&str, String> = run_with_retry(&fast_policy(3), || {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err("flaky".to_string())
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(result, Ok("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_run_with_retry_first_success_does_not_sleep() {
        let policy = RetryPolicy::new(3, Duration::from_secs(30), Duration::from_secs(30), 2.0);
        let started = Instant::now();
        let result: Result<u8, String> = run_with_retry(&policy, || async { Ok(1) }).await;
        assert_eq!(result, Ok(1));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_run_with_retry_single_attempt_policy_never_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result: Result<(), String> = run_with_retry(&fast_policy(1), || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err("nope".to_string())
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_with_retry_waits_between_attempts() {
        let policy = RetryPolicy::new(3, Duration::from_millis(20), Duration::from_millis(40), 2.0);
        let started = Instant::now();
        let result: Result<(), String> =
            run_with_retry(&policy, || async { Err("down".to_string()) }).await;
        assert!(result.is_err());
        // 20ms + 40ms of sleeps.
        assert!(started.elapsed() >= Duration::from_millis(60));
    }

    #[test]
    fn test_default_max_attempts_constant() {
        assert_eq!(DEFAULT_MAX_ATTEMPTS, 3);
    }
}
