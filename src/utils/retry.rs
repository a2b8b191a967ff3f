//! Retry utilities for resilient remote calls
//!
//! Every call against the reservation system (token acquisition and day
//! fetches) runs through [`with_retry`], which applies bounded exponential
//! backoff and gives the caller a hook to react to each failure before the
//! next attempt (the scrape client uses it to drop a rejected session token).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one
    pub max_retries: u32,

    /// Base delay in milliseconds for exponential backoff
    pub base_delay_ms: u64,

    /// Maximum delay in milliseconds (caps exponential growth)
    pub max_delay_ms: u64,

    /// Multiplier for exponential backoff (default: 2.0)
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Create a new retry configuration with custom max attempts
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Create a retry configuration with custom delays
    pub fn with_delays(max_retries: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            max_delay_ms,
            backoff_multiplier: 2.0,
        }
    }

    /// Delay to wait after the given (1-based) failed attempt
    ///
    /// `min(base_delay * multiplier^(attempt - 1), max_delay)`
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let exponential = self.base_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        let capped = if exponential.is_finite() {
            (exponential as u64).min(self.max_delay_ms)
        } else {
            self.max_delay_ms
        };

        Duration::from_millis(capped)
    }
}

/// Terminal failure after every attempt of a named operation failed
#[derive(Error, Debug)]
#[error("{operation} failed after {attempts} attempt(s): {source}")]
pub struct RetryError<E>
where
    E: std::error::Error + 'static,
{
    /// Human readable name of the operation
    pub operation: String,

    /// Number of attempts made
    pub attempts: u32,

    /// Error of the last attempt
    #[source]
    pub source: E,
}

/// Execute an operation with retry logic and exponential backoff
///
/// Runs `operation` up to `config.max_retries` times (at least once). After
/// each failure `on_failure` is invoked with the error, then the task sleeps
/// for [`RetryConfig::calculate_delay`] before the next attempt. No delay is
/// applied after the final attempt.
///
/// # Example
///
/// ```no_run
/// use roomwatch::utils::retry::{with_retry, RetryConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = RetryConfig::default();
/// let body = with_retry(
///     &config,
///     "fetch landing page",
///     || async { reqwest::get("https://example.com").await?.text().await },
///     |_err| {},
/// )
/// .await?;
/// # Ok(())
/// # }
/// ```
pub async fn with_retry<T, E, F, Fut, H>(
    config: &RetryConfig,
    operation_name: impl fmt::Display,
    operation: F,
    mut on_failure: H,
) -> Result<T, RetryError<E>>
where
    E: std::error::Error + 'static,
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    H: FnMut(&E),
{
    let max_attempts = config.max_retries.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(
                        operation = %operation_name,
                        attempt = attempt,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(e) => {
                on_failure(&e);

                if attempt >= max_attempts {
                    warn!(
                        operation = %operation_name,
                        attempts = attempt,
                        error = %e,
                        "Operation failed, retries exhausted"
                    );
                    return Err(RetryError {
                        operation: operation_name.to_string(),
                        attempts: attempt,
                        source: e,
                    });
                }

                let delay = config.calculate_delay(attempt);
                warn!(
                    operation = %operation_name,
                    attempt = attempt,
                    max_attempts = max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Operation failed, will retry"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Error)]
    #[error("simulated: {0}")]
    struct Simulated(&'static str);

    fn fast_config(max_retries: u32) -> RetryConfig {
        RetryConfig::with_delays(max_retries, 1, 5)
    }

    #[tokio::test]
    async fn test_retry_success_first_attempt() {
        let config = fast_config(3);
        let result = with_retry(&config, "answer", || async { Ok::<_, Simulated>(42) }, |_| {}).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_succeeds_on_final_attempt() {
        let config = fast_config(5);
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = Arc::clone(&attempts);
        let mut failures_seen = 0;

        let result = with_retry(
            &config,
            "flaky",
            move || {
                let attempts = Arc::clone(&attempts_clone);
                async move {
                    let count = attempts.fetch_add(1, Ordering::SeqCst);
                    if count < 4 {
                        return Err(Simulated("not yet"));
                    }
                    Ok(42)
                }
            },
            |_| failures_seen += 1,
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 5);
        assert_eq!(failures_seen, 4);
    }

    #[tokio::test]
    async fn test_retry_exhausted_is_named_and_counted() {
        let config = fast_config(3);
        let result: Result<(), _> = with_retry(
            &config,
            "fetch day 2026-10-16",
            || async { Err(Simulated("permanent")) },
            |_| {},
        )
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.attempts, 3);
        assert_eq!(err.operation, "fetch day 2026-10-16");
        assert!(err.to_string().contains("after 3 attempt(s)"));
        assert!(err.to_string().contains("permanent"));
    }

    #[tokio::test]
    async fn test_zero_attempts_still_runs_once() {
        let config = fast_config(0);
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(
            &config,
            "once",
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(Simulated("nope")) }
            },
            |_| {},
        )
        .await;

        assert_eq!(result.unwrap_err().attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_calculate_delay() {
        let config = RetryConfig::default();

        assert_eq!(config.calculate_delay(0), Duration::from_millis(0));
        assert_eq!(config.calculate_delay(1), Duration::from_millis(1000));
        assert_eq!(config.calculate_delay(2), Duration::from_millis(2000));
        assert_eq!(config.calculate_delay(3), Duration::from_millis(4000));
    }

    #[test]
    fn test_delays_non_decreasing_and_capped() {
        let config = RetryConfig::with_delays(5, 1000, 5000);
        let delays: Vec<Duration> = (1..=4).map(|a| config.calculate_delay(a)).collect();

        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert!(delays.iter().all(|d| *d <= Duration::from_millis(5000)));
        assert_eq!(delays[3], Duration::from_millis(5000));
    }

    #[test]
    fn test_max_delay_cap_with_huge_attempt() {
        let config = RetryConfig::with_delays(10, 1000, 5000);
        assert_eq!(config.calculate_delay(10), Duration::from_millis(5000));
        assert_eq!(config.calculate_delay(5000), Duration::from_millis(5000));
    }
}
