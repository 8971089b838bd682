//! Bounded retry with exponential backoff and jitter.
//!
//! Every completion call in the pipeline goes through [`retry_completion`].
//! Transient failures (429, 5xx, network timeouts) are retried up to
//! `max_retries` times; permanent failures (400, 401, bad bodies) return
//! immediately.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::CompletionError;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries (0 = no retries, just fail immediately).
    pub max_retries: u32,
    /// Initial delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Backoff multiplier (typically 2.0 for exponential backoff).
    pub multiplier: f64,
    /// Whether to add jitter to prevent thundering herd.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Create a config with the given number of retries.
    pub fn with_retries(retries: u32) -> Self {
        Self {
            max_retries: retries,
            ..Default::default()
        }
    }

    /// No retries at all.
    pub fn none() -> Self {
        Self::with_retries(0)
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_secs_f64());

        if self.jitter {
            // Deterministic jitter keyed on the attempt number.
            let jitter_factor = match attempt % 4 {
                0 => 0.75,
                1 => 0.90,
                2 => 0.60,
                _ => 0.85,
            };
            Duration::from_secs_f64(capped * jitter_factor)
        } else {
            Duration::from_secs_f64(capped)
        }
    }
}

/// Substrings of failures that never produced an HTTP status.
const NETWORK_MARKERS: &[&str] = &[
    "request failed:",
    "connection reset",
    "connection refused",
    "timed out",
    "broken pipe",
];

/// Status code from an `"... HTTP {status}: ..."` error string.
fn http_status(error: &str) -> Option<u16> {
    let (_, rest) = error.split_once("HTTP ")?;
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

/// Turn a client error string into a typed [`CompletionError`].
///
/// 429 and 5xx responses and network failures are transient. Every other
/// status, unparseable bodies, and anything unrecognized are permanent.
pub fn classify_error(error: &str) -> CompletionError {
    let transient = match http_status(error) {
        Some(429) => true,
        Some(status) => (500..600).contains(&status),
        None => {
            let lower = error.to_lowercase();
            NETWORK_MARKERS.iter().any(|m| lower.contains(m))
        }
    };
    if transient {
        CompletionError::Transient(error.to_string())
    } else {
        CompletionError::Permanent(error.to_string())
    }
}

/// Retry an async completion call with exponential backoff for transient errors.
pub async fn retry_completion<T, F, Fut>(
    config: &RetryConfig,
    mut call: F,
) -> Result<T, CompletionError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CompletionError>>,
{
    let mut attempt = 0;
    loop {
        match call().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_transient() && attempt < config.max_retries => {
                let delay = config.delay_for_attempt(attempt);
                warn!(
                    "Transient completion error (attempt {}/{}): {e}. Retrying in {delay:?}...",
                    attempt + 1,
                    config.max_retries,
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(retries: u32) -> RetryConfig {
        RetryConfig {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            jitter: false,
            ..RetryConfig::with_retries(retries)
        }
    }

    #[test]
    fn delay_increases_exponentially() {
        let config = RetryConfig {
            jitter: false,
            ..RetryConfig::with_retries(5)
        };
        let d0 = config.delay_for_attempt(0);
        let d1 = config.delay_for_attempt(1);
        let d2 = config.delay_for_attempt(2);

        assert!(d1 > d0, "d1={d1:?} should be > d0={d0:?}");
        assert!(d2 > d1, "d2={d2:?} should be > d1={d1:?}");
    }

    #[test]
    fn delay_capped_at_max() {
        let config = RetryConfig {
            jitter: false,
            max_delay: Duration::from_secs(2),
            ..RetryConfig::with_retries(10)
        };
        assert!(config.delay_for_attempt(10) <= Duration::from_secs(2));
    }

    #[test]
    fn jitter_reduces_delay() {
        let jittered = RetryConfig::with_retries(3);
        let plain = RetryConfig {
            jitter: false,
            ..RetryConfig::with_retries(3)
        };
        assert!(jittered.delay_for_attempt(2) <= plain.delay_for_attempt(2));
    }

    #[test]
    fn classify_splits_transient_and_permanent() {
        assert!(classify_error("completion API HTTP 429: rate limited").is_transient());
        assert!(classify_error("completion API HTTP 503: overloaded").is_transient());
        assert!(classify_error("request failed: connection reset").is_transient());
        assert!(!classify_error("completion API HTTP 400: bad request").is_transient());
        assert!(!classify_error("completion API HTTP 401: unauthorized").is_transient());
        assert!(!classify_error("invalid response body: EOF").is_transient());
        assert!(!classify_error("some random error").is_transient());
        assert!(!classify_error("completion API HTTP 404: timed out waiting for model").is_transient());
    }

    #[tokio::test]
    async fn retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let result = retry_completion(&fast(3), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(CompletionError::Transient("HTTP 503".into()))
                } else {
                    Ok("done")
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_completion(&fast(2), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(CompletionError::Transient("timed out".into())) }
        })
        .await;
        assert!(result.unwrap_err().is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_completion(&fast(5), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(CompletionError::Permanent("HTTP 401".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
