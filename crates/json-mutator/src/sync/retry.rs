//! Retry with exponential backoff for transient submission failures.
//!
//! ```
//! use json_mutator::sync::RetryConfig;
//!
//! let submit = RetryConfig::submit();
//! assert_eq!(submit.max_retries, Some(5));
//!
//! let forever = RetryConfig::persistent();
//! assert_eq!(forever.max_retries, None);
//! ```

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use tokio::time::sleep;
use tracing::{info, warn};

/// Backoff settings. `max_retries` counts attempts; `None` never gives up.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    #[serde(rename = "initial_delay_ms", deserialize_with = "millis")]
    pub initial_delay: Duration,
    #[serde(rename = "max_delay_ms", deserialize_with = "millis")]
    pub max_delay: Duration,
    pub factor: f64,
    pub max_retries: Option<usize>,
}

fn millis<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_millis)
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::submit()
    }
}

impl RetryConfig {
    /// A handful of attempts for one transaction, then report the failure.
    #[must_use]
    pub fn submit() -> Self {
        Self {
            max_retries: Some(5),
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            factor: 2.0,
        }
    }

    /// Keep retrying with backoff capped at one minute.
    #[must_use]
    pub fn persistent() -> Self {
        Self {
            max_retries: None,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            factor: 2.0,
        }
    }

    /// Rejects a `factor` that would shrink the delay or is not a number.
    pub fn validate(&self) -> Result<(), String> {
        if self.factor.is_finite() && self.factor >= 1.0 {
            Ok(())
        } else {
            Err(format!("retry factor must be a finite number >= 1, got {}", self.factor))
        }
    }

    /// No waiting between attempts.
    #[must_use]
    pub fn immediate(max_retries: usize) -> Self {
        Self {
            max_retries: Some(max_retries),
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            factor: 1.0,
        }
    }
}

/// Grows `delay` by the factor, capped at `max_delay`. A product that is not
/// a valid duration jumps straight to the cap.
fn next_delay(delay: Duration, config: &RetryConfig) -> Duration {
    Duration::try_from_secs_f64(delay.as_secs_f64() * config.factor)
        .map_or(config.max_delay, |next| next.min(config.max_delay))
}

/// Runs `operation` until it succeeds, fails with an error `should_retry`
/// rejects, or the attempt budget runs out.
pub async fn retry<F, Fut, T, E, P>(
    operation_name: &str,
    config: &RetryConfig,
    should_retry: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    P: Fn(&E) -> bool,
{
    let mut delay = config.initial_delay;
    let mut attempts = 0;

    loop {
        match operation().await {
            Ok(val) => {
                if attempts > 0 {
                    info!(operation = operation_name, retries = attempts, "succeeded after retry");
                }
                return Ok(val);
            }
            Err(err) => {
                attempts += 1;
                if !should_retry(&err) {
                    return Err(err);
                }
                if let Some(max) = config.max_retries {
                    if attempts >= max {
                        warn!(operation = operation_name, attempts, error = %err, "giving up");
                        return Err(err);
                    }
                }
                warn!(
                    operation = operation_name,
                    attempts,
                    error = %err,
                    next_delay = ?delay,
                    "attempt failed, retrying"
                );
                sleep(delay).await;
                delay = next_delay(delay, config);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn delay_grows_to_the_cap() {
        let config = RetryConfig {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(300),
            factor: 2.0,
            max_retries: None,
        };
        let second = next_delay(config.initial_delay, &config);
        assert_eq!(second, Duration::from_millis(200));
        assert_eq!(next_delay(second, &config), Duration::from_millis(300));
    }

    #[test]
    fn unusable_factors_do_not_panic() {
        for factor in [-1.0, f64::NAN, f64::INFINITY, 1e300] {
            let config = RetryConfig {
                factor,
                ..RetryConfig::submit()
            };
            assert_eq!(next_delay(Duration::from_secs(1), &config), config.max_delay, "{factor}");
        }
        assert!(RetryConfig { factor: 0.5, ..RetryConfig::submit() }.validate().is_err());
        assert!(RetryConfig::immediate(1).validate().is_ok());
    }

    #[tokio::test]
    async fn succeeds_first_try() {
        let result: Result<i32, String> =
            retry("op", &RetryConfig::immediate(3), |_| true, || async { Ok(42) }).await;
        assert_eq!(result, Ok(42));
    }

    #[tokio::test]
    async fn succeeds_after_failures() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let result: Result<i32, String> = retry("op", &RetryConfig::immediate(5), |_| true, || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(format!("fail {n}"))
                } else {
                    Ok(n as i32)
                }
            }
        })
        .await;
        assert_eq!(result, Ok(3));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stops_at_budget() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let result: Result<(), String> = retry("op", &RetryConfig::immediate(3), |_| true, || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err("down".to_string())
            }
        })
        .await;
        assert_eq!(result, Err("down".to_string()));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let result: Result<(), String> =
            retry("op", &RetryConfig::immediate(10), |e: &String| e != "fatal", || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err("fatal".to_string())
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_grows_to_cap() {
        let config = RetryConfig {
            max_retries: Some(4),
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(250),
            factor: 2.0,
        };
        let start = tokio::time::Instant::now();
        let _: Result<(), String> =
            retry("op", &config, |_| true, || async { Err("down".to_string()) }).await;
        // 100 + 200 + 250
        assert_eq!(start.elapsed(), Duration::from_millis(550));
    }
}
