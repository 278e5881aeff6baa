//! Bounded polling for upstream data
//!
//! Upstream rider data is produced asynchronously and may not be ready on the
//! first read. [`RetryPolicy::poll_until`] re-runs a fetch at a fixed interval
//! until the result is acceptable or the attempt budget is spent.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::RetrySettings;
use crate::error::ZPowerError;

/// Fixed-interval retry budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Pause between attempts
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            interval: Duration::from_secs(1),
        }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            interval: Duration::from_millis(settings.interval_ms),
        }
    }
}

#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// No acceptable result within the attempt budget
    #[error("Gave up after {attempts} attempts")]
    Exhausted {
        attempts: u32,
        /// Error from the last failed fetch; `None` when every fetch
        /// succeeded but the data was never accepted
        last_error: Option<E>,
    },
}

impl<E: Display> From<RetryError<E>> for ZPowerError {
    fn from(err: RetryError<E>) -> Self {
        match err {
            RetryError::Exhausted {
                attempts,
                last_error,
            } => ZPowerError::RetryExhausted {
                attempts,
                reason: last_error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "data not ready".to_string()),
            },
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// Run `fetch` until `accept` holds for its result
    ///
    /// A budget of zero attempts still runs the fetch once.
    pub async fn poll_until<T, E, F, Fut, A>(
        &self,
        mut fetch: F,
        accept: A,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        A: Fn(&T) -> bool,
        E: Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            match fetch().await {
                Ok(value) if accept(&value) => {
                    debug!(attempt, "Upstream data accepted");
                    return Ok(value);
                }
                Ok(_) => {
                    debug!(attempt, max_attempts, "Upstream data not ready");
                }
                Err(e) => {
                    warn!(attempt, max_attempts, error = %e, "Upstream fetch failed");
                    last_error = Some(e);
                }
            }

            if attempt < max_attempts {
                tokio::time::sleep(self.interval).await;
            }
        }

        Err(RetryError::Exhausted {
            attempts: max_attempts,
            last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_accepts_on_later_attempt() {
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let result = fast_policy(3)
            .poll_until(
                move || async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    Ok::<u32, String>(n)
                },
                |n| *n >= 2,
            )
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_stops_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let result = fast_policy(3)
            .poll_until(
                move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<u32, String>("upstream busy".to_string())
                },
                |_| true,
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(RetryError::Exhausted {
                attempts,
                last_error,
            }) => {
                assert_eq!(attempts, 3);
                assert_eq!(last_error.as_deref(), Some("upstream busy"));
            }
            Ok(_) => panic!("expected exhaustion"),
        }
    }

    #[tokio::test]
    async fn test_never_accepted_maps_to_engine_error() {
        let result = fast_policy(2)
            .poll_until(|| async { Ok::<Vec<u32>, String>(Vec::new()) }, |v| !v.is_empty())
            .await;

        let err: ZPowerError = result.unwrap_err().into();
        assert!(matches!(err, ZPowerError::RetryExhausted { attempts: 2, .. }));
    }

    #[test]
    fn test_policy_from_settings() {
        let policy = RetryPolicy::from(&RetrySettings::default());
        assert_eq!(policy, RetryPolicy::default());
    }
}
