//! Bounded exponential backoff for store contention

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Retry behaviour for busy/locked store operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial delay between retries (milliseconds)
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Multiplier for exponential backoff
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Maximum delay between retries (milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Spread concurrent retries apart
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

fn default_max_retries() -> u32 {
    4
}
fn default_initial_delay_ms() -> u64 {
    20
}
fn default_backoff_multiplier() -> f64 {
    2.0
}
fn default_max_delay_ms() -> u64 {
    500
}
fn default_jitter() -> bool {
    true
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_delay_ms: default_max_delay_ms(),
            jitter: default_jitter(),
        }
    }
}

impl RetryPolicy {
    /// Fail on the first contention error
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Total attempts including the first
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Calculate delay for a given attempt (0-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_delay =
            self.initial_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32);

        let capped_delay = base_delay.min(self.max_delay_ms as f64);

        let final_delay = if self.jitter {
            // 0.8 ..= 1.2
            let jitter_factor = 0.8 + rand_jitter() * 0.4;
            capped_delay * jitter_factor
        } else {
            capped_delay
        };

        Duration::from_millis(final_delay as u64)
    }
}

/// Cheap pseudo-random value in 0.0..1.0
fn rand_jitter() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (nanos % 1000) as f64 / 1000.0
}

/// Run `operation`, retrying while it fails with a retryable error
///
/// Once the budget is spent the last error becomes `Error::StoreUnavailable`.
/// Non-retryable errors are returned untouched on the first failure.
pub fn with_retry<T, F>(policy: &RetryPolicy, operation_name: &str, mut operation: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let mut attempt = 0;

    loop {
        match operation() {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_retryable() => {
                debug!(
                    operation = operation_name,
                    attempt = attempt + 1,
                    "non-retryable store error: {}",
                    e
                );
                return Err(e);
            }
            Err(e) => {
                if attempt >= policy.max_retries {
                    warn!(
                        operation = operation_name,
                        attempts = attempt + 1,
                        "store retries exhausted: {}",
                        e
                    );
                    return Err(Error::store_unavailable(operation_name, attempt + 1, e));
                }

                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    operation = operation_name,
                    attempt = attempt + 1,
                    "store busy, retrying in {:?}: {}",
                    delay,
                    e
                );

                std::thread::sleep(delay);
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn busy() -> Error {
        Error::Sqlite(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        ))
    }

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_delay_ms: 1,
            max_delay_ms: 2,
            jitter: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_delay_calculation() {
        let policy = RetryPolicy {
            initial_delay_ms: 20,
            backoff_multiplier: 2.0,
            max_delay_ms: 500,
            jitter: false,
            ..Default::default()
        };

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(20));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(40));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(80));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_millis(500)); // capped
    }

    #[test]
    fn test_jitter_stays_in_band() {
        let policy = RetryPolicy {
            initial_delay_ms: 100,
            jitter: true,
            ..Default::default()
        };
        let delay = policy.delay_for_attempt(0);
        assert!(delay >= Duration::from_millis(80) && delay <= Duration::from_millis(120));
    }

    #[test]
    fn test_recovers_after_transient_busy() {
        let calls = Cell::new(0);
        let result = with_retry(&fast_policy(3), "put", || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(busy())
            } else {
                Ok("stored")
            }
        });

        assert_eq!(result.unwrap(), "stored");
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_exhausted_budget_is_store_unavailable() {
        let calls = Cell::new(0);
        let result: Result<()> = with_retry(&fast_policy(2), "fetch", || {
            calls.set(calls.get() + 1);
            Err(busy())
        });

        match result.unwrap_err() {
            Error::StoreUnavailable {
                operation,
                attempts,
                ..
            } => {
                assert_eq!(operation, "fetch");
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_non_retryable_fails_fast() {
        let calls = Cell::new(0);
        let result: Result<()> = with_retry(&fast_policy(5), "put", || {
            calls.set(calls.get() + 1);
            Err(Error::corrupt("bad gzip header"))
        });

        assert!(matches!(result.unwrap_err(), Error::CorruptPayload(_)));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_no_retry_policy() {
        let policy = RetryPolicy::no_retry();
        assert_eq!(policy.max_attempts(), 1);
        let result: Result<()> = with_retry(&policy, "remove", || Err(busy()));
        assert!(matches!(
            result.unwrap_err(),
            Error::StoreUnavailable { attempts: 1, .. }
        ));
    }
}
