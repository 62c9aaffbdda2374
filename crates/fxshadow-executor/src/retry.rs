//! Bounded retry primitive.

use std::future::Future;
use std::time::Duration;

use fxshadow_broker::BrokerResult;
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::error::{ExecutorError, ExecutorResult};

/// Bounded attempts with a pause between them.
///
/// The pause after attempt `n` is `interval_ms * backoff_factor^(n-1)`,
/// capped at `max_interval_ms` when that is non-zero. A factor of 1 gives a
/// fixed interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub interval_ms: u64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: u32,
    #[serde(default)]
    pub max_interval_ms: u64,
}

fn default_backoff_factor() -> u32 {
    1
}

impl RetryPolicy {
    /// Fixed interval between attempts.
    pub fn fixed(max_attempts: u32, interval_ms: u64) -> Self {
        Self {
            max_attempts,
            interval_ms,
            backoff_factor: 1,
            max_interval_ms: 0,
        }
    }

    /// No pause between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::fixed(max_attempts, 0)
    }

    /// Pause after `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(10);
        let delay = self
            .interval_ms
            .saturating_mul(u64::from(self.backoff_factor.max(1)).saturating_pow(exponent));
        let delay = if self.max_interval_ms > 0 {
            delay.min(self.max_interval_ms)
        } else {
            delay
        };
        Duration::from_millis(delay)
    }

    /// Sleep for the pause after `attempt`.
    pub async fn pause(&self, attempt: u32) {
        let delay = self.delay(attempt);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    /// Run `op` until it yields a value or the attempts run out.
    ///
    /// `op` receives the 1-based attempt number. `Ok(None)` and recoverable
    /// broker errors count as a miss; a fatal broker error stops immediately.
    /// Returns `Ok(None)` when every attempt missed.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> BrokerResult<Option<T>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = BrokerResult<Option<T>>>,
    {
        for attempt in 1..=self.max_attempts {
            match op(attempt).await {
                Ok(Some(value)) => return Ok(Some(value)),
                Ok(None) => trace!(label, attempt, "Attempt missed"),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!(label, attempt, error = %e, "Attempt failed"),
            }
            if attempt < self.max_attempts {
                self.pause(attempt).await;
            }
        }
        Ok(None)
    }

    /// Validate configuration values.
    pub fn validate(&self, name: &str) -> ExecutorResult<()> {
        if self.max_attempts == 0 {
            return Err(ExecutorError::ConfigError(format!(
                "{name}.max_attempts must be positive"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fxshadow_broker::BrokerError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_fixed_delay() {
        let policy = RetryPolicy::fixed(6, 700);
        assert_eq!(policy.delay(1), Duration::from_millis(700));
        assert_eq!(policy.delay(5), Duration::from_millis(700));
    }

    #[test]
    fn test_backoff_delay_capped() {
        let policy = RetryPolicy {
            max_attempts: 5,
            interval_ms: 100,
            backoff_factor: 2,
            max_interval_ms: 350,
        };
        assert_eq!(policy.delay(1), Duration::from_millis(100));
        assert_eq!(policy.delay(2), Duration::from_millis(200));
        assert_eq!(policy.delay(3), Duration::from_millis(350));
    }

    #[tokio::test]
    async fn test_run_returns_first_hit() {
        let calls = AtomicU32::new(0);
        let result = RetryPolicy::immediate(8)
            .run("poll", |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Ok((attempt == 3).then_some(attempt)) }
            })
            .await
            .unwrap();
        assert_eq!(result, Some(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_run_exhausts_to_none() {
        let calls = AtomicU32::new(0);
        let result: Option<()> = RetryPolicy::immediate(4)
            .run("poll", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(BrokerError::Unavailable("positions".into())) }
            })
            .await
            .unwrap();
        assert_eq!(result, None);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_run_stops_on_fatal() {
        let calls = AtomicU32::new(0);
        let result: BrokerResult<Option<()>> = RetryPolicy::immediate(4)
            .run("poll", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(BrokerError::Disconnected("gone".into())) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_pauses_between_attempts() {
        let start = std::time::Instant::now();
        let _: Option<()> = RetryPolicy::fixed(3, 20)
            .run("poll", |_| async { Ok(None) })
            .await
            .unwrap();
        // Two pauses, none after the last attempt.
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn test_validate() {
        assert!(RetryPolicy::immediate(0).validate("link_poll").is_err());
        assert!(RetryPolicy::fixed(8, 400).validate("link_poll").is_ok());
    }
}
