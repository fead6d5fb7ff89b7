//! Retry with exponential backoff and per-call deadlines.

use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::error::{SourceError, SourceResult};
use crate::types::WitnessSource;

/// Backoff policy for transient witness failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Growth factor applied per retry.
    pub backoff_multiplier: f64,
    /// Stretch each delay by up to a quarter at random.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Runs an operation until it succeeds, fails permanently, or the retry
/// budget is spent; the last error is returned in the latter two cases.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: RetryConfig,
}

impl RetryExecutor {
    #[must_use]
    pub fn new(policy: RetryConfig) -> Self {
        Self { policy }
    }

    /// Pause before retry number `retry` (0-based).
    fn backoff(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let grown = self
            .policy
            .initial_delay
            .mul_f64(self.policy.backoff_multiplier.powi(exponent).min(1e6));
        let capped = grown.min(self.policy.max_delay);
        if self.policy.jitter {
            capped.mul_f64(1.0 + 0.25 * unit_random())
        } else {
            capped
        }
    }

    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> SourceResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = SourceResult<T>>,
    {
        let mut retry = 0;
        loop {
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            if !err.is_transient() || retry >= self.policy.max_retries {
                return Err(err);
            }
            let pause = self.backoff(retry);
            debug!(
                retry = retry + 1,
                of = self.policy.max_retries,
                pause_ms = pause.as_millis() as u64,
                error = %err,
                "Transient failure, backing off"
            );
            tokio::time::sleep(pause).await;
            retry += 1;
        }
    }
}

/// Run `fut` with a deadline, mapping expiry to [`SourceError::Timeout`].
pub async fn with_timeout<Fut, T>(system: WitnessSource, timeout: Duration, fut: Fut) -> SourceResult<T>
where
    Fut: Future<Output = SourceResult<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(SourceError::Timeout {
            system,
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}

/// A value in `[0, 1)` from the std hasher's per-process random keys.
fn unit_random() -> f64 {
    use std::collections::hash_map::RandomState;
    use std::hash::BuildHasher;

    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or_default();
    let bits = RandomState::new().hash_one(nanos);
    (bits >> 11) as f64 / (1u64 << 53) as f64
}
