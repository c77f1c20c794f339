//! Bounded exponential-backoff retry shared by the completion and
//! transcription clients. Each client supplies its own classifier; the
//! attempt cap and delay math are common.

use std::future::Future;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::error::FysioError;

/// Retry policy configuration.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubled for each further attempt.
    pub base_delay: Duration,
    /// Upper bound on a single backoff sleep (before jitter).
    pub max_delay: Duration,
    /// Maximum jitter as a fraction of the computed delay.
    pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
            jitter_ratio: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Delay without jitter before retrying after the given zero-based failed
    /// attempt: `base × 2^attempt`, capped at `max_delay`.
    pub fn base_backoff(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.min(16));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Backoff plus up to `jitter_ratio` of random extra delay.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base = self.base_backoff(attempt);
        let ratio = self.jitter_ratio.clamp(0.0, 1.0);
        if ratio == 0.0 || base.is_zero() {
            return base;
        }
        let jitter = rand::thread_rng().gen_range(0.0..=ratio);
        base + base.mul_f64(jitter)
    }
}

/// Decides whether a failed attempt may be repeated.
pub type Classifier = fn(&FysioError) -> bool;

#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    classifier: Classifier,
}

impl RetryExecutor {
    /// Executor using the default text-generation classification.
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            classifier: FysioError::is_retryable,
        }
    }

    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or exhausts the attempt cap. The closure receives the zero-based
    /// attempt index. The last error is returned as-is so callers can
    /// inspect its kind.
    pub async fn execute<F, Fut, T>(
        &self,
        cancel: Option<&CancellationToken>,
        mut operation: F,
    ) -> Result<T, FysioError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, FysioError>>,
    {
        let start = Instant::now();
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_some_and(|t| t.is_cancelled()) {
                return Err(FysioError::Cancelled(start.elapsed().as_millis() as u64));
            }

            let result = match cancel {
                Some(token) => {
                    tokio::select! {
                        _ = token.cancelled() => {
                            return Err(FysioError::Cancelled(start.elapsed().as_millis() as u64));
                        }
                        r = operation(attempt) => r,
                    }
                }
                None => operation(attempt).await,
            };

            let err = match result {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let retryable = (self.classifier)(&err);
            if !retryable || attempt + 1 >= max_attempts {
                if retryable {
                    tracing::warn!(
                        attempts = attempt + 1,
                        kind = %err.kind(),
                        "retries exhausted: {err}"
                    );
                }
                return Err(err);
            }

            let delay = self.policy.backoff(attempt);
            tracing::warn!(
                attempt = attempt + 1,
                max_attempts = max_attempts,
                delay_ms = delay.as_millis() as u64,
                kind = %err.kind(),
                "retryable failure: {err}"
            );

            match cancel {
                Some(token) => {
                    tokio::select! {
                        _ = token.cancelled() => {
                            return Err(FysioError::Cancelled(start.elapsed().as_millis() as u64));
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                None => tokio::time::sleep(delay).await,
            }

            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
            jitter_ratio: 0.0,
        };
        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(350));
        assert_eq!(policy.backoff(40), Duration::from_millis(350));
    }

    #[test]
    fn jitter_stays_within_ten_percent() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(1000),
            ..RetryPolicy::default()
        };
        for _ in 0..200 {
            let d = policy.backoff(1);
            assert!(d >= Duration::from_millis(2000));
            assert!(d <= Duration::from_millis(2200), "jitter too large: {d:?}");
        }
    }
}
