//! Token-bucket pacing for outbound text-generation requests.
//!
//! The bucket refills lazily: every acquire attempt credits
//! `elapsed × refill_rate` tokens, clamped to capacity. Tokens debited are
//! never returned, even if the request that consumed them fails or is
//! cancelled afterwards.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::FysioError;

/// Rate limiter configuration.
#[derive(Debug, Clone, Copy)]
pub struct RateLimiterConfig {
    /// Maximum burst size.
    pub capacity: u32,
    /// Window over which a full bucket refills.
    pub window: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            window: Duration::from_secs(60),
        }
    }
}

impl RateLimiterConfig {
    pub fn refill_rate_per_second(&self) -> f64 {
        let secs = self.window.as_secs_f64();
        if secs <= 0.0 {
            return f64::from(self.capacity);
        }
        f64::from(self.capacity) / secs
    }
}

/// Point-in-time copy of the bucket.
#[derive(Debug, Clone, Copy)]
pub struct RateBudget {
    pub capacity: u32,
    pub refill_rate_per_second: f64,
    pub tokens_available: f64,
    pub last_refill: Instant,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    capacity: f64,
    refill_rate: f64,
    last_refill: Instant,
}

impl Bucket {
    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).clamp(0.0, self.capacity);
        self.last_refill = now;
    }

    /// Debit one token, or return how long until one is available.
    fn try_take(&mut self, now: Instant) -> Result<(), Duration> {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            return Ok(());
        }
        if self.refill_rate <= 0.0 {
            // Zero-capacity buckets never refill; poll slowly rather than spin.
            return Err(Duration::from_secs(1));
        }
        let missing = 1.0 - self.tokens;
        let wait = Duration::try_from_secs_f64(missing / self.refill_rate).unwrap_or(Duration::MAX);
        Err(wait.max(Duration::from_millis(1)))
    }
}

pub struct RateLimiter {
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        let capacity = f64::from(config.capacity);
        Self {
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                capacity,
                refill_rate: config.refill_rate_per_second(),
                last_refill: Instant::now(),
            }),
        }
    }

    /// Wait until a token is available, then consume it.
    ///
    /// The lock is released while sleeping so concurrent callers can refill
    /// and race for the next token; no FIFO order is promised.
    pub async fn acquire(&self, cancel: Option<&CancellationToken>) -> Result<(), FysioError> {
        let start = Instant::now();
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                match bucket.try_take(Instant::now()) {
                    Ok(()) => return Ok(()),
                    Err(wait) => wait,
                }
            };

            tracing::debug!(wait_ms = wait.as_millis() as u64, "rate budget exhausted, waiting");

            match cancel {
                Some(token) => {
                    tokio::select! {
                        _ = token.cancelled() => {
                            return Err(FysioError::Cancelled(start.elapsed().as_millis() as u64));
                        }
                        _ = tokio::time::sleep(wait) => {}
                    }
                }
                None => tokio::time::sleep(wait).await,
            }
        }
    }

    /// Consume a token only if one is available right now.
    pub async fn try_acquire(&self) -> bool {
        self.bucket.lock().await.try_take(Instant::now()).is_ok()
    }

    /// Refill and report the current budget without consuming anything.
    pub async fn budget(&self) -> RateBudget {
        let mut bucket = self.bucket.lock().await;
        bucket.refill(Instant::now());
        RateBudget {
            capacity: bucket.capacity as u32,
            refill_rate_per_second: bucket.refill_rate,
            tokens_available: bucket.tokens,
            last_refill: bucket.last_refill,
        }
    }
}
