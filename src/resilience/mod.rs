pub mod rate_limiter;
pub mod retry;

pub use rate_limiter::{RateBudget, RateLimiter, RateLimiterConfig};
pub use retry::{Classifier, RetryExecutor, RetryPolicy};
