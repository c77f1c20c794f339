//! Rate-budget conservation and retry bounds under a paused clock.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

use fysioscribe::error::{AuthCause, ErrorKind, FysioError};
use fysioscribe::resilience::{RateLimiter, RateLimiterConfig, RetryExecutor, RetryPolicy};

fn limiter(capacity: u32, window_secs: u64) -> RateLimiter {
    RateLimiter::new(RateLimiterConfig {
        capacity,
        window: Duration::from_secs(window_secs),
    })
}

fn policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(100),
        max_delay: Duration::from_secs(5),
        jitter_ratio: 0.1,
    }
}

fn transient() -> FysioError {
    FysioError::Upstream {
        provider: "openai".to_string(),
        message: "HTTP 503".to_string(),
        status: Some(503),
    }
}

// ---------------------------------------------------------------------------
// Token bucket
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn grants_never_exceed_capacity_plus_refill() {
    // 5 tokens, refilling 1 per second.
    let limiter = limiter(5, 5);

    let mut granted = 0;
    for _ in 0..20 {
        if limiter.try_acquire().await {
            granted += 1;
        }
    }
    assert_eq!(granted, 5);

    tokio::time::advance(Duration::from_millis(2500)).await;
    let mut later = 0;
    for _ in 0..20 {
        if limiter.try_acquire().await {
            later += 1;
        }
    }
    assert_eq!(later, 2);
}

#[tokio::test(start_paused = true)]
async fn concurrent_acquires_are_paced() {
    // 2 tokens, 2 per second.
    let limiter = Arc::new(limiter(2, 1));
    let start = tokio::time::Instant::now();

    let mut handles = Vec::new();
    for _ in 0..6 {
        let limiter = limiter.clone();
        handles.push(tokio::spawn(async move {
            limiter.acquire(None).await.unwrap();
            tokio::time::Instant::now()
        }));
    }

    let mut finished = Vec::new();
    for handle in handles {
        finished.push(handle.await.unwrap());
    }

    // 2 immediately, then 4 more at 2/s.
    let elapsed = finished.iter().max().unwrap().duration_since(start);
    assert!(elapsed >= Duration::from_millis(1900), "elapsed {elapsed:?}");
    assert!(elapsed <= Duration::from_millis(2500), "elapsed {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn concurrent_acquires_at_start_grant_exactly_capacity() {
    // 5 tokens, one more every 12 minutes.
    let limiter = Arc::new(limiter(5, 3600));
    let start = tokio::time::Instant::now();

    let mut handles = Vec::new();
    for _ in 0..12 {
        let limiter = limiter.clone();
        handles.push(tokio::spawn(async move {
            limiter.acquire(None).await.unwrap();
            tokio::time::Instant::now()
        }));
    }

    let mut immediate = 0;
    for handle in handles {
        if handle.await.unwrap() == start {
            immediate += 1;
        }
        assert!(limiter.budget().await.tokens_available <= 5.0);
    }
    assert_eq!(immediate, 5);
}

#[tokio::test(start_paused = true)]
async fn cancelled_wait_keeps_budget() {
    let limiter = limiter(1, 3600);
    assert_ok!(limiter.acquire(None).await);

    let token = CancellationToken::new();
    token.cancel();
    let err = assert_err!(limiter.acquire(Some(&token)).await);
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert!(!limiter.try_acquire().await);
}

// ---------------------------------------------------------------------------
// Retry executor
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn always_transient_runs_exactly_max_attempts() {
    for max_attempts in [1, 3, 5] {
        let calls = AtomicU32::new(0);
        let executor = RetryExecutor::new(policy(max_attempts));

        let result: Result<(), _> = executor
            .execute(None, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(transient()) }
            })
            .await;

        let err = assert_err!(result);
        assert_eq!(err.kind(), ErrorKind::TransientService);
        assert_eq!(calls.load(Ordering::SeqCst), max_attempts);
    }
}

#[tokio::test(start_paused = true)]
async fn non_retryable_classes_run_once() {
    let failures = [
        FysioError::InvalidRequest("bad".to_string()),
        FysioError::AuthFailed {
            provider: "openai".to_string(),
            status: 401,
            cause: AuthCause::InvalidCredential,
            message: "invalid credential".to_string(),
        },
        FysioError::EmptyResult {
            provider: "openai".to_string(),
            message: "empty".to_string(),
        },
    ];

    for failure in failures {
        let expected = failure.kind();
        let slot = std::sync::Mutex::new(Some(failure));
        let calls = AtomicU32::new(0);
        let executor = RetryExecutor::new(policy(4));

        let result: Result<(), _> = executor
            .execute(None, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                let err = slot.lock().unwrap().take().unwrap_or_else(transient);
                async move { Err(err) }
            })
            .await;

        assert_eq!(assert_err!(result).kind(), expected);
        assert_eq!(calls.load(Ordering::SeqCst), 1, "{expected}");
    }
}

#[tokio::test(start_paused = true)]
async fn unlisted_client_status_is_retried_to_cap() {
    let calls = AtomicU32::new(0);
    let executor = RetryExecutor::new(policy(3));

    let result: Result<(), _> = executor
        .execute(None, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(FysioError::Upstream {
                    provider: "gateway".to_string(),
                    message: "HTTP 404".to_string(),
                    status: Some(404),
                })
            }
        })
        .await;

    assert_eq!(assert_err!(result).kind(), ErrorKind::TransientService);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn backoff_is_exponential() {
    let executor = RetryExecutor::new(RetryPolicy {
        jitter_ratio: 0.0,
        ..policy(4)
    });
    let start = tokio::time::Instant::now();

    let result: Result<(), _> = executor
        .execute(None, |_| async { Err(transient()) })
        .await;

    assert_err!(result);
    // 100 + 200 + 400 ms between four attempts.
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(700), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(710), "elapsed {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn attempt_index_is_passed_and_success_stops() {
    let executor = RetryExecutor::new(policy(5));
    let seen = std::sync::Mutex::new(Vec::new());

    let result = executor
        .execute(None, |attempt| {
            seen.lock().unwrap().push(attempt);
            async move {
                if attempt < 2 {
                    Err(transient())
                } else {
                    Ok("klaar")
                }
            }
        })
        .await;

    assert_eq!(assert_ok!(result), "klaar");
    assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
}

#[tokio::test(start_paused = true)]
async fn cancellation_during_backoff() {
    let executor = RetryExecutor::new(RetryPolicy {
        base_delay: Duration::from_secs(10),
        max_delay: Duration::from_secs(10),
        ..policy(3)
    });
    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
    });

    let calls = AtomicU32::new(0);
    let result: Result<(), _> = executor
        .execute(Some(&token), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(transient()) }
        })
        .await;

    assert_eq!(assert_err!(result).kind(), ErrorKind::Cancelled);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn custom_classifier_overrides_default() {
    fn never(_: &FysioError) -> bool {
        false
    }
    let executor = RetryExecutor::new(policy(3)).with_classifier(never);
    let calls = AtomicU32::new(0);

    let result: Result<(), _> = executor
        .execute(None, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(transient()) }
        })
        .await;

    assert_err!(result);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
