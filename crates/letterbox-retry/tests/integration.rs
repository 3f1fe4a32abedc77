//! Integration tests for the letterbox-retry crate.
//!
//! A fake rate-limited endpoint is modelled as a counter of remaining
//! rejections; call sites classify its responses the way a real HTTP
//! integration would.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use letterbox_retry::{Attempt, RetryError, RetryPolicy, RetryingInvoker, http};

/// Responds 429 for the first `rejections` calls, then 200.
struct RateLimitedEndpoint {
    rejections: AtomicU32,
    calls: AtomicU32,
}

impl RateLimitedEndpoint {
    fn new(rejections: u32) -> Arc<Self> {
        Arc::new(Self {
            rejections: AtomicU32::new(rejections),
            calls: AtomicU32::new(0),
        })
    }

    async fn call(&self) -> u16 {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let rejected = self
            .rejections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |r| r.checked_sub(1))
            .is_ok();
        if rejected { 429 } else { 200 }
    }
}

fn classify(status: u16) -> Attempt<u16, String> {
    if status == 200 {
        Attempt::Success(status)
    } else {
        Attempt::failure(http::is_retryable_status(status), format!("HTTP {status}"))
    }
}

fn quick_policy() -> RetryPolicy {
    RetryPolicy::default()
        .with_backoff(Duration::from_millis(2), Duration::from_millis(8))
        .with_jitter(Duration::from_millis(3))
}

// ═══════════════════════════════════════════════════════════════════════
//  Rate limiting
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn recovers_once_rate_limit_clears() {
    let endpoint = RateLimitedEndpoint::new(2);
    let invoker = RetryingInvoker::new(quick_policy());

    let status = invoker
        .invoke(|_| {
            let endpoint = endpoint.clone();
            async move { classify(endpoint.call().await) }
        })
        .await
        .unwrap();

    assert_eq!(status, 200);
    assert_eq!(endpoint.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn persistent_rate_limit_reports_last_failure() {
    let endpoint = RateLimitedEndpoint::new(u32::MAX);
    let invoker = RetryingInvoker::new(quick_policy().with_max_attempts(5));

    let result = invoker
        .invoke(|_| {
            let endpoint = endpoint.clone();
            async move { classify(endpoint.call().await) }
        })
        .await;

    match result {
        Err(RetryError::Exhausted { attempts, last }) => {
            assert_eq!(attempts, 5);
            assert_eq!(last, "HTTP 429");
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }
    assert_eq!(endpoint.calls.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn client_error_is_not_retried() {
    let invoker = RetryingInvoker::new(quick_policy());
    let calls = AtomicU32::new(0);

    let result = invoker
        .invoke(|_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { classify(400) }
        })
        .await;

    assert!(matches!(result, Err(RetryError::Fatal(ref msg)) if msg == "HTTP 400"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

// ═══════════════════════════════════════════════════════════════════════
//  Backoff timing
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn waits_at_least_the_exponential_term() {
    let policy = RetryPolicy::default()
        .with_max_attempts(3)
        .with_backoff(Duration::from_millis(10), Duration::from_millis(100))
        .with_jitter(Duration::ZERO);
    let invoker = RetryingInvoker::new(policy);

    let started = Instant::now();
    let _ = invoker
        .invoke(|_| async { Attempt::<(), _>::Retryable("HTTP 503") })
        .await;

    // 10 ms after the first failure, 20 ms after the second, none after the last.
    assert!(started.elapsed() >= Duration::from_millis(30));
}

#[tokio::test]
async fn concurrent_callers_share_one_policy() {
    let invoker = RetryingInvoker::new(quick_policy());
    let endpoint = RateLimitedEndpoint::new(6);

    let mut handles = Vec::new();
    for _ in 0..4 {
        let invoker = invoker.clone();
        let endpoint = endpoint.clone();
        handles.push(tokio::spawn(async move {
            invoker
                .invoke(|_| {
                    let endpoint = endpoint.clone();
                    async move { classify(endpoint.call().await) }
                })
                .await
        }));
    }

    let mut successes = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            successes += 1;
        }
    }

    // 6 rejections spread over 4 callers with 5 attempts each always clears.
    assert_eq!(successes, 4);
}
