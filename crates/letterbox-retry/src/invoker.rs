//! The retry loop.
//!
//! [`RetryingInvoker::invoke`] runs one remote call per attempt. The call
//! site classifies every outcome into an [`Attempt`]; the invoker never
//! guesses which failures are transient.

use std::fmt;
use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::error::RetryError;
use crate::policy::RetryPolicy;

/// Outcome of one attempt, as classified by the call site.
#[derive(Debug)]
pub enum Attempt<T, E> {
    /// The call produced a usable value.
    Success(T),
    /// Rate limiting, a 5xx response, or a transient transport failure.
    Retryable(E),
    /// Authentication failure, a malformed request, or a response with no
    /// usable content.
    Fatal(E),
}

impl<T, E> Attempt<T, E> {
    /// Wrap a failure, choosing the variant from `retryable`.
    pub fn failure(retryable: bool, error: E) -> Self {
        if retryable {
            Self::Retryable(error)
        } else {
            Self::Fatal(error)
        }
    }
}

/// Runs classified remote calls under a [`RetryPolicy`].
///
/// Cloning is cheap; clones share the cancellation token.
#[derive(Debug, Clone, Default)]
pub struct RetryingInvoker {
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl RetryingInvoker {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            cancel: CancellationToken::new(),
        }
    }

    /// Abort in-flight attempts and backoff sleeps when `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Call `attempt_fn` until it succeeds, fails fatally, or the attempt
    /// budget runs out.
    ///
    /// `attempt_fn` receives the 1-based attempt number.
    ///
    /// # Errors
    ///
    /// - [`RetryError::Fatal`] on the first fatal failure.
    /// - [`RetryError::Exhausted`] carrying the last failure once
    ///   `max_attempts` retryable failures have been seen.
    /// - [`RetryError::Cancelled`] if the cancellation token fires.
    /// - [`RetryError::TimedOut`] if the policy timeout elapses.
    pub async fn invoke<T, E, F, Fut>(&self, attempt_fn: F) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Attempt<T, E>>,
        E: fmt::Display,
    {
        match self.policy.timeout {
            Some(limit) => tokio::time::timeout(limit, self.run(attempt_fn))
                .await
                .unwrap_or_else(|_| {
                    tracing::warn!(limit_ms = limit.as_millis() as u64, "retry budget timed out");
                    Err(RetryError::TimedOut { limit })
                }),
            None => self.run(attempt_fn).await,
        }
    }

    async fn run<T, E, F, Fut>(&self, mut attempt_fn: F) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Attempt<T, E>>,
        E: fmt::Display,
    {
        let max_attempts = self.policy.attempts();
        let mut attempt = 1;

        loop {
            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(RetryError::Cancelled),
                outcome = attempt_fn(attempt) => outcome,
            };

            let failure = match outcome {
                Attempt::Success(value) => {
                    if attempt > 1 {
                        tracing::debug!(attempt, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Attempt::Fatal(e) => {
                    tracing::debug!(attempt, error = %e, "fatal failure, not retrying");
                    return Err(RetryError::Fatal(e));
                }
                Attempt::Retryable(e) => e,
            };

            if attempt >= max_attempts {
                tracing::warn!(
                    attempts = attempt,
                    error = %failure,
                    "retries exhausted"
                );
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: failure,
                });
            }

            let delay = self.policy.delay_for(attempt);
            tracing::warn!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %failure,
                "retryable failure, backing off"
            );

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(RetryError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }

            attempt += 1;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
