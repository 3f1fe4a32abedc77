//! Error type returned by [`RetryingInvoker::invoke`].
//!
//! [`RetryingInvoker::invoke`]: crate::RetryingInvoker::invoke

use std::time::Duration;

/// Why an invocation did not produce a value.
///
/// `E` is the call site's own failure type; it is carried through untouched
/// so the caller can still inspect the last underlying failure.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// The call site classified a failure as not worth retrying.
    #[error("non-retryable failure: {0}")]
    Fatal(E),

    /// Every attempt failed with a retryable failure.
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        /// Number of attempts performed.
        attempts: u32,
        /// The failure observed on the final attempt.
        last: E,
    },

    /// The invoker's cancellation token fired.
    #[error("operation cancelled")]
    Cancelled,

    /// The policy's overall timeout elapsed.
    #[error("operation timed out after {limit:?}")]
    TimedOut {
        /// The configured limit.
        limit: Duration,
    },
}

impl<E> RetryError<E> {
    /// The underlying failure, if one was observed.
    pub fn into_failure(self) -> Option<E> {
        match self {
            Self::Fatal(e) | Self::Exhausted { last: e, .. } => Some(e),
            Self::Cancelled | Self::TimedOut { .. } => None,
        }
    }

    /// Convert the carried failure type.
    pub fn map_failure<F>(self, f: impl FnOnce(E) -> F) -> RetryError<F> {
        match self {
            Self::Fatal(e) => RetryError::Fatal(f(e)),
            Self::Exhausted { attempts, last } => RetryError::Exhausted {
                attempts,
                last: f(last),
            },
            Self::Cancelled => RetryError::Cancelled,
            Self::TimedOut { limit } => RetryError::TimedOut { limit },
        }
    }
}
