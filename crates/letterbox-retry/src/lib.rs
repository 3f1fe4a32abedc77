//! Classification-aware retry for Letterbox's outbound calls.
//!
//! Every remote integration (the OAuth token endpoint, chat completion calls)
//! runs through one [`RetryingInvoker`]. The call site turns each raw outcome
//! into an [`Attempt`]; the invoker applies the [`RetryPolicy`]:
//! exponential backoff capped at `backoff_max`, plus bounded uniform jitter.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use letterbox_retry::{Attempt, RetryPolicy, RetryingInvoker, http};
//!
//! # async fn send_request() -> Result<(u16, String), std::io::Error> { unimplemented!() }
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let invoker = RetryingInvoker::new(RetryPolicy::default());
//!
//! let body = invoker
//!     .invoke(|_attempt| async {
//!         match send_request().await {
//!             Ok((200, body)) => Attempt::Success(body),
//!             Ok((status, _)) => {
//!                 Attempt::failure(http::is_retryable_status(status), format!("HTTP {status}"))
//!             }
//!             // Transport failures are transient for this API.
//!             Err(e) => Attempt::Retryable(e.to_string()),
//!         }
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod http;
pub mod invoker;
pub mod policy;

pub use error::RetryError;
pub use invoker::{Attempt, RetryingInvoker};
pub use policy::RetryPolicy;
