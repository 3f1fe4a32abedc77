//! Status-code classification shared by HTTP call sites.
//!
//! Call sites decide retryability; this covers the common case of a JSON API
//! behind a rate limiter.

/// Whether an HTTP status is worth retrying: 429 and every 5xx.
pub fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..=599).contains(&status)
}
