//! Error types for the auth crate.
//!
//! All token lifecycle operations surface errors through [`AuthError`].
//! [`AuthError::ReauthorizationRequired`] is the one callers should treat
//! specially: the stored grant is gone for good and only the interactive
//! flow can replace it.

use std::time::Duration;

/// Unified error type for the Letterbox token lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The refresh grant was rejected permanently, or there is nothing left
    /// to refresh with.
    #[error(
        "stored authorization is no longer valid ({reason}); \
         run `letterbox authorize` to repeat the interactive setup"
    )]
    ReauthorizationRequired {
        /// What the authorization server (or the stored token) reported.
        reason: String,
    },

    /// The caller's cancellation token fired.
    #[error("authorization cancelled")]
    Cancelled,

    /// The token endpoint kept failing with retryable errors.
    #[error("token endpoint failed after {attempts} attempts: {last}")]
    ExhaustedRetries {
        /// How many attempts were made.
        attempts: u32,
        /// The last failure observed.
        last: String,
    },

    /// The retry budget's overall timeout elapsed.
    #[error("token endpoint did not answer within {limit:?}")]
    TimedOut {
        /// The configured limit.
        limit: Duration,
    },

    /// The authorization code exchange was rejected.
    #[error("invalid grant: {reason}")]
    InvalidGrant {
        /// Explanation from the authorization server.
        reason: String,
    },

    /// The anti-forgery `state` returned with the code does not match the
    /// one sent in the authorization URL.
    #[error("authorization response state does not match the request")]
    StateMismatch,

    /// The authorization response carried no `state` while one is required.
    #[error("authorization response carried no state; paste the full redirect URL")]
    MissingState,

    /// The stored OAuth client file is missing required fields.
    #[error("invalid OAuth client credentials: {reason}")]
    InvalidCredentials {
        /// What is wrong with the credentials.
        reason: String,
    },

    /// The interactive flow failed for a non-specific reason.
    #[error("authorization flow failed: {reason}")]
    FlowFailed {
        /// Details about why the flow failed.
        reason: String,
    },

    /// The local callback server timed out waiting for the redirect.
    #[error("callback timed out after {timeout_secs} seconds")]
    CallbackTimeout {
        /// How many seconds we waited before giving up.
        timeout_secs: u64,
    },

    /// An HTTP transport failure that was not retried.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// An error propagated from the secret store.
    #[error("vault error: {0}")]
    Vault(#[from] letterbox_vault::VaultError),

    /// JSON serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error (prompt input, callback listener).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// URL parsing error.
    #[error("url parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

impl AuthError {
    /// Whether the caller must rerun the interactive authorization flow.
    pub fn requires_reauthorization(&self) -> bool {
        matches!(self, Self::ReauthorizationRequired { .. })
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, AuthError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reauthorization_message_names_the_setup_command() {
        let err = AuthError::ReauthorizationRequired {
            reason: "Token has been expired or revoked.".into(),
        };
        let message = err.to_string();
        assert!(message.contains("Token has been expired or revoked."));
        assert!(message.contains("letterbox authorize"));
        assert!(err.requires_reauthorization());
    }

    #[test]
    fn error_display_exhausted_retries() {
        let err = AuthError::ExhaustedRetries {
            attempts: 5,
            last: "token endpoint returned HTTP 503: unavailable".into(),
        };
        assert_eq!(
            err.to_string(),
            "token endpoint failed after 5 attempts: token endpoint returned HTTP 503: unavailable"
        );
        assert!(!err.requires_reauthorization());
    }

    #[test]
    fn error_display_callback_timeout() {
        let err = AuthError::CallbackTimeout { timeout_secs: 120 };
        assert_eq!(err.to_string(), "callback timed out after 120 seconds");
    }

    #[test]
    fn vault_errors_convert() {
        let err: AuthError = letterbox_vault::VaultError::Integrity.into();
        assert!(matches!(
            err,
            AuthError::Vault(letterbox_vault::VaultError::Integrity)
        ));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AuthError>();
    }
}
