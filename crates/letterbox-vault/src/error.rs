//! Vault error types.
//!
//! Every public API in this crate returns [`VaultError`]. The variants keep
//! structural damage ([`VaultError::MalformedEnvelope`]) apart from failed
//! authentication ([`VaultError::Integrity`]) so callers can tell a truncated
//! file from a wrong passphrase or tampering. The last two cannot be told
//! apart from each other.

/// Unified error type for the Letterbox secret vault.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    // -- Envelope errors ----------------------------------------------------
    /// The envelope is shorter than `salt ‖ nonce ‖ tag`.
    #[error("malformed envelope: {len} bytes, need at least {min}")]
    MalformedEnvelope { len: usize, min: usize },

    /// The authentication tag did not verify: wrong passphrase or tampered
    /// data.
    #[error("integrity check failed: wrong passphrase or corrupted record")]
    Integrity,

    /// Sealing failed inside the AEAD or the system RNG.
    #[error("encryption failed: {reason}")]
    EncryptionFailed { reason: String },

    // -- Store errors -------------------------------------------------------
    /// The requested record does not exist.
    #[error("secret record not found: {name}")]
    NotFound { name: String },

    /// The plaintext was rejected before sealing.
    #[error("validation failed: {reason}")]
    Validation { reason: String },

    /// Record names are limited to ASCII letters, digits, `-` and `_`.
    #[error("invalid record name: {name:?}")]
    InvalidRecordName { name: String },

    /// The store was configured without a passphrase.
    #[error("a non-empty passphrase is required")]
    MissingPassphrase,

    /// One or more records could not be removed during cleanup.
    #[error("cleanup failed: {}", .failures.join("; "))]
    Cleanup { failures: Vec<String> },

    // -- Underlying errors --------------------------------------------------
    /// I/O error from the filesystem.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error while validating structured plaintext.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience alias used throughout the vault crate.
pub type Result<T> = std::result::Result<T, VaultError>;
