//! Passphrase-sealed secret records for Letterbox.
//!
//! This crate keeps the long-lived OAuth client configuration and the current
//! token pair encrypted at rest. Every record is sealed with AES-256-GCM under
//! a key stretched from the user's passphrase with PBKDF2, using a fresh salt
//! per write.
//!
//! # Modules
//!
//! - [`crypto`]: key derivation and the `seal`/`open` envelope format.
//! - [`store`]: file-backed named records with atomic replacement.
//! - [`config`]: explicit store configuration and the redacted passphrase.
//! - [`error`]: unified error types.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use letterbox_vault::{SecretStore, VaultConfig};
//!
//! # fn example() -> letterbox_vault::Result<()> {
//! let config = VaultConfig::new("/home/alice/.secure_newsletters", "correct-horse");
//! let store = SecretStore::open(config)?;
//!
//! store.put("token", br#"{"access_token":"ya29..."}"#)?;
//! let token = store.get("token")?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod crypto;
pub mod error;
pub mod store;

pub use config::{Passphrase, VaultConfig};
pub use error::{Result, VaultError};
pub use store::{CREDENTIALS_RECORD, SecretStore, TOKEN_RECORD};
