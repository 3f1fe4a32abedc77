//! OAuth2 token lifecycle for Letterbox.
//!
//! This crate turns a stored OAuth client file into an HTTP client whose
//! requests carry a valid access token:
//!
//! - **Authorization code flow** with PKCE, offline access, and an
//!   anti-forgery `state` that is checked on return.
//! - **Refresh** when the stored token has expired, with the new token
//!   persisted before it is used.
//! - **Reauthorization** signalled explicitly when the refresh grant has been
//!   revoked; the dead token record is deleted first.
//!
//! Token endpoint calls are retried through [`letterbox_retry`]; records are
//! sealed at rest by [`letterbox_vault`].
//!
//! # Architecture
//!
//! ```text
//! TokenManager
//! ├── OAuthFlow             (authorization URL, code exchange, refresh)
//! ├── AuthorizationPrompt   (ConsolePrompt, CallbackPrompt, or injected)
//! ├── RetryingInvoker       (token endpoint retries)
//! └── SecretStore           (sealed credentials + token records)
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use letterbox_auth::{ConsolePrompt, TokenManager};
//! use letterbox_vault::{SecretStore, VaultConfig};
//!
//! # async fn example() -> letterbox_auth::Result<()> {
//! let store = SecretStore::open(VaultConfig::new("/home/alice/.secure_newsletters", "pass"))?;
//! let manager = TokenManager::new(store, Arc::new(ConsolePrompt));
//!
//! let client = manager.get_client(&[]).await?;
//! let response = client
//!     .get("https://gmail.googleapis.com/gmail/v1/users/me/labels")
//!     .await?
//!     .send()
//!     .await?;
//! println!("{}", response.status());
//! # Ok(())
//! # }
//! ```

pub mod callback;
pub mod client;
pub mod error;
pub mod manager;
pub mod oauth;
pub mod prompt;

pub use callback::{CallbackPrompt, CallbackServer};
pub use client::AuthorizedClient;
pub use error::{AuthError, Result};
pub use manager::{AuthSettings, DEFAULT_SCOPES, TokenManager};
pub use oauth::{OAuthConfig, OAuthFlow, OAuthToken, TokenState};
pub use prompt::{AuthorizationPrompt, AuthorizationResponse, ConsolePrompt};
