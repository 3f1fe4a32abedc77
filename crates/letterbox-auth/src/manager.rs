//! The token lifecycle.
//!
//! [`TokenManager`] drives the state machine
//!
//! ```text
//! Absent ──interactive authorize──▶ Valid ──expiry passes──▶ Expired
//!                                     ▲                         │
//!                                     └──────── refresh ────────┘
//! Expired ──refresh rejected permanently──▶ Absent (record deleted)
//! ```
//!
//! Every transition that produces a token persists it through the
//! [`SecretStore`] before the token is handed out. Transitions are
//! serialized by one async mutex, so concurrent callers never race a
//! refresh against each other.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use letterbox_retry::{RetryPolicy, RetryingInvoker};
use letterbox_vault::{SecretStore, TOKEN_RECORD, VaultError};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::client::AuthorizedClient;
use crate::error::{AuthError, Result};
use crate::oauth::{
    OAuthConfig, OAuthFlow, OAuthToken, TokenState, generate_pkce_verifier, generate_state,
    pkce_challenge,
};
use crate::prompt::AuthorizationPrompt;

/// Scopes requested when the caller names none: read, label, and send mail.
pub const DEFAULT_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/gmail.readonly",
    "https://www.googleapis.com/auth/gmail.modify",
    "https://www.googleapis.com/auth/gmail.send",
];

/// Per-request bound on token endpoint calls.
pub const DEFAULT_EXCHANGE_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Tunables for the token lifecycle.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    /// Retry policy for token endpoint calls.
    pub retry: RetryPolicy,
    /// Bound on each individual token endpoint request.
    pub exchange_timeout: Duration,
    /// Reject authorization responses that come back without `state`.
    ///
    /// A response whose `state` differs from the one sent is always
    /// rejected; this only decides whether a bare pasted code is accepted.
    pub require_state: bool,
    /// Overrides the redirect URI from the client file (loopback callback).
    pub redirect_uri: Option<String>,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            exchange_timeout: DEFAULT_EXCHANGE_TIMEOUT,
            require_state: true,
            redirect_uri: None,
        }
    }
}

// ---------------------------------------------------------------------------
// TokenManager
// ---------------------------------------------------------------------------

/// Owns the token lifecycle for one secret store.
///
/// Cloning is cheap; clones share the store, the cached token, and the
/// transition lock.
#[derive(Clone)]
pub struct TokenManager {
    store: Arc<SecretStore>,
    prompt: Arc<dyn AuthorizationPrompt>,
    settings: Arc<AuthSettings>,
    cancel: CancellationToken,
    http: reqwest::Client,
    token: Arc<Mutex<Option<OAuthToken>>>,
}

impl fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenManager")
            .field("store", &self.store)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl TokenManager {
    /// Create a manager over `store` that asks `prompt` for authorization
    /// codes.
    pub fn new(store: SecretStore, prompt: Arc<dyn AuthorizationPrompt>) -> Self {
        Self {
            store: Arc::new(store),
            prompt,
            settings: Arc::new(AuthSettings::default()),
            cancel: CancellationToken::new(),
            http: reqwest::Client::new(),
            token: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_settings(mut self, settings: AuthSettings) -> Self {
        self.settings = Arc::new(settings);
        self
    }

    /// Abort the interactive prompt and token endpoint retries when
    /// `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn store(&self) -> &SecretStore {
        &self.store
    }

    pub fn settings(&self) -> &AuthSettings {
        &self.settings
    }

    pub(crate) fn http_client(&self) -> &reqwest::Client {
        &self.http
    }

    // -- Credentials --

    /// Validate and persist the OAuth client file contents.
    pub fn store_credentials(&self, raw: &[u8]) -> Result<()> {
        OAuthConfig::from_credentials_json(raw, Vec::new())?;
        self.store.store_credentials(raw)?;
        tracing::info!("OAuth client credentials stored");
        Ok(())
    }

    /// Read an OAuth client file from disk and persist it.
    pub fn setup_from_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let raw = std::fs::read(path.as_ref())?;
        self.store_credentials(&raw)
    }

    /// Build the client configuration for `scopes` from the stored
    /// credentials. An empty `scopes` selects [`DEFAULT_SCOPES`].
    pub fn oauth_config(&self, scopes: &[&str]) -> Result<OAuthConfig> {
        let raw = self.store.load_credentials()?;
        let scopes = if scopes.is_empty() {
            DEFAULT_SCOPES
        } else {
            scopes
        };
        let mut config = OAuthConfig::from_credentials_json(
            &raw,
            scopes.iter().map(|s| s.to_string()).collect(),
        )?;
        if let Some(redirect_uri) = &self.settings.redirect_uri {
            config.redirect_uri = redirect_uri.clone();
        }
        Ok(config)
    }

    // -- Token record --

    /// The persisted token, if any.
    pub fn stored_token(&self) -> Result<Option<OAuthToken>> {
        match self.store.get(TOKEN_RECORD) {
            Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            Err(VaultError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save_token(&self, token: &OAuthToken) -> Result<()> {
        let raw = serde_json::to_vec(token)?;
        self.store.put(TOKEN_RECORD, &raw)?;
        Ok(())
    }

    /// Current lifecycle state against the wall clock.
    pub async fn state(&self) -> Result<TokenState> {
        let cached = self.token.lock().await;
        let current = match cached.as_ref() {
            Some(token) => Some(token.clone()),
            None => self.stored_token()?,
        };
        Ok(TokenState::of(current.as_ref(), Utc::now()))
    }

    // -- Lifecycle --

    /// An HTTP client whose requests carry a valid access token for
    /// `scopes` (empty selects [`DEFAULT_SCOPES`]).
    ///
    /// Runs the interactive flow when no token exists and refreshes an
    /// expired one.
    ///
    /// # Errors
    ///
    /// [`AuthError::ReauthorizationRequired`] when the stored grant was
    /// revoked; the token record has been deleted by then.
    pub async fn get_client(&self, scopes: &[&str]) -> Result<AuthorizedClient> {
        let config = self.oauth_config(scopes)?;
        self.valid_token(&config).await?;
        Ok(AuthorizedClient::new(self.clone(), config))
    }

    /// A token that is valid right now, driving whatever transition is
    /// needed to get one.
    pub async fn valid_token(&self, config: &OAuthConfig) -> Result<OAuthToken> {
        let mut cached = self.token.lock().await;
        let current = match cached.take() {
            Some(token) => Some(token),
            None => self.stored_token()?,
        };

        let flow = self.flow(config.clone());
        let token = match (TokenState::of(current.as_ref(), Utc::now()), current) {
            (TokenState::Valid, Some(token)) => token,
            (TokenState::Expired, Some(expired)) => self.refresh(&flow, &expired).await?,
            _ => {
                tracing::info!("no stored token, starting interactive authorization");
                self.run_authorization(&flow).await?
            }
        };

        *cached = Some(token.clone());
        Ok(token)
    }

    /// Run the interactive flow unconditionally and replace any stored
    /// token.
    pub async fn authorize(&self, scopes: &[&str]) -> Result<OAuthToken> {
        let config = self.oauth_config(scopes)?;
        let mut cached = self.token.lock().await;
        cached.take();

        let token = self.run_authorization(&self.flow(config)).await?;
        *cached = Some(token.clone());
        Ok(token)
    }

    /// Delete both records and forget the cached token.
    pub async fn cleanup(&self) -> Result<()> {
        let mut cached = self.token.lock().await;
        cached.take();
        self.store.cleanup()?;
        tracing::info!(dir = %self.store.base_dir().display(), "stored secrets removed");
        Ok(())
    }

    fn flow(&self, config: OAuthConfig) -> OAuthFlow {
        let invoker =
            RetryingInvoker::new(self.settings.retry.clone()).with_cancellation(self.cancel.clone());
        OAuthFlow::new(
            config,
            self.http.clone(),
            invoker,
            self.settings.exchange_timeout,
        )
    }

    /// Absent → Valid.
    async fn run_authorization(&self, flow: &OAuthFlow) -> Result<OAuthToken> {
        let code_verifier = generate_pkce_verifier()?;
        let code_challenge = pkce_challenge(&code_verifier);
        let state = generate_state()?;
        let auth_url = flow.authorization_url(&state, &code_challenge)?;

        let response = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(AuthError::Cancelled),
            response = self.prompt.request_code(&auth_url) => response?,
        };

        match response.state.as_deref() {
            Some(returned) if returned != state => return Err(AuthError::StateMismatch),
            None if self.settings.require_state => return Err(AuthError::MissingState),
            _ => {}
        }

        let token = flow.exchange_code(&response.code, &code_verifier).await?;
        self.save_token(&token)?;

        tracing::info!(
            has_refresh_token = token.refresh_token.is_some(),
            "authorization complete, token stored"
        );
        Ok(token)
    }

    /// Expired → Valid, or Expired → Absent when the grant is gone.
    async fn refresh(&self, flow: &OAuthFlow, expired: &OAuthToken) -> Result<OAuthToken> {
        let Some(refresh_token) = expired.usable_refresh_token() else {
            self.forget_token("expired token has no refresh token");
            return Err(AuthError::ReauthorizationRequired {
                reason: "the stored token expired and carries no refresh token".to_string(),
            });
        };

        match flow.refresh_token(refresh_token).await {
            Ok(token) => {
                self.save_token(&token)?;
                tracing::info!("access token refreshed");
                Ok(token)
            }
            Err(e) if e.requires_reauthorization() => {
                tracing::warn!(error = %e, "refresh grant rejected");
                self.forget_token("refresh grant rejected");
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Delete the token record on the way to `ReauthorizationRequired`.
    ///
    /// A failed delete is logged only; the caller still has to reauthorize,
    /// and that overwrites the record.
    fn forget_token(&self, cause: &str) {
        match self.store.delete(TOKEN_RECORD) {
            Ok(()) => tracing::warn!(cause, "token record deleted"),
            Err(e) => tracing::warn!(cause, error = %e, "failed to delete token record"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
