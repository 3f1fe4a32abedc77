//! OAuth 2.0 authorization code flow with PKCE, against a Google-style
//! installed-application client.
//!
//! # Flow Overview
//!
//! 1. Parse the stored client file into an [`OAuthConfig`].
//! 2. Generate a PKCE verifier and an anti-forgery `state`.
//! 3. Build the authorization URL (offline access, forced consent).
//! 4. Exchange the returned code for an [`OAuthToken`].
//! 5. Refresh the token once its expiry has passed.
//!
//! Every token endpoint call goes through a [`RetryingInvoker`]; this module
//! decides which failures are worth another attempt.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Datelike, Utc};
use letterbox_retry::{Attempt, RetryError, RetryingInvoker, http};
use ring::digest;
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Deserializer, Serialize};
use url::Url;

use crate::error::{AuthError, Result};

/// Length of the PKCE code verifier and the `state` value in bytes (before
/// base64 encoding).
const RANDOM_TOKEN_BYTES: usize = 32;

/// OAuth error codes that mean the refresh grant is gone for good.
const PERMANENT_GRANT_ERRORS: &[&str] = &["invalid_grant", "unauthorized_client"];

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Client registration and endpoints for one authorization server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthConfig {
    /// The OAuth client ID.
    pub client_id: String,

    /// The OAuth client secret (installed apps still carry one).
    pub client_secret: Option<String>,

    /// The authorization endpoint URL.
    pub auth_url: String,

    /// The token endpoint URL.
    pub token_url: String,

    /// The redirect URI registered with the authorization server.
    pub redirect_uri: String,

    /// The scopes to request.
    pub scopes: Vec<String>,
}

/// One client section of a downloaded client file.
#[derive(Debug, Deserialize)]
struct ClientSection {
    client_id: String,
    #[serde(default)]
    client_secret: Option<String>,
    #[serde(alias = "auth_url")]
    auth_uri: String,
    #[serde(alias = "token_url")]
    token_uri: String,
    #[serde(default)]
    redirect_uris: Vec<String>,
    #[serde(default)]
    redirect_uri: Option<String>,
}

impl OAuthConfig {
    /// Parse a stored client file.
    ///
    /// Accepts the `{"installed": {...}}` and `{"web": {...}}` shapes that
    /// Google's console produces, as well as a flat object with the same
    /// fields. The first registered redirect URI is used.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidCredentials`] when required fields are
    /// missing or the document is not JSON.
    pub fn from_credentials_json(raw: &[u8], scopes: Vec<String>) -> Result<Self> {
        let document: serde_json::Value =
            serde_json::from_slice(raw).map_err(|e| AuthError::InvalidCredentials {
                reason: format!("client file is not JSON: {e}"),
            })?;

        let section = document
            .get("installed")
            .or_else(|| document.get("web"))
            .unwrap_or(&document);

        let client = ClientSection::deserialize(section).map_err(|e| {
            AuthError::InvalidCredentials {
                reason: e.to_string(),
            }
        })?;

        if client.client_id.trim().is_empty() {
            return Err(AuthError::InvalidCredentials {
                reason: "client_id is empty".to_string(),
            });
        }

        let redirect_uri = client
            .redirect_uri
            .or_else(|| client.redirect_uris.into_iter().next())
            .ok_or_else(|| AuthError::InvalidCredentials {
                reason: "no redirect URI registered".to_string(),
            })?;

        Ok(Self {
            client_id: client.client_id,
            client_secret: client.client_secret.filter(|s| !s.is_empty()),
            auth_url: client.auth_uri,
            token_url: client.token_uri,
            redirect_uri,
            scopes,
        })
    }
}

// ---------------------------------------------------------------------------
// Token types
// ---------------------------------------------------------------------------

/// The persisted token record.
///
/// Serializes with the same field names other OAuth2 client libraries use
/// (`access_token`, `token_type`, `refresh_token`, `expiry`) so an existing
/// record keeps loading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthToken {
    /// The access token attached to API requests.
    pub access_token: String,

    /// The token type (typically "Bearer").
    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// The refresh token used to obtain new access tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// When the access token stops being accepted. `None` never expires.
    #[serde(
        default,
        deserialize_with = "deserialize_expiry",
        skip_serializing_if = "Option::is_none"
    )]
    pub expiry: Option<DateTime<Utc>>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Treat the zero timestamp (`0001-01-01T00:00:00Z`) as "no expiry".
fn deserialize_expiry<'de, D>(deserializer: D) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let expiry = Option::<DateTime<Utc>>::deserialize(deserializer)?;
    Ok(expiry.filter(|t| t.year() > 1))
}

impl OAuthToken {
    /// Whether the access token is past its expiry at `now`.
    ///
    /// A token whose expiry equals `now` is already expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry.is_some_and(|expiry| expiry <= now)
    }

    /// The refresh token, if one is present and non-empty.
    pub fn usable_refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref().filter(|t| !t.is_empty())
    }
}

/// Where the token lifecycle stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    /// No token record exists.
    Absent,
    /// A token exists and its expiry has not passed.
    Valid,
    /// A token exists but its expiry has passed.
    Expired,
}

impl TokenState {
    /// Classify `token` against the clock reading `now`.
    pub fn of(token: Option<&OAuthToken>, now: DateTime<Utc>) -> Self {
        match token {
            None => Self::Absent,
            Some(token) if token.is_expired_at(now) => Self::Expired,
            Some(_) => Self::Valid,
        }
    }
}

impl std::fmt::Display for TokenState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Absent => "absent",
            Self::Valid => "valid",
            Self::Expired => "expired",
        };
        f.write_str(label)
    }
}

/// Raw token response from the authorization server.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    token_type: Option<String>,
}

impl TokenResponse {
    /// Convert into an [`OAuthToken`], computing `expiry` from `expires_in`.
    ///
    /// Returns `None` when `expires_in` does not fit in a timestamp.
    fn into_token(self, now: DateTime<Utc>) -> Option<OAuthToken> {
        let expiry = match self.expires_in.filter(|secs| *secs > 0) {
            Some(secs) => Some(
                chrono::Duration::try_seconds(secs).and_then(|d| now.checked_add_signed(d))?,
            ),
            None => None,
        };
        Some(OAuthToken {
            access_token: self.access_token,
            token_type: self.token_type.unwrap_or_else(default_token_type),
            refresh_token: self.refresh_token.filter(|t| !t.is_empty()),
            expiry,
        })
    }
}

/// Raw error response from the authorization server.
#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    error_description: Option<String>,
}

/// Why one token endpoint attempt failed.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeFailure {
    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),

    /// The endpoint answered with a non-success status.
    #[error("token endpoint returned HTTP {status}: {error}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// OAuth `error` code, or the raw body when it was not JSON.
        error: String,
        /// OAuth `error_description`, when present.
        description: Option<String>,
    },

    /// A success status with a body we could not use.
    #[error("malformed token response: {0}")]
    Malformed(String),
}

impl ExchangeFailure {
    /// Whether this rejection means the refresh grant is gone for good.
    fn is_permanent_grant_failure(&self) -> bool {
        match self {
            Self::Rejected { status, error, .. } => {
                *status == 401 || PERMANENT_GRANT_ERRORS.contains(&error.as_str())
            }
            Self::Transport(_) | Self::Malformed(_) => false,
        }
    }

    fn reason(&self) -> String {
        match self {
            Self::Rejected {
                error,
                description: Some(description),
                ..
            } => format!("{error}: {description}"),
            other => other.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Random values and PKCE
// ---------------------------------------------------------------------------

/// Generate 32 random bytes, base64url encoded.
fn random_token(purpose: &str) -> Result<String> {
    let rng = SystemRandom::new();
    let mut bytes = [0u8; RANDOM_TOKEN_BYTES];
    rng.fill(&mut bytes).map_err(|_| AuthError::FlowFailed {
        reason: format!("failed to generate {purpose}: CSPRNG error"),
    })?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Generate a PKCE code verifier.
///
/// # Errors
///
/// Returns an error if the system CSPRNG fails.
pub fn generate_pkce_verifier() -> Result<String> {
    random_token("PKCE verifier")
}

/// Generate an unguessable anti-forgery `state` value.
///
/// # Errors
///
/// Returns an error if the system CSPRNG fails.
pub fn generate_state() -> Result<String> {
    random_token("state")
}

/// Derive the PKCE code challenge from a code verifier using SHA-256.
///
/// `challenge = BASE64URL(SHA256(verifier))`
pub fn pkce_challenge(verifier: &str) -> String {
    let hash = digest::digest(&digest::SHA256, verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash.as_ref())
}

// ---------------------------------------------------------------------------
// OAuth flow
// ---------------------------------------------------------------------------

/// Talks to one authorization server on behalf of one client.
///
/// Holds no token state; the [`TokenManager`](crate::TokenManager) owns
/// that.
#[derive(Debug, Clone)]
pub struct OAuthFlow {
    config: OAuthConfig,
    client: reqwest::Client,
    invoker: RetryingInvoker,
    request_timeout: Duration,
}

impl OAuthFlow {
    /// Create a flow that retries token calls with `invoker` and bounds each
    /// individual request by `request_timeout`.
    pub fn new(
        config: OAuthConfig,
        client: reqwest::Client,
        invoker: RetryingInvoker,
        request_timeout: Duration,
    ) -> Self {
        Self {
            config,
            client,
            invoker,
            request_timeout,
        }
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// Build the authorization URL the user should visit.
    ///
    /// Requests offline access with forced consent so the server always
    /// issues a refresh token, and carries the PKCE challenge (S256) and the
    /// caller's `state`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::UrlParse`] if the configured `auth_url` is not a
    /// valid URL.
    pub fn authorization_url(&self, state: &str, code_challenge: &str) -> Result<String> {
        let mut url = Url::parse(&self.config.auth_url)?;

        {
            let mut params = url.query_pairs_mut();
            params.append_pair("response_type", "code");
            params.append_pair("client_id", &self.config.client_id);
            params.append_pair("redirect_uri", &self.config.redirect_uri);
            params.append_pair("state", state);
            params.append_pair("code_challenge", code_challenge);
            params.append_pair("code_challenge_method", "S256");
            params.append_pair("access_type", "offline");
            params.append_pair("prompt", "consent");

            if !self.config.scopes.is_empty() {
                params.append_pair("scope", &self.config.scopes.join(" "));
            }
        }

        Ok(url.to_string())
    }

    /// Exchange an authorization code for a token.
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidGrant`] if the server rejects the code.
    /// - [`AuthError::ExhaustedRetries`] if the endpoint kept failing with
    ///   retryable errors.
    /// - [`AuthError::Cancelled`] or [`AuthError::TimedOut`] from the
    ///   invoker.
    pub async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<OAuthToken> {
        let mut params = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("code_verifier", code_verifier),
        ];
        if let Some(secret) = self.config.client_secret.as_deref() {
            params.push(("client_secret", secret));
        }

        tracing::debug!(token_url = %self.config.token_url, "exchanging authorization code");

        self.post_token_form(&params)
            .await
            .map_err(|e| Self::map_failure(e, false))
    }

    /// Obtain a new access token with `refresh_token`.
    ///
    /// When the server omits a new refresh token the old one is carried
    /// over.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::ReauthorizationRequired`] if the server rejects
    /// the grant permanently (`invalid_grant`, `unauthorized_client`, or
    /// HTTP 401); other failures map as for [`Self::exchange_code`].
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<OAuthToken> {
        let mut params = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
        ];
        if let Some(secret) = self.config.client_secret.as_deref() {
            params.push(("client_secret", secret));
        }

        tracing::debug!(token_url = %self.config.token_url, "refreshing access token");

        let mut token = self
            .post_token_form(&params)
            .await
            .map_err(|e| Self::map_failure(e, true))?;

        if token.refresh_token.is_none() {
            token.refresh_token = Some(refresh_token.to_string());
        }
        Ok(token)
    }

    async fn post_token_form(
        &self,
        params: &[(&str, &str)],
    ) -> std::result::Result<OAuthToken, RetryError<ExchangeFailure>> {
        self.invoker
            .invoke(|attempt| self.token_attempt(params, attempt))
            .await
    }

    /// One POST to the token endpoint, classified for the retry loop.
    async fn token_attempt(
        &self,
        params: &[(&str, &str)],
        attempt: u32,
    ) -> Attempt<OAuthToken, ExchangeFailure> {
        tracing::trace!(attempt, "token endpoint request");

        let response = match self
            .client
            .post(&self.config.token_url)
            .timeout(self.request_timeout)
            .form(params)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                // Builder errors are the only ones a resend cannot fix.
                let retryable = !e.is_builder();
                return Attempt::failure(retryable, ExchangeFailure::Transport(e));
            }
        };

        let status = response.status();
        if status.is_success() {
            return match response.json::<TokenResponse>().await {
                Ok(body) if body.access_token.is_empty() => Attempt::Fatal(
                    ExchangeFailure::Malformed("response carried an empty access_token".into()),
                ),
                Ok(body) => match body.into_token(Utc::now()) {
                    Some(token) => Attempt::Success(token),
                    None => Attempt::Fatal(ExchangeFailure::Malformed(
                        "response carried an out-of-range expires_in".into(),
                    )),
                },
                Err(e) if e.is_timeout() => Attempt::Retryable(ExchangeFailure::Transport(e)),
                Err(e) => Attempt::Fatal(ExchangeFailure::Malformed(e.to_string())),
            };
        }

        let body = response.text().await.unwrap_or_default();
        let failure = match serde_json::from_str::<TokenErrorResponse>(&body) {
            Ok(parsed) => ExchangeFailure::Rejected {
                status: status.as_u16(),
                error: parsed.error,
                description: parsed.error_description,
            },
            Err(_) => ExchangeFailure::Rejected {
                status: status.as_u16(),
                error: body,
                description: None,
            },
        };

        Attempt::failure(http::is_retryable_status(status.as_u16()), failure)
    }

    /// Translate a retry outcome into the crate's error type.
    fn map_failure(err: RetryError<ExchangeFailure>, refreshing: bool) -> AuthError {
        match err {
            RetryError::Fatal(failure) if refreshing && failure.is_permanent_grant_failure() => {
                AuthError::ReauthorizationRequired {
                    reason: failure.reason(),
                }
            }
            RetryError::Fatal(ExchangeFailure::Transport(e)) => AuthError::Network(e),
            RetryError::Fatal(failure @ ExchangeFailure::Rejected { .. }) => {
                AuthError::InvalidGrant {
                    reason: failure.reason(),
                }
            }
            RetryError::Fatal(failure @ ExchangeFailure::Malformed(_)) => AuthError::FlowFailed {
                reason: failure.to_string(),
            },
            RetryError::Exhausted { attempts, last } => AuthError::ExhaustedRetries {
                attempts,
                last: last.to_string(),
            },
            RetryError::Cancelled => AuthError::Cancelled,
            RetryError::TimedOut { limit } => AuthError::TimedOut { limit },
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::TimeZone;

    use super::*;

    fn test_config() -> OAuthConfig {
        OAuthConfig {
            client_id: "test-client-id".to_string(),
            client_secret: Some("test-secret".to_string()),
            auth_url: "https://accounts.example.com/o/oauth2/auth".to_string(),
            token_url: "https://oauth2.example.com/token".to_string(),
            redirect_uri: "urn:ietf:wg:oauth:2.0:oob".to_string(),
            scopes: vec![
                "https://www.googleapis.com/auth/gmail.readonly".to_string(),
                "https://www.googleapis.com/auth/gmail.send".to_string(),
            ],
        }
    }

    fn test_flow(config: OAuthConfig) -> OAuthFlow {
        OAuthFlow::new(
            config,
            reqwest::Client::new(),
            RetryingInvoker::default(),
            Duration::from_secs(30),
        )
    }

    fn token_expiring(expiry: Option<DateTime<Utc>>) -> OAuthToken {
        OAuthToken {
            access_token: "ya29.access".to_string(),
            token_type: "Bearer".to_string(),
            refresh_token: Some("1//refresh".to_string()),
            expiry,
        }
    }

    // -- PKCE and state --

    #[test]
    fn pkce_verifier_is_url_safe_43_chars() {
        let verifier = generate_pkce_verifier().unwrap();
        assert_eq!(verifier.len(), 43);
        assert!(
            verifier
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn pkce_challenge_matches_rfc7636_vector() {
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        assert_eq!(
            pkce_challenge(verifier),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn state_values_are_unique() {
        let a = generate_state().unwrap();
        let b = generate_state().unwrap();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
    }

    // -- Authorization URL --

    #[test]
    fn authorization_url_requests_offline_consent() {
        let flow = test_flow(test_config());
        let challenge = pkce_challenge("test-verifier");
        let url_str = flow.authorization_url("random-state", &challenge).unwrap();

        let url = Url::parse(&url_str).unwrap();
        let params: HashMap<_, _> = url.query_pairs().collect();

        assert_eq!(params["response_type"], "code");
        assert_eq!(params["client_id"], "test-client-id");
        assert_eq!(params["redirect_uri"], "urn:ietf:wg:oauth:2.0:oob");
        assert_eq!(params["state"], "random-state");
        assert_eq!(params["code_challenge"], challenge.as_str());
        assert_eq!(params["code_challenge_method"], "S256");
        assert_eq!(params["access_type"], "offline");
        assert_eq!(params["prompt"], "consent");
        assert_eq!(
            params["scope"],
            "https://www.googleapis.com/auth/gmail.readonly https://www.googleapis.com/auth/gmail.send"
        );
    }

    #[test]
    fn authorization_url_without_scopes_omits_scope() {
        let mut config = test_config();
        config.scopes.clear();
        let url_str = test_flow(config).authorization_url("s", "c").unwrap();
        let url = Url::parse(&url_str).unwrap();
        assert!(url.query_pairs().all(|(k, _)| k != "scope"));
    }

    #[test]
    fn authorization_url_rejects_bad_auth_url() {
        let mut config = test_config();
        config.auth_url = "not a url".to_string();
        let result = test_flow(config).authorization_url("s", "c");
        assert!(matches!(result, Err(AuthError::UrlParse(_))));
    }

    // -- Client file parsing --

    #[test]
    fn parses_installed_client_file() {
        let raw = br#"{"installed":{
            "client_id":"123.apps.googleusercontent.com",
            "client_secret":"shh",
            "auth_uri":"https://accounts.google.com/o/oauth2/auth",
            "token_uri":"https://oauth2.googleapis.com/token",
            "redirect_uris":["urn:ietf:wg:oauth:2.0:oob","http://localhost"]
        }}"#;

        let config =
            OAuthConfig::from_credentials_json(raw, vec!["scope-a".to_string()]).unwrap();
        assert_eq!(config.client_id, "123.apps.googleusercontent.com");
        assert_eq!(config.client_secret.as_deref(), Some("shh"));
        assert_eq!(config.token_url, "https://oauth2.googleapis.com/token");
        assert_eq!(config.redirect_uri, "urn:ietf:wg:oauth:2.0:oob");
        assert_eq!(config.scopes, vec!["scope-a".to_string()]);
    }

    #[test]
    fn parses_web_client_file() {
        let raw = br#"{"web":{
            "client_id":"web-client",
            "auth_uri":"https://auth.example.com/authorize",
            "token_uri":"https://auth.example.com/token",
            "redirect_uris":["http://127.0.0.1:8400/callback"]
        }}"#;

        let config = OAuthConfig::from_credentials_json(raw, vec![]).unwrap();
        assert_eq!(config.client_id, "web-client");
        assert!(config.client_secret.is_none());
        assert_eq!(config.redirect_uri, "http://127.0.0.1:8400/callback");
    }

    #[test]
    fn parses_flat_client_file() {
        let raw = br#"{
            "client_id":"flat",
            "client_secret":"",
            "auth_url":"https://auth.example.com/authorize",
            "token_url":"https://auth.example.com/token",
            "redirect_uri":"http://localhost:9000"
        }"#;

        let config = OAuthConfig::from_credentials_json(raw, vec![]).unwrap();
        assert_eq!(config.client_id, "flat");
        assert!(config.client_secret.is_none());
        assert_eq!(config.redirect_uri, "http://localhost:9000");
    }

    #[test]
    fn client_file_without_redirect_is_rejected() {
        let raw = br#"{"installed":{
            "client_id":"x",
            "auth_uri":"https://a",
            "token_uri":"https://t"
        }}"#;
        let err = OAuthConfig::from_credentials_json(raw, vec![]).unwrap_err();
        assert!(err.to_string().contains("redirect"));
    }

    #[test]
    fn client_file_missing_token_uri_is_rejected() {
        let raw = br#"{"installed":{"client_id":"x","auth_uri":"https://a"}}"#;
        let err = OAuthConfig::from_credentials_json(raw, vec![]).unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials { .. }));
    }

    #[test]
    fn non_json_client_file_is_rejected() {
        let err = OAuthConfig::from_credentials_json(b"hello", vec![]).unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials { .. }));
    }

    // -- Token state --

    #[test]
    fn absent_when_no_token() {
        assert_eq!(TokenState::of(None, Utc::now()), TokenState::Absent);
    }

    #[test]
    fn expiry_equal_to_now_is_expired() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let token = token_expiring(Some(now));
        assert_eq!(TokenState::of(Some(&token), now), TokenState::Expired);
    }

    #[test]
    fn expiry_one_second_ahead_is_valid() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let token = token_expiring(Some(now + chrono::Duration::seconds(1)));
        assert_eq!(TokenState::of(Some(&token), now), TokenState::Valid);
    }

    #[test]
    fn missing_expiry_never_expires() {
        let token = token_expiring(None);
        let far_future = Utc.with_ymd_and_hms(2999, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(TokenState::of(Some(&token), far_future), TokenState::Valid);
    }

    #[test]
    fn token_state_display() {
        assert_eq!(TokenState::Absent.to_string(), "absent");
        assert_eq!(TokenState::Valid.to_string(), "valid");
        assert_eq!(TokenState::Expired.to_string(), "expired");
    }

    // -- Token record format --

    #[test]
    fn loads_record_written_by_other_oauth2_clients() {
        let raw = r#"{
            "access_token":"ya29.a0",
            "token_type":"Bearer",
            "refresh_token":"1//0g",
            "expiry":"2026-03-01T13:00:00.123456+01:00"
        }"#;
        let token: OAuthToken = serde_json::from_str(raw).unwrap();
        assert_eq!(token.access_token, "ya29.a0");
        assert_eq!(
            token.expiry,
            Some(
                Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
                    + chrono::Duration::microseconds(123_456)
            )
        );
    }

    #[test]
    fn zero_expiry_means_no_expiry() {
        let raw = r#"{"access_token":"a","token_type":"Bearer","expiry":"0001-01-01T00:00:00Z"}"#;
        let token: OAuthToken = serde_json::from_str(raw).unwrap();
        assert!(token.expiry.is_none());
        assert!(token.refresh_token.is_none());
    }

    #[test]
    fn empty_refresh_token_is_not_usable() {
        let mut token = token_expiring(None);
        token.refresh_token = Some(String::new());
        assert!(token.usable_refresh_token().is_none());
    }

    #[test]
    fn token_response_computes_expiry() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let response = TokenResponse {
            access_token: "at".to_string(),
            refresh_token: None,
            expires_in: Some(3599),
            token_type: None,
        };
        let token = response.into_token(now).unwrap();
        assert_eq!(token.token_type, "Bearer");
        assert_eq!(token.expiry, Some(now + chrono::Duration::seconds(3599)));
    }

    #[test]
    fn token_response_rejects_unrepresentable_expiry() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        for expires_in in [10_000_000_000_000, i64::MAX] {
            let response = TokenResponse {
                access_token: "at".to_string(),
                refresh_token: None,
                expires_in: Some(expires_in),
                token_type: None,
            };
            assert!(
                response.into_token(now).is_none(),
                "expires_in {expires_in} should be rejected"
            );
        }
    }

    #[test]
    fn token_response_without_positive_lifetime_has_no_expiry() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        for expires_in in [None, Some(0), Some(i64::MIN)] {
            let response = TokenResponse {
                access_token: "at".to_string(),
                refresh_token: None,
                expires_in,
                token_type: None,
            };
            assert_eq!(response.into_token(now).unwrap().expiry, None);
        }
    }

    // -- Failure classification --

    #[test]
    fn invalid_grant_on_refresh_requires_reauthorization() {
        let err = OAuthFlow::map_failure(
            RetryError::Fatal(ExchangeFailure::Rejected {
                status: 400,
                error: "invalid_grant".to_string(),
                description: Some("Token has been expired or revoked.".to_string()),
            }),
            true,
        );
        match err {
            AuthError::ReauthorizationRequired { reason } => {
                assert_eq!(reason, "invalid_grant: Token has been expired or revoked.");
            }
            other => panic!("expected reauthorization, got {other:?}"),
        }
    }

    #[test]
    fn invalid_grant_on_code_exchange_is_invalid_grant() {
        let err = OAuthFlow::map_failure(
            RetryError::Fatal(ExchangeFailure::Rejected {
                status: 400,
                error: "invalid_grant".to_string(),
                description: None,
            }),
            false,
        );
        assert!(matches!(err, AuthError::InvalidGrant { .. }));
    }

    #[test]
    fn unauthorized_status_on_refresh_requires_reauthorization() {
        let err = OAuthFlow::map_failure(
            RetryError::Fatal(ExchangeFailure::Rejected {
                status: 401,
                error: "invalid_client".to_string(),
                description: None,
            }),
            true,
        );
        assert!(err.requires_reauthorization());
    }

    #[test]
    fn exhaustion_keeps_last_failure() {
        let err = OAuthFlow::map_failure(
            RetryError::Exhausted {
                attempts: 5,
                last: ExchangeFailure::Rejected {
                    status: 503,
                    error: "backend unavailable".to_string(),
                    description: None,
                },
            },
            true,
        );
        match err {
            AuthError::ExhaustedRetries { attempts, last } => {
                assert_eq!(attempts, 5);
                assert!(last.contains("503"));
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }
}
