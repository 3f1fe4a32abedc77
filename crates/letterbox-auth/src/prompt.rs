//! Obtaining the authorization code from the user.
//!
//! The token manager never talks to a terminal directly. It hands the
//! authorization URL to an [`AuthorizationPrompt`] and gets back whatever the
//! user (or a browser redirect) produced. [`ConsolePrompt`] is the
//! interactive default; tests inject scripted prompts.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use url::Url;

use crate::error::{AuthError, Result};

/// The code returned by the authorization server, with the `state` that
/// came back alongside it (if any).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationResponse {
    pub code: String,
    pub state: Option<String>,
}

impl AuthorizationResponse {
    /// Parse what the user pasted.
    ///
    /// Accepts a bare authorization code, a full redirect URL, or a raw
    /// query string (`code=...&state=...`). An `error` parameter from the
    /// authorization server is reported as [`AuthError::FlowFailed`].
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::FlowFailed`] for empty input, an error redirect,
    /// or a query string without a `code`.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(AuthError::FlowFailed {
                reason: "no authorization code entered".to_string(),
            });
        }

        if let Ok(url) = Url::parse(input)
            && url.has_host()
        {
            return Self::from_query(url.query().unwrap_or_default());
        }

        if let Some((_, query)) = input.split_once('?') {
            return Self::from_query(query);
        }

        if input.contains("code=") || input.contains("error=") {
            return Self::from_query(input);
        }

        Ok(Self {
            code: input.to_string(),
            state: None,
        })
    }

    /// Extract `code` and `state` from a URL query string.
    pub(crate) fn from_query(query: &str) -> Result<Self> {
        let mut code = None;
        let mut state = None;

        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "state" => state = Some(value.into_owned()),
                "error" => {
                    return Err(AuthError::FlowFailed {
                        reason: format!("authorization server returned error: {value}"),
                    });
                }
                _ => {}
            }
        }

        let code = code.filter(|c| !c.is_empty()).ok_or_else(|| AuthError::FlowFailed {
            reason: "response missing 'code' parameter".to_string(),
        })?;

        Ok(Self { code, state })
    }
}

/// Presents the authorization URL and returns the user's response.
#[async_trait]
pub trait AuthorizationPrompt: Send + Sync {
    /// Show `authorization_url` to the user and wait for the code.
    async fn request_code(&self, authorization_url: &str) -> Result<AuthorizationResponse>;
}

/// Prints the URL to stderr and reads one line from stdin.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsolePrompt;

#[async_trait]
impl AuthorizationPrompt for ConsolePrompt {
    async fn request_code(&self, authorization_url: &str) -> Result<AuthorizationResponse> {
        let mut stderr = tokio::io::stderr();
        let banner = format!(
            "\nOpen this link in your browser and grant access:\n\n  {authorization_url}\n\n\
             Then paste the redirect URL (or just the code) here: "
        );
        stderr.write_all(banner.as_bytes()).await?;
        stderr.flush().await?;

        let mut line = String::new();
        let read = BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
        if read == 0 {
            return Err(AuthError::FlowFailed {
                reason: "stdin closed before an authorization code was entered".to_string(),
            });
        }

        AuthorizationResponse::parse(&line)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
