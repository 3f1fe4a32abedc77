//! HTTP access on behalf of the authorized user.

use std::sync::Arc;

use reqwest::{IntoUrl, Method, RequestBuilder};

use crate::error::Result;
use crate::manager::TokenManager;
use crate::oauth::OAuthConfig;

/// Builds requests that carry a currently valid bearer token.
///
/// Each request re-checks the token first, so a long-lived client keeps
/// working across expiry: the token is refreshed (and persisted) on demand.
#[derive(Debug, Clone)]
pub struct AuthorizedClient {
    manager: TokenManager,
    config: Arc<OAuthConfig>,
    http: reqwest::Client,
}

impl AuthorizedClient {
    pub(crate) fn new(manager: TokenManager, config: OAuthConfig) -> Self {
        let http = manager.http_client().clone();
        Self {
            manager,
            config: Arc::new(config),
            http,
        }
    }

    /// The scopes this client was authorized for.
    pub fn scopes(&self) -> &[String] {
        &self.config.scopes
    }

    /// The current access token, refreshed if it has expired.
    pub async fn access_token(&self) -> Result<String> {
        Ok(self.manager.valid_token(&self.config).await?.access_token)
    }

    /// Start a request with the `Authorization` header already set.
    pub async fn request<U: IntoUrl>(&self, method: Method, url: U) -> Result<RequestBuilder> {
        let token = self.manager.valid_token(&self.config).await?;
        Ok(self
            .http
            .request(method, url)
            .bearer_auth(token.access_token))
    }

    pub async fn get<U: IntoUrl>(&self, url: U) -> Result<RequestBuilder> {
        self.request(Method::GET, url).await
    }

    pub async fn post<U: IntoUrl>(&self, url: U) -> Result<RequestBuilder> {
        self.request(Method::POST, url).await
    }
}
