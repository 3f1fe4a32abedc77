//! Local HTTP callback server for the OAuth redirect.
//!
//! When the client registration allows a loopback redirect, the browser can
//! deliver `?code=xxx&state=yyy` straight to us instead of the user pasting
//! it. This module listens until that request arrives, answers with a short
//! HTML page, and shuts down.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::error::{AuthError, Result};
use crate::prompt::{AuthorizationPrompt, AuthorizationResponse};

/// Default port for the loopback redirect.
pub const DEFAULT_CALLBACK_PORT: u16 = 8400;

/// Default wait for the browser redirect.
pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

/// The HTML page returned to the browser after the redirect.
const SUCCESS_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Letterbox authorized</title></head>
<body style="font-family: sans-serif; text-align: center; margin-top: 20vh">
    <h1>Letterbox is authorized</h1>
    <p>You can close this tab and return to the terminal.</p>
</body>
</html>"#;

/// A bound listener waiting for one OAuth redirect.
#[derive(Debug)]
pub struct CallbackServer {
    listener: TcpListener,
}

impl CallbackServer {
    /// Bind to `127.0.0.1:{port}`. Port 0 picks an ephemeral port.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Io`] if the port cannot be bound.
    pub async fn bind(port: u16) -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port)).await?;
        Ok(Self { listener })
    }

    /// The address actually bound.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// The redirect URI that reaches this listener.
    pub fn redirect_uri(&self) -> Result<String> {
        Ok(format!("http://127.0.0.1:{}", self.local_addr()?.port()))
    }

    /// Wait for the redirect, answer the browser, and return the code.
    ///
    /// # Errors
    ///
    /// - [`AuthError::CallbackTimeout`] if `timeout` elapses first.
    /// - [`AuthError::FlowFailed`] if the request carries an error or no
    ///   code.
    pub async fn wait(self, timeout: Duration) -> Result<AuthorizationResponse> {
        tracing::info!(
            addr = %self.local_addr()?,
            "callback server listening for OAuth redirect"
        );

        match tokio::time::timeout(timeout, self.accept_redirect()).await {
            Ok(inner) => inner,
            Err(_) => Err(AuthError::CallbackTimeout {
                timeout_secs: timeout.as_secs(),
            }),
        }
    }

    /// Accept connections until one carries the redirect, answer it, and
    /// return its parse result.
    ///
    /// Browsers open speculative connections and ask for `/favicon.ico`;
    /// those get a 404 and the loop continues.
    async fn accept_redirect(&self) -> Result<AuthorizationResponse> {
        loop {
            let (mut stream, peer) = self.listener.accept().await?;
            tracing::debug!(peer = %peer, "accepted callback connection");

            let request = match read_request_head(&mut stream).await {
                Ok(request) => request,
                Err(e) => {
                    tracing::debug!(peer = %peer, error = %e, "callback connection failed");
                    continue;
                }
            };

            if !is_redirect(&request) {
                if !request.is_empty()
                    && let Err(e) = respond(&mut stream, "404 Not Found", "Not found").await
                {
                    tracing::debug!(peer = %peer, error = %e, "failed to answer stray request");
                }
                continue;
            }

            let parsed = parse_callback_request(&request);
            match &parsed {
                Ok(_) => respond(&mut stream, "200 OK", SUCCESS_HTML).await?,
                Err(e) => {
                    let body = format!("Authorization failed: {e}");
                    respond(&mut stream, "400 Bad Request", &body).await?;
                }
            }

            if parsed.is_ok() {
                tracing::info!("callback received, authorization code extracted");
            }
            return parsed;
        }
    }
}

/// Upper bound on a request head; redirects are small GET requests.
const MAX_REQUEST_HEAD: usize = 8 * 1024;

/// Read until the blank line ending the head, EOF, or [`MAX_REQUEST_HEAD`].
async fn read_request_head(stream: &mut TcpStream) -> std::io::Result<String> {
    let mut head = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    while head.len() < MAX_REQUEST_HEAD && !head.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        head.extend_from_slice(&chunk[..n]);
    }

    Ok(String::from_utf8_lossy(&head).into_owned())
}

async fn respond(stream: &mut TcpStream, status: &str, body: &str) -> std::io::Result<()> {
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).await?;
    stream.flush().await
}

/// Whether the request target's query carries `code` or `error`.
fn is_redirect(request: &str) -> bool {
    let Some(target) = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
    else {
        return false;
    };

    target.split_once('?').is_some_and(|(_, query)| {
        url::form_urlencoded::parse(query.as_bytes()).any(|(key, _)| key == "code" || key == "error")
    })
}

/// Parse the query of the request line: `GET /path?code=xxx&state=yyy HTTP/1.1`.
fn parse_callback_request(request: &str) -> Result<AuthorizationResponse> {
    let request_line = request
        .lines()
        .next()
        .ok_or_else(|| AuthError::FlowFailed {
            reason: "empty HTTP request".to_string(),
        })?;

    let target = request_line
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| AuthError::FlowFailed {
            reason: format!("malformed HTTP request line: {request_line}"),
        })?;

    let (_, query) = target
        .split_once('?')
        .ok_or_else(|| AuthError::FlowFailed {
            reason: "callback request has no query string".to_string(),
        })?;

    AuthorizationResponse::from_query(query)
}

// ---------------------------------------------------------------------------
// Prompt
// ---------------------------------------------------------------------------

/// An [`AuthorizationPrompt`] that prints the URL and waits for the browser
/// to redirect to a loopback listener.
///
/// The client's redirect URI must point at the same port; see
/// [`CallbackPrompt::redirect_uri`].
#[derive(Debug, Clone)]
pub struct CallbackPrompt {
    port: u16,
    timeout: Duration,
}

impl CallbackPrompt {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            timeout: DEFAULT_CALLBACK_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The redirect URI to put in the authorization URL.
    pub fn redirect_uri(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }
}

impl Default for CallbackPrompt {
    fn default() -> Self {
        Self::new(DEFAULT_CALLBACK_PORT)
    }
}

#[async_trait]
impl AuthorizationPrompt for CallbackPrompt {
    async fn request_code(&self, authorization_url: &str) -> Result<AuthorizationResponse> {
        let server = CallbackServer::bind(self.port).await?;
        eprintln!("\nOpen this link in your browser and grant access:\n\n  {authorization_url}\n");
        server.wait(self.timeout).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
