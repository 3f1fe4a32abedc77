//! CLI entry point for Letterbox.
//!
//! This binary provides the `letterbox` command for sealing the OAuth client
//! file, authorizing, and inspecting or removing the stored records.

mod cli;
mod config;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use letterbox_auth::{
    AuthError, AuthSettings, AuthorizationPrompt, CallbackPrompt, ConsolePrompt, TokenManager,
    TokenState,
};
use letterbox_vault::{SecretStore, VaultError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let dotenv_path = config::load_dotenv();
    init_tracing("info");
    if let Some(path) = dotenv_path {
        debug!(path = %path.display(), "loaded .env");
    }

    let vault_config = config::from_env(cli.dir)?;
    let store = SecretStore::open(vault_config).context("failed to open the record directory")?;

    match cli.command {
        Commands::Setup { credentials } => cmd_setup(store, &credentials),
        Commands::Authorize {
            scopes,
            callback_port,
            allow_bare_code,
            force,
        } => cmd_authorize(store, scopes, callback_port, allow_bare_code, force).await,
        Commands::Status => cmd_status(store).await,
        Commands::Cleanup => cmd_cleanup(store).await,
    }
}

/// Install the global subscriber; `RUST_LOG` overrides `default_level`.
fn init_tracing(default_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_level))
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// A token that fires on Ctrl-C.
fn interrupt_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling");
            trigger.cancel();
        }
    });
    cancel
}

// ---------------------------------------------------------------------------
// Subcommand: setup
// ---------------------------------------------------------------------------

fn cmd_setup(store: SecretStore, credentials: &std::path::Path) -> Result<()> {
    let dir = store.base_dir().to_path_buf();
    let manager = TokenManager::new(store, Arc::new(ConsolePrompt));
    manager
        .setup_from_file(credentials)
        .with_context(|| format!("failed to store {}", credentials.display()))?;

    println!("Client credentials sealed in {}", dir.display());
    println!("Next: run `letterbox authorize`.");
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: authorize
// ---------------------------------------------------------------------------

async fn cmd_authorize(
    store: SecretStore,
    scopes: Vec<String>,
    callback_port: Option<u16>,
    allow_bare_code: bool,
    force: bool,
) -> Result<()> {
    let mut settings = AuthSettings {
        require_state: !allow_bare_code,
        ..AuthSettings::default()
    };
    let prompt: Arc<dyn AuthorizationPrompt> = match callback_port {
        Some(port) => {
            let prompt = CallbackPrompt::new(port);
            settings.redirect_uri = Some(prompt.redirect_uri());
            Arc::new(prompt)
        }
        None => Arc::new(ConsolePrompt),
    };

    let manager = TokenManager::new(store, prompt)
        .with_settings(settings)
        .with_cancellation(interrupt_token());
    let scopes: Vec<&str> = scopes.iter().map(String::as_str).collect();

    let token = if force {
        manager.authorize(&scopes).await?
    } else {
        match manager.get_client(&scopes).await {
            Ok(_) => manager
                .stored_token()?
                .context("token record disappeared after authorization")?,
            Err(AuthError::ReauthorizationRequired { reason }) => {
                warn!(reason = %reason, "stored grant revoked, authorizing again");
                manager.authorize(&scopes).await?
            }
            Err(e) => return Err(e.into()),
        }
    };

    info!("token is valid");
    match token.expiry {
        Some(expiry) => println!("Authorized. Access token valid until {expiry}."),
        None => println!("Authorized. Access token has no expiry."),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: status
// ---------------------------------------------------------------------------

async fn cmd_status(store: SecretStore) -> Result<()> {
    let dir = store.base_dir().to_path_buf();
    let has_credentials = match store.load_credentials() {
        Ok(_) => true,
        Err(VaultError::NotFound { .. }) => false,
        Err(e) => return Err(e).context("failed to open the sealed client file"),
    };

    let manager = TokenManager::new(store, Arc::new(ConsolePrompt));
    let state = manager.state().await?;

    println!("Directory:   {}", dir.display());
    println!(
        "Credentials: {}",
        if has_credentials { "stored" } else { "missing" }
    );
    println!("Token:       {state}");

    if state != TokenState::Absent
        && let Some(token) = manager.stored_token()?
    {
        match token.expiry {
            Some(expiry) => println!("Expiry:      {expiry}"),
            None => println!("Expiry:      none"),
        }
        println!(
            "Refreshable: {}",
            if token.usable_refresh_token().is_some() { "yes" } else { "no" }
        );
    }

    if !has_credentials {
        println!("\nRun `letterbox setup --credentials <client.json>` first.");
    } else if state == TokenState::Absent {
        println!("\nRun `letterbox authorize` to obtain a token.");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: cleanup
// ---------------------------------------------------------------------------

async fn cmd_cleanup(store: SecretStore) -> Result<()> {
    let manager = TokenManager::new(store, Arc::new(ConsolePrompt));
    manager.cleanup().await?;
    println!("Removed sealed credentials and token.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_filter_reads_rust_log_from_dotenv_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "RUST_LOG=letterbox_auth=trace\n").unwrap();

        dotenvy::from_path_override(&path).unwrap();

        let filter = env_filter("info").to_string();
        assert!(filter.contains("letterbox_auth=trace"), "got {filter}");
    }
}
