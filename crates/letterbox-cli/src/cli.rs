//! CLI argument definitions for Letterbox.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Letterbox -- sealed OAuth credentials for the newsletter digest.
#[derive(Parser)]
#[command(
    name = "letterbox",
    version,
    about = "Letterbox -- sealed OAuth credentials for the newsletter digest",
    long_about = "Stores the OAuth client file and token encrypted under a passphrase \
                  (CREDENTIALS_PASSPHRASE) and keeps the token fresh."
)]
pub struct Cli {
    /// Directory holding the sealed records (overrides CREDENTIALS_DIR).
    #[arg(long, global = true)]
    pub dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Seal an OAuth client file downloaded from the provider console.
    Setup {
        /// Path to the client JSON file.
        #[arg(long, short)]
        credentials: PathBuf,
    },

    /// Make sure a valid token is stored, authorizing interactively if needed.
    Authorize {
        /// Scope to request (repeatable). Defaults to read, modify, and send mail.
        #[arg(long = "scope", short)]
        scopes: Vec<String>,

        /// Receive the redirect on a loopback port instead of pasting it.
        #[arg(long)]
        callback_port: Option<u16>,

        /// Accept a pasted code that comes without the `state` parameter.
        #[arg(long)]
        allow_bare_code: bool,

        /// Run the interactive flow even if a valid token is stored.
        #[arg(long, short)]
        force: bool,
    },

    /// Show whether a token is absent, valid, or expired.
    Status,

    /// Delete the sealed client file and token.
    Cleanup,
}
