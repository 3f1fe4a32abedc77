//! Store configuration from the environment.
//!
//! The libraries never read the environment themselves; this is the one
//! place that does.

use std::path::PathBuf;

use anyhow::{Result, bail};
use letterbox_vault::{VaultConfig, config::DEFAULT_DIR_NAME};

/// Passphrase for sealing and opening records.
pub const PASSPHRASE_ENV: &str = "CREDENTIALS_PASSPHRASE";

/// Overrides the record directory.
pub const DIR_ENV: &str = "CREDENTIALS_DIR";

/// Load `.env` from the working directory (or a parent) into the process
/// environment, returning its path. Variables already set win.
///
/// Must run before the subscriber is installed so `RUST_LOG` can come from
/// the file.
pub fn load_dotenv() -> Option<PathBuf> {
    dotenvy::dotenv().ok()
}

/// Build the store configuration from the process environment.
pub fn from_env(dir_override: Option<PathBuf>) -> Result<VaultConfig> {
    resolve(env_non_empty, dir_override)
}

/// Read a non-empty environment variable, returning `None` if unset or empty.
fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Build the configuration from `lookup`.
///
/// Directory precedence: `dir_override`, then `CREDENTIALS_DIR`, then
/// `~/.secure_newsletters`.
fn resolve(
    lookup: impl Fn(&str) -> Option<String>,
    dir_override: Option<PathBuf>,
) -> Result<VaultConfig> {
    let Some(passphrase) = lookup(PASSPHRASE_ENV) else {
        bail!("{PASSPHRASE_ENV} is not set; export it (or put it in .env) before running letterbox");
    };

    let base_dir = match dir_override.or_else(|| lookup(DIR_ENV).map(PathBuf::from)) {
        Some(dir) => dir,
        None => match lookup("HOME").or_else(|| lookup("USERPROFILE")) {
            Some(home) => VaultConfig::default_base_dir(home.as_ref()),
            None => bail!(
                "cannot locate the home directory; set {DIR_ENV} to choose where records live"
            ),
        },
    };

    Ok(VaultConfig::new(base_dir, passphrase))
}
