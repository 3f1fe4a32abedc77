//! File-backed store of sealed secret records.
//!
//! The [`SecretStore`] owns one base directory. Each record is a single file
//! `<base_dir>/<name>.enc` holding one envelope produced by
//! [`crypto::seal`]. Two records are well known:
//!
//! - `credentials`: the OAuth client file (structured JSON).
//! - `token`: the current access/refresh token pair.
//!
//! Writes go to a temporary file in the same directory which is then renamed
//! over the record, so a reader sees either the old envelope or the new one.
//!
//! Two stores running against the same directory at once are not supported:
//! no lock file is taken and the last writer wins.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::config::{Passphrase, VaultConfig};
use crate::crypto;
use crate::error::{Result, VaultError};

/// Record holding the OAuth client configuration.
pub const CREDENTIALS_RECORD: &str = "credentials";

/// Record holding the current OAuth token.
pub const TOKEN_RECORD: &str = "token";

/// File extension of sealed records.
const RECORD_EXTENSION: &str = "enc";

// ---------------------------------------------------------------------------
// SecretStore
// ---------------------------------------------------------------------------

/// Passphrase-sealed named records on disk.
///
/// # Example
///
/// ```rust,no_run
/// # use letterbox_vault::{SecretStore, VaultConfig};
/// # fn example() -> letterbox_vault::Result<()> {
/// let store = SecretStore::open(VaultConfig::new("/tmp/letterbox", "correct-horse"))?;
///
/// store.store_credentials(br#"{"installed": {"client_id": "abc"}}"#)?;
/// let raw = store.load_credentials()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct SecretStore {
    base_dir: PathBuf,
    passphrase: Passphrase,
}

impl SecretStore {
    /// Open (or create) the store directory described by `config`.
    ///
    /// The directory is created with owner-only permissions on Unix.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::MissingPassphrase`] for an empty passphrase, or
    /// [`VaultError::Io`] if the directory cannot be created.
    pub fn open(config: VaultConfig) -> Result<Self> {
        if config.passphrase.is_empty() {
            return Err(VaultError::MissingPassphrase);
        }

        let base_dir = config.base_dir;
        fs::create_dir_all(&base_dir)?;
        restrict_permissions(&base_dir, 0o700)?;

        tracing::debug!(path = %base_dir.display(), "secret store ready");

        Ok(Self {
            base_dir,
            passphrase: config.passphrase,
        })
    }

    /// The directory this store owns.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    // -- Generic records ----------------------------------------------------

    /// Seal `plaintext` and replace the record `name` with it.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidRecordName`] for names outside
    /// `[A-Za-z0-9_-]`, or an I/O or encryption error.
    pub fn put(&self, name: &str, plaintext: &[u8]) -> Result<()> {
        let path = self.record_path(name)?;
        let envelope = crypto::seal(self.passphrase.as_bytes(), plaintext)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&self.base_dir)?;
        restrict_permissions(tmp.path(), 0o600)?;
        tmp.write_all(&envelope)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| VaultError::Io(e.error))?;

        tracing::info!(record = name, bytes = plaintext.len(), "stored secret record");
        Ok(())
    }

    /// Read and open the record `name`.
    ///
    /// # Errors
    ///
    /// - [`VaultError::NotFound`] if the record does not exist.
    /// - [`VaultError::MalformedEnvelope`] or [`VaultError::Integrity`] from
    ///   [`crypto::open`].
    pub fn get(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.record_path(name)?;

        let envelope = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(VaultError::NotFound {
                    name: name.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let plaintext = crypto::open(self.passphrase.as_bytes(), &envelope)?;

        tracing::debug!(record = name, "opened secret record");
        Ok(plaintext)
    }

    /// Remove the record `name`. Removing an absent record is a no-op.
    pub fn delete(&self, name: &str) -> Result<()> {
        let path = self.record_path(name)?;

        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!(record = name, "deleted secret record");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether the record file `name` is present (it is not opened).
    pub fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.record_path(name)?.is_file())
    }

    // -- Well-known records -------------------------------------------------

    /// Validate and seal the OAuth client configuration.
    ///
    /// The bytes must parse as a JSON object; anything else is rejected with
    /// [`VaultError::Validation`] before encryption.
    pub fn store_credentials(&self, raw: &[u8]) -> Result<()> {
        validate_credentials(raw)?;
        self.put(CREDENTIALS_RECORD, raw)
    }

    /// Open the OAuth client configuration.
    pub fn load_credentials(&self) -> Result<Vec<u8>> {
        self.get(CREDENTIALS_RECORD)
    }

    /// Read a downloaded OAuth client file and seal it as the credentials
    /// record.
    pub fn setup_from_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let raw = fs::read(path)?;
        self.store_credentials(&raw)?;

        tracing::info!(source = %path.display(), "credentials imported");
        Ok(())
    }

    /// Remove both well-known records.
    ///
    /// Every record is attempted; failures are reported together.
    pub fn cleanup(&self) -> Result<()> {
        let failures: Vec<String> = [CREDENTIALS_RECORD, TOKEN_RECORD]
            .into_iter()
            .filter_map(|name| self.delete(name).err().map(|e| format!("{name}: {e}")))
            .collect();

        if failures.is_empty() {
            tracing::info!(path = %self.base_dir.display(), "secret store cleaned up");
            Ok(())
        } else {
            Err(VaultError::Cleanup { failures })
        }
    }

    // -- Internal helpers ---------------------------------------------------

    fn record_path(&self, name: &str) -> Result<PathBuf> {
        let valid = !name.is_empty()
            && name
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');

        if !valid {
            return Err(VaultError::InvalidRecordName {
                name: name.to_string(),
            });
        }

        Ok(self.base_dir.join(format!("{name}.{RECORD_EXTENSION}")))
    }
}

/// Reject credentials that are not a JSON object.
fn validate_credentials(raw: &[u8]) -> Result<()> {
    let value: serde_json::Value =
        serde_json::from_slice(raw).map_err(|e| VaultError::Validation {
            reason: format!("credentials are not valid JSON: {e}"),
        })?;

    if !value.is_object() {
        return Err(VaultError::Validation {
            reason: "credentials must be a JSON object".into(),
        });
    }

    Ok(())
}

#[cfg(unix)]
fn restrict_permissions(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
