//! Store configuration.
//!
//! [`VaultConfig`] is built once by the application (typically from its own
//! environment handling) and handed to [`SecretStore::open`]. Nothing in this
//! crate reads process-wide state.
//!
//! [`SecretStore::open`]: crate::store::SecretStore::open

use std::fmt;
use std::path::{Path, PathBuf};

/// Directory name used under the user's home when no base dir is given.
pub const DEFAULT_DIR_NAME: &str = ".secure_newsletters";

/// The user-supplied passphrase every record is sealed under.
///
/// Held only in memory. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct Passphrase(String);

impl Passphrase {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Passphrase(<redacted>)")
    }
}

impl From<&str> for Passphrase {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Passphrase {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Where records live and which passphrase seals them.
#[derive(Debug, Clone)]
pub struct VaultConfig {
    /// Directory holding the `*.enc` record files.
    pub base_dir: PathBuf,
    /// Passphrase for sealing and opening records.
    pub passphrase: Passphrase,
}

impl VaultConfig {
    pub fn new(base_dir: impl Into<PathBuf>, passphrase: impl Into<Passphrase>) -> Self {
        Self {
            base_dir: base_dir.into(),
            passphrase: passphrase.into(),
        }
    }

    /// The conventional location `<home>/.secure_newsletters`.
    pub fn default_base_dir(home: &Path) -> PathBuf {
        home.join(DEFAULT_DIR_NAME)
    }
}
