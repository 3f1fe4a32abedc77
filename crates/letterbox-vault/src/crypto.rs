//! Passphrase-based sealing using the `ring` crate.
//!
//! Every record on disk is a self-contained envelope:
//!
//! ```text
//! [16 bytes: PBKDF2 salt]
//! [12 bytes: AES-256-GCM nonce]
//! [remaining: AES-256-GCM ciphertext + 16-byte tag]
//! ```
//!
//! # Security Notes
//!
//! - A fresh salt and nonce are drawn for every [`seal`] call, so each
//!   envelope is protected by its own key even when the passphrase is reused.
//! - The derived key lives on the stack for the duration of one call only.
//! - PBKDF2-HMAC-SHA256 runs 100,000 iterations. Envelopes written with this
//!   layout and iteration count by earlier versions of the tool stay readable.

use std::num::NonZeroU32;

use ring::aead::{
    self, Aad, BoundKey, NONCE_LEN, Nonce, NonceSequence, OpeningKey, SealingKey, UnboundKey,
};
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};

use crate::error::{Result, VaultError};

/// Length of the derived AES-256 key in bytes.
pub const KEY_LEN: usize = 32;

/// Length of the per-envelope PBKDF2 salt in bytes.
pub const SALT_LEN: usize = 16;

/// Length of the AES-256-GCM nonce in bytes (96 bits).
pub const NONCE_LEN_BYTES: usize = NONCE_LEN;

/// Length of the GCM authentication tag in bytes.
pub const TAG_LEN: usize = 16;

/// Smallest envelope that can possibly verify: an empty plaintext.
pub const MIN_ENVELOPE_LEN: usize = SALT_LEN + NONCE_LEN_BYTES + TAG_LEN;

/// PBKDF2 iteration count.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

const ITERATIONS: NonZeroU32 = match NonZeroU32::new(PBKDF2_ITERATIONS) {
    Some(n) => n,
    None => panic!("PBKDF2_ITERATIONS must be non-zero"),
};

static PBKDF2_ALG: pbkdf2::Algorithm = pbkdf2::PBKDF2_HMAC_SHA256;

static AEAD_ALG: &aead::Algorithm = &aead::AES_256_GCM;

// ---------------------------------------------------------------------------
// Nonce handling
// ---------------------------------------------------------------------------

/// Yields exactly one nonce, so a bound key can never seal twice.
struct SingleNonce(Option<[u8; NONCE_LEN_BYTES]>);

impl SingleNonce {
    fn new(bytes: [u8; NONCE_LEN_BYTES]) -> Self {
        Self(Some(bytes))
    }
}

impl NonceSequence for SingleNonce {
    fn advance(&mut self) -> std::result::Result<Nonce, ring::error::Unspecified> {
        self.0
            .take()
            .map(Nonce::assume_unique_for_key)
            .ok_or(ring::error::Unspecified)
    }
}

// ---------------------------------------------------------------------------
// Key derivation
// ---------------------------------------------------------------------------

/// Stretch `passphrase` into a 256-bit key with PBKDF2-HMAC-SHA256.
///
/// Deterministic for a fixed `(passphrase, salt)` pair and deliberately slow.
pub fn derive_key(passphrase: &[u8], salt: &[u8]) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    pbkdf2::derive(PBKDF2_ALG, ITERATIONS, salt, passphrase, &mut key);
    key
}

// ---------------------------------------------------------------------------
// Sealing
// ---------------------------------------------------------------------------

/// Encrypt `plaintext` under a key derived from `passphrase` and a fresh
/// random salt.
///
/// Returns the complete envelope `salt ‖ nonce ‖ ciphertext ‖ tag`.
///
/// # Errors
///
/// Returns [`VaultError::EncryptionFailed`] if the system RNG or `ring`
/// reports a failure.
pub fn seal(passphrase: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let rng = SystemRandom::new();

    let mut salt = [0u8; SALT_LEN];
    rng.fill(&mut salt)
        .map_err(|_| VaultError::EncryptionFailed {
            reason: "failed to generate random salt".into(),
        })?;

    let mut nonce = [0u8; NONCE_LEN_BYTES];
    rng.fill(&mut nonce)
        .map_err(|_| VaultError::EncryptionFailed {
            reason: "failed to generate random nonce".into(),
        })?;

    let key = derive_key(passphrase, &salt);
    let unbound_key = UnboundKey::new(AEAD_ALG, &key).map_err(|_| VaultError::EncryptionFailed {
        reason: "failed to create AES-256-GCM key".into(),
    })?;
    let mut sealing_key = SealingKey::new(unbound_key, SingleNonce::new(nonce));

    // `ring` encrypts in place and appends the tag.
    let mut in_out = plaintext.to_vec();
    sealing_key
        .seal_in_place_append_tag(Aad::empty(), &mut in_out)
        .map_err(|_| VaultError::EncryptionFailed {
            reason: "seal_in_place failed".into(),
        })?;

    let mut envelope = Vec::with_capacity(SALT_LEN + NONCE_LEN_BYTES + in_out.len());
    envelope.extend_from_slice(&salt);
    envelope.extend_from_slice(&nonce);
    envelope.extend_from_slice(&in_out);

    tracing::trace!(
        plaintext_len = plaintext.len(),
        envelope_len = envelope.len(),
        "sealed envelope"
    );

    Ok(envelope)
}

/// Authenticate and decrypt an envelope produced by [`seal`].
///
/// # Errors
///
/// - [`VaultError::MalformedEnvelope`] if `envelope` is shorter than
///   [`MIN_ENVELOPE_LEN`].
/// - [`VaultError::Integrity`] if the tag does not verify (wrong passphrase,
///   flipped bits, or a truncated ciphertext).
pub fn open(passphrase: &[u8], envelope: &[u8]) -> Result<Vec<u8>> {
    if envelope.len() < MIN_ENVELOPE_LEN {
        return Err(VaultError::MalformedEnvelope {
            len: envelope.len(),
            min: MIN_ENVELOPE_LEN,
        });
    }

    let (salt, rest) = envelope.split_at(SALT_LEN);
    let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LEN_BYTES);

    let mut nonce = [0u8; NONCE_LEN_BYTES];
    nonce.copy_from_slice(nonce_bytes);

    let key = derive_key(passphrase, salt);
    let unbound_key = UnboundKey::new(AEAD_ALG, &key).map_err(|_| VaultError::Integrity)?;
    let mut opening_key = OpeningKey::new(unbound_key, SingleNonce::new(nonce));

    let mut in_out = ciphertext.to_vec();
    let plaintext = opening_key
        .open_in_place(Aad::empty(), &mut in_out)
        .map_err(|_| VaultError::Integrity)?
        .to_vec();

    tracing::trace!(
        envelope_len = envelope.len(),
        plaintext_len = plaintext.len(),
        "opened envelope"
    );

    Ok(plaintext)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
