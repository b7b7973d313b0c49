//! Content-addressed secret keys.
//!
//! A [`Key`] is never generated at random. It is the SHA-256 digest of the
//! store's private [`Seed`] followed by the ciphertext, so re-submitting the
//! same ciphertext to the same store yields the same key. Clients embed fresh
//! salt and IV in every ciphertext, which keeps real collisions out of reach.

use std::{fmt, str::FromStr};

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::{Environment, KeyError};

/// Width of a key in bytes (SHA-256 digest size).
pub const KEY_SIZE: usize = 32;

/// Width of a freshly generated seed in bytes.
pub const SEED_SIZE: usize = 16;

/// Identifier of a stored secret.
///
/// Displayed and parsed as URL-safe base64 without padding, which is also the
/// form handed to clients.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key([u8; KEY_SIZE]);

impl Key {
    /// Wrap raw key bytes.
    pub const fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Raw key bytes.
    pub const fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Encode as URL-safe base64 without padding.
    pub fn to_base64(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.0)
    }

    /// Decode from URL-safe base64 without padding.
    ///
    /// Rejects anything that does not decode to exactly [`KEY_SIZE`] bytes.
    pub fn from_base64(encoded: &str) -> Result<Self, KeyError> {
        let bytes = URL_SAFE_NO_PAD.decode(encoded)?;
        Self::try_from(bytes.as_slice())
    }
}

impl TryFrom<&[u8]> for Key {
    type Error = KeyError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let array: [u8; KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| KeyError::InvalidLength { expected: KEY_SIZE, got: bytes.len() })?;
        Ok(Self(array))
    }
}

impl FromStr for Key {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_base64(s)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", self.to_base64())
    }
}

/// Private per-store value mixed into every key derivation.
///
/// Prevents anyone who knows a ciphertext from computing its key without
/// access to the store. Zeroized on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct Seed(Vec<u8>);

impl Seed {
    /// Generate a fresh [`SEED_SIZE`]-byte seed from the environment's RNG.
    pub fn generate<E: Environment>(env: &E) -> Self {
        let mut bytes = vec![0u8; SEED_SIZE];
        env.random_bytes(&mut bytes);
        Self(bytes)
    }

    /// Wrap existing seed bytes (e.g. loaded from disk).
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Encode for persistence as URL-safe base64 without padding.
    pub fn to_base64(&self) -> String {
        URL_SAFE_NO_PAD.encode(&self.0)
    }

    /// Decode a persisted seed.
    pub fn from_base64(encoded: &str) -> Result<Self, KeyError> {
        let bytes = URL_SAFE_NO_PAD.decode(encoded)?;
        if bytes.is_empty() {
            return Err(KeyError::InvalidLength { expected: SEED_SIZE, got: 0 });
        }
        Ok(Self(bytes))
    }

    /// Derive the key for a ciphertext: `SHA-256(seed || ciphertext)`.
    ///
    /// Deterministic for a given seed and infallible for any input.
    pub fn derive_key(&self, ciphertext: &str) -> Key {
        let mut hasher = Sha256::new();
        hasher.update(&self.0);
        hasher.update(ciphertext.as_bytes());
        Key(hasher.finalize().into())
    }
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Seed(..)")
    }
}

impl Drop for Seed {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}
