//! Envelope signing with the shared access-key secret.
//!
//! # Algorithm
//!
//! `sign(payload) = hex(md5(payload || secret))`, lowercase. The scheme is
//! deterministic: no salt and no nonce, so the same `(payload, secret)` pair
//! always yields the same signature.
//!
//! The secret is appended to the payload rather than used as an HMAC key,
//! which leaves the signature open to length-extension forgeries on MD5. It
//! authenticates envelopes between cooperating services; it is not a MAC to
//! build security decisions on.

use md5::{Digest, Md5};
use serde::{Deserialize, Deserializer};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

#[cfg(test)]
#[path = "signer_tests.rs"]
mod tests;

// ============================================================================
// SharedSecret
// ============================================================================

/// Secure container for the access-key secret.
///
/// The value is wiped from memory on drop and never appears in `Debug`
/// output or logs.
#[derive(Clone)]
pub struct SharedSecret(Zeroizing<String>);

impl SharedSecret {
    /// Wrap a secret value
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    /// Get secret as string (only for immediate use)
    pub fn expose_secret(&self) -> &str {
        self.0.as_str()
    }

    /// Check if secret is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Get secret length without exposing content
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl Default for SharedSecret {
    fn default() -> Self {
        Self::new(String::new())
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSecret")
            .field("length", &self.len())
            .field("value", &"<REDACTED>")
            .finish()
    }
}

impl<'de> Deserialize<'de> for SharedSecret {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Ok(Self::new(value))
    }
}

// ============================================================================
// Signer
// ============================================================================

/// Derives envelope signatures from the shared secret.
#[derive(Clone)]
pub struct Signer {
    secret: SharedSecret,
}

impl Signer {
    /// Create a signer owning `secret`
    pub fn new(secret: SharedSecret) -> Self {
        Self { secret }
    }

    /// Compute the signature for `payload`.
    pub fn sign(&self, payload: &str) -> String {
        let mut hasher = Md5::new();
        hasher.update(payload.as_bytes());
        hasher.update(self.secret.expose_secret().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Check `signature` against the signature of `payload`.
    ///
    /// Hex case is ignored. The comparison runs in constant time once the
    /// lengths match.
    pub fn verify(&self, payload: &str, signature: &str) -> bool {
        let expected = self.sign(payload);
        let provided = signature.to_ascii_lowercase();

        if expected.len() != provided.len() {
            return false;
        }

        expected.as_bytes().ct_eq(provided.as_bytes()).into()
    }
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("secret", &"<REDACTED>")
            .finish()
    }
}
