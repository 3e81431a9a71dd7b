//! Request fingerprints
//!
//! A fingerprint captures the logical content of a mutating request so the
//! gate can tell a retry (same key, same fingerprint) from key misuse (same
//! key, different fingerprint).

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 over method, path and canonical JSON body.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint a request.
    ///
    /// `serde_json::Value` keeps object keys in a `BTreeMap`, so two bodies
    /// that differ only in key order serialize identically.
    pub fn of_request(method: &str, path: &str, body: &serde_json::Value) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(method.to_ascii_uppercase().as_bytes());
        hasher.update([0u8]);
        hasher.update(path.as_bytes());
        hasher.update([0u8]);
        hasher.update(body.to_string().as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Rebuild from a stored hex digest.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
