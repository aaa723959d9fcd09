//! Content-addressed identity for frameworks, suites and tests
//!
//! Indices and pointers mean nothing after a relaunch, but the human-authored
//! titles do. A node's fingerprint is the SHA-256 digest of its parent's
//! fingerprint followed by its own text, so it covers every ancestor title.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;

/// Width of a fingerprint in bytes
pub const FINGERPRINT_SIZE: usize = 32;

/// Fixed-width digest identifying a node across process lifetimes
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Fingerprint([u8; FINGERPRINT_SIZE]);

impl Fingerprint {
    /// Fingerprint of a framework, from its short title and version
    pub fn of_framework(short_title: &str, version: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(short_title.as_bytes());
        hasher.update([0u8]);
        hasher.update(version.as_bytes());
        Self(hasher.finalize().into())
    }

    /// Fingerprint of a suite under `framework`
    pub fn of_suite(framework: &Fingerprint, title: &str) -> Self {
        Self::chained(framework, title)
    }

    /// Fingerprint of a test under `suite`
    pub fn of_test(suite: &Fingerprint, description: &str) -> Self {
        Self::chained(suite, description)
    }

    fn chained(parent: &Fingerprint, text: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(parent.0);
        hasher.update(text.as_bytes());
        Self(hasher.finalize().into())
    }

    pub fn from_bytes(bytes: [u8; FINGERPRINT_SIZE]) -> Self {
        Self(bytes)
    }

    /// Parse from a byte slice of exactly [`FINGERPRINT_SIZE`] bytes
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let bytes: [u8; FINGERPRINT_SIZE] = bytes.try_into().ok()?;
        Some(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; FINGERPRINT_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First eight hex digits, for file names and log lines
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.short())
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        let bytes = hex::decode(&text).map_err(serde::de::Error::custom)?;
        Fingerprint::from_slice(&bytes)
            .ok_or_else(|| serde::de::Error::custom("fingerprint must be 32 bytes"))
    }
}
