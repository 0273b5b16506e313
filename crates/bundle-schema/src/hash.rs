//! Typed wrapper around a validated SHA-256 hex digest.

use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

/// A validated SHA-256 digest: exactly 64 lowercase hex characters.
///
/// Deserialization validates the shape so that a malformed index entry is
/// rejected at parse time rather than surfacing as a confusing mismatch
/// later during download verification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Sha256Hex(String);

/// Error returned when a string does not look like a SHA-256 hex digest.
#[derive(Debug, thiserror::Error)]
#[error("invalid SHA-256 digest: expected 64 hex characters, got '{0}'")]
pub struct InvalidHash(String);

impl Sha256Hex {
    /// Validate and wrap a hex string.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidHash`] if `s` is not exactly 64 ASCII hex characters.
    pub fn parse(s: &str) -> Result<Self, InvalidHash> {
        if s.len() == 64 && s.chars().all(|c| c.is_ascii_hexdigit()) {
            Ok(Self(s.to_ascii_lowercase()))
        } else {
            Err(InvalidHash(s.to_string()))
        }
    }

    /// Hash is of the empty byte string — used in bootstrap fixtures and as
    /// the sentinel for "do not check content" during incidental file moves.
    pub fn of_empty() -> Self {
        Self::digest(&[])
    }

    /// Compute the digest of `data` directly.
    pub fn digest(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self(hex::encode(hasher.finalize()))
    }

    /// Compute the digest of a file's contents by streaming it in fixed-size
    /// chunks, never holding the whole file in memory.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be opened or read.
    pub fn digest_file(path: &Path) -> std::io::Result<Self> {
        use std::io::Read;
        let mut file = std::fs::File::open(path)?;
        let mut hasher = Sha256::new();
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(Self(hex::encode(hasher.finalize())))
    }

    /// Borrow the lowercase hex representation.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Sha256Hex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Sha256Hex {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for Sha256Hex {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_wrong_length() {
        assert!(Sha256Hex::parse("deadbeef").is_err());
    }

    #[test]
    fn rejects_non_hex() {
        let bad = "z".repeat(64);
        assert!(Sha256Hex::parse(&bad).is_err());
    }

    #[test]
    fn accepts_valid_digest() {
        let h = Sha256Hex::digest(b"hello");
        assert_eq!(h.as_str().len(), 64);
        assert!(Sha256Hex::parse(h.as_str()).is_ok());
    }

    #[test]
    fn empty_digest_matches_known_value() {
        // SHA-256 of the empty string.
        assert_eq!(
            Sha256Hex::of_empty().as_str(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b85"
        );
    }

    #[test]
    fn digest_file_streams_large_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.bin");
        std::fs::write(&path, b"hello").unwrap();
        let h = Sha256Hex::digest_file(&path).unwrap();
        assert_eq!(h, Sha256Hex::digest(b"hello"));
    }
}
