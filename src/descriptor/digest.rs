//! SHA-256 content digests.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::Read;
use std::path::Path;
use thiserror::Error;

use crate::runtime::Runtime;

/// Length of a hex-encoded SHA-256 digest.
const DIGEST_HEX_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid SHA-256 digest: {reason}")]
pub struct InvalidDigest {
    reason: String,
}

/// A validated, lowercase, hex-encoded SHA-256 digest.
///
/// Uppercase input is accepted and normalized so that digests copied from
/// tools that print uppercase hex still compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Sha256Digest(String);

impl Sha256Digest {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for Sha256Digest {
    type Error = InvalidDigest;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let value = value.trim();
        if value.len() != DIGEST_HEX_LEN {
            return Err(InvalidDigest {
                reason: format!(
                    "expected {} hex characters, got {}",
                    DIGEST_HEX_LEN,
                    value.len()
                ),
            });
        }
        if let Some(bad) = value.chars().find(|c| !c.is_ascii_hexdigit()) {
            return Err(InvalidDigest {
                reason: format!("non-hex character '{}'", bad),
            });
        }
        Ok(Self(value.to_ascii_lowercase()))
    }
}

impl TryFrom<String> for Sha256Digest {
    type Error = InvalidDigest;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl From<Sha256Digest> for String {
    fn from(digest: Sha256Digest) -> Self {
        digest.0
    }
}

impl fmt::Display for Sha256Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Digest raw bytes.
pub fn sha256_bytes(bytes: &[u8]) -> Sha256Digest {
    Sha256Digest(format!("{:x}", Sha256::digest(bytes)))
}

/// Stream the file at `path` through SHA-256.
#[tracing::instrument(skip(runtime))]
pub fn compute_sha256<R: Runtime>(runtime: &R, path: &Path) -> Result<Sha256Digest> {
    let mut reader = runtime.open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let read = reader
            .read(&mut buffer)
            .with_context(|| format!("Failed to read {:?}", path))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(Sha256Digest(format!("{:x}", hasher.finalize())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::MockRuntime;

    // sha256("hello world")
    const HELLO_WORLD: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    #[test]
    fn test_accepts_lowercase_and_normalizes_uppercase() {
        let lower = Sha256Digest::try_from(HELLO_WORLD).unwrap();
        let upper = Sha256Digest::try_from(HELLO_WORLD.to_ascii_uppercase()).unwrap();
        assert_eq!(lower, upper);
        assert_eq!(upper.as_str(), HELLO_WORLD);
    }

    #[test]
    fn test_rejects_wrong_length_and_non_hex() {
        let err = Sha256Digest::try_from("PLACEHOLDER_SHA256").unwrap_err();
        assert!(err.to_string().contains("expected 64 hex characters, got 18"));

        let err = Sha256Digest::try_from("z".repeat(64)).unwrap_err();
        assert!(err.to_string().contains("non-hex character 'z'"));
    }

    #[test]
    fn test_sha256_bytes() {
        assert_eq!(sha256_bytes(b"hello world").as_str(), HELLO_WORLD);
    }

    #[test]
    fn test_compute_sha256_streams_through_runtime() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_open()
            .with(mockall::predicate::eq(Path::new("/tmp/archive.tar.gz")))
            .returning(|_| Ok(Box::new(std::io::Cursor::new(b"hello world".to_vec()))));

        let digest = compute_sha256(&runtime, Path::new("/tmp/archive.tar.gz")).unwrap();
        assert_eq!(digest.as_str(), HELLO_WORLD);
    }

    #[test]
    fn test_serde_validates_on_deserialize() {
        let ok: Sha256Digest = serde_json::from_str(&format!("\"{}\"", HELLO_WORLD)).unwrap();
        assert_eq!(serde_json::to_string(&ok).unwrap(), format!("\"{}\"", HELLO_WORLD));

        let bad: Result<Sha256Digest, _> = serde_json::from_str("\"abc\"");
        assert!(bad.is_err());
    }
}
