use core::fmt::{Display, Formatter, Result as FmtResult, Write};
use sha2::{Digest, Sha256};

/// A deterministic cache key derived from an operation name and its
/// significant arguments.
///
/// The key is a SHA-256 digest of `name|part|part|...`, hex-encoded to a
/// fixed 64 characters. Content-based hashing keeps the key stable across
/// processes, and the fixed length keeps it safe for backing stores with
/// key length or character restrictions.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Compose a key from a qualified operation name and the projected
    /// argument parts.
    #[must_use]
    pub fn compose(name: &str, parts: &[&dyn Display]) -> Self {
        let mut joined = String::from(name);
        for part in parts {
            // writing to a String cannot fail
            let _ = write!(joined, "|{part}");
        }
        let digest = Sha256::digest(joined.as_bytes());
        Self(hex::encode(digest))
    }

    /// The hex form of the key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.0)
    }
}
