//! Source fingerprints for content-based freshness

use sha2::{Digest, Sha256};
use std::fmt;
use std::io;
use std::path::Path;
use std::str::FromStr;
use std::time::UNIX_EPOCH;

const CONTENT_PREFIX: &str = "sha256:";
const MTIME_PREFIX: &str = "mtime:";

/// Snapshot of a cached entry's underlying source
///
/// Persisted as `sha256:<hex>` or `mtime:<unix millis>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceFingerprint {
    /// SHA-256 of the source bytes (lowercase hex)
    ContentHash(String),
    /// Modification time in Unix epoch milliseconds
    Modified(i64),
}

impl SourceFingerprint {
    /// Hash arbitrary source bytes
    pub fn of_bytes(bytes: &[u8]) -> Self {
        SourceFingerprint::ContentHash(hex::encode(Sha256::digest(bytes)))
    }

    /// Hash a file's contents; `Ok(None)` when the file is gone
    pub fn of_file_contents(path: &Path) -> io::Result<Option<Self>> {
        match std::fs::read(path) {
            Ok(bytes) => Ok(Some(Self::of_bytes(&bytes))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// File modification time; `Ok(None)` when the file is gone
    pub fn of_file_mtime(path: &Path) -> io::Result<Option<Self>> {
        let metadata = match std::fs::metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        let millis = match metadata.modified()?.duration_since(UNIX_EPOCH) {
            Ok(d) => i64::try_from(d.as_millis()).unwrap_or(i64::MAX),
            Err(before_epoch) => {
                -i64::try_from(before_epoch.duration().as_millis()).unwrap_or(i64::MAX)
            }
        };
        Ok(Some(SourceFingerprint::Modified(millis)))
    }

    pub fn is_content_hash(&self) -> bool {
        matches!(self, SourceFingerprint::ContentHash(_))
    }
}

impl fmt::Display for SourceFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceFingerprint::ContentHash(hash) => write!(f, "{}{}", CONTENT_PREFIX, hash),
            SourceFingerprint::Modified(millis) => write!(f, "{}{}", MTIME_PREFIX, millis),
        }
    }
}

impl FromStr for SourceFingerprint {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(hash) = s.strip_prefix(CONTENT_PREFIX) {
            if hash.is_empty() || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(crate::Error::InvalidInput(format!(
                    "malformed content hash: {}",
                    s
                )));
            }
            return Ok(SourceFingerprint::ContentHash(hash.to_ascii_lowercase()));
        }

        if let Some(millis) = s.strip_prefix(MTIME_PREFIX) {
            return millis
                .parse::<i64>()
                .map(SourceFingerprint::Modified)
                .map_err(|_| crate::Error::InvalidInput(format!("malformed mtime: {}", s)));
        }

        Err(crate::Error::InvalidInput(format!(
            "unknown source fingerprint: {}",
            s
        )))
    }
}
