//! Cache key derivation
//!
//! Keys are SHA-256 over a length-prefixed encoding of the namespace and
//! every part, so part boundaries are significant: `["ab", "c"]` and
//! `["a", "bc"]` never collide.

use sha2::{Digest, Sha256};
use std::path::Path;

/// One input to a fingerprint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Part<'a> {
    Text(&'a str),
    Bytes(&'a [u8]),
}

impl Part<'_> {
    fn tag(&self) -> u8 {
        match self {
            Part::Text(_) => b's',
            Part::Bytes(_) => b'b',
        }
    }

    fn as_bytes(&self) -> &[u8] {
        match self {
            Part::Text(s) => s.as_bytes(),
            Part::Bytes(b) => b,
        }
    }
}

impl<'a> From<&'a str> for Part<'a> {
    fn from(s: &'a str) -> Self {
        Part::Text(s)
    }
}

impl<'a> From<&'a String> for Part<'a> {
    fn from(s: &'a String) -> Self {
        Part::Text(s.as_str())
    }
}

impl<'a> From<&'a [u8]> for Part<'a> {
    fn from(b: &'a [u8]) -> Self {
        Part::Bytes(b)
    }
}

impl<'a> From<&'a Vec<u8>> for Part<'a> {
    fn from(b: &'a Vec<u8>) -> Self {
        Part::Bytes(b.as_slice())
    }
}

impl<'a, const N: usize> From<&'a [u8; N]> for Part<'a> {
    fn from(b: &'a [u8; N]) -> Self {
        Part::Bytes(b.as_slice())
    }
}

/// Derive a cache key from a namespace and an ordered list of parts
///
/// Pure and total: empty namespaces and empty part lists are fine.
pub fn fingerprint<'a, I, P>(namespace: &str, parts: I) -> String
where
    I: IntoIterator<Item = P>,
    P: Into<Part<'a>>,
{
    let mut builder = FingerprintBuilder::new(namespace);
    for part in parts {
        builder.push(part.into());
    }
    builder.finish()
}

/// Incremental key builder for wrappers that gather inputs piecemeal
///
/// ```rust,ignore
/// let key = FingerprintBuilder::new("smart-build")
///     .file_contents(Path::new("tsconfig.json"))?
///     .option("incremental", "true")
///     .finish();
/// ```
#[derive(Clone)]
pub struct FingerprintBuilder {
    hasher: Sha256,
    parts: usize,
}

impl FingerprintBuilder {
    pub fn new(namespace: &str) -> Self {
        let mut hasher = Sha256::new();
        write_framed(&mut hasher, b'n', namespace.as_bytes());
        Self { hasher, parts: 0 }
    }

    pub fn push(&mut self, part: Part<'_>) -> &mut Self {
        write_framed(&mut self.hasher, part.tag(), part.as_bytes());
        self.parts += 1;
        self
    }

    pub fn part<'a>(mut self, part: impl Into<Part<'a>>) -> Self {
        self.push(part.into());
        self
    }

    /// Named option value; the name is part of the key
    pub fn option(self, name: &str, value: &str) -> Self {
        self.part(name).part(value)
    }

    /// Path plus full file contents
    pub fn file_contents(self, path: &Path) -> std::io::Result<Self> {
        let content = std::fs::read(path)?;
        let display = path.to_string_lossy();
        Ok(self.part(display.as_ref()).part(content.as_slice()))
    }

    /// Number of parts pushed so far
    pub fn len(&self) -> usize {
        self.parts
    }

    pub fn is_empty(&self) -> bool {
        self.parts == 0
    }

    /// Lowercase hex SHA-256 of everything pushed
    pub fn finish(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

fn write_framed(hasher: &mut Sha256, tag: u8, bytes: &[u8]) {
    hasher.update([tag]);
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}
