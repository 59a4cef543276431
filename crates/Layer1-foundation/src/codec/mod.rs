//! Compression Codec - 저장 페이로드 압축
//!
//! - `Codec`: compress / decompress 트레이트
//! - `GzipCodec`: flate2 gzip
//! - `IdentityCodec`: 무압축
//!
//! 각 엔트리에는 코덱 종류와 원본 SHA-256 체크섬이 함께 저장되며,
//! 둘 중 하나라도 맞지 않으면 `Error::CorruptPayload`로 처리됩니다.

mod gzip;

pub use gzip::GzipCodec;

use crate::config::{CompressionAlgorithm, CompressionSettings};
use crate::{Error, Result};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Persisted codec identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecKind {
    Gzip,
    Identity,
}

impl CodecKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodecKind::Gzip => "gzip",
            CodecKind::Identity => "identity",
        }
    }
}

impl fmt::Display for CodecKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CodecKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "gzip" => Ok(CodecKind::Gzip),
            "identity" => Ok(CodecKind::Identity),
            other => Err(Error::corrupt(format!("unknown codec: {}", other))),
        }
    }
}

/// Reversible payload transform
///
/// `decompress(compress(x)) == x` for every byte string, including empty.
pub trait Codec: Send + Sync {
    fn kind(&self) -> CodecKind;

    fn compress(&self, input: &[u8]) -> Result<Vec<u8>>;

    /// Malformed input is `Error::CorruptPayload`
    fn decompress(&self, input: &[u8]) -> Result<Vec<u8>>;

    /// Compress and report both sizes
    fn encode(&self, input: &[u8]) -> Result<Compressed> {
        let bytes = self.compress(input)?;
        Ok(Compressed {
            original_size: input.len() as u64,
            compressed_size: bytes.len() as u64,
            bytes,
        })
    }
}

/// Codec output with its size accounting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compressed {
    pub bytes: Vec<u8>,
    pub original_size: u64,
    pub compressed_size: u64,
}

impl Compressed {
    /// Negative when the payload grew
    pub fn reduction_percent(&self) -> f64 {
        reduction_percent(self.original_size, self.compressed_size)
    }
}

/// Store-as-is codec
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityCodec;

impl Codec for IdentityCodec {
    fn kind(&self) -> CodecKind {
        CodecKind::Identity
    }

    fn compress(&self, input: &[u8]) -> Result<Vec<u8>> {
        Ok(input.to_vec())
    }

    fn decompress(&self, input: &[u8]) -> Result<Vec<u8>> {
        Ok(input.to_vec())
    }
}

/// Codec selected by configuration
pub fn from_settings(settings: &CompressionSettings) -> Box<dyn Codec> {
    match settings.algorithm {
        CompressionAlgorithm::Gzip => Box::new(GzipCodec::new(settings.level)),
        CompressionAlgorithm::None => Box::new(IdentityCodec),
    }
}

/// SHA-256 of the uncompressed value, lowercase hex
pub fn checksum(value: &[u8]) -> String {
    hex::encode(Sha256::digest(value))
}

/// Decode a stored payload and verify it against its recorded codec and checksum
pub fn decode_verified(
    codec: &dyn Codec,
    stored_kind: &str,
    payload: &[u8],
    expected_checksum: &str,
) -> Result<Vec<u8>> {
    let kind: CodecKind = stored_kind.parse()?;
    if kind != codec.kind() {
        return Err(Error::corrupt(format!(
            "payload written with {}, reader uses {}",
            kind,
            codec.kind()
        )));
    }

    let value = codec.decompress(payload)?;
    if checksum(&value) != expected_checksum {
        return Err(Error::corrupt("checksum mismatch"));
    }
    Ok(value)
}

/// `(1 - compressed / original) * 100`; 0 for empty originals
pub fn reduction_percent(original_size: u64, compressed_size: u64) -> f64 {
    if original_size == 0 {
        return 0.0;
    }
    (1.0 - compressed_size as f64 / original_size as f64) * 100.0
}
