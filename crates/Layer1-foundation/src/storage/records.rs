//! Row types for the store
//!
//! 타임스탬프는 모두 Unix epoch 밀리초 (i64)

use crate::codec::reduction_percent;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Cache entries
// ============================================================================

/// One persisted cache entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRecord {
    pub key: String,
    #[serde(skip)]
    pub payload: Vec<u8>,
    /// Codec that produced `payload`
    pub codec: String,
    /// SHA-256 of the uncompressed value
    pub checksum: String,
    pub original_size: u64,
    pub compressed_size: u64,
    pub created_at: i64,
    pub last_accessed_at: i64,
    pub hit_count: u64,
    /// Text form of a `SourceFingerprint`
    pub source_fingerprint: Option<String>,
    /// Hard expiry; `None` means read-time freshness only
    pub expires_at: Option<i64>,
}

impl EntryRecord {
    pub fn reduction_percent(&self) -> f64 {
        reduction_percent(self.original_size, self.compressed_size)
    }

    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Aggregate over all entries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entry_count: u64,
    pub total_original_bytes: u64,
    pub total_compressed_bytes: u64,
    pub aggregate_hit_count: u64,
}

impl CacheStats {
    /// Bytes kept out of storage by compression; 0 when compression grew the data
    pub fn bytes_saved(&self) -> u64 {
        self.total_original_bytes
            .saturating_sub(self.total_compressed_bytes)
    }

    pub fn reduction_percent(&self) -> f64 {
        reduction_percent(self.total_original_bytes, self.total_compressed_bytes)
    }
}

/// One row of the "most hit" listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopEntry {
    pub key: String,
    pub hit_count: u64,
    pub original_size: u64,
    pub compressed_size: u64,
    pub reduction_percent: f64,
    pub last_accessed_at: i64,
}

// ============================================================================
// Usage ledger
// ============================================================================

/// Outcome of one cache-touching operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Hit,
    Miss,
    Error,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Hit => "hit",
            Outcome::Miss => "miss",
            Outcome::Error => "error",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Outcome {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hit" => Ok(Outcome::Hit),
            "miss" => Ok(Outcome::Miss),
            "error" => Ok(Outcome::Error),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown outcome: {}",
                other
            ))),
        }
    }
}

/// Append-only ledger row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub session_id: String,
    pub operation: String,
    pub outcome: Outcome,
    pub tokens_saved: u64,
    pub duration_ms: u64,
    pub recorded_at: i64,
}

/// Which ledger rows an aggregate covers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageFilter {
    /// Inclusive lower bound on `recorded_at`
    pub since: Option<i64>,
    pub session_id: Option<String>,
}

impl UsageFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn since(mut self, at: i64) -> Self {
        self.since = Some(at);
        self
    }

    pub fn session(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }
}

/// Raw ledger aggregate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageTotals {
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
    pub tokens_saved: u64,
    pub duration_ms: u64,
}

impl UsageTotals {
    pub fn operations(&self) -> u64 {
        self.hits + self.misses + self.errors
    }
}
