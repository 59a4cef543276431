//! Engine value types

use crate::freshness::StaleReason;
use chrono::{DateTime, Utc};
use serde::Serialize;
use smartcache_foundation::SourceFingerprint;
use std::time::Duration;

/// A served cache entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CachedValue {
    #[serde(skip)]
    pub value: Vec<u8>,
    /// Declared logical size at `set`
    pub original_size: u64,
    /// Bytes actually stored
    pub compressed_size: u64,
    pub created_at: DateTime<Utc>,
    /// Includes this hit
    pub last_accessed_at: DateTime<Utc>,
    /// Includes this hit
    pub hit_count: u64,
    #[serde(serialize_with = "serialize_source")]
    pub source_fingerprint: Option<SourceFingerprint>,
}

impl CachedValue {
    pub fn into_value(self) -> Vec<u8> {
        self.value
    }

    /// Lossy UTF-8 view of the value
    pub fn text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.value)
    }
}

fn serialize_source<S>(source: &Option<SourceFingerprint>, s: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match source {
        Some(fp) => s.serialize_some(&fp.to_string()),
        None => s.serialize_none(),
    }
}

/// Outcome of a freshness-checked read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Hit(CachedValue),
    Miss,
    Stale(StaleReason),
}

impl Lookup {
    pub fn is_hit(&self) -> bool {
        matches!(self, Lookup::Hit(_))
    }

    /// Stale collapses to absent
    pub fn into_value(self) -> Option<CachedValue> {
        match self {
            Lookup::Hit(value) => Some(value),
            Lookup::Miss | Lookup::Stale(_) => None,
        }
    }

    pub fn as_hit(&self) -> Option<&CachedValue> {
        match self {
            Lookup::Hit(value) => Some(value),
            _ => None,
        }
    }
}

/// Optional metadata for `set_with`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Logical size to report; defaults to the value's length
    pub original_size: Option<u64>,
    /// Fingerprint of the source the value was derived from
    pub source: Option<SourceFingerprint>,
    /// Hard expiry measured from now
    pub expires_in: Option<Duration>,
}

impl SetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn original_size(mut self, size: u64) -> Self {
        self.original_size = Some(size);
        self
    }

    pub fn source(mut self, source: SourceFingerprint) -> Self {
        self.source = Some(source);
        self
    }

    pub fn expires_in(mut self, ttl: Duration) -> Self {
        self.expires_in = Some(ttl);
        self
    }
}

/// Sizes recorded by a `set`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoredSizes {
    pub original_size: u64,
    pub compressed_size: u64,
}
