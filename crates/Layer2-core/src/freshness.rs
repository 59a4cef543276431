//! Freshness Oracle - 캐시 엔트리 신선도 판정
//!
//! 호출자가 정책을 고릅니다:
//! - 나이 기반: `now - created_at <= max_age`
//! - 내용 기반: 저장 시점의 소스 지문 == 현재 소스 지문
//!
//! 삭제된 소스는 에러가 아니라 항상 stale 입니다.

use smartcache_foundation::clock::duration_to_millis;
use smartcache_foundation::{EntryRecord, SourceFingerprint, TtlPreset};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Caller-selected freshness requirement for one read
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FreshnessPolicy {
    /// Any stored entry is usable (hard expiry still applies)
    #[default]
    Unchecked,

    /// Fresh while `now - created_at <= max_age`
    MaxAge(Duration),

    /// Fresh while the live source matches the fingerprint stored at `set`.
    /// `live: None` means the source no longer exists.
    Content { live: Option<SourceFingerprint> },

    /// Both of the above
    AgeAndContent {
        max_age: Duration,
        live: Option<SourceFingerprint>,
    },
}

impl FreshnessPolicy {
    pub fn max_age(max_age: Duration) -> Self {
        Self::MaxAge(max_age)
    }

    pub fn content(live: Option<SourceFingerprint>) -> Self {
        Self::Content { live }
    }

    pub fn age_and_content(max_age: Duration, live: Option<SourceFingerprint>) -> Self {
        Self::AgeAndContent { max_age, live }
    }

    pub fn preset(preset: TtlPreset) -> Self {
        Self::MaxAge(preset.duration())
    }

    /// Content policy against a file's current bytes
    pub fn file_contents(path: &Path) -> std::io::Result<Self> {
        Ok(Self::content(SourceFingerprint::of_file_contents(path)?))
    }

    /// Content policy against a file's current modification time
    pub fn file_mtime(path: &Path) -> std::io::Result<Self> {
        Ok(Self::content(SourceFingerprint::of_file_mtime(path)?))
    }

    fn age_limit(&self) -> Option<Duration> {
        match self {
            Self::MaxAge(max_age) | Self::AgeAndContent { max_age, .. } => Some(*max_age),
            _ => None,
        }
    }

    fn live_source(&self) -> Option<Option<&SourceFingerprint>> {
        match self {
            Self::Content { live } | Self::AgeAndContent { live, .. } => Some(live.as_ref()),
            _ => None,
        }
    }
}

/// Why an entry was not served
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StaleReason {
    /// Older than the caller's max age
    Expired,
    /// Past the write-time `expires_at`
    HardExpired,
    /// Live source differs from the stored fingerprint
    SourceChanged,
    /// Source was deleted since caching
    SourceMissing,
    /// Content check requested but nothing was stored to compare against
    NoStoredFingerprint,
}

impl StaleReason {
    /// Dangling entries are deleted; the rest wait to be overwritten
    pub fn removes_entry(&self) -> bool {
        matches!(self, StaleReason::HardExpired | StaleReason::SourceMissing)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StaleReason::Expired => "expired",
            StaleReason::HardExpired => "hard_expired",
            StaleReason::SourceChanged => "source_changed",
            StaleReason::SourceMissing => "source_missing",
            StaleReason::NoStoredFingerprint => "no_stored_fingerprint",
        }
    }
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Fresh,
    Stale(StaleReason),
}

impl Verdict {
    pub fn is_fresh(&self) -> bool {
        matches!(self, Verdict::Fresh)
    }
}

/// Stateless freshness judge
pub struct FreshnessOracle;

impl FreshnessOracle {
    /// Judge `entry` at `now` (Unix millis)
    ///
    /// Order: hard expiry, missing source, content, age.
    pub fn evaluate(entry: &EntryRecord, policy: &FreshnessPolicy, now: i64) -> Verdict {
        if entry.is_expired_at(now) {
            return Verdict::Stale(StaleReason::HardExpired);
        }

        if let Some(live) = policy.live_source() {
            let Some(live) = live else {
                return Verdict::Stale(StaleReason::SourceMissing);
            };
            let Some(stored) = entry.source_fingerprint.as_deref() else {
                return Verdict::Stale(StaleReason::NoStoredFingerprint);
            };
            let stored = stored.parse::<SourceFingerprint>().ok();
            if !is_fresh(stored.as_ref(), Some(live)) {
                return Verdict::Stale(StaleReason::SourceChanged);
            }
        }

        if let Some(max_age) = policy.age_limit() {
            let age = now.saturating_sub(entry.created_at).max(0);
            if age > duration_to_millis(max_age) {
                return Verdict::Stale(StaleReason::Expired);
            }
        }

        Verdict::Fresh
    }
}

/// Bare content predicate: fresh iff both fingerprints exist and match
pub fn is_fresh(stored: Option<&SourceFingerprint>, live: Option<&SourceFingerprint>) -> bool {
    match (stored, live) {
        (Some(stored), Some(live)) => stored == live,
        _ => false,
    }
}
