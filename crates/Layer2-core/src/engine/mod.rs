//! Cache Engine - 캐시 엔진 façade
//!
//! 호출자가 직접 다루는 유일한 컴포넌트:
//! - `get` / `get_fresh`: 조회 + 신선도 판정 + 압축 해제 + 히트 기록
//! - `set` / `set_with`: 압축 후 저장 (같은 키는 완전히 교체)
//! - `stats` / `top_entries`: 집계
//! - `close`: 버퍼 flush 후 핸들 해제
//!
//! The engine always compresses the raw bytes it is given. Callers never
//! hand it pre-compressed payloads; `SetOptions::original_size` only changes
//! the size reported for savings.
//!
//! # Example
//!
//! ```rust,ignore
//! let engine = CacheEngine::open(&CacheSettings::load()?)?;
//! let key = fingerprint("smart-test", [config.as_str(), "--coverage"]);
//!
//! if let Some(hit) = engine.get_with_max_age(&key, TtlPreset::Analysis.duration())? {
//!     return Ok(hit.into_value());
//! }
//!
//! let output = run_tests()?;
//! engine.set(&key, &output)?;
//! ```

mod access;
mod builder;
mod types;

pub use builder::CacheEngineBuilder;
pub use types::{CachedValue, Lookup, SetOptions, StoredSizes};

use crate::freshness::{FreshnessOracle, FreshnessPolicy, Verdict};
use access::AccessBuffer;
use parking_lot::Mutex;
use smartcache_foundation::clock::{duration_to_millis, millis_to_datetime};
use smartcache_foundation::codec::{self, Codec, CodecKind};
use smartcache_foundation::{
    CacheSettings, CacheStats, Clock, EntryRecord, Error, Result, Store, TopEntry,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Persistent, compressed key/value cache with access accounting
pub struct CacheEngine {
    store: Arc<Store>,
    codec: Box<dyn Codec>,
    clock: Arc<dyn Clock>,
    flush_every: u32,
    max_entries: Option<u64>,
    degrade_reads: bool,
    access: Mutex<AccessBuffer>,
}

impl CacheEngine {
    pub fn builder() -> CacheEngineBuilder {
        CacheEngineBuilder::new()
    }

    /// Open the store configured by `settings`
    pub fn open(settings: &CacheSettings) -> Result<Self> {
        CacheEngineBuilder::from_settings(settings).open()
    }

    /// Create an in-memory engine (for testing)
    pub fn in_memory() -> Result<Self> {
        CacheEngineBuilder::new().in_memory()
    }

    /// Shared store handle, e.g. for a `UsageLedger` on the same file
    pub fn store(&self) -> Arc<Store> {
        Arc::clone(&self.store)
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    pub fn codec_kind(&self) -> CodecKind {
        self.codec.kind()
    }

    pub fn is_closed(&self) -> bool {
        self.store.is_closed()
    }

    // ========================================================================
    // Read
    // ========================================================================

    /// Stored value without any freshness check (hard expiry still applies)
    pub fn get(&self, key: &str) -> Result<Option<CachedValue>> {
        Ok(self.get_fresh(key, &FreshnessPolicy::Unchecked)?.into_value())
    }

    /// Stored value if it is no older than `max_age`
    pub fn get_with_max_age(&self, key: &str, max_age: Duration) -> Result<Option<CachedValue>> {
        Ok(self
            .get_fresh(key, &FreshnessPolicy::MaxAge(max_age))?
            .into_value())
    }

    /// Look up `key` and judge it against `policy`
    ///
    /// - Absent: `Lookup::Miss`, no side effects
    /// - Corrupt payload: entry removed, `Lookup::Miss`
    /// - Stale: `Lookup::Stale`, hit count untouched; entries whose source
    ///   is gone or whose hard expiry passed are removed
    /// - Fresh: hit recorded, `Lookup::Hit`
    pub fn get_fresh(&self, key: &str, policy: &FreshnessPolicy) -> Result<Lookup> {
        match self.lookup(key, policy) {
            Err(e @ Error::StoreUnavailable { .. }) if self.degrade_reads => {
                warn!(key, error = %e, "store unavailable; treating read as a miss");
                Ok(Lookup::Miss)
            }
            other => other,
        }
    }

    fn lookup(&self, key: &str, policy: &FreshnessPolicy) -> Result<Lookup> {
        let Some(entry) = self.store.fetch(key)? else {
            debug!(key, "cache miss");
            return Ok(Lookup::Miss);
        };

        let now = self.clock.now_millis();
        if let Verdict::Stale(reason) = FreshnessOracle::evaluate(&entry, policy, now) {
            debug!(key, reason = %reason, "cache entry stale");
            if reason.removes_entry() {
                self.discard(key);
            }
            return Ok(Lookup::Stale(reason));
        }

        let value = match codec::decode_verified(
            self.codec.as_ref(),
            &entry.codec,
            &entry.payload,
            &entry.checksum,
        ) {
            Ok(value) => value,
            Err(Error::CorruptPayload(reason)) => {
                warn!(key, reason = %reason, "corrupt cache entry; removing");
                self.discard(key);
                return Ok(Lookup::Miss);
            }
            Err(e) => return Err(e),
        };

        let hit = self.record_hit(&entry, value, now);
        debug!(key, hits = hit.hit_count, bytes = hit.value.len(), "cache hit");
        Ok(Lookup::Hit(hit))
    }

    fn record_hit(&self, entry: &EntryRecord, value: Vec<u8>, now: i64) -> CachedValue {
        let (pending, flush) = {
            let mut access = self.access.lock();
            let pending = access.record(&entry.key, now);
            (pending, access.should_flush(self.flush_every))
        };

        if flush {
            if let Err(e) = self.flush() {
                warn!(key = %entry.key, error = %e, "failed to flush access bookkeeping");
            }
        }

        CachedValue {
            value,
            original_size: entry.original_size,
            compressed_size: entry.compressed_size,
            created_at: millis_to_datetime(entry.created_at),
            last_accessed_at: millis_to_datetime(entry.last_accessed_at.max(pending.last_at)),
            hit_count: entry.hit_count + pending.hits,
            source_fingerprint: entry
                .source_fingerprint
                .as_deref()
                .and_then(|s| s.parse().ok()),
        }
    }

    /// Best-effort removal of a dead entry during a read
    fn discard(&self, key: &str) {
        self.access.lock().forget(key);
        if let Err(e) = self.store.remove(key) {
            warn!(key, error = %e, "failed to remove dead cache entry");
        }
    }

    // ========================================================================
    // Write
    // ========================================================================

    /// Store `value` under `key`, replacing any previous entry
    pub fn set(&self, key: &str, value: &[u8]) -> Result<StoredSizes> {
        self.set_with(key, value, SetOptions::default())
    }

    /// Store `value` with explicit metadata
    ///
    /// Replacement resets `created_at` and `hit_count`.
    pub fn set_with(&self, key: &str, value: &[u8], options: SetOptions) -> Result<StoredSizes> {
        if key.is_empty() {
            return Err(Error::InvalidInput("cache key must not be empty".to_string()));
        }

        let encoded = self.codec.encode(value)?;
        let now = self.clock.now_millis();
        let sizes = StoredSizes {
            original_size: options.original_size.unwrap_or(encoded.original_size),
            compressed_size: encoded.compressed_size,
        };

        let record = EntryRecord {
            key: key.to_string(),
            payload: encoded.bytes,
            codec: self.codec.kind().as_str().to_string(),
            checksum: codec::checksum(value),
            original_size: sizes.original_size,
            compressed_size: sizes.compressed_size,
            created_at: now,
            last_accessed_at: now,
            hit_count: 0,
            source_fingerprint: options.source.as_ref().map(ToString::to_string),
            expires_at: options
                .expires_in
                .map(|ttl| now.saturating_add(duration_to_millis(ttl))),
        };

        self.access.lock().forget(key);
        self.store.put(&record)?;

        if let Some(max_entries) = self.max_entries {
            if let Err(e) = self.store.evict_lru(max_entries) {
                warn!(error = %e, "failed to evict least recently used entries");
            }
        }

        Ok(sizes)
    }

    /// Returns whether an entry was removed
    pub fn remove(&self, key: &str) -> Result<bool> {
        self.access.lock().forget(key);
        self.store.remove(key)
    }

    // ========================================================================
    // Aggregates & Maintenance
    // ========================================================================

    pub fn stats(&self) -> Result<CacheStats> {
        self.flush_quietly();
        self.store.stats()
    }

    pub fn top_entries(&self, limit: u32) -> Result<Vec<TopEntry>> {
        self.flush_quietly();
        self.store.top_entries(limit)
    }

    /// Remove entries created more than `age` ago
    pub fn prune_older_than(&self, age: Duration) -> Result<usize> {
        let cutoff = self
            .clock
            .now_millis()
            .saturating_sub(duration_to_millis(age));
        self.store.prune_older_than(cutoff)
    }

    /// Remove entries past their hard expiry
    pub fn purge_expired(&self) -> Result<usize> {
        self.store.purge_expired(self.clock.now_millis())
    }

    pub fn clear(&self) -> Result<usize> {
        self.access.lock().clear();
        self.store.clear()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Write buffered access bookkeeping
    ///
    /// Rows that fail to write stay buffered for the next flush.
    pub fn flush(&self) -> Result<()> {
        let rows = {
            let mut access = self.access.lock();
            if access.is_empty() {
                return Ok(());
            }
            access.drain()
        };

        if let Err(e) = self.store.record_accesses(&rows) {
            self.access.lock().restore(rows);
            return Err(e);
        }
        debug!(entries = rows.len(), "flushed access bookkeeping");
        Ok(())
    }

    fn flush_quietly(&self) {
        if let Err(e) = self.flush() {
            warn!(error = %e, "failed to flush access bookkeeping");
        }
    }

    /// Flush and release the store. Idempotent.
    pub fn close(&self) -> Result<()> {
        if self.store.is_closed() {
            return Ok(());
        }
        self.flush_quietly();
        self.store.close()
    }
}

impl Drop for CacheEngine {
    fn drop(&mut self) {
        if !self.store.is_closed() {
            self.flush_quietly();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::freshness::StaleReason;
    use smartcache_foundation::{GzipCodec, IdentityCodec, ManualClock, SourceFingerprint};

    const T0: i64 = 1_700_000_000_000;

    fn engine_with_clock() -> (CacheEngine, ManualClock) {
        let clock = ManualClock::new(T0);
        let engine = CacheEngine::builder()
            .clock(Arc::new(clock.clone()))
            .in_memory()
            .unwrap();
        (engine, clock)
    }

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| b"abcdefghij"[i % 10]).collect()
    }

    #[test]
    fn test_ttl_scenario_k1() {
        let (engine, clock) = engine_with_clock();
        let ttl = Duration::from_secs(3600);
        let value = payload(1250);

        engine.set("k1", &value).unwrap();

        let hit = engine.get_with_max_age("k1", ttl).unwrap().expect("hit");
        assert_eq!(hit.value, value);
        assert_eq!(hit.hit_count, 1);

        clock.advance(ttl + Duration::from_millis(1));
        assert!(engine.get_with_max_age("k1", ttl).unwrap().is_none());

        let stored = engine.store().fetch("k1").unwrap().expect("age-stale entry kept");
        assert_eq!(stored.hit_count, 1);
    }

    #[test]
    fn test_age_boundary() {
        let (engine, clock) = engine_with_clock();
        let ttl = Duration::from_secs(300);
        engine.set("k", b"analysis").unwrap();

        clock.set(T0 + 300_000 - 1);
        assert!(engine.get_with_max_age("k", ttl).unwrap().is_some());

        clock.set(T0 + 300_000 + 1);
        assert_eq!(
            engine.get_fresh("k", &FreshnessPolicy::max_age(ttl)).unwrap(),
            Lookup::Stale(StaleReason::Expired)
        );
    }

    #[test]
    fn test_overwrite_scenario_k2() {
        let engine = CacheEngine::in_memory().unwrap();
        engine.set("k2", b"payload A").unwrap();
        engine.set("k2", b"payload B").unwrap();

        assert_eq!(engine.get("k2").unwrap().unwrap().value, b"payload B");
    }

    #[test]
    fn test_idempotent_overwrite() {
        let engine = CacheEngine::in_memory().unwrap();
        let value = payload(4096);

        let first = engine.set("k", &value).unwrap();
        let second = engine.set("k", &value).unwrap();

        assert_eq!(first, second);
        let hit = engine.get("k").unwrap().unwrap();
        assert_eq!(hit.value, value);
        assert_eq!(hit.original_size, first.original_size);
        assert_eq!(hit.compressed_size, first.compressed_size);
    }

    #[test]
    fn test_empty_value_roundtrip() {
        let engine = CacheEngine::in_memory().unwrap();
        let sizes = engine.set("empty", b"").unwrap();
        assert_eq!(sizes.original_size, 0);
        assert_eq!(engine.get("empty").unwrap().unwrap().value, Vec::<u8>::new());
    }

    #[test]
    fn test_miss_has_no_side_effects() {
        let engine = CacheEngine::in_memory().unwrap();
        assert_eq!(engine.get_fresh("absent", &FreshnessPolicy::Unchecked).unwrap(), Lookup::Miss);
        assert_eq!(engine.stats().unwrap(), CacheStats::default());
    }

    #[test]
    fn test_hit_accounting() {
        let (engine, clock) = engine_with_clock();
        engine.set("k", b"docker ps").unwrap();

        let mut last_seen = None;
        for n in 1..=5u64 {
            clock.advance(Duration::from_secs(1));
            let hit = engine.get("k").unwrap().unwrap();
            assert_eq!(hit.hit_count, n);
            if let Some(previous) = last_seen {
                assert!(hit.last_accessed_at > previous);
            }
            last_seen = Some(hit.last_accessed_at);
        }

        let stored = engine.store().fetch("k").unwrap().unwrap();
        assert_eq!(stored.hit_count, 5);
        assert_eq!(stored.last_accessed_at, T0 + 5_000);
    }

    #[test]
    fn test_set_resets_accounting() {
        let (engine, clock) = engine_with_clock();
        engine.set("k", b"v1").unwrap();
        engine.get("k").unwrap();
        engine.get("k").unwrap();

        clock.advance(Duration::from_secs(10));
        engine.set("k", b"v2").unwrap();

        let hit = engine.get("k").unwrap().unwrap();
        assert_eq!(hit.hit_count, 1);
        assert_eq!(hit.created_at.timestamp_millis(), T0 + 10_000);
    }

    #[test]
    fn test_buffered_bookkeeping() {
        let clock = ManualClock::new(T0);
        let engine = CacheEngine::builder()
            .clock(Arc::new(clock.clone()))
            .flush_every(3)
            .in_memory()
            .unwrap();
        engine.set("k", b"value").unwrap();

        assert_eq!(engine.get("k").unwrap().unwrap().hit_count, 1);
        assert_eq!(engine.get("k").unwrap().unwrap().hit_count, 2);
        assert_eq!(engine.store().fetch("k").unwrap().unwrap().hit_count, 0);

        assert_eq!(engine.get("k").unwrap().unwrap().hit_count, 3);
        assert_eq!(engine.store().fetch("k").unwrap().unwrap().hit_count, 3);

        engine.get("k").unwrap();
        assert_eq!(engine.stats().unwrap().aggregate_hit_count, 4);
    }

    #[test]
    fn test_content_change_invalidates() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("tsconfig.json");
        std::fs::write(&source, r#"{"strict":false}"#).unwrap();

        let engine = CacheEngine::in_memory().unwrap();
        let fp = SourceFingerprint::of_file_contents(&source).unwrap().unwrap();
        engine
            .set_with("build", b"0 errors", SetOptions::new().source(fp.clone()))
            .unwrap();

        let policy = FreshnessPolicy::file_contents(&source).unwrap();
        let hit = engine.get_fresh("build", &policy).unwrap();
        assert_eq!(hit.as_hit().unwrap().source_fingerprint, Some(fp));

        std::fs::write(&source, r#"{"strict":true}"#).unwrap();
        let policy = FreshnessPolicy::file_contents(&source).unwrap();
        assert_eq!(
            engine.get_fresh("build", &policy).unwrap(),
            Lookup::Stale(StaleReason::SourceChanged)
        );
        assert!(engine.store().fetch("build").unwrap().is_some());
    }

    #[test]
    fn test_deleted_source_removes_entry() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("app.ts");
        std::fs::write(&source, "export {}").unwrap();

        let engine = CacheEngine::in_memory().unwrap();
        let fp = SourceFingerprint::of_file_mtime(&source).unwrap().unwrap();
        engine
            .set_with("symbols", b"[]", SetOptions::new().source(fp))
            .unwrap();

        std::fs::remove_file(&source).unwrap();
        let policy = FreshnessPolicy::file_mtime(&source).unwrap();
        assert_eq!(
            engine.get_fresh("symbols", &policy).unwrap(),
            Lookup::Stale(StaleReason::SourceMissing)
        );
        assert!(engine.store().fetch("symbols").unwrap().is_none());
    }

    #[test]
    fn test_corruption_self_heals() {
        let engine = CacheEngine::in_memory().unwrap();
        engine.set("k", &payload(1250)).unwrap();

        let mut record = engine.store().fetch("k").unwrap().unwrap();
        let mid = record.payload.len() / 2;
        record.payload.truncate(mid);
        engine.store().put(&record).unwrap();

        assert!(engine.get("k").unwrap().is_none());
        assert!(engine.store().fetch("k").unwrap().is_none());

        engine.set("k", b"recovered").unwrap();
        assert_eq!(engine.get("k").unwrap().unwrap().value, b"recovered");
    }

    #[test]
    fn test_checksum_mismatch_is_miss() {
        let engine = CacheEngine::builder()
            .codec(IdentityCodec)
            .in_memory()
            .unwrap();
        engine.set("k", b"lint: 0 problems").unwrap();

        let mut record = engine.store().fetch("k").unwrap().unwrap();
        record.payload[0] ^= 0x20;
        engine.store().put(&record).unwrap();

        assert!(engine.get("k").unwrap().is_none());
    }

    #[test]
    fn test_codec_mismatch_is_miss() {
        let store = Arc::new(Store::in_memory().unwrap());
        let gzip = CacheEngine::builder()
            .codec(GzipCodec::new(9))
            .with_store(Arc::clone(&store))
            .unwrap();
        gzip.set("k", b"written with gzip").unwrap();

        let identity = CacheEngine::builder()
            .codec(IdentityCodec)
            .with_store(Arc::clone(&store))
            .unwrap();
        assert!(identity.get("k").unwrap().is_none());
        assert!(store.fetch("k").unwrap().is_none());
    }

    #[test]
    fn test_hard_expiry() {
        let (engine, clock) = engine_with_clock();
        engine
            .set_with("ps", b"pid list", SetOptions::new().expires_in(Duration::from_secs(60)))
            .unwrap();
        engine.set("keep", b"no expiry").unwrap();

        clock.advance(Duration::from_secs(59));
        assert!(engine.get("ps").unwrap().is_some());

        clock.advance(Duration::from_secs(1));
        assert_eq!(
            engine.get_fresh("ps", &FreshnessPolicy::Unchecked).unwrap(),
            Lookup::Stale(StaleReason::HardExpired)
        );
        assert!(engine.store().fetch("ps").unwrap().is_none());
        assert_eq!(engine.purge_expired().unwrap(), 0);
        assert!(engine.get("keep").unwrap().is_some());
    }

    #[test]
    fn test_purge_expired() {
        let (engine, clock) = engine_with_clock();
        engine
            .set_with("a", b"1", SetOptions::new().expires_in(Duration::from_secs(5)))
            .unwrap();
        clock.advance(Duration::from_secs(6));
        assert_eq!(engine.purge_expired().unwrap(), 1);
    }

    #[test]
    fn test_declared_original_size() {
        let engine = CacheEngine::in_memory().unwrap();
        let summary = b"12 passed, 0 failed";
        let sizes = engine
            .set_with("tests", summary, SetOptions::new().original_size(48_000))
            .unwrap();

        assert_eq!(sizes.original_size, 48_000);
        let stats = engine.stats().unwrap();
        assert_eq!(stats.total_original_bytes, 48_000);
        assert_eq!(stats.total_compressed_bytes, sizes.compressed_size);
    }

    #[test]
    fn test_stats_and_top_entries() {
        let engine = CacheEngine::in_memory().unwrap();
        engine.set("a", &payload(2000)).unwrap();
        engine.set("b", &payload(100)).unwrap();
        engine.get("b").unwrap();
        engine.get("b").unwrap();
        engine.get("a").unwrap();

        let stats = engine.stats().unwrap();
        assert_eq!(stats.entry_count, 2);
        assert_eq!(stats.total_original_bytes, 2100);
        assert_eq!(stats.aggregate_hit_count, 3);
        assert!(stats.total_compressed_bytes < stats.total_original_bytes);

        let top = engine.top_entries(5).unwrap();
        assert_eq!(top[0].key, "b");
        assert_eq!(top[0].hit_count, 2);
    }

    #[test]
    fn test_max_entries_evicts_lru() {
        let clock = ManualClock::new(T0);
        let engine = CacheEngine::builder()
            .clock(Arc::new(clock.clone()))
            .max_entries(2)
            .in_memory()
            .unwrap();

        engine.set("a", b"1").unwrap();
        clock.advance(Duration::from_secs(1));
        engine.set("b", b"2").unwrap();
        clock.advance(Duration::from_secs(1));
        engine.get("a").unwrap();
        clock.advance(Duration::from_secs(1));
        engine.set("c", b"3").unwrap();

        assert!(engine.get("b").unwrap().is_none());
        assert!(engine.get("a").unwrap().is_some());
        assert!(engine.get("c").unwrap().is_some());
    }

    #[test]
    fn test_prune_older_than() {
        let (engine, clock) = engine_with_clock();
        engine.set("old", b"1").unwrap();
        clock.advance(Duration::from_secs(7200));
        engine.set("new", b"2").unwrap();

        assert_eq!(engine.prune_older_than(Duration::from_secs(3600)).unwrap(), 1);
        assert!(engine.get("new").unwrap().is_some());
    }

    #[test]
    fn test_remove_and_clear() {
        let engine = CacheEngine::in_memory().unwrap();
        engine.set("a", b"1").unwrap();
        engine.set("b", b"2").unwrap();

        assert!(engine.remove("a").unwrap());
        assert!(!engine.remove("a").unwrap());
        assert_eq!(engine.clear().unwrap(), 1);
        assert_eq!(engine.stats().unwrap().entry_count, 0);
    }

    #[test]
    fn test_empty_key_rejected() {
        let engine = CacheEngine::in_memory().unwrap();
        let err = engine.set("", b"v").unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(!err.is_cache_miss_equivalent());
    }

    #[test]
    fn test_close_is_idempotent() {
        let engine = CacheEngine::builder().flush_every(10).in_memory().unwrap();
        engine.set("k", b"v").unwrap();
        engine.get("k").unwrap();

        engine.close().unwrap();
        engine.close().unwrap();
        assert!(engine.is_closed());
        assert!(matches!(engine.get("k"), Err(Error::StoreClosed)));
        assert!(matches!(engine.set("k", b"v"), Err(Error::StoreClosed)));
    }
}
