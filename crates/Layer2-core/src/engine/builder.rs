//! CacheEngine builder

use super::access::AccessBuffer;
use super::CacheEngine;
use parking_lot::Mutex;
use smartcache_foundation::codec::{self, Codec};
use smartcache_foundation::{CacheSettings, Clock, Result, Store, StoreOptions, SystemClock};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Assembles a `CacheEngine` from settings plus explicit overrides
///
/// ```rust,ignore
/// let engine = CacheEngine::builder()
///     .clock(Arc::new(ManualClock::new(0)))
///     .flush_every(16)
///     .max_entries(5_000)
///     .in_memory()?;
/// ```
pub struct CacheEngineBuilder {
    settings: CacheSettings,
    codec: Option<Box<dyn Codec>>,
    clock: Option<Arc<dyn Clock>>,
}

impl Default for CacheEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheEngineBuilder {
    pub fn new() -> Self {
        Self::from_settings(&CacheSettings::default())
    }

    pub fn from_settings(settings: &CacheSettings) -> Self {
        Self {
            settings: settings.clone(),
            codec: None,
            clock: None,
        }
    }

    /// Override the configured codec
    pub fn codec(mut self, codec: impl Codec + 'static) -> Self {
        self.codec = Some(Box::new(codec));
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn flush_every(mut self, n: u32) -> Self {
        self.settings.flush_every = n;
        self
    }

    pub fn max_entries(mut self, max: u64) -> Self {
        self.settings.store.max_entries = Some(max);
        self
    }

    pub fn degrade_reads(mut self, enabled: bool) -> Self {
        self.settings.degrade_reads = enabled;
        self
    }

    pub fn db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.settings.db_path = Some(path.into());
        self
    }

    /// Open the configured store file
    pub fn open(self) -> Result<CacheEngine> {
        self.settings.validate()?;
        let path = self.settings.resolved_db_path()?;
        let store = Store::open(&path, &StoreOptions::from_settings(&self.settings))?;
        debug!(path = %path.display(), "cache engine opened");
        self.with_store(Arc::new(store))
    }

    /// Create an in-memory engine (for testing)
    pub fn in_memory(self) -> Result<CacheEngine> {
        self.settings.validate()?;
        self.with_store(Arc::new(Store::in_memory()?))
    }

    /// Build on an already opened store
    pub fn with_store(self, store: Arc<Store>) -> Result<CacheEngine> {
        self.settings.validate()?;

        let codec = self
            .codec
            .unwrap_or_else(|| codec::from_settings(&self.settings.compression));
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);

        Ok(CacheEngine {
            store,
            codec,
            clock,
            flush_every: self.settings.flush_every,
            max_entries: self.settings.store.max_entries,
            degrade_reads: self.settings.degrade_reads,
            access: Mutex::new(AccessBuffer::default()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smartcache_foundation::{CodecKind, CompressionAlgorithm, Error};

    #[test]
    fn test_settings_choose_codec() {
        let settings = CacheSettings::default().compression(CompressionAlgorithm::None);
        let engine = CacheEngineBuilder::from_settings(&settings)
            .in_memory()
            .unwrap();
        assert_eq!(engine.codec_kind(), CodecKind::Identity);

        let engine = CacheEngine::in_memory().unwrap();
        assert_eq!(engine.codec_kind(), CodecKind::Gzip);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let err = CacheEngineBuilder::new().flush_every(0).in_memory().err();
        assert!(matches!(err, Some(Error::Config(_))));
    }

    #[test]
    fn test_open_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".smartcache").join("cache.db");

        let engine = CacheEngineBuilder::new().db_path(&path).open().unwrap();
        engine.set("k", b"v").unwrap();
        engine.close().unwrap();

        assert!(path.exists());
    }
}
