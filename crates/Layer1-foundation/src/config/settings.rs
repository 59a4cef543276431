//! Cache Settings - 캐시 엔진 설정
//!
//! 우선순위 (낮음 → 높음):
//! 1. 기본값
//! 2. 글로벌 설정 (`<config_dir>/smartcache/config.toml`)
//! 3. 프로젝트 설정 (`.smartcache/config.toml`)
//! 4. 환경변수 (`SMARTCACHE_DB`, `SMARTCACHE_SESSION`)

use crate::storage::RetryPolicy;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// 설정 파일명
pub const CONFIG_FILE: &str = "config.toml";

/// Overrides the store location
pub const ENV_DB_PATH: &str = "SMARTCACHE_DB";

/// Tags ledger records with a caller-chosen session
pub const ENV_SESSION_ID: &str = "SMARTCACHE_SESSION";

const APP_DIR: &str = "smartcache";
const PROJECT_DIR: &str = ".smartcache";
const DB_FILE: &str = "cache.db";

// ============================================================================
// CacheSettings
// ============================================================================

/// smartcache 통합 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Store file; `None` means `<cache_dir>/smartcache/cache.db`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,

    /// Recorded hits buffered before access bookkeeping is written
    #[serde(default = "default_flush_every")]
    pub flush_every: u32,

    /// Report reads that exhaust their retries as misses instead of errors
    #[serde(default = "default_true")]
    pub degrade_reads: bool,

    /// Ledger session id; a fresh one is generated when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    #[serde(default)]
    pub compression: CompressionSettings,

    #[serde(default)]
    pub store: StoreSettings,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub ledger: LedgerSettings,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            db_path: None,
            compression: CompressionSettings::default(),
            store: StoreSettings::default(),
            retry: RetryPolicy::default(),
            flush_every: default_flush_every(),
            degrade_reads: true,
            ledger: LedgerSettings::default(),
            session_id: None,
        }
    }
}

/// Compression algorithm for stored payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CompressionAlgorithm {
    #[default]
    Gzip,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionSettings {
    #[serde(default)]
    pub algorithm: CompressionAlgorithm,

    /// 0 (store) ..= 9 (best)
    #[serde(default = "default_compression_level")]
    pub level: u32,
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self {
            algorithm: CompressionAlgorithm::default(),
            level: default_compression_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    /// How long SQLite itself waits on a locked file before reporting busy
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Least-recently-accessed entries beyond this are evicted after a write
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_entries: Option<u64>,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            busy_timeout_ms: default_busy_timeout_ms(),
            max_entries: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Records older than this are dropped by `prune`
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            retention_days: default_retention_days(),
        }
    }
}

// Default value functions
fn default_flush_every() -> u32 {
    1
}
fn default_true() -> bool {
    true
}
fn default_compression_level() -> u32 {
    6
}
fn default_busy_timeout_ms() -> u64 {
    250
}
fn default_retention_days() -> u32 {
    90
}

impl CacheSettings {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Load
    // ========================================================================

    /// 글로벌 + 프로젝트 + 환경변수 병합 로드
    pub fn load() -> Result<Self> {
        let mut layers = Vec::new();
        if let Some(dir) = dirs::config_dir() {
            layers.push(dir.join(APP_DIR).join(CONFIG_FILE));
        }
        if let Ok(cwd) = std::env::current_dir() {
            layers.push(cwd.join(PROJECT_DIR).join(CONFIG_FILE));
        }

        let mut settings = Self::load_from(&layers)?;
        settings.apply_env(|name| std::env::var(name).ok());
        Ok(settings)
    }

    /// Merge the given TOML files in order; missing files are skipped
    pub fn load_from(paths: &[PathBuf]) -> Result<Self> {
        let mut merged = toml::Value::Table(toml::map::Map::new());

        for path in paths {
            if !path.exists() {
                continue;
            }
            let content = std::fs::read_to_string(path).map_err(|e| {
                Error::Config(format!("Failed to read {}: {}", path.display(), e))
            })?;
            let layer: toml::Value = toml::from_str(&content).map_err(|e| {
                Error::Config(format!("Failed to parse {}: {}", path.display(), e))
            })?;
            debug!(path = %path.display(), "loaded cache settings layer");
            merge_toml(&mut merged, layer);
        }

        merged
            .try_into()
            .map_err(|e: toml::de::Error| Error::Config(format!("Invalid settings: {}", e)))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid settings: {}", e)))
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// 환경변수 적용
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_DB_PATH).filter(|v| !v.trim().is_empty()) {
            self.db_path = Some(PathBuf::from(path));
        }
        if let Some(session) = lookup(ENV_SESSION_ID).filter(|v| !v.trim().is_empty()) {
            self.session_id = Some(session);
        }
    }

    /// Store location with the default applied
    pub fn resolved_db_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.db_path {
            return Ok(path.clone());
        }
        let dir = dirs::cache_dir()
            .ok_or_else(|| Error::Config("Cannot find cache directory".to_string()))?;
        Ok(dir.join(APP_DIR).join(DB_FILE))
    }

    /// Project-local store location (`<root>/.smartcache/cache.db`)
    pub fn project_db_path(root: &Path) -> PathBuf {
        root.join(PROJECT_DIR).join(DB_FILE)
    }

    pub fn validate(&self) -> Result<()> {
        if self.compression.level > 9 {
            return Err(Error::Config(format!(
                "compression.level must be 0..=9, got {}",
                self.compression.level
            )));
        }
        if self.flush_every == 0 {
            return Err(Error::Config("flush_every must be at least 1".to_string()));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(Error::Config(
                "retry.backoff_multiplier must be >= 1.0".to_string(),
            ));
        }
        Ok(())
    }

    // ========================================================================
    // Builder
    // ========================================================================

    pub fn db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.db_path = Some(path.into());
        self
    }

    pub fn session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    pub fn flush_every(mut self, n: u32) -> Self {
        self.flush_every = n;
        self
    }

    pub fn max_entries(mut self, max: u64) -> Self {
        self.store.max_entries = Some(max);
        self
    }

    pub fn compression(mut self, algorithm: CompressionAlgorithm) -> Self {
        self.compression.algorithm = algorithm;
        self
    }
}

/// Deep-merge `overlay` into `base`; tables merge key by key, everything else is replaced
fn merge_toml(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, value) in overlay_table {
                match base_table.get_mut(&key) {
                    Some(existing) => merge_toml(existing, value),
                    None => {
                        base_table.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = CacheSettings::default();
        assert_eq!(settings.compression.algorithm, CompressionAlgorithm::Gzip);
        assert_eq!(settings.flush_every, 1);
        assert!(settings.degrade_reads);
        assert!(settings.ledger.enabled);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings = CacheSettings::from_toml_str(
            r#"
            flush_every = 8

            [compression]
            level = 9
            "#,
        )
        .unwrap();

        assert_eq!(settings.flush_every, 8);
        assert_eq!(settings.compression.level, 9);
        assert_eq!(settings.compression.algorithm, CompressionAlgorithm::Gzip);
        assert_eq!(settings.store.busy_timeout_ms, 250);
    }

    #[test]
    fn test_layers_merge_project_over_global() {
        let dir = tempfile::tempdir().unwrap();
        let global = dir.path().join("global.toml");
        let project = dir.path().join("project.toml");

        std::fs::write(
            &global,
            "flush_every = 4\n[store]\nbusy_timeout_ms = 1000\nmax_entries = 500\n",
        )
        .unwrap();
        std::fs::write(&project, "[store]\nmax_entries = 50\n").unwrap();

        let settings =
            CacheSettings::load_from(&[global, project, dir.path().join("missing.toml")])
                .unwrap();

        assert_eq!(settings.flush_every, 4);
        assert_eq!(settings.store.busy_timeout_ms, 1000);
        assert_eq!(settings.store.max_entries, Some(50));
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "flush_every = [").unwrap();

        let err = CacheSettings::load_from(&[path]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_env_overrides() {
        let mut settings = CacheSettings::default();
        settings.apply_env(|name| match name {
            ENV_DB_PATH => Some("/tmp/override.db".to_string()),
            ENV_SESSION_ID => Some("session-42".to_string()),
            _ => None,
        });

        assert_eq!(settings.db_path, Some(PathBuf::from("/tmp/override.db")));
        assert_eq!(settings.session_id.as_deref(), Some("session-42"));
    }

    #[test]
    fn test_blank_env_is_ignored() {
        let mut settings = CacheSettings::default().session_id("kept");
        settings.apply_env(|_| Some("  ".to_string()));
        assert_eq!(settings.session_id.as_deref(), Some("kept"));
        assert!(settings.db_path.is_none());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut settings = CacheSettings::default();
        settings.compression.level = 12;
        assert!(settings.validate().is_err());

        let settings = CacheSettings::default().flush_every(0);
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_toml_roundtrip() {
        let settings = CacheSettings::default()
            .db_path("/var/tmp/cache.db")
            .max_entries(10);
        let text = settings.to_toml_string().unwrap();
        let parsed = CacheSettings::from_toml_str(&text).unwrap();
        assert_eq!(parsed.db_path, settings.db_path);
        assert_eq!(parsed.store.max_entries, Some(10));
    }
}
