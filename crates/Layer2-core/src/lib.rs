//! smartcache-core: Cache runtime for smart tool wrappers
//!
//! Layer2 - 캐시 엔진 및 사용 기록 레이어
//!
//! # 주요 모듈
//!
//! - `engine`: 캐시 엔진 façade (조회, 저장, 집계)
//! - `freshness`: 신선도 판정 (TTL, 소스 변경 감지)
//! - `ledger`: 세션/프로젝트 단위 사용 기록
//! - `runner`: wrapper 공통 패턴 (조회 → 실행 → 저장 → 기록)
//! - `report`: 세션 종료 요약
//!
//! # 사용 예시
//!
//! ```ignore
//! use smartcache_core::{CacheEngine, CachedRunner, Computed, FreshnessPolicy, UsageLedger};
//!
//! let settings = CacheSettings::load()?;
//! let engine = Arc::new(CacheEngine::open(&settings)?);
//! let ledger = Arc::new(UsageLedger::from_settings(engine.store(), engine.clock(), &settings));
//!
//! let runner = CachedRunner::new(engine).with_ledger(ledger);
//! let key = fingerprint("smart-lint", [path.as_str()]);
//!
//! let out = runner.run("smart-lint", &key, &FreshnessPolicy::file_contents(&path)?, None, || {
//!     let raw = run_linter(&path)?;
//!     Ok(Computed::shrunk(summarize(&raw), raw.len() as u64))
//! })?;
//! ```

pub mod engine;
pub mod freshness;
pub mod ledger;
pub mod report;
pub mod runner;

// Re-exports: Engine
pub use engine::{CacheEngine, CacheEngineBuilder, CachedValue, Lookup, SetOptions, StoredSizes};

// Re-exports: Freshness
pub use freshness::{is_fresh, FreshnessOracle, FreshnessPolicy, StaleReason, Verdict};

// Re-exports: Ledger
pub use ledger::{LedgerSummary, Outcome, UsageLedger};

// Re-exports: Runner / Report
pub use report::SessionReport;
pub use runner::{CachedRunner, Computed, RunOutput};

// Re-exports: Foundation
pub use smartcache_foundation::{
    fingerprint, CacheSettings, CacheStats, Error, FingerprintBuilder, Result, SourceFingerprint,
    TopEntry, TtlPreset,
};
