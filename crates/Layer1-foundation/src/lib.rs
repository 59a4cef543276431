//! # smartcache-foundation
//!
//! Foundation layer for smartcache:
//! - Fingerprint: 캐시 키 / 소스 지문 (SHA-256)
//! - Codec: 페이로드 압축 (gzip, identity) + 체크섬
//! - Storage: SQLite 저장소 (캐시 엔트리 + 사용 기록), 재시도
//! - Config: 통합 설정 (CacheSettings, TtlPreset)
//! - Clock: 주입 가능한 시계 (테스트용 ManualClock)
//! - Tokenizer: 토큰 절약량 추정
//!
//! ## 아키텍처
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  wrapper (smart-test, smart-build, ...)      │
//! │        │ fingerprint(namespace, parts)       │
//! │        ▼                                     │
//! │  CacheEngine (smartcache-core)               │
//! │        │                                     │
//! │   ┌────┴─────┐                               │
//! │   ▼          ▼                               │
//! │  Codec     Store ──► cache.db (WAL, shared)  │
//! └──────────────────────────────────────────────┘
//! ```

pub mod clock;
pub mod codec;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod storage;
pub mod tokenizer;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Clock (시계)
// ============================================================================
pub use clock::{Clock, ManualClock, SystemClock};

// ============================================================================
// Config (설정)
// ============================================================================
pub use config::{
    CacheSettings, CompressionAlgorithm, CompressionSettings, LedgerSettings, StoreSettings,
    TtlPreset,
};

// ============================================================================
// Fingerprint & Codec
// ============================================================================
pub use codec::{Codec, CodecKind, Compressed, GzipCodec, IdentityCodec};
pub use fingerprint::{fingerprint, FingerprintBuilder, Part, SourceFingerprint};

// ============================================================================
// Storage (저장소)
// ============================================================================
pub use storage::{
    CacheStats, EntryRecord, Outcome, RetryPolicy, Store, StoreOptions, TopEntry, UsageFilter,
    UsageRecord, UsageTotals,
};

// ============================================================================
// Tokenizer (토큰 추정)
// ============================================================================
pub use tokenizer::{CharRatioEstimator, ScriptAwareEstimator, TokenEstimator};
