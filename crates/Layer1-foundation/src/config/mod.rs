//! Config - 통합 설정 관리
//!
//! - `settings.rs` - CacheSettings (TOML, 글로벌 + 프로젝트 + 환경변수)
//! - `ttl.rs` - 도구 종류별 TTL 프리셋

mod settings;
mod ttl;

pub use settings::{
    CacheSettings, CompressionAlgorithm, CompressionSettings, LedgerSettings, StoreSettings,
    CONFIG_FILE, ENV_DB_PATH, ENV_SESSION_ID,
};
pub use ttl::TtlPreset;
