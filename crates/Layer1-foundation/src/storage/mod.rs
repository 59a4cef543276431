//! Storage module for smartcache
//!
//! - `db`: SQLite - 캐시 엔트리 + 사용 기록
//! - `records`: 행 타입
//! - `retry`: busy/locked 재시도 (지수 백오프)

mod db;
mod records;
mod retry;

pub use db::{Store, StoreOptions};
pub use records::{
    CacheStats, EntryRecord, Outcome, TopEntry, UsageFilter, UsageRecord, UsageTotals,
};
pub use retry::{with_retry, RetryPolicy};
