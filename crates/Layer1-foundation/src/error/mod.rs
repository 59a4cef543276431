//! Error types for smartcache
//!
//! 모든 에러를 중앙에서 관리

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// smartcache 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // 설정 관련
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    // ========================================================================
    // 저장소 관련
    // ========================================================================
    /// The durable store could not be opened or written, even after retries.
    #[error("Store unavailable during {operation} after {attempts} attempt(s): {reason}")]
    StoreUnavailable {
        operation: String,
        attempts: u32,
        reason: String,
    },

    /// A stored payload failed to decode or did not match its checksum.
    #[error("Corrupt payload: {0}")]
    CorruptPayload(String),

    #[error("Store is closed")]
    StoreClosed,

    // ========================================================================
    // 일반
    // ========================================================================
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ========================================================================
    // 외부 에러 변환
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    // ========================================================================
    // 기타
    // ========================================================================
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// 재시도 가능한 에러인지 확인
    ///
    /// Only contention on the shared store file qualifies; everything else
    /// either succeeds on the first try or never will.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Sqlite(e) => is_contention(e),
            _ => false,
        }
    }

    /// Whether a caller may treat this error exactly like a cache miss.
    ///
    /// Callers of the cache always have the expensive path to fall back on,
    /// so store trouble and corruption degrade to "no speedup this time".
    pub fn is_cache_miss_equivalent(&self) -> bool {
        !matches!(self, Error::InvalidInput(_) | Error::Config(_))
    }

    /// StoreUnavailable 생성 헬퍼
    pub fn store_unavailable(
        operation: impl Into<String>,
        attempts: u32,
        reason: impl std::fmt::Display,
    ) -> Self {
        Error::StoreUnavailable {
            operation: operation.into(),
            attempts,
            reason: reason.to_string(),
        }
    }

    /// CorruptPayload 생성 헬퍼
    pub fn corrupt(reason: impl Into<String>) -> Self {
        Error::CorruptPayload(reason.into())
    }
}

/// SQLite reports another connection holding the write lock.
pub(crate) fn is_contention(e: &rusqlite::Error) -> bool {
    use rusqlite::ErrorCode;

    matches!(
        e.sqlite_error_code(),
        Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked)
    )
}

/// SQLite reports an I/O condition that makes the store unusable right now.
pub(crate) fn is_unavailable(e: &rusqlite::Error) -> bool {
    use rusqlite::ErrorCode;

    matches!(
        e.sqlite_error_code(),
        Some(ErrorCode::CannotOpen)
            | Some(ErrorCode::SystemIoFailure)
            | Some(ErrorCode::DiskFull)
            | Some(ErrorCode::PermissionDenied)
            | Some(ErrorCode::ReadOnly)
    )
}

/// SQLite reports that the file is not a usable database at all.
pub(crate) fn is_corrupt_database(e: &rusqlite::Error) -> bool {
    use rusqlite::ErrorCode;

    matches!(
        e.sqlite_error_code(),
        Some(ErrorCode::DatabaseCorrupt) | Some(ErrorCode::NotADatabase)
    )
}

// ============================================================================
// From 구현 (추가 변환)
// ============================================================================

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Internal(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Internal(s.to_string())
    }
}
