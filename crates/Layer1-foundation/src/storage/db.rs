//! SQLite Store for cache entries and the usage ledger
//!
//! 하나의 SQLite 파일에 저장:
//! - cache_entries: 압축된 캐시 엔트리 + 메타데이터
//! - usage_ledger: 캐시 사용 기록 (append-only)
//!
//! 여러 짧은 프로세스가 같은 파일을 동시에 열 수 있습니다.
//! WAL 모드 + busy_timeout + 재시도로 쓰기를 직렬화합니다.
//!
//! ## Migration System
//!
//! Database schema is versioned. Migrations run automatically on open.
//! - Version 1: cache_entries, usage_ledger
//! - Version 2: cache_entries.expires_at (optional hard expiry)

use super::records::{CacheStats, EntryRecord, TopEntry, UsageFilter, UsageRecord, UsageTotals};
use super::retry::{with_retry, RetryPolicy};
use crate::config::CacheSettings;
use crate::error::{is_corrupt_database, is_unavailable};
use crate::{Error, Result};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Current schema version
const CURRENT_SCHEMA_VERSION: i32 = 2;

const ENTRY_COLUMNS: &str = "key, payload, codec, checksum, original_size, compressed_size, \
     created_at, last_accessed_at, hit_count, source_fingerprint, expires_at";

/// Connection tuning
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// SQLite's own wait on a locked file before reporting busy
    pub busy_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_millis(250),
            retry: RetryPolicy::default(),
        }
    }
}

impl StoreOptions {
    pub fn from_settings(settings: &CacheSettings) -> Self {
        Self {
            busy_timeout: Duration::from_millis(settings.store.busy_timeout_ms),
            retry: settings.retry.clone(),
        }
    }
}

/// Durable, queryable store shared by every process on the machine
pub struct Store {
    conn: Mutex<Option<Connection>>,
    path: Option<PathBuf>,
    retry: RetryPolicy,
}

impl Store {
    /// Open (or create) the store file
    ///
    /// A file SQLite rejects as corrupt or not-a-database is deleted and
    /// recreated; the cache is disposable.
    pub fn open(path: &Path, options: &StoreOptions) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::store_unavailable(
                    "open",
                    1,
                    format!("cannot create {}: {}", parent.display(), e),
                )
            })?;
        }

        match Self::open_file(path, options) {
            Ok(store) => Ok(store),
            Err(Error::Sqlite(e)) if is_corrupt_database(&e) => {
                warn!(path = %path.display(), error = %e, "store file is corrupt; recreating");
                remove_database_files(path)?;
                Self::open_file(path, options)
            }
            Err(e) => Err(e),
        }
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(Some(conn)),
            path: None,
            retry: RetryPolicy::default(),
        };
        store.initialize()?;
        Ok(store)
    }

    fn open_file(path: &Path, options: &StoreOptions) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| classify("open", e.into()))?;
        conn.busy_timeout(options.busy_timeout)?;

        let store = Self {
            conn: Mutex::new(Some(conn)),
            path: Some(path.to_path_buf()),
            retry: options.retry.clone(),
        };

        let journal_mode = store.run("configure", |conn| {
            // Enable WAL mode for concurrent readers alongside a writer
            let mode: String =
                conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
            conn.execute_batch("PRAGMA synchronous=NORMAL;")?;
            Ok(mode)
        })?;
        if !journal_mode.eq_ignore_ascii_case("wal") {
            warn!(path = %path.display(), journal_mode = %journal_mode, "WAL mode unavailable");
        }
        store.initialize()?;

        debug!(path = %path.display(), "store opened");
        Ok(store)
    }

    /// Store file, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().map(|guard| guard.is_none()).unwrap_or(true)
    }

    // ========================================================================
    // Schema
    // ========================================================================

    /// Get current schema version from database
    pub fn schema_version(&self) -> Result<i32> {
        self.run("schema_version", |conn| {
            conn.query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_version",
                [],
                |row| row.get(0),
            )
        })
    }

    /// Base tables plus pending migrations, in one immediate transaction so
    /// concurrent first opens do not race each other
    fn initialize(&self) -> Result<()> {
        self.run("initialize", |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            tx.execute_batch(
                r#"
                -- Schema version tracking
                CREATE TABLE IF NOT EXISTS schema_version (
                    version INTEGER PRIMARY KEY,
                    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                -- Cache entries
                CREATE TABLE IF NOT EXISTS cache_entries (
                    key TEXT PRIMARY KEY,
                    payload BLOB NOT NULL,
                    codec TEXT NOT NULL,
                    checksum TEXT NOT NULL,
                    original_size INTEGER NOT NULL,
                    compressed_size INTEGER NOT NULL,
                    created_at INTEGER NOT NULL,
                    last_accessed_at INTEGER NOT NULL,
                    hit_count INTEGER NOT NULL DEFAULT 0,
                    source_fingerprint TEXT
                );

                CREATE INDEX IF NOT EXISTS idx_cache_entries_accessed
                    ON cache_entries(last_accessed_at);
                CREATE INDEX IF NOT EXISTS idx_cache_entries_created
                    ON cache_entries(created_at);
                CREATE INDEX IF NOT EXISTS idx_cache_entries_hits
                    ON cache_entries(hit_count DESC);

                -- Usage ledger
                CREATE TABLE IF NOT EXISTS usage_ledger (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    session_id TEXT NOT NULL,
                    operation TEXT NOT NULL,
                    outcome TEXT NOT NULL CHECK(outcome IN ('hit', 'miss', 'error')),
                    tokens_saved INTEGER NOT NULL DEFAULT 0,
                    duration_ms INTEGER NOT NULL DEFAULT 0,
                    recorded_at INTEGER NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_usage_ledger_recorded
                    ON usage_ledger(recorded_at);
                CREATE INDEX IF NOT EXISTS idx_usage_ledger_session
                    ON usage_ledger(session_id, recorded_at);
                CREATE INDEX IF NOT EXISTS idx_usage_ledger_operation
                    ON usage_ledger(operation);

                -- Insert initial schema version if not exists
                INSERT OR IGNORE INTO schema_version (version) VALUES (1);
                "#,
            )?;

            let current_version: i32 = tx.query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_version",
                [],
                |row| row.get(0),
            )?;

            if current_version < CURRENT_SCHEMA_VERSION {
                info!(
                    "Running store migrations from version {} to {}",
                    current_version, CURRENT_SCHEMA_VERSION
                );
            }

            for version in (current_version + 1)..=CURRENT_SCHEMA_VERSION {
                match version {
                    2 => migrate_v2(&tx)?,
                    _ => warn!("Unknown migration version: {}", version),
                }

                tx.execute(
                    "INSERT OR REPLACE INTO schema_version (version) VALUES (?1)",
                    params![version],
                )?;
                info!("Applied store migration to version {}", version);
            }

            tx.commit()
        })
    }

    // ========================================================================
    // Entry Operations
    // ========================================================================

    /// Insert or fully replace the entry for `entry.key`
    ///
    /// Atomic: a crash leaves either the old row or the new one.
    pub fn put(&self, entry: &EntryRecord) -> Result<()> {
        self.run("put", |conn| {
            conn.execute(
                r#"
                INSERT OR REPLACE INTO cache_entries (
                    key, payload, codec, checksum, original_size, compressed_size,
                    created_at, last_accessed_at, hit_count, source_fingerprint, expires_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                "#,
                params![
                    entry.key,
                    entry.payload,
                    entry.codec,
                    entry.checksum,
                    to_sql_int(entry.original_size),
                    to_sql_int(entry.compressed_size),
                    entry.created_at,
                    entry.last_accessed_at,
                    to_sql_int(entry.hit_count),
                    entry.source_fingerprint,
                    entry.expires_at,
                ],
            )
        })?;

        debug!(key = %entry.key, bytes = entry.compressed_size, "entry stored");
        Ok(())
    }

    pub fn fetch(&self, key: &str) -> Result<Option<EntryRecord>> {
        self.run("fetch", |conn| {
            conn.query_row(
                &format!("SELECT {} FROM cache_entries WHERE key = ?1", ENTRY_COLUMNS),
                params![key],
                entry_from_row,
            )
            .optional()
        })
    }

    /// Returns whether a row was removed
    pub fn remove(&self, key: &str) -> Result<bool> {
        let removed = self.run("remove", |conn| {
            conn.execute("DELETE FROM cache_entries WHERE key = ?1", params![key])
        })?;
        Ok(removed > 0)
    }

    /// Visit every entry in key order without materialising the table
    ///
    /// Not retried: a visitor must never see the same row twice.
    pub fn scan<F>(&self, mut visit: F) -> Result<u64>
    where
        F: FnMut(&EntryRecord),
    {
        let mut guard = self.lock()?;
        let conn = guard.as_mut().ok_or(Error::StoreClosed)?;

        let mut visited = 0u64;
        let result = (|| -> rusqlite::Result<()> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM cache_entries ORDER BY key",
                ENTRY_COLUMNS
            ))?;
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                let entry = entry_from_row(row)?;
                visit(&entry);
                visited += 1;
            }
            Ok(())
        })();

        result.map_err(|e| classify("scan", e.into()))?;
        Ok(visited)
    }

    /// Apply buffered access bookkeeping for one key
    ///
    /// `last_accessed_at` never moves backwards, even when another process
    /// recorded a later access first.
    pub fn record_access(&self, key: &str, hits: u64, at: i64) -> Result<bool> {
        let updated = self.run("record_access", |conn| {
            conn.execute(
                r#"
                UPDATE cache_entries SET
                    hit_count = hit_count + ?2,
                    last_accessed_at = MAX(last_accessed_at, ?3)
                WHERE key = ?1
                "#,
                params![key, to_sql_int(hits), at],
            )
        })?;
        Ok(updated > 0)
    }

    /// Apply many `(key, hits, at)` updates in one transaction
    pub fn record_accesses(&self, accesses: &[(String, u64, i64)]) -> Result<()> {
        if accesses.is_empty() {
            return Ok(());
        }

        self.run("record_access", |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            {
                let mut stmt = tx.prepare_cached(
                    r#"
                    UPDATE cache_entries SET
                        hit_count = hit_count + ?2,
                        last_accessed_at = MAX(last_accessed_at, ?3)
                    WHERE key = ?1
                    "#,
                )?;
                for (key, hits, at) in accesses {
                    stmt.execute(params![key, to_sql_int(*hits), at])?;
                }
            }
            tx.commit()
        })
    }

    // ========================================================================
    // Aggregates
    // ========================================================================

    pub fn stats(&self) -> Result<CacheStats> {
        self.run("stats", |conn| {
            conn.query_row(
                r#"
                SELECT COUNT(*), COALESCE(SUM(original_size), 0),
                       COALESCE(SUM(compressed_size), 0), COALESCE(SUM(hit_count), 0)
                FROM cache_entries
                "#,
                [],
                |row| {
                    Ok(CacheStats {
                        entry_count: from_sql_int(row.get(0)?),
                        total_original_bytes: from_sql_int(row.get(1)?),
                        total_compressed_bytes: from_sql_int(row.get(2)?),
                        aggregate_hit_count: from_sql_int(row.get(3)?),
                    })
                },
            )
        })
    }

    /// Most-hit entries first, with per-entry reduction
    pub fn top_entries(&self, limit: u32) -> Result<Vec<TopEntry>> {
        self.run("top_entries", |conn| {
            let mut stmt = conn.prepare(
                r#"
                SELECT key, hit_count, original_size, compressed_size,
                       CASE WHEN original_size > 0
                            THEN (1.0 - CAST(compressed_size AS REAL) / original_size) * 100.0
                            ELSE 0.0 END,
                       last_accessed_at
                FROM cache_entries
                ORDER BY hit_count DESC, last_accessed_at DESC, key
                LIMIT ?1
                "#,
            )?;

            let rows = stmt.query_map(params![limit], |row| {
                Ok(TopEntry {
                    key: row.get(0)?,
                    hit_count: from_sql_int(row.get(1)?),
                    original_size: from_sql_int(row.get(2)?),
                    compressed_size: from_sql_int(row.get(3)?),
                    reduction_percent: row.get(4)?,
                    last_accessed_at: row.get(5)?,
                })
            })?;

            rows.collect()
        })
    }

    // ========================================================================
    // Eviction
    // ========================================================================

    /// Keep only the `max_entries` most recently accessed entries
    pub fn evict_lru(&self, max_entries: u64) -> Result<usize> {
        let evicted = self.run("evict_lru", |conn| {
            conn.execute(
                r#"
                DELETE FROM cache_entries WHERE key IN (
                    SELECT key FROM cache_entries
                    ORDER BY last_accessed_at DESC, key
                    LIMIT -1 OFFSET ?1
                )
                "#,
                params![to_sql_int(max_entries)],
            )
        })?;

        if evicted > 0 {
            info!(evicted, max_entries, "evicted least recently used entries");
        }
        Ok(evicted)
    }

    /// Remove entries created before `cutoff`
    pub fn prune_older_than(&self, cutoff: i64) -> Result<usize> {
        let pruned = self.run("prune", |conn| {
            conn.execute(
                "DELETE FROM cache_entries WHERE created_at < ?1",
                params![cutoff],
            )
        })?;

        if pruned > 0 {
            info!(pruned, "pruned old entries");
        }
        Ok(pruned)
    }

    /// Remove entries whose hard expiry has passed
    pub fn purge_expired(&self, now: i64) -> Result<usize> {
        let purged = self.run("purge_expired", |conn| {
            conn.execute(
                "DELETE FROM cache_entries WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                params![now],
            )
        })?;

        if purged > 0 {
            info!(purged, "purged expired entries");
        }
        Ok(purged)
    }

    /// Remove every entry; the ledger is kept
    pub fn clear(&self) -> Result<usize> {
        let cleared = self.run("clear", |conn| conn.execute("DELETE FROM cache_entries", []))?;
        info!(cleared, "cleared cache entries");
        Ok(cleared)
    }

    // ========================================================================
    // Usage Ledger
    // ========================================================================

    pub fn append_usage(&self, record: &UsageRecord) -> Result<()> {
        self.run("append_usage", |conn| {
            conn.execute(
                r#"
                INSERT INTO usage_ledger
                    (session_id, operation, outcome, tokens_saved, duration_ms, recorded_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                params![
                    record.session_id,
                    record.operation,
                    record.outcome.as_str(),
                    to_sql_int(record.tokens_saved),
                    to_sql_int(record.duration_ms),
                    record.recorded_at,
                ],
            )
        })?;
        Ok(())
    }

    pub fn usage_summary(&self, filter: &UsageFilter) -> Result<UsageTotals> {
        let (clause, values) = filter_clause(filter);
        self.run("usage_summary", |conn| {
            conn.query_row(
                &format!("SELECT {} FROM usage_ledger{}", TOTALS_COLUMNS, clause),
                params_from_iter(values.iter()),
                |row| totals_from_row(row, 0),
            )
        })
    }

    /// Totals per operation name, busiest first
    pub fn usage_by_operation(&self, filter: &UsageFilter) -> Result<Vec<(String, UsageTotals)>> {
        let (clause, values) = filter_clause(filter);
        self.run("usage_by_operation", |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT operation, {} FROM usage_ledger{} GROUP BY operation \
                 ORDER BY COUNT(*) DESC, operation",
                TOTALS_COLUMNS, clause
            ))?;
            let rows = stmt.query_map(params_from_iter(values.iter()), |row| {
                Ok((row.get::<_, String>(0)?, totals_from_row(row, 1)?))
            })?;
            rows.collect()
        })
    }

    /// Drop ledger rows recorded before `cutoff`
    pub fn prune_usage_before(&self, cutoff: i64) -> Result<usize> {
        let pruned = self.run("prune_usage", |conn| {
            conn.execute(
                "DELETE FROM usage_ledger WHERE recorded_at < ?1",
                params![cutoff],
            )
        })?;

        if pruned > 0 {
            info!(pruned, "pruned usage ledger");
        }
        Ok(pruned)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Checkpoint the WAL and release the handle; later calls fail with
    /// `Error::StoreClosed`. Idempotent.
    pub fn close(&self) -> Result<()> {
        let conn = match self.lock()?.take() {
            Some(conn) => conn,
            None => return Ok(()),
        };

        if self.path.is_some() {
            if let Err(e) = conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(())) {
                warn!(error = %e, "WAL checkpoint failed on close");
            }
        }

        conn.close().map_err(|(_, e)| classify("close", e.into()))?;
        debug!("store closed");
        Ok(())
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn lock(&self) -> Result<MutexGuard<'_, Option<Connection>>> {
        self.conn
            .lock()
            .map_err(|_| Error::Internal("Lock poisoned".to_string()))
    }

    /// Run `f` on the open connection, retrying contention
    fn run<T, F>(&self, operation: &str, mut f: F) -> Result<T>
    where
        F: FnMut(&mut Connection) -> rusqlite::Result<T>,
    {
        let mut guard = self.lock()?;
        let conn = guard.as_mut().ok_or(Error::StoreClosed)?;

        with_retry(&self.retry, operation, || f(conn).map_err(Error::from))
            .map_err(|e| classify(operation, e))
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "failed to close store");
        }
    }
}

/// Migration to version 2: optional hard expiry per entry
fn migrate_v2(conn: &Connection) -> rusqlite::Result<()> {
    let has_column = conn
        .prepare("SELECT 1 FROM pragma_table_info('cache_entries') WHERE name = 'expires_at'")?
        .exists([])?;

    if !has_column {
        conn.execute("ALTER TABLE cache_entries ADD COLUMN expires_at INTEGER", [])?;
    }
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_cache_entries_expires ON cache_entries(expires_at)",
        [],
    )?;
    Ok(())
}

/// Map I/O-level SQLite failures to `StoreUnavailable`
fn classify(operation: &str, err: Error) -> Error {
    match err {
        Error::Sqlite(e) if is_unavailable(&e) => Error::store_unavailable(operation, 1, e),
        other => other,
    }
}

fn remove_database_files(path: &Path) -> Result<()> {
    for suffix in ["", "-wal", "-shm"] {
        let mut candidate = path.as_os_str().to_owned();
        candidate.push(suffix);
        let candidate = PathBuf::from(candidate);
        if candidate.exists() {
            std::fs::remove_file(&candidate)?;
        }
    }
    Ok(())
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<EntryRecord> {
    Ok(EntryRecord {
        key: row.get(0)?,
        payload: row.get(1)?,
        codec: row.get(2)?,
        checksum: row.get(3)?,
        original_size: from_sql_int(row.get(4)?),
        compressed_size: from_sql_int(row.get(5)?),
        created_at: row.get(6)?,
        last_accessed_at: row.get(7)?,
        hit_count: from_sql_int(row.get(8)?),
        source_fingerprint: row.get(9)?,
        expires_at: row.get(10)?,
    })
}

const TOTALS_COLUMNS: &str = "\
    COALESCE(SUM(outcome = 'hit'), 0), \
    COALESCE(SUM(outcome = 'miss'), 0), \
    COALESCE(SUM(outcome = 'error'), 0), \
    COALESCE(SUM(tokens_saved), 0), \
    COALESCE(SUM(duration_ms), 0)";

fn totals_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<UsageTotals> {
    Ok(UsageTotals {
        hits: from_sql_int(row.get(offset)?),
        misses: from_sql_int(row.get(offset + 1)?),
        errors: from_sql_int(row.get(offset + 2)?),
        tokens_saved: from_sql_int(row.get(offset + 3)?),
        duration_ms: from_sql_int(row.get(offset + 4)?),
    })
}

fn filter_clause(filter: &UsageFilter) -> (String, Vec<Value>) {
    let mut conditions = Vec::new();
    let mut values = Vec::new();

    if let Some(since) = filter.since {
        values.push(Value::Integer(since));
        conditions.push(format!("recorded_at >= ?{}", values.len()));
    }
    if let Some(session) = &filter.session_id {
        values.push(Value::Text(session.clone()));
        conditions.push(format!("session_id = ?{}", values.len()));
    }

    if conditions.is_empty() {
        (String::new(), values)
    } else {
        (format!(" WHERE {}", conditions.join(" AND ")), values)
    }
}

// SQLite integers are signed; sizes and counters never approach i64::MAX.
fn to_sql_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn from_sql_int(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}
