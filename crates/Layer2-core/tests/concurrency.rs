//! Multi-connection behaviour on one shared store file

use smartcache_core::{CacheEngine, CacheSettings, Error, FreshnessPolicy, Lookup};
use smartcache_foundation::RetryPolicy;
use std::path::Path;
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::TempDir;

const WRITERS: usize = 4;
const ROUNDS: usize = 25;

fn settings(path: &Path) -> CacheSettings {
    let mut settings = CacheSettings::default().db_path(path);
    settings.store.busy_timeout_ms = 5_000;
    settings
}

fn payload(writer: usize, round: usize) -> Vec<u8> {
    format!("writer {writer} round {round}\n")
        .repeat(64 + writer * 7)
        .into_bytes()
}

fn is_whole_payload(value: &[u8]) -> bool {
    (0..WRITERS).any(|writer| (0..ROUNDS).any(|round| value == payload(writer, round)))
}

#[test]
fn test_concurrent_writers_never_tear_entries() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cache.db");

    let barrier = Arc::new(Barrier::new(WRITERS));
    let handles: Vec<_> = (0..WRITERS)
        .map(|writer| {
            let settings = settings(&path);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                // 각 writer는 별도 프로세스처럼 자기 연결을 가진다
                let engine = CacheEngine::open(&settings).unwrap();
                barrier.wait();
                for round in 0..ROUNDS {
                    engine.set("shared", &payload(writer, round)).unwrap();
                    engine
                        .set(&format!("own-{writer}"), &payload(writer, round))
                        .unwrap();
                    if let Some(hit) = engine.get("shared").unwrap() {
                        assert!(is_whole_payload(&hit.value), "torn read");
                    }
                }
                engine.close().unwrap();
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let engine = CacheEngine::open(&settings(&path)).unwrap();
    let shared = engine.get("shared").unwrap().unwrap();
    assert!(is_whole_payload(&shared.value));

    for writer in 0..WRITERS {
        let own = engine.get(&format!("own-{writer}")).unwrap().unwrap();
        assert_eq!(own.value, payload(writer, ROUNDS - 1));
    }
    assert_eq!(engine.stats().unwrap().entry_count, WRITERS as u64 + 1);
}

#[test]
fn test_read_succeeds_while_writer_holds_lock() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cache.db");

    // hit bookkeeping stays buffered so the read itself never writes
    let engine = CacheEngine::builder()
        .db_path(&path)
        .flush_every(1_000)
        .open()
        .unwrap();
    engine.set("k", b"cached output").unwrap();

    let other = rusqlite::Connection::open(&path).unwrap();
    other.execute_batch("BEGIN IMMEDIATE;").unwrap();
    other.execute("DELETE FROM usage_ledger", []).unwrap();

    let lookup = engine.get_fresh("k", &FreshnessPolicy::Unchecked).unwrap();
    assert!(matches!(lookup, Lookup::Hit(ref v) if v.value == b"cached output"));

    other.execute_batch("ROLLBACK;").unwrap();
    engine.flush().unwrap();
    assert_eq!(engine.stats().unwrap().aggregate_hit_count, 1);
}

#[test]
fn test_write_under_held_lock_reports_unavailable() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cache.db");

    let mut settings = settings(&path);
    settings.store.busy_timeout_ms = 20;
    settings.retry = RetryPolicy::no_retry();
    let engine = CacheEngine::open(&settings).unwrap();

    let other = rusqlite::Connection::open(&path).unwrap();
    other.execute_batch("BEGIN IMMEDIATE;").unwrap();

    let err = engine.set("k", b"value").unwrap_err();
    assert!(matches!(err, Error::StoreUnavailable { .. }), "got {err:?}");
    assert!(err.is_cache_miss_equivalent());

    other.execute_batch("ROLLBACK;").unwrap();
    engine.set("k", b"value").unwrap();
    assert_eq!(engine.get("k").unwrap().unwrap().value, b"value");
}

#[test]
fn test_retry_outlasts_short_lock() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cache.db");

    let mut settings = settings(&path);
    settings.store.busy_timeout_ms = 10;
    settings.retry = RetryPolicy {
        max_retries: 10,
        initial_delay_ms: 20,
        backoff_multiplier: 2.0,
        max_delay_ms: 100,
        jitter: false,
    };
    let engine = CacheEngine::open(&settings).unwrap();

    let other = rusqlite::Connection::open(&path).unwrap();
    other.execute_batch("BEGIN IMMEDIATE;").unwrap();
    let release = thread::spawn(move || {
        thread::sleep(std::time::Duration::from_millis(100));
        other.execute_batch("ROLLBACK;").unwrap();
    });

    engine.set("k", b"eventually").unwrap();
    release.join().unwrap();
    assert_eq!(engine.get("k").unwrap().unwrap().value, b"eventually");
}

#[test]
fn test_hits_survive_failed_flush() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cache.db");

    let mut settings = settings(&path);
    settings.store.busy_timeout_ms = 10;
    settings.retry = RetryPolicy::no_retry();
    let engine = CacheEngine::open(&settings).unwrap();
    engine.set("k", b"value").unwrap();

    let other = rusqlite::Connection::open(&path).unwrap();
    other.execute_batch("BEGIN IMMEDIATE;").unwrap();

    // the hit is served but its bookkeeping cannot be written yet
    let first = engine.get("k").unwrap().unwrap();
    assert_eq!(first.hit_count, 1);
    assert!(engine.flush().is_err());

    other.execute_batch("ROLLBACK;").unwrap();

    let second = engine.get("k").unwrap().unwrap();
    assert_eq!(second.hit_count, 2);
    assert_eq!(engine.store().fetch("k").unwrap().unwrap().hit_count, 2);
    assert_eq!(engine.stats().unwrap().aggregate_hit_count, 2);
}
