//! Subcommand handlers

use anyhow::{bail, Context};
use serde::Serialize;
use serde_json::json;
use smartcache_core::report::format_bytes;
use smartcache_core::{CacheEngine, LedgerSummary, SessionReport, UsageLedger};
use smartcache_foundation::clock::millis_to_datetime;
use smartcache_foundation::{fingerprint, CacheSettings, EntryRecord};
use std::io::Write;
use std::time::Duration;

/// Output mode shared by every handler
#[derive(Debug, Clone, Copy)]
pub struct Output {
    pub json: bool,
}

impl Output {
    fn emit<T: Serialize>(&self, value: &T, human: impl FnOnce() -> String) -> anyhow::Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            println!("{}", human());
        }
        Ok(())
    }
}

fn open_engine(settings: &CacheSettings) -> anyhow::Result<CacheEngine> {
    let path = settings.resolved_db_path()?;
    CacheEngine::open(settings).with_context(|| format!("failed to open {}", path.display()))
}

fn timestamp(millis: i64) -> String {
    millis_to_datetime(millis)
        .format("%Y-%m-%d %H:%M:%S UTC")
        .to_string()
}

// ============================================================================
// Inspection
// ============================================================================

pub fn stats(settings: &CacheSettings, out: Output) -> anyhow::Result<()> {
    let engine = open_engine(settings)?;
    let stats = engine.stats()?;

    out.emit(&stats, || {
        format!(
            "Entries:     {}\nOriginal:    {}\nStored:      {}\nSaved:       {} ({:.1}%)\nTotal hits:  {}",
            stats.entry_count,
            format_bytes(stats.total_original_bytes),
            format_bytes(stats.total_compressed_bytes),
            format_bytes(stats.bytes_saved()),
            stats.reduction_percent(),
            stats.aggregate_hit_count
        )
    })
}

pub fn top(settings: &CacheSettings, limit: u32, out: Output) -> anyhow::Result<()> {
    let engine = open_engine(settings)?;
    let entries = engine.top_entries(limit)?;

    out.emit(&entries, || {
        if entries.is_empty() {
            return "Cache is empty.".to_string();
        }

        let mut lines = vec![
            format!(
                "{:<20} {:>6} {:>10} {:>10} {:>7}  {}",
                "KEY", "HITS", "ORIGINAL", "STORED", "SAVED", "LAST ACCESS"
            ),
            "-".repeat(80),
        ];
        for entry in &entries {
            lines.push(format!(
                "{:<20} {:>6} {:>10} {:>10} {:>6.1}%  {}",
                truncate_key(&entry.key, 20),
                entry.hit_count,
                format_bytes(entry.original_size),
                format_bytes(entry.compressed_size),
                entry.reduction_percent,
                timestamp(entry.last_accessed_at)
            ));
        }
        lines.join("\n")
    })
}

/// Shorten to `width` characters; keys are arbitrary UTF-8
fn truncate_key(key: &str, width: usize) -> String {
    if key.chars().count() > width {
        let head: String = key.chars().take(width.saturating_sub(3)).collect();
        format!("{head}...")
    } else {
        key.to_string()
    }
}

pub fn inspect(settings: &CacheSettings, key: &str, out: Output) -> anyhow::Result<()> {
    let engine = open_engine(settings)?;
    let Some(entry) = engine.store().fetch(key)? else {
        bail!("no entry for key {key}");
    };

    out.emit(&entry, || describe(&entry))
}

fn describe(entry: &EntryRecord) -> String {
    let mut lines = vec![
        format!("Key:          {}", entry.key),
        format!("Codec:        {}", entry.codec),
        format!(
            "Size:         {} -> {} ({:.1}% smaller)",
            format_bytes(entry.original_size),
            format_bytes(entry.compressed_size),
            entry.reduction_percent()
        ),
        format!("Created:      {}", timestamp(entry.created_at)),
        format!("Last access:  {}", timestamp(entry.last_accessed_at)),
        format!("Hits:         {}", entry.hit_count),
        format!("Checksum:     {}", entry.checksum),
    ];
    if let Some(source) = &entry.source_fingerprint {
        lines.push(format!("Source:       {source}"));
    }
    if let Some(at) = entry.expires_at {
        lines.push(format!("Expires:      {}", timestamp(at)));
    }
    lines.join("\n")
}

pub fn get(settings: &CacheSettings, key: &str, max_age: Option<u64>) -> anyhow::Result<()> {
    let engine = open_engine(settings)?;
    let value = match max_age {
        Some(secs) => engine.get_with_max_age(key, Duration::from_secs(secs))?,
        None => engine.get(key)?,
    };

    let Some(value) = value else {
        bail!("no fresh entry for key {key}");
    };

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&value.value)?;
    stdout.flush()?;
    Ok(())
}

// ============================================================================
// Maintenance
// ============================================================================

pub fn remove(settings: &CacheSettings, key: &str, out: Output) -> anyhow::Result<()> {
    let engine = open_engine(settings)?;
    let removed = engine.remove(key)?;

    out.emit(&json!({ "key": key, "removed": removed }), || {
        if removed {
            format!("Removed {key}")
        } else {
            format!("No entry for {key}")
        }
    })
}

pub fn clear(settings: &CacheSettings, out: Output) -> anyhow::Result<()> {
    let engine = open_engine(settings)?;
    let removed = engine.clear()?;
    out.emit(&json!({ "removed": removed }), || format!("Removed {removed} entries"))
}

pub fn prune(settings: &CacheSettings, older_than: u64, out: Output) -> anyhow::Result<()> {
    let engine = open_engine(settings)?;
    let removed = engine.prune_older_than(Duration::from_secs(older_than))?;
    out.emit(&json!({ "removed": removed }), || {
        format!("Removed {removed} entries older than {older_than}s")
    })
}

pub fn purge_expired(settings: &CacheSettings, out: Output) -> anyhow::Result<()> {
    let engine = open_engine(settings)?;
    let removed = engine.purge_expired()?;
    out.emit(&json!({ "removed": removed }), || {
        format!("Removed {removed} expired entries")
    })
}

// ============================================================================
// Report
// ============================================================================

pub fn report(settings: &CacheSettings, session: Option<String>, out: Output) -> anyhow::Result<()> {
    let engine = open_engine(settings)?;
    let ledger = UsageLedger::from_settings(engine.store(), engine.clock(), settings);
    let by_operation = ledger.by_operation(None)?;

    match session.or_else(|| settings.session_id.clone()) {
        Some(session_id) => {
            let report = SessionReport::collect_for(&engine, &ledger, &session_id)?;
            let value = json!({ "report": report, "by_operation": operations_json(&by_operation) });
            out.emit(&value, || {
                format!("{report}\n{}", operations_table(&by_operation))
            })
        }
        None => {
            let stats = engine.stats()?;
            let lifetime = ledger.summary(None)?;
            let value = json!({
                "cache": stats,
                "lifetime": lifetime,
                "by_operation": operations_json(&by_operation),
            });
            out.emit(&value, || {
                format!(
                    "Cache report\n  entries:       {} ({} saved)\n  all sessions:  {} hits / {} misses ({:.0}% hit rate), ~{} tokens saved\n{}",
                    stats.entry_count,
                    format_bytes(stats.bytes_saved()),
                    lifetime.hits,
                    lifetime.misses,
                    lifetime.hit_rate() * 100.0,
                    lifetime.total_tokens_saved,
                    operations_table(&by_operation)
                )
            })
        }
    }
}

fn operations_json(by_operation: &[(String, LedgerSummary)]) -> serde_json::Value {
    by_operation
        .iter()
        .map(|(operation, summary)| json!({ "operation": operation, "summary": summary }))
        .collect()
}

fn operations_table(by_operation: &[(String, LedgerSummary)]) -> String {
    if by_operation.is_empty() {
        return String::new();
    }

    let mut lines = vec![format!(
        "\n{:<24} {:>6} {:>6} {:>6} {:>9}",
        "OPERATION", "HITS", "MISSES", "ERRORS", "TOKENS"
    )];
    for (operation, summary) in by_operation {
        lines.push(format!(
            "{:<24} {:>6} {:>6} {:>6} {:>9}",
            operation, summary.hits, summary.misses, summary.errors, summary.total_tokens_saved
        ));
    }
    lines.join("\n")
}

// ============================================================================
// Key
// ============================================================================

pub fn key(namespace: &str, parts: &[String], out: Output) -> anyhow::Result<()> {
    let key = fingerprint(namespace, parts.iter());
    out.emit(&json!({ "namespace": namespace, "key": key }), || key.clone())
}
