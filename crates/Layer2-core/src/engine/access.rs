//! Buffered access bookkeeping
//!
//! Hits are counted in memory and written in one transaction every
//! `flush_every` recorded hits.

use std::collections::HashMap;

#[derive(Debug, Default)]
pub(crate) struct AccessBuffer {
    pending: HashMap<String, PendingAccess>,
    recorded: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct PendingAccess {
    pub hits: u64,
    pub last_at: i64,
}

impl AccessBuffer {
    /// Record one hit; returns the pending state for `key` after it
    pub fn record(&mut self, key: &str, at: i64) -> PendingAccess {
        self.recorded = self.recorded.saturating_add(1);
        let entry = self.pending.entry(key.to_string()).or_default();
        entry.hits += 1;
        entry.last_at = entry.last_at.max(at);
        *entry
    }

    pub fn should_flush(&self, flush_every: u32) -> bool {
        self.recorded >= flush_every.max(1)
    }

    /// Drop bookkeeping for an entry that was replaced or removed
    pub fn forget(&mut self, key: &str) {
        self.pending.remove(key);
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.recorded = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Take everything as `(key, hits, last_at)` rows
    pub fn drain(&mut self) -> Vec<(String, u64, i64)> {
        self.recorded = 0;
        self.pending
            .drain()
            .map(|(key, access)| (key, access.hits, access.last_at))
            .collect()
    }

    /// Put back rows whose write failed, merged with hits recorded meanwhile
    pub fn restore(&mut self, rows: Vec<(String, u64, i64)>) {
        for (key, hits, last_at) in rows {
            self.recorded = self.recorded.saturating_add(u32::try_from(hits).unwrap_or(u32::MAX));
            let entry = self.pending.entry(key).or_default();
            entry.hits += hits;
            entry.last_at = entry.last_at.max(last_at);
        }
    }
}
