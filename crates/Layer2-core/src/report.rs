//! Session report - 세션 종료 시 보여줄 요약

use crate::engine::CacheEngine;
use crate::ledger::{LedgerSummary, UsageLedger};
use serde::Serialize;
use smartcache_foundation::{CacheStats, Result};
use std::fmt;

/// Cache contents plus this session's and the project's cumulative savings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionReport {
    pub session_id: String,
    pub cache: CacheStats,
    pub session: LedgerSummary,
    pub lifetime: LedgerSummary,
}

impl SessionReport {
    pub fn collect(engine: &CacheEngine, ledger: &UsageLedger) -> Result<Self> {
        Self::collect_for(engine, ledger, ledger.session_id())
    }

    /// Report for an arbitrary session recorded in the same store
    pub fn collect_for(engine: &CacheEngine, ledger: &UsageLedger, session_id: &str) -> Result<Self> {
        Ok(Self {
            session_id: session_id.to_string(),
            cache: engine.stats()?,
            session: ledger.summary_for_session(session_id)?,
            lifetime: ledger.summary(None)?,
        })
    }
}

impl fmt::Display for SessionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Cache report (session {})", self.session_id)?;
        writeln!(
            f,
            "  entries:       {} ({} stored, {} saved, {:.1}%)",
            self.cache.entry_count,
            format_bytes(self.cache.total_compressed_bytes),
            format_bytes(self.cache.bytes_saved()),
            self.cache.reduction_percent()
        )?;
        writeln!(f, "  session:       {}", SummaryLine(&self.session))?;
        write!(f, "  all sessions:  {}", SummaryLine(&self.lifetime))
    }
}

struct SummaryLine<'a>(&'a LedgerSummary);

impl fmt::Display for SummaryLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.0;
        write!(
            f,
            "{} hits / {} misses ({:.0}% hit rate), ~{} tokens saved",
            s.hits,
            s.misses,
            s.hit_rate() * 100.0,
            s.total_tokens_saved
        )?;
        if s.errors > 0 {
            write!(f, ", {} errors", s.errors)?;
        }
        Ok(())
    }
}

/// 바이트를 사람이 읽기 좋은 형식으로 변환
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
