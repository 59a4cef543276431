//! Usage Ledger - 캐시 사용 기록 및 집계
//!
//! 캐시를 거친 모든 작업(hit / miss / error)을 저장소 파일의
//! `usage_ledger` 테이블에 append-only로 기록합니다.
//! 기록은 세션 ID로 태깅되어 세션 단위와 프로젝트 전체 누적을 모두 집계할 수 있습니다.
//!
//! ## 사용법
//!
//! ```ignore
//! let ledger = UsageLedger::from_settings(engine.store(), engine.clock(), &settings);
//!
//! ledger.record("smart-test", Outcome::Hit, 1_200, elapsed)?;
//!
//! let session = ledger.session_summary()?;
//! println!("{} hits, {:.0}% hit rate", session.hits, session.hit_rate() * 100.0);
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use smartcache_foundation::clock::duration_to_millis;
use smartcache_foundation::{
    CacheSettings, Clock, Result, Store, UsageFilter, UsageRecord, UsageTotals,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub use smartcache_foundation::Outcome;

// ============================================================================
// LedgerSummary
// ============================================================================

/// Aggregated ledger view
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LedgerSummary {
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
    pub total_tokens_saved: u64,
    pub total_duration: Duration,
}

impl LedgerSummary {
    /// `hits / (hits + misses)`; errors are not lookups. 0.0 when empty.
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }

    pub fn operations(&self) -> u64 {
        self.hits + self.misses + self.errors
    }
}

impl From<UsageTotals> for LedgerSummary {
    fn from(totals: UsageTotals) -> Self {
        Self {
            hits: totals.hits,
            misses: totals.misses,
            errors: totals.errors,
            total_tokens_saved: totals.tokens_saved,
            total_duration: Duration::from_millis(totals.duration_ms),
        }
    }
}

// ============================================================================
// UsageLedger
// ============================================================================

/// Session-tagged, persistent usage ledger
pub struct UsageLedger {
    store: Arc<Store>,
    clock: Arc<dyn Clock>,
    session_id: String,
    enabled: bool,
}

impl UsageLedger {
    pub fn new(store: Arc<Store>, clock: Arc<dyn Clock>, session_id: impl Into<String>) -> Self {
        Self {
            store,
            clock,
            session_id: session_id.into(),
            enabled: true,
        }
    }

    /// Session id from settings, or a fresh UUID v4
    pub fn from_settings(store: Arc<Store>, clock: Arc<dyn Clock>, settings: &CacheSettings) -> Self {
        let session_id = settings
            .session_id
            .clone()
            .unwrap_or_else(new_session_id);

        let mut ledger = Self::new(store, clock, session_id);
        ledger.enabled = settings.ledger.enabled;
        ledger
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Append one record; a no-op when the ledger is disabled
    pub fn record(
        &self,
        operation: &str,
        outcome: Outcome,
        tokens_saved: u64,
        duration: Duration,
    ) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let record = UsageRecord {
            session_id: self.session_id.clone(),
            operation: operation.to_string(),
            outcome,
            tokens_saved,
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            recorded_at: self.clock.now_millis(),
        };

        self.store.append_usage(&record)?;
        debug!(operation, outcome = %outcome, tokens_saved, "usage recorded");
        Ok(())
    }

    /// Every session, optionally from `since` on
    pub fn summary(&self, since: Option<DateTime<Utc>>) -> Result<LedgerSummary> {
        let filter = since_filter(since);
        Ok(self.store.usage_summary(&filter)?.into())
    }

    /// This ledger's session
    pub fn session_summary(&self) -> Result<LedgerSummary> {
        self.summary_for_session(&self.session_id)
    }

    pub fn summary_for_session(&self, session_id: &str) -> Result<LedgerSummary> {
        let filter = UsageFilter::all().session(session_id);
        Ok(self.store.usage_summary(&filter)?.into())
    }

    /// Per-operation totals, busiest first
    pub fn by_operation(&self, since: Option<DateTime<Utc>>) -> Result<Vec<(String, LedgerSummary)>> {
        let filter = since_filter(since);
        Ok(self
            .store
            .usage_by_operation(&filter)?
            .into_iter()
            .map(|(operation, totals)| (operation, totals.into()))
            .collect())
    }

    /// Drop records older than `retention`
    pub fn prune(&self, retention: Duration) -> Result<usize> {
        let cutoff = self
            .clock
            .now_millis()
            .saturating_sub(duration_to_millis(retention));
        self.store.prune_usage_before(cutoff)
    }

    /// Retention from settings (`ledger.retention_days`)
    pub fn prune_with_settings(&self, settings: &CacheSettings) -> Result<usize> {
        let days = u64::from(settings.ledger.retention_days);
        self.prune(Duration::from_secs(days * 86_400))
    }
}

pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn since_filter(since: Option<DateTime<Utc>>) -> UsageFilter {
    match since {
        Some(at) => UsageFilter::all().since(at.timestamp_millis()),
        None => UsageFilter::all(),
    }
}
