//! Cached-operation runner
//!
//! 모든 smart wrapper가 공유하는 패턴을 한 곳에 모읍니다:
//! 키 조회 → hit이면 캐시된 결과 반환, miss이면 실제 작업 실행 후 저장 → 사용 기록.
//!
//! 캐시 계층의 실패(저장소 잠김, 손상, 닫힘)는 경고만 남기고 우회합니다.
//! 호출자에게 전파되는 에러는 `compute` 자신의 에러뿐입니다.

use crate::engine::{CacheEngine, Lookup, SetOptions};
use crate::freshness::FreshnessPolicy;
use crate::ledger::{Outcome, UsageLedger};
use smartcache_foundation::{CharRatioEstimator, SourceFingerprint, TokenEstimator};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Result produced by the real tool on a miss
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Computed {
    /// Bytes handed back to the caller (and cached)
    pub value: Vec<u8>,
    /// Size of the raw tool output before shrinking
    pub original_size: u64,
}

impl Computed {
    /// Value returned as-is
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        let value = value.into();
        let original_size = value.len() as u64;
        Self {
            value,
            original_size,
        }
    }

    /// Value shrunk from `original_size` bytes of raw output
    pub fn shrunk(value: impl Into<Vec<u8>>, original_size: u64) -> Self {
        Self {
            value: value.into(),
            original_size,
        }
    }
}

/// What a `run` handed back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    pub value: Vec<u8>,
    pub outcome: Outcome,
    pub tokens_saved: u64,
}

impl RunOutput {
    pub fn is_hit(&self) -> bool {
        self.outcome == Outcome::Hit
    }

    pub fn text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.value)
    }
}

/// Engine + ledger + estimator
pub struct CachedRunner {
    engine: Arc<CacheEngine>,
    ledger: Option<Arc<UsageLedger>>,
    estimator: Box<dyn TokenEstimator>,
}

impl CachedRunner {
    pub fn new(engine: Arc<CacheEngine>) -> Self {
        Self {
            engine,
            ledger: None,
            estimator: Box::new(CharRatioEstimator::default()),
        }
    }

    pub fn with_ledger(mut self, ledger: Arc<UsageLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn with_estimator(mut self, estimator: impl TokenEstimator + 'static) -> Self {
        self.estimator = Box::new(estimator);
        self
    }

    pub fn engine(&self) -> &Arc<CacheEngine> {
        &self.engine
    }

    pub fn ledger(&self) -> Option<&Arc<UsageLedger>> {
        self.ledger.as_ref()
    }

    /// Serve `key` from cache, or run `compute` and cache its result
    ///
    /// `source` is stored alongside a freshly computed value so later
    /// content-checked lookups can detect changes.
    pub fn run<F, E>(
        &self,
        operation: &str,
        key: &str,
        policy: &FreshnessPolicy,
        source: Option<SourceFingerprint>,
        compute: F,
    ) -> std::result::Result<RunOutput, E>
    where
        F: FnOnce() -> std::result::Result<Computed, E>,
    {
        let started = Instant::now();

        match self.engine.get_fresh(key, policy) {
            Ok(Lookup::Hit(cached)) => {
                let tokens_saved = self
                    .estimator
                    .tokens_saved(cached.original_size, cached.value.len() as u64);
                self.record(operation, Outcome::Hit, tokens_saved, started.elapsed());
                return Ok(RunOutput {
                    value: cached.into_value(),
                    outcome: Outcome::Hit,
                    tokens_saved,
                });
            }
            Ok(Lookup::Stale(reason)) => {
                debug!(operation, key, reason = %reason, "recomputing stale entry");
            }
            Ok(Lookup::Miss) => {}
            Err(e) => {
                warn!(operation, key, error = %e, "cache lookup failed; bypassing cache");
            }
        }

        let computed = match compute() {
            Ok(computed) => computed,
            Err(e) => {
                self.record(operation, Outcome::Error, 0, started.elapsed());
                return Err(e);
            }
        };

        let mut options = SetOptions::new().original_size(computed.original_size);
        if let Some(source) = source {
            options = options.source(source);
        }
        if let Err(e) = self.engine.set_with(key, &computed.value, options) {
            warn!(operation, key, error = %e, "failed to cache result");
        }

        let tokens_saved = self
            .estimator
            .tokens_saved(computed.original_size, computed.value.len() as u64);
        self.record(operation, Outcome::Miss, tokens_saved, started.elapsed());

        Ok(RunOutput {
            value: computed.value,
            outcome: Outcome::Miss,
            tokens_saved,
        })
    }

    fn record(&self, operation: &str, outcome: Outcome, tokens_saved: u64, duration: Duration) {
        if let Some(ledger) = &self.ledger {
            if let Err(e) = ledger.record(operation, outcome, tokens_saved, duration) {
                warn!(operation, error = %e, "failed to record usage");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smartcache_foundation::{Clock, ManualClock};
    use std::cell::Cell;

    const T0: i64 = 1_700_000_000_000;

    struct Fixture {
        runner: CachedRunner,
        ledger: Arc<UsageLedger>,
        clock: ManualClock,
    }

    fn fixture() -> Fixture {
        let clock = ManualClock::new(T0);
        let engine = Arc::new(
            CacheEngine::builder()
                .clock(Arc::new(clock.clone()))
                .in_memory()
                .unwrap(),
        );
        let ledger = Arc::new(UsageLedger::new(
            engine.store(),
            Arc::new(clock.clone()) as Arc<dyn Clock>,
            "test-session",
        ));
        let runner = CachedRunner::new(engine).with_ledger(Arc::clone(&ledger));
        Fixture {
            runner,
            ledger,
            clock,
        }
    }

    #[test]
    fn test_miss_then_hit() {
        let f = fixture();
        let calls = Cell::new(0);
        let compute = || -> Result<Computed, String> {
            calls.set(calls.get() + 1);
            Ok(Computed::shrunk("3 passed", 4_000))
        };

        let policy = FreshnessPolicy::max_age(Duration::from_secs(300));
        let first = f.runner.run("smart-test", "k", &policy, None, compute).unwrap();
        assert_eq!(first.outcome, Outcome::Miss);
        assert_eq!(first.text(), "3 passed");

        let second = f.runner.run("smart-test", "k", &policy, None, compute).unwrap();
        assert!(second.is_hit());
        assert_eq!(second.value, b"3 passed");
        // 4000 / 4 - ceil(8 / 4)
        assert_eq!(second.tokens_saved, 998);
        assert_eq!(calls.get(), 1);

        let summary = f.ledger.session_summary().unwrap();
        assert_eq!((summary.hits, summary.misses), (1, 1));
        assert_eq!(summary.total_tokens_saved, 998 * 2);
    }

    #[test]
    fn test_expired_entry_recomputes() {
        let f = fixture();
        let policy = FreshnessPolicy::max_age(Duration::from_secs(60));

        f.runner
            .run("op", "k", &policy, None, || Ok::<_, String>(Computed::new("old")))
            .unwrap();
        f.clock.advance(Duration::from_secs(61));

        let out = f
            .runner
            .run("op", "k", &policy, None, || Ok::<_, String>(Computed::new("new")))
            .unwrap();
        assert_eq!(out.outcome, Outcome::Miss);
        assert_eq!(out.value, b"new");
    }

    #[test]
    fn test_source_change_recomputes() {
        let f = fixture();
        let v1 = SourceFingerprint::of_bytes(b"fn main() {}");
        let v2 = SourceFingerprint::of_bytes(b"fn main() { todo!() }");

        f.runner
            .run(
                "smart-symbols",
                "k",
                &FreshnessPolicy::content(Some(v1.clone())),
                Some(v1.clone()),
                || Ok::<_, String>(Computed::new("main")),
            )
            .unwrap();

        let same = f
            .runner
            .run(
                "smart-symbols",
                "k",
                &FreshnessPolicy::content(Some(v1)),
                None,
                || Err("must not run".to_string()),
            )
            .unwrap();
        assert!(same.is_hit());

        let changed = f
            .runner
            .run(
                "smart-symbols",
                "k",
                &FreshnessPolicy::content(Some(v2.clone())),
                Some(v2),
                || Ok::<_, String>(Computed::new("main, helper")),
            )
            .unwrap();
        assert_eq!(changed.outcome, Outcome::Miss);
    }

    #[test]
    fn test_compute_error_propagates_and_is_recorded() {
        let f = fixture();
        let err = f
            .runner
            .run("smart-build", "k", &FreshnessPolicy::Unchecked, None, || {
                Err::<Computed, _>("cargo not found")
            })
            .unwrap_err();
        assert_eq!(err, "cargo not found");

        assert!(f.runner.engine().get("k").unwrap().is_none());
        assert_eq!(f.ledger.session_summary().unwrap().errors, 1);
    }

    #[test]
    fn test_closed_store_is_bypassed() {
        let f = fixture();
        f.runner.engine().close().unwrap();

        let out = f
            .runner
            .run("op", "k", &FreshnessPolicy::Unchecked, None, || {
                Ok::<_, String>(Computed::new("fresh"))
            })
            .unwrap();
        assert_eq!(out.outcome, Outcome::Miss);
        assert_eq!(out.value, b"fresh");
    }

    #[test]
    fn test_runner_without_ledger() {
        let engine = Arc::new(CacheEngine::in_memory().unwrap());
        let runner = CachedRunner::new(engine);
        assert!(runner.ledger().is_none());

        let out = runner
            .run("op", "k", &FreshnessPolicy::Unchecked, None, || {
                Ok::<_, String>(Computed::new(vec![0u8; 10]))
            })
            .unwrap();
        assert_eq!(out.tokens_saved, 0);
    }
}
