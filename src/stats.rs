use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

/// Runtime metrics for a `Group`.
///
/// A lightweight, read-only view over the group's deduplication counters.
/// Obtain a `Stats` handle via `Group::stats()`. Values use relaxed atomics
/// and are intended for diagnostics.
#[cfg_attr(docsrs, doc(cfg(feature = "stats")))]
#[derive(Debug, Clone, Default)]
pub struct Stats {
    calls_started: Arc<AtomicU64>,
    callers_joined: Arc<AtomicU64>,
    calls_completed: Arc<AtomicU64>,
}

impl Stats {
    pub(crate) fn record_start(&self) {
        self.calls_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_join(&self) {
        self.callers_joined.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_complete(&self) {
        self.calls_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of calls that started a work closure.
    pub fn calls_started(&self) -> u64 {
        self.calls_started.load(Ordering::Relaxed)
    }

    /// Number of callers that attached to an already-running call instead of
    /// starting their own.
    pub fn callers_joined(&self) -> u64 {
        self.callers_joined.load(Ordering::Relaxed)
    }

    /// Number of calls whose work closure has returned.
    pub fn calls_completed(&self) -> u64 {
        self.calls_completed.load(Ordering::Relaxed)
    }

    /// Fraction of callers served without starting a work closure of their
    /// own. Zero when no caller has arrived yet.
    pub fn dedup_ratio(&self) -> f64 {
        let started = self.calls_started() as f64;
        let joined = self.callers_joined() as f64;
        let total = started + joined;
        if total == 0.0 {
            0.0
        } else {
            joined / total
        }
    }
}
