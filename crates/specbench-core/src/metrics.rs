//! Global atomic counters for benchmark runs.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at the end of a run).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    executions: AtomicU64,
    failures: AtomicU64,
    timeouts: AtomicU64,
    retries: AtomicU64,
    snapshots_saved: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            executions: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            snapshots_saved: AtomicU64::new(0),
        }
    }

    pub fn inc_executions(&self) {
        self.executions.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "executions", "counter incremented");
    }

    pub fn inc_failures(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "failures", "counter incremented");
    }

    /// Timeouts are counted in addition to `failures`.
    pub fn inc_timeouts(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "timeouts", "counter incremented");
    }

    pub fn inc_retries(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "retries", "counter incremented");
    }

    pub fn inc_snapshots_saved(&self) {
        self.snapshots_saved.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "snapshots_saved", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            executions = self.executions(),
            failures = self.failures(),
            timeouts = self.timeouts(),
            retries = self.retries(),
            snapshots_saved = self.snapshots_saved(),
        );
    }

    pub fn executions(&self) -> u64 {
        self.executions.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn timeouts(&self) -> u64 {
        self.timeouts.load(Ordering::Relaxed)
    }

    pub fn retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    pub fn snapshots_saved(&self) -> u64 {
        self.snapshots_saved.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.executions.store(0, Ordering::Relaxed);
        self.failures.store(0, Ordering::Relaxed);
        self.timeouts.store(0, Ordering::Relaxed);
        self.retries.store(0, Ordering::Relaxed);
        self.snapshots_saved.store(0, Ordering::Relaxed);
    }
}
