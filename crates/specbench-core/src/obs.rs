//! Structured observability hooks for benchmark runs and snapshots.
//!
//! This module provides:
//! - Run-scoped tracing spans via `RunSpan` RAII guard
//! - Emission functions for key lifecycle events: run start, per-benchmark
//!   execution, run finish, snapshot generation and persistence
//!
//! Events are emitted at `info!` level. Filter with `RUST_LOG`.

use tracing::{info, warn};

/// RAII guard that enters a run-scoped tracing span for the duration of a run.
///
/// # Example
///
/// ```ignore
/// let _span = RunSpan::enter("3f1c...");
/// // every event below is tagged with run_id = "3f1c..."
/// ```
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    pub fn enter(run_id: &str) -> Self {
        let span = tracing::info_span!("specbench.run", run_id = %run_id);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: run started with its config and execution counts.
pub fn emit_run_started(run_id: &str, configs: usize, executions: usize, concurrency: usize) {
    info!(
        event = "run.started",
        run_id = %run_id,
        configs = configs,
        executions = executions,
        concurrency = concurrency,
    );
}

/// Emit event: one (config, model) execution completed.
pub fn emit_benchmark_executed(
    benchmark: &str,
    model: &str,
    success: bool,
    raw_score: f64,
    duration_ms: u64,
) {
    info!(
        event = "benchmark.executed",
        benchmark = %benchmark,
        model = %model,
        success = success,
        raw_score = raw_score,
        duration_ms = duration_ms,
    );
}

/// Emit event: a failed execution, with the captured error.
pub fn emit_benchmark_failed(benchmark: &str, model: &str, error: &dyn std::fmt::Display) {
    warn!(event = "benchmark.failed", benchmark = %benchmark, model = %model, error = %error);
}

/// Emit event: run finished.
pub fn emit_run_finished(run_id: &str, duration_ms: u64, total: usize, failed: usize) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        total = total,
        failed = failed,
    );
}

pub fn emit_snapshot_generated(snapshot_id: &str, template: &str, version: &str) {
    info!(
        event = "snapshot.generated",
        snapshot_id = %snapshot_id,
        template = %template,
        version = %version,
    );
}

/// Emit event: snapshot persisted (or skipped because it already existed).
pub fn emit_snapshot_saved(snapshot_id: &str, path: &str, skipped: bool) {
    info!(
        event = "snapshot.saved",
        snapshot_id = %snapshot_id,
        path = %path,
        skipped = skipped,
    );
}
