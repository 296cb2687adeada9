//! Concurrent benchmark execution.
//!
//! [`ExecutionEngine::run_all`] expands configs into one job per
//! (config, model) pair and drains them with a fixed pool of worker tasks.
//! Workers claim jobs from a shared cursor, so no pair is dispatched twice,
//! and each writes its result into the job's own slot. Harness failures and
//! timeouts become failed results; they never abort sibling jobs.

pub mod harness;
pub mod score;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::time::Instant;
use tracing::{info, info_span, instrument, warn, Instrument};

use crate::config::ExecutionConfig;
use crate::domain::error::ExecutionError;
use crate::domain::run::{BenchmarkConfig, BenchmarkResult, ModelAssignment};
use crate::metrics::METRICS;
use crate::obs;

pub use harness::{adapter_for, HarnessOutput, HarnessRunner, ProcessHarness};
pub use score::extract_score;

/// Worker count for a run of `config_count` configs when none is given.
pub fn default_concurrency(config_count: usize) -> usize {
    match config_count {
        0..=5 => 2,
        6..=15 => 3,
        16..=30 => 5,
        _ => 8,
    }
}

type Job = (BenchmarkConfig, ModelAssignment);

/// Drives the harness over benchmark configs.
#[derive(Clone)]
pub struct ExecutionEngine {
    harness: Arc<dyn HarnessRunner>,
    timeout: Duration,
    backoff_base: Duration,
    concurrency: Option<usize>,
}

impl ExecutionEngine {
    pub fn new(harness: Arc<dyn HarnessRunner>, config: &ExecutionConfig) -> Self {
        Self {
            harness,
            timeout: config.timeout(),
            backoff_base: config.backoff_base(),
            concurrency: config.concurrency,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run every (config, model) pair and return results in job order:
    /// config order, then model declaration order within a config.
    ///
    /// `concurrency` overrides the engine's configured worker count, which in
    /// turn overrides [`default_concurrency`]. Values below 1 are raised to 1.
    #[instrument(skip(self, configs), fields(configs = configs.len()))]
    pub async fn run_all(
        &self,
        configs: &[BenchmarkConfig],
        concurrency: Option<usize>,
    ) -> Vec<BenchmarkResult> {
        let jobs: Vec<Job> = configs
            .iter()
            .flat_map(|c| c.models.iter().map(move |m| (c.clone(), m.clone())))
            .collect();
        if jobs.is_empty() {
            return Vec::new();
        }

        let concurrency = concurrency
            .or(self.concurrency)
            .unwrap_or_else(|| default_concurrency(configs.len()))
            .max(1);
        let workers = concurrency.min(jobs.len());

        let run_id = uuid::Uuid::new_v4().to_string();
        obs::emit_run_started(&run_id, configs.len(), jobs.len(), workers);
        let started = Instant::now();

        let jobs = Arc::new(jobs);
        let slots: Arc<Vec<OnceLock<BenchmarkResult>>> =
            Arc::new((0..jobs.len()).map(|_| OnceLock::new()).collect());
        let cursor = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::with_capacity(workers);
        for worker in 0..workers {
            let engine = self.clone();
            let jobs = Arc::clone(&jobs);
            let slots = Arc::clone(&slots);
            let cursor = Arc::clone(&cursor);

            let span = info_span!("specbench.worker", run_id = %run_id, worker);

            handles.push(tokio::spawn(
                async move {
                    loop {
                        let index = cursor.fetch_add(1, Ordering::SeqCst);
                        let Some((config, model)) = jobs.get(index) else {
                            break;
                        };
                        let result = engine.execute(config, model).await;
                        if slots[index].set(result).is_err() {
                            warn!(index, "result slot already filled");
                        }
                    }
                }
                .instrument(span),
            ));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "benchmark worker aborted");
            }
        }

        let results: Vec<BenchmarkResult> = slots
            .iter()
            .zip(jobs.iter())
            .map(|(slot, (config, model))| {
                slot.get().cloned().unwrap_or_else(|| {
                    BenchmarkResult::failed(
                        config.clone(),
                        model.clone(),
                        "benchmark worker aborted before completion",
                        0,
                    )
                })
            })
            .collect();

        let failed = results.iter().filter(|r| !r.success).count();
        obs::emit_run_finished(
            &run_id,
            started.elapsed().as_millis() as u64,
            results.len(),
            failed,
        );
        results
    }

    /// Run a single (config, model) pair once, bounded by the engine timeout.
    pub async fn execute(
        &self,
        config: &BenchmarkConfig,
        model: &ModelAssignment,
    ) -> BenchmarkResult {
        let label = config.label();
        let started = Instant::now();
        METRICS.inc_executions();

        let run = self.harness.run(config, &model.model);
        let outcome = match tokio::time::timeout(self.timeout, run).await {
            Ok(result) => result,
            Err(_elapsed) => Err(ExecutionError::Timeout {
                limit_secs: self.timeout.as_secs(),
            }),
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(output) => {
                let raw = extract_score(&output.stdout);
                obs::emit_benchmark_executed(&label, &model.model, true, raw, duration_ms);
                BenchmarkResult::succeeded(config.clone(), model.clone(), raw, duration_ms)
            }
            Err(e) => {
                METRICS.inc_failures();
                if e.is_timeout() {
                    METRICS.inc_timeouts();
                }
                obs::emit_benchmark_failed(&label, &model.model, &e);
                BenchmarkResult::failed(config.clone(), model.clone(), e.to_string(), duration_ms)
            }
        }
    }

    /// Run once, then retry on failure up to `max_retries` more times.
    ///
    /// The n-th retry (0-based) is preceded by a sleep of
    /// `backoff_base × 2^n`. Returns the first success or the last failure,
    /// with `attempts` set to the number of executions made.
    #[instrument(
        skip(self, config, model),
        fields(benchmark = %config.label(), model = %model.model)
    )]
    pub async fn retry_benchmark(
        &self,
        config: &BenchmarkConfig,
        model: &ModelAssignment,
        max_retries: u32,
    ) -> BenchmarkResult {
        let mut result = self.execute(config, model).await;
        let mut attempts = 1;

        for retry in 0..max_retries {
            if result.success {
                break;
            }
            let delay = self.backoff_base.saturating_mul(2u32.saturating_pow(retry));
            info!(
                attempt = attempts + 1,
                delay_ms = delay.as_millis() as u64,
                "retrying benchmark"
            );
            tokio::time::sleep(delay).await;

            METRICS.inc_retries();
            result = self.execute(config, model).await;
            attempts += 1;
        }

        result.with_attempts(attempts)
    }

    /// Re-run the failed entries of a previous run, keeping successes as-is.
    ///
    /// At most the engine's concurrency (or the step table for the failure
    /// count) retries are in flight at once. Order is preserved; a retried
    /// entry's `attempts` includes the executions of the original run.
    pub async fn retry_failures(
        &self,
        results: &[BenchmarkResult],
        max_retries: u32,
    ) -> Vec<BenchmarkResult> {
        let failures = results.iter().filter(|r| !r.success).count();
        let limit = self
            .concurrency
            .unwrap_or_else(|| default_concurrency(failures))
            .max(1);

        stream::iter(results)
            .map(|r| async move {
                if r.success {
                    return r.clone();
                }
                let again = self.retry_benchmark(&r.config, &r.model, max_retries).await;
                let attempts = r.attempts + again.attempts;
                again.with_attempts(attempts)
            })
            .buffered(limit)
            .collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use proptest::prelude::*;

    fn config(scenario: &str, models: &[&str]) -> BenchmarkConfig {
        BenchmarkConfig {
            suite: "web".to_string(),
            suite_type: "implementation".to_string(),
            scenario: scenario.to_string(),
            tier: "L1".to_string(),
            models: models
                .iter()
                .map(|m| ModelAssignment::new(*m, 0.5, 1.0))
                .collect(),
        }
    }

    fn engine(harness: impl HarnessRunner + 'static) -> ExecutionEngine {
        ExecutionEngine::new(Arc::new(harness), &ExecutionConfig::default())
    }

    /// Scores from the scenario name length; tracks peak concurrency.
    #[derive(Default)]
    struct CountingHarness {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl HarnessRunner for CountingHarness {
        async fn run(
            &self,
            config: &BenchmarkConfig,
            model: &str,
        ) -> Result<HarnessOutput, ExecutionError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.calls
                .lock()
                .unwrap()
                .push(format!("{}:{}", config.scenario, model));
            Ok(HarnessOutput {
                stdout: format!("Final Score: {}", config.scenario.len()),
                stderr: String::new(),
            })
        }
    }

    #[test]
    fn test_default_concurrency_table() {
        assert_eq!(default_concurrency(1), 2);
        assert_eq!(default_concurrency(5), 2);
        assert_eq!(default_concurrency(7), 3);
        assert_eq!(default_concurrency(15), 3);
        assert_eq!(default_concurrency(16), 5);
        assert_eq!(default_concurrency(30), 5);
        assert_eq!(default_concurrency(31), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_seven_configs_follow_step_table() {
        let harness = Arc::new(CountingHarness::default());
        let engine = ExecutionEngine::new(harness.clone(), &ExecutionConfig::default());
        let configs: Vec<_> = (0..7).map(|i| config(&format!("s{i}"), &["gpt-4o"])).collect();

        let results = engine.run_all(&configs, None).await;
        assert_eq!(results.len(), 7);
        assert_eq!(harness.peak.load(Ordering::SeqCst), default_concurrency(7));
        assert_eq!(harness.peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_five_configs_run_with_two_workers() {
        let harness = Arc::new(CountingHarness::default());
        let engine = ExecutionEngine::new(harness.clone(), &ExecutionConfig::default());
        let configs: Vec<_> = (0..5).map(|i| config(&format!("s{i}"), &["gpt-4o"])).collect();

        let results = engine.run_all(&configs, None).await;
        assert_eq!(results.len(), 5);
        assert_eq!(harness.peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_in_job_order_and_count() {
        let harness = Arc::new(CountingHarness::default());
        let engine = ExecutionEngine::new(harness.clone(), &ExecutionConfig::default());
        let configs = vec![
            config("a", &["gpt-4o", "claude-sonnet-4"]),
            config("bbb", &["gpt-4o"]),
            config("cc", &["gpt-4o", "gemini-2.5-pro", "llama3"]),
        ];

        let results = engine.run_all(&configs, Some(4)).await;
        assert_eq!(results.len(), 6);
        let order: Vec<(String, String)> = results
            .iter()
            .map(|r| (r.config.scenario.clone(), r.model.model.clone()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("a".into(), "gpt-4o".into()),
                ("a".into(), "claude-sonnet-4".into()),
                ("bbb".into(), "gpt-4o".into()),
                ("cc".into(), "gpt-4o".into()),
                ("cc".into(), "gemini-2.5-pro".into()),
                ("cc".into(), "llama3".into()),
            ]
        );
        assert_eq!(results[2].raw_score, 3.0);
        assert_eq!(results[2].weighted_score, 1.5);
        assert!(harness.peak.load(Ordering::SeqCst) <= 4);
        assert_eq!(harness.calls.lock().unwrap().len(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_override_clamped_to_one() {
        let harness = Arc::new(CountingHarness::default());
        let engine = ExecutionEngine::new(harness.clone(), &ExecutionConfig::default());
        let configs: Vec<_> = (0..4).map(|i| config(&format!("s{i}"), &["gpt-4o"])).collect();

        let results = engine.run_all(&configs, Some(0)).await;
        assert_eq!(results.len(), 4);
        assert_eq!(harness.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_run() {
        let results = engine(CountingHarness::default()).run_all(&[], None).await;
        assert!(results.is_empty());
    }

    /// Hangs for the `slow` scenario, answers immediately otherwise.
    struct SlowHarness;

    #[async_trait]
    impl HarnessRunner for SlowHarness {
        async fn run(
            &self,
            config: &BenchmarkConfig,
            _model: &str,
        ) -> Result<HarnessOutput, ExecutionError> {
            if config.scenario == "slow" {
                tokio::time::sleep(Duration::from_secs(3_600)).await;
            }
            Ok(HarnessOutput {
                stdout: "Score: 8".to_string(),
                stderr: String::new(),
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_isolated_to_one_execution() {
        let engine = engine(SlowHarness).with_timeout(Duration::from_secs(600));
        let configs = vec![
            config("fast-1", &["gpt-4o"]),
            config("slow", &["gpt-4o"]),
            config("fast-2", &["gpt-4o"]),
        ];

        let results = engine.run_all(&configs, None).await;
        assert_eq!(results.len(), 3);
        assert!(results[0].success);
        assert!(results[2].success);
        assert!(!results[1].success);
        assert!(results[1].error.as_deref().unwrap().contains("timed out"));
        assert_eq!(results[1].raw_score, 0.0);
    }

    /// Fails until `succeed_on` calls have been made.
    struct FlakyHarness {
        calls: AtomicUsize,
        succeed_on: usize,
    }

    #[async_trait]
    impl HarnessRunner for FlakyHarness {
        async fn run(
            &self,
            _config: &BenchmarkConfig,
            _model: &str,
        ) -> Result<HarnessOutput, ExecutionError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n >= self.succeed_on {
                Ok(HarnessOutput {
                    stdout: "Overall Score: 9/10".to_string(),
                    stderr: String::new(),
                })
            } else {
                Err(ExecutionError::NonZeroExit {
                    code: Some(1),
                    stderr: "flaky".to_string(),
                })
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_backoff_then_success() {
        let engine = engine(FlakyHarness {
            calls: AtomicUsize::new(0),
            succeed_on: 3,
        });
        let cfg = config("todo", &["gpt-4o"]);
        let started = Instant::now();

        let result = engine.retry_benchmark(&cfg, &cfg.models[0], 5).await;
        assert!(result.success);
        assert_eq!(result.attempts, 3);
        assert_eq!(result.raw_score, 9.0);
        // 1s + 2s of backoff before the second and third attempts.
        assert!(started.elapsed() >= Duration::from_secs(3));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhausted_returns_last_failure() {
        let engine = engine(FlakyHarness {
            calls: AtomicUsize::new(0),
            succeed_on: usize::MAX,
        });
        let cfg = config("todo", &["gpt-4o"]);

        let result = engine.retry_benchmark(&cfg, &cfg.models[0], 2).await;
        assert!(!result.success);
        assert_eq!(result.attempts, 3);
        assert!(result.error.as_deref().unwrap().contains("flaky"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_failures_only_reruns_failed() {
        let harness = Arc::new(FlakyHarness {
            calls: AtomicUsize::new(0),
            succeed_on: 1,
        });
        let engine = ExecutionEngine::new(harness.clone(), &ExecutionConfig::default());
        let a = config("a", &["gpt-4o"]);
        let b = config("b", &["gpt-4o"]);
        let previous = vec![
            BenchmarkResult::succeeded(a.clone(), a.models[0].clone(), 7.0, 5),
            BenchmarkResult::failed(b.clone(), b.models[0].clone(), "boom", 5),
        ];

        let results = engine.retry_failures(&previous, 1).await;
        assert_eq!(harness.calls.load(Ordering::SeqCst), 1);
        assert_eq!(results[0], previous[0]);
        assert!(results[1].success);
        assert_eq!(results[1].attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_failures_respects_concurrency() {
        let harness = Arc::new(CountingHarness::default());
        let engine = ExecutionEngine::new(
            harness.clone(),
            &ExecutionConfig {
                concurrency: Some(2),
                ..ExecutionConfig::default()
            },
        );
        let previous: Vec<BenchmarkResult> = (0..20)
            .map(|i| {
                let cfg = config(&format!("s{i}"), &["gpt-4o"]);
                let model = cfg.models[0].clone();
                BenchmarkResult::failed(cfg, model, "exit 1", 5)
            })
            .collect();

        let results = engine.retry_failures(&previous, 1).await;
        assert_eq!(results.len(), 20);
        assert!(results.iter().all(|r| r.success));
        assert_eq!(results[7].config.scenario, "s7");
        assert_eq!(harness.calls.lock().unwrap().len(), 20);
        assert_eq!(harness.peak.load(Ordering::SeqCst), 2);
    }

    proptest! {
        #[test]
        fn prop_weighted_score_is_product(
            raw in 0.0f64..=10.0,
            weight in 0.0f64..=1.0,
            benchmark_weight in 0.0f64..=1.0,
        ) {
            let cfg = config("p", &["gpt-4o"]);
            let model = ModelAssignment::new("gpt-4o", weight, benchmark_weight);
            let result = BenchmarkResult::succeeded(cfg, model, raw, 1);
            prop_assert!((result.weighted_score - raw * weight * benchmark_weight).abs() < 1e-12);
            prop_assert!(result.weighted_score <= raw + 1e-12);
        }
    }
}
