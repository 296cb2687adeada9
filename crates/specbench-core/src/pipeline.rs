//! End-to-end flow: resolve, map, execute, report, and optionally snapshot.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::aggregate::{generate_report, RunReport};
use crate::benchmark::{BenchmarkMapper, DiscoveryWarning};
use crate::config::SpecbenchConfig;
use crate::domain::error::Result;
use crate::domain::run::{BenchmarkConfig, BenchmarkResult};
use crate::domain::template::ResolvedTemplate;
use crate::engine::{ExecutionEngine, HarnessRunner, ProcessHarness};
use crate::snapshot::{GeneratorOptions, Snapshot, SnapshotGenerator};
use crate::store::{SnapshotStore, StoredSnapshot};
use crate::template::{ResolutionCache, TemplateResolver};

/// Everything one benchmark run produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineRun {
    pub template: ResolvedTemplate,
    pub configs: Vec<BenchmarkConfig>,
    pub warnings: Vec<DiscoveryWarning>,
    pub results: Vec<BenchmarkResult>,
    pub report: RunReport,
}

pub struct Pipeline {
    resolver: TemplateResolver,
    mapper: BenchmarkMapper,
    engine: ExecutionEngine,
}

impl Pipeline {
    pub fn new(config: &SpecbenchConfig, harness: Arc<dyn HarnessRunner>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            resolver: TemplateResolver::with_scopes(config.resolver.scopes.clone()),
            mapper: BenchmarkMapper::new(&config.mapper)?,
            engine: ExecutionEngine::new(harness, &config.execution),
        })
    }

    /// Pipeline driving the configured harness binary.
    pub fn from_config(config: &SpecbenchConfig) -> Result<Self> {
        Self::new(config, Arc::new(ProcessHarness::from_config(&config.harness)))
    }

    pub fn resolver(&self) -> &TemplateResolver {
        &self.resolver
    }

    pub fn engine(&self) -> &ExecutionEngine {
        &self.engine
    }

    /// Resolve the template at `path` and run all of its benchmarks.
    ///
    /// `concurrency` overrides the configured worker count for this run.
    #[instrument(skip(self, path, cache), fields(path = %path.as_ref().display()))]
    pub async fn run(
        &self,
        path: impl AsRef<Path>,
        cache: &mut ResolutionCache,
        concurrency: Option<usize>,
    ) -> Result<PipelineRun> {
        let template = self.resolver.resolve(path.as_ref(), cache)?;
        let mapping = self.mapper.map(&template);
        let results = self.engine.run_all(&mapping.configs, concurrency).await;
        let report = generate_report(&results, &template);

        info!(
            template = %template.name,
            version = %template.version,
            executions = results.len(),
            failed = report.summary.failed,
            "benchmark run complete"
        );
        Ok(PipelineRun {
            template,
            configs: mapping.configs,
            warnings: mapping.warnings,
            results,
            report,
        })
    }

    /// Re-run the failed executions of `run` and rebuild its report.
    pub async fn retry_failures(&self, run: PipelineRun, max_retries: u32) -> PipelineRun {
        if max_retries == 0 || run.results.iter().all(|r| r.success) {
            return run;
        }
        let results = self.engine.retry_failures(&run.results, max_retries).await;
        let report = generate_report(&results, &run.template);
        PipelineRun {
            results,
            report,
            ..run
        }
    }

    /// Snapshot a finished run.
    pub fn snapshot(&self, run: &PipelineRun, options: GeneratorOptions) -> Result<Snapshot> {
        SnapshotGenerator::new(options).generate(&run.template, Some(&run.results))
    }

    /// Snapshot a finished run and persist it.
    pub fn record(
        &self,
        run: &PipelineRun,
        options: GeneratorOptions,
        store: &SnapshotStore,
    ) -> Result<(Snapshot, StoredSnapshot)> {
        let snapshot = self.snapshot(run, options)?;
        let stored = store.save(&snapshot)?;
        Ok((snapshot, stored))
    }
}
