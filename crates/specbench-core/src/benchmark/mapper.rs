//! Expansion of a resolved template into executable benchmark configs.

use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::benchmark::discovery::{discover_suite, DiscoveryWarning, SuiteDiscovery};
use crate::config::MapperConfig;
use crate::domain::error::{Result, SpecbenchError, ValidationErrors};
use crate::domain::run::{BenchmarkConfig, ModelAssignment};
use crate::domain::template::{PreferredModel, ResolvedTemplate};

/// Configs produced for a template plus everything discovery skipped.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MappingOutcome {
    pub configs: Vec<BenchmarkConfig>,
    pub warnings: Vec<DiscoveryWarning>,
}

impl MappingOutcome {
    /// Σ|models(config)| — the number of harness executions this maps to.
    pub fn execution_count(&self) -> usize {
        self.configs.iter().map(|c| c.models.len()).sum()
    }
}

pub struct BenchmarkMapper {
    benchmark_root: PathBuf,
    tier_pattern: Regex,
    baseline_model: String,
}

impl BenchmarkMapper {
    pub fn new(config: &MapperConfig) -> Result<Self> {
        let tier_pattern = Regex::new(&config.tier_pattern).map_err(|e| {
            let mut errors = ValidationErrors::default();
            errors.push("mapper.tier_pattern", format!("invalid regex: {}", e));
            SpecbenchError::Validation(errors)
        })?;
        Ok(Self {
            benchmark_root: config.benchmark_root.clone(),
            tier_pattern,
            baseline_model: config.baseline_model.clone(),
        })
    }

    /// Discover one suite's scenarios and tiers.
    pub fn discover(&self, suite_root: &Path) -> SuiteDiscovery {
        discover_suite(suite_root, &self.tier_pattern)
    }

    fn suite_root(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.benchmark_root.join(path)
        }
    }

    /// Cartesian product of declared suites × scenarios × tiers, each config
    /// carrying the template's model list with per-benchmark weights applied.
    pub fn map(&self, template: &ResolvedTemplate) -> MappingOutcome {
        let models: Vec<PreferredModel> = if template.preferred_models.is_empty() {
            warn!(
                template = %template.name,
                baseline = %self.baseline_model,
                "no preferred models declared, using baseline model"
            );
            vec![PreferredModel::new(self.baseline_model.clone(), 1.0)]
        } else {
            template.preferred_models.clone()
        };

        let mut outcome = MappingOutcome::default();
        for suite in &template.benchmarks.test_suites {
            let discovery = self.discover(&self.suite_root(&suite.path));
            outcome.warnings.extend(discovery.warnings);

            for scenario in &discovery.scenarios {
                for tier in &scenario.tiers {
                    let assignments = models
                        .iter()
                        .map(|pm| {
                            ModelAssignment::new(
                                pm.model.clone(),
                                pm.weight,
                                pm.benchmark_weight_for(&suite.name, &scenario.name),
                            )
                        })
                        .collect();
                    outcome.configs.push(BenchmarkConfig {
                        suite: suite.name.clone(),
                        suite_type: suite.suite_type.clone(),
                        scenario: scenario.name.clone(),
                        tier: tier.clone(),
                        models: assignments,
                    });
                }
            }
        }

        outcome
            .configs
            .sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

        info!(
            template = %template.name,
            configs = outcome.configs.len(),
            executions = outcome.execution_count(),
            skipped = outcome.warnings.len(),
            "benchmarks mapped"
        );
        outcome
    }
}
