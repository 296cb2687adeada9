//! Snapshot construction with strict template validation.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::{aggregate, AggregatedScore};
use crate::domain::digest::checksum_of;
use crate::domain::error::{Result, SpecbenchError};
use crate::domain::run::BenchmarkResult;
use crate::domain::semver::SemVer;
use crate::domain::template::ResolvedTemplate;
use crate::obs;
use crate::snapshot::{verify_checksums, Snapshot, SnapshotData, SnapshotMetadata};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GeneratorOptions {
    /// Accept versions like `2.0.0-rc.1`.
    pub allow_prerelease: bool,
    /// Embed the raw results (and their checksum).
    pub include_results: bool,
    /// Compute and embed the aggregate when results are given.
    pub include_aggregate: bool,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            allow_prerelease: false,
            include_results: true,
            include_aggregate: true,
        }
    }
}

/// Publication-grade checks on top of the structural template validation.
///
/// Every violation is collected before failing.
pub fn validate_for_snapshot(template: &ResolvedTemplate, allow_prerelease: bool) -> Result<()> {
    let (mut errors, _warnings) = template.validate();

    let t = template.as_template();
    let sections = [
        ("persona", t.persona.is_some()),
        ("capabilities", t.capabilities.is_some()),
        ("dependencies", t.dependencies.is_some()),
        ("documentation", t.documentation.is_some()),
        ("prompts", t.prompts.is_some()),
    ];
    for (field, present) in sections {
        if !present {
            errors.push(field, "is required for snapshots");
        }
    }
    if t.maintainers.is_empty() {
        errors.push("maintainers", "at least one maintainer is required");
    }
    if t.preferred_models.is_empty() {
        errors.push("preferred_models", "at least one preferred model is required");
    }

    if let Some(version) = SemVer::parse(&t.version) {
        if version.is_prerelease() && !allow_prerelease {
            errors.push(
                "version",
                format!("prerelease version '{}' is not allowed", t.version),
            );
        }
    }

    errors.into_result()
}

#[derive(Debug, Clone, Default)]
pub struct SnapshotGenerator {
    options: GeneratorOptions,
}

impl SnapshotGenerator {
    pub fn new(options: GeneratorOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &GeneratorOptions {
        &self.options
    }

    /// Build a snapshot, deriving the aggregate from `results`.
    pub fn generate(
        &self,
        template: &ResolvedTemplate,
        results: Option<&[BenchmarkResult]>,
    ) -> Result<Snapshot> {
        let aggregate = match results {
            Some(results) if self.options.include_aggregate => Some(aggregate(results, template)),
            _ => None,
        };
        self.build(template, aggregate, results)
    }

    /// Build a snapshot around an aggregate computed elsewhere.
    pub fn generate_with_aggregate(
        &self,
        template: &ResolvedTemplate,
        aggregate: AggregatedScore,
        results: Option<&[BenchmarkResult]>,
    ) -> Result<Snapshot> {
        self.build(template, Some(aggregate), results)
    }

    fn build(
        &self,
        template: &ResolvedTemplate,
        aggregate: Option<AggregatedScore>,
        results: Option<&[BenchmarkResult]>,
    ) -> Result<Snapshot> {
        validate_for_snapshot(template, self.options.allow_prerelease)?;

        let results: Option<Vec<BenchmarkResult>> = results
            .filter(|_| self.options.include_results)
            .map(<[BenchmarkResult]>::to_vec);

        let metadata = SnapshotMetadata {
            snapshot_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            generator_version: crate::VERSION.to_string(),
            template_checksum: checksum_of(template)?,
            benchmark_checksum: results.as_ref().map(checksum_of).transpose()?,
            aggregate_checksum: aggregate.as_ref().map(checksum_of).transpose()?,
        };

        let snapshot = Snapshot::from_data(SnapshotData {
            template: template.clone(),
            metadata,
            aggregate,
            results,
        });

        verify_checksums(&snapshot).map_err(|e| {
            SpecbenchError::Storage(format!("snapshot failed its own checksum check: {}", e))
        })?;

        obs::emit_snapshot_generated(
            &snapshot.id().to_string(),
            snapshot.name(),
            snapshot.version(),
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::run::{BenchmarkConfig, ModelAssignment};
    use crate::domain::template::{
        Benchmarks, Capabilities, Dependencies, Documentation, Maintainer, Persona,
        PreferredModel, Prompts, SpecialistTemplate, TestSuite,
    };
    use crate::snapshot::checksum_mismatches;

    fn complete(version: &str) -> SpecialistTemplate {
        SpecialistTemplate {
            schema_version: "1.0".to_string(),
            name: "fullstack".to_string(),
            version: version.to_string(),
            maintainers: vec![Maintainer {
                name: "Ada".to_string(),
                email: None,
            }],
            persona: Some(Persona::default()),
            capabilities: Some(Capabilities::default()),
            dependencies: Some(Dependencies::default()),
            documentation: Some(Documentation::default()),
            prompts: Some(Prompts::default()),
            preferred_models: vec![PreferredModel::new("gpt-4o", 0.9)],
            benchmarks: Benchmarks {
                test_suites: vec![TestSuite {
                    name: "web".to_string(),
                    path: "web".to_string(),
                    suite_type: "implementation".to_string(),
                }],
            },
            ..Default::default()
        }
    }

    fn resolved(version: &str) -> ResolvedTemplate {
        ResolvedTemplate::from_template(complete(version)).unwrap()
    }

    fn results() -> Vec<BenchmarkResult> {
        let config = BenchmarkConfig {
            suite: "web".to_string(),
            suite_type: "implementation".to_string(),
            scenario: "todo".to_string(),
            tier: "L1".to_string(),
            models: vec![ModelAssignment::new("gpt-4o", 0.9, 1.0)],
        };
        let model = config.models[0].clone();
        vec![
            BenchmarkResult::succeeded(config.clone(), model.clone(), 8.0, 1_000),
            BenchmarkResult::failed(config, model, "exit 2", 50),
        ]
    }

    #[test]
    fn test_generate_embeds_results_and_aggregate() {
        let results = results();
        let snapshot = SnapshotGenerator::default()
            .generate(&resolved("1.2.0"), Some(&results))
            .unwrap();

        assert_eq!(snapshot.results().unwrap().len(), 2);
        let agg = snapshot.aggregate().unwrap();
        assert_eq!(agg.failed, 1);
        assert!((agg.overall_weighted - 7.2).abs() < 1e-9);
        assert!(snapshot.metadata().benchmark_checksum.is_some());
        assert_eq!(snapshot.metadata().generator_version, crate::VERSION);
        assert!(verify_checksums(&snapshot).is_ok());
    }

    #[test]
    fn test_template_only_snapshot() {
        let snapshot = SnapshotGenerator::default()
            .generate(&resolved("1.2.0"), None)
            .unwrap();
        assert!(snapshot.results().is_none());
        assert!(snapshot.aggregate().is_none());
        assert!(snapshot.metadata().benchmark_checksum.is_none());
    }

    #[test]
    fn test_options_exclude_results_and_aggregate() {
        let generator = SnapshotGenerator::new(GeneratorOptions {
            include_results: false,
            include_aggregate: false,
            ..Default::default()
        });
        let results = results();
        let snapshot = generator.generate(&resolved("1.2.0"), Some(&results)).unwrap();
        assert!(snapshot.results().is_none());
        assert!(snapshot.aggregate().is_none());
    }

    #[test]
    fn test_explicit_aggregate_kept() {
        let agg = AggregatedScore {
            overall_weighted: 0.8,
            ..Default::default()
        };
        let snapshot = SnapshotGenerator::default()
            .generate_with_aggregate(&resolved("1.2.0"), agg, None)
            .unwrap();
        assert_eq!(snapshot.aggregate().unwrap().overall_weighted, 0.8);
        assert!(snapshot.metadata().aggregate_checksum.is_some());
    }

    #[test]
    fn test_strict_validation_lists_every_violation() {
        let mut t = complete("1.0.0");
        t.persona = None;
        t.prompts = None;
        t.maintainers.clear();
        t.preferred_models.clear();
        let template = ResolvedTemplate::from_template(t).unwrap();

        match SnapshotGenerator::default().generate(&template, None) {
            Err(SpecbenchError::Validation(errors)) => {
                let fields: Vec<&str> = errors.issues.iter().map(|i| i.field.as_str()).collect();
                assert_eq!(
                    fields,
                    vec!["persona", "prompts", "maintainers", "preferred_models"]
                );
            }
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn test_prerelease_gated_by_option() {
        let template = resolved("2.0.0-rc.1");
        assert!(matches!(
            SnapshotGenerator::default().generate(&template, None),
            Err(SpecbenchError::Validation(_))
        ));

        let generator = SnapshotGenerator::new(GeneratorOptions {
            allow_prerelease: true,
            ..Default::default()
        });
        assert!(generator.generate(&template, None).is_ok());
    }

    #[test]
    fn test_tampered_copy_fails_verification() {
        let results = results();
        let snapshot = SnapshotGenerator::default()
            .generate(&resolved("1.2.0"), Some(&results))
            .unwrap();

        let mut data = snapshot.to_data();
        if let Some(results) = data.results.as_mut() {
            results[0].raw_score = 10.0;
        }
        let tampered = Snapshot::from_data(data);

        assert!(matches!(
            verify_checksums(&tampered),
            Err(SpecbenchError::ChecksumMismatch { .. })
        ));
        let mismatches = checksum_mismatches(&tampered).unwrap();
        assert_eq!(mismatches.len(), 1);
        assert_eq!(mismatches[0].field, "benchmark_checksum");
        assert!(verify_checksums(&snapshot).is_ok());
    }
}
