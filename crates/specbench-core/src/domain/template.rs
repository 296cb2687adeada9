//! Specialist template documents.
//!
//! Every field deserializes with a default so that a malformed document can
//! be validated as a whole (all missing fields reported at once) instead of
//! failing on the first absent key.

use std::collections::BTreeMap;
use std::ops::Deref;

use serde::{Deserialize, Serialize};

use crate::domain::error::{Result, SpecbenchError, ValidationErrors};
use crate::domain::semver::SemVer;

/// A specialist agent configuration as written on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SpecialistTemplate {
    pub schema_version: String,
    pub name: String,
    pub version: String,

    /// Inheritance reference: `@scope/name`, a relative path, or an absolute path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub availability: Option<Availability>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub maintainers: Vec<Maintainer>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub persona: Option<Persona>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Capabilities>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Dependencies>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub documentation: Option<Documentation>,

    pub preferred_models: Vec<PreferredModel>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompts: Option<Prompts>,

    pub benchmarks: Benchmarks,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Availability {
    pub status: String,
    pub platforms: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Maintainer {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Persona {
    pub purpose: String,
    pub values: Vec<String>,
    pub attributes: Vec<String>,
    pub tech_stack: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Capabilities {
    pub tags: Vec<String>,
    pub descriptions: BTreeMap<String, String>,
    pub considerations: Vec<String>,
}

/// A sub-agent or plugin the specialist depends on.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NamedDependency {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Dependencies {
    pub tools: Vec<String>,
    pub subagents: Vec<NamedDependency>,
    pub plugins: Vec<NamedDependency>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DocReference {
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Documentation {
    pub references: Vec<DocReference>,
}

/// A model the specialist is tuned for, with its overall weight and
/// optional per-benchmark weights keyed by suite or scenario name.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PreferredModel {
    pub model: String,
    pub weight: f64,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub benchmark_weights: BTreeMap<String, f64>,
}

impl PreferredModel {
    pub fn new(model: impl Into<String>, weight: f64) -> Self {
        Self {
            model: model.into(),
            weight,
            benchmark_weights: BTreeMap::new(),
        }
    }

    /// Benchmark-specific weight: scenario entry, else suite entry, else 1.0.
    pub fn benchmark_weight_for(&self, suite: &str, scenario: &str) -> f64 {
        self.benchmark_weights
            .get(scenario)
            .or_else(|| self.benchmark_weights.get(suite))
            .copied()
            .unwrap_or(1.0)
    }
}

/// Prompt templates: a default map plus per-model override maps.
///
/// Lookups for a model take the model's own key first and fall back to the
/// default map.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Prompts {
    pub default: BTreeMap<String, String>,
    pub model_specific: BTreeMap<String, BTreeMap<String, String>>,
}

impl Prompts {
    pub fn prompt_for(&self, model: &str, key: &str) -> Option<&str> {
        self.model_specific
            .get(model)
            .and_then(|overrides| overrides.get(key))
            .or_else(|| self.default.get(key))
            .map(String::as_str)
    }

    /// The full effective prompt map for `model`.
    pub fn effective_for(&self, model: &str) -> BTreeMap<String, String> {
        let mut merged = self.default.clone();
        if let Some(overrides) = self.model_specific.get(model) {
            merged.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        merged
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TestSuite {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub suite_type: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Benchmarks {
    pub test_suites: Vec<TestSuite>,
}

impl SpecialistTemplate {
    /// Structural validation applied after inheritance is resolved.
    ///
    /// Returns the hard violations; a missing `preferred_models` list is only
    /// reported through `warnings`.
    pub fn validate(&self) -> (ValidationErrors, Vec<String>) {
        let mut errors = ValidationErrors::default();
        let mut warnings = Vec::new();

        for (field, value) in [
            ("schema_version", &self.schema_version),
            ("name", &self.name),
            ("version", &self.version),
        ] {
            if value.trim().is_empty() {
                errors.push(field, "is required");
            }
        }

        if !self.version.trim().is_empty() && SemVer::parse(&self.version).is_none() {
            errors.push(
                "version",
                format!("'{}' is not valid semver (expected MAJOR.MINOR.PATCH)", self.version),
            );
        }

        if self.preferred_models.is_empty() {
            warnings.push("preferred_models is empty; a baseline model will be used".to_string());
        }
        for (i, pm) in self.preferred_models.iter().enumerate() {
            if pm.model.trim().is_empty() {
                errors.push(format!("preferred_models[{i}].model"), "is required");
            }
            if !in_unit_range(pm.weight) {
                errors.push(
                    format!("preferred_models[{i}].weight"),
                    format!("{} is outside [0, 1]", pm.weight),
                );
            }
            for (key, w) in &pm.benchmark_weights {
                if !in_unit_range(*w) {
                    errors.push(
                        format!("preferred_models[{i}].benchmark_weights.{key}"),
                        format!("{} is outside [0, 1]", w),
                    );
                }
            }
        }

        if self.benchmarks.test_suites.is_empty() {
            errors.push("benchmarks.test_suites", "at least one test suite is required");
        }
        for (i, suite) in self.benchmarks.test_suites.iter().enumerate() {
            if suite.name.trim().is_empty() {
                errors.push(format!("benchmarks.test_suites[{i}].name"), "is required");
            }
            if suite.path.trim().is_empty() {
                errors.push(format!("benchmarks.test_suites[{i}].path"), "is required");
            }
        }

        (errors, warnings)
    }
}

pub(crate) fn in_unit_range(w: f64) -> bool {
    w.is_finite() && (0.0..=1.0).contains(&w)
}

/// A template with inheritance fully applied and structure validated.
///
/// Cannot hold an unresolved `from` reference; the only ways to build one
/// are [`ResolvedTemplate::from_template`] and deserialization, which both
/// enforce that.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SpecialistTemplate", into = "SpecialistTemplate")]
pub struct ResolvedTemplate(SpecialistTemplate);

impl ResolvedTemplate {
    /// Validate a fully merged template.
    pub fn from_template(template: SpecialistTemplate) -> Result<Self> {
        if let Some(reference) = &template.from {
            let mut errors = ValidationErrors::default();
            errors.push("from", format!("unresolved inheritance reference '{}'", reference));
            return Err(SpecbenchError::Validation(errors));
        }
        let (errors, _warnings) = template.validate();
        errors.into_result()?;
        Ok(Self(template))
    }

    pub fn as_template(&self) -> &SpecialistTemplate {
        &self.0
    }

    pub fn into_inner(self) -> SpecialistTemplate {
        self.0
    }

    pub fn semver(&self) -> Option<SemVer> {
        SemVer::parse(&self.0.version)
    }
}

impl Deref for ResolvedTemplate {
    type Target = SpecialistTemplate;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<SpecialistTemplate> for ResolvedTemplate {
    type Error = SpecbenchError;

    fn try_from(template: SpecialistTemplate) -> Result<Self> {
        Self::from_template(template)
    }
}

impl From<ResolvedTemplate> for SpecialistTemplate {
    fn from(resolved: ResolvedTemplate) -> Self {
        resolved.0
    }
}
