//! Run configuration.
//!
//! Every section has working defaults; a JSON file can override any subset
//! of fields. The CLI layers flag and environment overrides on top.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::error::{Result, SpecbenchError, ValidationErrors};

/// Default tier-file stem pattern: `L1`, `Tier-2`, `level_3`, ...
pub const DEFAULT_TIER_PATTERN: &str = r"^(?i:L|Tier|Level)[-_]?\d+$";

/// Model substituted when a template declares no preferred models.
pub const DEFAULT_BASELINE_MODEL: &str = "claude-sonnet-4";

/// How the external benchmark harness is invoked.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HarnessConfig {
    /// Harness executable (looked up on `PATH` when not absolute).
    pub binary: String,
    /// Arguments inserted before the positional suite/scenario pair.
    pub extra_args: Vec<String>,
    /// Working directory for the harness process.
    pub working_dir: Option<PathBuf>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            binary: "benchmark-harness".to_string(),
            extra_args: Vec::new(),
            working_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Wall-clock limit per harness execution.
    pub timeout_secs: u64,
    /// Explicit worker count; `None` uses the step table in the engine.
    pub concurrency: Option<usize>,
    /// Base unit for retry backoff: the n-th retry waits `base × 2^n`.
    pub retry_backoff_base_ms: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 600,
            concurrency: None,
            retry_backoff_base_ms: 1_000,
        }
    }
}

impl ExecutionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_base_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MapperConfig {
    /// Directory that relative suite paths are resolved against.
    pub benchmark_root: PathBuf,
    /// Regex a tier file stem must match.
    pub tier_pattern: String,
    pub baseline_model: String,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            benchmark_root: PathBuf::from("."),
            tier_pattern: DEFAULT_TIER_PATTERN.to_string(),
            baseline_model: DEFAULT_BASELINE_MODEL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ResolverConfig {
    /// `@scope` → template directory.
    pub scopes: BTreeMap<String, PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    pub root: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("snapshots"),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SpecbenchConfig {
    pub harness: HarnessConfig,
    pub execution: ExecutionConfig,
    pub mapper: MapperConfig,
    pub resolver: ResolverConfig,
    pub store: StoreConfig,
}

impl SpecbenchConfig {
    /// Load and validate a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text).map_err(|e| SpecbenchError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check every section, reporting all problems together.
    pub fn validate(&self) -> Result<()> {
        let mut errors = ValidationErrors::default();

        if self.harness.binary.trim().is_empty() {
            errors.push("harness.binary", "must not be empty");
        }
        if self.execution.timeout_secs == 0 {
            errors.push("execution.timeout_secs", "must be greater than zero");
        }
        if self.execution.concurrency == Some(0) {
            errors.push("execution.concurrency", "must be at least 1");
        }
        if let Err(e) = regex::Regex::new(&self.mapper.tier_pattern) {
            errors.push("mapper.tier_pattern", format!("invalid regex: {}", e));
        }
        if self.mapper.baseline_model.trim().is_empty() {
            errors.push("mapper.baseline_model", "must not be empty");
        }
        for scope in self.resolver.scopes.keys() {
            if !scope.starts_with('@') {
                errors.push(
                    format!("resolver.scopes.{scope}"),
                    "scope names must start with '@'",
                );
            }
        }

        errors.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SpecbenchConfig::default();
        assert_eq!(config.harness.binary, "benchmark-harness");
        assert_eq!(config.execution.timeout(), Duration::from_secs(600));
        assert_eq!(config.execution.backoff_base(), Duration::from_secs(1));
        assert_eq!(config.execution.concurrency, None);
        assert_eq!(config.mapper.tier_pattern, DEFAULT_TIER_PATTERN);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("specbench.json");
        std::fs::write(
            &path,
            r#"{"execution": {"timeout_secs": 30}, "resolver": {"scopes": {"@specialists": "/opt/t"}}}"#,
        )
        .unwrap();

        let config = SpecbenchConfig::from_file(&path).unwrap();
        assert_eq!(config.execution.timeout_secs, 30);
        assert_eq!(config.execution.retry_backoff_base_ms, 1_000);
        assert_eq!(config.harness.binary, "benchmark-harness");
        assert_eq!(
            config.resolver.scopes.get("@specialists"),
            Some(&PathBuf::from("/opt/t"))
        );
    }

    #[test]
    fn test_validate_reports_all_problems() {
        let mut config = SpecbenchConfig::default();
        config.harness.binary = String::new();
        config.execution.timeout_secs = 0;
        config.execution.concurrency = Some(0);
        config.mapper.tier_pattern = "(".to_string();
        config.resolver.scopes.insert("specialists".to_string(), PathBuf::from("/t"));

        match config.validate() {
            Err(SpecbenchError::Validation(errors)) => assert_eq!(errors.len(), 5),
            other => panic!("expected Validation, got {other:?}"),
        }
    }
}
