//! Domain-level error taxonomy for specbench.

use std::fmt;
use std::path::PathBuf;

/// A single schema or field violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Dotted path of the offending field (e.g. `preferred_models[0].weight`).
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl ValidationIssue {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Every violation found by one validation pass, never just the first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationErrors {
    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.issues.push(ValidationIssue::new(field, message));
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    /// `Ok(())` when nothing was collected, otherwise the whole list as an error.
    pub fn into_result(self) -> Result<()> {
        if self.issues.is_empty() {
            Ok(())
        } else {
            Err(SpecbenchError::Validation(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} issue(s)", self.issues.len())?;
        for issue in &self.issues {
            write!(f, "\n  - {}", issue)?;
        }
        Ok(())
    }
}

/// Failure of a single harness execution.
///
/// These are always captured into a failed `BenchmarkResult`; they never
/// abort sibling executions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionError {
    #[error("failed to spawn harness: {0}")]
    Spawn(String),

    #[error("harness exited with code {code:?}: {stderr}")]
    NonZeroExit { code: Option<i32>, stderr: String },

    #[error("harness timed out after {limit_secs}s")]
    Timeout { limit_secs: u64 },
}

impl ExecutionError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Specbench domain errors.
#[derive(Debug, thiserror::Error)]
pub enum SpecbenchError {
    #[error("parse error in {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("inheritance cycle: {}", format_chain(.chain))]
    Cycle { chain: Vec<PathBuf> },

    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("attempted mutation of immutable snapshot: {0}")]
    FreezeViolation(String),

    #[error("checksum mismatch for {field}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_chain(chain: &[PathBuf]) -> String {
    chain
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Result type for specbench domain operations.
pub type Result<T> = std::result::Result<T, SpecbenchError>;
