//! Benchmark units of work and their results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A model bound to a benchmark config, with both weights resolved.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelAssignment {
    pub model: String,
    /// Overall model weight from `preferred_models`.
    pub weight: f64,
    /// Suite- or scenario-specific weight (1.0 when not declared).
    pub benchmark_weight: f64,
}

impl ModelAssignment {
    pub fn new(model: impl Into<String>, weight: f64, benchmark_weight: f64) -> Self {
        Self {
            model: model.into(),
            weight,
            benchmark_weight,
        }
    }

    /// `raw × model weight × benchmark weight`.
    pub fn weighted(&self, raw_score: f64) -> f64 {
        raw_score * self.weight * self.benchmark_weight
    }
}

/// One (suite, scenario, tier) unit of work with its model list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BenchmarkConfig {
    pub suite: String,
    /// Declared suite type (used for per-type aggregation).
    pub suite_type: String,
    pub scenario: String,
    pub tier: String,
    pub models: Vec<ModelAssignment>,
}

impl BenchmarkConfig {
    /// `suite/scenario/tier`, used in logs and reports.
    pub fn label(&self) -> String {
        format!("{}/{}/{}", self.suite, self.scenario, self.tier)
    }

    /// Canonical ordering key.
    pub fn sort_key(&self) -> (&str, &str, &str) {
        (&self.suite, &self.scenario, &self.tier)
    }
}

/// Outcome of one harness execution for one (config, model) pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BenchmarkResult {
    pub config: BenchmarkConfig,
    pub model: ModelAssignment,
    /// Score on the 0–10 scale extracted from harness output.
    pub raw_score: f64,
    pub weighted_score: f64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
    /// Executions spent producing this result (1 unless retried).
    #[serde(default = "one")]
    pub attempts: u32,
    pub timestamp: DateTime<Utc>,
}

fn one() -> u32 {
    1
}

impl BenchmarkResult {
    pub fn succeeded(
        config: BenchmarkConfig,
        model: ModelAssignment,
        raw_score: f64,
        duration_ms: u64,
    ) -> Self {
        let weighted_score = model.weighted(raw_score);
        Self {
            config,
            model,
            raw_score,
            weighted_score,
            success: true,
            error: None,
            duration_ms,
            attempts: 1,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(
        config: BenchmarkConfig,
        model: ModelAssignment,
        error: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            config,
            model,
            raw_score: 0.0,
            weighted_score: 0.0,
            success: false,
            error: Some(error.into()),
            duration_ms,
            attempts: 1,
            timestamp: Utc::now(),
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }
}
