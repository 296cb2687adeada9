//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use serde_json::{json, Value};
use specbench_core::domain::template::{
    Benchmarks, Capabilities, Dependencies, Documentation, Maintainer, NamedDependency, Persona,
    PreferredModel, Prompts, SpecialistTemplate, TestSuite,
};
use specbench_core::{BenchmarkConfig, BenchmarkResult, ModelAssignment, ResolvedTemplate};

/// A template that passes snapshot validation.
pub fn publishable(name: &str, version: &str, tags: &[&str]) -> SpecialistTemplate {
    SpecialistTemplate {
        schema_version: "1.0".to_string(),
        name: name.to_string(),
        version: version.to_string(),
        maintainers: vec![Maintainer {
            name: "Ada Lovelace".to_string(),
            email: Some("ada@example.com".to_string()),
        }],
        persona: Some(Persona {
            purpose: "Build and ship web applications".to_string(),
            tech_stack: vec!["React".to_string(), "Node.js".to_string()],
            ..Default::default()
        }),
        capabilities: Some(Capabilities {
            tags: tags.iter().map(|t| t.to_string()).collect(),
            ..Default::default()
        }),
        dependencies: Some(Dependencies {
            tools: vec!["bash".to_string()],
            subagents: vec![NamedDependency {
                name: "reviewer".to_string(),
                version: Some("1.0.0".to_string()),
            }],
            plugins: Vec::new(),
        }),
        documentation: Some(Documentation::default()),
        prompts: Some(Prompts {
            default: [("system".to_string(), "You are a web engineer.".to_string())]
                .into_iter()
                .collect(),
            ..Default::default()
        }),
        preferred_models: vec![PreferredModel::new("claude-sonnet-4", 1.0)],
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

pub fn resolved(template: SpecialistTemplate) -> ResolvedTemplate {
    ResolvedTemplate::from_template(template).unwrap()
}

/// A successful result with weights of 1.0, so raw and weighted scores agree.
pub fn scored(scenario: &str, model: &str, raw: f64) -> BenchmarkResult {
    let config = BenchmarkConfig {
        suite: "web".to_string(),
        suite_type: "implementation".to_string(),
        scenario: scenario.to_string(),
        tier: "L1".to_string(),
        models: vec![ModelAssignment::new(model, 1.0, 1.0)],
    };
    let assignment = config.models[0].clone();
    BenchmarkResult::succeeded(config, assignment, raw, 1_000)
}

/// Lay out a suite root: one `scenarios/<name>` directory and one
/// `prompts/<name>/<tier>.md` file per tier.
pub fn write_suite(root: &Path, suite: &str, scenarios: &[(&str, &[&str])]) -> PathBuf {
    let suite_root = root.join(suite);
    for (scenario, tiers) in scenarios {
        std::fs::create_dir_all(suite_root.join("scenarios").join(scenario)).unwrap();
        let prompts = suite_root.join("prompts").join(scenario);
        std::fs::create_dir_all(&prompts).unwrap();
        for tier in *tiers {
            std::fs::write(prompts.join(format!("{tier}.md")), "# prompt\n").unwrap();
        }
    }
    suite_root
}

pub fn write_json(path: &Path, value: &Value) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, serde_json::to_string_pretty(value).unwrap()).unwrap();
}

/// Document form of [`publishable`], for resolver-driven tests.
pub fn publishable_json(name: &str, version: &str) -> Value {
    serde_json::to_value(publishable(name, version, &["frontend", "testing"])).unwrap()
}

pub fn base_json() -> Value {
    json!({
        "schema_version": "1.0",
        "name": "base",
        "version": "1.0.0",
        "persona": {
            "purpose": "General software engineering",
            "tech_stack": ["Python", "Django", "PostgreSQL"]
        },
        "benchmarks": {
            "test_suites": [{"name": "web", "path": "web", "type": "implementation"}]
        }
    })
}
