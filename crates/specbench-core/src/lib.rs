//! Specbench Core Library
//!
//! Resolves specialist templates through their inheritance chains, runs them
//! against benchmark suites through an external harness, and records the
//! outcome as immutable, checksummed, versioned snapshots that can be
//! compared across revisions.

pub mod aggregate;
pub mod benchmark;
pub mod compare;
pub mod config;
pub mod domain;
pub mod engine;
pub mod metrics;
pub mod obs;
pub mod pipeline;
pub mod snapshot;
pub mod store;
pub mod telemetry;
pub mod template;

/// Crate version, recorded in every snapshot as the generator version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use domain::{
    BenchmarkConfig, BenchmarkResult, ExecutionError, ModelAssignment, PreferredModel,
    ResolvedTemplate, Result, SemVer, SpecbenchError, SpecialistTemplate, ValidationErrors,
    VersionChange,
};

pub use aggregate::{
    aggregate, generate_report, render_report_md, AggregatedScore, GroupStats, Recommendation,
    RecommendationKind, RunReport, Severity,
};
pub use benchmark::{BenchmarkMapper, DiscoveryWarning, MappingOutcome};
pub use compare::{compare, format_report, SnapshotComparison};
pub use config::SpecbenchConfig;
pub use engine::{
    adapter_for, default_concurrency, extract_score, ExecutionEngine, HarnessOutput,
    HarnessRunner, ProcessHarness,
};
pub use pipeline::{Pipeline, PipelineRun};
pub use snapshot::{
    checksum_mismatches, verify_checksums, GeneratorOptions, Snapshot, SnapshotData,
    SnapshotGenerator, SnapshotMetadata,
};
pub use store::{SnapshotStore, StoredSnapshot, VerificationReport};
pub use template::{ResolutionCache, TemplateResolver};
