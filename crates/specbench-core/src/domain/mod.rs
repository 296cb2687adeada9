//! Domain models for specbench.
//!
//! Canonical definitions for the core entities:
//! - `SpecialistTemplate` / `ResolvedTemplate`: specialist configuration documents
//! - `BenchmarkConfig` / `BenchmarkResult`: units of benchmark work and their outcomes
//! - `SemVer`: template version ordering

pub mod digest;
pub mod error;
pub mod run;
pub mod semver;
pub mod template;

pub use digest::{canonical_json, checksum_of, compute_digest, sha256_hex};
pub use error::{ExecutionError, Result, SpecbenchError, ValidationErrors, ValidationIssue};
pub use run::{BenchmarkConfig, BenchmarkResult, ModelAssignment};
pub use semver::{compare_semver, SemVer, VersionChange};
pub use template::{
    Availability, Benchmarks, Capabilities, Dependencies, DocReference, Documentation,
    Maintainer, NamedDependency, Persona, PreferredModel, Prompts, ResolvedTemplate,
    SpecialistTemplate, TestSuite,
};
