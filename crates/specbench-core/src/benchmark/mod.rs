//! Benchmark discovery and template-to-config mapping.

pub mod discovery;
pub mod mapper;

pub use discovery::{discover_suite, DiscoveryWarning, ScenarioTiers, SuiteDiscovery};
pub use mapper::{BenchmarkMapper, MappingOutcome};
