//! Immutable, checksummed snapshots of evaluated templates.
//!
//! A [`Snapshot`] is built once by [`SnapshotGenerator`] and exposes only
//! shared references afterwards. [`Snapshot::to_data`] hands out an owned
//! copy for inspection or re-serialization; rewrapping an edited copy with
//! [`Snapshot::from_data`] is possible, but [`verify_checksums`] will then
//! reject it.

pub mod generator;

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::aggregate::AggregatedScore;
use crate::domain::digest::checksum_of;
use crate::domain::error::{Result, SpecbenchError};
use crate::domain::run::BenchmarkResult;
use crate::domain::template::ResolvedTemplate;

pub use generator::{validate_for_snapshot, GeneratorOptions, SnapshotGenerator};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapshotMetadata {
    pub snapshot_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub generator_version: String,
    /// SHA-256 of the canonical JSON of the template.
    pub template_checksum: String,
    /// SHA-256 of the canonical JSON of the raw results, when embedded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub benchmark_checksum: Option<String>,
    /// SHA-256 of the canonical JSON of the aggregate, when embedded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate_checksum: Option<String>,
}

/// Owned, freely editable form of a snapshot's contents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapshotData {
    pub template: ResolvedTemplate,
    pub metadata: SnapshotMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate: Option<AggregatedScore>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<BenchmarkResult>>,
}

/// Read-only snapshot. Cloning shares the same underlying data.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    inner: Arc<SnapshotData>,
}

impl Snapshot {
    /// Wrap data without verifying it. Use [`verify_checksums`] before
    /// trusting a snapshot that did not come from the generator.
    pub fn from_data(data: SnapshotData) -> Self {
        Self {
            inner: Arc::new(data),
        }
    }

    /// An owned copy of the contents.
    pub fn to_data(&self) -> SnapshotData {
        self.inner.as_ref().clone()
    }

    pub fn template(&self) -> &ResolvedTemplate {
        &self.inner.template
    }

    pub fn metadata(&self) -> &SnapshotMetadata {
        &self.inner.metadata
    }

    pub fn aggregate(&self) -> Option<&AggregatedScore> {
        self.inner.aggregate.as_ref()
    }

    pub fn results(&self) -> Option<&[BenchmarkResult]> {
        self.inner.results.as_deref()
    }

    pub fn id(&self) -> Uuid {
        self.inner.metadata.snapshot_id
    }

    pub fn name(&self) -> &str {
        &self.inner.template.name
    }

    pub fn version(&self) -> &str {
        &self.inner.template.version
    }
}

impl Serialize for Snapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.inner.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Snapshot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        SnapshotData::deserialize(deserializer).map(Snapshot::from_data)
    }
}

// ---------------------------------------------------------------------------
// Checksums
// ---------------------------------------------------------------------------

/// One recorded checksum that does not match the content it covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumMismatch {
    pub field: String,
    pub expected: String,
    pub actual: String,
}

impl fmt::Display for ChecksumMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: expected {}, got {}",
            self.field, self.expected, self.actual
        )
    }
}

impl From<ChecksumMismatch> for SpecbenchError {
    fn from(m: ChecksumMismatch) -> Self {
        SpecbenchError::ChecksumMismatch {
            field: m.field,
            expected: m.expected,
            actual: m.actual,
        }
    }
}

const ABSENT: &str = "<absent>";

fn optional_checksum<T: Serialize + ?Sized>(value: Option<&T>) -> Result<Option<String>> {
    value.map(checksum_of).transpose()
}

fn check(
    out: &mut Vec<ChecksumMismatch>,
    field: &str,
    recorded: Option<&String>,
    actual: Option<String>,
) {
    if recorded != actual.as_ref() {
        out.push(ChecksumMismatch {
            field: field.to_string(),
            expected: recorded.cloned().unwrap_or_else(|| ABSENT.to_string()),
            actual: actual.unwrap_or_else(|| ABSENT.to_string()),
        });
    }
}

/// Recompute every checksum and list the ones that disagree with the
/// metadata. Empty means the snapshot is intact.
pub fn checksum_mismatches(snapshot: &Snapshot) -> Result<Vec<ChecksumMismatch>> {
    let meta = snapshot.metadata();
    let mut out = Vec::new();

    check(
        &mut out,
        "template_checksum",
        Some(&meta.template_checksum),
        Some(checksum_of(snapshot.template())?),
    );
    check(
        &mut out,
        "benchmark_checksum",
        meta.benchmark_checksum.as_ref(),
        optional_checksum(snapshot.results())?,
    );
    check(
        &mut out,
        "aggregate_checksum",
        meta.aggregate_checksum.as_ref(),
        optional_checksum(snapshot.aggregate())?,
    );

    Ok(out)
}

/// Fail with the first checksum mismatch, if any.
pub fn verify_checksums(snapshot: &Snapshot) -> Result<()> {
    match checksum_mismatches(snapshot)?.into_iter().next() {
        Some(mismatch) => Err(mismatch.into()),
        None => Ok(()),
    }
}
