//! Write-once persistence of snapshots.
//!
//! Layout under the store root:
//!
//! ```text
//! manifest.json
//! <name>/v<version>/<name>-v<version>-<yyyymmddThhmmssZ>-<checksum[..12]>.json
//! <name>/v<version>/<...>.meta.json     snapshot metadata
//! <name>/v<version>/<...>.sha256        checksum of the snapshot file bytes
//! ```

pub mod fs;
pub mod manifest;

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use fs::SnapshotStore;
pub use manifest::{Manifest, ManifestEntry, TemplateEntry, MANIFEST_FILE};

/// Outcome of [`SnapshotStore::save`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredSnapshot {
    pub path: PathBuf,
    /// Path relative to the store root, as recorded in the manifest.
    pub relative_path: String,
    pub checksum: String,
    pub snapshot_id: Uuid,
    /// The identical file was already present; nothing was written.
    pub skipped: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    Unreadable,
    Parse,
    Schema,
    ChecksumMismatch,
    SideFile,
    FreezeViolation,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IssueKind::Unreadable => "unreadable",
            IssueKind::Parse => "parse",
            IssueKind::Schema => "schema",
            IssueKind::ChecksumMismatch => "checksum_mismatch",
            IssueKind::SideFile => "side_file",
            IssueKind::FreezeViolation => "freeze_violation",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerificationIssue {
    pub kind: IssueKind,
    pub message: String,
}

/// Everything wrong with one stored snapshot, collected in a single pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerificationReport {
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<Uuid>,
    pub issues: Vec<VerificationIssue>,
}

impl VerificationReport {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            snapshot_id: None,
            issues: Vec::new(),
        }
    }

    fn push(&mut self, kind: IssueKind, message: impl Into<String>) {
        self.issues.push(VerificationIssue {
            kind,
            message: message.into(),
        });
    }

    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn has(&self, kind: IssueKind) -> bool {
        self.issues.iter().any(|i| i.kind == kind)
    }
}

impl fmt::Display for VerificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            return write!(f, "{}: ok", self.path.display());
        }
        write!(f, "{}: {} issue(s)", self.path.display(), self.issues.len())?;
        for issue in &self.issues {
            write!(f, "\n  - [{}] {}", issue.kind, issue.message)?;
        }
        Ok(())
    }
}
