//! `manifest.json`: the index from template name and version to stored files.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use uuid::Uuid;

use crate::domain::error::{Result, SpecbenchError};
use crate::domain::semver::compare_semver;

pub const MANIFEST_FILE: &str = "manifest.json";

/// One stored snapshot version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManifestEntry {
    pub version: String,
    /// Snapshot file path relative to the store root, `/`-separated.
    pub path: String,
    /// SHA-256 of the snapshot file bytes.
    pub checksum: String,
    pub snapshot_id: Uuid,
    pub saved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TemplateEntry {
    /// Highest stored version by semver precedence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest: Option<String>,
    #[serde(default)]
    pub versions: BTreeMap<String, ManifestEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Manifest {
    #[serde(default)]
    pub templates: BTreeMap<String, TemplateEntry>,
}

impl Manifest {
    /// Read the manifest, or an empty one if the file does not exist yet.
    pub fn load(path: &Path) -> Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&text).map_err(|e| SpecbenchError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Replace the manifest file atomically (temp file + rename).
    pub fn write_atomic(&self, path: &Path) -> Result<()> {
        let dir = path
            .parent()
            .ok_or_else(|| SpecbenchError::Storage("manifest path has no parent".to_string()))?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(serde_json::to_string_pretty(self)?.as_bytes())?;
        tmp.write_all(b"\n")?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    pub fn entry(&self, name: &str, version: &str) -> Option<&ManifestEntry> {
        self.templates.get(name)?.versions.get(version)
    }

    /// Record a stored version and move `latest` if it is now the highest.
    pub fn record(&mut self, name: &str, entry: ManifestEntry) {
        let template = self.templates.entry(name.to_string()).or_default();
        template.versions.insert(entry.version.clone(), entry);
        template.latest = template
            .versions
            .keys()
            .max_by(|a, b| compare_semver(a, b))
            .cloned();
    }

    /// Entries for `name`, highest version first.
    pub fn versions_desc(&self, name: &str) -> Vec<ManifestEntry> {
        let mut entries: Vec<ManifestEntry> = self
            .templates
            .get(name)
            .map(|t| t.versions.values().cloned().collect())
            .unwrap_or_default();
        entries.sort_by(|a, b| compare_semver(&b.version, &a.version));
        entries
    }

    pub fn latest(&self, name: &str) -> Option<&ManifestEntry> {
        let template = self.templates.get(name)?;
        template.versions.get(template.latest.as_deref()?)
    }
}
