use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use tempfile::NamedTempFile;
use tracing::{debug, instrument};

use super::manifest::{Manifest, ManifestEntry, MANIFEST_FILE};
use super::{IssueKind, StoredSnapshot, VerificationReport};
use crate::domain::digest::sha256_hex;
use crate::domain::error::{Result, SpecbenchError};
use crate::metrics::METRICS;
use crate::obs;
use crate::snapshot::{
    checksum_mismatches, verify_checksums, Snapshot, SnapshotData, SnapshotMetadata,
};

/// Filesystem-backed, write-once snapshot store.
///
/// Snapshot files and their side-files are never rewritten once persisted;
/// only `manifest.json` is replaced, under the store's manifest lock.
pub struct SnapshotStore {
    root: PathBuf,
    manifest_lock: Mutex<()>,
}

impl SnapshotStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            manifest_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    /// Current manifest contents.
    pub fn manifest(&self) -> Result<Manifest> {
        Manifest::load(&self.manifest_path())
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// Persist `snapshot` and index it in the manifest.
    ///
    /// Saving the same snapshot again is a no-op. Saving a different
    /// snapshot under an already stored name and version is refused.
    #[instrument(
        skip(self, snapshot),
        fields(template = %snapshot.name(), version = %snapshot.version())
    )]
    pub fn save(&self, snapshot: &Snapshot) -> Result<StoredSnapshot> {
        verify_checksums(snapshot)?;
        let name = snapshot.name();
        let version = snapshot.version();
        check_component("name", name)?;
        check_component("version", version)?;

        let mut bytes = serde_json::to_vec_pretty(snapshot)?;
        bytes.push(b'\n');
        let checksum = sha256_hex(&bytes);

        let stamp = snapshot.metadata().generated_at.format("%Y%m%dT%H%M%SZ");
        let version_dir = format!("v{version}");
        let file_name = format!("{name}-v{version}-{stamp}-{}.json", &checksum[..12]);
        let relative_path = format!("{name}/{version_dir}/{file_name}");
        let dir = self.root.join(name).join(&version_dir);
        let path = dir.join(&file_name);

        let _guard = self
            .manifest_lock
            .lock()
            .map_err(|_| SpecbenchError::Storage("manifest lock poisoned".to_string()))?;
        let mut manifest = self.manifest()?;

        if let Some(existing) = manifest.entry(name, version) {
            if existing.checksum != checksum {
                return Err(SpecbenchError::FreezeViolation(format!(
                    "{} v{} is already stored at {} with checksum {}",
                    name, version, existing.path, existing.checksum
                )));
            }
            debug!(path = %existing.path, "snapshot already stored");
            let stored = StoredSnapshot {
                path: self.root.join(&existing.path),
                relative_path: existing.path.clone(),
                checksum,
                snapshot_id: snapshot.id(),
                skipped: true,
            };
            obs::emit_snapshot_saved(&stored.snapshot_id.to_string(), &stored.relative_path, true);
            return Ok(stored);
        }

        // A file at this address without a manifest entry means an earlier
        // save stopped before indexing; the address embeds the checksum.
        // Whatever that save did not finish is written before indexing.
        fs::create_dir_all(&dir)?;
        let (meta_path, sha_path) = side_paths(&path);
        let skipped = path.exists();
        if !skipped {
            write_once(&dir, &path, &bytes)?;
            METRICS.inc_snapshots_saved();
        }
        if !meta_path.exists() {
            write_once(
                &dir,
                &meta_path,
                serde_json::to_string_pretty(snapshot.metadata())?.as_bytes(),
            )?;
        }
        if !sha_path.exists() {
            write_once(
                &dir,
                &sha_path,
                format!("{}  {}\n", checksum, file_name).as_bytes(),
            )?;
        }

        manifest.record(
            name,
            ManifestEntry {
                version: version.to_string(),
                path: relative_path.clone(),
                checksum: checksum.clone(),
                snapshot_id: snapshot.id(),
                saved_at: Utc::now(),
            },
        );
        manifest.write_atomic(&self.manifest_path())?;

        obs::emit_snapshot_saved(&snapshot.id().to_string(), &relative_path, skipped);
        Ok(StoredSnapshot {
            path,
            relative_path,
            checksum,
            snapshot_id: snapshot.id(),
            skipped,
        })
    }

    /// Read a stored snapshot. The template is re-validated on parse and
    /// every embedded checksum is recomputed; a mismatch is an error.
    ///
    /// Side-files and permissions are only checked by [`SnapshotStore::verify`].
    pub fn load(&self, path: impl AsRef<Path>) -> Result<Snapshot> {
        let path = self.resolve(path.as_ref());
        let text = fs::read_to_string(&path)?;
        let data: SnapshotData = serde_json::from_str(&text).map_err(|e| SpecbenchError::Parse {
            path: path.clone(),
            message: e.to_string(),
        })?;
        let snapshot = Snapshot::from_data(data);
        verify_checksums(&snapshot)?;
        Ok(snapshot)
    }

    /// Check a stored snapshot end to end, collecting every problem.
    #[instrument(skip(self, path), fields(path = %path.as_ref().display()))]
    pub fn verify(&self, path: impl AsRef<Path>) -> VerificationReport {
        let path = self.resolve(path.as_ref());
        let mut report = VerificationReport::new(path.clone());

        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                report.push(IssueKind::Unreadable, e.to_string());
                return report;
            }
        };

        let snapshot = match serde_json::from_slice::<serde_json::Value>(&bytes) {
            Err(e) => {
                report.push(IssueKind::Parse, e.to_string());
                None
            }
            Ok(value) => match serde_json::from_value::<SnapshotData>(value) {
                Err(e) => {
                    report.push(IssueKind::Schema, e.to_string());
                    None
                }
                Ok(data) => Some(Snapshot::from_data(data)),
            },
        };

        if let Some(snapshot) = &snapshot {
            report.snapshot_id = Some(snapshot.id());
            match checksum_mismatches(snapshot) {
                Ok(mismatches) => {
                    for m in mismatches {
                        report.push(IssueKind::ChecksumMismatch, m.to_string());
                    }
                }
                Err(e) => report.push(IssueKind::ChecksumMismatch, e.to_string()),
            }
        }

        let (meta_path, sha_path) = side_paths(&path);
        let actual = sha256_hex(&bytes);
        match fs::read_to_string(&sha_path) {
            Ok(line) => {
                let recorded = line.split_whitespace().next().unwrap_or_default();
                if recorded != actual {
                    report.push(
                        IssueKind::ChecksumMismatch,
                        format!("file checksum: expected {}, got {}", recorded, actual),
                    );
                }
            }
            Err(e) => report.push(
                IssueKind::SideFile,
                format!("{}: {}", sha_path.display(), e),
            ),
        }

        match fs::read_to_string(&meta_path) {
            Ok(text) => match serde_json::from_str::<SnapshotMetadata>(&text) {
                Ok(meta) => {
                    if let Some(snapshot) = &snapshot {
                        if &meta != snapshot.metadata() {
                            report.push(
                                IssueKind::SideFile,
                                "metadata side-file differs from embedded metadata",
                            );
                        }
                    }
                }
                Err(e) => report.push(
                    IssueKind::SideFile,
                    format!("{}: {}", meta_path.display(), e),
                ),
            },
            Err(e) => report.push(
                IssueKind::SideFile,
                format!("{}: {}", meta_path.display(), e),
            ),
        }

        for file in [&path, &meta_path, &sha_path] {
            if let Ok(meta) = fs::metadata(file) {
                if !meta.permissions().readonly() {
                    report.push(
                        IssueKind::FreezeViolation,
                        format!("{} is writable", file.display()),
                    );
                }
            }
        }

        report
    }

    /// Stored versions of `name`, highest first.
    pub fn list(&self, name: &str) -> Result<Vec<ManifestEntry>> {
        Ok(self.manifest()?.versions_desc(name))
    }

    /// The entry the manifest's `latest` pointer names.
    pub fn latest(&self, name: &str) -> Result<Option<ManifestEntry>> {
        Ok(self.manifest()?.latest(name).cloned())
    }

    pub fn load_version(&self, name: &str, version: &str) -> Result<Snapshot> {
        let manifest = self.manifest()?;
        let entry = manifest.entry(name, version).ok_or_else(|| {
            SpecbenchError::Storage(format!("no stored snapshot for {} v{}", name, version))
        })?;
        self.load(&entry.path)
    }
}

/// `<stem>.meta.json` and `<stem>.sha256` next to a snapshot file.
fn side_paths(path: &Path) -> (PathBuf, PathBuf) {
    (path.with_extension("meta.json"), path.with_extension("sha256"))
}

fn check_component(field: &str, value: &str) -> Result<()> {
    let bad = value.is_empty()
        || value == "."
        || value == ".."
        || value.contains(['/', '\\'])
        || value.chars().any(char::is_control);
    if bad {
        return Err(SpecbenchError::Storage(format!(
            "template {} '{}' cannot be used as a path component",
            field, value
        )));
    }
    Ok(())
}

/// Atomic write that refuses to replace an existing file, then marks the
/// result read-only.
fn write_once(dir: &Path, path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist_noclobber(path).map_err(|e| e.error)?;

    let mut permissions = fs::metadata(path)?.permissions();
    permissions.set_readonly(true);
    fs::set_permissions(path, permissions)?;
    Ok(())
}
