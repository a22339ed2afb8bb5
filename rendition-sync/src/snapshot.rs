//! Snapshot store: persisted baseline catalogs per (project, asset-class).
//!
//! [`FileSnapshotStore`] persists a `SnapshotFile` JSON document at
//! `<root>/<project>/<class>.json`.
//! Writes use the atomic `.tmp` + rename pattern so a baseline is never
//! partially updated.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rendition_core::{AssetRecord, Catalog, CoreError, SnapshotKey};

use crate::error::ReconcileError;

/// Load/save of the last-known catalog for a key.
pub trait SnapshotStore: Send + Sync {
    /// `Ok(None)` when no baseline has been saved yet.
    fn load(&self, key: &SnapshotKey) -> Result<Option<Catalog>, ReconcileError>;

    fn save(&self, catalog: &Catalog, key: &SnapshotKey) -> Result<(), ReconcileError>;
}

/// On-disk snapshot payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotFile {
    pub saved_at: DateTime<Utc>,
    pub records: Vec<AssetRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SnapshotCompat {
    Structured(SnapshotFile),
    Legacy(Vec<AssetRecord>),
}

/// JSON files under a root directory.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    root: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `<root>/<project>/<class>.json`
    pub fn path_for(&self, key: &SnapshotKey) -> PathBuf {
        self.root
            .join(&key.project.0)
            .join(format!("{}.json", key.class))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn load(&self, key: &SnapshotKey) -> Result<Option<Catalog>, ReconcileError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path).map_err(|e| snapshot_err(key, &path, e))?;
        let records = match serde_json::from_str::<SnapshotCompat>(&contents) {
            Ok(SnapshotCompat::Structured(file)) => file.records,
            Ok(SnapshotCompat::Legacy(records)) => records,
            Err(err) => {
                return Err(ReconcileError::CatalogParse(CoreError::CatalogParse {
                    reason: format!("snapshot {}: {err}", path.display()),
                }))
            }
        };
        Ok(Some(Catalog::from_records(records)?))
    }

    fn save(&self, catalog: &Catalog, key: &SnapshotKey) -> Result<(), ReconcileError> {
        let path = self.path_for(key);
        let Some(dir) = path.parent() else {
            return Err(ReconcileError::Snapshot {
                key: key.to_string(),
                reason: "invalid snapshot path".to_string(),
            });
        };

        std::fs::create_dir_all(dir).map_err(|e| snapshot_err(key, dir, e))?;

        let file = SnapshotFile {
            saved_at: Utc::now(),
            records: catalog.to_records(),
        };
        let json = serde_json::to_string_pretty(&file).map_err(|e| ReconcileError::Snapshot {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json).map_err(|e| snapshot_err(key, &tmp, e))?;
        if let Err(e) = std::fs::rename(&tmp, &path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(snapshot_err(key, &path, e));
        }
        tracing::debug!("saved baseline {} ({} records)", key, catalog.len());
        Ok(())
    }
}

fn snapshot_err(key: &SnapshotKey, path: &Path, source: std::io::Error) -> ReconcileError {
    ReconcileError::Snapshot {
        key: key.to_string(),
        reason: format!("{}: {source}", path.display()),
    }
}

/// Process-local store, for embedding and tests.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshots: RwLock<HashMap<SnapshotKey, Catalog>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load(&self, key: &SnapshotKey) -> Result<Option<Catalog>, ReconcileError> {
        let snapshots = self.snapshots.read().map_err(|e| ReconcileError::Snapshot {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        Ok(snapshots.get(key).cloned())
    }

    fn save(&self, catalog: &Catalog, key: &SnapshotKey) -> Result<(), ReconcileError> {
        let mut snapshots = self.snapshots.write().map_err(|e| ReconcileError::Snapshot {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        snapshots.insert(key.clone(), catalog.clone());
        Ok(())
    }
}
