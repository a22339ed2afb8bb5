//! Local filesystem collaborator.
//!
//! Treats `<root>/<project>/` as the asset tree of a project. Provides the
//! catalog (walked with `walkdir`, fingerprinted with SHA-256), the rendition
//! store, and a raster "conversion" that copies each source to its primary
//! rendition path. Useful for development and for tests.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use rendition_core::{AssetClass, CatalogEntry, CatalogScope, ProjectId, RenditionConfig};
use rendition_renderer::RenditionLayout;

use crate::error::{io_err, RemoteError};
use crate::remote::{CatalogSource, RasterConverter, RenditionReader, RenditionStore};

/// A directory of project trees.
pub struct LocalTree {
    root: PathBuf,
    layouts: BTreeMap<AssetClass, RenditionLayout>,
}

impl LocalTree {
    pub fn new(root: impl Into<PathBuf>, config: &RenditionConfig) -> Result<Self, RemoteError> {
        let mut layouts = BTreeMap::new();
        for class in AssetClass::all() {
            let layout = RenditionLayout::new(config, *class)
                .map_err(|e| RemoteError::Protocol(e.to_string()))?;
            layouts.insert(*class, layout);
        }
        Ok(Self {
            root: root.into(),
            layouts,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn project_dir(&self, project: &ProjectId) -> PathBuf {
        self.root.join(&project.0)
    }

    fn layout(&self, class: AssetClass) -> Result<&RenditionLayout, RemoteError> {
        self.layouts
            .get(&class)
            .ok_or_else(|| RemoteError::Protocol(format!("no layout for {class}")))
    }

    /// Absolute path of a project-relative path; rejects escapes.
    fn resolve(&self, project: &ProjectId, path: &str) -> Result<PathBuf, RemoteError> {
        let rel = Path::new(path);
        if path.is_empty() || !rel.components().all(|c| matches!(c, Component::Normal(_))) {
            return Err(RemoteError::Protocol(format!("invalid path {path:?}")));
        }
        Ok(self.project_dir(project).join(rel))
    }

    /// Remove one file; `Ok(false)` if it did not exist.
    fn remove_file(&self, project: &ProjectId, path: &str) -> Result<bool, RemoteError> {
        let abs = self.resolve(project, path)?;
        match fs::remove_file(&abs) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_err(abs, e)),
        }
    }

    /// Rename one file, creating the target directory. `Ok(false)` if the
    /// source did not exist.
    fn rename_file(&self, project: &ProjectId, from: &str, to: &str) -> Result<bool, RemoteError> {
        let src = self.resolve(project, from)?;
        if !src.exists() {
            return Ok(false);
        }
        let dst = self.resolve(project, to)?;
        if let Some(dir) = dst.parent() {
            fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        }
        fs::rename(&src, &dst).map_err(|e| io_err(&src, e))?;
        Ok(true)
    }
}

/// Lowercase hex SHA-256 of a file's content.
pub fn fingerprint_file(path: &Path) -> Result<String, RemoteError> {
    let mut file = File::open(path).map_err(|e| io_err(path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf).map_err(|e| io_err(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

fn to_slash(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

impl CatalogSource for LocalTree {
    /// Flat listing of every file; sub-project scope walks only that
    /// top-level directory.
    fn fetch_catalog(
        &self,
        project: &ProjectId,
        scope: &CatalogScope,
    ) -> Result<Vec<CatalogEntry>, RemoteError> {
        let base = self.project_dir(project);
        if !base.is_dir() {
            return Err(RemoteError::NotFound(base.display().to_string()));
        }
        let start = match scope {
            CatalogScope::All => base.clone(),
            CatalogScope::SubProject(name) => self.resolve(project, name)?,
        };
        if !start.exists() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for entry in WalkDir::new(&start).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| start.clone());
                io_err(path, e.into())
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(&base)
                .map_err(|e| RemoteError::Protocol(e.to_string()))?;
            let meta = entry.metadata().map_err(|e| io_err(entry.path(), e.into()))?;
            let modified = meta.modified().map_err(|e| io_err(entry.path(), e))?;
            entries.push(CatalogEntry::file(
                &to_slash(rel),
                &fingerprint_file(entry.path())?,
                DateTime::<Utc>::from(modified),
            ));
        }
        Ok(entries)
    }
}

impl RasterConverter for LocalTree {
    fn convert_images(
        &self,
        project: &ProjectId,
        _scope: &CatalogScope,
        paths: &[String],
    ) -> Result<usize, RemoteError> {
        let layout = self.layout(AssetClass::Image)?;
        let mut created = 0;
        for path in paths {
            let src = self.resolve(project, path)?;
            if !src.is_file() {
                tracing::warn!("convert: source {} is gone", src.display());
                continue;
            }
            let dst = self.resolve(project, &layout.primary_path(path))?;
            if let Some(dir) = dst.parent() {
                fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
            }
            fs::copy(&src, &dst).map_err(|e| io_err(&dst, e))?;
            created += 1;
        }
        Ok(created)
    }
}

impl RenditionStore for LocalTree {
    fn move_renditions(
        &self,
        project: &ProjectId,
        class: AssetClass,
        pairs: &[(String, String)],
    ) -> Result<usize, RemoteError> {
        let layout = self.layout(class)?;
        let mut moved = 0;
        for (old, new) in pairs {
            let (old_primary, old_thumb) =
                layout.derived_paths(old).map_err(|e| RemoteError::Protocol(e.to_string()))?;
            let (new_primary, new_thumb) =
                layout.derived_paths(new).map_err(|e| RemoteError::Protocol(e.to_string()))?;
            if self.rename_file(project, &old_primary, &new_primary)? {
                moved += 1;
            }
            self.rename_file(project, &old_thumb, &new_thumb)?;
        }
        Ok(moved)
    }

    fn remove_renditions(
        &self,
        project: &ProjectId,
        class: AssetClass,
        paths: &[String],
    ) -> Result<usize, RemoteError> {
        let layout = self.layout(class)?;
        let mut removed = 0;
        for path in paths {
            if layout.is_rendition(path) {
                removed += usize::from(self.remove_file(project, path)?);
                continue;
            }
            let (primary, thumb) =
                layout.derived_paths(path).map_err(|e| RemoteError::Protocol(e.to_string()))?;
            removed += usize::from(self.remove_file(project, &primary)?);
            removed += usize::from(self.remove_file(project, &thumb)?);
        }
        Ok(removed)
    }

    fn open(&self, project: &ProjectId, path: &str) -> Result<RenditionReader, RemoteError> {
        let abs = self.resolve(project, path)?;
        let file = File::open(&abs).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => RemoteError::NotFound(path.to_string()),
            _ => io_err(&abs, e),
        })?;
        let declared_len = file.metadata().map_err(|e| io_err(&abs, e))?.len();
        Ok(RenditionReader {
            declared_len,
            reader: Box::new(file),
        })
    }

    fn put(&self, project: &ProjectId, path: &str, bytes: &[u8]) -> Result<(), RemoteError> {
        let abs = self.resolve(project, path)?;
        if let Some(dir) = abs.parent() {
            fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        }
        fs::write(&abs, bytes).map_err(|e| io_err(&abs, e))
    }

    fn delete(&self, project: &ProjectId, path: &str) -> Result<(), RemoteError> {
        self.remove_file(project, path).map(|_| ())
    }
}
