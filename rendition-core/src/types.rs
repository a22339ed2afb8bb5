//! Domain types for rendition reconciliation.
//!
//! Asset paths are asset-tree keys (`/`-separated, relative to the project
//! root), not host filesystem paths, so they are carried as `String`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed identifier for a project content tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProjectId(pub String);

impl ProjectId {
    /// Validate a raw id before it is used as a snapshot key or URL segment.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let trimmed = raw.trim();
        if trimmed.is_empty()
            || trimmed.contains('/')
            || trimmed.contains('\\')
            || trimmed == "."
            || trimmed == ".."
        {
            return Err(CoreError::InvalidProjectId(raw.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ProjectId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ProjectId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// The class of source asset a reconciliation run covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetClass {
    /// Raster images, converted remotely in one batched call.
    Image,
    /// Vector drawings, rasterized through an aggregation document.
    Drawing,
    /// Chart definitions, rasterized through an aggregation document.
    Chart,
}

impl AssetClass {
    /// All classes in a stable order.
    pub fn all() -> &'static [AssetClass] {
        &[AssetClass::Image, AssetClass::Drawing, AssetClass::Chart]
    }

    /// Wire name used in remote payloads and snapshot file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetClass::Image => "image",
            AssetClass::Drawing => "drawing",
            AssetClass::Chart => "chart",
        }
    }

    /// Whether renditions for this class come from the aggregation-document
    /// rasterizer rather than the batched raster conversion call.
    pub fn uses_rasterizer(&self) -> bool {
        matches!(self, AssetClass::Drawing | AssetClass::Chart)
    }
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How much of a project a catalog fetch covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CatalogScope {
    #[default]
    All,
    SubProject(String),
}

impl CatalogScope {
    /// Query-string form: `all` or the sub-project name.
    pub fn as_query(&self) -> &str {
        match self {
            CatalogScope::All => "all",
            CatalogScope::SubProject(name) => name,
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshot values
// ---------------------------------------------------------------------------

/// One asset-tree entry as seen at catalog time.
///
/// `fingerprint` is the lowercase hex SHA-256 of the content (or an opaque
/// version token supplied by the remote store). Change and rename detection
/// compare it alone; `modified` only feeds the rendition staleness check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub path: String,
    pub name: String,
    pub fingerprint: String,
    pub modified: DateTime<Utc>,
    pub asset_class: AssetClass,
}

/// Identifies one persisted baseline: a (project, asset-class) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SnapshotKey {
    pub project: ProjectId,
    pub class: AssetClass,
}

impl SnapshotKey {
    pub fn new(project: ProjectId, class: AssetClass) -> Self {
        Self { project, class }
    }
}

impl fmt::Display for SnapshotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.project, self.class)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
