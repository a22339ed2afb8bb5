//! Collaborator interfaces.
//!
//! The engine never talks to a network or disk directly; every suspension
//! point goes through one of these traits. [`crate::http::HttpRemote`] and
//! [`crate::local::LocalTree`] are the shipped implementations.

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use rendition_core::{AssetClass, CatalogEntry, CatalogScope, ProjectId};

use crate::error::RemoteError;
use crate::snapshot::SnapshotStore;

/// Fetches the asset tree of a project.
pub trait CatalogSource: Send + Sync {
    fn fetch_catalog(
        &self,
        project: &ProjectId,
        scope: &CatalogScope,
    ) -> Result<Vec<CatalogEntry>, RemoteError>;
}

/// Batched raster-image conversion, performed remotely.
pub trait RasterConverter: Send + Sync {
    /// Generate renditions for `paths`; returns the created count.
    fn convert_images(
        &self,
        project: &ProjectId,
        scope: &CatalogScope,
        paths: &[String],
    ) -> Result<usize, RemoteError>;
}

/// A binary produced by the rasterizer for one pending source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedBinary {
    pub source_path: String,
    /// Page or frame identifier for multi-output sources; `None` is primary.
    pub sub_id: Option<String>,
    pub language: Option<String>,
    pub bytes: Vec<u8>,
}

/// What the rasterizer hands back for one aggregation document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RasterizeOutput {
    /// Direct response carrying the produced binaries.
    Binaries(Vec<RenderedBinary>),
    /// Compatibility mode: binaries were dropped into a shared directory
    /// under [`rendition_renderer::RenditionLayout::mailbox_name`] names.
    Mailbox(PathBuf),
}

/// Request for one drawing/chart rasterization batch.
#[derive(Debug, Clone)]
pub struct RasterizeRequest<'a> {
    pub project: &'a ProjectId,
    pub class: AssetClass,
    /// Rendered aggregation document.
    pub document: &'a str,
    /// Where the document was staged on shared storage.
    pub staged_at: &'a std::path::Path,
}

/// Remote rasterizer for drawings and charts.
pub trait Rasterizer: Send + Sync {
    fn rasterize(&self, request: &RasterizeRequest<'_>) -> Result<RasterizeOutput, RemoteError>;
}

/// Streaming handle to a stored rendition.
pub struct RenditionReader {
    /// Length announced by the store; the actual stream may be shorter.
    pub declared_len: u64,
    pub reader: Box<dyn Read + Send>,
}

/// Path-keyed rendition storage plus the batched move/remove calls.
pub trait RenditionStore: Send + Sync {
    /// Move renditions of renamed sources; `pairs` are `(old, new)` source
    /// paths. Returns the moved count.
    fn move_renditions(
        &self,
        project: &ProjectId,
        class: AssetClass,
        pairs: &[(String, String)],
    ) -> Result<usize, RemoteError>;

    /// Remove renditions. Source paths remove that source's derived files;
    /// rendition-subtree paths are removed directly. Returns the removed count.
    fn remove_renditions(
        &self,
        project: &ProjectId,
        class: AssetClass,
        paths: &[String],
    ) -> Result<usize, RemoteError>;

    fn open(&self, project: &ProjectId, path: &str) -> Result<RenditionReader, RemoteError>;

    fn put(&self, project: &ProjectId, path: &str, bytes: &[u8]) -> Result<(), RemoteError>;

    /// Delete one object; a missing object is not an error.
    fn delete(&self, project: &ProjectId, path: &str) -> Result<(), RemoteError>;
}

/// Opaque resize-and-encode step. Output is in the fixed thumbnail format.
pub trait Thumbnailer: Send + Sync {
    fn thumbnail(&self, bytes: &[u8], max_size: u32) -> Result<Vec<u8>, RemoteError>;
}

/// Everything a coordinator talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub catalog: Arc<dyn CatalogSource>,
    pub snapshots: Arc<dyn SnapshotStore>,
    pub converter: Arc<dyn RasterConverter>,
    pub rasterizer: Arc<dyn Rasterizer>,
    pub store: Arc<dyn RenditionStore>,
    pub thumbnailer: Arc<dyn Thumbnailer>,
}

// ---------------------------------------------------------------------------
// Wire payload helpers
// ---------------------------------------------------------------------------

/// `old,new|||old2,new2`, the move-rendition payload.
pub fn encode_move_pairs(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(old, new)| format!("{old},{new}"))
        .collect::<Vec<_>>()
        .join("|||")
}

/// Comma-joined remove payload.
pub fn encode_remove_paths(paths: &[String]) -> String {
    paths.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn move_payload_joins_pairs() {
        let pairs = vec![
            ("a.svg".to_string(), "b.svg".to_string()),
            ("x/c.svg".to_string(), "x/d.svg".to_string()),
        ];
        assert_eq!(encode_move_pairs(&pairs), "a.svg,b.svg|||x/c.svg,x/d.svg");
        assert_eq!(encode_move_pairs(&[]), "");
    }

    #[test]
    fn remove_payload_is_comma_joined() {
        let paths = vec!["a.svg".to_string(), "_renditions/a.png".to_string()];
        assert_eq!(encode_remove_paths(&paths), "a.svg,_renditions/a.png");
    }
}
