//! Error types for rendition-renderer.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from naming and document rendering.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Tera template engine error.
    #[error("template engine error: {0}")]
    Tera(#[from] tera::Error),

    /// JSON serialization error (building tera context).
    #[error("context serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem error while loading user templates.
    #[error("template io error at {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },

    /// A file-name template produced an unusable name.
    #[error("invalid file name template {template:?}: {reason}")]
    InvalidNameTemplate { template: String, reason: String },
}
