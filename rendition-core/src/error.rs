//! Error types for rendition-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from catalog parsing and configuration loading.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A catalog document or tree was structurally invalid.
    #[error("malformed catalog: {reason}")]
    CatalogParse { reason: String },

    /// Catalog JSON could not be decoded at all.
    #[error("catalog JSON error: {0}")]
    CatalogJson(#[from] serde_json::Error),

    /// YAML parse error on config load, with the file path for context.
    #[error("failed to parse config at {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// Underlying I/O failure, annotated with the path involved.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Project ids must be non-empty and must not contain path separators.
    #[error("invalid project id {0:?}")]
    InvalidProjectId(String),
}

/// Convenience constructor for [`CoreError::CatalogParse`].
pub(crate) fn parse_err(reason: impl Into<String>) -> CoreError {
    CoreError::CatalogParse {
        reason: reason.into(),
    }
}
