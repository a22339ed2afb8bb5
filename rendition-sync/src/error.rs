//! Error types for rendition-sync.
//!
//! [`RemoteError`] covers any collaborator failure; [`ReconcileError`] is the
//! reconciliation taxonomy and decides, through [`Severity`], whether a
//! failure blocks the baseline commit.

use std::path::PathBuf;

use thiserror::Error;

use rendition_core::{AssetClass, CoreError};
use rendition_renderer::RenderError;

/// Failure reported by a remote (or local stand-in) collaborator.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Transport-level HTTP failure (connect, timeout, TLS).
    #[error("HTTP transport error: {0}")]
    Http(String),

    /// The remote answered with a non-success status.
    #[error("HTTP status {code} from {url}")]
    Status { code: u16, url: String },

    /// The requested object does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Response or request body could not be (de)serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The remote answered with something the protocol does not allow.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl From<ureq::Error> for RemoteError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(404, response) => {
                RemoteError::NotFound(response.get_url().to_string())
            }
            ureq::Error::Status(code, response) => RemoteError::Status {
                code,
                url: response.get_url().to_string(),
            },
            ureq::Error::Transport(transport) => RemoteError::Http(transport.to_string()),
        }
    }
}

/// How a [`ReconcileError`] affects the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Needs new input; retrying unchanged cannot help.
    Fatal,
    /// Aborts the run, baseline untouched; the same run can be retried.
    Retryable,
    /// Logged and worked around (cold start).
    Degraded,
    /// Logged; never blocks the baseline commit.
    Warning,
}

/// Reconciliation error taxonomy.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("no project id supplied")]
    MissingProjectId,

    #[error("invalid project id {0:?}")]
    InvalidProjectId(String),

    #[error("catalog fetch failed: {0}")]
    CatalogFetch(#[source] RemoteError),

    #[error("catalog could not be parsed: {0}")]
    CatalogParse(#[from] CoreError),

    #[error("invalid asset filter {pattern:?}: {reason}")]
    InvalidFilter { pattern: String, reason: String },

    #[error("{class} conversion batch failed: {reason}")]
    ConversionBatch { class: AssetClass, reason: String },

    #[error("{operation} failed: {reason}")]
    MoveOrRemove {
        operation: &'static str,
        reason: String,
    },

    #[error("thumbnail for {path} failed: {reason}")]
    Thumbnail { path: String, reason: String },

    #[error("snapshot {key} failed: {reason}")]
    Snapshot { key: String, reason: String },

    #[error("render error: {0}")]
    Render(#[from] RenderError),
}

impl ReconcileError {
    pub fn severity(&self) -> Severity {
        match self {
            ReconcileError::MissingProjectId
            | ReconcileError::InvalidProjectId(_)
            | ReconcileError::InvalidFilter { .. }
            | ReconcileError::Render(_) => Severity::Fatal,
            ReconcileError::CatalogFetch(_)
            | ReconcileError::ConversionBatch { .. }
            | ReconcileError::Snapshot { .. } => Severity::Retryable,
            ReconcileError::CatalogParse(_) => Severity::Degraded,
            ReconcileError::MoveOrRemove { .. } | ReconcileError::Thumbnail { .. } => {
                Severity::Warning
            }
        }
    }

    /// Whether this error prevents the new baseline from being committed.
    pub fn blocks_commit(&self) -> bool {
        matches!(self.severity(), Severity::Fatal | Severity::Retryable)
    }
}

/// Convenience constructor for [`RemoteError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> RemoteError {
    RemoteError::Io {
        path: path.into(),
        source,
    }
}
