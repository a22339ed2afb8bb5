//! # rendition-sync
//!
//! Snapshot-based reconciliation of derived renditions.
//!
//! A [`Coordinator`] run for one (project, asset-class) key loads the last
//! baseline, fetches the current catalog, computes a [`Delta`], applies the
//! resulting [`ActionPlan`] through the collaborators (generate → move →
//! remove, then thumbnails) and commits the new baseline only when no hard
//! failure occurred.
//!
//! Collaborators are traits ([`remote`]); [`HttpRemote`] and [`LocalTree`]
//! are the shipped implementations.

pub mod coordinator;
pub mod delta;
pub mod driver;
pub mod error;
pub mod http;
pub mod local;
pub mod plan;
pub mod reader;
pub mod remote;
pub mod runlog;
pub mod snapshot;
pub mod thumbnail;

pub use coordinator::{Coordinator, ReconcileRequest, ReconciliationResult, RunDebug, RunState};
pub use delta::{compute_delta, compute_delta_for_pattern, AssetFilter, Delta};
pub use error::{ReconcileError, RemoteError, Severity};
pub use http::HttpRemote;
pub use local::LocalTree;
pub use plan::ActionPlan;
pub use remote::{
    CatalogSource, Collaborators, RasterConverter, RasterizeOutput, RasterizeRequest, Rasterizer,
    RenderedBinary, RenditionReader, RenditionStore, Thumbnailer,
};
pub use runlog::RunLog;
pub use snapshot::{FileSnapshotStore, MemorySnapshotStore, SnapshotStore};
pub use thumbnail::ThumbnailReport;
