//! Rendition core library: domain types, catalogs, configuration, errors.
//!
//! Public API surface:
//! - [`types`]: newtypes and snapshot values
//! - [`catalog`]: catalog trees, flattening and comparison maps
//! - [`config`]: [`RenditionConfig`] passed explicitly to the coordinator
//! - [`error`]: [`CoreError`]

pub mod catalog;
pub mod config;
pub mod error;
pub mod types;

pub use catalog::{Catalog, CatalogEntry};
pub use config::{ClassConfig, RenditionConfig};
pub use error::CoreError;
pub use types::{AssetClass, AssetRecord, CatalogScope, ProjectId, SnapshotKey};
