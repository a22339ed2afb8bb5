//! # rendition-renderer
//!
//! Naming and document rendering for derived renditions.
//!
//! - [`RenditionLayout`] maps source asset paths to their primary rendition,
//!   thumbnail and mailbox names.
//! - [`DocumentRenderer`] renders the aggregation document submitted to the
//!   drawing/chart rasterizer.
//!
//! ```rust,no_run
//! use rendition_core::{AssetClass, RenditionConfig};
//! use rendition_renderer::RenditionLayout;
//!
//! fn show(config: &RenditionConfig) {
//!     if let Ok(layout) = RenditionLayout::new(config, AssetClass::Drawing) {
//!         println!("{}", layout.primary_path("drawings/chart1.svg"));
//!     }
//! }
//! ```

pub mod batch;
pub mod engine;
pub mod error;
pub mod layout;

pub use batch::{BatchContext, BatchItem};
pub use engine::DocumentRenderer;
pub use error::RenderError;
pub use layout::RenditionLayout;
