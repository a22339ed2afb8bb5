//! Batch context: serializable payload for the aggregation document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rendition_core::{AssetClass, AssetRecord, ProjectId};

use crate::error::RenderError;
use crate::layout::RenditionLayout;

/// One pending source referenced by the aggregation document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItem {
    pub source_path: String,
    pub name: String,
    pub fingerprint: String,
    /// Where the primary rendition is persisted.
    pub rendition_path: String,
    /// File name the rasterizer uses when dropping output into a mailbox.
    pub output_name: String,
}

/// Everything the aggregation template needs for one generate batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchContext {
    pub project: String,
    pub asset_class: AssetClass,
    pub language: Option<String>,
    pub generated_at: DateTime<Utc>,
    pub items: Vec<BatchItem>,
}

impl BatchContext {
    /// Build the context for `records`, in the order given.
    pub fn new(
        project: &ProjectId,
        layout: &RenditionLayout,
        language: Option<&str>,
        records: &[&AssetRecord],
    ) -> Self {
        let items = records
            .iter()
            .map(|record| BatchItem {
                source_path: record.path.clone(),
                name: record.name.clone(),
                fingerprint: record.fingerprint.clone(),
                rendition_path: layout.primary_path(&record.path),
                output_name: layout.mailbox_name(&record.path, None, language),
            })
            .collect();

        BatchContext {
            project: project.0.clone(),
            asset_class: layout.class(),
            language: language.map(str::to_string),
            generated_at: Utc::now(),
            items,
        }
    }

    /// Convert to a [`tera::Context`] for rendering.
    pub fn to_tera_context(&self) -> Result<tera::Context, RenderError> {
        tera::Context::from_serialize(self).map_err(RenderError::from)
    }
}
