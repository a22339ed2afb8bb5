//! Reconciliation configuration.
//!
//! A [`RenditionConfig`] is built once (usually from YAML) and handed to the
//! coordinator at construction. Nothing in the engine reads environment
//! variables or process-wide settings.
//!
//! ```yaml
//! rendition_dir: _renditions
//! thumbnail_template: "{{ stem }}.thumb.png"
//! thumbnail_max_size: 256
//! language: en
//! classes:
//!   drawing:
//!     filter: "**/*.svg"
//!     rendition_extension: png
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::AssetClass;

/// Per-class filter and rendition format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassConfig {
    /// Glob pattern selecting the class's source assets.
    pub filter: String,
    /// Extension of the primary rendition; `None` keeps the source extension.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rendition_extension: Option<String>,
}

impl ClassConfig {
    /// Built-in defaults for `class`.
    pub fn default_for(class: AssetClass) -> Self {
        match class {
            AssetClass::Image => ClassConfig {
                filter: "**/*.{png,jpg,jpeg,gif,webp}".to_string(),
                rendition_extension: None,
            },
            AssetClass::Drawing => ClassConfig {
                filter: "**/*.svg".to_string(),
                rendition_extension: Some("png".to_string()),
            },
            AssetClass::Chart => ClassConfig {
                filter: "**/*.chart.json".to_string(),
                rendition_extension: Some("png".to_string()),
            },
        }
    }
}

/// Explicit configuration for one reconciliation engine instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenditionConfig {
    /// Directory name marking the rendition sub-tree inside each folder.
    pub rendition_dir: String,
    /// Tera template for thumbnail file names; `stem` and `ext` are the
    /// primary rendition's.
    pub thumbnail_template: String,
    /// Longest edge of a thumbnail, in pixels.
    pub thumbnail_max_size: u32,
    /// Upper bound on concurrent thumbnail workers.
    pub thumbnail_workers: usize,
    /// Language tag appended to rasterizer output names.
    pub language: Option<String>,
    /// Populate the optional debug section of run results.
    pub debug: bool,
    /// Root of the file-backed snapshot store.
    pub snapshot_root: PathBuf,
    /// Working area for aggregation documents and mailbox collection.
    pub staging_dir: PathBuf,
    /// Optional directory of `.tera` files overriding embedded templates.
    pub template_dir: Option<PathBuf>,
    /// Timeout applied to every remote request.
    pub request_timeout_secs: u64,
    /// Per-class overrides; classes not listed use [`ClassConfig::default_for`].
    pub classes: BTreeMap<AssetClass, ClassConfig>,
}

impl Default for RenditionConfig {
    fn default() -> Self {
        Self {
            rendition_dir: "_renditions".to_string(),
            thumbnail_template: "{{ stem }}.thumb.png".to_string(),
            thumbnail_max_size: 256,
            thumbnail_workers: 4,
            language: None,
            debug: false,
            snapshot_root: PathBuf::from(".renditions").join("snapshots"),
            staging_dir: PathBuf::from(".renditions").join("staging"),
            template_dir: None,
            request_timeout_secs: 60,
            classes: BTreeMap::new(),
        }
    }
}

impl RenditionConfig {
    /// Load a YAML config file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let contents = std::fs::read_to_string(path).map_err(|source| CoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&contents).map_err(|source| CoreError::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Effective settings for `class`.
    pub fn class(&self, class: AssetClass) -> ClassConfig {
        self.classes
            .get(&class)
            .cloned()
            .unwrap_or_else(|| ClassConfig::default_for(class))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Worker count clamped to at least one.
    pub fn thumbnail_workers(&self) -> usize {
        self.thumbnail_workers.max(1)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
