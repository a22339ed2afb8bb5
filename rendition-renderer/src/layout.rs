//! Rendition path layout.
//!
//! # Path mapping
//!
//! | Source                      | Primary rendition                         | Thumbnail (default template)                   |
//! |-----------------------------|-------------------------------------------|------------------------------------------------|
//! | `drawings/chart1.svg`       | `drawings/_renditions/chart1.png`         | `drawings/_renditions/chart1.thumb.png`        |
//! | `b.svg`                     | `_renditions/b.png`                       | `_renditions/b.thumb.png`                      |
//! | `images/logo.jpg` (image)   | `images/_renditions/logo.jpg`             | `images/_renditions/logo.thumb.png`            |
//! | `reports/q1.chart.json`     | `reports/_renditions/q1.chart.png`        | `reports/_renditions/q1.chart.thumb.png`       |
//!
//! A path belongs to the rendition sub-tree when any of its components equals
//! the configured rendition directory name. All classes share that sub-tree;
//! [`RenditionLayout::could_produce`] tells which names a class may own.

use rendition_core::{AssetClass, RenditionConfig};
use serde::Serialize;
use tera::Tera;

use crate::error::RenderError;

const THUMBNAIL_TEMPLATE: &str = "thumbnail_name";

#[derive(Serialize)]
struct NameCtx<'a> {
    stem: &'a str,
    ext: &'a str,
    name: &'a str,
}

/// Maps source asset paths to the names of their derived files for one
/// asset class.
pub struct RenditionLayout {
    class: AssetClass,
    rendition_dir: String,
    rendition_extension: Option<String>,
    thumbnail_template: String,
    /// Extension of thumbnails rendered for this class's primaries.
    thumbnail_extension: String,
    tera: Tera,
}

impl RenditionLayout {
    /// Build the layout for `class`, compiling and sanity-checking the
    /// thumbnail name template.
    pub fn new(config: &RenditionConfig, class: AssetClass) -> Result<Self, RenderError> {
        let mut tera = Tera::default();
        tera.add_raw_template(THUMBNAIL_TEMPLATE, &config.thumbnail_template)?;
        let mut layout = RenditionLayout {
            class,
            rendition_dir: config.rendition_dir.clone(),
            rendition_extension: config.class(class).rendition_extension,
            thumbnail_template: config.thumbnail_template.clone(),
            thumbnail_extension: String::new(),
            tera,
        };
        layout.check_thumbnail_template()?;
        let sample = join_extension("sample", layout.rendition_extension.as_deref().unwrap_or("png"));
        let thumbnail = layout.thumbnail_name(&sample)?;
        layout.thumbnail_extension = split_extension(&thumbnail).1.to_string();
        Ok(layout)
    }

    pub fn class(&self) -> AssetClass {
        self.class
    }

    pub fn rendition_dir(&self) -> &str {
        &self.rendition_dir
    }

    /// Whether `path` lives inside a rendition sub-tree.
    pub fn is_rendition(&self, path: &str) -> bool {
        path.split('/').any(|c| c == self.rendition_dir)
    }

    /// Whether the rendition-subtree entry `path` has a name this class can
    /// produce.
    ///
    /// Classes that keep the source extension de-map the entry (rendition
    /// directory dropped) and ask `source_matches` about the result. Classes
    /// with a fixed rendition extension accept the primary and thumbnail
    /// extensions.
    pub fn could_produce(&self, path: &str, source_matches: impl Fn(&str) -> bool) -> bool {
        let Some(source) = self.demap(path) else {
            return false;
        };
        match &self.rendition_extension {
            None => source_matches(&source),
            Some(ext) => {
                let (_, found) = split_extension(split_parent(path).1);
                found == ext || found == self.thumbnail_extension
            }
        }
    }

    /// `path` without its rendition directory components; `None` outside the
    /// sub-tree.
    fn demap(&self, path: &str) -> Option<String> {
        if !self.is_rendition(path) {
            return None;
        }
        let kept: Vec<&str> = path.split('/').filter(|c| *c != self.rendition_dir).collect();
        Some(kept.join("/"))
    }

    /// Primary rendition path for a source asset.
    pub fn primary_path(&self, source: &str) -> String {
        let (parent, name) = split_parent(source);
        let (stem, ext) = split_extension(name);
        let ext = self.rendition_extension.as_deref().unwrap_or(ext);
        let file = join_extension(stem, ext);
        match parent {
            Some(parent) => format!("{parent}/{}/{file}", self.rendition_dir),
            None => format!("{}/{file}", self.rendition_dir),
        }
    }

    /// Thumbnail path derived from a primary rendition path by template
    /// substitution. The thumbnail is a sibling of the primary.
    pub fn thumbnail_path(&self, primary: &str) -> Result<String, RenderError> {
        let (parent, name) = split_parent(primary);
        let file = self.thumbnail_name(name)?;
        Ok(match parent {
            Some(parent) => format!("{parent}/{file}"),
            None => file,
        })
    }

    /// Primary and thumbnail paths for a source asset.
    pub fn derived_paths(&self, source: &str) -> Result<(String, String), RenderError> {
        let primary = self.primary_path(source);
        let thumbnail = self.thumbnail_path(&primary)?;
        Ok((primary, thumbnail))
    }

    /// Deterministic name under which a rasterizer drops the binary for
    /// `source` in a shared mailbox directory:
    /// `<source with '/' as '__'>[~<sub_id>][.<language>].<extension>`.
    pub fn mailbox_name(&self, source: &str, sub_id: Option<&str>, language: Option<&str>) -> String {
        let (_, name) = split_parent(source);
        let (_, source_ext) = split_extension(name);
        let ext = self.rendition_extension.as_deref().unwrap_or(source_ext);

        let mut out = source.replace('/', "__");
        if !source_ext.is_empty() {
            out.truncate(out.len() - source_ext.len() - 1);
        }
        if let Some(sub) = sub_id {
            out.push('~');
            out.push_str(sub);
        }
        if let Some(lang) = language {
            out.push('.');
            out.push_str(lang);
        }
        join_extension(&out, ext)
    }

    fn thumbnail_name(&self, primary_name: &str) -> Result<String, RenderError> {
        let (stem, ext) = split_extension(primary_name);
        let ctx = tera::Context::from_serialize(NameCtx {
            stem,
            ext,
            name: primary_name,
        })?;
        let rendered = self.tera.render(THUMBNAIL_TEMPLATE, &ctx)?;
        Ok(rendered.trim().to_string())
    }

    fn check_thumbnail_template(&self) -> Result<(), RenderError> {
        let invalid = |reason: &str| RenderError::InvalidNameTemplate {
            template: self.thumbnail_template.clone(),
            reason: reason.to_string(),
        };
        let sample = "sample.png";
        let name = self.thumbnail_name(sample)?;
        if name.is_empty() {
            return Err(invalid("renders to an empty name"));
        }
        if name.contains('/') || name.contains('\\') {
            return Err(invalid("must not contain path separators"));
        }
        if name == sample {
            return Err(invalid("renders to the primary rendition name"));
        }
        Ok(())
    }
}

fn split_parent(path: &str) -> (Option<&str>, &str) {
    match path.rsplit_once('/') {
        Some((parent, name)) => (Some(parent), name),
        None => (None, path),
    }
}

/// `sales.chart.json` → (`sales.chart`, `json`); `README` → (`README`, ``).
fn split_extension(name: &str) -> (&str, &str) {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, ext),
        _ => (name, ""),
    }
}

fn join_extension(stem: &str, ext: &str) -> String {
    if ext.is_empty() {
        stem.to_string()
    } else {
        format!("{stem}.{ext}")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
