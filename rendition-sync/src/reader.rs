//! Catalog reader: fetch a project tree and narrow it to one asset class.
//!
//! Every class shares the rendition sub-tree, so the reader also drops
//! rendition entries that belong to a live source of another class.

use std::collections::HashSet;

use rendition_core::{AssetClass, Catalog, CatalogScope, ProjectId, RenditionConfig};
use rendition_renderer::RenditionLayout;

use crate::delta::AssetFilter;
use crate::error::ReconcileError;
use crate::remote::CatalogSource;

/// Filters and layouts of the classes other than the one being read.
pub struct SiblingClasses {
    classes: Vec<(AssetFilter, RenditionLayout)>,
}

impl SiblingClasses {
    /// Every configured class except `class`.
    pub fn of(config: &RenditionConfig, class: AssetClass) -> Result<Self, ReconcileError> {
        let mut classes = Vec::new();
        for other in AssetClass::all().iter().filter(|c| **c != class) {
            let filter = AssetFilter::new(&config.class(*other).filter)?;
            classes.push((filter, RenditionLayout::new(config, *other)?));
        }
        Ok(Self { classes })
    }

    /// No siblings: every rendition entry is kept.
    pub fn none() -> Self {
        Self {
            classes: Vec::new(),
        }
    }
}

/// Primary and thumbnail paths of every source in `catalog` selected by
/// `filter`.
fn derived_paths(
    catalog: &Catalog,
    filter: &AssetFilter,
    layout: &RenditionLayout,
) -> Result<HashSet<String>, ReconcileError> {
    let mut paths = HashSet::new();
    for record in catalog.records() {
        if layout.is_rendition(&record.path) || !filter.matches(&record.path) {
            continue;
        }
        let (primary, thumbnail) = layout.derived_paths(&record.path)?;
        paths.insert(primary);
        paths.insert(thumbnail);
    }
    Ok(paths)
}

/// Fetch the current catalog for `class`.
///
/// Keeps entries matching `filter` plus the rendition-subtree entries this
/// class may own: those derived from its own sources and those no sibling
/// source derives. A transport failure is [`ReconcileError::CatalogFetch`];
/// a malformed tree is [`ReconcileError::CatalogParse`].
pub fn read_catalog(
    source: &dyn CatalogSource,
    project: &ProjectId,
    scope: &CatalogScope,
    class: AssetClass,
    filter: &AssetFilter,
    layout: &RenditionLayout,
    siblings: &SiblingClasses,
) -> Result<Catalog, ReconcileError> {
    let entries = source
        .fetch_catalog(project, scope)
        .map_err(ReconcileError::CatalogFetch)?;
    let full = Catalog::from_tree(&entries, class)?;

    let own = derived_paths(&full, filter, layout)?;
    let mut foreign = HashSet::new();
    for (other_filter, other_layout) in &siblings.classes {
        foreign.extend(derived_paths(&full, other_filter, other_layout)?);
    }
    let catalog = full.retain(|r| {
        if layout.is_rendition(&r.path) {
            own.contains(&r.path) || !foreign.contains(&r.path)
        } else {
            filter.matches(&r.path)
        }
    });
    tracing::debug!(
        "catalog {project}/{class} ({}): {} of {} entries kept",
        scope.as_query(),
        catalog.len(),
        full.len()
    );
    Ok(catalog)
}
