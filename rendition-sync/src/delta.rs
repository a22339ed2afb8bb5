//! Delta calculation between a baseline and a current catalog.
//!
//! Classification order:
//! 1. No baseline: every filtered source is `added` (cold start).
//! 2. `added` / removal candidates / `changed` by path and fingerprint.
//! 3. Removal candidates whose fingerprint matches an added path become
//!    `renamed` (smallest new path wins).
//! 4. `invalid_renditions`: sources whose primary rendition is missing or
//!    older than the source.
//! 5. `orphaned_renditions`: rendition-subtree entries with a name this class
//!    can produce that are neither the primary nor the thumbnail of a current
//!    source. Entries of other classes are left alone.
//!
//! A renamed source whose old primary rendition exists and is not older than
//! the source counts as relocated: the move phase resolves it, so it is
//! neither invalid at the new path nor orphaned at the old one.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use globset::{GlobBuilder, GlobMatcher};
use serde::Serialize;

use rendition_core::{AssetRecord, Catalog};
use rendition_renderer::RenditionLayout;

use crate::error::ReconcileError;

/// Compiled asset-class filter.
#[derive(Debug, Clone)]
pub struct AssetFilter {
    pattern: String,
    matcher: GlobMatcher,
}

impl AssetFilter {
    /// Compile `pattern`. `*` does not cross `/`; `**/` matches any depth
    /// including none.
    pub fn new(pattern: &str) -> Result<Self, ReconcileError> {
        let invalid = |reason: String| ReconcileError::InvalidFilter {
            pattern: pattern.to_string(),
            reason,
        };
        if pattern.trim().is_empty() {
            return Err(invalid("filter is empty".to_string()));
        }
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|e| invalid(e.to_string()))?;
        Ok(Self {
            pattern: pattern.to_string(),
            matcher: glob.compile_matcher(),
        })
    }

    pub fn matches(&self, path: &str) -> bool {
        self.matcher.is_match(path)
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

/// Structured difference between baseline and current catalogs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Delta {
    pub added: BTreeSet<String>,
    pub changed: BTreeSet<String>,
    /// old path → new path; bijective.
    pub renamed: BTreeMap<String, String>,
    pub removed: BTreeSet<String>,
    pub invalid_renditions: BTreeSet<String>,
    pub orphaned_renditions: BTreeSet<String>,
    /// Derived path → the current sources that all map onto it. Reported
    /// only; does not make the delta non-empty.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub collisions: BTreeMap<String, BTreeSet<String>>,
}

impl Delta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.changed.is_empty()
            && self.renamed.is_empty()
            && self.removed.is_empty()
            && self.invalid_renditions.is_empty()
            && self.orphaned_renditions.is_empty()
    }

    /// One-line count summary for run logs.
    pub fn summary(&self) -> String {
        format!(
            "added={} changed={} renamed={} removed={} invalid={} orphaned={}",
            self.added.len(),
            self.changed.len(),
            self.renamed.len(),
            self.removed.len(),
            self.invalid_renditions.len(),
            self.orphaned_renditions.len(),
        )
    }
}

/// Compute the delta for one asset class.
///
/// `baseline == None` is a cold start. Both catalogs may contain rendition
/// entries; only `current`'s are consulted for steps 4–5.
pub fn compute_delta(
    filter: &AssetFilter,
    baseline: Option<&Catalog>,
    current: &Catalog,
    layout: &RenditionLayout,
) -> Result<Delta, ReconcileError> {
    let current_sources = sources(filter, current, layout);
    let renditions: BTreeMap<&str, &AssetRecord> = current
        .records()
        .filter(|r| layout.is_rendition(&r.path))
        .map(|r| (r.path.as_str(), r))
        .collect();

    let mut delta = Delta::default();

    match baseline {
        None => {
            delta.added = current_sources.keys().map(|p| p.to_string()).collect();
        }
        Some(baseline) => {
            let baseline_sources = sources(filter, baseline, layout);
            classify(&baseline_sources, &current_sources, &mut delta);
        }
    }

    // Old primaries that the move phase will carry to the renamed path.
    let mut relocated: BTreeMap<&str, &AssetRecord> = BTreeMap::new();
    let mut claimed: HashSet<String> = HashSet::new();
    let mut owners: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for (old, new) in &delta.renamed {
        let Some(source) = current_sources.get(new.as_str()) else {
            continue;
        };
        let (old_primary, old_thumbnail) = layout.derived_paths(old)?;
        if let Some(rendition) = renditions.get(old_primary.as_str()) {
            if rendition.modified >= source.modified {
                relocated.insert(new.as_str(), *rendition);
                claimed.insert(old_primary);
                claimed.insert(old_thumbnail);
            }
        }
    }

    for (path, source) in &current_sources {
        let (primary, thumbnail) = layout.derived_paths(path)?;
        for derived in [&primary, &thumbnail] {
            owners
                .entry(derived.clone())
                .or_default()
                .insert(path.to_string());
        }
        claimed.insert(thumbnail);
        let rendition = renditions
            .get(primary.as_str())
            .copied()
            .or_else(|| relocated.get(path).copied());
        claimed.insert(primary);
        match rendition {
            None => {
                delta.invalid_renditions.insert(path.to_string());
            }
            Some(rendition) if rendition.modified < source.modified => {
                delta.invalid_renditions.insert(path.to_string());
            }
            Some(_) => {}
        }
    }

    delta.orphaned_renditions = renditions
        .keys()
        .filter(|path| !claimed.contains(**path))
        .filter(|path| layout.could_produce(path, |source| filter.matches(source)))
        .map(|path| path.to_string())
        .collect();
    delta.collisions = owners
        .into_iter()
        .filter(|(_, sources)| sources.len() > 1)
        .collect();

    Ok(delta)
}

/// Like [`compute_delta`] with an uncompiled filter pattern.
pub fn compute_delta_for_pattern(
    pattern: &str,
    baseline: Option<&Catalog>,
    current: &Catalog,
    layout: &RenditionLayout,
) -> Result<Delta, ReconcileError> {
    compute_delta(&AssetFilter::new(pattern)?, baseline, current, layout)
}

fn sources<'a>(
    filter: &AssetFilter,
    catalog: &'a Catalog,
    layout: &RenditionLayout,
) -> BTreeMap<&'a str, &'a AssetRecord> {
    catalog
        .records()
        .filter(|r| !layout.is_rendition(&r.path) && filter.matches(&r.path))
        .map(|r| (r.path.as_str(), r))
        .collect()
}

fn classify(
    baseline: &BTreeMap<&str, &AssetRecord>,
    current: &BTreeMap<&str, &AssetRecord>,
    delta: &mut Delta,
) {
    let mut removal_candidates = BTreeSet::new();
    for (path, before) in baseline {
        match current.get(path) {
            None => {
                removal_candidates.insert(*path);
            }
            Some(now) if now.fingerprint != before.fingerprint => {
                delta.changed.insert(path.to_string());
            }
            Some(_) => {}
        }
    }

    // fingerprint → added paths still available for pairing, smallest first.
    let mut by_fingerprint: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for (path, record) in current {
        if !baseline.contains_key(path) {
            delta.added.insert(path.to_string());
            by_fingerprint
                .entry(record.fingerprint.as_str())
                .or_default()
                .insert(*path);
        }
    }

    for old in removal_candidates {
        let fingerprint = baseline[old].fingerprint.as_str();
        let new = by_fingerprint
            .get_mut(fingerprint)
            .and_then(|candidates| candidates.pop_first());
        match new {
            Some(new) => {
                delta.added.remove(new);
                delta.renamed.insert(old.to_string(), new.to_string());
            }
            None => {
                delta.removed.insert(old.to_string());
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, Utc};
    use rendition_core::{AssetClass, RenditionConfig};
    use rstest::rstest;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn rec(path: &str, fingerprint: &str, modified: DateTime<Utc>) -> AssetRecord {
        AssetRecord {
            path: path.to_string(),
            name: path.rsplit('/').next().unwrap().to_string(),
            fingerprint: fingerprint.to_string(),
            modified,
            asset_class: AssetClass::Image,
        }
    }

    fn catalog(records: Vec<AssetRecord>) -> Catalog {
        Catalog::from_records(records).unwrap()
    }

    fn layout(class: AssetClass) -> RenditionLayout {
        RenditionLayout::new(&RenditionConfig::default(), class).unwrap()
    }

    fn filter(class: AssetClass) -> AssetFilter {
        AssetFilter::new(&RenditionConfig::default().class(class).filter).unwrap()
    }

    fn set(paths: &[&str]) -> BTreeSet<String> {
        paths.iter().map(|p| p.to_string()).collect()
    }

    /// Source plus a fresh primary rendition.
    fn with_rendition(class: AssetClass, path: &str, fingerprint: &str) -> Vec<AssetRecord> {
        let primary = layout(class).primary_path(path);
        vec![
            rec(path, fingerprint, t0()),
            rec(&primary, &format!("r-{fingerprint}"), t0() + Duration::minutes(1)),
        ]
    }

    #[test]
    fn added_image_is_generated() {
        let class = AssetClass::Image;
        let baseline = catalog(with_rendition(class, "images/logo.png", "h1"));
        let mut now = with_rendition(class, "images/logo.png", "h1");
        now.push(rec("images/new.jpg", "h2", t0()));
        let current = catalog(now);

        let delta = compute_delta(&filter(class), Some(&baseline), &current, &layout(class)).unwrap();
        assert_eq!(delta.added, set(&["images/new.jpg"]));
        assert!(delta.changed.is_empty());
        assert!(delta.renamed.is_empty());
        assert!(delta.removed.is_empty());
        assert!(delta.orphaned_renditions.is_empty());
        assert_eq!(delta.invalid_renditions, set(&["images/new.jpg"]));
    }

    #[test]
    fn removed_drawing_orphans_its_rendition() {
        let class = AssetClass::Drawing;
        let baseline = catalog(vec![rec("drawings/chart1.svg", "h1", t0())]);
        let current = catalog(vec![rec("drawings/_renditions/chart1.png", "r1", t0())]);

        let delta = compute_delta(&filter(class), Some(&baseline), &current, &layout(class)).unwrap();
        assert_eq!(delta.removed, set(&["drawings/chart1.svg"]));
        assert_eq!(delta.orphaned_renditions, set(&["drawings/_renditions/chart1.png"]));
        assert!(delta.added.is_empty());
        assert!(delta.invalid_renditions.is_empty());
    }

    #[test]
    fn cold_start_adds_every_source() {
        let class = AssetClass::Image;
        let current = catalog(vec![
            rec("images/a.png", "h1", t0()),
            rec("images/b.png", "h2", t0()),
        ]);
        let delta = compute_delta(&filter(class), None, &current, &layout(class)).unwrap();
        assert_eq!(delta.added, set(&["images/a.png", "images/b.png"]));
        assert!(delta.removed.is_empty());
        assert!(delta.changed.is_empty());
        assert!(delta.renamed.is_empty());
    }

    #[test]
    fn identical_fingerprint_is_a_rename() {
        let class = AssetClass::Image;
        let baseline = catalog(with_rendition(class, "images/old.png", "H1"));
        let mut now = vec![rec("images/newname.png", "H1", t0())];
        now.push(rec("images/_renditions/old.png", "r-H1", t0() + Duration::minutes(1)));
        let current = catalog(now);

        let delta = compute_delta(&filter(class), Some(&baseline), &current, &layout(class)).unwrap();
        assert_eq!(
            delta.renamed,
            BTreeMap::from([("images/old.png".to_string(), "images/newname.png".to_string())])
        );
        assert!(delta.added.is_empty());
        assert!(delta.removed.is_empty());
        // Relocated by the move phase.
        assert!(delta.invalid_renditions.is_empty());
        assert!(delta.orphaned_renditions.is_empty());
    }

    #[test]
    fn rename_without_old_rendition_regenerates_new_path() {
        let class = AssetClass::Image;
        let baseline = catalog(vec![rec("images/old.png", "H1", t0())]);
        let current = catalog(vec![rec("images/newname.png", "H1", t0())]);

        let delta = compute_delta(&filter(class), Some(&baseline), &current, &layout(class)).unwrap();
        assert_eq!(delta.renamed.len(), 1);
        assert_eq!(delta.invalid_renditions, set(&["images/newname.png"]));
    }

    #[test]
    fn missing_rendition_is_invalid() {
        let class = AssetClass::Drawing;
        let snapshot = catalog(vec![rec("b.svg", "h1", t0())]);
        let delta = compute_delta(&filter(class), Some(&snapshot), &snapshot, &layout(class)).unwrap();
        assert_eq!(delta.invalid_renditions, set(&["b.svg"]));
        assert!(delta.added.is_empty() && delta.changed.is_empty());
    }

    #[test]
    fn rendition_older_than_source_is_invalid() {
        let class = AssetClass::Drawing;
        let current = catalog(vec![
            rec("a.svg", "h2", t0() + Duration::hours(1)),
            rec("_renditions/a.png", "r", t0()),
            rec("_renditions/a.thumb.png", "t", t0()),
        ]);
        let baseline = catalog(vec![rec("a.svg", "h1", t0())]);
        let delta = compute_delta(&filter(class), Some(&baseline), &current, &layout(class)).unwrap();
        assert_eq!(delta.changed, set(&["a.svg"]));
        assert_eq!(delta.invalid_renditions, set(&["a.svg"]));
        assert!(delta.orphaned_renditions.is_empty(), "thumbnail belongs to a live source");
    }

    #[test]
    fn orphaned_thumbnail_is_reported() {
        let class = AssetClass::Drawing;
        let mut records = with_rendition(class, "a.svg", "h1");
        records.push(rec("_renditions/gone.thumb.png", "t", t0()));
        let current = catalog(records);
        let delta = compute_delta(&filter(class), Some(&current), &current, &layout(class)).unwrap();
        assert_eq!(delta.orphaned_renditions, set(&["_renditions/gone.thumb.png"]));
    }

    #[test]
    fn renditions_of_other_classes_are_not_orphaned() {
        let class = AssetClass::Drawing;
        let mut records = with_rendition(class, "drawings/a.svg", "h1");
        records.push(rec("images/_renditions/photo.jpg", "r", t0()));
        records.push(rec("_renditions/notes.txt", "r", t0()));
        let current = catalog(records);
        let delta = compute_delta(&filter(class), Some(&current), &current, &layout(class)).unwrap();
        assert!(delta.orphaned_renditions.is_empty(), "{}", delta.summary());

        let image = AssetClass::Image;
        let delta = compute_delta(&filter(image), Some(&current), &current, &layout(image)).unwrap();
        assert!(delta.orphaned_renditions.contains("images/_renditions/photo.jpg"));
        assert!(!delta.orphaned_renditions.contains("_renditions/notes.txt"));
    }

    #[test]
    fn shared_thumbnail_name_is_a_collision() {
        let class = AssetClass::Image;
        let current = catalog(vec![
            rec("images/a.png", "h1", t0()),
            rec("images/a.jpg", "h2", t0()),
            rec("images/b.png", "h3", t0()),
        ]);
        let delta = compute_delta(&filter(class), Some(&current), &current, &layout(class)).unwrap();
        assert_eq!(
            delta.collisions,
            BTreeMap::from([(
                "images/_renditions/a.thumb.png".to_string(),
                set(&["images/a.jpg", "images/a.png"])
            )])
        );
    }

    #[test]
    fn converged_catalog_is_a_fixed_point() {
        let class = AssetClass::Drawing;
        let mut records = with_rendition(class, "drawings/a.svg", "h1");
        records.extend(with_rendition(class, "drawings/b.svg", "h2"));
        let current = catalog(records);
        let delta = compute_delta(&filter(class), Some(&current), &current, &layout(class)).unwrap();
        assert!(delta.is_empty(), "unexpected delta: {}", delta.summary());
    }

    #[test]
    fn paths_outside_filter_are_ignored() {
        let class = AssetClass::Drawing;
        let baseline = catalog(vec![rec("notes.txt", "h1", t0())]);
        let current = catalog(vec![rec("readme.md", "h2", t0())]);
        let delta = compute_delta(&filter(class), Some(&baseline), &current, &layout(class)).unwrap();
        assert!(delta.is_empty());
    }

    #[test]
    fn rename_tie_break_picks_smallest_new_path() {
        let class = AssetClass::Image;
        let baseline = catalog(vec![rec("images/old.png", "same", t0())]);
        let current = catalog(vec![
            rec("images/z-copy.png", "same", t0()),
            rec("images/a-copy.png", "same", t0()),
        ]);
        let delta = compute_delta(&filter(class), Some(&baseline), &current, &layout(class)).unwrap();
        assert_eq!(delta.renamed["images/old.png"], "images/a-copy.png");
        assert_eq!(delta.added, set(&["images/z-copy.png"]));
    }

    #[test]
    fn renames_are_bijective_for_shared_fingerprints() {
        let class = AssetClass::Image;
        let baseline = catalog(vec![
            rec("images/a.png", "same", t0()),
            rec("images/b.png", "same", t0()),
        ]);
        let current = catalog(vec![
            rec("images/c.png", "same", t0()),
            rec("images/d.png", "same", t0()),
        ]);
        let delta = compute_delta(&filter(class), Some(&baseline), &current, &layout(class)).unwrap();
        assert_eq!(delta.renamed["images/a.png"], "images/c.png");
        assert_eq!(delta.renamed["images/b.png"], "images/d.png");
        let targets: BTreeSet<_> = delta.renamed.values().collect();
        assert_eq!(targets.len(), delta.renamed.len());
    }

    #[test]
    fn empty_filter_is_rejected() {
        let err = AssetFilter::new("  ").unwrap_err();
        assert!(matches!(err, ReconcileError::InvalidFilter { .. }));
        let class = AssetClass::Image;
        let err = compute_delta_for_pattern("", None, &Catalog::new(), &layout(class)).unwrap_err();
        assert!(matches!(err, ReconcileError::InvalidFilter { .. }));
    }

    #[test]
    fn filter_star_does_not_cross_directories() {
        let f = AssetFilter::new("drawings/*.svg").unwrap();
        assert!(f.matches("drawings/a.svg"));
        assert!(!f.matches("drawings/sub/a.svg"));
        let deep = AssetFilter::new("**/*.svg").unwrap();
        assert!(deep.matches("b.svg"));
        assert!(deep.matches("drawings/sub/a.svg"));
    }

    #[derive(Debug, Clone, Copy)]
    enum Mutation {
        Add,
        Remove,
        Rename,
        Edit,
    }

    #[rstest]
    #[case::add(Mutation::Add)]
    #[case::remove(Mutation::Remove)]
    #[case::rename(Mutation::Rename)]
    #[case::edit(Mutation::Edit)]
    fn single_mutation_lands_in_exactly_one_class(#[case] mutation: Mutation) {
        let class = AssetClass::Image;
        let mut before = vec![
            rec("images/keep.png", "k", t0()),
            rec("images/target.png", "t", t0()),
        ];
        let mut after = before.clone();
        match mutation {
            Mutation::Add => after.push(rec("images/extra.png", "x", t0())),
            Mutation::Remove => after.retain(|r| r.path != "images/target.png"),
            Mutation::Rename => {
                after.retain(|r| r.path != "images/target.png");
                after.push(rec("images/moved.png", "t", t0()));
            }
            Mutation::Edit => {
                after.retain(|r| r.path != "images/target.png");
                after.push(rec("images/target.png", "t2", t0()));
            }
        }
        before.sort_by(|a, b| a.path.cmp(&b.path));
        let delta = compute_delta(
            &filter(class),
            Some(&catalog(before)),
            &catalog(after),
            &layout(class),
        )
        .unwrap();

        let hits = [
            !delta.added.is_empty(),
            !delta.changed.is_empty(),
            !delta.renamed.is_empty(),
            !delta.removed.is_empty(),
        ];
        assert_eq!(hits.iter().filter(|h| **h).count(), 1, "{mutation:?}: {}", delta.summary());
        assert!(delta.added.is_disjoint(&delta.changed));
        assert!(delta.added.is_disjoint(&delta.removed));
        assert!(delta.changed.is_disjoint(&delta.removed));
    }
}
