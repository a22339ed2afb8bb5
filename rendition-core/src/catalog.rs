//! Catalogs: point-in-time listings of a project's asset tree.
//!
//! Remote collaborators return a tree of [`CatalogEntry`] nodes; a
//! [`Catalog`] is the flattened, path-keyed view that reconciliation
//! compares. Flattening rejects malformed trees with
//! [`CoreError::CatalogParse`] instead of guessing.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{parse_err, CoreError};
use crate::types::{AssetClass, AssetRecord};

/// One node of a fetched asset tree.
///
/// Directory nodes carry `children` (or `directory: true`); file nodes must
/// carry both `fingerprint` and `modified`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub path: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
    #[serde(default)]
    pub directory: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<CatalogEntry>,
}

impl CatalogEntry {
    /// A file node.
    pub fn file(path: &str, fingerprint: &str, modified: DateTime<Utc>) -> Self {
        Self {
            path: path.to_string(),
            name: file_name(path).to_string(),
            fingerprint: Some(fingerprint.to_string()),
            modified: Some(modified),
            directory: false,
            children: Vec::new(),
        }
    }

    /// A directory node with the given children.
    pub fn dir(path: &str, children: Vec<CatalogEntry>) -> Self {
        Self {
            path: path.to_string(),
            name: file_name(path).to_string(),
            fingerprint: None,
            modified: None,
            directory: true,
            children,
        }
    }

    fn is_directory(&self) -> bool {
        self.directory || !self.children.is_empty()
    }
}

/// Path-keyed collection of [`AssetRecord`]s for one project at one instant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    records: BTreeMap<String, AssetRecord>,
}

impl Catalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from already-flat records. Duplicate or invalid paths are a
    /// parse error.
    pub fn from_records(records: Vec<AssetRecord>) -> Result<Self, CoreError> {
        let mut catalog = Catalog::new();
        for record in records {
            catalog.insert(record)?;
        }
        Ok(catalog)
    }

    /// Flatten a fetched tree, tagging every file with `class`.
    pub fn from_tree(entries: &[CatalogEntry], class: AssetClass) -> Result<Self, CoreError> {
        let mut catalog = Catalog::new();
        flatten_into(entries, class, &mut catalog)?;
        Ok(catalog)
    }

    /// Decode a JSON array of [`CatalogEntry`] nodes and flatten it.
    pub fn from_json(json: &str, class: AssetClass) -> Result<Self, CoreError> {
        let entries: Vec<CatalogEntry> = serde_json::from_str(json)?;
        Self::from_tree(&entries, class)
    }

    fn insert(&mut self, record: AssetRecord) -> Result<(), CoreError> {
        validate_path(&record.path)?;
        if record.fingerprint.is_empty() {
            return Err(parse_err(format!("empty fingerprint for {}", record.path)));
        }
        if self.records.contains_key(&record.path) {
            return Err(parse_err(format!("duplicate path {}", record.path)));
        }
        self.records.insert(record.path.clone(), record);
        Ok(())
    }

    /// Keep only the records for which `keep` returns true.
    pub fn retain(&self, mut keep: impl FnMut(&AssetRecord) -> bool) -> Catalog {
        Catalog {
            records: self
                .records
                .iter()
                .filter(|(_, r)| keep(r))
                .map(|(k, r)| (k.clone(), r.clone()))
                .collect(),
        }
    }

    pub fn get(&self, path: &str) -> Option<&AssetRecord> {
        self.records.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.records.contains_key(path)
    }

    /// Records in path order.
    pub fn records(&self) -> impl Iterator<Item = &AssetRecord> {
        self.records.values()
    }

    /// Paths in lexicographic order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Owned records in path order, for persistence.
    pub fn to_records(&self) -> Vec<AssetRecord> {
        self.records.values().cloned().collect()
    }
}

fn flatten_into(
    entries: &[CatalogEntry],
    class: AssetClass,
    out: &mut Catalog,
) -> Result<(), CoreError> {
    for entry in entries {
        if entry.is_directory() {
            validate_path(&entry.path)?;
            flatten_into(&entry.children, class, out)?;
            continue;
        }
        let fingerprint = entry
            .fingerprint
            .clone()
            .ok_or_else(|| parse_err(format!("file {} has no fingerprint", entry.path)))?;
        let modified = entry
            .modified
            .ok_or_else(|| parse_err(format!("file {} has no modification time", entry.path)))?;
        let name = if entry.name.is_empty() {
            file_name(&entry.path).to_string()
        } else {
            entry.name.clone()
        };
        out.insert(AssetRecord {
            path: entry.path.clone(),
            name,
            fingerprint,
            modified,
            asset_class: class,
        })?;
    }
    Ok(())
}

fn validate_path(path: &str) -> Result<(), CoreError> {
    if path.is_empty() {
        return Err(parse_err("entry with empty path"));
    }
    if path.starts_with('/') || path.contains('\\') {
        return Err(parse_err(format!("path {path} must be relative and '/'-separated")));
    }
    if path
        .split('/')
        .any(|c| c.is_empty() || c == "." || c == "..")
    {
        return Err(parse_err(format!("path {path} has an empty or relative component")));
    }
    Ok(())
}

/// Last `/`-separated component of an asset path.
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn ts() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn flattens_nested_tree_and_skips_directories() {
        let tree = vec![CatalogEntry::dir(
            "images",
            vec![
                CatalogEntry::file("images/logo.png", "aa", ts()),
                CatalogEntry::dir(
                    "images/icons",
                    vec![CatalogEntry::file("images/icons/x.png", "bb", ts())],
                ),
            ],
        )];
        let catalog = Catalog::from_tree(&tree, AssetClass::Image).unwrap();
        let paths: Vec<_> = catalog.paths().collect();
        assert_eq!(paths, vec!["images/icons/x.png", "images/logo.png"]);
        assert_eq!(catalog.get("images/logo.png").unwrap().name, "logo.png");
    }

    #[test]
    fn empty_directory_is_not_a_file() {
        let tree = vec![CatalogEntry::dir("empty", vec![])];
        let catalog = Catalog::from_tree(&tree, AssetClass::Image).unwrap();
        assert!(catalog.is_empty());
    }

    #[test]
    fn duplicate_paths_are_rejected() {
        let tree = vec![
            CatalogEntry::file("a.png", "aa", ts()),
            CatalogEntry::file("a.png", "bb", ts()),
        ];
        let err = Catalog::from_tree(&tree, AssetClass::Image).unwrap_err();
        assert!(err.to_string().contains("duplicate path a.png"));
    }

    #[test]
    fn file_without_fingerprint_is_rejected() {
        let mut entry = CatalogEntry::file("a.svg", "aa", ts());
        entry.fingerprint = None;
        let err = Catalog::from_tree(&[entry], AssetClass::Drawing).unwrap_err();
        assert!(matches!(err, CoreError::CatalogParse { .. }));
    }

    #[test]
    fn relative_components_are_rejected() {
        for bad in ["../a.png", "/abs.png", "a//b.png", "a/./b.png"] {
            let tree = vec![CatalogEntry::file(bad, "aa", ts())];
            assert!(
                Catalog::from_tree(&tree, AssetClass::Image).is_err(),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn from_json_reports_malformed_input() {
        let err = Catalog::from_json("{not json", AssetClass::Image).unwrap_err();
        assert!(matches!(err, CoreError::CatalogJson(_)));
    }

    #[test]
    fn from_json_parses_tree() {
        let json = r#"[
            {"path": "drawings", "name": "drawings", "children": [
                {"path": "drawings/a.svg", "name": "a.svg",
                 "fingerprint": "f1", "modified": "2024-05-01T10:00:00Z"}
            ]}
        ]"#;
        let catalog = Catalog::from_json(json, AssetClass::Drawing).unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(
            catalog.get("drawings/a.svg").unwrap().asset_class,
            AssetClass::Drawing
        );
    }

    #[test]
    fn retain_filters_records() {
        let tree = vec![
            CatalogEntry::file("a.png", "aa", ts()),
            CatalogEntry::file("b.svg", "bb", ts()),
        ];
        let catalog = Catalog::from_tree(&tree, AssetClass::Image).unwrap();
        let pngs = catalog.retain(|r| r.path.ends_with(".png"));
        assert_eq!(pngs.len(), 1);
        assert!(pngs.contains("a.png"));
    }
}
