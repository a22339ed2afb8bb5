//! Action plan derived from a [`Delta`].

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::delta::Delta;

/// The three rendition phases for one run, each deduplicated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActionPlan {
    /// `added ∪ invalid_renditions` (source paths).
    pub to_generate: BTreeSet<String>,
    /// `renamed` (old source path → new source path).
    pub to_move: BTreeMap<String, String>,
    /// `removed ∪ orphaned_renditions`; removed sources and rendition paths mixed.
    pub to_remove: BTreeSet<String>,
}

impl ActionPlan {
    pub fn from_delta(delta: &Delta) -> Self {
        Self {
            to_generate: delta
                .added
                .union(&delta.invalid_renditions)
                .cloned()
                .collect(),
            to_move: delta.renamed.clone(),
            to_remove: delta
                .removed
                .union(&delta.orphaned_renditions)
                .cloned()
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.to_generate.is_empty() && self.to_move.is_empty() && self.to_remove.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "generate={} move={} remove={}",
            self.to_generate.len(),
            self.to_move.len(),
            self.to_remove.len()
        )
    }
}
