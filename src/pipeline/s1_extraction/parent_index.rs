//! Parent Index
//!
//! Resolves parent mentions against the previous level's accepted
//! candidates or concepts. Lookups go through the minimal canonical form of
//! the candidate's normalized label and every alias; a hit yields the anchor
//! string `L{level}:{normalized}`. Near-miss spellings fall back to fuzzy
//! matching gated by `parent_similarity_cutoff`.

use std::collections::BTreeMap;

use crate::config::LabelPolicy;
use crate::types::{Candidate, Concept};
use crate::utils::normalization::minimal_canonical_form;

pub struct ParentIndex {
    label_policy: LabelPolicy,
    /// canonical lookup key -> anchor string
    entries: BTreeMap<String, String>,
}

impl ParentIndex {
    pub fn new(label_policy: LabelPolicy) -> Self {
        Self {
            label_policy,
            entries: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Index accepted candidates from the previous level.
    pub fn build_index(&mut self, parents: &[Candidate]) {
        for parent in parents {
            let anchor = format!("L{}:{}", parent.level, parent.normalized);
            self.insert_key(&parent.normalized, &anchor);
            self.insert_key(&parent.label, &anchor);
            for alias in &parent.aliases {
                self.insert_key(alias, &anchor);
            }
        }
    }

    /// Index concepts (used when prior levels are already consolidated).
    pub fn build_from_concepts(&mut self, parents: &[Concept]) {
        for parent in parents {
            let normalized = minimal_canonical_form(&parent.canonical_label, &self.label_policy);
            let anchor = format!("L{}:{}", parent.level, normalized);
            self.insert_key(&parent.canonical_label, &anchor);
            for alias in &parent.aliases {
                self.insert_key(alias, &anchor);
            }
        }
    }

    fn insert_key(&mut self, surface: &str, anchor: &str) {
        let key = minimal_canonical_form(surface, &self.label_policy);
        if !key.is_empty() {
            self.entries.entry(key).or_insert_with(|| anchor.to_string());
        }
    }

    /// Resolve a parent mention for a child at `child_level`. Returns the
    /// matching anchors (at most one today; the Vec keeps the call sites
    /// stable if joint parents ever resolve to multiple anchors).
    pub fn resolve_anchor(&self, mention: &str, child_level: u8) -> Vec<String> {
        if child_level == 0 {
            return Vec::new();
        }
        let key = minimal_canonical_form(mention, &self.label_policy);
        if key.is_empty() {
            return Vec::new();
        }
        if let Some(anchor) = self.entries.get(&key) {
            return vec![anchor.clone()];
        }

        // Fuzzy fallback for near-miss spellings.
        let cutoff = self.label_policy.parent_similarity_cutoff;
        let mut best: Option<(f64, &String)> = None;
        for (candidate_key, anchor) in &self.entries {
            let score = strsim::jaro_winkler(&key, candidate_key);
            if score >= cutoff && best.map_or(true, |(b, _)| score > b) {
                best = Some((score, anchor));
            }
        }
        best.map(|(_, anchor)| vec![anchor.clone()]).unwrap_or_default()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SupportStats;

    fn parent() -> Candidate {
        Candidate {
            level: 0,
            label: "College of Engineering".into(),
            normalized: "college of engineering".into(),
            parents: vec![],
            aliases: vec!["College of Engineering".into(), "College of Eng".into()],
            support: SupportStats::new(1, 1, 1),
        }
    }

    #[test]
    fn resolves_labels_and_aliases() {
        let mut index = ParentIndex::new(LabelPolicy::default());
        index.build_index(&[parent()]);
        assert_eq!(
            index.resolve_anchor("College of Engineering", 1),
            vec!["L0:college of engineering".to_string()]
        );
        assert_eq!(
            index.resolve_anchor("College of Eng", 1),
            vec!["L0:college of engineering".to_string()]
        );
    }

    #[test]
    fn unknown_parents_yield_no_anchor() {
        let mut index = ParentIndex::new(LabelPolicy::default());
        index.build_index(&[parent()]);
        assert!(index.resolve_anchor("School of Medicine", 1).is_empty());
    }

    #[test]
    fn fuzzy_fallback_catches_near_misses() {
        let mut index = ParentIndex::new(LabelPolicy::default());
        index.build_index(&[parent()]);
        assert_eq!(
            index.resolve_anchor("College of Engineerng", 1),
            vec!["L0:college of engineering".to_string()]
        );
    }

    #[test]
    fn level_zero_children_have_no_parents() {
        let mut index = ParentIndex::new(LabelPolicy::default());
        index.build_index(&[parent()]);
        assert!(index.resolve_anchor("College of Engineering", 0).is_empty());
    }

    #[test]
    fn concept_indexing_uses_canonical_labels() {
        let mut index = ParentIndex::new(LabelPolicy::default());
        let concept = Concept::new("concept:0:engineering", 0, "Engineering")
            .with_aliases(vec!["College of Engineering".into()]);
        index.build_from_concepts(&[concept]);
        assert_eq!(
            index.resolve_anchor("College of Engineering", 1),
            vec!["L0:engineering".to_string()]
        );
    }
}
