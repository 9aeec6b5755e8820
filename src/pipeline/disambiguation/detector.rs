//! Ambiguity Detection
//!
//! Concepts sharing a canonical label but living under divergent parent
//! lineages are collision candidates. Divergence combines token-frequency
//! context overlap with parent-lineage disagreement; only collisions whose
//! context overlap falls below the policy threshold go on to the LLM.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::config::DisambiguationPolicy;
use crate::types::Concept;
use crate::utils::context_features::{
    ContextWindow, compute_context_divergence, compute_context_overlap,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmbiguityCandidate {
    pub label: String,
    pub level: u8,
    pub concept_ids: Vec<String>,
    pub parent_divergence: f64,
    pub context_overlap: f64,
    pub divergence: f64,
}

pub struct AmbiguityDetector {
    policy: DisambiguationPolicy,
}

impl AmbiguityDetector {
    pub fn new(policy: DisambiguationPolicy) -> Self {
        Self { policy }
    }

    pub fn detect_collisions(
        &self,
        concepts: &[Concept],
        contexts: &BTreeMap<String, Vec<ContextWindow>>,
    ) -> Vec<AmbiguityCandidate> {
        let mut groups: BTreeMap<(u8, String), Vec<&Concept>> = BTreeMap::new();
        for concept in concepts {
            // Already-split concepts keep their shared surface label; they
            // must not be split again.
            if concept
                .rationale
                .passed_gates
                .get("disambiguation")
                .copied()
                .unwrap_or(false)
            {
                continue;
            }
            groups
                .entry((concept.level, concept.canonical_label.to_lowercase()))
                .or_default()
                .push(concept);
        }

        let mut candidates = Vec::new();
        for ((level, _), members) in groups {
            if members.len() < 2 {
                continue;
            }
            let lineages: BTreeSet<String> = members
                .iter()
                .map(|c| {
                    c.parents
                        .first()
                        .cloned()
                        .unwrap_or_else(|| "<root>".to_string())
                })
                .collect();
            if lineages.len() < 2 {
                continue;
            }
            let parent_divergence = 1.0 - 1.0 / lineages.len() as f64;

            // Worst pairwise overlap across the group drives the decision.
            let mut min_overlap = 1.0f64;
            let mut max_divergence = 0.0f64;
            for i in 0..members.len() {
                for j in (i + 1)..members.len() {
                    let ctx_a = contexts.get(&members[i].id).map(Vec::as_slice).unwrap_or(&[]);
                    let ctx_b = contexts.get(&members[j].id).map(Vec::as_slice).unwrap_or(&[]);
                    min_overlap = min_overlap.min(compute_context_overlap(ctx_a, ctx_b));
                    max_divergence = max_divergence.max(compute_context_divergence(ctx_a, ctx_b));
                }
            }

            if min_overlap < self.policy.min_context_overlap_threshold
                && max_divergence > self.policy.divergence_threshold
            {
                candidates.push(AmbiguityCandidate {
                    label: members[0].canonical_label.clone(),
                    level,
                    concept_ids: members.iter().map(|c| c.id.clone()).collect(),
                    parent_divergence,
                    context_overlap: min_overlap,
                    divergence: max_divergence,
                });
            }
        }
        candidates
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SupportStats;

    fn concept(id: &str, parents: Vec<&str>) -> Concept {
        Concept::new(id, 1, "Machine Learning")
            .with_parents(parents.into_iter().map(String::from).collect())
            .with_support(SupportStats::new(6, 4, 20))
    }

    fn window(concept_id: &str, text: &str, parent: &str, institution: &str) -> ContextWindow {
        ContextWindow {
            concept_id: concept_id.into(),
            text: text.into(),
            institution: institution.into(),
            parent_lineage: format!("L1:{parent}"),
            source_index: 0,
        }
    }

    #[test]
    fn flags_divergent_parents_with_disjoint_contexts() {
        let detector = AmbiguityDetector::new(DisambiguationPolicy {
            min_context_overlap_threshold: 0.6,
            ..DisambiguationPolicy::default()
        });
        let contexts = BTreeMap::from([
            (
                "a".to_string(),
                vec![window("a", "robotics research lab", "p1", "inst1")],
            ),
            (
                "b".to_string(),
                vec![window("b", "finance teaching track", "p2", "inst2")],
            ),
        ]);
        let candidates =
            detector.detect_collisions(&[concept("a", vec!["p1"]), concept("b", vec!["p2"])], &contexts);

        assert_eq!(candidates.len(), 1);
        let candidate = &candidates[0];
        assert!(candidate.parent_divergence > 0.49);
        assert!(candidate.context_overlap < 0.6);
        assert_eq!(candidate.concept_ids, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn shared_lineage_is_not_a_collision() {
        let detector = AmbiguityDetector::new(DisambiguationPolicy::default());
        let contexts = BTreeMap::new();
        let candidates =
            detector.detect_collisions(&[concept("a", vec!["p1"]), concept("b", vec!["p1"])], &contexts);
        assert!(candidates.is_empty());
    }

    #[test]
    fn overlapping_contexts_suppress_collisions() {
        let detector = AmbiguityDetector::new(DisambiguationPolicy::default());
        let shared = "machine learning research group";
        let contexts = BTreeMap::from([
            ("a".to_string(), vec![window("a", shared, "p1", "inst1")]),
            ("b".to_string(), vec![window("b", shared, "p2", "inst2")]),
        ]);
        let candidates =
            detector.detect_collisions(&[concept("a", vec!["p1"]), concept("b", vec!["p2"])], &contexts);
        assert!(candidates.is_empty());
    }
}
