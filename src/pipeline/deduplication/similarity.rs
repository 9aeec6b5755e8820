//! Pair Similarity Scoring
//!
//! Weighted composite of Jaro-Winkler, token Jaccard, abbreviation score and
//! suffix/prefix hints, capped at 1.0. A recognized abbreviation
//! relationship (alias-initials or per-token prefix truncation)
//! short-circuits straight to 1.0. Pairs with disjoint non-empty parent sets
//! are never merge candidates.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::config::DeduplicationPolicy;
use crate::types::Concept;
use crate::utils::phonetic::generate_phonetic_key;
use crate::utils::similarity::preprocess_for_similarity;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureSet {
    pub raw: BTreeMap<String, f64>,
    pub weighted: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairDecision {
    pub score: f64,
    pub passed: bool,
    /// Feature contributing the most weighted mass.
    pub driver: String,
    pub features: FeatureSet,
}

pub struct SimilarityScorer {
    policy: DeduplicationPolicy,
}

impl SimilarityScorer {
    pub fn new(policy: DeduplicationPolicy) -> Self {
        Self { policy }
    }

    /// Pairs with disjoint non-empty parent sets are incompatible.
    pub fn parent_compatible(&self, a: &Concept, b: &Concept) -> bool {
        if a.parents.is_empty() || b.parents.is_empty() {
            return true;
        }
        let parents_a: BTreeSet<&String> = a.parents.iter().collect();
        b.parents.iter().any(|p| parents_a.contains(p))
    }

    /// Cheap phonetic pre-filter score for a pair.
    pub fn phonetic_probe(&self, a: &Concept, b: &Concept) -> f64 {
        let key_a = generate_phonetic_key(&a.canonical_label);
        let key_b = generate_phonetic_key(&b.canonical_label);
        if key_a.is_empty() || key_b.is_empty() {
            return 1.0;
        }
        strsim::jaro(&key_a, &key_b)
    }

    pub fn score_pair(&self, a: &Concept, b: &Concept) -> PairDecision {
        let threshold = self.policy.threshold_for_level(a.level.max(b.level));
        let norm_a = preprocess_for_similarity(&a.canonical_label);
        let norm_b = preprocess_for_similarity(&b.canonical_label);

        // Identical canonical forms are always duplicates.
        if norm_a == norm_b && !norm_a.is_empty() {
            let mut raw = BTreeMap::new();
            raw.insert("exact_match".to_string(), 1.0);
            return PairDecision {
                score: 1.0,
                passed: true,
                driver: "exact_match".into(),
                features: FeatureSet {
                    raw: raw.clone(),
                    weighted: raw,
                },
            };
        }

        // Abbreviation short-circuit.
        if is_abbreviation_pair(a, b) {
            let mut raw = BTreeMap::new();
            raw.insert("abbrev_score".to_string(), 1.0);
            let mut weighted = BTreeMap::new();
            weighted.insert(
                "abbrev_score".to_string(),
                self.policy.abbrev_score_weight.max(1.0),
            );
            return PairDecision {
                score: 1.0,
                passed: true,
                driver: "abbrev_score".into(),
                features: FeatureSet { raw, weighted },
            };
        }

        let mut raw = BTreeMap::new();
        raw.insert(
            "jaro_winkler".to_string(),
            strsim::jaro_winkler(&norm_a, &norm_b),
        );
        raw.insert("token_jaccard".to_string(), token_jaccard(&norm_a, &norm_b));
        raw.insert(
            "suffix_prefix_hint".to_string(),
            suffix_prefix_hint(&norm_a, &norm_b),
        );

        let weights = BTreeMap::from([
            ("jaro_winkler".to_string(), self.policy.jaro_winkler_weight),
            ("token_jaccard".to_string(), self.policy.token_jaccard_weight),
            (
                "suffix_prefix_hint".to_string(),
                self.policy.suffix_prefix_weight,
            ),
        ]);

        let mut weighted = BTreeMap::new();
        let mut score = 0.0;
        for (name, value) in &raw {
            let contribution = weights.get(name).copied().unwrap_or(0.0) * value;
            weighted.insert(name.clone(), contribution);
            score += contribution;
        }
        let score = score.min(1.0);

        let driver = weighted
            .iter()
            .max_by(|(_, x), (_, y)| x.partial_cmp(y).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(name, _)| name.clone())
            .unwrap_or_default();

        PairDecision {
            score,
            passed: score >= threshold,
            driver,
            features: FeatureSet { raw, weighted },
        }
    }
}

fn token_jaccard(a: &str, b: &str) -> f64 {
    let tokens_a: BTreeSet<&str> = a.split_whitespace().collect();
    let tokens_b: BTreeSet<&str> = b.split_whitespace().collect();
    if tokens_a.is_empty() && tokens_b.is_empty() {
        return 1.0;
    }
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }
    let intersection = tokens_a.intersection(&tokens_b).count() as f64;
    let union = tokens_a.union(&tokens_b).count() as f64;
    intersection / union
}

fn suffix_prefix_hint(a: &str, b: &str) -> f64 {
    if a == b || a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a.starts_with(b) || b.starts_with(a) || a.ends_with(b) || b.ends_with(a) {
        0.9
    } else {
        0.0
    }
}

/// One label is a known abbreviation of the other: via alias-vs-initials or
/// per-token prefix truncation ("Comp Sci" / "Computer Science").
fn is_abbreviation_pair(a: &Concept, b: &Concept) -> bool {
    initials_match(a, b) || initials_match(b, a) || prefix_truncation(a, b)
}

fn initials_match(short: &Concept, long: &Concept) -> bool {
    let initials: String = preprocess_for_similarity(&long.canonical_label)
        .split_whitespace()
        .filter_map(|token| token.chars().next())
        .collect();
    if initials.chars().count() < 2 {
        return false;
    }
    surface_forms(short).any(|form| form == initials)
}

fn prefix_truncation(a: &Concept, b: &Concept) -> bool {
    let tokens_a: Vec<String> = preprocess_for_similarity(&a.canonical_label)
        .split_whitespace()
        .map(str::to_string)
        .collect();
    let tokens_b: Vec<String> = preprocess_for_similarity(&b.canonical_label)
        .split_whitespace()
        .map(str::to_string)
        .collect();
    if tokens_a.len() != tokens_b.len() || tokens_a.is_empty() || tokens_a == tokens_b {
        return false;
    }
    tokens_a.iter().zip(tokens_b.iter()).all(|(x, y)| {
        let (short, long) = if x.len() <= y.len() { (x, y) } else { (y, x) };
        short.chars().count() >= 2 && long.starts_with(short.as_str())
    })
}

fn surface_forms(concept: &Concept) -> impl Iterator<Item = String> + '_ {
    std::iter::once(&concept.canonical_label)
        .chain(concept.aliases.iter())
        .map(|form| preprocess_for_similarity(form).replace(' ', ""))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeduplicationThresholds;
    use crate::types::SupportStats;

    fn policy() -> DeduplicationPolicy {
        DeduplicationPolicy {
            thresholds: DeduplicationThresholds {
                l0_l1: 0.8,
                l2_l3: 0.75,
            },
            ..DeduplicationPolicy::default()
        }
    }

    fn concept(id: &str, label: &str, parents: Vec<&str>, aliases: Vec<&str>) -> Concept {
        Concept::new(id, 1, label)
            .with_parents(parents.into_iter().map(String::from).collect())
            .with_aliases(aliases.into_iter().map(String::from).collect())
            .with_support(SupportStats::new(1, 2, 5))
    }

    #[test]
    fn parent_compatibility_requires_overlap() {
        let scorer = SimilarityScorer::new(policy());
        let a = concept("c1", "Computer Science", vec!["root"], vec![]);
        let b = concept("c2", "Comp Sci", vec!["root"], vec![]);
        assert!(scorer.parent_compatible(&a, &b));

        let c = concept("c3", "Computer Science", vec!["root-a"], vec![]);
        let d = concept("c4", "Computer Science", vec!["root-b"], vec![]);
        assert!(!scorer.parent_compatible(&c, &d));
    }

    #[test]
    fn truncated_prefix_pair_scores_as_abbreviation() {
        let scorer = SimilarityScorer::new(policy());
        let a = concept("c1", "Computer Science", vec!["root"], vec![]);
        let b = concept("c2", "Comp Sci", vec!["root"], vec![]);
        let decision = scorer.score_pair(&a, &b);
        assert!(decision.passed);
        assert_eq!(decision.score, 1.0);
        assert_eq!(decision.driver, "abbrev_score");
    }

    #[test]
    fn alias_initials_short_circuit() {
        let scorer = SimilarityScorer::new(policy());
        let a = concept("c5", "ML Research", vec!["root"], vec!["ML"]);
        let b = concept("c6", "Machine Learning", vec!["root"], vec![]);
        let decision = scorer.score_pair(&a, &b);

        assert_eq!(decision.features.raw["abbrev_score"], 1.0);
        assert!(!decision.features.raw.contains_key("jaro_winkler"));
        assert!(!decision.features.raw.contains_key("token_jaccard"));
        assert_eq!(decision.score, 1.0);
    }

    #[test]
    fn score_is_capped_and_driver_reported() {
        let mut capped = policy();
        capped.jaro_winkler_weight = 3.0;
        capped.suffix_prefix_weight = 5.0;
        let scorer = SimilarityScorer::new(capped);
        let a = concept("c7", "Control Systems", vec!["root"], vec![]);
        let b = concept("c8", "Control", vec!["root"], vec![]);

        let decision = scorer.score_pair(&a, &b);
        assert!(decision.score <= 1.0);
        assert_eq!(decision.driver, "suffix_prefix_hint");
        assert!(decision.features.weighted.contains_key("suffix_prefix_hint"));
    }

    #[test]
    fn unrelated_labels_score_low() {
        let scorer = SimilarityScorer::new(policy());
        let a = concept("c9", "Mechanical Engineering", vec!["root"], vec![]);
        let b = concept("c10", "Art History", vec!["root"], vec![]);
        let decision = scorer.score_pair(&a, &b);
        assert!(!decision.passed);
        assert!(decision.score < 0.5);
    }

    #[test]
    fn phonetic_probe_separates_distant_terms() {
        let scorer = SimilarityScorer::new(policy());
        let alpha = concept("c11", "Alpha", vec!["root"], vec![]);
        let omega = concept("c12", "Omega", vec!["root"], vec![]);
        let close_a = concept("c13", "Data Science", vec!["root"], vec![]);
        let close_b = concept("c14", "Deta Sciense", vec!["root"], vec![]);

        assert!(scorer.phonetic_probe(&alpha, &omega) < 0.95);
        assert!(scorer.phonetic_probe(&close_a, &close_b) > 0.9);
    }
}
