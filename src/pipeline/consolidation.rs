//! Consolidation
//!
//! Converts accepted cross-level candidates into seed `Concept`s: stable
//! derived ids (`concept:<level>:<slug>`), support and aliases carried
//! forward, and parent anchors (`L{k}:{normalized}`) translated into parent
//! concept ids by lookup. Anchors that resolve to no accepted concept are
//! dropped and counted; the hierarchy phase decides what happens to the
//! resulting orphans.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{Concept, Result};

use super::s3_verification::TokenVerificationDecision;

/// URL-safe slug of a normalized label.
pub fn slugify(normalized: &str) -> String {
    let mut slug = String::with_capacity(normalized.len());
    let mut last_hyphen = true;
    for c in normalized.chars() {
        if c.is_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_hyphen = false;
        } else if !last_hyphen {
            slug.push('-');
            last_hyphen = true;
        }
    }
    slug.trim_end_matches('-').to_string()
}

/// Stable concept id for a level and normalized label.
pub fn concept_id(level: u8, normalized: &str) -> String {
    format!("concept:{level}:{}", slugify(normalized))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsolidationStats {
    pub candidates_in: u64,
    pub concepts_out: u64,
    pub parents_resolved: u64,
    pub parents_unresolved: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ConsolidationOutcome {
    pub concepts: Vec<Concept>,
    pub stats: ConsolidationStats,
}

pub struct Consolidator;

impl Consolidator {
    /// Build the concept graph seed from verified candidates of all levels.
    pub fn consolidate(decisions: &[TokenVerificationDecision]) -> Result<ConsolidationOutcome> {
        let mut stats = ConsolidationStats {
            candidates_in: decisions.len() as u64,
            ..ConsolidationStats::default()
        };

        // First pass: assign ids so parent anchors can be translated
        // regardless of input order.
        let mut ids: BTreeMap<(u8, String), String> = BTreeMap::new();
        for decision in decisions {
            let candidate = &decision.candidate;
            ids.entry((candidate.level, candidate.normalized.clone()))
                .or_insert_with(|| concept_id(candidate.level, &candidate.normalized));
        }

        let mut concepts: BTreeMap<String, Concept> = BTreeMap::new();
        for decision in decisions {
            let candidate = &decision.candidate;
            let id = ids[&(candidate.level, candidate.normalized.clone())].clone();
            if concepts.contains_key(&id) {
                continue;
            }

            let mut parents = Vec::new();
            for anchor in &candidate.parents {
                match parse_anchor(anchor).and_then(|(level, normalized)| {
                    ids.get(&(level, normalized)).cloned()
                }) {
                    Some(parent_id) => {
                        stats.parents_resolved += 1;
                        if !parents.contains(&parent_id) {
                            parents.push(parent_id);
                        }
                    }
                    None => stats.parents_unresolved += 1,
                }
            }

            let mut concept = Concept::new(id.clone(), candidate.level, candidate.label.clone())
                .with_parents(parents)
                .with_support(candidate.support);
            for alias in &candidate.aliases {
                concept.push_alias(alias.clone());
            }
            concept.rationale = decision.rationale.clone();
            concept.rationale.gate("consolidation", true);
            concept.validate()?;
            concepts.insert(id, concept);
        }

        let mut ordered: Vec<Concept> = concepts.into_values().collect();
        ordered.sort_by(|a, b| (a.level, &a.id).cmp(&(b.level, &b.id)));
        stats.concepts_out = ordered.len() as u64;

        Ok(ConsolidationOutcome {
            concepts: ordered,
            stats,
        })
    }
}

/// Split an `L{level}:{normalized}` anchor into its parts.
fn parse_anchor(anchor: &str) -> Option<(u8, String)> {
    let rest = anchor.strip_prefix('L')?;
    let (level, normalized) = rest.split_once(':')?;
    let level = level.parse::<u8>().ok()?;
    Some((level, normalized.to_string()))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::s3_verification::RuleEvaluation;
    use crate::types::{Candidate, Rationale, SupportStats};

    fn decision(level: u8, label: &str, normalized: &str, parents: &[&str]) -> TokenVerificationDecision {
        TokenVerificationDecision {
            candidate: Candidate {
                level,
                label: label.into(),
                normalized: normalized.into(),
                parents: parents.iter().map(|p| p.to_string()).collect(),
                aliases: vec![format!("{label} Dept")],
                support: SupportStats::new(3, 2, 5),
            },
            passed: true,
            rule_evaluation: RuleEvaluation::default(),
            llm_result: None,
            rationale: Rationale::default(),
        }
    }

    #[test]
    fn assigns_stable_ids_and_translates_anchors() {
        let decisions = vec![
            decision(0, "Engineering", "engineering", &[]),
            decision(1, "Computer Science", "computer science", &["L0:engineering"]),
        ];
        let outcome = Consolidator::consolidate(&decisions).unwrap();

        assert_eq!(outcome.concepts.len(), 2);
        let child = outcome
            .concepts
            .iter()
            .find(|c| c.level == 1)
            .unwrap();
        assert_eq!(child.id, "concept:1:computer-science");
        assert_eq!(child.parents, vec!["concept:0:engineering".to_string()]);
        assert_eq!(child.support, SupportStats::new(3, 2, 5));
        assert_eq!(child.rationale.passed_gates["consolidation"], true);
        assert_eq!(outcome.stats.parents_resolved, 1);
    }

    #[test]
    fn unresolved_anchors_are_dropped_and_counted() {
        let decisions = vec![decision(
            2,
            "Quantum Vision",
            "quantum vision",
            &["L1:nonexistent parent"],
        )];
        let outcome = Consolidator::consolidate(&decisions).unwrap();

        assert_eq!(outcome.concepts.len(), 1);
        assert!(outcome.concepts[0].parents.is_empty());
        assert_eq!(outcome.stats.parents_unresolved, 1);
    }

    #[test]
    fn slugs_are_url_safe() {
        assert_eq!(slugify("natural language processing"), "natural-language-processing");
        assert_eq!(slugify("c++ & systems"), "c-systems");
        assert_eq!(concept_id(2, "computer vision"), "concept:2:computer-vision");
    }

    #[test]
    fn output_is_ordered_by_level_then_id() {
        let decisions = vec![
            decision(1, "Zoology", "zoology", &[]),
            decision(0, "Science", "science", &[]),
            decision(1, "Anatomy", "anatomy", &[]),
        ];
        let outcome = Consolidator::consolidate(&decisions).unwrap();
        let ids: Vec<&str> = outcome.concepts.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["concept:0:science", "concept:1:anatomy", "concept:1:zoology"]
        );
    }
}
