//! Deduplication Processor
//!
//! Per level-band (0–1 and 2–3): block, probe, score, union, merge. Within
//! each connected component the winner is chosen deterministically (highest
//! institution support, then highest record support, then lexicographically
//! smallest id); losers fold their aliases and support into the winner and
//! leave one `MergeOp` each, rule `"duplicate"`, with the weighted feature
//! evidence of their scoring pair.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Value, json};

use crate::config::DeduplicationPolicy;
use crate::observability::ObservabilityContext;
use crate::types::{Concept, MergeOp, Result};

use super::blocking::CompositeBlocker;
use super::graph::MergeGraph;
use super::similarity::{PairDecision, SimilarityScorer};

const MAX_MERGE_SAMPLES: usize = 20;

#[derive(Debug, Default)]
pub struct DedupResult {
    pub concepts: Vec<Concept>,
    pub merge_ops: Vec<MergeOp>,
    pub stats: BTreeMap<String, Value>,
    pub samples: Vec<Value>,
}

pub struct DeduplicationProcessor {
    policy: DeduplicationPolicy,
    scorer: SimilarityScorer,
    blocker: CompositeBlocker,
    pub graph: MergeGraph,
    pair_evidence: BTreeMap<(String, String), PairDecision>,
    observability: Option<Arc<ObservabilityContext>>,
}

impl DeduplicationProcessor {
    pub fn new(policy: DeduplicationPolicy) -> Self {
        Self {
            scorer: SimilarityScorer::new(policy.clone()),
            blocker: CompositeBlocker::standard(&policy),
            graph: MergeGraph::new(),
            pair_evidence: BTreeMap::new(),
            observability: None,
            policy,
        }
    }

    pub fn with_observability(mut self, observability: Arc<ObservabilityContext>) -> Self {
        self.observability = Some(observability);
        self
    }

    pub fn process(&mut self, concepts: Vec<Concept>) -> Result<DedupResult> {
        let mut stats: BTreeMap<String, u64> = BTreeMap::new();
        for concept in &concepts {
            self.graph.add_node(&concept.id);
        }

        // Compare within level bands only.
        for band in [0u8, 2u8] {
            let members: Vec<&Concept> = concepts
                .iter()
                .filter(|c| if band == 0 { c.level <= 1 } else { c.level >= 2 })
                .collect();
            let owned: Vec<Concept> = members.into_iter().cloned().collect();
            let blocks = self.blocker.build_blocks(&owned);
            for indices in blocks.blocks.values() {
                if indices.len() < 2 {
                    continue;
                }
                let block_members: Vec<Concept> =
                    indices.iter().map(|&i| owned[i].clone()).collect();
                self.compare_block(&block_members, &mut stats);
            }
        }

        // Resolve components into merges.
        let mut by_id: BTreeMap<String, Concept> =
            concepts.into_iter().map(|c| (c.id.clone(), c)).collect();
        let mut merge_ops = Vec::new();
        let mut samples = Vec::new();

        for component in self.graph.components() {
            if component.len() < 2 {
                continue;
            }
            let winner_id = component
                .iter()
                .max_by(|a, b| {
                    let ca = &by_id[*a];
                    let cb = &by_id[*b];
                    ca.support
                        .institutions
                        .cmp(&cb.support.institutions)
                        .then(ca.support.records.cmp(&cb.support.records))
                        .then(cb.id.cmp(&ca.id)) // smaller id wins ties
                })
                .cloned()
                .expect("non-empty component");

            for loser_id in component.iter().filter(|id| **id != winner_id) {
                let loser = by_id.remove(loser_id).expect("loser exists");
                let winner = by_id.get_mut(&winner_id).expect("winner exists");
                winner.push_alias(loser.canonical_label.clone());
                for alias in &loser.aliases {
                    winner.push_alias(alias.clone());
                }
                winner.support.absorb(&loser.support);
                winner.rationale.gate("deduplication", true);

                let evidence = self.pair_evidence(&winner_id, loser_id);
                let op = MergeOp::new(
                    vec![winner_id.clone()],
                    vec![loser_id.clone()],
                    "duplicate",
                    evidence.clone(),
                )?;
                if samples.len() < MAX_MERGE_SAMPLES {
                    samples.push(json!({
                        "winner": winner_id,
                        "loser": loser_id,
                        "evidence": evidence,
                    }));
                }
                if let Some(obs) = &self.observability {
                    obs.evidence(
                        "merge",
                        "merged",
                        json!({"winner": winner_id, "loser": loser_id}),
                    );
                }
                merge_ops.push(op);
            }
        }

        let mut concepts: Vec<Concept> = by_id.into_values().collect();
        concepts.sort_by(|a, b| (a.level, &a.id).cmp(&(b.level, &b.id)));

        let mut result_stats: BTreeMap<String, Value> = stats
            .iter()
            .map(|(k, v)| (k.clone(), json!(v)))
            .collect();
        result_stats.insert("merged".into(), json!(merge_ops.len()));
        result_stats.insert(
            "graph".into(),
            json!({
                "nodes": self.graph.node_count(),
                "edges": self.graph.edge_count(),
            }),
        );
        if let Some(obs) = &self.observability {
            obs.increment("merged", merge_ops.len() as i64);
        }

        Ok(DedupResult {
            concepts,
            merge_ops,
            stats: result_stats,
            samples,
        })
    }

    /// Score every pair in one block, unioning accepted pairs. Exposed for
    /// targeted testing of probe behaviour.
    pub fn compare_block(&mut self, members: &[Concept], stats: &mut BTreeMap<String, u64>) {
        for i in 0..members.len() {
            for j in (i + 1)..members.len() {
                let a = &members[i];
                let b = &members[j];
                if !self.scorer.parent_compatible(a, b) {
                    *stats.entry("parent_incompatible".into()).or_insert(0) += 1;
                    continue;
                }
                if self.scorer.phonetic_probe(a, b) < self.policy.phonetic_probe_threshold {
                    *stats.entry("phonetic_probe_filtered".into()).or_insert(0) += 1;
                    continue;
                }
                *stats.entry("pairs_compared".into()).or_insert(0) += 1;
                let decision = self.scorer.score_pair(a, b);
                if decision.passed {
                    self.graph.union(&a.id, &b.id);
                    self.pair_evidence
                        .entry(pair_key(&a.id, &b.id))
                        .or_insert(decision);
                }
            }
        }
    }

    fn pair_evidence(&self, a: &str, b: &str) -> BTreeMap<String, String> {
        let mut evidence = BTreeMap::new();
        if let Some(decision) = self.pair_evidence.get(&pair_key(a, b)) {
            evidence.insert("score".into(), format!("{:.4}", decision.score));
            evidence.insert("driver".into(), decision.driver.clone());
            for (feature, value) in &decision.features.weighted {
                evidence.insert(format!("feature:{feature}"), format!("{value:.4}"));
            }
        } else {
            // Transitive merges inside a component have no direct pair score.
            evidence.insert("score".into(), "transitive".into());
        }
        evidence
    }
}

fn pair_key(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
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

    fn concept(
        id: &str,
        label: &str,
        institutions: u64,
        parents: Vec<&str>,
        aliases: Vec<&str>,
    ) -> Concept {
        Concept::new(id, 1, label)
            .with_parents(parents.into_iter().map(String::from).collect())
            .with_aliases(aliases.into_iter().map(String::from).collect())
            .with_support(SupportStats::new(1, institutions, 5))
    }

    #[test]
    fn merges_similar_concepts_deterministically() {
        let mut processor = DeduplicationProcessor::new(policy());
        let winner = concept("c1", "Computer Science", 5, vec!["root"], vec!["CS"]);
        let loser = concept("c2", "Comp Sci", 2, vec!["root"], vec!["CompSci"]);
        let distinct = concept("c3", "Mechanical Engineering", 2, vec!["engineering"], vec![]);

        let result = processor.process(vec![winner, loser, distinct]).unwrap();

        assert_eq!(result.concepts.len(), 2);
        assert_eq!(result.merge_ops.len(), 1);

        let merged = result.concepts.iter().find(|c| c.id == "c1").unwrap();
        assert!(merged.aliases.iter().any(|a| a == "Comp Sci"));
        assert!(merged.aliases.iter().any(|a| a == "CompSci"));
        assert_eq!(merged.support.institutions, 7);
        assert_eq!(result.stats["graph"]["edges"], serde_json::json!(1));
        assert!(!result.samples.is_empty());

        let op = &result.merge_ops[0];
        assert_eq!(op.winners, vec!["c1".to_string()]);
        assert_eq!(op.losers, vec!["c2".to_string()]);
        assert_eq!(op.rule, "duplicate");
    }

    #[test]
    fn abbreviation_pair_merges_at_band_threshold() {
        let mut processor = DeduplicationProcessor::new(DeduplicationPolicy {
            thresholds: DeduplicationThresholds {
                l0_l1: 0.93,
                l2_l3: 0.75,
            },
            ..DeduplicationPolicy::default()
        });
        let mut a = concept("a", "ML Research", 3, vec!["root"], vec!["ML"]);
        a.level = 2;
        let mut b = concept("b", "Machine Learning", 2, vec!["root"], vec![]);
        b.level = 2;

        let result = processor.process(vec![a, b]).unwrap();

        assert_eq!(result.merge_ops.len(), 1);
        let op = &result.merge_ops[0];
        // Winner is deterministic: higher institution support wins.
        assert_eq!(op.winners, vec!["a".to_string()]);
        assert_eq!(op.losers, vec!["b".to_string()]);
    }

    #[test]
    fn winner_tie_breaks_on_smaller_id() {
        let mut processor = DeduplicationProcessor::new(policy());
        let a = concept("c-b", "Computer Science", 2, vec!["root"], vec![]);
        let b = concept("c-a", "Computer Science", 2, vec!["root"], vec![]);

        let result = processor.process(vec![a, b]).unwrap();
        assert_eq!(result.merge_ops.len(), 1);
        assert_eq!(result.merge_ops[0].winners, vec!["c-a".to_string()]);
    }

    #[test]
    fn phonetic_probe_filters_pairs() {
        let mut processor = DeduplicationProcessor::new(DeduplicationPolicy {
            phonetic_probe_threshold: 0.95,
            ..policy()
        });
        let a = concept("c9", "Alpha", 2, vec!["root"], vec![]);
        let b = concept("c10", "Omega", 2, vec!["root"], vec![]);
        processor.graph.add_node(&a.id);
        processor.graph.add_node(&b.id);
        let mut stats = BTreeMap::new();

        processor.compare_block(&[a, b], &mut stats);

        assert_eq!(stats.get("phonetic_probe_filtered"), Some(&1));
        assert_eq!(stats.get("pairs_compared"), None);
    }

    #[test]
    fn disjoint_parent_sets_never_merge() {
        let mut processor = DeduplicationProcessor::new(policy());
        let a = concept("c1", "Computer Science", 2, vec!["root-a"], vec![]);
        let b = concept("c2", "Computer Science", 2, vec!["root-b"], vec![]);

        let result = processor.process(vec![a, b]).unwrap();
        assert!(result.merge_ops.is_empty());
        assert_eq!(result.concepts.len(), 2);
    }
}
