//! Disambiguation Processor
//!
//! Detect label collisions, consult the LLM on separability, and split
//! concepts whose senses are confidently separable. The colliding source
//! with the smallest id is replaced by the new sense concepts; other group
//! members remain untouched.

use std::collections::BTreeMap;

use serde_json::{Value, json};

use crate::config::DisambiguationPolicy;
use crate::types::{Concept, Result, SourceRecord, SplitOp};
use crate::utils::context_features::{ContextWindow, extract_context_windows};

use super::detector::AmbiguityDetector;
use super::llm::LlmDisambiguator;
use super::splitter::ConceptSplitter;

#[derive(Debug, Default)]
pub struct DisambiguationOutcome {
    pub concepts: Vec<Concept>,
    pub split_ops: Vec<SplitOp>,
    pub stats: BTreeMap<String, Value>,
}

pub struct DisambiguationProcessor {
    policy: DisambiguationPolicy,
    detector: AmbiguityDetector,
    splitter: ConceptSplitter,
    disambiguator: Option<LlmDisambiguator>,
}

impl DisambiguationProcessor {
    pub fn new(policy: DisambiguationPolicy, disambiguator: Option<LlmDisambiguator>) -> Self {
        Self {
            detector: AmbiguityDetector::new(policy.clone()),
            splitter: ConceptSplitter::new(policy.clone()),
            disambiguator,
            policy,
        }
    }

    pub async fn process(
        &self,
        concepts: Vec<Concept>,
        context_index: &BTreeMap<String, Vec<SourceRecord>>,
    ) -> Result<DisambiguationOutcome> {
        // Context windows per concept, from its supporting records.
        let mut contexts: BTreeMap<String, Vec<ContextWindow>> = BTreeMap::new();
        for concept in &concepts {
            if let Some(records) = context_index.get(&concept.id) {
                contexts.insert(
                    concept.id.clone(),
                    extract_context_windows(concept, records, self.policy.context_window_size),
                );
            }
        }

        let collisions = self.detector.detect_collisions(&concepts, &contexts);

        let mut by_id: BTreeMap<String, Concept> =
            concepts.into_iter().map(|c| (c.id.clone(), c)).collect();
        let mut split_ops = Vec::new();
        let mut llm_called = 0u64;
        let mut splits = 0u64;

        if let Some(disambiguator) = &self.disambiguator {
            for collision in &collisions {
                let group_contexts: BTreeMap<String, Vec<ContextWindow>> = collision
                    .concept_ids
                    .iter()
                    .filter_map(|id| contexts.get(id).map(|c| (id.clone(), c.clone())))
                    .collect();

                llm_called += 1;
                let verdict = disambiguator
                    .check_separability(&collision.label, collision.level, &group_contexts)
                    .await?;
                if !verdict.separable
                    || verdict.confidence < self.policy.min_split_confidence
                    || verdict.senses.len() < 2
                {
                    continue;
                }

                // Split the smallest-id member of the colliding group.
                let source_id = collision
                    .concept_ids
                    .iter()
                    .min()
                    .expect("collision has members")
                    .clone();
                let Some(source) = by_id.get(&source_id).cloned() else {
                    continue;
                };

                let parent_mapping: BTreeMap<String, Vec<String>> = verdict
                    .senses
                    .iter()
                    .map(|s| (s.label.clone(), s.parent_hints.clone()))
                    .collect();
                let evidence_mapping: BTreeMap<String, Vec<usize>> = verdict
                    .senses
                    .iter()
                    .map(|s| (s.label.clone(), s.evidence_indices.clone()))
                    .collect();

                let decision = self.splitter.split(
                    &source,
                    &verdict.senses,
                    &parent_mapping,
                    &evidence_mapping,
                    verdict.confidence,
                )?;

                by_id.remove(&source_id);
                for concept in decision.new_concepts {
                    by_id.insert(concept.id.clone(), concept);
                }
                split_ops.push(decision.split_op);
                splits += 1;
            }
        }

        let mut concepts: Vec<Concept> = by_id.into_values().collect();
        concepts.sort_by(|a, b| (a.level, &a.id).cmp(&(b.level, &b.id)));

        Ok(DisambiguationOutcome {
            concepts,
            split_ops,
            stats: BTreeMap::from([
                ("collisions_detected".to_string(), json!(collisions.len())),
                ("llm_called".to_string(), json!(llm_called)),
                ("splits".to_string(), json!(splits)),
            ]),
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmPolicy;
    use crate::llm::{CallbackProvider, LlmClient, PromptRegistry, ProviderResponse};
    use crate::types::{Provenance, SupportStats};
    use std::sync::Arc;

    fn concept(id: &str, parents: Vec<&str>) -> Concept {
        Concept::new(id, 1, "Machine Learning")
            .with_parents(parents.into_iter().map(String::from).collect())
            .with_support(SupportStats::new(6, 4, 20))
    }

    fn record(text: &str, institution: &str) -> SourceRecord {
        SourceRecord::new(text, Provenance::new(institution, "https://example.org"))
    }

    fn disambiguator(content: &'static str) -> LlmDisambiguator {
        let mut policy = LlmPolicy::default();
        policy.retry_attempts = 0;
        policy.retry_backoff_seconds = 0.0;
        let provider = Arc::new(CallbackProvider::new("mock", move |_, _| {
            Ok(ProviderResponse::from_content(content))
        }));
        LlmDisambiguator::new(
            Arc::new(LlmClient::new(
                policy,
                Arc::new(PromptRegistry::builtin()),
                provider,
            )),
            DisambiguationPolicy::default(),
        )
    }

    const SEPARABLE: &str = r#"{
        "separable": true,
        "confidence": 0.9,
        "senses": [
            {"label": "Research", "gloss": "Focus on research programs",
             "parent_hints": ["p1"], "evidence_indices": [0]},
            {"label": "Teaching", "gloss": "Focus on teaching curriculum",
             "parent_hints": ["p2"], "evidence_indices": [1]}
        ]
    }"#;

    #[tokio::test]
    async fn creates_split_ops_for_divergent_collisions() {
        let processor = DisambiguationProcessor::new(
            DisambiguationPolicy {
                min_context_overlap_threshold: 0.6,
                ..DisambiguationPolicy::default()
            },
            Some(disambiguator(SEPARABLE)),
        );

        let context_index = BTreeMap::from([
            (
                "a".to_string(),
                vec![record("Machine Learning research initiative", "inst1")],
            ),
            (
                "b".to_string(),
                vec![record("Machine Learning teaching center", "inst2")],
            ),
        ]);

        let outcome = processor
            .process(
                vec![concept("a", vec!["p1"]), concept("b", vec!["p2"])],
                &context_index,
            )
            .await
            .unwrap();

        assert!(!outcome.split_ops.is_empty());
        let split_op = &outcome.split_ops[0];
        assert_eq!(split_op.source_id, "a");
        assert_eq!(split_op.new_ids.len(), 2);

        let ids: Vec<&str> = outcome.concepts.iter().map(|c| c.id.as_str()).collect();
        for new_id in &split_op.new_ids {
            assert!(ids.contains(&new_id.as_str()));
        }
        for concept in outcome
            .concepts
            .iter()
            .filter(|c| split_op.new_ids.contains(&c.id))
        {
            assert!(concept.rationale.passed_gates["disambiguation"]);
        }
    }

    #[tokio::test]
    async fn inseparable_verdicts_leave_concepts_untouched() {
        let processor = DisambiguationProcessor::new(
            DisambiguationPolicy::default(),
            Some(disambiguator(r#"{"separable": false, "confidence": 0.2, "senses": []}"#)),
        );

        let context_index = BTreeMap::from([
            ("a".to_string(), vec![record("robotics research lab", "inst1")]),
            ("b".to_string(), vec![record("finance teaching track", "inst2")]),
        ]);
        let outcome = processor
            .process(
                vec![concept("a", vec!["p1"]), concept("b", vec!["p2"])],
                &context_index,
            )
            .await
            .unwrap();

        assert!(outcome.split_ops.is_empty());
        assert_eq!(outcome.concepts.len(), 2);
    }
}
