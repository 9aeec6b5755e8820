//! Concept Splitting
//!
//! Materializes an accepted separability verdict: new concept ids
//! `<source>::split::<slug>`, each inheriting a subset of parents and
//! evidence indices, with the disambiguation gate set on their rationale.

use std::collections::BTreeMap;

use serde_json::json;

use crate::config::DisambiguationPolicy;
use crate::pipeline::consolidation::slugify;
use crate::types::{Concept, Result, SplitOp, TaxonomyError};

use super::llm::LlmSenseDefinition;

#[derive(Debug, Clone)]
pub struct SplitDecision {
    pub new_concepts: Vec<Concept>,
    pub split_op: SplitOp,
}

pub struct ConceptSplitter {
    policy: DisambiguationPolicy,
}

impl ConceptSplitter {
    pub fn new(policy: DisambiguationPolicy) -> Self {
        Self { policy }
    }

    pub fn split(
        &self,
        source: &Concept,
        senses: &[LlmSenseDefinition],
        parent_mapping: &BTreeMap<String, Vec<String>>,
        evidence_mapping: &BTreeMap<String, Vec<usize>>,
        confidence: f64,
    ) -> Result<SplitDecision> {
        if senses.len() < 2 {
            return Err(TaxonomyError::PolicyViolation(
                "disambiguation requires at least two senses".into(),
            ));
        }
        if confidence < self.policy.min_split_confidence {
            return Err(TaxonomyError::PolicyViolation(format!(
                "split confidence {confidence:.2} below threshold {:.2}",
                self.policy.min_split_confidence
            )));
        }

        let mut new_concepts = Vec::with_capacity(senses.len());
        let mut new_ids = Vec::with_capacity(senses.len());
        for sense in senses {
            let id = format!("{}::split::{}", source.id, slugify(&sense.label));
            let parents = parent_mapping
                .get(&sense.label)
                .cloned()
                .unwrap_or_else(|| sense.parent_hints.clone());
            let evidence_indices = evidence_mapping
                .get(&sense.label)
                .cloned()
                .unwrap_or_else(|| sense.evidence_indices.clone());

            let mut concept = Concept::new(id.clone(), source.level, source.canonical_label.clone())
                .with_parents(parents)
                .with_support(source.support);
            concept.push_alias(sense.label.clone());
            for alias in &source.aliases {
                concept.push_alias(alias.clone());
            }
            concept.rationale = source.rationale.clone();
            concept.rationale.gate("disambiguation", true);
            concept
                .validation_metadata
                .insert("sense".into(), json!(sense.label));
            concept
                .validation_metadata
                .insert("sense_gloss".into(), json!(sense.gloss));
            concept
                .validation_metadata
                .insert("evidence_indices".into(), json!(evidence_indices));

            new_ids.push(id);
            new_concepts.push(concept);
        }

        let split_op = SplitOp::new(source.id.clone(), new_ids, "disambiguation")?;
        Ok(SplitDecision {
            new_concepts,
            split_op,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
