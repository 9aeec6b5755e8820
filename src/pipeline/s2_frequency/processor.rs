//! S2 Processor
//!
//! Wraps the aggregator with an observability scope: counters for every
//! decision, sampled evidence per outcome, and per-phase performance
//! metrics. Works identically without an observability context, minus the
//! recorded events.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::{Value, json};

use crate::observability::ObservabilityContext;

use super::aggregator::{AggregationResult, CandidateAggregator};
use crate::pipeline::s1_extraction::CandidateEnvelope;

pub struct S2Outcome {
    pub result: AggregationResult,
    pub stats: BTreeMap<String, Value>,
}

pub struct S2Processor {
    aggregator: CandidateAggregator,
    observability: Option<Arc<ObservabilityContext>>,
}

impl S2Processor {
    pub fn new(aggregator: CandidateAggregator) -> Self {
        Self {
            aggregator,
            observability: None,
        }
    }

    pub fn with_observability(mut self, observability: Arc<ObservabilityContext>) -> Self {
        self.observability = Some(observability);
        self
    }

    pub fn process(&self, evidence: &[CandidateEnvelope]) -> S2Outcome {
        let started = Instant::now();
        let result = self.aggregator.aggregate(evidence);

        let mut stats: BTreeMap<String, Value> = BTreeMap::new();
        stats.insert("candidates_in".into(), json!(evidence.len()));
        stats.insert("kept".into(), json!(result.kept.len()));
        stats.insert("dropped".into(), json!(result.dropped.len()));
        stats.insert(
            "aggregated_groups".into(),
            json!(result.stats.get("aggregated_groups").copied().unwrap_or(0)),
        );

        if let Some(obs) = &self.observability {
            let scope = obs.phase("S2");
            scope.increment("candidates_in", evidence.len() as i64);
            scope.increment("kept", result.kept.len() as i64);
            scope.increment(
                "dropped_insufficient_support",
                result.dropped.len() as i64,
            );
            for decision in &result.kept {
                scope.evidence(
                    "frequency",
                    "kept",
                    json!({
                        "normalized": decision.candidate.normalized,
                        "institutions": decision.candidate.support.institutions,
                        "records": decision.candidate.support.records,
                    }),
                );
            }
            for decision in &result.dropped {
                scope.evidence(
                    "frequency",
                    "dropped_insufficient_support",
                    json!({
                        "normalized": decision.candidate.normalized,
                        "reasons": decision.rationale.reasons,
                    }),
                );
            }
            scope.performance(BTreeMap::from([
                ("candidates_processed".to_string(), evidence.len() as f64),
                (
                    "elapsed_seconds".to_string(),
                    started.elapsed().as_secs_f64(),
                ),
            ]));
            drop(scope);
            stats.insert(
                "observability_checksum".into(),
                json!(obs.snapshot().checksum),
            );
        }

        S2Outcome { result, stats }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        FrequencyFilteringPolicy, InstitutionPolicy, LevelThreshold, LevelThresholds,
        ObservabilityPolicy,
    };
    use crate::pipeline::s2_frequency::institution_resolver::InstitutionResolver;
    use crate::types::{Candidate, SupportStats};

    fn sample_evidence() -> Vec<CandidateEnvelope> {
        let make = |label: &str, normalized: &str, parents: Vec<&str>, count: u64| Candidate {
            level: 2,
            label: label.into(),
            normalized: normalized.into(),
            parents: parents.into_iter().map(String::from).collect(),
            aliases: vec![label.to_string()],
            support: SupportStats::new(count, 1, count),
        };
        vec![
            CandidateEnvelope {
                candidate: make("Computer Vision", "computer vision", vec!["ai"], 2),
                institutions: vec!["MIT".into()],
                record_fingerprints: vec!["rec-1".into()],
            },
            CandidateEnvelope {
                candidate: make("Computer Vision", "computer vision", vec!["ai"], 1),
                institutions: vec!["Stanford".into()],
                record_fingerprints: vec!["rec-2".into()],
            },
            CandidateEnvelope {
                candidate: make("Quantum Vision", "quantum vision", vec!["ai"], 1),
                institutions: vec!["OnlyOne".into()],
                record_fingerprints: vec!["rec-3".into()],
            },
        ]
    }

    fn processor(observability: Option<Arc<ObservabilityContext>>) -> S2Processor {
        let thresholds = LevelThresholds {
            level_0: LevelThreshold::new(1, 1),
            level_1: LevelThreshold::new(1, 1),
            level_2: LevelThreshold::new(2, 1),
            level_3: LevelThreshold::new(2, 3),
        };
        let aggregator = CandidateAggregator::new(
            thresholds,
            InstitutionResolver::new(InstitutionPolicy::default()),
            FrequencyFilteringPolicy::default(),
        );
        let processor = S2Processor::new(aggregator);
        match observability {
            Some(obs) => processor.with_observability(obs),
            None => processor,
        }
    }

    #[test]
    fn updates_observability_counters_and_restores_phase() {
        let obs = Arc::new(ObservabilityContext::new(
            "s2-test",
            ObservabilityPolicy::default(),
        ));
        let outcome = processor(Some(Arc::clone(&obs))).process(&sample_evidence());

        let snapshot = obs.snapshot();
        let counters = &snapshot.counters["S2"];
        assert_eq!(counters["candidates_in"], json!(3));
        assert_eq!(counters["kept"], json!(1));
        assert_eq!(counters["dropped_insufficient_support"], json!(1));
        assert_eq!(outcome.stats["kept"], json!(1));
        assert_eq!(outcome.stats["dropped"], json!(1));
        assert_eq!(
            outcome.stats["observability_checksum"],
            json!(snapshot.checksum)
        );
        assert_eq!(obs.current_phase(), None);
    }

    #[test]
    fn records_evidence_and_performance() {
        let obs = Arc::new(ObservabilityContext::new(
            "s2-test",
            ObservabilityPolicy::default(),
        ));
        processor(Some(Arc::clone(&obs))).process(&sample_evidence());

        let snapshot = obs.snapshot();
        let samples = &snapshot.evidence.samples["S2"];
        let outcomes: std::collections::BTreeSet<&str> =
            samples.iter().map(|s| s.outcome.as_str()).collect();
        assert!(outcomes.contains("kept"));
        assert!(outcomes.contains("dropped_insufficient_support"));

        let performance = &snapshot.performance["S2"];
        assert_eq!(performance["candidates_processed"], 3.0);
        assert!(performance.contains_key("elapsed_seconds"));
    }

    #[test]
    fn works_without_observability() {
        let outcome = processor(None).process(&sample_evidence());
        assert_eq!(outcome.stats["kept"], json!(1));
        assert_eq!(outcome.stats["dropped"], json!(1));
        assert!(!outcome.stats.contains_key("observability_checksum"));
    }
}
