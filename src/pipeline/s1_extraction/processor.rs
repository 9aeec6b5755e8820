//! S1 Processor
//!
//! Extraction → normalization → parent resolution → aggregation. Identical
//! `(level, normalized, parent set)` candidates from different records merge
//! into one envelope carrying the distinct institutions and record
//! fingerprints that support them. Output order is `(normalized, parents)`
//! for deterministic artifacts.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::observability::ObservabilityContext;
use crate::types::{Candidate, Result, SourceRecord, SupportStats};

use super::extractor::ExtractionProcessor;
use super::normalizer::CandidateNormalizer;
use super::parent_index::ParentIndex;

// =============================================================================
// Envelope
// =============================================================================

/// The S1→S2 wire shape: a candidate plus its supporting evidence sets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateEnvelope {
    pub candidate: Candidate,
    pub institutions: Vec<String>,
    pub record_fingerprints: Vec<String>,
}

// =============================================================================
// Processor
// =============================================================================

pub struct S1Processor {
    pub extractor: ExtractionProcessor,
    pub normalizer: CandidateNormalizer,
    pub parent_index: ParentIndex,
}

struct Aggregate {
    label: String,
    aliases: Vec<String>,
    parents: Vec<String>,
    institutions: BTreeMap<String, ()>,
    fingerprints: BTreeMap<String, ()>,
    count: u64,
}

impl S1Processor {
    pub fn new(
        extractor: ExtractionProcessor,
        normalizer: CandidateNormalizer,
        parent_index: ParentIndex,
    ) -> Self {
        Self {
            extractor,
            normalizer,
            parent_index,
        }
    }

    /// Run the S1 sub-pipeline for one level.
    pub async fn process_level(
        &mut self,
        records: &[SourceRecord],
        level: u8,
        previous: &[Candidate],
        observability: Option<&ObservabilityContext>,
    ) -> Result<Vec<CandidateEnvelope>> {
        self.parent_index.build_index(previous);

        let extracted = self.extractor.extract_candidates(records, level).await?;

        if let Some(obs) = observability {
            obs.increment("records_in", records.len() as i64);
            for (index, reason, detail) in &self.extractor.quarantined {
                let item_id = records
                    .get(*index)
                    .map(|r| r.fingerprint())
                    .unwrap_or_else(|| index.to_string());
                obs.quarantine(reason, &item_id, json!({"detail": detail}));
            }
        }

        let mut unknown_parents = 0u64;
        let mut groups: BTreeMap<(String, String), Aggregate> = BTreeMap::new();

        for item in extracted {
            let record = &records[item.record_index];
            let Some(normalized) = self.normalizer.normalize(&item.raw, record, level) else {
                continue;
            };

            let mut parents: Vec<String> = Vec::new();
            if level > 0 {
                for mention in &normalized.parents {
                    let anchors = self.parent_index.resolve_anchor(mention, level);
                    if anchors.is_empty() {
                        unknown_parents += 1;
                        parents.push(mention.clone());
                    } else {
                        parents.extend(anchors);
                    }
                }
                parents.sort();
                parents.dedup();
            }

            let key = (normalized.normalized.clone(), parents.join("\u{1f}"));
            let entry = groups.entry(key).or_insert_with(|| Aggregate {
                label: normalized.label.clone(),
                aliases: Vec::new(),
                parents: parents.clone(),
                institutions: BTreeMap::new(),
                fingerprints: BTreeMap::new(),
                count: 0,
            });
            for alias in &normalized.aliases {
                if !entry.aliases.iter().any(|a| a.eq_ignore_ascii_case(alias)) {
                    entry.aliases.push(alias.clone());
                }
            }
            let institution = record.provenance.institution.trim();
            if !institution.is_empty() {
                entry.institutions.insert(institution.to_string(), ());
            }
            entry.fingerprints.insert(record.fingerprint(), ());
            entry.count += 1;
        }

        let mut envelopes = Vec::new();
        for ((normalized, _), aggregate) in groups {
            let candidate = Candidate {
                level,
                label: aggregate.label,
                normalized,
                parents: aggregate.parents,
                aliases: aggregate.aliases,
                support: SupportStats::new(
                    aggregate.fingerprints.len() as u64,
                    aggregate.institutions.len() as u64,
                    aggregate.count,
                ),
            };
            candidate.validate()?;
            envelopes.push(CandidateEnvelope {
                candidate,
                institutions: aggregate.institutions.into_keys().collect(),
                record_fingerprints: aggregate.fingerprints.into_keys().collect(),
            });
        }

        if let Some(obs) = observability {
            obs.increment("candidates_out", envelopes.len() as i64);
            obs.increment("invalid_json", self.extractor.metrics.invalid_json as i64);
            obs.increment(
                "provider_errors",
                self.extractor.metrics.provider_errors as i64,
            );
            obs.increment("quarantined", self.extractor.metrics.quarantined as i64);
            obs.increment("unknown_parents", unknown_parents as i64);
        }

        Ok(envelopes)
    }
}

// =============================================================================
// Tests
// =============================================================================
