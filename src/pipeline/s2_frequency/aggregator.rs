//! S2 Frequency Aggregation
//!
//! Groups S1 envelopes by `(level, normalized, canonical parent set)`,
//! recomputes support from distinct collapsed fingerprints and distinct
//! canonical institutions, and gates each group against the level's
//! thresholds. Support only grows under this aggregation.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::config::{FrequencyFilteringPolicy, LevelThresholds, NearDuplicatePolicy};
use crate::pipeline::s1_extraction::CandidateEnvelope;
use crate::types::{Candidate, Rationale, SupportStats};

use super::institution_resolver::InstitutionResolver;

// =============================================================================
// Decisions
// =============================================================================

/// The S2→S3 wire shape: a gated candidate with its evidence and rationale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateDecision {
    pub candidate: Candidate,
    pub institutions: Vec<String>,
    pub record_fingerprints: Vec<String>,
    pub weight: f64,
    pub passed: bool,
    pub rationale: Rationale,
}

#[derive(Debug, Clone, Default)]
pub struct AggregationResult {
    pub kept: Vec<CandidateDecision>,
    pub dropped: Vec<CandidateDecision>,
    pub stats: BTreeMap<String, u64>,
}

// =============================================================================
// Fingerprint canonicalization
// =============================================================================

/// Collapse a record fingerprint to its dedup key: truncate at the first
/// configured delimiter (when the prefix is long enough), then strip
/// trailing numeric suffixes. Purely a function of the fingerprint and
/// policy.
pub fn canonicalize_fingerprint(fingerprint: &str, policy: &NearDuplicatePolicy) -> String {
    if !policy.enabled {
        return fingerprint.to_string();
    }
    let mut key = fingerprint.to_string();

    let earliest = policy
        .prefix_delimiters
        .iter()
        .filter_map(|delimiter| key.find(delimiter.as_str()))
        .min();
    if let Some(position) = earliest {
        let prefix = key[..position].to_string();
        if prefix.chars().count() >= policy.min_prefix_length {
            key = prefix;
        }
    }

    if policy.strip_numeric_suffix {
        let stripped = key
            .trim_end_matches(|c: char| c.is_ascii_digit())
            .trim_end_matches(['-', '_', '.', ' ']);
        if !stripped.is_empty() && stripped.len() < key.len() {
            key = stripped.to_string();
        }
    }
    key
}

// =============================================================================
// Aggregator
// =============================================================================

pub struct CandidateAggregator {
    thresholds: LevelThresholds,
    resolver: InstitutionResolver,
    frequency_policy: FrequencyFilteringPolicy,
}

struct Group {
    level: u8,
    label: String,
    normalized: String,
    parents: Vec<String>,
    aliases: Vec<String>,
    institutions: BTreeSet<String>,
    fingerprints: BTreeSet<String>,
    count: u64,
}

impl CandidateAggregator {
    pub fn new(
        thresholds: LevelThresholds,
        resolver: InstitutionResolver,
        frequency_policy: FrequencyFilteringPolicy,
    ) -> Self {
        Self {
            thresholds,
            resolver,
            frequency_policy,
        }
    }

    pub fn aggregate(&self, evidence: &[CandidateEnvelope]) -> AggregationResult {
        let mut groups: BTreeMap<(u8, String, String), Group> = BTreeMap::new();

        for envelope in evidence {
            let candidate = &envelope.candidate;
            let mut parents = candidate.parents.clone();
            parents.sort();
            parents.dedup();
            let key = (
                candidate.level,
                candidate.normalized.clone(),
                parents.join("\u{1f}"),
            );

            let group = groups.entry(key).or_insert_with(|| Group {
                level: candidate.level,
                label: candidate.label.clone(),
                normalized: candidate.normalized.clone(),
                parents,
                aliases: Vec::new(),
                institutions: BTreeSet::new(),
                fingerprints: BTreeSet::new(),
                count: 0,
            });

            for alias in &candidate.aliases {
                if !group.aliases.iter().any(|a| a.eq_ignore_ascii_case(alias)) {
                    group.aliases.push(alias.clone());
                }
            }
            for institution in &envelope.institutions {
                let canonical = self.resolver.resolve_identity(institution);
                if !canonical.is_empty() {
                    group.institutions.insert(canonical);
                }
            }
            for fingerprint in &envelope.record_fingerprints {
                group.fingerprints.insert(canonicalize_fingerprint(
                    fingerprint,
                    &self.frequency_policy.near_duplicate,
                ));
            }
            group.count += candidate.support.count;
        }

        let mut result = AggregationResult::default();
        result
            .stats
            .insert("candidates_in".into(), evidence.len() as u64);
        result
            .stats
            .insert("aggregated_groups".into(), groups.len() as u64);

        for (_, mut group) in groups {
            if group.institutions.is_empty() {
                group.institutions.insert(
                    self.frequency_policy
                        .unknown_institution_placeholder
                        .clone(),
                );
            }
            let institutions = group.institutions.len() as u64;
            let records = group.fingerprints.len() as u64;
            let threshold = self.thresholds.for_level(group.level);
            let passed =
                institutions >= threshold.min_institutions && records >= threshold.min_src_count;

            let mut rationale = Rationale::default();
            rationale.gate("frequency", passed);
            rationale.reason(format!(
                "institutions={institutions} (required {}); records={records} (required {})",
                threshold.min_institutions, threshold.min_src_count
            ));

            let decision = CandidateDecision {
                candidate: Candidate {
                    level: group.level,
                    label: group.label,
                    normalized: group.normalized,
                    parents: group.parents,
                    aliases: group.aliases,
                    support: SupportStats::new(records, institutions, group.count),
                },
                institutions: group.institutions.into_iter().collect(),
                record_fingerprints: group.fingerprints.into_iter().collect(),
                weight: threshold.weight(institutions, records),
                passed,
                rationale,
            };
            if passed {
                result.kept.push(decision);
            } else {
                result.dropped.push(decision);
            }
        }

        result.stats.insert("kept".into(), result.kept.len() as u64);
        result.stats.insert(
            "dropped_insufficient_support".into(),
            result.dropped.len() as u64,
        );
        result
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{InstitutionPolicy, LevelThreshold};

    fn thresholds() -> LevelThresholds {
        LevelThresholds {
            level_0: LevelThreshold::new(1, 1),
            level_1: LevelThreshold::new(1, 1),
            level_2: LevelThreshold::new(2, 1),
            level_3: LevelThreshold::new(2, 3),
        }
    }

    fn aggregator() -> CandidateAggregator {
        CandidateAggregator::new(
            thresholds(),
            InstitutionResolver::new(InstitutionPolicy::default()),
            FrequencyFilteringPolicy::default(),
        )
    }

    fn candidate(level: u8, label: &str, normalized: &str, parents: &[&str], count: u64) -> Candidate {
        Candidate {
            level,
            label: label.into(),
            normalized: normalized.into(),
            parents: parents.iter().map(|p| p.to_string()).collect(),
            aliases: vec![label.to_string()],
            support: SupportStats::new(count, 1, count),
        }
    }

    fn envelope(
        candidate: Candidate,
        institutions: &[&str],
        fingerprints: &[&str],
    ) -> CandidateEnvelope {
        CandidateEnvelope {
            candidate,
            institutions: institutions.iter().map(|s| s.to_string()).collect(),
            record_fingerprints: fingerprints.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn groups_by_label_and_parents_and_sums_support() {
        let evidence = vec![
            envelope(
                candidate(2, "Computer Vision", "computer vision", &["ai"], 2),
                &["MIT"],
                &["rec-1"],
            ),
            envelope(
                candidate(2, "Computer Vision", "computer vision", &["ai"], 1),
                &["Stanford"],
                &["rec-2"],
            ),
        ];
        let result = aggregator().aggregate(&evidence);

        assert_eq!(result.stats["aggregated_groups"], 1);
        assert_eq!(result.kept.len(), 1);
        let kept = &result.kept[0];
        assert_eq!(kept.candidate.support.institutions, 2);
        assert_eq!(kept.candidate.support.records, 2);
        assert_eq!(kept.candidate.support.count, 3);
        assert_eq!(kept.rationale.passed_gates["frequency"], true);
        assert!(kept.rationale.reasons[0].contains("institutions="));
    }

    #[test]
    fn drops_when_thresholds_not_met() {
        let evidence = vec![envelope(
            candidate(2, "Robotics", "robotics", &["engineering"], 2),
            &["Carnegie Mellon"],
            &["rec-1", "rec-2"],
        )];
        let result = aggregator().aggregate(&evidence);

        assert!(result.kept.is_empty());
        assert_eq!(result.dropped.len(), 1);
        let dropped = &result.dropped[0];
        assert_eq!(dropped.candidate.support.institutions, 1);
        assert_eq!(dropped.rationale.passed_gates["frequency"], false);
        assert!(dropped
            .rationale
            .reasons
            .iter()
            .any(|r| r.contains("institutions=")));
    }

    #[test]
    fn records_threshold_controls_decision() {
        let evidence = vec![
            envelope(
                candidate(3, "Quantum Vision", "quantum vision", &["computer science"], 3),
                &["Institution A"],
                &["rec-1"],
            ),
            envelope(
                candidate(3, "Quantum Vision", "quantum vision", &["computer science"], 2),
                &["Institution B"],
                &["rec-2"],
            ),
        ];
        let result = aggregator().aggregate(&evidence);

        assert!(result.kept.is_empty());
        assert_eq!(result.dropped.len(), 1);
        let dropped = &result.dropped[0];
        assert_eq!(dropped.candidate.support.institutions, 2);
        assert_eq!(dropped.candidate.support.records, 2);
        assert_eq!(result.stats["dropped_insufficient_support"], 1);
    }

    #[test]
    fn missing_institutions_collapse_to_placeholder() {
        let cand = candidate(2, "Unlabeled", "unlabeled", &["parent"], 1);
        let evidence = vec![
            envelope(cand.clone(), &[], &["rec-1"]),
            envelope(cand, &[], &["rec-2"]),
        ];
        let result = aggregator().aggregate(&evidence);

        assert_eq!(result.dropped.len(), 1);
        let dropped = &result.dropped[0];
        assert_eq!(dropped.candidate.support.institutions, 1);
        assert_eq!(dropped.institutions, vec!["placeholder::unknown".to_string()]);
    }

    #[test]
    fn near_duplicate_fingerprints_collapse() {
        let frequency_policy = FrequencyFilteringPolicy {
            unknown_institution_placeholder: "placeholder::unknown".into(),
            near_duplicate: NearDuplicatePolicy {
                enabled: true,
                prefix_delimiters: vec!["#".into()],
                strip_numeric_suffix: true,
                min_prefix_length: 4,
            },
        };
        let aggregator = CandidateAggregator::new(
            thresholds(),
            InstitutionResolver::new(InstitutionPolicy::default()),
            frequency_policy,
        );

        let evidence = vec![envelope(
            candidate(1, "AI", "ai", &["root"], 2),
            &["Institution A"],
            &["paper-123#v1", "paper-123#v2"],
        )];
        let result = aggregator.aggregate(&evidence);

        assert_eq!(result.kept.len(), 1);
        let kept = &result.kept[0];
        assert_eq!(kept.candidate.support.records, 1);
        assert_eq!(kept.record_fingerprints.len(), 1);
    }

    #[test]
    fn fingerprint_canonicalization_respects_min_prefix() {
        let policy = NearDuplicatePolicy {
            enabled: true,
            prefix_delimiters: vec!["#".into()],
            strip_numeric_suffix: false,
            min_prefix_length: 6,
        };
        // Prefix "abc" is too short, so the delimiter is ignored.
        assert_eq!(canonicalize_fingerprint("abc#v1", &policy), "abc#v1");
        assert_eq!(canonicalize_fingerprint("abcdef#v1", &policy), "abcdef");
    }

    #[test]
    fn weight_orders_by_support() {
        let result = aggregator().aggregate(&[
            envelope(
                candidate(1, "AI", "ai", &["root"], 1),
                &["A", "B"],
                &["rec-1", "rec-2"],
            ),
            envelope(
                candidate(1, "Biology", "biology", &["root"], 1),
                &["A"],
                &["rec-3"],
            ),
        ]);
        let by_name: BTreeMap<&str, f64> = result
            .kept
            .iter()
            .map(|d| (d.candidate.normalized.as_str(), d.weight))
            .collect();
        assert!(by_name["ai"] > by_name["biology"]);
    }
}
