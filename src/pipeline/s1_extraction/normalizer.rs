//! Candidate Normalization
//!
//! Applies the label policy to raw extracted candidates: institution-prefix
//! stripping, boilerplate removal, acronym handling and the minimal
//! canonical form. Surface forms lost along the way become aliases.

use serde::{Deserialize, Serialize};

use crate::config::LabelPolicy;
use crate::types::SourceRecord;
use crate::utils::normalization::{strip_institution_prefix, to_canonical_form};

use super::extractor::RawCandidate;

/// A candidate after normalization, prior to parent resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedCandidate {
    pub label: String,
    pub normalized: String,
    pub aliases: Vec<String>,
    /// Raw parent strings, not yet resolved to anchors.
    pub parents: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizerMetrics {
    pub normalized_out: u64,
    pub dropped_short: u64,
}

pub struct CandidateNormalizer {
    label_policy: LabelPolicy,
    pub metrics: NormalizerMetrics,
}

impl CandidateNormalizer {
    pub fn new(label_policy: LabelPolicy) -> Self {
        Self {
            label_policy,
            metrics: NormalizerMetrics::default(),
        }
    }

    /// Normalize one raw candidate. Returns `None` when the canonical form
    /// collapses below the policy's minimum length.
    pub fn normalize(
        &mut self,
        raw: &RawCandidate,
        record: &SourceRecord,
        level: u8,
    ) -> Option<NormalizedCandidate> {
        let mut label = raw.label.trim().to_string();
        let mut aliases: Vec<String> = Vec::new();

        if let Some(stripped) =
            strip_institution_prefix(&label, &record.provenance.institution)
        {
            aliases.push(label.clone());
            label = stripped;
        }

        let (normalized, derived_aliases) = to_canonical_form(&label, level, &self.label_policy);
        aliases.extend(derived_aliases);

        for alias in raw.aliases.iter().chain(std::iter::once(&raw.normalized)) {
            let alias = alias.trim();
            if !alias.is_empty() && !alias.eq_ignore_ascii_case(&normalized) {
                aliases.push(alias.to_string());
            }
        }

        if normalized.chars().count() < self.label_policy.minimal_canonical_form.min_length {
            self.metrics.dropped_short += 1;
            return None;
        }

        let mut deduped: Vec<String> = Vec::new();
        for alias in aliases {
            if !deduped.iter().any(|a| a.eq_ignore_ascii_case(&alias)) {
                deduped.push(alias);
            }
        }

        self.metrics.normalized_out += 1;
        Some(NormalizedCandidate {
            label,
            normalized,
            aliases: deduped,
            parents: raw.parents.clone(),
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
