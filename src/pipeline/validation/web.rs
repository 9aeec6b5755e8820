//! Web Evidence Validation
//!
//! Queries the evidence index for mentions of the concept's label and
//! aliases; passing requires at least `min_snippet_matches` snippets.
//! Snippet retention is capped by the evidence-storage policy.

use serde::{Deserialize, Serialize};

use crate::config::ValidationPolicy;
use crate::types::Concept;

use super::evidence::{EvidenceIndexer, EvidenceSnippet};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebValidationResult {
    pub passed: bool,
    pub matches: usize,
    pub evidence: Vec<EvidenceSnippet>,
    pub summary: String,
}

impl WebValidationResult {
    /// Signal strength for weighted aggregation: match ratio scaled by the
    /// best source authority, capped at 1.0.
    pub fn strength(&self, min_matches: usize) -> f64 {
        if self.matches == 0 {
            return 0.0;
        }
        let ratio = self.matches as f64 / min_matches.max(1) as f64;
        let authority = self
            .evidence
            .iter()
            .map(|s| s.authority)
            .fold(0.5_f64, f64::max);
        (ratio * authority).min(1.0)
    }
}

pub struct WebValidator<'a> {
    policy: ValidationPolicy,
    indexer: &'a EvidenceIndexer,
}

impl<'a> WebValidator<'a> {
    pub fn new(policy: ValidationPolicy, indexer: &'a EvidenceIndexer) -> Self {
        Self { policy, indexer }
    }

    pub fn validate_concept(&self, concept: &Concept) -> WebValidationResult {
        let mut evidence = self.indexer.search(&concept.canonical_label);
        for alias in &concept.aliases {
            if evidence.len() >= self.policy.evidence.max_snippets_per_concept {
                break;
            }
            evidence.extend(self.indexer.search(alias));
        }

        let matches = evidence.len();
        evidence.truncate(self.policy.evidence.max_snippets_per_concept);
        if !self.policy.evidence.store_evidence_urls {
            for snippet in &mut evidence {
                snippet.url.clear();
            }
        }

        let passed = matches >= self.policy.web.min_snippet_matches;
        let summary = format!(
            "Evidence snippets: {matches} (required {})",
            self.policy.web.min_snippet_matches
        );
        WebValidationResult {
            passed,
            matches,
            evidence,
            summary,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
