//! Rule Validation
//!
//! Deterministic concept checks: forbidden patterns and structural problems
//! are hard failures; per-level required vocabularies are hard; venue-name
//! detection is soft by default and escalates when `venue_detection_hard` is
//! set or the venue pattern also appears among the forbidden patterns.
//!
//! The summary string is deterministic:
//! `"N hard[, M soft] violations; most significant: <code>"` or
//! `"Rule checks succeeded"`.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::ValidationPolicy;
use crate::types::Concept;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleValidationResult {
    pub passed: bool,
    pub hard_fail: bool,
    pub hard_violations: Vec<String>,
    pub soft_violations: Vec<String>,
    pub summary: String,
}

impl RuleValidationResult {
    /// All violations, hard first.
    pub fn violations(&self) -> Vec<String> {
        self.hard_violations
            .iter()
            .chain(self.soft_violations.iter())
            .cloned()
            .collect()
    }

    /// Signal strength for weighted aggregation.
    pub fn strength(&self) -> f64 {
        if self.hard_fail {
            0.0
        } else if self.soft_violations.is_empty() {
            1.0
        } else {
            0.7
        }
    }
}

pub struct RuleValidator {
    policy: ValidationPolicy,
}

impl RuleValidator {
    pub fn new(policy: ValidationPolicy) -> Self {
        Self { policy }
    }

    pub fn validate_concept(&self, concept: &Concept) -> RuleValidationResult {
        let label = concept.canonical_label.to_lowercase();
        let rules = &self.policy.rules;
        let mut hard: Vec<String> = Vec::new();
        let mut soft: Vec<String> = Vec::new();

        for pattern in &rules.forbidden_patterns {
            if pattern_matches(pattern, &label) {
                hard.push(format!("forbidden_pattern:{pattern}"));
            }
        }

        if rules.structural_checks_enabled {
            if label.trim().is_empty() {
                hard.push("empty_label".into());
            }
            if concept.level > 0 && concept.parents.is_empty() {
                hard.push("missing_parents".into());
            }
        }

        if let Some(vocabulary) = rules.required_vocabularies.get(&concept.level.to_string())
            && !vocabulary.is_empty()
            && !vocabulary.iter().any(|term| label.contains(&term.to_lowercase()))
        {
            hard.push(format!("missing_required_vocab:{}", concept.level));
        }

        for pattern in &rules.venue_patterns {
            if pattern_matches(pattern, &label) {
                let code = format!("venue_name_detected:{pattern}");
                let escalated = rules.venue_detection_hard
                    || rules.forbidden_patterns.iter().any(|f| f == pattern);
                if escalated {
                    hard.push(code);
                } else {
                    soft.push(code);
                }
            }
        }

        let hard_fail = !hard.is_empty();
        let summary = summarize(&hard, &soft);
        RuleValidationResult {
            passed: !hard_fail,
            hard_fail,
            hard_violations: hard,
            soft_violations: soft,
            summary,
        }
    }
}

fn pattern_matches(pattern: &str, label: &str) -> bool {
    match Regex::new(&format!("(?i){pattern}")) {
        Ok(re) => re.is_match(label),
        Err(_) => label.contains(&pattern.to_lowercase()),
    }
}

fn summarize(hard: &[String], soft: &[String]) -> String {
    match (hard.len(), soft.len()) {
        (0, 0) => "Rule checks succeeded".to_string(),
        (h, 0) => format!("{h} hard violations; most significant: {}", hard[0]),
        (0, s) => format!("{s} soft violations; most significant: {}", soft[0]),
        (h, s) => format!(
            "{h} hard, {s} soft violations; most significant: {}",
            hard[0]
        ),
    }
}

// =============================================================================
// Tests
// =============================================================================
