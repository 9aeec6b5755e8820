//! Token Rule Engine
//!
//! Deterministic single-token verification: allowlist bypass, per-level
//! token-count limits, forbidden punctuation (hard), venue detection (hard
//! when forbidden) and structural checks. The engine also produces
//! suggestions (de-punctuated variants) that callers merge into aliases.

use serde::{Deserialize, Serialize};

use crate::config::SingleTokenPolicy;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleEvaluation {
    pub passed: bool,
    pub allowlist_hit: bool,
    pub reasons: Vec<String>,
    pub suggestions: Vec<String>,
    /// A violation the LLM may never override.
    pub hard_failure: bool,
    /// The only violation is the token-count limit.
    pub token_count_exceeded: bool,
}

pub struct TokenRuleEngine {
    policy: SingleTokenPolicy,
}

impl TokenRuleEngine {
    pub fn new(policy: SingleTokenPolicy) -> Self {
        Self { policy }
    }

    /// Evaluate all rules, in order, against a label at the given level.
    pub fn apply_all_rules(&self, label: &str, level: u8) -> RuleEvaluation {
        let canonical = label.trim().to_lowercase();
        let mut evaluation = RuleEvaluation::default();

        // Allowlist bypass short-circuits everything else.
        if self.policy.allowlist.iter().any(|entry| entry == &canonical) {
            evaluation.passed = true;
            evaluation.allowlist_hit = true;
            evaluation.reasons.push("label matched allowlist".into());
            return evaluation;
        }

        let mut hard = false;
        let mut violations: Vec<String> = Vec::new();

        // Token count.
        let tokens: Vec<&str> = canonical.split_whitespace().collect();
        let max_tokens = self.policy.max_tokens(level);
        let mut token_count_exceeded = false;
        if tokens.len() > max_tokens {
            token_count_exceeded = true;
            violations.push(format!(
                "token count {} exceeds limit {max_tokens} for level {level}",
                tokens.len()
            ));
        }

        // Forbidden punctuation.
        let mut punctuation_hit = false;
        for mark in &self.policy.forbidden_punctuation {
            if mark == "-" && self.policy.hyphenated_compounds_allowed {
                continue;
            }
            if canonical.contains(mark.as_str()) {
                punctuation_hit = true;
                hard = true;
                violations.push(format!("label contains forbidden punctuation '{mark}'"));
            }
        }
        if punctuation_hit {
            let mut cleaned = canonical.clone();
            for mark in &self.policy.forbidden_punctuation {
                cleaned = cleaned.replace(mark.as_str(), " ");
            }
            let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
            if !cleaned.is_empty() && cleaned != canonical {
                evaluation.suggestions.push(cleaned);
            }
        }

        // Venue names.
        if self.policy.venue_names_forbidden
            && self.policy.venue_names.iter().any(|venue| venue == &canonical)
        {
            hard = true;
            violations.push(format!("label matches venue name '{canonical}'"));
        }

        // Structural checks.
        if canonical.is_empty() {
            hard = true;
            violations.push("label is empty after canonicalization".into());
        }
        for pair in tokens.windows(2) {
            if pair[0] == pair[1] {
                hard = true;
                violations.push(format!("duplicate token '{}'", pair[0]));
                break;
            }
        }

        evaluation.passed = violations.is_empty();
        evaluation.hard_failure = hard;
        evaluation.token_count_exceeded = token_count_exceeded && !hard;
        evaluation.reasons = violations;
        evaluation
    }
}

// =============================================================================
// Tests
// =============================================================================
