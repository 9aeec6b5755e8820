//! S3 Processor
//!
//! Stacks the rule engine and the LLM verifier. A passing rule evaluation is
//! final and never costs an LLM call. A failing evaluation whose only
//! violation is the token-count limit may be overridden by the LLM when
//! `prefer_rule_over_llm` is off, recorded as a `bypass:multi_token`
//! rationale. Hard failures (forbidden punctuation, venues, structural) are
//! never overridden. Rule suggestions land in the candidate's aliases either
//! way.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::SingleTokenPolicy;
use crate::observability::ObservabilityContext;
use crate::types::{Candidate, Rationale, Result};

use super::rules::{RuleEvaluation, TokenRuleEngine};
use super::verifier::{LlmTokenVerifier, LlmVerification};

// =============================================================================
// Input / output shapes
// =============================================================================

/// One candidate entering token verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationInput {
    pub candidate: Candidate,
    #[serde(default)]
    pub rationale: Rationale,
    #[serde(default)]
    pub institutions: Vec<String>,
    #[serde(default)]
    pub record_fingerprints: Vec<String>,
}

/// The S3 decision for one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenVerificationDecision {
    pub candidate: Candidate,
    pub passed: bool,
    pub rule_evaluation: RuleEvaluation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_result: Option<LlmVerification>,
    pub rationale: Rationale,
}

#[derive(Debug, Default)]
pub struct S3Outcome {
    pub verified: Vec<TokenVerificationDecision>,
    pub failed: Vec<TokenVerificationDecision>,
    pub stats: BTreeMap<String, u64>,
}

// =============================================================================
// Processor
// =============================================================================

pub struct S3Processor {
    rule_engine: TokenRuleEngine,
    llm_verifier: Option<LlmTokenVerifier>,
    policy: SingleTokenPolicy,
    observability: Option<Arc<ObservabilityContext>>,
}

impl S3Processor {
    pub fn new(
        rule_engine: TokenRuleEngine,
        llm_verifier: Option<LlmTokenVerifier>,
        policy: SingleTokenPolicy,
    ) -> Self {
        Self {
            rule_engine,
            llm_verifier,
            policy,
            observability: None,
        }
    }

    pub fn with_observability(mut self, observability: Arc<ObservabilityContext>) -> Self {
        self.observability = Some(observability);
        self
    }

    pub async fn process(&self, inputs: Vec<VerificationInput>) -> Result<S3Outcome> {
        let mut outcome = S3Outcome::default();
        let mut checked = 0u64;
        let mut passed_rule = 0u64;
        let mut failed_rule = 0u64;
        let mut llm_called = 0u64;
        let mut passed_llm = 0u64;
        let mut quarantined = 0u64;

        for input in inputs {
            checked += 1;
            let mut candidate = input.candidate;
            let mut rationale = input.rationale;

            let surface = if candidate.normalized.is_empty() {
                candidate.label.clone()
            } else {
                candidate.normalized.clone()
            };
            let evaluation = self.rule_engine.apply_all_rules(&surface, candidate.level);

            for suggestion in &evaluation.suggestions {
                candidate.push_alias(suggestion.clone());
            }
            for reason in &evaluation.reasons {
                rationale.reason(reason.clone());
            }

            let mut llm_result: Option<LlmVerification> = None;
            let passed = if evaluation.passed {
                passed_rule += 1;
                true
            } else if evaluation.token_count_exceeded
                && !evaluation.hard_failure
                && !self.policy.prefer_rule_over_llm
            {
                match &self.llm_verifier {
                    Some(verifier) => {
                        llm_called += 1;
                        match verifier.verify(&surface, candidate.level).await {
                            Ok(verdict) => {
                                let pass = verdict.pass;
                                llm_result = Some(verdict);
                                if pass {
                                    passed_llm += 1;
                                    rationale.reason("bypass:multi_token");
                                } else {
                                    failed_rule += 1;
                                }
                                pass
                            }
                            Err(err) if err.is_record_local() => {
                                quarantined += 1;
                                if let Some(obs) = &self.observability {
                                    obs.quarantine(
                                        err.quarantine_reason(),
                                        &candidate.normalized,
                                        json!({"detail": err.to_string()}),
                                    );
                                }
                                rationale.reason(format!("llm verification failed: {err}"));
                                failed_rule += 1;
                                false
                            }
                            Err(err) => return Err(err),
                        }
                    }
                    None => {
                        failed_rule += 1;
                        false
                    }
                }
            } else {
                failed_rule += 1;
                false
            };

            rationale.gate("single_token", passed);

            let decision = TokenVerificationDecision {
                candidate,
                passed,
                rule_evaluation: evaluation,
                llm_result,
                rationale,
            };
            if passed {
                outcome.verified.push(decision);
            } else {
                outcome.failed.push(decision);
            }
        }

        outcome.stats = BTreeMap::from([
            ("checked".to_string(), checked),
            ("verified".to_string(), outcome.verified.len() as u64),
            ("failed".to_string(), outcome.failed.len() as u64),
            ("passed_rule".to_string(), passed_rule),
            ("failed_rule".to_string(), failed_rule),
            ("llm_called".to_string(), llm_called),
            ("passed_llm".to_string(), passed_llm),
            ("quarantined".to_string(), quarantined),
        ]);

        if let Some(obs) = &self.observability {
            for (name, value) in &outcome.stats {
                if name != "verified" && name != "failed" {
                    obs.increment(name, *value as i64);
                }
            }
        }

        Ok(outcome)
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
    use crate::types::SupportStats;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(prefer_rule_over_llm: bool) -> SingleTokenPolicy {
        SingleTokenPolicy {
            max_tokens_per_level: ["0", "1", "2", "3"]
                .into_iter()
                .map(|level| (level.to_string(), 5))
                .collect(),
            forbidden_punctuation: vec!["-".into(), ".".into()],
            allowlist: vec!["artificial intelligence".into()],
            venue_names: SingleTokenPolicy::default().venue_names,
            venue_names_forbidden: true,
            hyphenated_compounds_allowed: false,
            prefer_rule_over_llm,
        }
    }

    fn candidate(label: &str, normalized: &str, level: u8) -> Candidate {
        Candidate {
            level,
            label: label.into(),
            normalized: normalized.into(),
            parents: if level == 0 { vec![] } else { vec!["L0:root".into()] },
            aliases: vec![],
            support: SupportStats::new(1, 1, 1),
        }
    }

    fn input(label: &str, normalized: &str, level: u8) -> VerificationInput {
        VerificationInput {
            candidate: candidate(label, normalized, level),
            rationale: Rationale::default(),
            institutions: vec!["MIT".into()],
            record_fingerprints: vec!["rec-1".into()],
        }
    }

    fn verifier_with(
        content: &'static str,
        calls: Arc<AtomicU32>,
    ) -> LlmTokenVerifier {
        let mut llm_policy = LlmPolicy::default();
        llm_policy.retry_attempts = 0;
        llm_policy.retry_backoff_seconds = 0.0;
        let provider = Arc::new(CallbackProvider::new("mock", move |_, _| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(ProviderResponse::from_content(content))
        }));
        LlmTokenVerifier::new(Arc::new(LlmClient::new(
            llm_policy,
            Arc::new(PromptRegistry::builtin()),
            provider,
        )))
    }

    #[tokio::test]
    async fn allowlist_bypass_skips_llm() {
        let calls = Arc::new(AtomicU32::new(0));
        let processor = S3Processor::new(
            TokenRuleEngine::new(policy(false)),
            Some(verifier_with(r#"{"pass": true, "reason": ""}"#, Arc::clone(&calls))),
            policy(false),
        );

        let outcome = processor
            .process(vec![input("Artificial Intelligence", "artificial intelligence", 1)])
            .await
            .unwrap();

        assert_eq!(outcome.stats["verified"], 1);
        assert_eq!(outcome.stats["llm_called"], 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        let decision = &outcome.verified[0];
        assert!(decision.rule_evaluation.allowlist_hit);
        assert!(decision.passed);
        assert!(decision.llm_result.is_none());
    }

    #[tokio::test]
    async fn llm_overrides_multi_token_when_permitted() {
        let calls = Arc::new(AtomicU32::new(0));
        let processor = S3Processor::new(
            TokenRuleEngine::new(policy(false)),
            Some(verifier_with(
                r#"{"pass": true, "reason": "abbreviation is acceptable"}"#,
                Arc::clone(&calls),
            )),
            policy(false),
        );

        let outcome = processor
            .process(vec![input(
                "Interdisciplinary Computer Science and Engineering Program",
                "interdisciplinary computer science and engineering program",
                1,
            )])
            .await
            .unwrap();

        assert_eq!(outcome.stats["verified"], 1);
        assert_eq!(outcome.stats["llm_called"], 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let decision = &outcome.verified[0];
        assert!(decision.passed);
        assert!(decision.llm_result.as_ref().unwrap().pass);
        assert!(decision.rationale.reasons.iter().any(|r| r == "bypass:multi_token"));
    }

    #[tokio::test]
    async fn rule_priority_blocks_multi_token_bypass() {
        let calls = Arc::new(AtomicU32::new(0));
        let processor = S3Processor::new(
            TokenRuleEngine::new(policy(true)),
            Some(verifier_with(r#"{"pass": true, "reason": "domain term"}"#, Arc::clone(&calls))),
            policy(true),
        );

        let outcome = processor
            .process(vec![input(
                "Extended Quantum Computing and Information Science Program",
                "extended quantum computing and information science program",
                1,
            )])
            .await
            .unwrap();

        assert_eq!(outcome.stats["failed"], 1);
        assert_eq!(outcome.stats["llm_called"], 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn passing_rules_skip_llm() {
        let calls = Arc::new(AtomicU32::new(0));
        let processor = S3Processor::new(
            TokenRuleEngine::new(policy(false)),
            Some(verifier_with(r#"{"pass": true, "reason": ""}"#, Arc::clone(&calls))),
            policy(false),
        );

        let outcome = processor
            .process(vec![input("Robotics", "robotics", 1)])
            .await
            .unwrap();

        assert_eq!(outcome.stats["verified"], 1);
        assert_eq!(outcome.stats["llm_called"], 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn forbidden_punctuation_fails_hard_with_alias_suggestion() {
        let calls = Arc::new(AtomicU32::new(0));
        let processor = S3Processor::new(
            TokenRuleEngine::new(policy(false)),
            Some(verifier_with(r#"{"pass": true, "reason": "standard label"}"#, Arc::clone(&calls))),
            policy(false),
        );

        let outcome = processor
            .process(vec![input("Machine-Learning", "machine-learning", 2)])
            .await
            .unwrap();

        // Hard punctuation failures are never overridden by the LLM.
        assert_eq!(outcome.stats["failed"], 1);
        assert_eq!(outcome.stats["llm_called"], 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        let decision = &outcome.failed[0];
        assert!(decision
            .candidate
            .aliases
            .iter()
            .any(|alias| alias.eq_ignore_ascii_case("machine learning")));
    }

    #[tokio::test]
    async fn llm_rejection_fails_candidate() {
        let calls = Arc::new(AtomicU32::new(0));
        let processor = S3Processor::new(
            TokenRuleEngine::new(policy(false)),
            Some(verifier_with(
                r#"{"pass": false, "reason": "program name, not a topic"}"#,
                Arc::clone(&calls),
            )),
            policy(false),
        );

        let outcome = processor
            .process(vec![input(
                "Extended Quantum Computing and Information Science Program",
                "extended quantum computing and information science program",
                1,
            )])
            .await
            .unwrap();

        assert_eq!(outcome.stats["failed"], 1);
        assert_eq!(outcome.stats["llm_called"], 1);
        assert!(!outcome.failed[0].passed);
    }
}
