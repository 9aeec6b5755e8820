//! Validation Processor
//!
//! Runs the rule, web and LLM validators over each concept and aggregates
//! their signals with the policy weights: `S = w_r·r + w_w·w + w_l·l`,
//! normalized by the total weight of the validators that actually ran. A
//! hard rule failure blocks regardless of the weighted score when
//! `hard_rule_failure_blocks` is set. Decisions and evidence are written to
//! the concept's `validation_metadata`.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::ValidationPolicy;
use crate::llm::LlmClient;
use crate::types::{Concept, FindingMode, PageSnapshot, Result, ValidationFinding};

use super::evidence::{EvidenceIndexer, EvidenceSnippet};
use super::llm::LlmValidator;
use super::rules::RuleValidator;
use super::web::WebValidator;

// =============================================================================
// Outcomes
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationDecision {
    pub passed: bool,
    pub score: f64,
    pub summary: String,
}

#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub concept: Concept,
    pub decision: ValidationDecision,
    pub findings: Vec<ValidationFinding>,
    pub evidence: Vec<EvidenceSnippet>,
}

// =============================================================================
// Processor
// =============================================================================

pub struct ValidationProcessor {
    policy: ValidationPolicy,
    rule_validator: RuleValidator,
    indexer: EvidenceIndexer,
    llm: Option<LlmValidator>,
    enable_web: bool,
}

impl ValidationProcessor {
    pub fn new(policy: ValidationPolicy) -> Self {
        Self {
            rule_validator: RuleValidator::new(policy.clone()),
            indexer: EvidenceIndexer::new(policy.clone()),
            llm: None,
            enable_web: true,
            policy,
        }
    }

    /// Attach the LLM entailment validator. It only runs when
    /// `validation.llm.entailment_enabled` is also set.
    pub fn with_llm(mut self, client: Arc<LlmClient>) -> Self {
        self.llm = Some(LlmValidator::new(client, self.policy.llm.clone()));
        self
    }

    pub fn without_web(mut self) -> Self {
        self.enable_web = false;
        self
    }

    /// Build the evidence index from crawled snapshots.
    pub fn prepare_evidence(&mut self, snapshots: &[PageSnapshot]) {
        self.indexer.build_index(snapshots);
    }

    pub async fn process(&self, concepts: Vec<Concept>) -> Result<Vec<ValidationOutcome>> {
        let mut outcomes = Vec::with_capacity(concepts.len());
        for concept in concepts {
            outcomes.push(self.validate_one(concept).await?);
        }
        Ok(outcomes)
    }

    async fn validate_one(&self, mut concept: Concept) -> Result<ValidationOutcome> {
        let aggregation = &self.policy.aggregation;
        let mut findings = Vec::new();
        let mut weighted_sum = 0.0;
        let mut total_weight = 0.0;

        // Rules always run.
        let rule_result = self.rule_validator.validate_concept(&concept);
        weighted_sum += aggregation.rule_weight * rule_result.strength();
        total_weight += aggregation.rule_weight;
        findings.push(ValidationFinding::new(
            concept.id.clone(),
            FindingMode::Rule,
            rule_result.passed,
            rule_result.summary.clone(),
        )?);

        // Web evidence.
        let mut evidence: Vec<EvidenceSnippet> = Vec::new();
        if self.enable_web && !self.indexer.is_empty() {
            let web_validator = WebValidator::new(self.policy.clone(), &self.indexer);
            let web_result = web_validator.validate_concept(&concept);
            weighted_sum += aggregation.web_weight
                * web_result.strength(self.policy.web.min_snippet_matches);
            total_weight += aggregation.web_weight;
            findings.push(ValidationFinding::new(
                concept.id.clone(),
                FindingMode::Web,
                web_result.passed,
                web_result.summary.clone(),
            )?);
            evidence = web_result.evidence;
        }

        // LLM entailment.
        if let Some(llm) = &self.llm
            && self.policy.llm.entailment_enabled
        {
            match llm.validate_concept(&concept.canonical_label, &evidence).await {
                Ok(llm_result) => {
                    weighted_sum += aggregation.llm_weight * llm_result.strength();
                    total_weight += aggregation.llm_weight;
                    let detail = if llm_result.reason.trim().is_empty() {
                        format!("entailment confidence {:.2}", llm_result.confidence)
                    } else {
                        llm_result.reason.clone()
                    };
                    findings.push(ValidationFinding::new(
                        concept.id.clone(),
                        FindingMode::Llm,
                        llm_result.passed(llm.settings()),
                        detail,
                    )?);
                }
                Err(err) if err.is_record_local() => {
                    total_weight += aggregation.llm_weight;
                    findings.push(ValidationFinding::new(
                        concept.id.clone(),
                        FindingMode::Llm,
                        false,
                        format!("entailment unavailable: {err}"),
                    )?);
                }
                Err(err) => return Err(err),
            }
        }

        let score = if total_weight > 0.0 {
            weighted_sum / total_weight
        } else {
            0.0
        };
        let blocked = aggregation.hard_rule_failure_blocks && rule_result.hard_fail;
        let passed = if blocked {
            false
        } else if (score - 0.5).abs() < f64::EPSILON {
            !aggregation.tie_break_conservative
        } else {
            score > 0.5
        };

        let summary = if blocked {
            format!("blocked by hard rule failure: {}", rule_result.summary)
        } else {
            format!("aggregate score {score:.3}")
        };

        concept.validation_passed = Some(passed);
        concept.rationale.gate("validation", passed);
        concept
            .validation_metadata
            .insert("rule_summary".into(), json!(rule_result.summary));
        concept
            .validation_metadata
            .insert("evidence_count".into(), json!(evidence.len()));
        concept
            .validation_metadata
            .insert("aggregate_score".into(), json!(score));
        concept.validation_metadata.insert(
            "modes".into(),
            json!(
                findings
                    .iter()
                    .map(|f| (format!("{:?}", f.mode).to_uppercase(), f.passed))
                    .collect::<std::collections::BTreeMap<_, _>>()
            ),
        );
        concept
            .validation_metadata
            .insert("decided_at".into(), json!(Utc::now().to_rfc3339()));

        Ok(ValidationOutcome {
            concept,
            decision: ValidationDecision {
                passed,
                score,
                summary,
            },
            findings,
            evidence,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
