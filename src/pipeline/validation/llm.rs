//! LLM Entailment Validation
//!
//! Asks `taxonomy.validate_entailment` whether the gathered evidence
//! supports the concept, with snippets truncated to the policy's evidence
//! token budget. Passing requires both the model's verdict and a confidence
//! at or above the threshold.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::LlmValidationSettings;
use crate::llm::LlmClient;
use crate::types::{Result, TaxonomyError};

use super::evidence::EvidenceSnippet;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmValidationResult {
    pub validated: bool,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub confidence: f64,
}

impl LlmValidationResult {
    pub fn passed(&self, settings: &LlmValidationSettings) -> bool {
        self.validated && self.confidence >= settings.confidence_threshold
    }

    pub fn strength(&self) -> f64 {
        if self.validated {
            self.confidence.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

pub struct LlmValidator {
    client: Arc<LlmClient>,
    settings: LlmValidationSettings,
}

impl LlmValidator {
    pub fn new(client: Arc<LlmClient>, settings: LlmValidationSettings) -> Self {
        Self { client, settings }
    }

    pub fn settings(&self) -> &LlmValidationSettings {
        &self.settings
    }

    pub async fn validate_concept(
        &self,
        label: &str,
        evidence: &[EvidenceSnippet],
    ) -> Result<LlmValidationResult> {
        let evidence_text = truncate_tokens(
            &evidence
                .iter()
                .map(|s| s.text.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
            self.settings.max_evidence_tokens,
        );
        let response = self
            .client
            .run(
                "taxonomy.validate_entailment",
                &json!({"label": label, "evidence": evidence_text}),
            )
            .await?;
        serde_json::from_value(response.content).map_err(|e| TaxonomyError::SchemaViolation {
            prompt: "taxonomy.validate_entailment".into(),
            detail: e.to_string(),
        })
    }
}

/// Truncate text to at most `max_tokens` whitespace tokens.
fn truncate_tokens(text: &str, max_tokens: usize) -> String {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.len() <= max_tokens {
        text.to_string()
    } else {
        tokens[..max_tokens].join(" ")
    }
}

// =============================================================================
// Tests
// =============================================================================
