//! LLM Disambiguation
//!
//! Asks `taxonomy.disambiguate` whether a colliding label denotes multiple
//! senses, providing deduplicated context summaries. The model proposes two
//! or more sense definitions with parent hints and evidence indices.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::DisambiguationPolicy;
use crate::llm::LlmClient;
use crate::types::{Result, TaxonomyError};
use crate::utils::context_features::{ContextWindow, summarize_contexts_for_llm};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmSenseDefinition {
    pub label: String,
    #[serde(default)]
    pub gloss: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub parent_hints: Vec<String>,
    #[serde(default)]
    pub evidence_indices: Vec<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeparabilityResult {
    pub separable: bool,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub senses: Vec<LlmSenseDefinition>,
}

pub struct LlmDisambiguator {
    client: Arc<LlmClient>,
    policy: DisambiguationPolicy,
}

impl LlmDisambiguator {
    pub fn new(client: Arc<LlmClient>, policy: DisambiguationPolicy) -> Self {
        Self { client, policy }
    }

    pub async fn check_separability(
        &self,
        label: &str,
        level: u8,
        contexts: &BTreeMap<String, Vec<ContextWindow>>,
    ) -> Result<SeparabilityResult> {
        let all_contexts: Vec<ContextWindow> = contexts
            .values()
            .flat_map(|windows| windows.iter().cloned())
            .collect();
        let summaries = summarize_contexts_for_llm(&all_contexts, self.policy.max_contexts_for_llm);
        let rendered = serde_json::to_string(&summaries)?;

        let response = self
            .client
            .run(
                "taxonomy.disambiguate",
                &json!({"label": label, "level": level, "contexts": rendered}),
            )
            .await?;
        serde_json::from_value(response.content).map_err(|e| TaxonomyError::SchemaViolation {
            prompt: "taxonomy.disambiguate".into(),
            detail: e.to_string(),
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmPolicy;
    use crate::llm::{CallbackProvider, PromptRegistry, ProviderResponse};

    fn disambiguator(content: &'static str) -> LlmDisambiguator {
        let mut policy = LlmPolicy::default();
        policy.retry_attempts = 0;
        policy.retry_backoff_seconds = 0.0;
        let provider = Arc::new(CallbackProvider::new("mock", move |_, _| {
            Ok(ProviderResponse::from_content(content))
        }));
        LlmDisambiguator::new(
            Arc::new(LlmClient::new(
                policy,
                Arc::new(PromptRegistry::builtin()),
                provider,
            )),
            DisambiguationPolicy::default(),
        )
    }

    #[tokio::test]
    async fn parses_sense_definitions() {
        let content = r#"{
            "separable": true,
            "confidence": 0.9,
            "senses": [
                {"label": "Research", "gloss": "Focus on research programs",
                 "parent_hints": ["p1"], "evidence_indices": [0]},
                {"label": "Teaching", "gloss": "Focus on teaching curriculum",
                 "parent_hints": ["p2"], "evidence_indices": [1]}
            ]
        }"#;
        let result = disambiguator(content)
            .check_separability("Machine Learning", 1, &BTreeMap::new())
            .await
            .unwrap();

        assert!(result.separable);
        assert_eq!(result.senses.len(), 2);
        assert_eq!(result.senses[0].parent_hints, vec!["p1".to_string()]);
    }
}
