//! LLM Token Verifier
//!
//! Invokes `taxonomy.verify_single_token` for labels the rule engine could
//! not settle. Returns the model's pass/fail verdict with its reason.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::llm::LlmClient;
use crate::types::{Result, TaxonomyError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmVerification {
    pub pass: bool,
    #[serde(default)]
    pub reason: String,
}

pub struct LlmTokenVerifier {
    client: Arc<LlmClient>,
}

impl LlmTokenVerifier {
    pub fn new(client: Arc<LlmClient>) -> Self {
        Self { client }
    }

    pub async fn verify(&self, label: &str, level: u8) -> Result<LlmVerification> {
        let response = self
            .client
            .run(
                "taxonomy.verify_single_token",
                &json!({"label": label, "level": level}),
            )
            .await?;
        serde_json::from_value(response.content).map_err(|e| TaxonomyError::SchemaViolation {
            prompt: "taxonomy.verify_single_token".into(),
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

    fn verifier(content: &'static str) -> LlmTokenVerifier {
        let mut policy = LlmPolicy::default();
        policy.retry_attempts = 0;
        policy.retry_backoff_seconds = 0.0;
        let provider = Arc::new(CallbackProvider::new("mock", move |_, _| {
            Ok(ProviderResponse::from_content(content))
        }));
        LlmTokenVerifier::new(Arc::new(LlmClient::new(
            policy,
            Arc::new(PromptRegistry::builtin()),
            provider,
        )))
    }

    #[tokio::test]
    async fn parses_verdicts() {
        let verdict = verifier(r#"{"pass": true, "reason": "domain term"}"#)
            .verify("robotics", 2)
            .await
            .unwrap();
        assert!(verdict.pass);
        assert_eq!(verdict.reason, "domain term");
    }
}
