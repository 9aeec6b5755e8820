//! LLM Client
//!
//! The single call path for every prompt in the pipeline. Applies the
//! determinism policy (temperature 0, seeded, JSON mode), wraps the provider
//! with timeout and bounded exponential backoff, validates responses against
//! the prompt's declared shape, attempts JSON repair and repair prompts, and
//! records per-prompt metrics.
//!
//! Callers receive validated `serde_json::Value` content and deserialize it
//! into their own typed structures.

use std::sync::Arc;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::LlmPolicy;
use crate::types::{Result, TaxonomyError};

use super::json_repair::parse_or_repair;
use super::metrics::MetricsCollector;
use super::provider::{ProviderRequest, ProviderResponse, SharedProvider, TokenUsage};
use super::registry::{PromptEntry, PromptRegistry, ResponseShape};

// =============================================================================
// Response
// =============================================================================

/// A validated prompt response.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmResponse {
    pub content: Value,
    pub usage: TokenUsage,
    /// True when JSON repair or a repair prompt was needed.
    pub repaired: bool,
}

// =============================================================================
// Client
// =============================================================================

pub struct LlmClient {
    policy: LlmPolicy,
    registry: Arc<PromptRegistry>,
    provider: SharedProvider,
    metrics: Arc<MetricsCollector>,
}

impl LlmClient {
    pub fn new(policy: LlmPolicy, registry: Arc<PromptRegistry>, provider: SharedProvider) -> Self {
        Self {
            policy,
            registry,
            provider,
            metrics: Arc::new(MetricsCollector::new()),
        }
    }

    pub fn registry(&self) -> &PromptRegistry {
        &self.registry
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        Arc::clone(&self.metrics)
    }

    fn request(&self) -> ProviderRequest {
        ProviderRequest {
            temperature: self.policy.temperature,
            nucleus_top_p: self.policy.nucleus_top_p,
            json_mode: self.policy.json_mode,
            max_tokens: self.policy.token_budget,
            random_seed: self.policy.random_seed,
            timeout: Duration::from_secs_f64(self.policy.request_timeout_seconds),
        }
    }

    /// Execute a prompt and return validated content.
    ///
    /// Transport errors retry with backoff; schema failures go through JSON
    /// repair and then a repair prompt, bounded by
    /// `llm.repair.quarantine_after_attempts`. Exhaustion returns a
    /// `SchemaViolation` so the caller can quarantine the unit.
    pub async fn run(&self, prompt_key: &str, variables: &Value) -> Result<LlmResponse> {
        let entry = self.registry.entry(prompt_key)?.clone();
        let base_prompt = self.registry.render(prompt_key, variables)?;
        let request = self.request();

        let mut usage = TokenUsage::default();
        let mut prompt = base_prompt.clone();
        let mut attempts = 0u32;

        loop {
            let response = self.transport(prompt_key, &prompt, &request).await?;
            usage.prompt_tokens += response.usage.prompt_tokens;
            usage.completion_tokens += response.usage.completion_tokens;

            match self.validate(prompt_key, &entry, &response.content) {
                Ok((content, repaired)) => {
                    if repaired {
                        self.metrics.record_repair(prompt_key);
                    }
                    return Ok(LlmResponse {
                        content,
                        usage,
                        repaired: repaired || attempts > 0,
                    });
                }
                Err(err) => {
                    attempts += 1;
                    if attempts >= self.policy.repair.quarantine_after_attempts {
                        self.metrics.record_failure(prompt_key);
                        return Err(err);
                    }
                    warn!(prompt = prompt_key, attempt = attempts, "schema violation, issuing repair prompt");
                    prompt = format!(
                        "{base_prompt}\n\n{}\nPrevious response:\n{}",
                        entry.repair_instruction, response.content
                    );
                }
            }
        }
    }

    /// One provider round-trip with timeout and retry-on-retryable.
    async fn transport(
        &self,
        prompt_key: &str,
        prompt: &str,
        request: &ProviderRequest,
    ) -> Result<ProviderResponse> {
        let call = || async {
            let fut = self.provider.call(prompt, request);
            match tokio::time::timeout(request.timeout, fut).await {
                Ok(result) => result,
                Err(_) => Err(TaxonomyError::timeout(
                    format!("llm:{prompt_key}"),
                    request.timeout,
                )),
            }
        };

        let backoff = ExponentialBuilder::default()
            .with_min_delay(Duration::from_secs_f64(
                self.policy.retry_backoff_seconds.max(0.0),
            ))
            .with_max_times(self.policy.retry_attempts as usize);

        let response = call
            .retry(backoff)
            .when(|err: &TaxonomyError| err.is_retryable())
            .notify(|err, delay| {
                debug!(prompt = prompt_key, ?delay, %err, "retrying provider call");
                self.metrics.record_retry(prompt_key);
            })
            .await
            .inspect_err(|_| self.metrics.record_failure(prompt_key))?;

        self.metrics.record_call(prompt_key, &response.usage);
        Ok(response)
    }

    /// Parse, repair, shape-check and deterministically order a response.
    fn validate(
        &self,
        prompt_key: &str,
        entry: &PromptEntry,
        raw: &str,
    ) -> Result<(Value, bool)> {
        let (mut content, repaired) =
            parse_or_repair(raw).map_err(|err| annotate_prompt(err, prompt_key))?;

        match &entry.shape {
            ResponseShape::Array { required_fields } => {
                let items = content.as_array().ok_or_else(|| TaxonomyError::SchemaViolation {
                    prompt: prompt_key.to_string(),
                    detail: "expected a JSON array".into(),
                })?;
                for item in items {
                    require_fields(prompt_key, item, required_fields)?;
                }
                if let Some(order_by) = &entry.enforce_order_by
                    && let Some(items) = content.as_array_mut()
                {
                    items.sort_by_key(|item| {
                        item.get(order_by)
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string()
                    });
                }
            }
            ResponseShape::Object { required_fields } => {
                require_fields(prompt_key, &content, required_fields)?;
            }
        }
        Ok((content, repaired))
    }
}

fn require_fields(prompt_key: &str, value: &Value, required: &[String]) -> Result<()> {
    let object = value.as_object().ok_or_else(|| TaxonomyError::SchemaViolation {
        prompt: prompt_key.to_string(),
        detail: "expected a JSON object".into(),
    })?;
    for field in required {
        if !object.contains_key(field) {
            return Err(TaxonomyError::SchemaViolation {
                prompt: prompt_key.to_string(),
                detail: format!("missing required field '{field}'"),
            });
        }
    }
    Ok(())
}

fn annotate_prompt(err: TaxonomyError, prompt_key: &str) -> TaxonomyError {
    match err {
        TaxonomyError::SchemaViolation { detail, .. } => TaxonomyError::SchemaViolation {
            prompt: prompt_key.to_string(),
            detail,
        },
        other => other,
    }
}

// =============================================================================
// Tests
// =============================================================================
