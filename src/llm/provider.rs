//! LLM Provider Abstraction
//!
//! The pipeline never talks to a model API directly; it calls an
//! [`LlmProvider`] with a rendered prompt and deterministic request options
//! and receives raw text plus usage metrics. Transport (HTTP, local process,
//! fixtures) lives behind this trait.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::Result;

// =============================================================================
// Request / Response
// =============================================================================

/// Determinism-bearing request options, derived from `policies.llm`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderRequest {
    pub temperature: f64,
    pub nucleus_top_p: f64,
    pub json_mode: bool,
    pub max_tokens: usize,
    pub random_seed: u64,
    pub timeout: Duration,
}

/// Token usage metrics for cost tracking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Provider-side timing metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub latency_ms: u64,
}

/// Raw provider output before JSON validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderResponse {
    pub content: String,
    pub usage: TokenUsage,
    pub performance: PerformanceMetrics,
}

impl ProviderResponse {
    pub fn from_content(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            usage: TokenUsage::default(),
            performance: PerformanceMetrics::default(),
        }
    }
}

/// Shared provider handle for concurrent use across phase workers.
pub type SharedProvider = Arc<dyn LlmProvider>;

// =============================================================================
// Provider trait
// =============================================================================

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Execute one prompt and return the raw response.
    async fn call(&self, prompt: &str, request: &ProviderRequest) -> Result<ProviderResponse>;

    /// Provider name for logging and metrics.
    fn name(&self) -> &str;
}

// =============================================================================
// Callback provider
// =============================================================================

/// Provider backed by a plain closure. The seam used by tests and by
/// embedders that already own a transport.
pub struct CallbackProvider<F>
where
    F: Fn(&str, &ProviderRequest) -> Result<ProviderResponse> + Send + Sync,
{
    name: String,
    callback: F,
}

impl<F> CallbackProvider<F>
where
    F: Fn(&str, &ProviderRequest) -> Result<ProviderResponse> + Send + Sync,
{
    pub fn new(name: impl Into<String>, callback: F) -> Self {
        Self {
            name: name.into(),
            callback,
        }
    }
}

#[async_trait]
impl<F> LlmProvider for CallbackProvider<F>
where
    F: Fn(&str, &ProviderRequest) -> Result<ProviderResponse> + Send + Sync,
{
    async fn call(&self, prompt: &str, request: &ProviderRequest) -> Result<ProviderResponse> {
        (self.callback)(prompt, request)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// =============================================================================
// Fixture provider
// =============================================================================

/// Provider backed by recorded responses on disk, keyed by a hash of the
/// rendered prompt. Gives the CLI a deterministic, network-free transport:
/// record responses once, replay them forever. Prompts without a fixture
/// fail permanently and quarantine their unit.
pub struct FixtureProvider {
    root: std::path::PathBuf,
}

impl FixtureProvider {
    pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn fixture_path(&self, prompt: &str) -> std::path::PathBuf {
        use sha2::{Digest, Sha256};
        let digest = Sha256::digest(prompt.as_bytes());
        let key: String = digest.iter().take(8).map(|b| format!("{b:02x}")).collect();
        self.root.join(format!("{key}.json"))
    }

    /// Record a response for a prompt, for later replay.
    pub fn record(&self, prompt: &str, content: &str) -> crate::types::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::write(self.fixture_path(prompt), content)?;
        Ok(())
    }
}

#[async_trait]
impl LlmProvider for FixtureProvider {
    async fn call(&self, prompt: &str, _request: &ProviderRequest) -> Result<ProviderResponse> {
        let path = self.fixture_path(prompt);
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(ProviderResponse::from_content(content)),
            Err(_) => Err(crate::types::TaxonomyError::provider(
                crate::types::ProviderErrorKind::Permanent,
                format!("no recorded fixture at {}", path.display()),
            )),
        }
    }

    fn name(&self) -> &str {
        "fixture"
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ProviderRequest {
        ProviderRequest {
            temperature: 0.0,
            nucleus_top_p: 1.0,
            json_mode: true,
            max_tokens: 512,
            random_seed: 7,
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn callback_provider_round_trip() {
        let provider = CallbackProvider::new("mock", |prompt, _request| {
            Ok(ProviderResponse::from_content(format!("echo: {prompt}")))
        });
        let response = provider.call("hello", &request()).await.unwrap();
        assert_eq!(response.content, "echo: hello");
        assert_eq!(provider.name(), "mock");
    }

    #[test]
    fn token_usage_totals() {
        let usage = TokenUsage {
            prompt_tokens: 13,
            completion_tokens: 7,
        };
        assert_eq!(usage.total(), 20);
    }

    #[tokio::test]
    async fn fixture_provider_replays_recorded_responses() {
        let tmp = tempfile::TempDir::new().unwrap();
        let provider = FixtureProvider::new(tmp.path());
        provider
            .record("verify: Biology", r#"{"pass": true, "reason": "ok"}"#)
            .unwrap();

        let hit = provider.call("verify: Biology", &request()).await.unwrap();
        assert!(hit.content.contains("pass"));

        let miss = provider.call("verify: Chemistry", &request()).await.unwrap_err();
        assert!(!miss.is_retryable());
    }
}
