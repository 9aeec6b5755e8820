//! LLM integration: provider abstraction, prompt registry, validated client
//! with retry/repair, and per-prompt metrics.

pub mod client;
pub mod json_repair;
pub mod metrics;
pub mod provider;
pub mod registry;

pub use client::{LlmClient, LlmResponse};
pub use json_repair::parse_or_repair;
pub use metrics::{MetricsCollector, PromptMetrics};
pub use provider::{
    CallbackProvider, FixtureProvider, LlmProvider, PerformanceMetrics, ProviderRequest,
    ProviderResponse, SharedProvider, TokenUsage,
};
pub use registry::{PromptEntry, PromptRegistry, ResponseShape};
