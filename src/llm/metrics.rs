//! Per-prompt LLM Metrics
//!
//! Lock-free collection of call/retry/failure/token counters keyed by prompt,
//! safe to share across phase workers. Exported into the run manifest
//! statistics at finalize.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use super::provider::TokenUsage;

#[derive(Debug, Default)]
struct PromptCounters {
    calls: AtomicU64,
    retries: AtomicU64,
    failures: AtomicU64,
    repaired: AtomicU64,
    prompt_tokens: AtomicU64,
    completion_tokens: AtomicU64,
}

/// Exported, ordered view of one prompt's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMetrics {
    pub calls: u64,
    pub retries: u64,
    pub failures: u64,
    pub repaired: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

#[derive(Default)]
pub struct MetricsCollector {
    prompts: DashMap<String, Arc<PromptCounters>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn counters(&self, prompt_key: &str) -> Arc<PromptCounters> {
        self.prompts
            .entry(prompt_key.to_string())
            .or_default()
            .clone()
    }

    pub fn record_call(&self, prompt_key: &str, usage: &TokenUsage) {
        let counters = self.counters(prompt_key);
        counters.calls.fetch_add(1, Ordering::Relaxed);
        counters
            .prompt_tokens
            .fetch_add(usage.prompt_tokens, Ordering::Relaxed);
        counters
            .completion_tokens
            .fetch_add(usage.completion_tokens, Ordering::Relaxed);
    }

    pub fn record_retry(&self, prompt_key: &str) {
        self.counters(prompt_key)
            .retries
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self, prompt_key: &str) {
        self.counters(prompt_key)
            .failures
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_repair(&self, prompt_key: &str) {
        self.counters(prompt_key)
            .repaired
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Ordered export for manifest statistics.
    pub fn export(&self) -> BTreeMap<String, PromptMetrics> {
        let mut out = BTreeMap::new();
        for entry in self.prompts.iter() {
            let counters = entry.value();
            out.insert(
                entry.key().clone(),
                PromptMetrics {
                    calls: counters.calls.load(Ordering::Relaxed),
                    retries: counters.retries.load(Ordering::Relaxed),
                    failures: counters.failures.load(Ordering::Relaxed),
                    repaired: counters.repaired.load(Ordering::Relaxed),
                    prompt_tokens: counters.prompt_tokens.load(Ordering::Relaxed),
                    completion_tokens: counters.completion_tokens.load(Ordering::Relaxed),
                },
            );
        }
        out
    }
}
