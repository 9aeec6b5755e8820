//! Deduplication Blocking
//!
//! Caps the O(n²) comparison space by grouping concepts into candidate
//! blocks: prefix keys over the preprocessed label and phonetic bucket keys.
//! Only concepts sharing a block key are ever compared.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::DeduplicationPolicy;
use crate::types::Concept;
use crate::utils::phonetic::phonetic_bucket_keys;
use crate::utils::similarity::preprocess_for_similarity;

// =============================================================================
// Strategies
// =============================================================================

pub trait BlockingStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn keys(&self, concept: &Concept) -> Vec<String>;
}

/// Blocks on the first `prefix_length` characters of the preprocessed label.
pub struct PrefixBlocker {
    prefix_length: usize,
}

impl PrefixBlocker {
    pub fn new(policy: &DeduplicationPolicy) -> Self {
        Self {
            prefix_length: policy.prefix_length.max(1),
        }
    }
}

impl BlockingStrategy for PrefixBlocker {
    fn name(&self) -> &'static str {
        "prefix"
    }

    fn keys(&self, concept: &Concept) -> Vec<String> {
        let processed = preprocess_for_similarity(&concept.canonical_label);
        if processed.is_empty() {
            return Vec::new();
        }
        let prefix: String = processed.chars().take(self.prefix_length).collect();
        vec![prefix]
    }
}

/// Blocks on double-metaphone bucket keys.
pub struct PhoneticBlocker;

impl BlockingStrategy for PhoneticBlocker {
    fn name(&self) -> &'static str {
        "phonetic"
    }

    fn keys(&self, concept: &Concept) -> Vec<String> {
        phonetic_bucket_keys(&concept.canonical_label)
            .into_iter()
            .filter(|key| !key.is_empty())
            .collect()
    }
}

/// Blocks acronym-expansion pairs: a multi-word label shares a key with any
/// concept whose label or alias equals its initials.
pub struct AcronymBlocker;

impl BlockingStrategy for AcronymBlocker {
    fn name(&self) -> &'static str {
        "acronym"
    }

    fn keys(&self, concept: &Concept) -> Vec<String> {
        let mut keys = Vec::new();
        let processed = preprocess_for_similarity(&concept.canonical_label);
        let tokens: Vec<&str> = processed.split_whitespace().collect();
        if tokens.len() >= 2 {
            let initials: String = tokens.iter().filter_map(|t| t.chars().next()).collect();
            keys.push(initials);
        }
        for surface in std::iter::once(&concept.canonical_label).chain(concept.aliases.iter()) {
            let form = preprocess_for_similarity(surface).replace(' ', "");
            if (2..=6).contains(&form.chars().count()) {
                keys.push(form);
            }
        }
        keys.sort();
        keys.dedup();
        keys
    }
}

// =============================================================================
// Composite blocker
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockingMetrics {
    pub total_blocks: u64,
    pub strategy_counts: BTreeMap<String, u64>,
}

#[derive(Debug, Default)]
pub struct BlockOutput {
    /// block key -> indices into the input concept slice
    pub blocks: BTreeMap<String, Vec<usize>>,
    pub metrics: BlockingMetrics,
}

pub struct CompositeBlocker {
    strategies: Vec<Box<dyn BlockingStrategy>>,
}

impl CompositeBlocker {
    pub fn new(strategies: Vec<Box<dyn BlockingStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn standard(policy: &DeduplicationPolicy) -> Self {
        Self::new(vec![
            Box::new(PrefixBlocker::new(policy)),
            Box::new(PhoneticBlocker),
            Box::new(AcronymBlocker),
        ])
    }

    pub fn build_blocks(&self, concepts: &[Concept]) -> BlockOutput {
        let mut output = BlockOutput::default();
        for (index, concept) in concepts.iter().enumerate() {
            for strategy in &self.strategies {
                for key in strategy.keys(concept) {
                    let qualified = format!("{}:{key}", strategy.name());
                    output.blocks.entry(qualified).or_default().push(index);
                }
            }
        }
        output.metrics.total_blocks = output.blocks.len() as u64;
        for key in output.blocks.keys() {
            let strategy = key.split(':').next().unwrap_or_default().to_string();
            *output.metrics.strategy_counts.entry(strategy).or_insert(0) += 1;
        }
        output
    }
}

// =============================================================================
// Tests
// =============================================================================
