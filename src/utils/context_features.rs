//! Context Features
//!
//! Token-window context extraction around label mentions, co-occurrence
//! statistics, institution distributions, and the divergence measure that
//! drives disambiguation: a token-frequency overlap term combined with
//! parent-lineage disagreement.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::types::{Concept, SourceRecord};

// =============================================================================
// Context windows
// =============================================================================

/// A window of source text surrounding one mention of a concept label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextWindow {
    pub concept_id: String,
    pub text: String,
    pub institution: String,
    pub parent_lineage: String,
    pub source_index: usize,
}

/// Lineage key for a concept: `L{level}:{first parent}` or `L{level}:<root>`.
pub fn extract_parent_lineage_key(concept: &Concept) -> String {
    match concept.parents.first() {
        Some(parent) => format!("L{}:{}", concept.level, parent),
        None => format!("L{}:<root>", concept.level),
    }
}

/// Extract one token window per record that mentions the concept's label.
pub fn extract_context_windows(
    concept: &Concept,
    records: &[SourceRecord],
    window_size: usize,
) -> Vec<ContextWindow> {
    let label_tokens: Vec<String> = concept
        .canonical_label
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect();
    if label_tokens.is_empty() {
        return Vec::new();
    }
    let lineage = extract_parent_lineage_key(concept);

    let mut windows = Vec::new();
    for (source_index, record) in records.iter().enumerate() {
        let tokens: Vec<&str> = record.text.split_whitespace().collect();
        let lowered: Vec<String> = tokens.iter().map(|t| trim_token(t)).collect();

        let mention = lowered
            .windows(label_tokens.len())
            .position(|window| window == label_tokens.as_slice());
        if let Some(start) = mention {
            let from = start.saturating_sub(window_size);
            let to = (start + label_tokens.len() + window_size).min(tokens.len());
            windows.push(ContextWindow {
                concept_id: concept.id.clone(),
                text: tokens[from..to].join(" "),
                institution: record.provenance.institution.clone(),
                parent_lineage: lineage.clone(),
                source_index,
            });
        }
    }
    windows
}

fn trim_token(token: &str) -> String {
    token
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase()
}

// =============================================================================
// Token statistics
// =============================================================================

/// Token counts across contexts, keeping only tokens at or above the
/// frequency floor.
pub fn compute_token_cooccurrence(
    contexts: &[ContextWindow],
    min_frequency: u64,
) -> BTreeMap<String, u64> {
    let mut counts: BTreeMap<String, u64> = BTreeMap::new();
    for context in contexts {
        for token in context.text.split_whitespace() {
            let token = trim_token(token);
            if !token.is_empty() {
                *counts.entry(token).or_insert(0) += 1;
            }
        }
    }
    counts.retain(|_, count| *count >= min_frequency);
    counts
}

/// Per-concept institution counts, merged from `validation_metadata`
/// (`institution_counts` map or `institutions` list), keys lower-cased.
pub fn analyze_institution_distribution(
    concepts: &[Concept],
) -> BTreeMap<String, BTreeMap<String, u64>> {
    let mut distribution = BTreeMap::new();
    for concept in concepts {
        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        if let Some(map) = concept
            .validation_metadata
            .get("institution_counts")
            .and_then(|v| v.as_object())
        {
            for (institution, count) in map {
                *counts.entry(institution.to_lowercase()).or_insert(0) +=
                    count.as_u64().unwrap_or(0);
            }
        }
        if let Some(list) = concept
            .validation_metadata
            .get("institutions")
            .and_then(|v| v.as_array())
        {
            for institution in list.iter().filter_map(|v| v.as_str()) {
                *counts.entry(institution.to_lowercase()).or_insert(0) += 1;
            }
        }
        distribution.insert(concept.id.clone(), counts);
    }
    distribution
}

// =============================================================================
// Divergence
// =============================================================================

fn token_distribution(contexts: &[ContextWindow]) -> BTreeMap<String, f64> {
    let mut counts: BTreeMap<String, f64> = BTreeMap::new();
    let mut total = 0.0;
    for context in contexts {
        for token in context.text.split_whitespace() {
            let token = trim_token(token);
            if !token.is_empty() {
                *counts.entry(token).or_insert(0.0) += 1.0;
                total += 1.0;
            }
        }
    }
    if total > 0.0 {
        for value in counts.values_mut() {
            *value /= total;
        }
    }
    counts
}

/// Probability mass shared by the two token distributions, in `[0, 1]`.
pub fn compute_context_overlap(a: &[ContextWindow], b: &[ContextWindow]) -> f64 {
    let dist_a = token_distribution(a);
    let dist_b = token_distribution(b);
    if dist_a.is_empty() || dist_b.is_empty() {
        return 0.0;
    }
    dist_a
        .iter()
        .filter_map(|(token, p)| dist_b.get(token).map(|q| p.min(*q)))
        .sum()
}

fn lineage_disagreement(a: &[ContextWindow], b: &[ContextWindow]) -> f64 {
    let lineages_a: BTreeSet<&str> = a.iter().map(|c| c.parent_lineage.as_str()).collect();
    let lineages_b: BTreeSet<&str> = b.iter().map(|c| c.parent_lineage.as_str()).collect();
    if lineages_a.is_empty() || lineages_b.is_empty() {
        return 0.0;
    }
    let intersection = lineages_a.intersection(&lineages_b).count() as f64;
    let union = lineages_a.union(&lineages_b).count() as f64;
    1.0 - intersection / union
}

/// Combined context divergence: token-distribution divergence weighted with
/// parent-lineage disagreement. Ranges over `[0, 1]`.
pub fn compute_context_divergence(a: &[ContextWindow], b: &[ContextWindow]) -> f64 {
    let token_divergence = 1.0 - compute_context_overlap(a, b);
    let parent_divergence = lineage_disagreement(a, b);
    0.6 * token_divergence + 0.4 * parent_divergence
}

// =============================================================================
// LLM summaries
// =============================================================================

/// A context entry prepared for a disambiguation prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSummary {
    pub text: String,
    pub institution: String,
    pub parent_lineage: String,
}

/// Summarize contexts for an LLM call, suppressing duplicate texts and
/// capping the total.
pub fn summarize_contexts_for_llm(
    contexts: &[ContextWindow],
    max_contexts: usize,
) -> Vec<ContextSummary> {
    let mut seen = BTreeSet::new();
    let mut summaries = Vec::new();
    for context in contexts {
        if summaries.len() >= max_contexts {
            break;
        }
        if seen.insert(context.text.clone()) {
            summaries.push(ContextSummary {
                text: context.text.clone(),
                institution: context.institution.clone(),
                parent_lineage: context.parent_lineage.clone(),
            });
        }
    }
    summaries
}

// =============================================================================
// Tests
// =============================================================================
