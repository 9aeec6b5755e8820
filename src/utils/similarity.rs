//! Text Similarity
//!
//! Character-shingle Jaccard and MinHash similarity used for intra-page
//! near-duplicate collapse in S0. The MinHash signature hashes shingles with
//! seeded CRC32, so scores are identical across runs and platforms.

use std::collections::BTreeSet;

use crate::types::{Result, TaxonomyError};

const SHINGLE_SIZE: usize = 3;
pub const DEFAULT_MINHASH_HASHES: usize = 128;

/// Lowercase, strip punctuation, collapse whitespace.
pub fn preprocess_for_similarity(text: &str) -> String {
    let lowered: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect();
    lowered.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn shingles(text: &str) -> BTreeSet<String> {
    let processed = preprocess_for_similarity(text);
    let chars: Vec<char> = processed.chars().collect();
    if chars.is_empty() {
        return BTreeSet::new();
    }
    if chars.len() < SHINGLE_SIZE {
        return BTreeSet::from([processed]);
    }
    chars
        .windows(SHINGLE_SIZE)
        .map(|window| window.iter().collect())
        .collect()
}

/// Jaccard similarity over character shingles.
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let sa = shingles(a);
    let sb = shingles(b);
    if sa.is_empty() && sb.is_empty() {
        return 1.0;
    }
    if sa.is_empty() || sb.is_empty() {
        return 0.0;
    }
    let intersection = sa.intersection(&sb).count();
    let union = sa.union(&sb).count();
    intersection as f64 / union as f64
}

fn seeded_hash(shingle: &str, seed: u32) -> u32 {
    let mut hasher = crc32fast::Hasher::new_with_initial(seed);
    hasher.update(shingle.as_bytes());
    hasher.finalize()
}

fn minhash_signature(text: &str, num_hashes: usize) -> Option<Vec<u32>> {
    let shingle_set = shingles(text);
    if shingle_set.is_empty() {
        return None;
    }
    let mut signature = Vec::with_capacity(num_hashes);
    for seed in 0..num_hashes as u32 {
        let minimum = shingle_set
            .iter()
            .map(|s| seeded_hash(s, seed))
            .min()
            .expect("non-empty shingle set");
        signature.push(minimum);
    }
    Some(signature)
}

/// MinHash estimate of the shingle Jaccard similarity.
pub fn minhash_similarity(a: &str, b: &str, num_hashes: usize) -> f64 {
    let num_hashes = num_hashes.max(1);
    match (minhash_signature(a, num_hashes), minhash_signature(b, num_hashes)) {
        (Some(sig_a), Some(sig_b)) => {
            let matches = sig_a
                .iter()
                .zip(sig_b.iter())
                .filter(|(x, y)| x == y)
                .count();
            matches as f64 / num_hashes as f64
        }
        (None, None) => 1.0,
        _ => 0.0,
    }
}

/// Dispatch on the configured similarity method.
pub fn compute_similarity(a: &str, b: &str, method: &str, num_hashes: usize) -> Result<f64> {
    match method {
        "jaccard_shingles" | "jaccard" => Ok(jaccard_similarity(a, b)),
        "minhash" => Ok(minhash_similarity(a, b, num_hashes)),
        other => Err(TaxonomyError::Configuration(format!(
            "unknown similarity method '{other}' (expected jaccard_shingles|minhash)"
        ))),
    }
}

/// Indices of blocks that near-duplicate an earlier block. The first
/// occurrence in document order is always kept.
pub fn find_duplicates(blocks: &[String], threshold: f64, method: &str) -> Result<Vec<usize>> {
    let mut duplicates = Vec::new();
    let mut kept: Vec<usize> = Vec::new();
    for (index, block) in blocks.iter().enumerate() {
        let is_duplicate = kept
            .iter()
            .map(|&k| compute_similarity(block, &blocks[k], method, DEFAULT_MINHASH_HASHES))
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .any(|score| score >= threshold);
        if is_duplicate {
            duplicates.push(index);
        } else {
            kept.push(index);
        }
    }
    Ok(duplicates)
}

// =============================================================================
// Tests
// =============================================================================
