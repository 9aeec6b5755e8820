//! Shared pure utilities: label normalization, text similarity, phonetic
//! keys and context features. Everything here is a deterministic function of
//! its inputs and policy.

pub mod context_features;
pub mod normalization;
pub mod phonetic;
pub mod similarity;

pub use context_features::{
    ContextSummary, ContextWindow, analyze_institution_distribution, compute_context_divergence,
    compute_context_overlap, compute_token_cooccurrence, extract_context_windows,
    extract_parent_lineage_key, summarize_contexts_for_llm,
};
pub use normalization::{
    BoilerplateOutcome, detect_acronyms, expand_acronym, minimal_canonical_form,
    remove_boilerplate, strip_institution_prefix, to_canonical_form,
};
pub use phonetic::{
    bucket_by_phonetic, double_metaphone, generate_phonetic_key, normalize_for_phonetic,
    phonetic_bucket_keys,
};
pub use similarity::{
    DEFAULT_MINHASH_HASHES, compute_similarity, find_duplicates, jaccard_similarity,
    minhash_similarity, preprocess_for_similarity,
};
