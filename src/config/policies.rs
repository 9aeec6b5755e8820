//! Policy Document
//!
//! The declarative configuration governing every threshold, rule and toggle
//! in the pipeline. Each policy group maps to the stage it steers; all of it
//! deserializes from the layered figment stack in [`crate::config::loader`].
//!
//! Policies are loaded once per process and treated as immutable afterwards.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{Result, TaxonomyError};

// =============================================================================
// Level Thresholds (S2)
// =============================================================================

/// Frequency gate for one hierarchy level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelThreshold {
    pub min_institutions: u64,
    pub min_src_count: u64,
    /// Human-readable representation of the weighting rule.
    #[serde(default = "default_weight_formula")]
    pub weight_formula: String,
}

fn default_weight_formula() -> String {
    "1.0*inst_count + 0.3*log(1+src_count)".to_string()
}

impl LevelThreshold {
    pub fn new(min_institutions: u64, min_src_count: u64) -> Self {
        Self {
            min_institutions,
            min_src_count,
            weight_formula: default_weight_formula(),
        }
    }

    /// Evidence weight used to order kept candidates.
    pub fn weight(&self, institutions: u64, records: u64) -> f64 {
        institutions as f64 + 0.3 * (1.0 + records as f64).ln()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelThresholds {
    pub level_0: LevelThreshold,
    pub level_1: LevelThreshold,
    pub level_2: LevelThreshold,
    pub level_3: LevelThreshold,
}

impl LevelThresholds {
    pub fn for_level(&self, level: u8) -> &LevelThreshold {
        match level {
            0 => &self.level_0,
            1 => &self.level_1,
            2 => &self.level_2,
            _ => &self.level_3,
        }
    }
}

impl Default for LevelThresholds {
    fn default() -> Self {
        Self {
            level_0: LevelThreshold::new(1, 1),
            level_1: LevelThreshold::new(1, 1),
            level_2: LevelThreshold::new(2, 2),
            level_3: LevelThreshold::new(2, 3),
        }
    }
}

// =============================================================================
// Frequency Filtering (S2)
// =============================================================================

/// Settings controlling collapse of near-identical records per institution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearDuplicatePolicy {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Delimiters indicating suffixes to strip when computing dedup keys.
    #[serde(default = "default_prefix_delimiters")]
    pub prefix_delimiters: Vec<String>,
    #[serde(default = "default_true")]
    pub strip_numeric_suffix: bool,
    /// Minimum prefix length required before a delimiter is meaningful.
    #[serde(default = "default_min_prefix_length")]
    pub min_prefix_length: usize,
}

fn default_prefix_delimiters() -> Vec<String> {
    vec!["::".into(), "#".into(), "@".into()]
}

fn default_min_prefix_length() -> usize {
    6
}

impl Default for NearDuplicatePolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            prefix_delimiters: default_prefix_delimiters(),
            strip_numeric_suffix: true,
            min_prefix_length: default_min_prefix_length(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencyFilteringPolicy {
    /// Placeholder identity used when evidence lacks institution metadata.
    #[serde(default = "default_unknown_institution")]
    pub unknown_institution_placeholder: String,
    #[serde(default)]
    pub near_duplicate: NearDuplicatePolicy,
}

fn default_unknown_institution() -> String {
    "placeholder::unknown".to_string()
}

impl Default for FrequencyFilteringPolicy {
    fn default() -> Self {
        Self {
            unknown_institution_placeholder: default_unknown_institution(),
            near_duplicate: NearDuplicatePolicy::default(),
        }
    }
}

// =============================================================================
// Label Policy (S1 normalization)
// =============================================================================

/// Normalization rules for canonical labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinimalCanonicalForm {
    #[serde(default = "default_case")]
    pub case: String,
    #[serde(default = "default_true")]
    pub remove_punctuation: bool,
    #[serde(default = "default_true")]
    pub fold_diacritics: bool,
    #[serde(default = "default_true")]
    pub collapse_whitespace: bool,
    #[serde(default = "default_min_label_length")]
    pub min_length: usize,
    #[serde(default = "default_max_label_length")]
    pub max_length: usize,
    #[serde(default)]
    pub boilerplate_patterns: Vec<String>,
}

fn default_case() -> String {
    "lower".to_string()
}

fn default_min_label_length() -> usize {
    2
}

fn default_max_label_length() -> usize {
    64
}

impl Default for MinimalCanonicalForm {
    fn default() -> Self {
        Self {
            case: default_case(),
            remove_punctuation: true,
            fold_diacritics: true,
            collapse_whitespace: true,
            min_length: default_min_label_length(),
            max_length: default_max_label_length(),
            boilerplate_patterns: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelPolicy {
    #[serde(default)]
    pub minimal_canonical_form: MinimalCanonicalForm,
    /// Minimum similarity score for fuzzy parent matching.
    #[serde(default = "default_parent_similarity_cutoff")]
    pub parent_similarity_cutoff: f64,
    /// Whether ambiguous acronym expansions (e.g. AI) may be emitted.
    #[serde(default)]
    pub include_ambiguous_acronyms: bool,
}

fn default_parent_similarity_cutoff() -> f64 {
    0.86
}

impl Default for LabelPolicy {
    fn default() -> Self {
        Self {
            minimal_canonical_form: MinimalCanonicalForm::default(),
            parent_similarity_cutoff: default_parent_similarity_cutoff(),
            include_ambiguous_acronyms: false,
        }
    }
}

// =============================================================================
// Single-Token Verification (S3)
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingleTokenPolicy {
    /// Keys are level numbers; kept as strings so every configuration layer
    /// (YAML, env vars, overrides) round-trips them identically.
    #[serde(default = "default_max_tokens_per_level")]
    pub max_tokens_per_level: BTreeMap<String, usize>,
    #[serde(default = "default_forbidden_punctuation")]
    pub forbidden_punctuation: Vec<String>,
    #[serde(default = "default_allowlist")]
    pub allowlist: Vec<String>,
    #[serde(default = "default_venue_names")]
    pub venue_names: Vec<String>,
    #[serde(default = "default_true")]
    pub venue_names_forbidden: bool,
    #[serde(default)]
    pub hyphenated_compounds_allowed: bool,
    #[serde(default = "default_true")]
    pub prefer_rule_over_llm: bool,
}

fn default_max_tokens_per_level() -> BTreeMap<String, usize> {
    BTreeMap::from([
        ("0".to_string(), 2),
        ("1".to_string(), 2),
        ("2".to_string(), 3),
        ("3".to_string(), 2),
    ])
}

fn default_forbidden_punctuation() -> Vec<String> {
    ["-", "_", ".", "/", ":"].map(String::from).to_vec()
}

fn default_allowlist() -> Vec<String> {
    [
        "computer vision",
        "machine learning",
        "natural language processing",
        "artificial intelligence",
        "data science",
    ]
    .map(String::from)
    .to_vec()
}

fn default_venue_names() -> Vec<String> {
    [
        "neurips",
        "neural information processing systems",
        "icml",
        "international conference on machine learning",
        "cvpr",
        "computer vision and pattern recognition",
        "acl",
        "association for computational linguistics",
        "emnlp",
        "kdd",
        "siggraph",
        "isca",
    ]
    .map(String::from)
    .to_vec()
}

impl SingleTokenPolicy {
    pub fn max_tokens(&self, level: u8) -> usize {
        self.max_tokens_per_level
            .get(&level.to_string())
            .copied()
            .unwrap_or(3)
    }
}

impl Default for SingleTokenPolicy {
    fn default() -> Self {
        Self {
            max_tokens_per_level: default_max_tokens_per_level(),
            forbidden_punctuation: default_forbidden_punctuation(),
            allowlist: default_allowlist(),
            venue_names: default_venue_names(),
            venue_names_forbidden: true,
            hyphenated_compounds_allowed: false,
            prefer_rule_over_llm: true,
        }
    }
}

// =============================================================================
// Institution Identity
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstitutionPolicy {
    /// `prefer-campus` keeps campus identities; `prefer-system` folds
    /// "X, Campus" into the system identity "X".
    #[serde(default = "default_campus_vs_system")]
    pub campus_vs_system: String,
    #[serde(default)]
    pub canonical_mappings: BTreeMap<String, String>,
}

fn default_campus_vs_system() -> String {
    "prefer-campus".to_string()
}

impl Default for InstitutionPolicy {
    fn default() -> Self {
        Self {
            campus_vs_system: default_campus_vs_system(),
            canonical_mappings: BTreeMap::new(),
        }
    }
}

// =============================================================================
// Validation
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleValidationSettings {
    #[serde(default)]
    pub forbidden_patterns: Vec<String>,
    /// Keys are level numbers, kept as strings for configuration-layer
    /// round-tripping.
    #[serde(default)]
    pub required_vocabularies: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub venue_patterns: Vec<String>,
    #[serde(default = "default_true")]
    pub structural_checks_enabled: bool,
    #[serde(default)]
    pub venue_detection_hard: bool,
}

impl Default for RuleValidationSettings {
    fn default() -> Self {
        Self {
            forbidden_patterns: Vec::new(),
            required_vocabularies: BTreeMap::new(),
            venue_patterns: Vec::new(),
            structural_checks_enabled: true,
            venue_detection_hard: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebValidationSettings {
    #[serde(default)]
    pub authoritative_domains: Vec<String>,
    #[serde(default = "default_snippet_max_length")]
    pub snippet_max_length: usize,
    #[serde(default = "default_min_snippet_matches")]
    pub min_snippet_matches: usize,
    #[serde(default = "default_evidence_timeout")]
    pub evidence_timeout_seconds: f64,
}

fn default_snippet_max_length() -> usize {
    200
}

fn default_min_snippet_matches() -> usize {
    1
}

fn default_evidence_timeout() -> f64 {
    10.0
}

impl Default for WebValidationSettings {
    fn default() -> Self {
        Self {
            authoritative_domains: Vec::new(),
            snippet_max_length: default_snippet_max_length(),
            min_snippet_matches: default_min_snippet_matches(),
            evidence_timeout_seconds: default_evidence_timeout(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmValidationSettings {
    #[serde(default = "default_true")]
    pub entailment_enabled: bool,
    #[serde(default = "default_max_evidence_tokens")]
    pub max_evidence_tokens: usize,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
}

fn default_max_evidence_tokens() -> usize {
    1000
}

fn default_confidence_threshold() -> f64 {
    0.7
}

impl Default for LlmValidationSettings {
    fn default() -> Self {
        Self {
            entailment_enabled: true,
            max_evidence_tokens: default_max_evidence_tokens(),
            confidence_threshold: default_confidence_threshold(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationAggregationSettings {
    #[serde(default = "default_rule_weight")]
    pub rule_weight: f64,
    #[serde(default = "default_web_weight")]
    pub web_weight: f64,
    #[serde(default = "default_llm_weight")]
    pub llm_weight: f64,
    #[serde(default = "default_true")]
    pub hard_rule_failure_blocks: bool,
    #[serde(default = "default_true")]
    pub tie_break_conservative: bool,
}

fn default_rule_weight() -> f64 {
    1.0
}

fn default_web_weight() -> f64 {
    0.7
}

fn default_llm_weight() -> f64 {
    0.4
}

impl Default for ValidationAggregationSettings {
    fn default() -> Self {
        Self {
            rule_weight: default_rule_weight(),
            web_weight: default_web_weight(),
            llm_weight: default_llm_weight(),
            hard_rule_failure_blocks: true,
            tie_break_conservative: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceStorageSettings {
    #[serde(default = "default_max_snippets")]
    pub max_snippets_per_concept: usize,
    #[serde(default = "default_true")]
    pub store_evidence_urls: bool,
}

fn default_max_snippets() -> usize {
    3
}

impl Default for EvidenceStorageSettings {
    fn default() -> Self {
        Self {
            max_snippets_per_concept: default_max_snippets(),
            store_evidence_urls: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationPolicy {
    #[serde(default)]
    pub rules: RuleValidationSettings,
    #[serde(default)]
    pub web: WebValidationSettings,
    #[serde(default)]
    pub llm: LlmValidationSettings,
    #[serde(default)]
    pub aggregation: ValidationAggregationSettings,
    #[serde(default)]
    pub evidence: EvidenceStorageSettings,
}

// =============================================================================
// Deduplication
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeduplicationThresholds {
    #[serde(default = "default_l0_l1_threshold")]
    pub l0_l1: f64,
    #[serde(default = "default_l2_l3_threshold")]
    pub l2_l3: f64,
}

fn default_l0_l1_threshold() -> f64 {
    0.93
}

fn default_l2_l3_threshold() -> f64 {
    0.90
}

impl Default for DeduplicationThresholds {
    fn default() -> Self {
        Self {
            l0_l1: default_l0_l1_threshold(),
            l2_l3: default_l2_l3_threshold(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeduplicationPolicy {
    #[serde(default)]
    pub thresholds: DeduplicationThresholds,
    #[serde(default = "default_merge_policy")]
    pub merge_policy: String,
    /// Prefix blocking key length.
    #[serde(default = "default_blocking_prefix_length")]
    pub prefix_length: usize,
    /// Pairs whose phonetic-key similarity falls below this are skipped
    /// before full scoring.
    #[serde(default = "default_phonetic_probe_threshold")]
    pub phonetic_probe_threshold: f64,
    #[serde(default = "default_jaro_winkler_weight")]
    pub jaro_winkler_weight: f64,
    #[serde(default = "default_token_jaccard_weight")]
    pub token_jaccard_weight: f64,
    #[serde(default = "default_abbrev_score_weight")]
    pub abbrev_score_weight: f64,
    #[serde(default = "default_suffix_prefix_weight")]
    pub suffix_prefix_weight: f64,
}

fn default_merge_policy() -> String {
    "conservative".to_string()
}

fn default_blocking_prefix_length() -> usize {
    4
}

fn default_phonetic_probe_threshold() -> f64 {
    0.35
}

fn default_jaro_winkler_weight() -> f64 {
    0.45
}

fn default_token_jaccard_weight() -> f64 {
    0.35
}

fn default_abbrev_score_weight() -> f64 {
    0.15
}

fn default_suffix_prefix_weight() -> f64 {
    0.05
}

impl DeduplicationPolicy {
    /// Merge threshold for the level band containing `level`.
    pub fn threshold_for_level(&self, level: u8) -> f64 {
        if level <= 1 {
            self.thresholds.l0_l1
        } else {
            self.thresholds.l2_l3
        }
    }
}

impl Default for DeduplicationPolicy {
    fn default() -> Self {
        Self {
            thresholds: DeduplicationThresholds::default(),
            merge_policy: default_merge_policy(),
            prefix_length: default_blocking_prefix_length(),
            phonetic_probe_threshold: default_phonetic_probe_threshold(),
            jaro_winkler_weight: default_jaro_winkler_weight(),
            token_jaccard_weight: default_token_jaccard_weight(),
            abbrev_score_weight: default_abbrev_score_weight(),
            suffix_prefix_weight: default_suffix_prefix_weight(),
        }
    }
}

// =============================================================================
// Disambiguation
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisambiguationPolicy {
    /// Collisions whose context overlap falls below this are ambiguity
    /// candidates.
    #[serde(default = "default_context_overlap_threshold")]
    pub min_context_overlap_threshold: f64,
    /// Minimum combined divergence before the LLM is consulted.
    #[serde(default = "default_divergence_threshold")]
    pub divergence_threshold: f64,
    #[serde(default = "default_min_split_confidence")]
    pub min_split_confidence: f64,
    #[serde(default = "default_context_window_size")]
    pub context_window_size: usize,
    #[serde(default = "default_max_contexts_for_llm")]
    pub max_contexts_for_llm: usize,
}

fn default_context_overlap_threshold() -> f64 {
    0.6
}

fn default_divergence_threshold() -> f64 {
    0.5
}

fn default_min_split_confidence() -> f64 {
    0.7
}

fn default_context_window_size() -> usize {
    12
}

fn default_max_contexts_for_llm() -> usize {
    8
}

impl Default for DisambiguationPolicy {
    fn default() -> Self {
        Self {
            min_context_overlap_threshold: default_context_overlap_threshold(),
            divergence_threshold: default_divergence_threshold(),
            min_split_confidence: default_min_split_confidence(),
            context_window_size: default_context_window_size(),
            max_contexts_for_llm: default_max_contexts_for_llm(),
        }
    }
}

// =============================================================================
// Raw Extraction (S0)
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawExtractionPolicy {
    #[serde(default = "default_true")]
    pub segment_on_headers: bool,
    #[serde(default = "default_true")]
    pub segment_on_lists: bool,
    #[serde(default = "default_true")]
    pub segment_on_tables: bool,
    #[serde(default = "default_min_chars")]
    pub min_chars: usize,
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    /// Pages in another language are skipped unless set to "any".
    #[serde(default = "default_target_language")]
    pub target_language: String,
    #[serde(default = "default_language_confidence_threshold")]
    pub language_confidence_threshold: f64,
    #[serde(default = "default_true")]
    pub require_language_confidence: bool,
    #[serde(default = "default_true")]
    pub intra_page_dedup_enabled: bool,
    #[serde(default = "default_s0_similarity_threshold")]
    pub similarity_threshold: f64,
    #[serde(default = "default_similarity_method")]
    pub similarity_method: String,
    #[serde(default = "default_true")]
    pub remove_boilerplate: bool,
    #[serde(default = "default_boilerplate_patterns")]
    pub boilerplate_patterns: Vec<String>,
    #[serde(default = "default_true")]
    pub detect_sections: bool,
    #[serde(default = "default_section_header_patterns")]
    pub section_header_patterns: Vec<String>,
}

fn default_min_chars() -> usize {
    12
}

fn default_max_chars() -> usize {
    2000
}

fn default_target_language() -> String {
    "en".to_string()
}

fn default_language_confidence_threshold() -> f64 {
    0.8
}

fn default_s0_similarity_threshold() -> f64 {
    0.95
}

fn default_similarity_method() -> String {
    "jaccard_shingles".to_string()
}

fn default_boilerplate_patterns() -> Vec<String> {
    [
        r"©\s*\d{4}",
        r"Â©\s*\d{4}",
        "all rights reserved",
        "privacy policy",
        "terms of use",
        "contact us",
        r"home \| about \| contact",
    ]
    .map(String::from)
    .to_vec()
}

fn default_section_header_patterns() -> Vec<String> {
    [
        r"^[A-Z][A-Z\s]{2,50}:?$",
        r"^#{1,6}\s+.+$",
        r"^\d+\.\s+[A-Z].+$",
    ]
    .map(String::from)
    .to_vec()
}

impl Default for RawExtractionPolicy {
    fn default() -> Self {
        Self {
            segment_on_headers: true,
            segment_on_lists: true,
            segment_on_tables: true,
            min_chars: default_min_chars(),
            max_chars: default_max_chars(),
            target_language: default_target_language(),
            language_confidence_threshold: default_language_confidence_threshold(),
            require_language_confidence: true,
            intra_page_dedup_enabled: true,
            similarity_threshold: default_s0_similarity_threshold(),
            similarity_method: default_similarity_method(),
            remove_boilerplate: true,
            boilerplate_patterns: default_boilerplate_patterns(),
            detect_sections: true,
            section_header_patterns: default_section_header_patterns(),
        }
    }
}

// =============================================================================
// LLM Determinism
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderProfileSettings {
    pub provider: String,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrySettings {
    #[serde(default = "default_registry_file")]
    pub file: String,
    #[serde(default = "default_prompts_root")]
    pub templates_root: String,
    #[serde(default = "default_prompts_root")]
    pub schema_root: String,
}

fn default_registry_file() -> String {
    "prompts/registry.yaml".to_string()
}

fn default_prompts_root() -> String {
    "prompts".to_string()
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            file: default_registry_file(),
            templates_root: default_prompts_root(),
            schema_root: default_prompts_root(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairSettings {
    #[serde(default = "default_quarantine_after_attempts")]
    pub quarantine_after_attempts: u32,
}

fn default_quarantine_after_attempts() -> u32 {
    3
}

impl Default for RepairSettings {
    fn default() -> Self {
        Self {
            quarantine_after_attempts: default_quarantine_after_attempts(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmPolicy {
    #[serde(default)]
    pub temperature: f64,
    #[serde(default = "default_top_p")]
    pub nucleus_top_p: f64,
    #[serde(default = "default_true")]
    pub json_mode: bool,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_seconds: f64,
    #[serde(default = "default_llm_seed")]
    pub random_seed: u64,
    #[serde(default = "default_token_budget")]
    pub token_budget: usize,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: f64,
    #[serde(default = "default_profile_name")]
    pub default_profile: String,
    #[serde(default)]
    pub profiles: BTreeMap<String, ProviderProfileSettings>,
    #[serde(default)]
    pub registry: RegistrySettings,
    #[serde(default)]
    pub repair: RepairSettings,
}

fn default_top_p() -> f64 {
    1.0
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_backoff() -> f64 {
    2.0
}

fn default_llm_seed() -> u64 {
    12345
}

fn default_token_budget() -> usize {
    4096
}

fn default_request_timeout() -> f64 {
    30.0
}

fn default_profile_name() -> String {
    "standard".to_string()
}

impl Default for LlmPolicy {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            nucleus_top_p: default_top_p(),
            json_mode: true,
            retry_attempts: default_retry_attempts(),
            retry_backoff_seconds: default_retry_backoff(),
            random_seed: default_llm_seed(),
            token_budget: default_token_budget(),
            request_timeout_seconds: default_request_timeout(),
            default_profile: default_profile_name(),
            profiles: BTreeMap::new(),
            registry: RegistrySettings::default(),
            repair: RepairSettings::default(),
        }
    }
}

// =============================================================================
// Hierarchy Assembly
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierarchyPolicy {
    /// `quarantine` or `attach_placeholder`.
    #[serde(default = "default_orphan_strategy")]
    pub orphan_strategy: String,
    #[serde(default = "default_placeholder_prefix")]
    pub placeholder_parent_prefix: String,
}

fn default_orphan_strategy() -> String {
    "quarantine".to_string()
}

fn default_placeholder_prefix() -> String {
    "placeholder::".to_string()
}

impl Default for HierarchyPolicy {
    fn default() -> Self {
        Self {
            orphan_strategy: default_orphan_strategy(),
            placeholder_parent_prefix: default_placeholder_prefix(),
        }
    }
}

// =============================================================================
// Observability
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservabilityPolicy {
    #[serde(default = "default_sampling_rate")]
    pub evidence_sampling_rate: f64,
    #[serde(default = "default_max_samples")]
    pub max_evidence_samples_per_phase: usize,
    #[serde(default = "default_sampling_seed")]
    pub deterministic_sampling_seed: u64,
    #[serde(default = "default_true")]
    pub audit_trail_generation: bool,
}

fn default_sampling_rate() -> f64 {
    1.0
}

fn default_max_samples() -> usize {
    25
}

fn default_sampling_seed() -> u64 {
    1337
}

impl Default for ObservabilityPolicy {
    fn default() -> Self {
        Self {
            evidence_sampling_rate: default_sampling_rate(),
            max_evidence_samples_per_phase: default_max_samples(),
            deterministic_sampling_seed: default_sampling_seed(),
            audit_trail_generation: true,
        }
    }
}

// =============================================================================
// Root Policy Container
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policies {
    #[serde(default = "default_policy_version")]
    pub policy_version: String,
    #[serde(default)]
    pub level_thresholds: LevelThresholds,
    #[serde(default)]
    pub frequency_filtering: FrequencyFilteringPolicy,
    #[serde(default)]
    pub label_policy: LabelPolicy,
    #[serde(default)]
    pub single_token: SingleTokenPolicy,
    #[serde(default)]
    pub institution_policy: InstitutionPolicy,
    #[serde(default)]
    pub validation: ValidationPolicy,
    #[serde(default)]
    pub deduplication: DeduplicationPolicy,
    #[serde(default)]
    pub disambiguation: DisambiguationPolicy,
    #[serde(default)]
    pub raw_extraction: RawExtractionPolicy,
    #[serde(default)]
    pub llm: LlmPolicy,
    #[serde(default)]
    pub hierarchy: HierarchyPolicy,
    #[serde(default)]
    pub observability: ObservabilityPolicy,
}

fn default_policy_version() -> String {
    "2025-09-27".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for Policies {
    fn default() -> Self {
        Self {
            policy_version: default_policy_version(),
            level_thresholds: LevelThresholds::default(),
            frequency_filtering: FrequencyFilteringPolicy::default(),
            label_policy: LabelPolicy::default(),
            single_token: SingleTokenPolicy::default(),
            institution_policy: InstitutionPolicy::default(),
            validation: ValidationPolicy::default(),
            deduplication: DeduplicationPolicy::default(),
            disambiguation: DisambiguationPolicy::default(),
            raw_extraction: RawExtractionPolicy::default(),
            llm: LlmPolicy::default(),
            hierarchy: HierarchyPolicy::default(),
            observability: ObservabilityPolicy::default(),
        }
    }
}

impl Policies {
    /// Fail-fast structural validation, run before any phase executes.
    pub fn validate(&self) -> Result<()> {
        if self.policy_version.trim().is_empty() {
            return Err(TaxonomyError::Configuration(
                "policy_version must be provided".into(),
            ));
        }
        for (name, value) in [
            ("deduplication.thresholds.l0_l1", self.deduplication.thresholds.l0_l1),
            ("deduplication.thresholds.l2_l3", self.deduplication.thresholds.l2_l3),
            (
                "raw_extraction.similarity_threshold",
                self.raw_extraction.similarity_threshold,
            ),
            (
                "observability.evidence_sampling_rate",
                self.observability.evidence_sampling_rate,
            ),
            (
                "validation.llm.confidence_threshold",
                self.validation.llm.confidence_threshold,
            ),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(TaxonomyError::Configuration(format!(
                    "{name} must lie in [0.0, 1.0], got {value}"
                )));
            }
        }
        if self.raw_extraction.max_chars < self.raw_extraction.min_chars {
            return Err(TaxonomyError::Configuration(
                "raw_extraction.max_chars must be >= min_chars".into(),
            ));
        }
        if self
            .single_token
            .max_tokens_per_level
            .values()
            .any(|limit| *limit == 0)
        {
            return Err(TaxonomyError::Configuration(
                "single_token.max_tokens_per_level values must be positive".into(),
            ));
        }
        if self
            .frequency_filtering
            .unknown_institution_placeholder
            .trim()
            .is_empty()
        {
            return Err(TaxonomyError::Configuration(
                "frequency_filtering.unknown_institution_placeholder must not be empty".into(),
            ));
        }
        match self.hierarchy.orphan_strategy.as_str() {
            "quarantine" | "attach_placeholder" => {}
            other => {
                return Err(TaxonomyError::Configuration(format!(
                    "hierarchy.orphan_strategy must be 'quarantine' or 'attach_placeholder', got '{other}'"
                )));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
