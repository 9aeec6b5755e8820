//! Label Normalization
//!
//! Turns raw extracted labels into minimal canonical forms: boilerplate
//! removal ("Department of …"), acronym detection and controlled expansion,
//! institution-prefix stripping, diacritic folding, punctuation stripping
//! and whitespace collapse. Every transformation that loses surface form
//! records the original as an alias.

use regex::Regex;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use crate::config::LabelPolicy;

// =============================================================================
// Boilerplate removal
// =============================================================================

/// Result of stripping organizational boilerplate from a label.
#[derive(Debug, Clone, PartialEq)]
pub struct BoilerplateOutcome {
    pub cleaned: String,
    pub aliases: Vec<String>,
}

const UNIT_PREFIXES: [&str; 10] = [
    "department of ",
    "school of ",
    "college of ",
    "institute of ",
    "institute for ",
    "center for ",
    "center of ",
    "division of ",
    "program in ",
    "laboratory for ",
];

/// Strip leading organizational-unit boilerplate and policy patterns. The
/// original label is preserved as an alias whenever anything was removed.
pub fn remove_boilerplate(label: &str, _level: u8, policy: &LabelPolicy) -> BoilerplateOutcome {
    let mut cleaned = label.trim().to_string();
    let mut aliases = Vec::new();

    let lowered = cleaned.to_lowercase();
    for prefix in UNIT_PREFIXES {
        if lowered.starts_with(prefix) {
            cleaned = cleaned[prefix.len()..].trim().to_string();
            break;
        }
    }

    for pattern in &policy.minimal_canonical_form.boilerplate_patterns {
        if let Ok(re) = Regex::new(&format!("(?i){pattern}")) {
            cleaned = re.replace_all(&cleaned, "").trim().to_string();
        }
    }

    if cleaned != label.trim() && !label.trim().is_empty() {
        aliases.push(label.trim().to_string());
    }
    if cleaned.is_empty() {
        cleaned = label.trim().to_string();
        aliases.clear();
    }
    BoilerplateOutcome { cleaned, aliases }
}

// =============================================================================
// Acronyms
// =============================================================================

/// Detect parenthesized or standalone uppercase acronyms, in order of first
/// appearance.
pub fn detect_acronyms(text: &str) -> Vec<String> {
    let mut found = Vec::new();
    for raw in text.split_whitespace() {
        let token = raw.trim_matches(|c: char| !c.is_alphanumeric());
        if token.len() >= 2
            && token.len() <= 6
            && token.chars().all(|c| c.is_ascii_uppercase())
            && !found.iter().any(|f| f == token)
        {
            found.push(token.to_string());
        }
    }
    found
}

struct AcronymEntry {
    acronym: &'static str,
    expansion: &'static str,
    levels: &'static [u8],
    ambiguous: bool,
}

/// Controlled expansion map. Ambiguous entries only expand with supporting
/// context or an explicit policy opt-in.
const ACRONYM_TABLE: [AcronymEntry; 8] = [
    AcronymEntry {
        acronym: "EECS",
        expansion: "electrical engineering and computer science",
        levels: &[0, 1],
        ambiguous: false,
    },
    AcronymEntry {
        acronym: "ECE",
        expansion: "electrical and computer engineering",
        levels: &[0, 1],
        ambiguous: false,
    },
    AcronymEntry {
        acronym: "NLP",
        expansion: "natural language processing",
        levels: &[1, 2, 3],
        ambiguous: false,
    },
    AcronymEntry {
        acronym: "HCI",
        expansion: "human computer interaction",
        levels: &[1, 2, 3],
        ambiguous: false,
    },
    AcronymEntry {
        acronym: "AI",
        expansion: "artificial intelligence",
        levels: &[1, 2, 3],
        ambiguous: true,
    },
    AcronymEntry {
        acronym: "ML",
        expansion: "machine learning",
        levels: &[1, 2, 3],
        ambiguous: true,
    },
    AcronymEntry {
        acronym: "CS",
        expansion: "computer science",
        levels: &[0, 1, 2],
        ambiguous: true,
    },
    AcronymEntry {
        acronym: "CV",
        expansion: "computer vision",
        levels: &[2, 3],
        ambiguous: true,
    },
];

/// Expand a known acronym, gated by level and ambiguity policy.
pub fn expand_acronym(
    acronym: &str,
    level: u8,
    context: Option<&str>,
    policy: &LabelPolicy,
) -> Option<String> {
    let entry = ACRONYM_TABLE
        .iter()
        .find(|entry| entry.acronym.eq_ignore_ascii_case(acronym))?;
    if !entry.levels.contains(&level) {
        return None;
    }
    if entry.ambiguous && !policy.include_ambiguous_acronyms {
        let supported = context
            .map(|ctx| ctx.to_lowercase().contains(entry.expansion))
            .unwrap_or(false);
        if !supported {
            return None;
        }
    }
    Some(entry.expansion.to_string())
}

// =============================================================================
// Institution prefix
// =============================================================================

/// Strip the owning institution when it occurs at the head of a label, so
/// level-0 labels do not repeat the institution name.
pub fn strip_institution_prefix(label: &str, institution: &str) -> Option<String> {
    let institution = institution.trim();
    if institution.is_empty() {
        return None;
    }
    let trimmed = label.trim();
    let lowered = trimmed.to_lowercase();
    if !lowered.starts_with(&institution.to_lowercase())
        || !trimmed.is_char_boundary(institution.len())
    {
        return None;
    }
    let remainder = trimmed[institution.len()..]
        .trim_start_matches([' ', ':', '-', '–', ','])
        .trim();
    if remainder.is_empty() {
        None
    } else {
        Some(remainder.to_string())
    }
}

// =============================================================================
// Canonical form
// =============================================================================

/// Apply the full normalization chain and collect aliases produced along
/// the way. Returns `(normalized, aliases)`; the normalized form itself is
/// never listed among the aliases.
pub fn to_canonical_form(label: &str, level: u8, policy: &LabelPolicy) -> (String, Vec<String>) {
    let original = label.trim().to_string();
    let mut aliases: Vec<String> = Vec::new();

    // Pull parenthesized acronyms out before they become punctuation noise.
    let acronyms = detect_acronyms(&original);
    let paren_re = Regex::new(r"\s*\([^)]*\)").expect("static regex");
    let mut working = paren_re.replace_all(&original, "").trim().to_string();
    if working != original {
        aliases.push(original.clone());
    }
    for acronym in &acronyms {
        aliases.push(acronym.clone());
        if let Some(expansion) = expand_acronym(acronym, level, Some(&original), policy) {
            aliases.push(expansion);
        }
    }

    let boilerplate = remove_boilerplate(&working, level, policy);
    for alias in boilerplate.aliases {
        aliases.push(alias);
    }
    working = boilerplate.cleaned;

    // A bare known acronym normalizes to its expansion when policy allows.
    if working.chars().all(|c| c.is_ascii_uppercase()) && working.len() <= 6
        && let Some(expansion) = expand_acronym(&working, level, Some(&original), policy)
    {
        aliases.push(working.clone());
        working = expansion;
    }

    let normalized = minimal_canonical_form(&working, policy);

    if !aliases.iter().any(|a| a == &original) && original != normalized {
        aliases.insert(0, original);
    }
    let normalized_folded = normalized.to_lowercase();
    aliases.retain(|alias| alias.to_lowercase() != normalized_folded);
    aliases.dedup();
    (normalized, aliases)
}

/// The minimal-canonical-form projection alone: case folding, diacritic
/// folding, punctuation stripping, whitespace collapse and length bounds.
pub fn minimal_canonical_form(label: &str, policy: &LabelPolicy) -> String {
    let form = &policy.minimal_canonical_form;
    let mut text = label.trim().to_string();

    if form.fold_diacritics {
        text = text.nfd().filter(|c| !is_combining_mark(*c)).collect();
    }
    if form.case == "lower" {
        text = text.to_lowercase();
    }
    if form.remove_punctuation {
        text = text
            .chars()
            .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
            .collect();
    }
    if form.collapse_whitespace {
        text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    }
    if text.chars().count() > form.max_length {
        text = text.chars().take(form.max_length).collect::<String>();
        text = text.trim_end().to_string();
    }
    text
}

// =============================================================================
// Tests
// =============================================================================
