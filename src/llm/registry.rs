//! Prompt Registry
//!
//! Prompts are addressed by stable keys (`taxonomy.extract`,
//! `taxonomy.verify_single_token`, `taxonomy.disambiguate`,
//! `taxonomy.validate_entailment`) with versioned variants. The registry
//! resolves a key to its active version, template and expected response
//! shape; active versions are captured into the run manifest.
//!
//! Templates use `{name}` placeholders substituted from the call variables.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{Result, TaxonomyError};

// =============================================================================
// Entries
// =============================================================================

/// Expected top-level shape of a prompt's JSON response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind")]
pub enum ResponseShape {
    /// An array of objects, each carrying the required fields.
    Array { required_fields: Vec<String> },
    /// A single object carrying the required fields.
    Object { required_fields: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptEntry {
    pub active_version: String,
    pub template: String,
    pub shape: ResponseShape,
    /// When set, array responses are sorted by this field for determinism.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enforce_order_by: Option<String>,
    /// Repair variant appended when the first response fails validation.
    #[serde(default = "default_repair_instruction")]
    pub repair_instruction: String,
}

fn default_repair_instruction() -> String {
    "The previous response was not valid JSON for the expected schema. \
     Respond again with ONLY the corrected JSON."
        .to_string()
}

// =============================================================================
// Registry
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptRegistry {
    prompts: BTreeMap<String, PromptEntry>,
}

impl Default for PromptRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PromptRegistry {
    /// The built-in prompt set covering every pipeline call site.
    pub fn builtin() -> Self {
        let mut prompts = BTreeMap::new();
        prompts.insert(
            "taxonomy.extract".to_string(),
            PromptEntry {
                active_version: "v1".to_string(),
                template: "You extract academic unit labels for a taxonomy.\n\
                           Institution: {institution}\nLevel: {level}\n\
                           Source text:\n{source_text}\n\
                           Return a JSON array of objects with fields \
                           label, normalized, aliases, parents."
                    .to_string(),
                shape: ResponseShape::Array {
                    required_fields: vec!["label".into(), "normalized".into()],
                },
                enforce_order_by: Some("normalized".to_string()),
                repair_instruction: default_repair_instruction(),
            },
        );
        prompts.insert(
            "taxonomy.verify_single_token".to_string(),
            PromptEntry {
                active_version: "v1".to_string(),
                template: "Decide whether '{label}' (level {level}) is a valid \
                           single-concept academic label. Return JSON with \
                           fields pass (bool) and reason (string)."
                    .to_string(),
                shape: ResponseShape::Object {
                    required_fields: vec!["pass".into(), "reason".into()],
                },
                enforce_order_by: None,
                repair_instruction: default_repair_instruction(),
            },
        );
        prompts.insert(
            "taxonomy.disambiguate".to_string(),
            PromptEntry {
                active_version: "v1".to_string(),
                template: "The label '{label}' (level {level}) may denote multiple \
                           senses. Contexts:\n{contexts}\n\
                           Return JSON with fields separable (bool), confidence \
                           (0..1) and senses (array of objects with label, gloss, \
                           parent_hints, evidence_indices)."
                    .to_string(),
                shape: ResponseShape::Object {
                    required_fields: vec!["separable".into(), "confidence".into(), "senses".into()],
                },
                enforce_order_by: None,
                repair_instruction: default_repair_instruction(),
            },
        );
        prompts.insert(
            "taxonomy.validate_entailment".to_string(),
            PromptEntry {
                active_version: "v1".to_string(),
                template: "Does the evidence support '{label}' as a real academic \
                           research area?\nEvidence:\n{evidence}\n\
                           Return JSON with fields validated (bool), reason \
                           (string) and confidence (0..1)."
                    .to_string(),
                shape: ResponseShape::Object {
                    required_fields: vec!["validated".into(), "confidence".into()],
                },
                enforce_order_by: None,
                repair_instruction: default_repair_instruction(),
            },
        );
        Self { prompts }
    }

    /// Load a registry from a YAML file, or fall back to the built-in set
    /// when the file does not exist.
    pub fn load_or_builtin(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::builtin());
        }
        let raw = std::fs::read_to_string(path)?;
        let registry: Self = serde_yaml::from_str(&raw)?;
        Ok(registry)
    }

    pub fn entry(&self, key: &str) -> Result<&PromptEntry> {
        self.prompts.get(key).ok_or_else(|| {
            TaxonomyError::Configuration(format!("unknown prompt key '{key}'"))
        })
    }

    pub fn active_version(&self, key: &str) -> Result<String> {
        Ok(self.entry(key)?.active_version.clone())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.prompts.keys().map(String::as_str)
    }

    /// Render the prompt template with `{name}` placeholders from variables.
    pub fn render(&self, key: &str, variables: &Value) -> Result<String> {
        let entry = self.entry(key)?;
        let mut rendered = entry.template.clone();
        if let Some(map) = variables.as_object() {
            for (name, value) in map {
                let needle = format!("{{{name}}}");
                let replacement = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                rendered = rendered.replace(&needle, &replacement);
            }
        }
        Ok(rendered)
    }
}

// =============================================================================
// Tests
// =============================================================================
