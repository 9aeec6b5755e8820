//! Settings Loader (Figment-based)
//!
//! Layered configuration resolution:
//! 1. Built-in defaults (Serialized)
//! 2. `<config_root>/<environment>.yaml`
//! 3. Environment variables: `TAXONOMY_SETTINGS__*` for settings and
//!    `TAXONOMY_POLICY__*` for policy fields, `__` as the path separator
//! 4. In-process overrides (`dotted.key=value`, values JSON-decoded when
//!    possible)
//!
//! Loading fails fast when the merged document does not validate.

use std::env;
use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Yaml},
};
use serde_json::Value;
use tracing::debug;

use crate::types::{Result, TaxonomyError};

use super::settings::{Environment, Settings};

pub const SETTINGS_ENV_PREFIX: &str = "TAXONOMY_SETTINGS__";
pub const POLICY_ENV_PREFIX: &str = "TAXONOMY_POLICY__";

/// Configuration loader.
pub struct SettingsLoader {
    environment: Option<Environment>,
    config_root: PathBuf,
    overrides: Vec<(String, Value)>,
}

impl Default for SettingsLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsLoader {
    pub fn new() -> Self {
        Self {
            environment: None,
            config_root: PathBuf::from("config"),
            overrides: Vec::new(),
        }
    }

    pub fn with_environment(mut self, environment: Option<Environment>) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_config_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config_root = root.into();
        self
    }

    /// Register a `dotted.key=value` override. The value is JSON-decoded
    /// when possible, otherwise kept as a string.
    pub fn with_override(mut self, argument: &str) -> Result<Self> {
        let (key, raw) = argument.split_once('=').ok_or_else(|| {
            TaxonomyError::Configuration(format!(
                "override '{argument}' must use dotted.key=value syntax"
            ))
        })?;
        if key.trim().is_empty() {
            return Err(TaxonomyError::Configuration(
                "override key must not be empty".into(),
            ));
        }
        let value = serde_json::from_str::<Value>(raw)
            .unwrap_or_else(|_| Value::String(raw.to_string()));
        self.overrides.push((key.trim().to_string(), value));
        Ok(self)
    }

    pub fn with_overrides<'a>(
        mut self,
        arguments: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self> {
        for argument in arguments {
            self = self.with_override(argument)?;
        }
        Ok(self)
    }

    /// Resolve the full chain and validate the result.
    pub fn load(&self) -> Result<Settings> {
        let environment = self.resolve_environment()?;

        let mut defaults = Settings::default();
        defaults.environment = environment;

        let mut figment = Figment::new().merge(Serialized::defaults(defaults));

        let environment_file = self.environment_file(environment);
        if environment_file.exists() {
            debug!(path = %environment_file.display(), "merging environment config");
            figment = figment.merge(Yaml::file(&environment_file));
        }

        figment = figment
            .merge(Env::prefixed(SETTINGS_ENV_PREFIX).split("__"))
            .merge(
                Env::prefixed(POLICY_ENV_PREFIX)
                    .map(|key| format!("policies__{}", key).into())
                    .split("__"),
            );

        for (key, value) in &self.overrides {
            figment = figment.merge(Serialized::defaults(nest_override(key, value.clone())));
        }

        let settings: Settings = figment
            .extract()
            .map_err(|e| TaxonomyError::Configuration(format!("failed to load settings: {e}")))?;

        settings.validate()?;
        Ok(settings)
    }

    fn environment_file(&self, environment: Environment) -> PathBuf {
        self.config_root.join(format!("{environment}.yaml"))
    }

    /// Environment resolution happens before the figment merge because it
    /// selects which YAML layer participates in that merge.
    fn resolve_environment(&self) -> Result<Environment> {
        if let Some(environment) = self.environment {
            return Ok(environment);
        }
        for (key, value) in &self.overrides {
            if key == "environment"
                && let Value::String(name) = value
            {
                return Environment::parse(name);
            }
        }
        if let Ok(name) = env::var(format!("{SETTINGS_ENV_PREFIX}ENVIRONMENT")) {
            return Environment::parse(&name);
        }
        Ok(Environment::Development)
    }
}

/// Convenience wrapper mirroring the common call sites.
pub fn load_settings(
    environment: Option<Environment>,
    overrides: &[String],
    config_root: Option<&Path>,
) -> Result<Settings> {
    let mut loader = SettingsLoader::new().with_environment(environment);
    if let Some(root) = config_root {
        loader = loader.with_config_root(root);
    }
    loader
        .with_overrides(overrides.iter().map(String::as_str))?
        .load()
}

/// Turn `a.b.c = value` into `{"a": {"b": {"c": value}}}` for merging.
fn nest_override(key: &str, value: Value) -> Value {
    let mut current = value;
    for segment in key.split('.').rev() {
        current = Value::Object(serde_json::Map::from_iter([(
            segment.to_string(),
            current,
        )]));
    }
    current
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn load_defaults_without_files() {
        let tmp = TempDir::new().unwrap();
        let settings = SettingsLoader::new()
            .with_config_root(tmp.path())
            .load()
            .unwrap();
        assert_eq!(settings.environment, Environment::Development);
        assert_eq!(settings.policies.level_thresholds.level_2.min_institutions, 2);
    }

    #[test]
    fn environment_yaml_layer_applies() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("testing.yaml"),
            "random_seed: 99\npolicies:\n  policy_version: \"2026-01-01\"\n",
        )
        .unwrap();

        let settings = SettingsLoader::new()
            .with_environment(Some(Environment::Testing))
            .with_config_root(tmp.path())
            .load()
            .unwrap();

        assert_eq!(settings.environment, Environment::Testing);
        assert_eq!(settings.random_seed, 99);
        assert_eq!(settings.policies.policy_version, "2026-01-01");
    }

    #[test]
    fn dotted_overrides_json_decode() {
        let tmp = TempDir::new().unwrap();
        let settings = SettingsLoader::new()
            .with_config_root(tmp.path())
            .with_override("policies.level_thresholds.level_2.min_institutions=4")
            .unwrap()
            .with_override("policies.single_token.prefer_rule_over_llm=false")
            .unwrap()
            .with_override("policies.frequency_filtering.unknown_institution_placeholder=unknown::x")
            .unwrap()
            .load()
            .unwrap();

        assert_eq!(settings.policies.level_thresholds.level_2.min_institutions, 4);
        assert!(!settings.policies.single_token.prefer_rule_over_llm);
        assert_eq!(
            settings.policies.frequency_filtering.unknown_institution_placeholder,
            "unknown::x"
        );
    }

    #[test]
    fn policy_env_variables_map_under_policies() {
        let tmp = TempDir::new().unwrap();
        // SAFETY: this test mutates process-global state and restores it.
        unsafe {
            std::env::set_var(
                "TAXONOMY_POLICY__SINGLE_TOKEN__HYPHENATED_COMPOUNDS_ALLOWED",
                "true",
            );
        }
        let settings = SettingsLoader::new()
            .with_config_root(tmp.path())
            .load()
            .unwrap();
        unsafe {
            std::env::remove_var("TAXONOMY_POLICY__SINGLE_TOKEN__HYPHENATED_COMPOUNDS_ALLOWED");
        }
        assert!(settings.policies.single_token.hyphenated_compounds_allowed);
    }

    #[test]
    fn malformed_override_fails_fast() {
        assert!(SettingsLoader::new().with_override("no-equals-sign").is_err());
    }

    #[test]
    fn invalid_policy_override_fails_validation() {
        let tmp = TempDir::new().unwrap();
        let result = SettingsLoader::new()
            .with_config_root(tmp.path())
            .with_override("policies.hierarchy.orphan_strategy=discard")
            .unwrap()
            .load();
        assert!(result.is_err());
    }

    #[test]
    fn nest_override_builds_tree() {
        let nested = nest_override("a.b.c", Value::from(3));
        assert_eq!(nested["a"]["b"]["c"], Value::from(3));
    }
}
