//! Run Settings
//!
//! Environment, filesystem layout, seeds, and the embedded [`Policies`]
//! document. Loaded once per process through [`super::loader::SettingsLoader`]
//! and shared immutably across phases.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::types::{Result, TaxonomyError};

use super::policies::Policies;

// =============================================================================
// Environment
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Testing,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Testing => "testing",
            Self::Production => "production",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value.to_lowercase().as_str() {
            "development" => Ok(Self::Development),
            "testing" => Ok(Self::Testing),
            "production" => Ok(Self::Production),
            other => Err(TaxonomyError::Configuration(format!(
                "unknown environment '{other}' (expected development|testing|production)"
            ))),
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Paths
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paths {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    #[serde(default = "default_logs_dir")]
    pub logs_dir: PathBuf,
    #[serde(default = "default_metadata_dir")]
    pub metadata_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(".cache")
}

fn default_logs_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_metadata_dir() -> PathBuf {
    PathBuf::from("metadata")
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            output_dir: default_output_dir(),
            cache_dir: default_cache_dir(),
            logs_dir: default_logs_dir(),
            metadata_dir: default_metadata_dir(),
        }
    }
}

impl Paths {
    pub fn all(&self) -> [&Path; 5] {
        [
            &self.data_dir,
            &self.output_dir,
            &self.cache_dir,
            &self.logs_dir,
            &self.metadata_dir,
        ]
    }
}

// =============================================================================
// Settings
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_environment")]
    pub environment: Environment,
    #[serde(default)]
    pub paths: Paths,
    #[serde(default = "default_random_seed")]
    pub random_seed: u64,
    /// Create missing directories on load.
    #[serde(default)]
    pub create_dirs: bool,
    #[serde(default)]
    pub policies: Policies,
}

fn default_environment() -> Environment {
    Environment::Development
}

fn default_random_seed() -> u64 {
    20230927
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            paths: Paths::default(),
            random_seed: default_random_seed(),
            create_dirs: false,
            policies: Policies::default(),
        }
    }
}

impl Settings {
    /// Fail-fast validation of settings and embedded policies, creating
    /// directories when `create_dirs` is set.
    pub fn validate(&self) -> Result<()> {
        for path in self.paths.all() {
            if path.as_os_str().is_empty() {
                return Err(TaxonomyError::Configuration(
                    "all configured paths must be non-empty".into(),
                ));
            }
        }
        self.policies.validate()?;
        if self.create_dirs {
            for path in self.paths.all() {
                std::fs::create_dir_all(path)?;
            }
        }
        Ok(())
    }

    /// Root directory holding all runs.
    pub fn runs_root(&self) -> PathBuf {
        self.paths.output_dir.join("runs")
    }

    /// Directory holding one run's artifacts and checkpoints.
    pub fn run_dir(&self, run_id: &str) -> PathBuf {
        self.runs_root().join(run_id)
    }
}

// =============================================================================
// Tests
// =============================================================================
