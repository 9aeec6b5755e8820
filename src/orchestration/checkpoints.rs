//! Checkpoint Management
//!
//! One JSON checkpoint per completed phase under the run directory, written
//! atomically so a crash never leaves a half-claimed phase. Resume reads the
//! checkpoint set and skips the completed prefix. The manager also keeps the
//! run's artifact registry for the final manifest.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use glob::glob;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use crate::pipeline::artifacts::write_json;
use crate::types::Result;

pub const CHECKPOINT_SUFFIX: &str = ".checkpoint.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub kind: String,
    pub path: String,
}

pub struct CheckpointManager {
    run_id: String,
    base_directory: PathBuf,
    artifacts: Vec<ArtifactRecord>,
}

impl CheckpointManager {
    /// Create a manager rooted at `<runs_root>/<run_id>`.
    pub fn new(run_id: impl Into<String>, runs_root: &Path) -> Result<Self> {
        let run_id = run_id.into();
        let base_directory = runs_root.join(&run_id);
        fs::create_dir_all(&base_directory)?;
        Ok(Self {
            run_id,
            base_directory,
            artifacts: Vec::new(),
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn base_directory(&self) -> &Path {
        &self.base_directory
    }

    pub fn checkpoint_path(&self, phase: &str) -> PathBuf {
        self.base_directory.join(format!("{phase}{CHECKPOINT_SUFFIX}"))
    }

    /// Persist a phase checkpoint with its status payload.
    pub fn save_phase_checkpoint(&self, phase: &str, payload: Value) -> Result<()> {
        let mut record = json!({
            "phase": phase,
            "run_id": self.run_id,
            "completed_at": Utc::now().to_rfc3339(),
        });
        if let (Some(target), Some(source)) = (record.as_object_mut(), payload.as_object()) {
            for (key, value) in source {
                target.insert(key.clone(), value.clone());
            }
        }
        write_json(&self.checkpoint_path(phase), &record)?;
        debug!(phase, "checkpoint saved");
        Ok(())
    }

    pub fn load_phase_checkpoint(&self, phase: &str) -> Result<Option<Value>> {
        let path = self.checkpoint_path(phase);
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    /// Names of phases with a checkpoint on disk.
    pub fn completed_phases(&self) -> BTreeSet<String> {
        let pattern = self
            .base_directory
            .join(format!("*{CHECKPOINT_SUFFIX}"))
            .display()
            .to_string();
        let mut completed = BTreeSet::new();
        if let Ok(entries) = glob(&pattern) {
            for path in entries.flatten() {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    completed.insert(name.trim_end_matches(CHECKPOINT_SUFFIX).to_string());
                }
            }
        }
        completed
    }

    // -------------------------------------------------------------------------
    // Artifact registry
    // -------------------------------------------------------------------------

    pub fn record_artifact(&mut self, path: &Path, kind: impl Into<String>) {
        let resolved = path
            .canonicalize()
            .unwrap_or_else(|_| path.to_path_buf())
            .display()
            .to_string();
        self.artifacts.push(ArtifactRecord {
            kind: kind.into(),
            path: resolved,
        });
    }

    pub fn iter_artifacts(&self) -> impl Iterator<Item = &ArtifactRecord> {
        self.artifacts.iter()
    }
}

// =============================================================================
// Tests
// =============================================================================
