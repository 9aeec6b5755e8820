//! Run Manifest
//!
//! Accumulates everything a finished run reports: phase stats, artifact
//! registry, statistics, prompt versions, configuration seeds and paths, and
//! the observability export. When audit-trail generation is disabled the
//! observability payload is omitted and previously recorded manifest values
//! are preserved.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value, json};
use tracing::debug;

use crate::config::{ObservabilityPolicy, Settings};
use crate::llm::PromptRegistry;
use crate::observability::{ObservabilityContext, build_payload, stable_hash};
use crate::pipeline::artifacts::write_json;
use crate::types::Result;

use super::checkpoints::CheckpointManager;

pub struct RunManifest {
    run_id: String,
    policy: Option<ObservabilityPolicy>,
    observability: Option<Arc<ObservabilityContext>>,
    phases: BTreeMap<String, Value>,
    statistics: BTreeMap<String, Value>,
    environment: String,
    policy_version: String,
    prompt_versions: BTreeMap<String, String>,
    configuration: Map<String, Value>,
}

impl RunManifest {
    pub fn new(run_id: impl Into<String>, policy: Option<ObservabilityPolicy>) -> Self {
        Self {
            run_id: run_id.into(),
            policy,
            observability: None,
            phases: BTreeMap::new(),
            statistics: BTreeMap::new(),
            environment: String::new(),
            policy_version: String::new(),
            prompt_versions: BTreeMap::new(),
            configuration: Map::new(),
        }
    }

    pub fn attach_observability(&mut self, context: Arc<ObservabilityContext>) {
        self.observability = Some(context);
    }

    pub fn record_phase(&mut self, name: &str, stats: Value) {
        self.phases.insert(name.to_string(), stats);
    }

    pub fn record_statistic(&mut self, key: &str, value: Value) {
        self.statistics.insert(key.to_string(), value);
    }

    /// Seed the manifest's prompt-version table from the registry, also
    /// registering each version with the observability context.
    pub fn collect_prompt_versions(&mut self, registry: &PromptRegistry) -> Result<()> {
        for key in registry.keys() {
            let version = registry.active_version(key)?;
            if let Some(context) = &self.observability {
                context.register_prompt_version(key, &version);
            }
            self.prompt_versions.insert(key.to_string(), version);
        }
        Ok(())
    }

    /// Capture seeds, paths and the governing thresholds from settings.
    pub fn capture_configuration(&mut self, settings: &Settings) {
        self.environment = settings.environment.to_string();
        self.policy_version = settings.policies.policy_version.clone();

        let seeds = json!({
            "settings.random_seed": settings.random_seed,
            "llm.random_seed": settings.policies.llm.random_seed,
            "observability.sampling_seed":
                settings.policies.observability.deterministic_sampling_seed,
        });
        let paths = json!({
            "data_dir": settings.paths.data_dir,
            "output_dir": settings.paths.output_dir,
            "cache_dir": settings.paths.cache_dir,
            "logs_dir": settings.paths.logs_dir,
            "metadata_dir": settings.paths.metadata_dir,
        });
        self.configuration.insert("seeds".into(), seeds.clone());
        self.configuration.insert("paths".into(), paths);

        if let Some(context) = &self.observability {
            if let Some(seed_map) = seeds.as_object() {
                for (name, value) in seed_map {
                    context.register_seed(name, value.clone());
                }
            }
            for (name, threshold) in [
                ("level_0", &settings.policies.level_thresholds.level_0),
                ("level_1", &settings.policies.level_thresholds.level_1),
                ("level_2", &settings.policies.level_thresholds.level_2),
                ("level_3", &settings.policies.level_thresholds.level_3),
            ] {
                context.register_threshold(
                    &format!("level_thresholds.{name}"),
                    serde_json::to_value(threshold).unwrap_or(Value::Null),
                );
            }
            context.register_threshold(
                "deduplication.thresholds.l0_l1",
                json!(settings.policies.deduplication.thresholds.l0_l1),
            );
            context.register_threshold(
                "deduplication.thresholds.l2_l3",
                json!(settings.policies.deduplication.thresholds.l2_l3),
            );
        }
    }

    fn audit_enabled(&self) -> bool {
        let manifest_side = self
            .policy
            .as_ref()
            .map(|p| p.audit_trail_generation)
            .unwrap_or(true);
        let context_side = self
            .observability
            .as_ref()
            .map(|c| c.policy().audit_trail_generation)
            .unwrap_or(true);
        manifest_side && context_side
    }

    /// Assemble the final manifest. With audit enabled, the observability
    /// snapshot is exported to `<metadata_dir>/<run_id>.observability.json`
    /// and referenced with its checksum; otherwise previously recorded
    /// prompt versions and seeds stand as-is.
    pub fn finalize(
        &mut self,
        metadata_dir: &Path,
        checkpoints: &mut CheckpointManager,
    ) -> Result<Value> {
        let mut observability_meta = json!({});
        let mut operation_logs = Value::Array(Vec::new());
        let mut evidence_samples = json!({});

        if self.audit_enabled()
            && let Some(context) = &self.observability
        {
            let snapshot = context.snapshot();
            let payload = build_payload(&snapshot);
            let export_path: PathBuf =
                metadata_dir.join(format!("{}.observability.json", self.run_id));
            write_json(&export_path, &payload)?;
            checkpoints.record_artifact(&export_path, "observability");
            debug!(path = %export_path.display(), "observability exported");

            observability_meta = json!({
                "path": export_path
                    .canonicalize()
                    .unwrap_or(export_path)
                    .display()
                    .to_string(),
                "checksum": stable_hash(&payload),
            });
            if let Some(versions) = payload["prompt_versions"].as_object() {
                for (key, version) in versions {
                    if let Some(version) = version.as_str() {
                        self.prompt_versions.insert(key.clone(), version.to_string());
                    }
                }
            }
            self.configuration
                .insert("seeds".into(), payload["seeds"].clone());
            operation_logs = payload["operations"].clone();
            evidence_samples = payload["evidence"].clone();
        }

        let artifacts: Vec<Value> = checkpoints
            .iter_artifacts()
            .map(|a| json!({"kind": a.kind, "path": a.path}))
            .collect();

        Ok(json!({
            "run_id": self.run_id,
            "environment": self.environment,
            "policy_version": self.policy_version,
            "phases": self.phases,
            "artifacts": artifacts,
            "statistics": self.statistics,
            "prompt_versions": self.prompt_versions,
            "configuration": self.configuration,
            "observability": observability_meta,
            "operation_logs": operation_logs,
            "evidence_samples": evidence_samples,
        }))
    }
}

// =============================================================================
// Tests
// =============================================================================
