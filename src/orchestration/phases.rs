//! Phase Manager
//!
//! Drives the fixed phase sequence:
//!
//! ```text
//! phase1_level0 … phase1_level3 → phase2_consolidation
//!   → phase3_<post-processors…> → phase4_finalize
//! ```
//!
//! Each phase runs inside an observability scope, records its stats into the
//! manifest, and writes a checkpoint on success. Resume skips the completed
//! prefix (or everything before an explicit resume phase); a failing phase
//! writes no checkpoint so the run stays resumable. Post-processors may
//! report `changed = true` to trigger another bounded pass of the
//! post-processing chain.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{error, info};

use crate::config::Settings;
use crate::observability::ObservabilityContext;
use crate::types::{Result, TaxonomyError};

use super::checkpoints::CheckpointManager;
use super::manifest::RunManifest;

/// Bounded number of post-processing passes triggered by `changed` flags.
const MAX_POST_PASSES: usize = 3;

// =============================================================================
// Phase capability
// =============================================================================

/// Shared state handed to every phase.
pub struct RunContext {
    pub settings: Arc<Settings>,
    pub observability: Arc<ObservabilityContext>,
    pub run_dir: PathBuf,
    /// Cooperative cancel signal; workers check it between units of work.
    pub cancel: Arc<AtomicBool>,
}

impl RunContext {
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }
}

/// What a phase hands back: stats for the manifest and artifacts for the
/// registry.
#[derive(Debug, Clone, Default)]
pub struct PhaseReport {
    pub stats: BTreeMap<String, Value>,
    pub artifacts: Vec<(String, PathBuf)>,
}

impl PhaseReport {
    pub fn with_stat(mut self, key: &str, value: Value) -> Self {
        self.stats.insert(key.to_string(), value);
        self
    }
}

/// A post-processor's report plus whether it changed the concept set.
#[derive(Debug, Clone, Default)]
pub struct PostOutcome {
    pub report: PhaseReport,
    pub changed: bool,
}

#[async_trait]
pub trait LevelGenerator: Send + Sync {
    async fn generate(&self, ctx: &RunContext, level: u8) -> Result<PhaseReport>;
}

#[async_trait]
pub trait PipelineStep: Send + Sync {
    async fn run(&self, ctx: &RunContext) -> Result<PhaseReport>;
}

#[async_trait]
pub trait PostProcessor: Send + Sync {
    /// Short name; the phase is recorded as `phase3_<name>`.
    fn name(&self) -> &'static str;
    async fn run(&self, ctx: &RunContext) -> Result<PostOutcome>;
}

/// The pluggable stage implementations the manager sequences.
pub struct PipelineAdapters {
    pub level_generator: Arc<dyn LevelGenerator>,
    pub consolidator: Arc<dyn PipelineStep>,
    pub post_processors: Vec<Arc<dyn PostProcessor>>,
    pub finalizer: Arc<dyn PipelineStep>,
}

// =============================================================================
// Phase manager
// =============================================================================

pub struct PhaseManager {
    context: RunContext,
    adapters: PipelineAdapters,
    raise_on_error: bool,
}

impl PhaseManager {
    pub fn new(context: RunContext, adapters: PipelineAdapters) -> Self {
        Self {
            context,
            adapters,
            raise_on_error: true,
        }
    }

    pub fn continue_on_error(mut self) -> Self {
        self.raise_on_error = false;
        self
    }

    pub fn observability(&self) -> &Arc<ObservabilityContext> {
        &self.context.observability
    }

    pub fn context(&self) -> &RunContext {
        &self.context
    }

    /// The full phase sequence for this configuration.
    pub fn phase_names(&self) -> Vec<String> {
        let mut names: Vec<String> = (0..4).map(|l| format!("phase1_level{l}")).collect();
        names.push("phase2_consolidation".to_string());
        for processor in &self.adapters.post_processors {
            names.push(format!("phase3_{}", processor.name()));
        }
        names.push("phase4_finalize".to_string());
        names
    }

    /// Execute all phases, skipping completed ones, recording results into
    /// the manifest and checkpoints.
    pub async fn execute_all(
        &self,
        checkpoints: &mut CheckpointManager,
        manifest: &mut RunManifest,
        resume_from: Option<&str>,
    ) -> Result<BTreeMap<String, PhaseReport>> {
        let sequence = self.phase_names();
        if let Some(phase) = resume_from
            && !sequence.iter().any(|name| name == phase)
        {
            return Err(TaxonomyError::ResumePointUnknown(phase.to_string()));
        }

        let completed = checkpoints.completed_phases();
        let first_pending = match resume_from {
            Some(phase) => sequence.iter().position(|name| name == phase).unwrap_or(0),
            None => sequence
                .iter()
                .position(|name| !completed.contains(name))
                .unwrap_or(sequence.len()),
        };

        let mut results = BTreeMap::new();
        let mut post_passes = 0usize;
        let mut index = 0usize;
        while index < sequence.len() {
            let name = sequence[index].clone();
            if index < first_pending {
                info!(phase = %name, "skipping completed phase");
                index += 1;
                continue;
            }
            // Cancelled runs abort before the next phase, leaving no
            // checkpoint for it, so the run stays resumable.
            if self.context.is_cancelled() {
                self.context.observability.log_operation(
                    "cancel",
                    "aborted",
                    json!({"phase": name}),
                );
                return Err(TaxonomyError::phase(name, "run cancelled"));
            }

            let outcome = self.run_phase(&name).await;
            match outcome {
                Ok((report, changed)) => {
                    checkpoints.save_phase_checkpoint(
                        &name,
                        json!({"status": "completed", "stats": report.stats}),
                    )?;
                    for (kind, path) in &report.artifacts {
                        checkpoints.record_artifact(path, kind.clone());
                    }
                    manifest.record_phase(&name, json!(report.stats));
                    self.context.observability.log_operation(
                        "complete",
                        "success",
                        json!({"phase": name}),
                    );
                    results.insert(name.clone(), report);

                    // A changed concept set re-triggers the post-processing
                    // chain, bounded by MAX_POST_PASSES.
                    if changed
                        && post_passes + 1 < MAX_POST_PASSES
                        && name.starts_with("phase3_")
                    {
                        post_passes += 1;
                        info!(phase = %name, pass = post_passes, "post-processor changed state, re-running chain");
                        index = sequence
                            .iter()
                            .position(|n| n.starts_with("phase3_"))
                            .unwrap_or(index);
                        continue;
                    }
                }
                Err(err) => {
                    error!(phase = %name, %err, "phase failed");
                    self.context.observability.log_operation(
                        "complete",
                        "error",
                        json!({"phase": name, "error": err.to_string()}),
                    );
                    if self.raise_on_error {
                        return Err(TaxonomyError::phase(name, err.to_string()));
                    }
                }
            }
            index += 1;
        }
        Ok(results)
    }

    async fn run_phase(&self, name: &str) -> Result<(PhaseReport, bool)> {
        let scope = self.context.observability.phase(name);
        let result = match name {
            _ if name.starts_with("phase1_level") => {
                let level: u8 = name
                    .trim_start_matches("phase1_level")
                    .parse()
                    .map_err(|_| TaxonomyError::phase(name, "malformed level phase name"))?;
                self.adapters
                    .level_generator
                    .generate(&self.context, level)
                    .await
                    .map(|report| (report, false))
            }
            "phase2_consolidation" => self
                .adapters
                .consolidator
                .run(&self.context)
                .await
                .map(|report| (report, false)),
            "phase4_finalize" => self
                .adapters
                .finalizer
                .run(&self.context)
                .await
                .map(|report| (report, false)),
            _ => {
                let short = name.trim_start_matches("phase3_");
                let processor = self
                    .adapters
                    .post_processors
                    .iter()
                    .find(|p| p.name() == short)
                    .ok_or_else(|| TaxonomyError::phase(name, "unknown post-processor"))?;
                processor
                    .run(&self.context)
                    .await
                    .map(|outcome| (outcome.report, outcome.changed))
            }
        };
        drop(scope);
        result
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ObservabilityPolicy;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct RecordingGenerator {
        calls: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl LevelGenerator for RecordingGenerator {
        async fn generate(&self, ctx: &RunContext, level: u8) -> Result<PhaseReport> {
            self.calls.lock().unwrap().push(format!("level{level}"));
            let scope = ctx.observability.phase("S1");
            scope.increment("records_in", 1);
            scope.increment("candidates_out", 1);
            drop(scope);
            Ok(PhaseReport::default().with_stat("level", json!(level)))
        }
    }

    struct RecordingStep {
        label: &'static str,
        calls: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl PipelineStep for RecordingStep {
        async fn run(&self, _ctx: &RunContext) -> Result<PhaseReport> {
            self.calls.lock().unwrap().push(self.label.to_string());
            Ok(PhaseReport::default().with_stat("ran", json!(true)))
        }
    }

    struct RecordingPost {
        label: &'static str,
        calls: Arc<Mutex<Vec<String>>>,
        changed_once: Mutex<bool>,
    }

    #[async_trait]
    impl PostProcessor for RecordingPost {
        fn name(&self) -> &'static str {
            self.label
        }

        async fn run(&self, _ctx: &RunContext) -> Result<PostOutcome> {
            self.calls.lock().unwrap().push(self.label.to_string());
            let mut flag = self.changed_once.lock().unwrap();
            let changed = *flag;
            *flag = false;
            Ok(PostOutcome {
                report: PhaseReport::default(),
                changed,
            })
        }
    }

    fn manager(
        tmp: &TempDir,
        calls: Arc<Mutex<Vec<String>>>,
        rerun_validation: bool,
    ) -> PhaseManager {
        let mut settings = Settings::default();
        settings.paths.output_dir = tmp.path().join("output");
        settings.paths.metadata_dir = tmp.path().join("metadata");
        let context = RunContext {
            settings: Arc::new(settings),
            observability: Arc::new(ObservabilityContext::new(
                "phase-test",
                ObservabilityPolicy::default(),
            )),
            run_dir: tmp.path().join("run"),
            cancel: Arc::new(AtomicBool::new(false)),
        };
        let adapters = PipelineAdapters {
            level_generator: Arc::new(RecordingGenerator {
                calls: Arc::clone(&calls),
            }),
            consolidator: Arc::new(RecordingStep {
                label: "consolidation",
                calls: Arc::clone(&calls),
            }),
            post_processors: vec![
                Arc::new(RecordingPost {
                    label: "validation",
                    calls: Arc::clone(&calls),
                    changed_once: Mutex::new(rerun_validation),
                }),
                Arc::new(RecordingPost {
                    label: "deduplication",
                    calls: Arc::clone(&calls),
                    changed_once: Mutex::new(false),
                }),
            ],
            finalizer: Arc::new(RecordingStep {
                label: "finalize",
                calls: Arc::clone(&calls),
            }),
        };
        PhaseManager::new(context, adapters)
    }

    #[tokio::test]
    async fn executes_phases_in_order() {
        let tmp = TempDir::new().unwrap();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let manager = manager(&tmp, Arc::clone(&calls), false);
        let mut checkpoints =
            CheckpointManager::new("phase-test", &tmp.path().join("runs")).unwrap();
        let mut manifest = RunManifest::new("phase-test", None);

        let results = manager
            .execute_all(&mut checkpoints, &mut manifest, None)
            .await
            .unwrap();

        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                "level0",
                "level1",
                "level2",
                "level3",
                "consolidation",
                "validation",
                "deduplication",
                "finalize"
            ]
        );
        assert!(results.contains_key("phase1_level0"));
        assert!(checkpoints.completed_phases().contains("phase4_finalize"));

        let snapshot = manager.observability().snapshot();
        assert_eq!(snapshot.counters["S1"]["records_in"], json!(4));
        assert!(snapshot
            .operations
            .iter()
            .any(|op| op.operation == "complete" && op.outcome == "success"));
    }

    #[tokio::test]
    async fn resume_skips_completed_prefix() {
        let tmp = TempDir::new().unwrap();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let manager = manager(&tmp, Arc::clone(&calls), false);
        let mut checkpoints =
            CheckpointManager::new("resume-test", &tmp.path().join("runs")).unwrap();
        checkpoints
            .save_phase_checkpoint("phase1_level0", json!({"status": "completed"}))
            .unwrap();
        let mut manifest = RunManifest::new("resume-test", None);

        manager
            .execute_all(&mut checkpoints, &mut manifest, None)
            .await
            .unwrap();

        let executed = calls.lock().unwrap();
        assert!(!executed.contains(&"level0".to_string()));
        assert!(executed.contains(&"level1".to_string()));
    }

    #[tokio::test]
    async fn unknown_resume_phase_fails_fast() {
        let tmp = TempDir::new().unwrap();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let manager = manager(&tmp, Arc::clone(&calls), false);
        let mut checkpoints =
            CheckpointManager::new("bad-resume", &tmp.path().join("runs")).unwrap();
        let mut manifest = RunManifest::new("bad-resume", None);

        let err = manager
            .execute_all(&mut checkpoints, &mut manifest, Some("phase9_unknown"))
            .await
            .unwrap_err();
        assert!(matches!(err, TaxonomyError::ResumePointUnknown(_)));
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancelled_runs_abort_without_checkpoints() {
        let tmp = TempDir::new().unwrap();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let manager = manager(&tmp, Arc::clone(&calls), false);
        manager.context().cancel();
        let mut checkpoints =
            CheckpointManager::new("cancel-test", &tmp.path().join("runs")).unwrap();
        let mut manifest = RunManifest::new("cancel-test", None);

        let err = manager
            .execute_all(&mut checkpoints, &mut manifest, None)
            .await
            .unwrap_err();
        assert!(matches!(err, TaxonomyError::Phase { .. }));
        assert!(calls.lock().unwrap().is_empty());
        assert!(checkpoints.completed_phases().is_empty());
    }

    #[tokio::test]
    async fn changed_post_processor_triggers_bounded_rerun() {
        let tmp = TempDir::new().unwrap();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let manager = manager(&tmp, Arc::clone(&calls), true);
        let mut checkpoints =
            CheckpointManager::new("rerun-test", &tmp.path().join("runs")).unwrap();
        let mut manifest = RunManifest::new("rerun-test", None);

        manager
            .execute_all(&mut checkpoints, &mut manifest, None)
            .await
            .unwrap();

        let executed = calls.lock().unwrap();
        let validation_runs = executed.iter().filter(|c| *c == "validation").count();
        assert_eq!(validation_runs, 2);
        assert_eq!(executed.last().unwrap(), "finalize");
    }
}
