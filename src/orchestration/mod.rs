//! Orchestration: checkpoints, the run manifest, the phase manager and the
//! top-level orchestrator.

pub mod checkpoints;
pub mod manifest;
pub mod orchestrator;
pub mod phases;

pub use checkpoints::{ArtifactRecord, CHECKPOINT_SUFFIX, CheckpointManager};
pub use manifest::RunManifest;
pub use orchestrator::{RunOutcome, TaxonomyOrchestrator, run_taxonomy_pipeline};
pub use phases::{
    LevelGenerator, PhaseManager, PhaseReport, PipelineAdapters, PipelineStep, PostOutcome,
    PostProcessor, RunContext,
};
