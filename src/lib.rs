//! Taxogen - Academic-Domain Taxonomy Pipeline
//!
//! A deterministic, checkpointed pipeline that builds a multi-level
//! academic-domain taxonomy from heterogeneous institutional evidence
//! (crawled pages, spreadsheets, PDFs delivered as snapshots).
//!
//! ## Core Features
//!
//! - **Staged pipeline**: S0 segmentation → S1 extraction/normalization →
//!   S2 frequency filtering → S3 token verification, per level
//! - **Post-processing**: validation (rule + web + LLM entailment),
//!   deduplication (blocking + similarity + merge graph), disambiguation
//! - **Hierarchy assembly**: unique-path DAG with orphan policies and a
//!   graph validator
//! - **Checkpoint/Resume**: per-phase JSON checkpoints under the run
//!   directory; failed phases leave no checkpoint
//! - **Observability**: phase-scoped counters, deterministic evidence
//!   sampling, quarantine, operations log and a checksum-stable snapshot
//!   exported into the run manifest
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use taxogen::{SettingsLoader, TaxonomyOrchestrator};
//! use taxogen::llm::CallbackProvider;
//!
//! let settings = SettingsLoader::new().load()?;
//! let provider = Arc::new(CallbackProvider::new("local", |prompt, request| {
//!     /* transport of your choice */
//! }));
//! let outcome = TaxonomyOrchestrator::from_settings(settings, None, provider)?
//!     .run(None)
//!     .await?;
//! println!("manifest at {}", outcome.manifest_path.display());
//! ```
//!
//! ## Modules
//!
//! - [`config`]: settings, policies, layered loader
//! - [`types`]: entity model and the unified error type
//! - [`observability`]: counters, sampling, snapshots, manifest payloads
//! - [`llm`]: provider abstraction, prompt registry, validated client
//! - [`pipeline`]: the S0–S3 stages and post-processors
//! - [`orchestration`]: checkpoints, manifest, phase manager, orchestrator

pub mod config;
pub mod llm;
pub mod observability;
pub mod orchestration;
pub mod pipeline;
pub mod types;
pub mod utils;

// =============================================================================
// Core Re-exports
// =============================================================================

// Configuration
pub use config::{Environment, Policies, Settings, SettingsLoader, load_settings};

// Error Types
pub use types::error::{ProviderErrorKind, Result, TaxonomyError};

// Entities
pub use types::{
    Candidate, Concept, MergeOp, PageSnapshot, Provenance, Rationale, SourceRecord, SplitOp,
    SupportStats, ValidationFinding,
};

// =============================================================================
// Pipeline Re-exports
// =============================================================================

pub use orchestration::{
    CheckpointManager, PhaseManager, PipelineAdapters, RunContext, RunManifest, RunOutcome,
    TaxonomyOrchestrator, run_taxonomy_pipeline,
};

pub use observability::{ObservabilityContext, ObservabilitySnapshot};

// =============================================================================
// LLM Re-exports
// =============================================================================

pub use llm::{LlmClient, LlmProvider, PromptRegistry, SharedProvider};
