//! Observability fabric: counters, evidence sampling, quarantine, operation
//! logs, checksum-stable snapshots and manifest payload assembly.

pub mod context;
pub mod manifest;
pub mod snapshot;

pub use context::{
    EvidenceSample, GLOBAL_PHASE, ObservabilityContext, OperationEntry, PhaseScope,
    QuarantineEntry,
};
pub use manifest::{aggregate_counters, build_payload, integer_seeds, nest_thresholds};
pub use snapshot::{
    EvidenceSnapshot, ObservabilitySnapshot, QuarantineSnapshot, compute_checksum, stable_hash,
};
