//! Observability Snapshot
//!
//! Immutable dump of the observability state at one instant. The checksum is
//! derived from canonical JSON of everything except the checksum itself and
//! the capture timestamp, so two runs with identical histories produce
//! identical checksums regardless of when they were captured.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::context::{EvidenceSample, OperationEntry, QuarantineEntry};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuarantineSnapshot {
    pub total: u64,
    pub by_reason: BTreeMap<String, u64>,
    pub items: Vec<QuarantineEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvidenceSnapshot {
    pub samples: BTreeMap<String, Vec<EvidenceSample>>,
    pub total_considered: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservabilitySnapshot {
    pub run_id: String,
    pub counters: BTreeMap<String, BTreeMap<String, Value>>,
    pub quarantine: QuarantineSnapshot,
    pub evidence: EvidenceSnapshot,
    pub operations: Vec<OperationEntry>,
    pub performance: BTreeMap<String, BTreeMap<String, f64>>,
    pub prompt_versions: BTreeMap<String, String>,
    pub thresholds: BTreeMap<String, Value>,
    pub seeds: BTreeMap<String, Value>,
    pub checksum: String,
    pub captured_at: String,
}

/// Hex SHA-256 of a JSON value serialized with sorted keys. All mappings in
/// the snapshot are `BTreeMap`s, so `serde_json` emits canonical bytes.
pub fn stable_hash(value: &Value) -> String {
    let bytes = serde_json::to_vec(value).unwrap_or_default();
    let digest = Sha256::digest(&bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Checksum over the content-bearing parts of a snapshot.
pub fn compute_checksum(snapshot: &ObservabilitySnapshot) -> String {
    let payload = serde_json::json!({
        "counters": snapshot.counters,
        "evidence": snapshot.evidence,
        "operations": snapshot.operations,
        "quarantine": snapshot.quarantine,
        "performance": performance_for_checksum(&snapshot.performance),
        "prompt_versions": snapshot.prompt_versions,
        "thresholds": snapshot.thresholds,
        "seeds": snapshot.seeds,
    });
    stable_hash(&payload)
}

/// Wall-clock timings vary between otherwise identical runs, so they are
/// excluded from the checksum; deterministic performance metrics (counts,
/// sizes) still participate.
fn performance_for_checksum(
    performance: &BTreeMap<String, BTreeMap<String, f64>>,
) -> BTreeMap<String, BTreeMap<String, f64>> {
    performance
        .iter()
        .map(|(phase, metrics)| {
            let filtered = metrics
                .iter()
                .filter(|(name, _)| {
                    !name.contains("elapsed") && !name.contains("latency") && !name.ends_with("_ms")
                })
                .map(|(name, value)| (name.clone(), *value))
                .collect();
            (phase.clone(), filtered)
        })
        .collect()
}
