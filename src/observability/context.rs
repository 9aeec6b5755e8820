//! Observability Context
//!
//! Process-wide, thread-safe observability state for one run: phase-scoped
//! counters, a deterministic evidence reservoir, a quarantine buffer, a
//! typed operations log, per-phase performance metrics, and registration
//! maps for prompt versions, thresholds and seeds.
//!
//! The context is passed explicitly as a collaborator; it is the only
//! cross-worker mutable shared state in the pipeline. All mutation goes
//! through its API, and every recorded event receives a globally monotonic
//! sequence number so exports are stable.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ObservabilityPolicy;

use super::snapshot::{
    EvidenceSnapshot, ObservabilitySnapshot, QuarantineSnapshot, compute_checksum,
};

pub const GLOBAL_PHASE: &str = "global";

// =============================================================================
// Event shapes
// =============================================================================

/// One sampled evidence payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceSample {
    pub sequence: u64,
    pub phase: String,
    pub category: String,
    pub outcome: String,
    pub payload: Value,
}

/// One quarantined item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuarantineEntry {
    pub sequence: u64,
    pub reason: String,
    pub item_id: String,
    pub payload: Value,
}

/// One typed operation event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationEntry {
    pub sequence: u64,
    pub phase: String,
    pub operation: String,
    pub outcome: String,
    pub payload: Value,
}

// =============================================================================
// Inner state
// =============================================================================

struct Inner {
    phase_stack: Vec<String>,
    counters: BTreeMap<String, BTreeMap<String, Value>>,
    evidence: BTreeMap<String, Vec<EvidenceSample>>,
    evidence_considered: BTreeMap<String, u64>,
    quarantine: Vec<QuarantineEntry>,
    operations: Vec<OperationEntry>,
    performance: BTreeMap<String, BTreeMap<String, f64>>,
    prompt_versions: BTreeMap<String, String>,
    thresholds: BTreeMap<String, Value>,
    seeds: BTreeMap<String, Value>,
    rng: StdRng,
}

impl Inner {
    fn current_phase(&self) -> String {
        self.phase_stack
            .last()
            .cloned()
            .unwrap_or_else(|| GLOBAL_PHASE.to_string())
    }
}

// =============================================================================
// ObservabilityContext
// =============================================================================

pub struct ObservabilityContext {
    run_id: String,
    policy: ObservabilityPolicy,
    sequence: AtomicU64,
    inner: Mutex<Inner>,
}

impl ObservabilityContext {
    pub fn new(run_id: impl Into<String>, policy: ObservabilityPolicy) -> Self {
        let rng = StdRng::seed_from_u64(policy.deterministic_sampling_seed);
        Self {
            run_id: run_id.into(),
            policy,
            sequence: AtomicU64::new(0),
            inner: Mutex::new(Inner {
                phase_stack: Vec::new(),
                counters: BTreeMap::new(),
                evidence: BTreeMap::new(),
                evidence_considered: BTreeMap::new(),
                quarantine: Vec::new(),
                operations: Vec::new(),
                performance: BTreeMap::new(),
                prompt_versions: BTreeMap::new(),
                thresholds: BTreeMap::new(),
                seeds: BTreeMap::new(),
                rng,
            }),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn policy(&self) -> &ObservabilityPolicy {
        &self.policy
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // -------------------------------------------------------------------------
    // Phase stack
    // -------------------------------------------------------------------------

    /// Enter a phase scope; the guard pops the phase on drop regardless of
    /// how the scope exits.
    pub fn phase(&self, name: impl Into<String>) -> PhaseScope<'_> {
        let name = name.into();
        self.push_phase(&name);
        PhaseScope {
            context: self,
            name,
        }
    }

    pub fn push_phase(&self, name: &str) {
        self.lock().phase_stack.push(name.to_string());
    }

    pub fn pop_phase(&self, name: &str) {
        let mut inner = self.lock();
        if inner.phase_stack.last().map(String::as_str) == Some(name) {
            inner.phase_stack.pop();
        } else if let Some(position) = inner.phase_stack.iter().rposition(|p| p == name) {
            inner.phase_stack.remove(position);
        }
    }

    pub fn current_phase(&self) -> Option<String> {
        self.lock().phase_stack.last().cloned()
    }

    // -------------------------------------------------------------------------
    // Counters
    // -------------------------------------------------------------------------

    pub fn increment(&self, name: &str, value: i64) {
        let mut inner = self.lock();
        let phase = inner.current_phase();
        let counter = inner
            .counters
            .entry(phase)
            .or_default()
            .entry(name.to_string())
            .or_insert_with(|| Value::from(0));
        let updated = counter.as_i64().unwrap_or(0).saturating_add(value).max(0);
        *counter = Value::from(updated);
    }

    /// Increment a labelled sub-counter (`name` maps labels to counts).
    pub fn increment_label(&self, name: &str, label: &str, value: i64) {
        let mut inner = self.lock();
        let phase = inner.current_phase();
        let counter = inner
            .counters
            .entry(phase)
            .or_default()
            .entry(name.to_string())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
        if !counter.is_object() {
            *counter = Value::Object(serde_json::Map::new());
        }
        let map = counter.as_object_mut().expect("labelled counter is an object");
        let slot = map.entry(label.to_string()).or_insert_with(|| Value::from(0));
        let updated = slot.as_i64().unwrap_or(0).saturating_add(value).max(0);
        *slot = Value::from(updated);
    }

    // -------------------------------------------------------------------------
    // Evidence sampling
    // -------------------------------------------------------------------------

    /// Offer a payload to the bounded per-phase reservoir. Acceptance is
    /// deterministic given the sampling seed and call order.
    pub fn evidence(&self, category: &str, outcome: &str, payload: Value) {
        let sequence = self.next_sequence();
        let mut inner = self.lock();
        let phase = inner.current_phase();
        *inner.evidence_considered.entry(phase.clone()).or_insert(0) += 1;

        let cap = self.policy.max_evidence_samples_per_phase;
        let rate = self.policy.evidence_sampling_rate;
        let draw: f64 = inner.rng.random();
        let accepted = inner.evidence.get(&phase).map_or(0, Vec::len) < cap && draw <= rate;
        if accepted {
            inner.evidence.entry(phase.clone()).or_default().push(EvidenceSample {
                sequence,
                phase,
                category: category.to_string(),
                outcome: outcome.to_string(),
                payload,
            });
        }
    }

    // -------------------------------------------------------------------------
    // Quarantine and operations
    // -------------------------------------------------------------------------

    pub fn quarantine(&self, reason: &str, item_id: &str, payload: Value) {
        let sequence = self.next_sequence();
        let mut inner = self.lock();
        inner.quarantine.push(QuarantineEntry {
            sequence,
            reason: reason.to_string(),
            item_id: item_id.to_string(),
            payload,
        });
    }

    pub fn log_operation(&self, operation: &str, outcome: &str, payload: Value) {
        let sequence = self.next_sequence();
        let mut inner = self.lock();
        let phase = inner.current_phase();
        inner.operations.push(OperationEntry {
            sequence,
            phase,
            operation: operation.to_string(),
            outcome: outcome.to_string(),
            payload,
        });
    }

    pub fn performance(&self, metrics: BTreeMap<String, f64>) {
        let mut inner = self.lock();
        let phase = inner.current_phase();
        inner.performance.entry(phase).or_default().extend(metrics);
    }

    // -------------------------------------------------------------------------
    // Registrations
    // -------------------------------------------------------------------------

    pub fn register_prompt_version(&self, key: &str, version: &str) {
        self.lock()
            .prompt_versions
            .insert(key.to_string(), version.to_string());
    }

    pub fn register_threshold(&self, key: &str, value: Value) {
        self.lock().thresholds.insert(key.to_string(), value);
    }

    pub fn register_seed(&self, key: &str, value: Value) {
        self.lock().seeds.insert(key.to_string(), value);
    }

    // -------------------------------------------------------------------------
    // Snapshot
    // -------------------------------------------------------------------------

    /// Capture an immutable snapshot with a stable checksum.
    pub fn snapshot(&self) -> ObservabilitySnapshot {
        let inner = self.lock();

        let mut by_reason: BTreeMap<String, u64> = BTreeMap::new();
        for entry in &inner.quarantine {
            *by_reason.entry(entry.reason.clone()).or_insert(0) += 1;
        }
        let mut items = inner.quarantine.clone();
        items.sort_by_key(|entry| entry.sequence);

        let mut samples = inner.evidence.clone();
        for entries in samples.values_mut() {
            entries.sort_by_key(|sample| sample.sequence);
        }

        let mut operations = inner.operations.clone();
        operations.sort_by_key(|entry| entry.sequence);

        let mut snapshot = ObservabilitySnapshot {
            run_id: self.run_id.clone(),
            counters: inner.counters.clone(),
            quarantine: QuarantineSnapshot {
                total: items.len() as u64,
                by_reason,
                items,
            },
            evidence: EvidenceSnapshot {
                samples,
                total_considered: inner.evidence_considered.clone(),
            },
            operations,
            performance: inner.performance.clone(),
            prompt_versions: inner.prompt_versions.clone(),
            thresholds: inner.thresholds.clone(),
            seeds: inner.seeds.clone(),
            checksum: String::new(),
            captured_at: chrono::Utc::now().to_rfc3339(),
        };
        snapshot.checksum = compute_checksum(&snapshot);
        snapshot
    }
}

// =============================================================================
// PhaseScope
// =============================================================================

/// Scoped phase handle. Pops the phase on drop, including on panic and
/// cancellation paths.
pub struct PhaseScope<'a> {
    context: &'a ObservabilityContext,
    name: String,
}

impl PhaseScope<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn increment(&self, name: &str, value: i64) {
        self.context.increment(name, value);
    }

    pub fn increment_label(&self, name: &str, label: &str, value: i64) {
        self.context.increment_label(name, label, value);
    }

    pub fn evidence(&self, category: &str, outcome: &str, payload: Value) {
        self.context.evidence(category, outcome, payload);
    }

    pub fn quarantine(&self, reason: &str, item_id: &str, payload: Value) {
        self.context.quarantine(reason, item_id, payload);
    }

    pub fn log_operation(&self, operation: &str, outcome: &str, payload: Value) {
        self.context.log_operation(operation, outcome, payload);
    }

    pub fn performance(&self, metrics: BTreeMap<String, f64>) {
        self.context.performance(metrics);
    }
}

impl Drop for PhaseScope<'_> {
    fn drop(&mut self) {
        self.context.pop_phase(&self.name);
    }
}

// =============================================================================
// Tests
// =============================================================================
