//! Observability Manifest Payload
//!
//! Transforms a snapshot into the manifest-friendly payload: mappings sorted
//! by key, event lists sorted by sequence, counter values coerced to
//! integers (invalid values become 0), dotted threshold keys flattened into
//! nested objects (longest path wins on conflict), and non-integer seeds
//! skipped with a warning.

use std::collections::BTreeMap;

use serde_json::{Map, Value, json};
use tracing::warn;

use super::snapshot::ObservabilitySnapshot;

/// Build the full manifest payload for a snapshot.
pub fn build_payload(snapshot: &ObservabilitySnapshot) -> Value {
    json!({
        "counters": aggregate_counters(&snapshot.counters),
        "quarantine": {
            "total": snapshot.quarantine.total,
            "by_reason": snapshot.quarantine.by_reason,
            "items": snapshot.quarantine.items,
        },
        "evidence": {
            "samples": snapshot.evidence.samples,
            "total_considered": snapshot.evidence.total_considered,
        },
        "operations": snapshot.operations,
        "performance": snapshot.performance,
        "prompt_versions": snapshot.prompt_versions,
        "thresholds": nest_thresholds(&snapshot.thresholds),
        "seeds": integer_seeds(&snapshot.seeds),
        "checksum": snapshot.checksum,
        "captured_at": snapshot.captured_at,
    })
}

/// Coerce every counter to an integer so manifests never fail to render.
pub fn aggregate_counters(
    counters: &BTreeMap<String, BTreeMap<String, Value>>,
) -> BTreeMap<String, BTreeMap<String, Value>> {
    counters
        .iter()
        .map(|(phase, values)| {
            let coerced = values
                .iter()
                .map(|(name, value)| (name.clone(), coerce_counter(value)))
                .collect();
            (phase.clone(), coerced)
        })
        .collect()
}

fn coerce_counter(value: &Value) -> Value {
    match value {
        Value::Object(labels) => {
            let mut sorted: Vec<_> = labels.iter().collect();
            sorted.sort_by(|(a, _), (b, _)| a.cmp(b));
            let mut out = Map::new();
            for (label, entry) in sorted {
                out.insert(label.clone(), Value::from(coerce_int(entry)));
            }
            Value::Object(out)
        }
        other => Value::from(coerce_int(other)),
    }
}

fn coerce_int(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .or_else(|_| s.trim().parse::<f64>().map(|f| f as i64))
            .unwrap_or(0),
        Value::Bool(b) => i64::from(*b),
        _ => 0,
    }
}

/// Nest dotted threshold keys into objects. On conflict the longer path
/// wins; keys without dots pass through unchanged; empty segments become
/// explicit empty-string keys so the original path is preserved.
pub fn nest_thresholds(thresholds: &BTreeMap<String, Value>) -> Value {
    let mut root = Map::new();
    for (key, value) in thresholds {
        if !key.contains('.') {
            // Only overwrite scalars so nested structures always win.
            match root.get(key) {
                Some(Value::Object(_)) if !value.is_object() => {}
                _ => {
                    root.insert(key.clone(), value.clone());
                }
            }
            continue;
        }
        let segments: Vec<&str> = key.split('.').collect();
        insert_path(&mut root, &segments, value.clone());
    }
    Value::Object(root)
}

fn insert_path(map: &mut Map<String, Value>, segments: &[&str], value: Value) {
    let (head, rest) = segments
        .split_first()
        .expect("insert_path requires at least one segment");
    if rest.is_empty() {
        match map.get(*head) {
            Some(Value::Object(_)) => {} // longer path already claimed this slot
            _ => {
                map.insert((*head).to_string(), value);
            }
        }
        return;
    }
    let slot = map
        .entry((*head).to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    insert_path(
        slot.as_object_mut().expect("slot coerced to object"),
        rest,
        value,
    );
}

/// Keep only integer-valued seeds; anything else is skipped with a warning.
pub fn integer_seeds(seeds: &BTreeMap<String, Value>) -> BTreeMap<String, i64> {
    let mut out = BTreeMap::new();
    for (name, value) in seeds {
        match value.as_i64() {
            Some(seed) => {
                out.insert(name.clone(), seed);
            }
            None => warn!(seed = %name, "Skipping invalid observability seed"),
        }
    }
    out
}

// =============================================================================
// Tests
// =============================================================================
