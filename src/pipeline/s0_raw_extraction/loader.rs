//! Snapshot Loading
//!
//! Reads crawler-delivered `PageSnapshot` JSONL streams. A missing file is
//! fatal; malformed lines are surfaced for quarantine and skipped.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::pipeline::artifacts::read_jsonl;
use crate::types::{PageSnapshot, Result, TaxonomyError};

/// One delivered snapshot plus crawler-side metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub snapshot: PageSnapshot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_confidence: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderMetrics {
    pub snapshots_loaded: u64,
    pub invalid_json: u64,
}

#[derive(Debug, Default)]
pub struct SnapshotLoader {
    pub metrics: LoaderMetrics,
    /// `(line, error)` pairs for observability quarantine.
    pub rejected: Vec<(usize, String)>,
}

impl SnapshotLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load all snapshot records from a JSONL file.
    pub fn load_from_jsonl(&mut self, path: &Path) -> Result<Vec<SnapshotRecord>> {
        let lines = read_jsonl::<SnapshotRecord>(path)?;
        let mut records = Vec::new();
        for line in lines {
            match line {
                Ok(record) => {
                    self.metrics.snapshots_loaded += 1;
                    records.push(record);
                }
                Err(err) => {
                    self.metrics.invalid_json += 1;
                    let line_no = match &err {
                        TaxonomyError::InvalidJsonLine { line, .. } => *line,
                        _ => 0,
                    };
                    self.rejected.push((line_no, err.to_string()));
                }
            }
        }
        Ok(records)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;
    use std::fs;
    use tempfile::TempDir;

    fn snapshot(text: &str) -> PageSnapshot {
        PageSnapshot {
            institution: "test-university".into(),
            url: "https://example.edu/admissions".into(),
            canonical_url: "https://example.edu/admissions".into(),
            fetched_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            http_status: 200,
            content_type: "text/html".into(),
            html: None,
            text: text.into(),
            lang: "en".into(),
            checksum: PageSnapshot::compute_checksum(text),
            meta: BTreeMap::new(),
        }
    }

    #[test]
    fn loads_jsonl_snapshots() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("snapshots.jsonl");
        let record = SnapshotRecord {
            snapshot: snapshot("ADMISSIONS overview"),
            language_confidence: Some(0.93),
        };
        fs::write(&path, format!("{}\n", serde_json::to_string(&record).unwrap())).unwrap();

        let mut loader = SnapshotLoader::new();
        let records = loader.load_from_jsonl(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(loader.metrics.snapshots_loaded, 1);
        assert!((records[0].language_confidence.unwrap() - 0.93).abs() < 1e-9);
    }

    #[test]
    fn malformed_lines_are_counted_not_fatal() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("snapshots.jsonl");
        let record = SnapshotRecord {
            snapshot: snapshot("text"),
            language_confidence: None,
        };
        fs::write(
            &path,
            format!("broken{{\n{}\n", serde_json::to_string(&record).unwrap()),
        )
        .unwrap();

        let mut loader = SnapshotLoader::new();
        let records = loader.load_from_jsonl(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(loader.metrics.invalid_json, 1);
        assert_eq!(loader.rejected.len(), 1);
        assert_eq!(loader.rejected[0].0, 1);
    }

    #[test]
    fn missing_file_is_fatal() {
        let mut loader = SnapshotLoader::new();
        assert!(loader
            .load_from_jsonl(Path::new("/nonexistent/snapshots.jsonl"))
            .is_err());
    }
}
