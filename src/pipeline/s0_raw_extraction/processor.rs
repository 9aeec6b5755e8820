//! S0 Raw Extraction
//!
//! Turns page snapshots into `SourceRecord`s: language gating, boilerplate
//! removal, segmentation, length bounds and intra-page near-duplicate
//! collapse, keeping the first occurrence in document order.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::RawExtractionPolicy;
use crate::pipeline::artifacts::{write_json, write_jsonl};
use crate::types::{Provenance, Result, SourceMeta, SourceRecord};

use super::loader::{SnapshotLoader, SnapshotRecord};
use super::segmenter::ContentSegmenter;

// =============================================================================
// Metrics
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorMetrics {
    pub pages_in: u64,
    pub pages_emitted: u64,
    pub pages_language_skipped: u64,
    pub blocks_kept: u64,
    pub blocks_deduped: u64,
    pub blocks_length_skipped: u64,
    pub boilerplate_removed: u64,
}

// =============================================================================
// Processor
// =============================================================================

pub struct RawExtractionProcessor {
    policy: RawExtractionPolicy,
    segmenter: ContentSegmenter,
    pub metrics: ProcessorMetrics,
}

impl RawExtractionProcessor {
    pub fn new(policy: RawExtractionPolicy) -> Self {
        let segmenter = ContentSegmenter::new(&policy);
        Self {
            policy,
            segmenter,
            metrics: ProcessorMetrics::default(),
        }
    }

    /// Process one snapshot into source records.
    pub fn process(&mut self, record: &SnapshotRecord) -> Result<Vec<SourceRecord>> {
        self.metrics.pages_in += 1;

        if !self.language_acceptable(record) {
            self.metrics.pages_language_skipped += 1;
            return Ok(Vec::new());
        }

        let snapshot = &record.snapshot;
        let segmented = self.segmenter.segment(snapshot);
        self.metrics.boilerplate_removed += segmented.boilerplate_removed;

        let mut blocks = Vec::new();
        for block in segmented.blocks {
            let length = block.text.chars().count();
            if length < self.policy.min_chars || length > self.policy.max_chars {
                self.metrics.blocks_length_skipped += 1;
                continue;
            }
            blocks.push(block);
        }

        if self.policy.intra_page_dedup_enabled {
            let texts: Vec<String> = blocks.iter().map(|b| b.text.clone()).collect();
            let duplicates = crate::utils::find_duplicates(
                &texts,
                self.policy.similarity_threshold,
                &self.policy.similarity_method,
            )?;
            self.metrics.blocks_deduped += duplicates.len() as u64;
            let mut index = 0usize;
            blocks.retain(|_| {
                let keep = !duplicates.contains(&index);
                index += 1;
                keep
            });
        }

        let mut records = Vec::new();
        for (index, block) in blocks.iter().enumerate() {
            let mut provenance =
                Provenance::new(snapshot.institution.clone(), snapshot.url.clone());
            provenance.section = block.section.clone();
            provenance.fetched_at = Some(snapshot.fetched_at);

            let mut meta = SourceMeta::default();
            meta.language = snapshot.lang.clone();
            meta.hints.insert("level".into(), "S0".into());
            meta.hints
                .insert("block_type".into(), block.block_type.as_str().into());
            meta.hints.insert("source".into(), snapshot.url.clone());
            let checksum_prefix: String = snapshot.checksum.chars().take(8).collect();
            meta.hints
                .insert("record_id".into(), format!("{checksum_prefix}-{index}"));

            let source = SourceRecord {
                text: block.text.clone(),
                provenance,
                meta,
            };
            source.validate()?;
            records.push(source);
        }

        self.metrics.blocks_kept += records.len() as u64;
        if !records.is_empty() {
            self.metrics.pages_emitted += 1;
        }
        Ok(records)
    }

    fn language_acceptable(&self, record: &SnapshotRecord) -> bool {
        if self.policy.target_language == "any" {
            return true;
        }
        if !record
            .snapshot
            .lang
            .eq_ignore_ascii_case(&self.policy.target_language)
        {
            return false;
        }
        if self.policy.require_language_confidence {
            let confidence = record.language_confidence.unwrap_or(0.0);
            if confidence < self.policy.language_confidence_threshold {
                return false;
            }
        }
        true
    }
}

// =============================================================================
// Convenience entry point
// =============================================================================

/// Summary of one `extract_from_snapshots` invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionSummary {
    pub records_path: String,
    pub metadata_path: String,
    pub loader: super::loader::LoaderMetrics,
    pub processor: ProcessorMetrics,
    pub records_emitted: u64,
}

/// Load snapshots, segment them, and write the source-record artifact plus a
/// metrics sidecar.
pub fn extract_from_snapshots(
    input: &Path,
    output: &Path,
    policy: &RawExtractionPolicy,
) -> Result<ExtractionSummary> {
    let mut loader = SnapshotLoader::new();
    let snapshots = loader.load_from_jsonl(input)?;

    let mut processor = RawExtractionProcessor::new(policy.clone());
    let mut all_records = Vec::new();
    for record in &snapshots {
        all_records.extend(processor.process(record)?);
    }

    write_jsonl(output, &all_records)?;

    let metadata_path = output.with_extension("metadata.json");
    let summary = ExtractionSummary {
        records_path: output.display().to_string(),
        metadata_path: metadata_path.display().to_string(),
        loader: loader.metrics.clone(),
        processor: processor.metrics.clone(),
        records_emitted: all_records.len() as u64,
    };
    write_json(
        &metadata_path,
        &serde_json::json!({
            "loader": summary.loader,
            "processor": summary.processor,
            "records_emitted": summary.records_emitted,
        }),
    )?;
    Ok(summary)
}

// =============================================================================
// Tests
// =============================================================================
