//! Content Segmentation
//!
//! Splits snapshot text into blocks using three orthogonal signals: headers
//! (ALL-CAPS or Markdown or short trailing-colon lines), list items, and
//! delimited table rows. Boilerplate lines are removed first; every block
//! carries the nearest enclosing section header.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::RawExtractionPolicy;
use crate::types::PageSnapshot;

// =============================================================================
// Blocks
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockType {
    Header,
    List,
    Table,
    Paragraph,
}

impl BlockType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Header => "header",
            Self::List => "list",
            Self::Table => "table",
            Self::Paragraph => "paragraph",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub text: String,
    pub block_type: BlockType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SegmentResult {
    pub blocks: Vec<Block>,
    pub boilerplate_removed: u64,
}

// =============================================================================
// Segmenter
// =============================================================================

pub struct ContentSegmenter {
    policy: RawExtractionPolicy,
    header_patterns: Vec<Regex>,
    boilerplate_patterns: Vec<Regex>,
}

impl ContentSegmenter {
    pub fn new(policy: &RawExtractionPolicy) -> Self {
        let header_patterns = policy
            .section_header_patterns
            .iter()
            .filter_map(|pattern| Regex::new(pattern).ok())
            .collect();
        let boilerplate_patterns = policy
            .boilerplate_patterns
            .iter()
            .filter_map(|pattern| Regex::new(&format!("(?i){pattern}")).ok())
            .collect();
        Self {
            policy: policy.clone(),
            header_patterns,
            boilerplate_patterns,
        }
    }

    pub fn segment(&self, snapshot: &PageSnapshot) -> SegmentResult {
        let mut result = SegmentResult::default();
        let mut section: Option<String> = None;
        let mut list_lines: Vec<&str> = Vec::new();
        let mut table_lines: Vec<&str> = Vec::new();
        let mut paragraph_lines: Vec<&str> = Vec::new();

        macro_rules! flush_all {
            () => {
                Self::flush(&mut list_lines, BlockType::List, &section, &mut result.blocks);
                Self::flush(&mut table_lines, BlockType::Table, &section, &mut result.blocks);
                Self::flush(
                    &mut paragraph_lines,
                    BlockType::Paragraph,
                    &section,
                    &mut result.blocks,
                );
            };
        }

        for line in snapshot.text.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                flush_all!();
                continue;
            }
            if self.policy.remove_boilerplate && self.is_boilerplate(trimmed) {
                result.boilerplate_removed += 1;
                continue;
            }
            if self.policy.segment_on_headers && self.is_header(trimmed) {
                flush_all!();
                section = self
                    .policy
                    .detect_sections
                    .then(|| trimmed.to_string())
                    .or(section);
                result.blocks.push(Block {
                    text: trimmed.to_string(),
                    block_type: BlockType::Header,
                    section: section.clone(),
                });
                continue;
            }
            if self.policy.segment_on_lists && is_list_item(trimmed) {
                Self::flush(&mut table_lines, BlockType::Table, &section, &mut result.blocks);
                Self::flush(
                    &mut paragraph_lines,
                    BlockType::Paragraph,
                    &section,
                    &mut result.blocks,
                );
                list_lines.push(trimmed);
                continue;
            }
            if self.policy.segment_on_tables && is_table_row(trimmed) {
                Self::flush(&mut list_lines, BlockType::List, &section, &mut result.blocks);
                Self::flush(
                    &mut paragraph_lines,
                    BlockType::Paragraph,
                    &section,
                    &mut result.blocks,
                );
                table_lines.push(trimmed);
                continue;
            }
            Self::flush(&mut list_lines, BlockType::List, &section, &mut result.blocks);
            Self::flush(&mut table_lines, BlockType::Table, &section, &mut result.blocks);
            paragraph_lines.push(trimmed);
        }
        flush_all!();
        result
    }

    fn flush(
        lines: &mut Vec<&str>,
        block_type: BlockType,
        section: &Option<String>,
        blocks: &mut Vec<Block>,
    ) {
        if lines.is_empty() {
            return;
        }
        blocks.push(Block {
            text: lines.join("\n"),
            block_type,
            section: section.clone(),
        });
        lines.clear();
    }

    fn is_boilerplate(&self, line: &str) -> bool {
        self.boilerplate_patterns.iter().any(|re| re.is_match(line))
    }

    fn is_header(&self, line: &str) -> bool {
        if self.header_patterns.iter().any(|re| re.is_match(line)) {
            return true;
        }
        // Short trailing-colon lines introduce a section even when not
        // ALL-CAPS or Markdown-styled.
        line.ends_with(':') && line.split_whitespace().count() <= 6
    }
}

fn is_list_item(line: &str) -> bool {
    if let Some(rest) = line
        .strip_prefix("- ")
        .or_else(|| line.strip_prefix("* "))
        .or_else(|| line.strip_prefix("• "))
    {
        return !rest.trim().is_empty();
    }
    // Numbered items: "1. text" / "2) text"
    let mut chars = line.chars();
    let digits: String = chars.by_ref().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return false;
    }
    let remainder = &line[digits.len()..];
    remainder.starts_with(". ") || remainder.starts_with(") ")
}

fn is_table_row(line: &str) -> bool {
    line.matches('|').count() >= 2 || line.matches('\t').count() >= 1
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

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

    fn admissions_text() -> &'static str {
        "ADMISSIONS\nOverview:\n- Apply online\n- Submit transcripts\n\nRequirements:\nApplicants must provide transcripts and test scores.\n\nÂ© 2024 Example University\nContact us\n"
    }

    #[test]
    fn detects_headers_lists_and_removes_boilerplate() {
        let segmenter = ContentSegmenter::new(&RawExtractionPolicy::default());
        let result = segmenter.segment(&snapshot(admissions_text()));

        assert_eq!(result.boilerplate_removed, 2);
        let types: Vec<BlockType> = result.blocks.iter().map(|b| b.block_type).collect();
        assert_eq!(
            types,
            vec![
                BlockType::Header,
                BlockType::Header,
                BlockType::List,
                BlockType::Header,
                BlockType::Paragraph
            ]
        );
        let list_block = &result.blocks[2];
        assert!(list_block.text.contains('\n'));
        assert_eq!(list_block.section.as_deref(), Some("Overview:"));
    }

    #[test]
    fn paragraph_inherits_enclosing_section() {
        let segmenter = ContentSegmenter::new(&RawExtractionPolicy::default());
        let result = segmenter.segment(&snapshot(admissions_text()));
        let paragraph = result
            .blocks
            .iter()
            .find(|b| b.block_type == BlockType::Paragraph)
            .unwrap();
        assert_eq!(paragraph.section.as_deref(), Some("Requirements:"));
    }

    #[test]
    fn table_rows_form_table_blocks() {
        let segmenter = ContentSegmenter::new(&RawExtractionPolicy::default());
        let text = "PROGRAMS\nName | Degree | Credits\nRobotics | MS | 30\n";
        let result = segmenter.segment(&snapshot(text));
        let table = result
            .blocks
            .iter()
            .find(|b| b.block_type == BlockType::Table)
            .unwrap();
        assert!(table.text.contains("Robotics | MS | 30"));
    }

    #[test]
    fn numbered_lists_are_detected() {
        assert!(is_list_item("1. First requirement"));
        assert!(is_list_item("12) Later requirement"));
        assert!(!is_list_item("2024 was a good year"));
    }

    #[test]
    fn header_toggle_disables_detection() {
        let mut policy = RawExtractionPolicy::default();
        policy.segment_on_headers = false;
        let segmenter = ContentSegmenter::new(&policy);
        let result = segmenter.segment(&snapshot("ADMISSIONS\ncontent line here\n"));
        assert!(result.blocks.iter().all(|b| b.block_type != BlockType::Header));
    }
}
