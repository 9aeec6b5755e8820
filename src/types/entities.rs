//! Entity Model
//!
//! The data shapes that flow through the pipeline: raw evidence
//! ([`SourceRecord`], [`PageSnapshot`]), proposed labels ([`Candidate`]),
//! accepted graph nodes ([`Concept`]) and the audit objects that track how a
//! node earned its place ([`Rationale`], [`MergeOp`], [`SplitOp`],
//! [`ValidationFinding`]).
//!
//! Entities are plain serde structs; structural invariants are enforced by
//! explicit `validate()` methods called at pipeline boundaries so that
//! artifacts deserialized from disk go through the same checks as
//! freshly-built values.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::error::{Result, TaxonomyError};

// =============================================================================
// Provenance and Source Records
// =============================================================================

/// Where a piece of evidence came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub institution: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetched_at: Option<DateTime<Utc>>,
}

impl Provenance {
    pub fn new(institution: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            institution: institution.into(),
            url: url.into(),
            section: None,
            fetched_at: None,
        }
    }
}

/// Free-form hints attached to a source record by its producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMeta {
    #[serde(default)]
    pub hints: BTreeMap<String, String>,
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for SourceMeta {
    fn default() -> Self {
        Self {
            hints: BTreeMap::new(),
            language: default_language(),
        }
    }
}

fn default_language() -> String {
    "en".to_string()
}

/// An atomic piece of evidence. Immutable once produced by S0 or a
/// spreadsheet handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub text: String,
    pub provenance: Provenance,
    #[serde(default)]
    pub meta: SourceMeta,
}

impl SourceRecord {
    pub fn new(text: impl Into<String>, provenance: Provenance) -> Self {
        Self {
            text: text.into(),
            provenance,
            meta: SourceMeta::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.text.trim().is_empty() {
            return Err(TaxonomyError::Entity(
                "source record text must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Stable per-record identifier used for deduplication in S2.
    pub fn fingerprint(&self) -> String {
        if let Some(id) = self.meta.hints.get("record_id") {
            return id.clone();
        }
        let mut hasher = Sha256::new();
        hasher.update(self.provenance.institution.as_bytes());
        hasher.update(b"|");
        hasher.update(self.provenance.url.as_bytes());
        hasher.update(b"|");
        hasher.update(self.text.as_bytes());
        let digest = hasher.finalize();
        hex_prefix(&digest, 16)
    }
}

// =============================================================================
// Page Snapshots
// =============================================================================

/// An ingested web page delivered by an external crawler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub institution: String,
    pub url: String,
    pub canonical_url: String,
    pub fetched_at: DateTime<Utc>,
    pub http_status: u16,
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    pub text: String,
    pub lang: String,
    pub checksum: String,
    #[serde(default)]
    pub meta: BTreeMap<String, serde_json::Value>,
}

impl PageSnapshot {
    /// Stable hash of snapshot text, hex-encoded SHA-256.
    pub fn compute_checksum(text: &str) -> String {
        let digest = Sha256::digest(text.as_bytes());
        hex_prefix(&digest, 64)
    }

    pub fn validate(&self) -> Result<()> {
        if self.checksum != Self::compute_checksum(&self.text) {
            return Err(TaxonomyError::Entity(format!(
                "snapshot checksum mismatch for {}",
                self.url
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Support and Candidates
// =============================================================================

/// Evidence counts backing a candidate or concept. Counts only grow under
/// aggregation and merging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportStats {
    pub records: u64,
    pub institutions: u64,
    pub count: u64,
}

impl SupportStats {
    pub fn new(records: u64, institutions: u64, count: u64) -> Self {
        Self {
            records,
            institutions,
            count,
        }
    }

    /// Fold another support block in, preserving monotonicity.
    pub fn absorb(&mut self, other: &SupportStats) {
        self.records += other.records;
        self.institutions += other.institutions;
        self.count += other.count;
    }
}

/// A normalized label proposed for a given level, prior to acceptance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub level: u8,
    pub label: String,
    pub normalized: String,
    /// Ordered set of parent anchors (`L{level-1}:{normalized}`). Empty only
    /// when `level == 0`, or when every parent failed to resolve upstream.
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub support: SupportStats,
}

impl Candidate {
    pub fn validate(&self) -> Result<()> {
        if self.level > 3 {
            return Err(TaxonomyError::Entity(format!(
                "candidate level {} out of range 0..=3",
                self.level
            )));
        }
        if self.level == 0 && !self.parents.is_empty() {
            return Err(TaxonomyError::Entity(
                "level-0 candidates must not declare parents".into(),
            ));
        }
        if self.normalized.trim().is_empty() {
            return Err(TaxonomyError::Entity(
                "candidate normalized form must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Add an alias unless it already exists or collides with the label
    /// (case-insensitively folded).
    pub fn push_alias(&mut self, alias: impl Into<String>) {
        let alias = alias.into();
        if alias.trim().is_empty() {
            return;
        }
        let folded = alias.to_lowercase();
        if folded == self.label.to_lowercase() || folded == self.normalized.to_lowercase() {
            return;
        }
        if !self.aliases.iter().any(|a| a.to_lowercase() == folded) {
            self.aliases.push(alias);
        }
    }
}

// =============================================================================
// Rationale
// =============================================================================

/// Per-entity audit object recording which gates it traversed and why.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rationale {
    #[serde(default)]
    pub passed_gates: BTreeMap<String, bool>,
    #[serde(default)]
    pub reasons: Vec<String>,
}

impl Rationale {
    pub fn gate(&mut self, stage: impl Into<String>, passed: bool) {
        self.passed_gates.insert(stage.into(), passed);
    }

    pub fn reason(&mut self, reason: impl Into<String>) {
        self.reasons.push(reason.into());
    }
}

// =============================================================================
// Concepts
// =============================================================================

/// An accepted, id-bearing taxonomy node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    pub id: String,
    pub level: u8,
    pub canonical_label: String,
    /// Parent concept ids. At least one for `level > 0`; exactly one after
    /// hierarchy assembly.
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub support: SupportStats,
    #[serde(default)]
    pub rationale: Rationale,
    #[serde(default)]
    pub validation_metadata: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_passed: Option<bool>,
}

impl Concept {
    pub fn new(id: impl Into<String>, level: u8, canonical_label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            level,
            canonical_label: canonical_label.into(),
            parents: Vec::new(),
            aliases: Vec::new(),
            support: SupportStats::default(),
            rationale: Rationale::default(),
            validation_metadata: BTreeMap::new(),
            validation_passed: None,
        }
    }

    pub fn with_parents(mut self, parents: Vec<String>) -> Self {
        self.parents = parents;
        self
    }

    pub fn with_aliases(mut self, aliases: Vec<String>) -> Self {
        self.aliases = aliases;
        self
    }

    pub fn with_support(mut self, support: SupportStats) -> Self {
        self.support = support;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.level > 3 {
            return Err(TaxonomyError::Entity(format!(
                "concept level {} out of range 0..=3",
                self.level
            )));
        }
        if self.id.trim().is_empty() {
            return Err(TaxonomyError::Entity("concept id must not be empty".into()));
        }
        if self.level == 0 && !self.parents.is_empty() {
            return Err(TaxonomyError::Entity(format!(
                "level-0 concept '{}' must not declare parents",
                self.id
            )));
        }
        let label_folded = self.canonical_label.to_lowercase();
        let mut seen = Vec::new();
        for alias in &self.aliases {
            if alias.trim().is_empty() {
                return Err(TaxonomyError::Entity(format!(
                    "concept '{}' carries an empty alias",
                    self.id
                )));
            }
            let folded = alias.to_lowercase();
            if folded == label_folded {
                return Err(TaxonomyError::Entity(format!(
                    "concept '{}' alias duplicates its label",
                    self.id
                )));
            }
            if seen.contains(&folded) {
                return Err(TaxonomyError::Entity(format!(
                    "concept '{}' alias '{}' is duplicated",
                    self.id, alias
                )));
            }
            seen.push(folded);
        }
        Ok(())
    }

    /// Check that declared parents sit exactly one level up.
    pub fn validate_hierarchy(&self, parent_concepts: &[Concept]) -> Result<()> {
        if self.level == 0 {
            if !self.parents.is_empty() {
                return Err(TaxonomyError::Entity(format!(
                    "level-0 concept '{}' must not declare parents",
                    self.id
                )));
            }
            return Ok(());
        }
        for parent_id in &self.parents {
            let parent = parent_concepts
                .iter()
                .find(|c| &c.id == parent_id)
                .ok_or_else(|| {
                    TaxonomyError::Entity(format!(
                        "concept '{}' references unknown parent '{}'",
                        self.id, parent_id
                    ))
                })?;
            if parent.level + 1 != self.level {
                return Err(TaxonomyError::Entity(format!(
                    "concept '{}' at level {} cannot attach to parent '{}' at level {}",
                    self.id, self.level, parent.id, parent.level
                )));
            }
        }
        Ok(())
    }

    pub fn push_alias(&mut self, alias: impl Into<String>) {
        let alias = alias.into();
        if alias.trim().is_empty() {
            return;
        }
        let folded = alias.to_lowercase();
        if folded == self.canonical_label.to_lowercase() {
            return;
        }
        if !self.aliases.iter().any(|a| a.to_lowercase() == folded) {
            self.aliases.push(alias);
        }
    }
}

// =============================================================================
// Merge and Split Operations
// =============================================================================

/// Audit record of a deduplication merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeOp {
    pub operation_id: String,
    pub winners: Vec<String>,
    pub losers: Vec<String>,
    pub rule: String,
    #[serde(default)]
    pub evidence: BTreeMap<String, String>,
}

impl MergeOp {
    pub fn new(
        winners: Vec<String>,
        losers: Vec<String>,
        rule: impl Into<String>,
        evidence: BTreeMap<String, String>,
    ) -> Result<Self> {
        if winners.is_empty() || losers.is_empty() {
            return Err(TaxonomyError::Entity(
                "merge op requires non-empty winners and losers".into(),
            ));
        }
        if winners.iter().any(|w| losers.contains(w)) {
            return Err(TaxonomyError::Entity(
                "merge op winners and losers must be disjoint".into(),
            ));
        }
        let rule = rule.into();
        Ok(Self {
            operation_id: operation_id("merge", &winners, &losers, &rule),
            winners,
            losers,
            rule,
            evidence,
        })
    }
}

/// Audit record of a disambiguation split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitOp {
    pub operation_id: String,
    pub source_id: String,
    pub new_ids: Vec<String>,
    pub rule: String,
}

impl SplitOp {
    pub fn new(
        source_id: impl Into<String>,
        new_ids: Vec<String>,
        rule: impl Into<String>,
    ) -> Result<Self> {
        let source_id = source_id.into();
        if new_ids.len() < 2 {
            return Err(TaxonomyError::Entity(
                "split op requires at least two new ids".into(),
            ));
        }
        let mut unique = new_ids.clone();
        unique.sort();
        unique.dedup();
        if unique.len() != new_ids.len() {
            return Err(TaxonomyError::Entity(
                "split op new ids must be distinct".into(),
            ));
        }
        if new_ids.iter().any(|id| id == &source_id) {
            return Err(TaxonomyError::Entity(
                "split op new ids must not include the source id".into(),
            ));
        }
        let rule = rule.into();
        Ok(Self {
            operation_id: operation_id("split", std::slice::from_ref(&source_id), &new_ids, &rule),
            source_id,
            new_ids,
            rule,
        })
    }
}

// =============================================================================
// Validation Findings
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FindingMode {
    Rule,
    Web,
    Llm,
}

/// One validator's verdict on one concept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationFinding {
    pub concept_id: String,
    pub mode: FindingMode,
    pub passed: bool,
    pub detail: String,
}

impl ValidationFinding {
    pub fn new(
        concept_id: impl Into<String>,
        mode: FindingMode,
        passed: bool,
        detail: impl Into<String>,
    ) -> Result<Self> {
        let detail = detail.into();
        if detail.trim().is_empty() {
            return Err(TaxonomyError::Entity(
                "validation finding detail must not be empty".into(),
            ));
        }
        Ok(Self {
            concept_id: concept_id.into(),
            mode,
            passed,
            detail,
        })
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Stable operation id derived from the operation's content, so audit
/// artifacts are identical across identical runs.
fn operation_id(kind: &str, left: &[String], right: &[String], rule: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_bytes());
    for id in left.iter().chain(right.iter()) {
        hasher.update(b"|");
        hasher.update(id.as_bytes());
    }
    hasher.update(b"|");
    hasher.update(rule.as_bytes());
    let digest = hasher.finalize();
    format!("{kind}:{}", hex_prefix(&digest, 12))
}

fn hex_prefix(digest: &[u8], chars: usize) -> String {
    let mut out = String::with_capacity(chars);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
        if out.len() >= chars {
            break;
        }
    }
    out.truncate(chars);
    out
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn provenance() -> Provenance {
        let mut p = Provenance::new("Example University", "https://example.edu/catalog");
        p.section = Some("departments".into());
        p
    }

    #[test]
    fn source_record_creation_defaults_language() {
        let record = SourceRecord::new("College of Engineering", provenance());
        assert_eq!(record.text, "College of Engineering");
        assert_eq!(record.meta.language, "en");
        record.validate().unwrap();
    }

    #[test]
    fn source_record_rejects_empty_text() {
        let record = SourceRecord::new("   ", provenance());
        assert!(record.validate().is_err());
    }

    #[test]
    fn source_record_fingerprint_is_stable() {
        let a = SourceRecord::new("College of Engineering", provenance());
        let b = SourceRecord::new("College of Engineering", provenance());
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 16);

        let mut hinted = a.clone();
        hinted
            .meta
            .hints
            .insert("record_id".into(), "rec-1".into());
        assert_eq!(hinted.fingerprint(), "rec-1");
    }

    #[test]
    fn candidate_parent_rules() {
        let candidate = Candidate {
            level: 1,
            label: "School of Design".into(),
            normalized: "school of design".into(),
            parents: vec!["L0:example".into()],
            aliases: vec!["Design School".into()],
            support: SupportStats::new(5, 3, 7),
        };
        candidate.validate().unwrap();

        let level0_with_parent = Candidate {
            level: 0,
            label: "College".into(),
            normalized: "college".into(),
            parents: vec!["parent".into()],
            aliases: vec![],
            support: SupportStats::default(),
        };
        assert!(level0_with_parent.validate().is_err());
    }

    #[test]
    fn candidate_alias_dedup_folds_case() {
        let mut candidate = Candidate {
            level: 2,
            label: "Machine Learning".into(),
            normalized: "machine learning".into(),
            parents: vec!["L1:ai".into()],
            aliases: vec![],
            support: SupportStats::default(),
        };
        candidate.push_alias("ML");
        candidate.push_alias("ml");
        candidate.push_alias("Machine Learning");
        assert_eq!(candidate.aliases, vec!["ML".to_string()]);
    }

    #[test]
    fn concept_hierarchy_validation() {
        let parent = Concept::new("c:1", 0, "Engineering");
        let child =
            Concept::new("c:2", 1, "Mechanical Engineering").with_parents(vec!["c:1".into()]);
        child.validate_hierarchy(&[parent.clone()]).unwrap();

        let inverted = Concept::new("c:3", 0, "Engineering").with_parents(vec!["c:2".into()]);
        assert!(inverted.validate_hierarchy(&[child]).is_err());
    }

    #[test]
    fn concept_alias_invariants() {
        let bad = Concept::new("c:1", 1, "Robotics")
            .with_parents(vec!["c:0".into()])
            .with_aliases(vec!["robotics".into()]);
        assert!(bad.validate().is_err());

        let dup = Concept::new("c:1", 1, "Robotics")
            .with_parents(vec!["c:0".into()])
            .with_aliases(vec!["Robots".into(), "robots".into()]);
        assert!(dup.validate().is_err());
    }

    #[test]
    fn snapshot_checksum_round_trip() {
        let text = "Our Applied Data Science program";
        let snapshot = PageSnapshot {
            institution: "Example University".into(),
            url: "https://example.edu/programs".into(),
            canonical_url: "https://example.edu/programs".into(),
            fetched_at: Utc::now(),
            http_status: 200,
            content_type: "text/html".into(),
            html: None,
            text: text.into(),
            lang: "en".into(),
            checksum: PageSnapshot::compute_checksum(text),
            meta: BTreeMap::new(),
        };
        snapshot.validate().unwrap();

        let mut tampered = snapshot.clone();
        tampered.text.push('!');
        assert!(tampered.validate().is_err());
    }

    #[test]
    fn merge_op_validation() {
        let op = MergeOp::new(
            vec!["c:1".into()],
            vec!["c:2".into()],
            "duplicate",
            BTreeMap::from([("score".to_string(), "0.95".to_string())]),
        )
        .unwrap();
        assert!(!op.operation_id.is_empty());

        assert!(MergeOp::new(
            vec!["c:1".into()],
            vec!["c:1".into()],
            "duplicate",
            BTreeMap::new()
        )
        .is_err());
    }

    #[test]
    fn split_op_validation() {
        let op = SplitOp::new("c:1", vec!["c:2".into(), "c:3".into()], "specialization").unwrap();
        assert_eq!(op.new_ids.len(), 2);

        assert!(SplitOp::new("c:1", vec!["c:1".into()], "specialization").is_err());
        assert!(SplitOp::new("c:1", vec!["c:2".into(), "c:2".into()], "specialization").is_err());
    }

    #[test]
    fn validation_finding_requires_detail() {
        let finding =
            ValidationFinding::new("c:1", FindingMode::Rule, true, "threshold met").unwrap();
        assert_eq!(finding.mode, FindingMode::Rule);
        assert!(ValidationFinding::new("c:1", FindingMode::Llm, false, "   ").is_err());
    }

    #[test]
    fn entity_round_trip_through_json() {
        let concept = Concept::new("concept:1:computer-science", 1, "Computer Science")
            .with_parents(vec!["concept:0:engineering".into()])
            .with_aliases(vec!["CS".into()])
            .with_support(SupportStats::new(4, 2, 9));
        let encoded = serde_json::to_string(&concept).unwrap();
        let decoded: Concept = serde_json::from_str(&encoded).unwrap();
        assert_eq!(concept, decoded);
    }
}
