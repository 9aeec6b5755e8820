//! Hierarchy Assembly
//!
//! Inserts concepts in ascending level order and resolves orphans per
//! policy: `quarantine` keeps them out of the graph and on the orphan list;
//! `attach_placeholder` synthesizes a placeholder parent chain up to level
//! 0. Produces the final graph, a validation report and a manifest section
//! with graph statistics.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::warn;

use crate::config::HierarchyPolicy;
use crate::types::{Concept, Result, TaxonomyError};

use super::graph::HierarchyGraph;
use super::validator::{GraphValidator, InvariantChecker, ValidationReport};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrphanRecord {
    pub concept_id: String,
    pub strategy: String,
    pub reason: String,
    pub missing: Vec<String>,
}

#[derive(Debug)]
pub struct AssemblyResult {
    pub graph: HierarchyGraph,
    pub orphans: Vec<OrphanRecord>,
    pub placeholders: Vec<String>,
    pub validation: ValidationReport,
    pub manifest: Value,
}

pub struct HierarchyAssembler {
    policy: HierarchyPolicy,
    pub graph: HierarchyGraph,
    pub orphans: Vec<OrphanRecord>,
    pub placeholders: Vec<String>,
}

impl HierarchyAssembler {
    pub fn new(policy: HierarchyPolicy) -> Self {
        Self {
            policy,
            graph: HierarchyGraph::new(),
            orphans: Vec::new(),
            placeholders: Vec::new(),
        }
    }

    /// Insert all concepts, ascending by level, resolving orphans per
    /// policy.
    pub fn process_concepts(&mut self, concepts: Vec<Concept>) -> Result<()> {
        let mut ordered = concepts;
        ordered.sort_by(|a, b| (a.level, &a.id).cmp(&(b.level, &b.id)));

        for mut concept in ordered {
            // Drop parent references that never made it into the graph.
            let missing: Vec<String> = concept
                .parents
                .iter()
                .filter(|p| !self.graph.contains(p))
                .cloned()
                .collect();
            concept.parents.retain(|p| self.graph.contains(p));

            if concept.parents.len() > 1 {
                if self.policy.orphan_strategy == "quarantine" {
                    warn!(concept = %concept.id, "quarantining multi-parent concept");
                    self.orphans.push(OrphanRecord {
                        concept_id: concept.id.clone(),
                        strategy: "quarantine".into(),
                        reason: "non-unique-path".into(),
                        missing,
                    });
                    continue;
                }
                return Err(TaxonomyError::invariant(
                    "non-unique-path",
                    format!(
                        "concept '{}' retains {} parents after resolution",
                        concept.id,
                        concept.parents.len()
                    ),
                ));
            }

            if concept.level > 0 && concept.parents.is_empty() {
                match self.policy.orphan_strategy.as_str() {
                    "attach_placeholder" => {
                        let parent = self.ensure_placeholder_chain(concept.level)?;
                        concept.parents = vec![parent];
                    }
                    _ => {
                        self.orphans.push(OrphanRecord {
                            concept_id: concept.id.clone(),
                            strategy: "quarantine".into(),
                            reason: "orphan".into(),
                            missing,
                        });
                        continue;
                    }
                }
            }

            self.graph.add_concept(concept)?;
        }
        Ok(())
    }

    /// Synthesize placeholder ancestors up to level 0 and return the id of
    /// the placeholder at `level - 1`.
    fn ensure_placeholder_chain(&mut self, level: u8) -> Result<String> {
        let mut previous: Option<String> = None;
        for k in 0..level {
            let id = format!("{}level{k}", self.policy.placeholder_parent_prefix);
            if !self.graph.contains(&id) {
                let mut placeholder = Concept::new(id.clone(), k, format!("Placeholder Level {k}"));
                if let Some(parent) = &previous {
                    placeholder.parents = vec![parent.clone()];
                }
                placeholder.rationale.gate("placeholder", true);
                self.graph.add_concept(placeholder)?;
                self.placeholders.push(id.clone());
            }
            previous = Some(id);
        }
        previous.ok_or_else(|| {
            TaxonomyError::invariant("orphan", "placeholder chain requested for level 0")
        })
    }

    /// Assemble, validate and emit the manifest section.
    pub fn run(mut self, concepts: Vec<Concept>) -> Result<AssemblyResult> {
        self.process_concepts(concepts)?;

        let validator = GraphValidator::new(InvariantChecker::new(self.policy.clone()));
        let validation = validator.run(&self.graph);
        let stats = self.graph.statistics();

        let manifest = json!({
            "policy": self.policy,
            "graph_stats": stats,
            "placeholders": self.placeholders,
            "orphans": self.orphans,
            "violations": validation.violations,
        });

        Ok(AssemblyResult {
            graph: self.graph,
            orphans: self.orphans,
            placeholders: self.placeholders,
            validation,
            manifest,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
