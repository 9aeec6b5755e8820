//! Graph Validation
//!
//! Walks the assembled hierarchy and reports structured violations: orphan
//! nodes, multi-parent nodes (`non-unique-path`), cycles and level skips.
//! Violations carry stable codes so downstream tooling can aggregate them.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::config::HierarchyPolicy;

use super::graph::HierarchyGraph;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub code: String,
    pub concept_id: String,
    pub detail: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub passed: bool,
    pub violations: Vec<Violation>,
}

/// Per-node invariant checks.
pub struct InvariantChecker {
    policy: HierarchyPolicy,
}

impl InvariantChecker {
    pub fn new(policy: HierarchyPolicy) -> Self {
        Self { policy }
    }

    fn is_placeholder(&self, id: &str) -> bool {
        id.starts_with(&self.policy.placeholder_parent_prefix)
    }

    pub fn check_node(&self, graph: &HierarchyGraph, id: &str) -> Vec<Violation> {
        let mut violations = Vec::new();
        let Some(concept) = graph.get(id) else {
            return violations;
        };
        let parents: Vec<&String> = graph.parents_of(id).collect();

        if concept.level > 0 && parents.is_empty() && !self.is_placeholder(id) {
            violations.push(Violation {
                code: "orphan".into(),
                concept_id: id.to_string(),
                detail: format!("level-{} concept has no parent", concept.level),
            });
        }
        if parents.len() > 1 {
            violations.push(Violation {
                code: "non-unique-path".into(),
                concept_id: id.to_string(),
                detail: format!("concept has {} parents", parents.len()),
            });
        }
        for parent_id in parents {
            if let Some(parent) = graph.get(parent_id)
                && parent.level + 1 != concept.level
            {
                violations.push(Violation {
                    code: "level-skip".into(),
                    concept_id: id.to_string(),
                    detail: format!(
                        "level-{} concept attached to level-{} parent '{parent_id}'",
                        concept.level, parent.level
                    ),
                });
            }
        }
        violations
    }
}

/// Whole-graph walk: per-node invariants plus cycle detection.
pub struct GraphValidator {
    checker: InvariantChecker,
}

impl GraphValidator {
    pub fn new(checker: InvariantChecker) -> Self {
        Self { checker }
    }

    pub fn run(&self, graph: &HierarchyGraph) -> ValidationReport {
        let mut violations = Vec::new();
        for concept in graph.concepts() {
            violations.extend(self.checker.check_node(graph, &concept.id));
        }
        violations.extend(detect_cycles(graph));
        ValidationReport {
            passed: violations.is_empty(),
            violations,
        }
    }
}

fn detect_cycles(graph: &HierarchyGraph) -> Vec<Violation> {
    let mut violations = Vec::new();
    let mut settled: BTreeSet<String> = BTreeSet::new();
    let mut flagged: BTreeSet<String> = BTreeSet::new();

    for concept in graph.concepts() {
        if settled.contains(&concept.id) {
            continue;
        }
        // Walk parent edges; the path either terminates, rejoins a settled
        // node, or revisits itself.
        let mut path: Vec<String> = Vec::new();
        let mut seen: BTreeMap<String, usize> = BTreeMap::new();
        let mut cursor = concept.id.clone();
        loop {
            if settled.contains(&cursor) {
                break;
            }
            if let Some(&position) = seen.get(&cursor) {
                for member in &path[position..] {
                    if flagged.insert(member.clone()) {
                        violations.push(Violation {
                            code: "cycle".into(),
                            concept_id: member.clone(),
                            detail: "concept participates in a parent cycle".into(),
                        });
                    }
                }
                break;
            }
            seen.insert(cursor.clone(), path.len());
            path.push(cursor.clone());
            match graph.parents_of(&cursor).next() {
                Some(parent) => cursor = parent.clone(),
                None => break,
            }
        }
        settled.extend(path);
    }
    violations
}

// =============================================================================
// Tests
// =============================================================================
