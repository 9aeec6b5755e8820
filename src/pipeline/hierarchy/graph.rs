//! Hierarchy Graph
//!
//! The final DAG under assembly. Enforces the unique-path invariant at
//! insertion time: a concept may carry at most one parent, and that parent
//! must already be present.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::types::{Concept, Result, TaxonomyError};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub node_count: u64,
    pub edge_count: u64,
    pub level_counts: BTreeMap<u8, u64>,
}

#[derive(Debug, Default)]
pub struct HierarchyGraph {
    nodes: BTreeMap<String, Concept>,
    parents: BTreeMap<String, BTreeSet<String>>,
    children: BTreeMap<String, BTreeSet<String>>,
}

impl HierarchyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a concept. Fails with `non-unique-path` when more than one
    /// parent is declared, and with `orphan` when the declared parent is not
    /// yet present.
    pub fn add_concept(&mut self, concept: Concept) -> Result<()> {
        if concept.parents.len() > 1 {
            return Err(TaxonomyError::invariant(
                "non-unique-path",
                format!(
                    "concept '{}' declares {} parents",
                    concept.id,
                    concept.parents.len()
                ),
            ));
        }
        if let Some(parent) = concept.parents.first()
            && !self.nodes.contains_key(parent)
        {
            return Err(TaxonomyError::invariant(
                "orphan",
                format!("concept '{}' references missing parent '{parent}'", concept.id),
            ));
        }

        let id = concept.id.clone();
        let parent_set: BTreeSet<String> = concept.parents.iter().cloned().collect();
        for parent in &parent_set {
            self.children
                .entry(parent.clone())
                .or_default()
                .insert(id.clone());
        }
        self.parents.insert(id.clone(), parent_set);
        self.nodes.insert(id, concept);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Concept> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn concepts(&self) -> impl Iterator<Item = &Concept> {
        self.nodes.values()
    }

    pub fn parents_of(&self, id: &str) -> impl Iterator<Item = &String> + use<'_> {
        self.parents.get(id).into_iter().flatten()
    }

    pub fn children_of(&self, id: &str) -> impl Iterator<Item = &String> + use<'_> {
        self.children.get(id).into_iter().flatten()
    }

    pub fn statistics(&self) -> GraphStats {
        let mut stats = GraphStats {
            node_count: self.nodes.len() as u64,
            edge_count: self.parents.values().map(|p| p.len() as u64).sum(),
            level_counts: BTreeMap::new(),
        };
        for concept in self.nodes.values() {
            *stats.level_counts.entry(concept.level).or_insert(0) += 1;
        }
        stats
    }

    #[cfg(test)]
    pub(crate) fn inject_parent(&mut self, child: &str, parent: &str) {
        self.parents
            .entry(child.to_string())
            .or_default()
            .insert(parent.to_string());
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn concept(id: &str, level: u8, parents: &[&str]) -> Concept {
        Concept::new(id, level, format!("Concept {id}"))
            .with_parents(parents.iter().map(|p| p.to_string()).collect())
    }

    #[test]
    fn add_concepts_and_statistics() {
        let mut graph = HierarchyGraph::new();
        graph.add_concept(concept("root", 0, &[])).unwrap();
        graph.add_concept(concept("child", 1, &["root"])).unwrap();

        let stats = graph.statistics();
        assert_eq!(stats.node_count, 2);
        assert_eq!(stats.edge_count, 1);
        assert_eq!(stats.level_counts[&0], 1);
        assert_eq!(stats.level_counts[&1], 1);
    }

    #[test]
    fn unique_path_violation_raises() {
        let mut graph = HierarchyGraph::new();
        graph.add_concept(concept("root", 0, &[])).unwrap();
        graph.add_concept(concept("parent_a", 1, &["root"])).unwrap();
        graph.add_concept(concept("parent_b", 1, &["root"])).unwrap();

        let err = graph
            .add_concept(concept("child", 2, &["parent_a", "parent_b"]))
            .unwrap_err();
        assert!(matches!(
            err,
            TaxonomyError::Invariant { ref code, .. } if code == "non-unique-path"
        ));
    }

    #[test]
    fn missing_parent_is_an_orphan_error() {
        let mut graph = HierarchyGraph::new();
        let err = graph
            .add_concept(concept("dangling", 1, &["missing"]))
            .unwrap_err();
        assert!(matches!(
            err,
            TaxonomyError::Invariant { ref code, .. } if code == "orphan"
        ));
    }
}
