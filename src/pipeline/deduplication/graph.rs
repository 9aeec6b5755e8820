//! Merge Graph
//!
//! Union-find over concept ids. Accepted pairs become edges; connected
//! components become merge groups.

use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct MergeGraph {
    parent: BTreeMap<String, String>,
    edges: u64,
}

impl MergeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, id: &str) {
        self.parent
            .entry(id.to_string())
            .or_insert_with(|| id.to_string());
    }

    pub fn node_count(&self) -> u64 {
        self.parent.len() as u64
    }

    pub fn edge_count(&self) -> u64 {
        self.edges
    }

    fn find(&mut self, id: &str) -> String {
        let mut root = id.to_string();
        while self.parent[&root] != root {
            root = self.parent[&root].clone();
        }
        // Path compression.
        let mut cursor = id.to_string();
        while self.parent[&cursor] != root {
            let next = self.parent[&cursor].clone();
            self.parent.insert(cursor, root.clone());
            cursor = next;
        }
        root
    }

    pub fn union(&mut self, a: &str, b: &str) {
        self.add_node(a);
        self.add_node(b);
        self.edges += 1;
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a != root_b {
            // Deterministic: the lexicographically smaller root wins.
            let (keep, absorb) = if root_a < root_b {
                (root_a, root_b)
            } else {
                (root_b, root_a)
            };
            self.parent.insert(absorb, keep);
        }
    }

    /// Connected components, each sorted, ordered by their smallest member.
    pub fn components(&mut self) -> Vec<Vec<String>> {
        let ids: Vec<String> = self.parent.keys().cloned().collect();
        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for id in ids {
            let root = self.find(&id);
            groups.entry(root).or_default().push(id);
        }
        groups.into_values().collect()
    }
}

// =============================================================================
// Tests
// =============================================================================
