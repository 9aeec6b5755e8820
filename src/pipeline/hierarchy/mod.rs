//! Hierarchy assembly: final DAG construction, orphan handling and graph
//! invariant validation.

pub mod assembler;
pub mod graph;
pub mod validator;

pub use assembler::{AssemblyResult, HierarchyAssembler, OrphanRecord};
pub use graph::{GraphStats, HierarchyGraph};
pub use validator::{GraphValidator, InvariantChecker, ValidationReport, Violation};
