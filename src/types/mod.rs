//! Core types: unified error taxonomy and the pipeline entity model.

pub mod entities;
pub mod error;

pub use entities::{
    Candidate, Concept, FindingMode, MergeOp, PageSnapshot, Provenance, Rationale, SourceMeta,
    SourceRecord, SplitOp, SupportStats, ValidationFinding,
};
pub use error::{ProviderErrorKind, Result, TaxonomyError};
