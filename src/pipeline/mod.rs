//! Pipeline stages: S0–S3, consolidation, validation, deduplication,
//! disambiguation and hierarchy assembly, plus shared artifact I/O.

pub mod artifacts;
pub mod consolidation;
pub mod deduplication;
pub mod disambiguation;
pub mod hierarchy;
pub mod s0_raw_extraction;
pub mod s1_extraction;
pub mod s2_frequency;
pub mod s3_verification;
pub mod validation;

pub use consolidation::{ConsolidationOutcome, ConsolidationStats, Consolidator, concept_id, slugify};
pub use s1_extraction::CandidateEnvelope;
pub use s2_frequency::CandidateDecision;
pub use s3_verification::{TokenVerificationDecision, VerificationInput};
