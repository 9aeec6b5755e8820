//! S1: LLM candidate extraction, label normalization, parent
//! anchoring and aggregation into envelopes.

pub mod extractor;
pub mod normalizer;
pub mod parent_index;
pub mod processor;

pub use extractor::{ExtractedCandidate, ExtractionMetrics, ExtractionProcessor, RawCandidate};
pub use normalizer::{CandidateNormalizer, NormalizedCandidate, NormalizerMetrics};
pub use parent_index::ParentIndex;
pub use processor::{CandidateEnvelope, S1Processor};
