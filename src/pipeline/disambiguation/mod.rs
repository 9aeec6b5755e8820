//! Disambiguation: collision detection, LLM separability and concept
//! splitting.

pub mod detector;
pub mod llm;
pub mod processor;
pub mod splitter;

pub use detector::{AmbiguityCandidate, AmbiguityDetector};
pub use llm::{LlmDisambiguator, LlmSenseDefinition, SeparabilityResult};
pub use processor::{DisambiguationOutcome, DisambiguationProcessor};
pub use splitter::{ConceptSplitter, SplitDecision};
