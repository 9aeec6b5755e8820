//! Deduplication: blocking, pair similarity, merge graph and the merge
//! processor.

pub mod blocking;
pub mod graph;
pub mod processor;
pub mod similarity;

pub use blocking::{
    AcronymBlocker, BlockOutput, BlockingMetrics, BlockingStrategy, CompositeBlocker,
    PhoneticBlocker, PrefixBlocker,
};
pub use graph::MergeGraph;
pub use processor::{DedupResult, DeduplicationProcessor};
pub use similarity::{FeatureSet, PairDecision, SimilarityScorer};
