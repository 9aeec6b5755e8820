//! S0: snapshot loading, segmentation and source-record emission.

pub mod loader;
pub mod processor;
pub mod segmenter;

pub use loader::{LoaderMetrics, SnapshotLoader, SnapshotRecord};
pub use processor::{
    ExtractionSummary, ProcessorMetrics, RawExtractionProcessor, extract_from_snapshots,
};
pub use segmenter::{Block, BlockType, ContentSegmenter, SegmentResult};
