pub mod aggregator;
pub mod colors;
pub mod deduplicator;
pub mod error;
pub mod extractors;
pub mod pipeline;
pub mod record;

pub use aggregator::FeatureAggregator;
pub use colors::{HistogramColorSummarizer, DOMINANT_COLOR_COUNT};
pub use deduplicator::{DedupDecision, DedupReason, EmbeddingDeduplicator, DEFAULT_DEDUP_THRESHOLD};
pub use error::IndexError;
pub use extractors::{
    ColorSummarizer, Embedder, ExtractorError, Extractors, ObjectDetector, TextReader,
};
pub use pipeline::{BatchReport, IndexingConfig, IndexingPipeline, VideoIndexReport};
pub use record::{ChannelHistograms, ColorSummary, FrameRecord, Rgb};
