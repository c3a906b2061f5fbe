//! 帧存储契约
//!
//! The persistent vector store lives outside this crate. [`FrameStore`] is
//! the contract the indexer writes to and the query engine reads from;
//! [`memory::InMemoryStore`] is an exact-scan implementation and [`sql`]
//! renders the equivalent pgvector statements.

pub mod memory;
pub mod sql;

use crate::core::index::FrameRecord;
use crate::core::query::CompiledQuery;
use thiserror::Error;

pub use memory::InMemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Duplicate frame id: {0}")]
    DuplicateId(String),
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// One match of a search, with the raw distance terms for the ranker.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub record: FrameRecord,
    /// cosine distance to the text vector, when the query had text
    pub text_distance: Option<f64>,
    pub image_distance: Option<f64>,
}

impl Candidate {
    /// Sum of the present distance terms.
    pub fn partial_distance(&self) -> f64 {
        self.text_distance.unwrap_or(0.0) + self.image_distance.unwrap_or(0.0)
    }
}

pub trait FrameStore: Send + Sync {
    /// Ids are unique across the whole store.
    fn append(&self, record: &FrameRecord) -> Result<(), StoreError>;

    /// Returns the number of records removed.
    fn delete_video(&self, video_id: &str) -> Result<usize, StoreError>;

    /// Swaps every record of `video_id` for `records` in one step. On error
    /// the video keeps its previous records. Returns the number replaced.
    fn replace_video(&self, video_id: &str, records: &[FrameRecord]) -> Result<usize, StoreError>;

    /// Candidates in arbitrary order.
    fn search(&self, query: &CompiledQuery) -> Result<Vec<Candidate>, StoreError>;

    /// All frames of one video ordered by timestamp.
    fn frames_for_video(&self, video_id: &str) -> Result<Vec<FrameRecord>, StoreError>;
}
