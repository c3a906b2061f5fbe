pub mod indexer;
pub mod models;
pub mod search;

pub use indexer::FrameIndexer;
pub use search::FrameSearch;
