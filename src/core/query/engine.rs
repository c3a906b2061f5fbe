use super::builder::QueryBuilder;
use super::error::QueryError;
use super::model::Query;
use super::ranker::{self, ResultItem};
use crate::core::index::Embedder;
use crate::core::store::FrameStore;
use log::debug;
use std::time::Instant;

/// Build → retrieve → rank. Fails as a whole, never returns partial results.
pub fn run_query(
    store: &dyn FrameStore,
    embedder: &dyn Embedder,
    query: &Query,
) -> Result<Vec<ResultItem>, QueryError> {
    let start = Instant::now();
    let compiled = QueryBuilder::new(embedder).build(query)?;
    let candidates = store.search(&compiled)?;
    let retrieved = candidates.len();

    let items = ranker::rank(candidates, compiled.color_target(), compiled.max_results);
    debug!(
        "⚡ query: {} candidates → {} results in {:?}",
        retrieved,
        items.len(),
        start.elapsed()
    );
    Ok(items)
}
