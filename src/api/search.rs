//! 多模态检索

use crate::api::models::search::{
    group_by_video, SearchApiError, SearchRequest, SearchResponse, VideoResults,
};
use crate::core::index::Embedder;
use crate::core::query::{self, Query, QueryError, ResultItem};
use crate::core::store::FrameStore;
use log::{info, warn};
use serde::Serialize;
use std::sync::Arc;

/// 多模态检索入口 - 文本 / 图片 / 物体 / 颜色 / 文字
///
/// ```ignore
/// let search = FrameSearch::new(store.clone(), embedder);
/// let body = search.search_json(r#"{"query": {"textQuery": "a red car"}}"#);
/// ```
pub struct FrameSearch {
    store: Arc<dyn FrameStore>,
    embedder: Arc<dyn Embedder>,
}

impl FrameSearch {
    pub fn new(store: Arc<dyn FrameStore>, embedder: Arc<dyn Embedder>) -> Self {
        info!("🔍 FrameSearch: created");
        Self { store, embedder }
    }

    pub fn query(&self, query: &Query) -> Result<Vec<ResultItem>, QueryError> {
        query::run_query(self.store.as_ref(), self.embedder.as_ref(), query)
    }

    pub fn search(&self, request: SearchRequest) -> Result<SearchResponse, QueryError> {
        let query = request.into_query()?;
        Ok(SearchResponse {
            data: self.query(&query)?,
        })
    }

    /// Same results, bucketed per video.
    pub fn search_grouped(&self, request: SearchRequest) -> Result<Vec<VideoResults>, QueryError> {
        Ok(group_by_video(self.search(request)?.data))
    }

    /// JSON in, JSON out. Failures become `{"error_type", "message"}`.
    pub fn search_json(&self, body: &str) -> String {
        let result = SearchRequest::from_json(body).and_then(|request| self.search(request));
        match result {
            Ok(response) => to_json(&response),
            Err(e) => {
                warn!("⚠️ search failed: {}", e);
                to_json(&SearchApiError::from(&e))
            }
        }
    }

    /// Every indexed frame of one video, by timestamp, score 0.
    pub fn explore(&self, video_id: &str) -> Result<SearchResponse, QueryError> {
        let records = self.store.frames_for_video(video_id)?;
        Ok(SearchResponse {
            data: query::explore_items(records),
        })
    }
}

impl Drop for FrameSearch {
    fn drop(&mut self) {
        info!("🗑️ FrameSearch: released");
    }
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| {
        serde_json::json!({ "error_type": "Internal", "message": e.to_string() }).to_string()
    })
}
