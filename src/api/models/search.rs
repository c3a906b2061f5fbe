use crate::core::index::Rgb;
use crate::core::query::model::{DEFAULT_COLOR_RADIUS, DEFAULT_MAX_DISTANCE, DEFAULT_MAX_RESULTS};
use crate::core::query::{ObjectsContain, Query, QueryError, RankingParams, ResultItem};
use base64::{engine::general_purpose, Engine as _};
use image::RgbImage;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static DATA_URL_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^data:image/.+;base64,").expect("valid data url regex"));

/// 查询请求
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchRequest {
    pub query: QueryPayload,
    pub search_params: SearchParams,
}

/// Nulls, empty strings and empty lists all mean "not set".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryPayload {
    pub text_query: Option<String>,
    /// base64, optionally as a `data:image/...;base64,` URL
    pub image_query: Option<String>,
    pub object_query: Option<Vec<String>>,
    pub color_query: Option<Vec<i64>>,
    pub word_query: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchParams {
    pub objects_contain: ObjectsContain,
    pub color_radius: u32,
    /// cosine distance ceiling despite the name
    pub max_text_similarity: f64,
    pub max_image_similarity: f64,
    pub max_results: usize,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            objects_contain: ObjectsContain::Any,
            color_radius: DEFAULT_COLOR_RADIUS,
            max_text_similarity: DEFAULT_MAX_DISTANCE,
            max_image_similarity: DEFAULT_MAX_DISTANCE,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub data: Vec<ResultItem>,
}

/// Results of one video, in the order the video first appears.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoResults {
    pub video_id: String,
    pub frames: Vec<ResultItem>,
}

/// 错误响应，序列化后返回给调用方
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchApiError {
    pub error_type: String,
    pub message: String,
}

impl From<&QueryError> for SearchApiError {
    fn from(e: &QueryError) -> Self {
        let error_type = match e {
            QueryError::InvalidLabel(_) => "InvalidLabel",
            QueryError::InvalidColor(_) => "InvalidColor",
            QueryError::InvalidImage(_) => "InvalidImage",
            QueryError::ExtractorFailure { .. } => "ExtractorFailure",
            QueryError::Store(_) => "StoreError",
            QueryError::Json(_) => "BadRequest",
        };
        Self {
            error_type: error_type.to_string(),
            message: e.to_string(),
        }
    }
}

pub fn parse_color(values: &[i64]) -> Result<Rgb, QueryError> {
    match values {
        [r, g, b] => {
            let channel = |v: i64| {
                u8::try_from(v)
                    .map_err(|_| QueryError::InvalidColor(format!("channel {} out of range", v)))
            };
            Ok([channel(*r)?, channel(*g)?, channel(*b)?])
        }
        _ => Err(QueryError::InvalidColor(format!(
            "expected 3 channels, got {}",
            values.len()
        ))),
    }
}

/// Strips an optional data-URL prefix, then decodes base64 and the image.
pub fn decode_image_payload(payload: &str) -> Result<RgbImage, QueryError> {
    let data = DATA_URL_PREFIX.replace(payload, "");
    let bytes = general_purpose::STANDARD
        .decode(data.as_bytes())
        .map_err(|e| QueryError::InvalidImage(format!("base64: {}", e)))?;
    let image = image::load_from_memory(&bytes)
        .map_err(|e| QueryError::InvalidImage(e.to_string()))?;
    Ok(image.to_rgb8())
}

fn non_empty_string(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl SearchRequest {
    pub fn from_json(json: &str) -> Result<Self, QueryError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn into_query(self) -> Result<Query, QueryError> {
        let QueryPayload {
            text_query,
            image_query,
            object_query,
            color_query,
            word_query,
        } = self.query;
        let params = self.search_params;

        let mut query = Query::new().with_params(RankingParams {
            max_text_distance: params.max_text_similarity,
            max_image_distance: params.max_image_similarity,
            max_results: params.max_results,
        });

        query.text = non_empty_string(text_query);
        if let Some(payload) = non_empty_string(image_query) {
            query.image = Some(decode_image_payload(&payload)?);
        }
        query.objects = object_query.unwrap_or_default();
        query.contain = params.objects_contain;
        if let Some(values) = color_query.filter(|c| !c.is_empty()) {
            query = query.with_color(parse_color(&values)?, params.color_radius);
        }
        query.words = word_query
            .unwrap_or_default()
            .into_iter()
            .filter(|w| !w.is_empty())
            .collect();

        Ok(query)
    }
}

pub fn group_by_video(items: Vec<ResultItem>) -> Vec<VideoResults> {
    let mut groups: Vec<VideoResults> = Vec::new();
    for item in items {
        match groups.iter_mut().find(|g| g.video_id == item.video_id) {
            Some(group) => group.frames.push(item),
            None => groups.push(VideoResults {
                video_id: item.video_id.clone(),
                frames: vec![item],
            }),
        }
    }
    groups
}
