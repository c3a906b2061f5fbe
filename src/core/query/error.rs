use crate::core::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Unknown object label: {0}")]
    InvalidLabel(String),
    #[error("Invalid color: {0}")]
    InvalidColor(String),
    #[error("Invalid query image: {0}")]
    InvalidImage(String),
    #[error("{modality} embedding failed: {reason}")]
    ExtractorFailure {
        modality: &'static str,
        reason: String,
    },
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
