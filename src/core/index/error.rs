use crate::core::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Malformed shot boundaries: {0}")]
    MalformedBoundaries(String),
    #[error("Decode stream ended after {emitted} of {expected} keyframes")]
    DecodeExhausted { emitted: usize, expected: usize },
    #[error("{extractor} extractor failed on {frame}: {reason}")]
    ExtractorFailure {
        extractor: &'static str,
        frame: String,
        reason: String,
    },
    #[error("Invalid frame rate: {0}")]
    InvalidFrameRate(f64),
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Encode error: {0}")]
    Encode(String),
    #[error("Probe error: {0}")]
    Probe(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),
}
