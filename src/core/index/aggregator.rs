//! 特征聚合 - one keyframe in, one frame record out

use super::error::IndexError;
use super::extractors::{ExtractorError, Extractors};
use super::record::FrameRecord;
use crate::core::video::Keyframe;
use log::debug;
use rayon::prelude::*;

pub struct FeatureAggregator {
    extractors: Extractors,
}

fn failure(extractor: &'static str, frame: &str, err: ExtractorError) -> IndexError {
    IndexError::ExtractorFailure {
        extractor,
        frame: frame.to_string(),
        reason: err.to_string(),
    }
}

impl FeatureAggregator {
    pub fn new(extractors: Extractors) -> Self {
        Self { extractors }
    }

    pub fn extractors(&self) -> &Extractors {
        &self.extractors
    }

    /// Any extractor error fails the whole frame.
    pub fn extract(&self, video_id: &str, keyframe: &Keyframe) -> Result<FrameRecord, IndexError> {
        let frame_id = keyframe.frame_id();
        let image = &keyframe.image;

        let embedding = self
            .extractors
            .embedder
            .embed_image(image)
            .map_err(|e| failure("embedding", &frame_id, e))?;
        let objects = self
            .extractors
            .objects
            .detect(image)
            .map_err(|e| failure("object", &frame_id, e))?;
        let words = self
            .extractors
            .text
            .read(image)
            .map_err(|e| failure("ocr", &frame_id, e))?;
        let colors = self
            .extractors
            .colors
            .colors(image)
            .map_err(|e| failure("color", &frame_id, e))?;

        debug!(
            "🧩 {}/{}: dim={} objects={} words={} colors={}",
            video_id,
            frame_id,
            embedding.len(),
            objects.len(),
            words.len(),
            colors.dominant.len()
        );

        Ok(FrameRecord {
            id: FrameRecord::record_id(video_id, &frame_id),
            video_id: video_id.to_string(),
            frame_id,
            timestamp: keyframe.timestamp,
            embedding,
            objects,
            words,
            dominant_colors: colors.dominant,
            histogram: colors.histogram,
        })
    }

    /// Extracts every keyframe in parallel. Results keep keyframe order.
    pub fn extract_all(
        &self,
        video_id: &str,
        keyframes: &[Keyframe],
    ) -> Vec<Result<FrameRecord, IndexError>> {
        keyframes
            .par_iter()
            .map(|k| self.extract(video_id, k))
            .collect()
    }
}
