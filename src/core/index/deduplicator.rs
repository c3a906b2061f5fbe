use super::record::FrameRecord;
use crate::core::distance::squared_l2;
use log::debug;

/// Squared L2 distance (embedding units) under which a frame is redundant.
pub const DEFAULT_DEDUP_THRESHOLD: f64 = 40.0;

/// 嵌入向量去重器
///
/// Greedy and single-pass: each frame is compared only with the last frame
/// that was kept, not with a window. Two near-identical frames separated by
/// one distinct frame are therefore both kept.
pub struct EmbeddingDeduplicator {
    threshold: f64,
    last_kept: Option<Vec<f32>>,
    kept: usize,
    dropped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DedupReason {
    First,
    Distinct,
    TooSimilar,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DedupDecision {
    pub is_duplicate: bool,
    pub reason: DedupReason,
    /// distance to the last kept frame, `None` for the first frame
    pub distance: Option<f64>,
}

impl EmbeddingDeduplicator {
    pub fn new() -> Self {
        Self::with_threshold(DEFAULT_DEDUP_THRESHOLD)
    }

    pub fn with_threshold(threshold: f64) -> Self {
        Self {
            threshold,
            last_kept: None,
            kept: 0,
            dropped: 0,
        }
    }

    pub fn check(&mut self, embedding: &[f32]) -> DedupDecision {
        let Some(last) = &self.last_kept else {
            self.keep(embedding);
            return DedupDecision {
                is_duplicate: false,
                reason: DedupReason::First,
                distance: None,
            };
        };

        let distance = squared_l2(last, embedding);
        if distance < self.threshold {
            self.dropped += 1;
            return DedupDecision {
                is_duplicate: true,
                reason: DedupReason::TooSimilar,
                distance: Some(distance),
            };
        }

        self.keep(embedding);
        DedupDecision {
            is_duplicate: false,
            reason: DedupReason::Distinct,
            distance: Some(distance),
        }
    }

    fn keep(&mut self, embedding: &[f32]) {
        self.last_kept = Some(embedding.to_vec());
        self.kept += 1;
    }

    /// Filters one video's records, in temporal order.
    pub fn dedup(&mut self, records: Vec<FrameRecord>) -> Vec<FrameRecord> {
        records
            .into_iter()
            .filter(|record| {
                let decision = self.check(&record.embedding);
                if decision.is_duplicate {
                    debug!(
                        "♻️ drop {} (distance {:.2} < {})",
                        record.id,
                        decision.distance.unwrap_or_default(),
                        self.threshold
                    );
                }
                !decision.is_duplicate
            })
            .collect()
    }

    pub fn kept_count(&self) -> usize {
        self.kept
    }

    pub fn dropped_count(&self) -> usize {
        self.dropped
    }

    pub fn clear(&mut self) {
        self.last_kept = None;
        self.kept = 0;
        self.dropped = 0;
    }
}

impl Default for EmbeddingDeduplicator {
    fn default() -> Self {
        Self::new()
    }
}
