use crate::core::distance::squared_l2_rgb;
use crate::core::index::{FrameRecord, Rgb};
use crate::core::store::Candidate;
use serde::{Deserialize, Serialize};

/// 检索结果项 - lower score is better
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultItem {
    pub video_id: String,
    pub frame_id: String,
    pub timestamp: f64,
    pub dominant_colors: Vec<Rgb>,
    /// sorted labels
    pub objects: Vec<String>,
    pub text: Vec<String>,
    pub score: f64,
}

impl ResultItem {
    pub fn from_record(record: FrameRecord, score: f64) -> Self {
        let objects = record.object_labels();
        Self {
            video_id: record.video_id,
            frame_id: record.frame_id,
            timestamp: record.timestamp,
            dominant_colors: record.dominant_colors,
            objects,
            text: record.words,
            score,
        }
    }
}

/// Closest dominant color to `target`, squared and scaled by 1/255.
/// A frame without colors gets no penalty.
pub fn color_refinement(dominant: &[Rgb], target: Rgb) -> f64 {
    dominant
        .iter()
        .map(|c| squared_l2_rgb(*c, target))
        .min_by(f64::total_cmp)
        .map_or(0.0, |d| d / 255.0)
}

/// Fuses the distance terms, sorts ascending (stable, so ties keep retrieval
/// order) and keeps the first `max_results`.
pub fn rank(candidates: Vec<Candidate>, color_target: Option<Rgb>, max_results: usize) -> Vec<ResultItem> {
    let mut items: Vec<ResultItem> = candidates
        .into_iter()
        .map(|candidate| {
            let mut score = candidate.partial_distance();
            if let Some(target) = color_target {
                score += color_refinement(&candidate.record.dominant_colors, target);
            }
            ResultItem::from_record(candidate.record, score)
        })
        .collect();

    items.sort_by(|a, b| a.score.total_cmp(&b.score));
    items.truncate(max_results);
    items
}

/// Frames of one video as zero-score items, order unchanged.
pub fn explore_items(records: Vec<FrameRecord>) -> Vec<ResultItem> {
    records
        .into_iter()
        .map(|r| ResultItem::from_record(r, 0.0))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::index::ChannelHistograms;
    use std::collections::BTreeMap;

    fn candidate(n: u32, text: Option<f64>, image: Option<f64>, colors: &[Rgb]) -> Candidate {
        Candidate {
            record: FrameRecord {
                id: format!("v-frame_{}", n),
                video_id: "v".into(),
                frame_id: format!("frame_{}", n),
                timestamp: n as f64,
                embedding: vec![],
                objects: BTreeMap::from([("dog".to_string(), 1), ("cat".to_string(), 2)]),
                words: vec![],
                dominant_colors: colors.to_vec(),
                histogram: ChannelHistograms::empty(),
            },
            text_distance: text,
            image_distance: image,
        }
    }

    fn frame_ids(items: &[ResultItem]) -> Vec<&str> {
        items.iter().map(|i| i.frame_id.as_str()).collect()
    }

    #[test]
    fn test_color_refinement() {
        assert_eq!(color_refinement(&[], [0, 0, 0]), 0.0);
        // nearest is [10, 0, 0]: 100 / 255
        let r = color_refinement(&[[200, 200, 200], [10, 0, 0]], [0, 0, 0]);
        assert!((r - 100.0 / 255.0).abs() < 1e-12);
    }

    #[test]
    fn test_sums_present_terms() {
        let items = rank(
            vec![
                candidate(1, Some(0.3), Some(0.4), &[]),
                candidate(2, Some(0.5), None, &[]),
                candidate(3, None, None, &[]),
            ],
            None,
            10,
        );
        assert_eq!(frame_ids(&items), vec!["frame_3", "frame_2", "frame_1"]);
        assert!((items[2].score - 0.7).abs() < 1e-12);
        assert_eq!(items[0].objects, vec!["cat", "dog"]);
    }

    #[test]
    fn test_stable_ties_and_truncation() {
        let candidates: Vec<Candidate> = (1..=6).map(|n| candidate(n, Some(0.2), None, &[])).collect();
        let items = rank(candidates, None, 4);
        assert_eq!(frame_ids(&items), vec!["frame_1", "frame_2", "frame_3", "frame_4"]);
    }

    #[test]
    fn test_color_orders_within_bucket() {
        let items = rank(
            vec![
                candidate(1, None, None, &[[104, 0, 0]]),
                candidate(2, None, None, &[[100, 1, 0], [0, 0, 0]]),
                candidate(3, None, None, &[]),
            ],
            Some([100, 0, 0]),
            10,
        );
        assert_eq!(frame_ids(&items), vec!["frame_3", "frame_2", "frame_1"]);
        assert!((items[2].score - 16.0 / 255.0).abs() < 1e-12);
    }

    #[test]
    fn test_explore_items_keep_order() {
        let records = vec![candidate(2, None, None, &[]).record, candidate(1, None, None, &[]).record];
        let items = explore_items(records);
        assert_eq!(frame_ids(&items), vec!["frame_2", "frame_1"]);
        assert!(items.iter().all(|i| i.score == 0.0));
    }
}
