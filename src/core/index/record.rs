use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type Rgb = [u8; 3];

pub const HISTOGRAM_BINS: usize = 256;

/// 每通道 256 桶强度直方图
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelHistograms {
    pub red: Vec<u32>,
    pub green: Vec<u32>,
    pub blue: Vec<u32>,
}

impl ChannelHistograms {
    pub fn empty() -> Self {
        Self {
            red: vec![0; HISTOGRAM_BINS],
            green: vec![0; HISTOGRAM_BINS],
            blue: vec![0; HISTOGRAM_BINS],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorSummary {
    /// most frequent first
    pub dominant: Vec<Rgb>,
    pub histogram: ChannelHistograms,
}

/// 索引单元 - one keyframe of one video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    pub id: String,
    pub video_id: String,
    pub frame_id: String,
    pub timestamp: f64,
    pub embedding: Vec<f32>,
    pub objects: BTreeMap<String, u32>,
    pub words: Vec<String>,
    pub dominant_colors: Vec<Rgb>,
    pub histogram: ChannelHistograms,
}

impl FrameRecord {
    pub fn record_id(video_id: &str, frame_id: &str) -> String {
        format!("{}-{}", video_id, frame_id)
    }

    /// Sorted, since the map is ordered.
    pub fn object_labels(&self) -> Vec<String> {
        self.objects.keys().cloned().collect()
    }

    /// A single dominant color means a blank or solid frame.
    pub fn is_flat(&self) -> bool {
        self.dominant_colors.len() == 1
    }
}
