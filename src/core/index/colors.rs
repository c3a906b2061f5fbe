use super::extractors::{ColorSummarizer, ExtractorError};
use super::record::{ChannelHistograms, ColorSummary, Rgb};
use image::RgbImage;
use std::collections::HashMap;

pub const DOMINANT_COLOR_COUNT: usize = 10;

/// 主色 + 通道直方图
///
/// Dominant colors are the most frequent exact RGB values. Equal counts are
/// ordered by the color value so the output does not depend on hash order.
pub struct HistogramColorSummarizer {
    top_n: usize,
}

impl HistogramColorSummarizer {
    pub fn new() -> Self {
        Self {
            top_n: DOMINANT_COLOR_COUNT,
        }
    }

    pub fn with_top_n(top_n: usize) -> Self {
        Self { top_n }
    }
}

impl Default for HistogramColorSummarizer {
    fn default() -> Self {
        Self::new()
    }
}

impl ColorSummarizer for HistogramColorSummarizer {
    fn colors(&self, image: &RgbImage) -> Result<ColorSummary, ExtractorError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(ExtractorError::new("empty image"));
        }

        let mut histogram = ChannelHistograms::empty();
        let mut counts: HashMap<Rgb, u32> = HashMap::new();

        for px in image.pixels() {
            let [r, g, b] = px.0;
            histogram.red[r as usize] += 1;
            histogram.green[g as usize] += 1;
            histogram.blue[b as usize] += 1;
            *counts.entry(px.0).or_insert(0) += 1;
        }

        let mut ranked: Vec<(Rgb, u32)> = counts.into_iter().collect();
        ranked.sort_unstable_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        let dominant = ranked
            .into_iter()
            .take(self.top_n)
            .map(|(color, _)| color)
            .collect();

        Ok(ColorSummary {
            dominant,
            histogram,
        })
    }
}
