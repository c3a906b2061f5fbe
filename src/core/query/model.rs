use crate::core::index::Rgb;
use image::RgbImage;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_RESULTS: usize = 100;
pub const DEFAULT_MAX_DISTANCE: f64 = 0.9;
pub const DEFAULT_COLOR_RADIUS: u32 = 5;

/// 物体包含模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectsContain {
    /// frame shares at least one label
    #[default]
    Any,
    /// frame has every label
    All,
    /// frame has exactly these labels
    Only,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorQuery {
    pub target: Rgb,
    pub radius: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankingParams {
    /// cosine distance ceiling for the text path
    pub max_text_distance: f64,
    pub max_image_distance: f64,
    pub max_results: usize,
}

impl Default for RankingParams {
    fn default() -> Self {
        Self {
            max_text_distance: DEFAULT_MAX_DISTANCE,
            max_image_distance: DEFAULT_MAX_DISTANCE,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }
}

/// A multi-modal query. Empty strings and empty lists count as absent.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub text: Option<String>,
    pub image: Option<RgbImage>,
    pub objects: Vec<String>,
    pub contain: ObjectsContain,
    pub color: Option<ColorQuery>,
    pub words: Vec<String>,
    pub params: RankingParams,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_image(mut self, image: RgbImage) -> Self {
        self.image = Some(image);
        self
    }

    pub fn with_objects<S: AsRef<str>>(mut self, labels: &[S], contain: ObjectsContain) -> Self {
        self.objects = labels.iter().map(|l| l.as_ref().to_string()).collect();
        self.contain = contain;
        self
    }

    pub fn with_color(mut self, target: Rgb, radius: u32) -> Self {
        self.color = Some(ColorQuery { target, radius });
        self
    }

    pub fn with_words<S: AsRef<str>>(mut self, words: &[S]) -> Self {
        self.words = words.iter().map(|w| w.as_ref().to_string()).collect();
        self
    }

    pub fn with_params(mut self, params: RankingParams) -> Self {
        self.params = params;
        self
    }

    /// The text channel, `None` when missing or empty.
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| !t.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.text().is_none()
            && self.image.is_none()
            && self.objects.is_empty()
            && self.color.is_none()
            && self.words.is_empty()
    }
}
