//! Feature extractor contracts
//!
//! The ML models (joint image/text embedding, object detection, OCR) live
//! outside this crate. They are injected as shared handles so a process can
//! load each model once and tests can swap in the doubles from [`mock`].

use super::colors::HistogramColorSummarizer;
use super::record::ColorSummary;
use image::RgbImage;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ExtractorError(pub String);

impl ExtractorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Image and text encoders sharing one embedding space.
pub trait Embedder: Send + Sync {
    fn embed_image(&self, image: &RgbImage) -> Result<Vec<f32>, ExtractorError>;

    fn embed_text(&self, text: &str) -> Result<Vec<f32>, ExtractorError>;
}

/// Label → occurrence count, already filtered by the detector's own
/// confidence threshold.
pub trait ObjectDetector: Send + Sync {
    fn detect(&self, image: &RgbImage) -> Result<BTreeMap<String, u32>, ExtractorError>;
}

/// OCR returning lowercase, whitespace-split tokens.
pub trait TextReader: Send + Sync {
    fn read(&self, image: &RgbImage) -> Result<Vec<String>, ExtractorError>;
}

pub trait ColorSummarizer: Send + Sync {
    fn colors(&self, image: &RgbImage) -> Result<ColorSummary, ExtractorError>;
}

/// 特征提取服务句柄集合
#[derive(Clone)]
pub struct Extractors {
    pub embedder: Arc<dyn Embedder>,
    pub objects: Arc<dyn ObjectDetector>,
    pub text: Arc<dyn TextReader>,
    pub colors: Arc<dyn ColorSummarizer>,
}

impl Extractors {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        objects: Arc<dyn ObjectDetector>,
        text: Arc<dyn TextReader>,
        colors: Arc<dyn ColorSummarizer>,
    ) -> Self {
        Self {
            embedder,
            objects,
            text,
            colors,
        }
    }

    /// Uses the built-in pixel-count color summarizer.
    pub fn with_histogram_colors(
        embedder: Arc<dyn Embedder>,
        objects: Arc<dyn ObjectDetector>,
        text: Arc<dyn TextReader>,
    ) -> Self {
        Self::new(
            embedder,
            objects,
            text,
            Arc::new(HistogramColorSummarizer::new()),
        )
    }
}

pub mod mock {
    use super::*;
    use std::collections::HashMap;

    type ImageFn<T> = Box<dyn Fn(&RgbImage) -> Result<T, ExtractorError> + Send + Sync>;

    /// Embeds images through a closure and texts through a lookup table.
    pub struct MockEmbedder {
        image_fn: ImageFn<Vec<f32>>,
        texts: HashMap<String, Vec<f32>>,
    }

    impl MockEmbedder {
        /// 3-d embedding: the mean of each channel.
        pub fn mean_color() -> Self {
            Self::with_pattern(|image| {
                let n = (image.width() as f64 * image.height() as f64).max(1.0);
                let mut sums = [0f64; 3];
                for px in image.pixels() {
                    for (sum, v) in sums.iter_mut().zip(px.0) {
                        *sum += v as f64;
                    }
                }
                Ok(sums.iter().map(|s| (s / n) as f32).collect())
            })
        }

        pub fn with_pattern<F>(pattern: F) -> Self
        where
            F: Fn(&RgbImage) -> Result<Vec<f32>, ExtractorError> + Send + Sync + 'static,
        {
            Self {
                image_fn: Box::new(pattern),
                texts: HashMap::new(),
            }
        }

        pub fn with_text(mut self, text: &str, vector: Vec<f32>) -> Self {
            self.texts.insert(text.to_string(), vector);
            self
        }
    }

    impl Embedder for MockEmbedder {
        fn embed_image(&self, image: &RgbImage) -> Result<Vec<f32>, ExtractorError> {
            (self.image_fn)(image)
        }

        fn embed_text(&self, text: &str) -> Result<Vec<f32>, ExtractorError> {
            self.texts
                .get(text)
                .cloned()
                .ok_or_else(|| ExtractorError::new(format!("no vector for text '{}'", text)))
        }
    }

    pub struct MockObjectDetector {
        pattern: ImageFn<BTreeMap<String, u32>>,
    }

    impl MockObjectDetector {
        pub fn fixed(labels: &[(&str, u32)]) -> Self {
            let objects: BTreeMap<String, u32> =
                labels.iter().map(|(l, c)| (l.to_string(), *c)).collect();
            Self::with_pattern(move |_| Ok(objects.clone()))
        }

        pub fn with_pattern<F>(pattern: F) -> Self
        where
            F: Fn(&RgbImage) -> Result<BTreeMap<String, u32>, ExtractorError>
                + Send
                + Sync
                + 'static,
        {
            Self {
                pattern: Box::new(pattern),
            }
        }
    }

    impl ObjectDetector for MockObjectDetector {
        fn detect(&self, image: &RgbImage) -> Result<BTreeMap<String, u32>, ExtractorError> {
            (self.pattern)(image)
        }
    }

    pub struct MockTextReader {
        pattern: ImageFn<Vec<String>>,
    }

    impl MockTextReader {
        pub fn fixed(words: &[&str]) -> Self {
            let words: Vec<String> = words.iter().map(|w| w.to_string()).collect();
            Self::with_pattern(move |_| Ok(words.clone()))
        }

        pub fn with_pattern<F>(pattern: F) -> Self
        where
            F: Fn(&RgbImage) -> Result<Vec<String>, ExtractorError> + Send + Sync + 'static,
        {
            Self {
                pattern: Box::new(pattern),
            }
        }
    }

    impl TextReader for MockTextReader {
        fn read(&self, image: &RgbImage) -> Result<Vec<String>, ExtractorError> {
            (self.pattern)(image)
        }
    }

    /// Mean-color embedder, fixed detector/OCR output, real color summarizer.
    pub fn extractors(labels: &[(&str, u32)], words: &[&str]) -> Extractors {
        Extractors::with_histogram_colors(
            Arc::new(MockEmbedder::mean_color()),
            Arc::new(MockObjectDetector::fixed(labels)),
            Arc::new(MockTextReader::fixed(words)),
        )
    }
}
