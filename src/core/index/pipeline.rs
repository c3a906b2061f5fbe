//! 索引流水线
//!
//! One run per video: shot boundaries → sampling timestamps → keyframes →
//! parallel feature extraction → flat-frame filter → serial dedup → store.

use super::aggregator::FeatureAggregator;
use super::deduplicator::{EmbeddingDeduplicator, DEFAULT_DEDUP_THRESHOLD};
use super::error::IndexError;
use super::extractors::Extractors;
use super::record::FrameRecord;
use crate::core::store::FrameStore;
use crate::core::video::{
    sampling_timestamps, DegeneratePolicy, FrameStream, KeyframeSampler, KeyframeWriter,
    VideoSource, DEFAULT_JPEG_QUALITY, DEFAULT_SCDET_THRESHOLD,
};
use log::{debug, error, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingConfig {
    pub dedup_threshold: f64,
    /// scdet threshold passed to ffmpeg
    pub shot_threshold: f64,
    pub degenerate: DegeneratePolicy,
    /// skip frames with a single dominant color (blank, fades)
    pub skip_flat_frames: bool,
    /// worker threads for `index_batch`
    pub threads: usize,
    /// when set, sampled keyframes are saved as JPEG under this root
    pub keyframe_dir: Option<PathBuf>,
    pub jpeg_quality: u8,
    /// write `{stem}_compressed.mp4` beside each indexed video file
    pub playback_copies: bool,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            dedup_threshold: DEFAULT_DEDUP_THRESHOLD,
            shot_threshold: DEFAULT_SCDET_THRESHOLD,
            degenerate: DegeneratePolicy::Reject,
            skip_flat_frames: true,
            threads: num_cpus::get().min(4),
            keyframe_dir: None,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            playback_copies: false,
        }
    }
}

impl IndexingConfig {
    /// For footage with many hard cuts: zero-length shots are dropped
    /// instead of failing the video, and the scene detector is more
    /// sensitive.
    pub fn for_dense_cuts() -> Self {
        Self {
            shot_threshold: 1.0,
            degenerate: DegeneratePolicy::Drop,
            ..Default::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self, IndexError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VideoIndexReport {
    pub video_id: String,
    pub sampling_points: usize,
    pub keyframes: usize,
    pub failed_frames: usize,
    pub flat_frames: usize,
    pub duplicates: usize,
    pub indexed: usize,
    /// decode stream ended before every sampling point was reached
    pub exhausted: bool,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub indexed: Vec<VideoIndexReport>,
    pub failed: Vec<(String, IndexError)>,
}

impl BatchReport {
    pub fn total_frames(&self) -> usize {
        self.indexed.iter().map(|r| r.indexed).sum()
    }
}

pub struct IndexingPipeline {
    aggregator: FeatureAggregator,
    config: IndexingConfig,
}

impl IndexingPipeline {
    pub fn new(extractors: Extractors) -> Self {
        Self::with_config(extractors, IndexingConfig::default())
    }

    pub fn with_config(extractors: Extractors, config: IndexingConfig) -> Self {
        Self {
            aggregator: FeatureAggregator::new(extractors),
            config,
        }
    }

    pub fn config(&self) -> &IndexingConfig {
        &self.config
    }

    /// Everything up to (not including) the store write.
    pub fn build_records(
        &self,
        video_id: &str,
        detected: &[f64],
        duration: f64,
        period: f64,
        frames: FrameStream,
    ) -> Result<(Vec<FrameRecord>, VideoIndexReport), IndexError> {
        let mut report = VideoIndexReport {
            video_id: video_id.to_string(),
            ..Default::default()
        };

        let targets = sampling_timestamps(detected, duration, self.config.degenerate)?;
        report.sampling_points = targets.len();

        let sampler = KeyframeSampler::new(period)?;
        let outcome = sampler.sample(frames, &targets)?;
        report.keyframes = outcome.keyframes.len();
        report.exhausted = outcome.exhausted;
        debug!(
            "🎞️ {}: {} keyframes from {} decoded frames",
            video_id,
            outcome.keyframes.len(),
            outcome.frames_read
        );

        if let Some(dir) = &self.config.keyframe_dir {
            KeyframeWriter::with_quality(dir, self.config.jpeg_quality)
                .write_all(video_id, &outcome.keyframes)?;
        }

        let mut records = Vec::with_capacity(outcome.keyframes.len());
        for result in self.aggregator.extract_all(video_id, &outcome.keyframes) {
            match result {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!("⚠️ {}: {}", video_id, e);
                    report.failed_frames += 1;
                }
            }
        }

        if self.config.skip_flat_frames {
            let before = records.len();
            records.retain(|r| !r.is_flat());
            report.flat_frames = before - records.len();
        }

        let mut dedup = EmbeddingDeduplicator::with_threshold(self.config.dedup_threshold);
        let records = dedup.dedup(records);
        report.duplicates = dedup.dropped_count();
        report.indexed = records.len();

        Ok((records, report))
    }

    /// Replaces whatever the store holds for this video.
    pub fn index_video(
        &self,
        store: &dyn FrameStore,
        source: &dyn VideoSource,
    ) -> Result<VideoIndexReport, IndexError> {
        let start = Instant::now();
        let video_id = source.video_id();
        let opened = source.open(self.config.shot_threshold)?;

        let (records, report) = self.build_records(
            video_id,
            &opened.boundaries,
            opened.duration,
            opened.period,
            opened.frames,
        )?;

        let removed = store.replace_video(video_id, &records)?;
        if removed > 0 {
            debug!("🗑️ {}: replaced {} stale records", video_id, removed);
        }

        info!(
            "✅ {}: indexed {}/{} keyframes ({} duplicates, {} flat, {} failed) in {:?}",
            video_id,
            report.indexed,
            report.sampling_points,
            report.duplicates,
            report.flat_frames,
            report.failed_frames,
            start.elapsed()
        );
        Ok(report)
    }

    /// Indexes videos in parallel. A failing video is reported, never fatal.
    pub fn index_batch<S: VideoSource>(&self, store: &dyn FrameStore, sources: &[S]) -> BatchReport {
        let run = || {
            sources
                .par_iter()
                .map(|source| (source.video_id(), self.index_video(store, source)))
                .collect::<Vec<_>>()
        };

        let results = match rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.threads.max(1))
            .build()
        {
            Ok(pool) => pool.install(run),
            Err(e) => {
                warn!("⚠️ Failed to build indexing pool ({}), using global pool", e);
                run()
            }
        };

        let mut report = BatchReport::default();
        for (video_id, result) in results {
            match result {
                Ok(r) => report.indexed.push(r),
                Err(e) => {
                    error!("❌ {}: {}", video_id, e);
                    report.failed.push((video_id.to_string(), e));
                }
            }
        }

        info!(
            "📦 Batch done: {} videos ok, {} failed, {} frames",
            report.indexed.len(),
            report.failed.len(),
            report.total_frames()
        );
        report
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::index::extractors::mock::*;
    use crate::core::index::extractors::ExtractorError;
    use crate::core::store::memory::InMemoryStore;
    use crate::core::store::StoreError;
    use crate::core::video::{DecodedFrame, OpenedVideo};
    use std::sync::Arc;

    /// 1 fps synthetic video whose frame `i` is a two-tone image of gray
    /// level `levels[i]`.
    pub(crate) struct SyntheticVideo {
        pub id: String,
        pub boundaries: Vec<f64>,
        pub duration: f64,
        pub levels: Vec<u8>,
    }

    impl SyntheticVideo {
        pub fn new(id: &str, boundaries: &[f64], duration: f64, levels: &[u8]) -> Self {
            Self {
                id: id.to_string(),
                boundaries: boundaries.to_vec(),
                duration,
                levels: levels.to_vec(),
            }
        }
    }

    pub(crate) fn two_tone(level: u8, n: u64) -> DecodedFrame {
        // left column black so the frame is never flat unless level == 0
        let mut data = Vec::with_capacity(4 * 4 * 3);
        for _y in 0..4 {
            for x in 0..4 {
                let v = if x == 0 { 0 } else { level };
                data.extend_from_slice(&[v, v, v]);
            }
        }
        DecodedFrame::new(4, 4, data, n * 1000, n)
    }

    impl VideoSource for SyntheticVideo {
        fn video_id(&self) -> &str {
            &self.id
        }

        fn open(&self, _shot_threshold: f64) -> Result<OpenedVideo, IndexError> {
            let frames: Vec<_> = self
                .levels
                .iter()
                .enumerate()
                .map(|(i, &l)| Ok(two_tone(l, i as u64)))
                .collect();
            Ok(OpenedVideo {
                boundaries: self.boundaries.clone(),
                duration: self.duration,
                period: 1.0,
                frames: Box::new(frames.into_iter()),
            })
        }
    }

    fn pipeline() -> IndexingPipeline {
        IndexingPipeline::new(extractors(&[("person", 1)], &["hello"]))
    }

    #[test]
    fn test_config_defaults_and_json() {
        let config = IndexingConfig::default();
        assert_eq!(config.dedup_threshold, 40.0);
        assert_eq!(config.shot_threshold, 2.0);
        assert!(config.skip_flat_frames);
        assert!(!config.playback_copies);
        assert!(config.threads >= 1 && config.threads <= 4);

        let config = IndexingConfig::from_json(r#"{"dedup_threshold": 10.0, "degenerate": "drop"}"#)
            .unwrap();
        assert_eq!(config.dedup_threshold, 10.0);
        assert_eq!(config.degenerate, DegeneratePolicy::Drop);
        assert!(config.skip_flat_frames);

        assert!(IndexingConfig::from_json("{").is_err());
        assert_eq!(IndexingConfig::for_dense_cuts().degenerate, DegeneratePolicy::Drop);
    }

    #[test]
    fn test_one_keyframe_per_shot() {
        // shots [0,10) [10,20) [20,30) → targets 5, 15, 25
        let levels: Vec<u8> = (0..30).map(|i| 40 + (i / 10) as u8 * 80).collect();
        let video = SyntheticVideo::new("00182", &[10.0, 20.0], 30.0, &levels);
        let store = InMemoryStore::new();

        let report = pipeline().index_video(&store, &video).unwrap();
        assert_eq!(report.sampling_points, 3);
        assert_eq!(report.keyframes, 3);
        assert_eq!(report.indexed, 3);
        assert!(!report.exhausted);

        let frames = store.frames_for_video("00182").unwrap();
        let ids: Vec<&str> = frames.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["00182-frame_1", "00182-frame_2", "00182-frame_3"]);
        // clock after the 6th frame at 1 fps
        assert_eq!(frames[0].timestamp, 6.0);
        assert!(frames.iter().all(|r| r.objects.contains_key("person")));
    }

    #[test]
    fn test_similar_shots_are_deduplicated() {
        // 3 shots of near-identical content
        let levels = vec![100u8; 30];
        let video = SyntheticVideo::new("v", &[10.0, 20.0], 30.0, &levels);
        let store = InMemoryStore::new();

        let report = pipeline().index_video(&store, &video).unwrap();
        assert_eq!(report.keyframes, 3);
        assert_eq!(report.duplicates, 2);
        assert_eq!(report.indexed, 1);
        assert_eq!(store.frames_for_video("v").unwrap().len(), 1);
    }

    #[test]
    fn test_flat_frames_skipped() {
        let mut levels = vec![0u8; 10];
        levels.extend(vec![200u8; 10]);
        let video = SyntheticVideo::new("v", &[10.0], 20.0, &levels);

        let store = InMemoryStore::new();
        let report = pipeline().index_video(&store, &video).unwrap();
        assert_eq!(report.flat_frames, 1);
        assert_eq!(report.indexed, 1);

        let config = IndexingConfig {
            skip_flat_frames: false,
            ..Default::default()
        };
        let pipeline = IndexingPipeline::with_config(extractors(&[], &[]), config);
        let report = pipeline.index_video(&store, &video).unwrap();
        assert_eq!(report.flat_frames, 0);
        assert_eq!(report.indexed, 2);
    }

    #[test]
    fn test_extractor_failure_drops_only_that_frame() {
        let extractors = Extractors::with_histogram_colors(
            Arc::new(MockEmbedder::mean_color()),
            Arc::new(MockObjectDetector::with_pattern(|image| {
                if image.get_pixel(1, 0).0[0] == 120 {
                    Err(ExtractorError::new("detector timeout"))
                } else {
                    Ok(Default::default())
                }
            })),
            Arc::new(MockTextReader::fixed(&[])),
        );
        let levels: Vec<u8> = (0..30).map(|i| 40 + (i / 10) as u8 * 80).collect();
        let video = SyntheticVideo::new("v", &[10.0, 20.0], 30.0, &levels);
        let store = InMemoryStore::new();

        let report = IndexingPipeline::new(extractors)
            .index_video(&store, &video)
            .unwrap();
        assert_eq!(report.failed_frames, 1);
        assert_eq!(report.indexed, 2);
        let ids: Vec<String> = store
            .frames_for_video("v")
            .unwrap()
            .into_iter()
            .map(|r| r.frame_id)
            .collect();
        assert_eq!(ids, vec!["frame_1", "frame_3"]);
    }

    #[test]
    fn test_short_stream_is_partial_not_fatal() {
        let levels: Vec<u8> = (0..12).map(|i| 40 + (i / 10) as u8 * 80).collect();
        let video = SyntheticVideo::new("v", &[10.0, 20.0], 30.0, &levels);
        let store = InMemoryStore::new();

        let report = pipeline().index_video(&store, &video).unwrap();
        assert!(report.exhausted);
        assert_eq!(report.keyframes, 1);
        assert_eq!(report.indexed, 1);
    }

    #[test]
    fn test_reindex_replaces_records() {
        let levels: Vec<u8> = (0..30).map(|i| 40 + (i / 10) as u8 * 80).collect();
        let video = SyntheticVideo::new("v", &[10.0, 20.0], 30.0, &levels);
        let store = InMemoryStore::new();

        pipeline().index_video(&store, &video).unwrap();
        pipeline().index_video(&store, &video).unwrap();
        assert_eq!(store.frames_for_video("v").unwrap().len(), 3);
    }

    #[test]
    fn test_failed_reindex_keeps_previous_records() {
        let levels: Vec<u8> = (0..30).map(|i| 40 + (i / 10) as u8 * 80).collect();
        let video = SyntheticVideo::new("v", &[10.0, 20.0], 30.0, &levels);
        let store = InMemoryStore::new();

        pipeline().index_video(&store, &video).unwrap();
        pipeline()
            .index_video(&store, &SyntheticVideo::new("other", &[], 30.0, &levels))
            .unwrap();
        let before = store.frames_for_video("v").unwrap();
        assert_eq!(before.len(), 3);

        // embedder swapped for one of another width while "other" pins the dimension
        let narrow = Extractors::with_histogram_colors(
            Arc::new(MockEmbedder::with_pattern(|image| {
                let level = image.get_pixel(1, 0).0[0] as f32;
                Ok(vec![level, 255.0 - level])
            })),
            Arc::new(MockObjectDetector::fixed(&[])),
            Arc::new(MockTextReader::fixed(&[])),
        );
        let result = IndexingPipeline::new(narrow).index_video(&store, &video);
        assert!(matches!(
            result,
            Err(IndexError::Store(StoreError::DimensionMismatch { actual: 2, .. }))
        ));
        assert_eq!(store.frames_for_video("v").unwrap(), before);
    }

    #[test]
    fn test_keyframes_written_when_configured() {
        let root = std::env::temp_dir().join(format!("frame_search_pipe_{}", std::process::id()));
        let config = IndexingConfig {
            keyframe_dir: Some(root.clone()),
            ..Default::default()
        };
        let levels: Vec<u8> = (0..30).map(|i| 40 + (i / 10) as u8 * 80).collect();
        let video = SyntheticVideo::new("v", &[10.0, 20.0], 30.0, &levels);

        IndexingPipeline::with_config(extractors(&[], &[]), config)
            .index_video(&InMemoryStore::new(), &video)
            .unwrap();
        for n in 1..=3 {
            assert!(root.join("v").join("frames").join(format!("frame_{}.jpeg", n)).exists());
        }
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn test_batch_isolates_failures() {
        let levels: Vec<u8> = (0..30).map(|i| 40 + (i / 10) as u8 * 80).collect();
        let videos = vec![
            SyntheticVideo::new("good", &[10.0, 20.0], 30.0, &levels),
            // duration before the last cut
            SyntheticVideo::new("bad", &[10.0, 20.0], 15.0, &levels),
            SyntheticVideo::new("also_good", &[], 30.0, &levels),
        ];
        let store = InMemoryStore::new();

        let report = pipeline().index_batch(&store, &videos);
        assert_eq!(report.indexed.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "bad");
        assert!(matches!(report.failed[0].1, IndexError::MalformedBoundaries(_)));
        assert_eq!(report.total_frames(), 4);
        assert!(store.frames_for_video("bad").unwrap().is_empty());
    }
}
