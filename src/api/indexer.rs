//! 视频索引器

use crate::core::index::{BatchReport, Extractors, IndexError, IndexingConfig, IndexingPipeline, VideoIndexReport};
use crate::core::store::FrameStore;
use crate::core::video::{compress_for_playback, FileVideo, VideoSource};
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const VIDEO_EXTENSIONS: [&str; 4] = ["mp4", "mov", "mkv", "webm"];

/// 视频索引器 - 镜头切分 + 特征提取 + 去重入库
///
/// ```ignore
/// let indexer = FrameIndexer::new(store.clone(), extractors);
/// let report = indexer.index_file("00182", "data/00182/00182.mp4")?;
/// ```
pub struct FrameIndexer {
    store: Arc<dyn FrameStore>,
    pipeline: IndexingPipeline,
}

impl FrameIndexer {
    pub fn new(store: Arc<dyn FrameStore>, extractors: Extractors) -> Self {
        Self::with_config(store, extractors, IndexingConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn FrameStore>,
        extractors: Extractors,
        config: IndexingConfig,
    ) -> Self {
        info!(
            "🎬 FrameIndexer: created (dedup < {}, scdet t={}, {} threads)",
            config.dedup_threshold, config.shot_threshold, config.threads
        );
        Self {
            store,
            pipeline: IndexingPipeline::with_config(extractors, config),
        }
    }

    pub fn config(&self) -> &IndexingConfig {
        self.pipeline.config()
    }

    pub fn index_source(&self, source: &dyn VideoSource) -> Result<VideoIndexReport, IndexError> {
        self.pipeline.index_video(self.store.as_ref(), source)
    }

    pub fn index_sources<S: VideoSource>(&self, sources: &[S]) -> BatchReport {
        self.pipeline.index_batch(self.store.as_ref(), sources)
    }

    pub fn index_file(
        &self,
        video_id: &str,
        path: impl AsRef<Path>,
    ) -> Result<VideoIndexReport, IndexError> {
        let report = self.index_source(&FileVideo::new(video_id, path.as_ref()))?;
        if self.config().playback_copies {
            self.playback_copy(video_id, path.as_ref());
        }
        Ok(report)
    }

    pub fn index_files(&self, videos: &[(String, PathBuf)]) -> BatchReport {
        let sources: Vec<FileVideo> = videos
            .iter()
            .map(|(id, path)| FileVideo::new(id.clone(), path.clone()))
            .collect();
        let report = self.index_sources(&sources);

        if self.config().playback_copies {
            for indexed in &report.indexed {
                if let Some((id, path)) = videos.iter().find(|(id, _)| *id == indexed.video_id) {
                    self.playback_copy(id, path);
                }
            }
        }
        report
    }

    /// Removes every indexed frame of one video.
    pub fn remove_video(&self, video_id: &str) -> Result<usize, IndexError> {
        let removed = self.store.delete_video(video_id)?;
        info!("🗑️ {}: removed {} frames", video_id, removed);
        Ok(removed)
    }

    /// A failed copy only costs playback, the index is already written.
    fn playback_copy(&self, video_id: &str, path: &Path) {
        match compress_for_playback(path) {
            Ok(target) => debug!("🗜️ {}: playback copy at {}", video_id, target.display()),
            Err(e) => warn!("⚠️ {}: no playback copy: {}", video_id, e),
        }
    }

    /// Indexes a dataset laid out as `{root}/{video_id}/{video_id}.{ext}`.
    pub fn index_directory(&self, root: impl AsRef<Path>) -> Result<BatchReport, IndexError> {
        let videos = discover_videos(root.as_ref())?;
        info!("📂 Found {} videos under {}", videos.len(), root.as_ref().display());
        Ok(self.index_files(&videos))
    }
}

impl Drop for FrameIndexer {
    fn drop(&mut self) {
        info!("🗑️ FrameIndexer: released");
    }
}

/// Sorted by video id. Entries without a matching video file are skipped.
pub fn discover_videos(root: &Path) -> Result<Vec<(String, PathBuf)>, IndexError> {
    let mut videos = Vec::new();
    for entry in fs::read_dir(root)? {
        let dir = entry?.path();
        if !dir.is_dir() {
            continue;
        }
        let Some(video_id) = dir.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            continue;
        };

        let found = VIDEO_EXTENSIONS
            .iter()
            .map(|ext| dir.join(format!("{}.{}", video_id, ext)))
            .find(|p| p.is_file());
        match found {
            Some(path) => videos.push((video_id, path)),
            None => warn!("⚠️ No video file in {}", dir.display()),
        }
    }
    videos.sort();
    Ok(videos)
}
