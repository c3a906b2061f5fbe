use crate::core::index::IndexError;
use crate::core::video::ffmpeg::{self, FfmpegFrames};
use crate::core::video::frame::DecodedFrame;
use log::{info, warn};
use std::path::PathBuf;

pub type FrameStream = Box<dyn Iterator<Item = Result<DecodedFrame, IndexError>> + Send>;

/// 一次打开的解码会话：镜头切点 + 时长 + 帧流
pub struct OpenedVideo {
    pub boundaries: Vec<f64>,
    pub duration: f64,
    /// seconds per decoded frame (`1 / fps`)
    pub period: f64,
    pub frames: FrameStream,
}

/// Anything the indexing pipeline can open into a fresh decode session.
pub trait VideoSource: Send + Sync {
    fn video_id(&self) -> &str;

    fn open(&self, shot_threshold: f64) -> Result<OpenedVideo, IndexError>;
}

/// A video file decoded through ffmpeg.
#[derive(Debug, Clone)]
pub struct FileVideo {
    pub video_id: String,
    pub path: PathBuf,
}

impl FileVideo {
    pub fn new(video_id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            video_id: video_id.into(),
            path: path.into(),
        }
    }
}

impl VideoSource for FileVideo {
    fn video_id(&self) -> &str {
        &self.video_id
    }

    fn open(&self, shot_threshold: f64) -> Result<OpenedVideo, IndexError> {
        if !self.path.exists() {
            return Err(IndexError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("video not found: {}", self.path.display()),
            )));
        }

        let probe = ffmpeg::probe(&self.path)?;
        let scan = ffmpeg::scan_shots(&self.path, shot_threshold)?;

        let duration = match scan.duration {
            Some(d) => d,
            None => {
                warn!("⚠️ No Duration line for {}, using ffprobe value", self.video_id);
                probe.duration
            }
        };

        info!(
            "📼 {}: {}x{} @ {:.3} fps, {:.2}s, {} cuts",
            self.video_id,
            probe.width,
            probe.height,
            probe.fps,
            duration,
            scan.boundaries.len()
        );

        let frames = FfmpegFrames::spawn(&self.path, &probe)?;
        Ok(OpenedVideo {
            boundaries: scan.boundaries,
            duration,
            period: probe.frame_period(),
            frames: Box::new(frames),
        })
    }
}
