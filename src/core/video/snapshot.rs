//! 关键帧落盘 - `{dir}/{video_id}/frames/frame_{n}.jpeg`

use crate::core::index::IndexError;
use crate::core::video::frame::Keyframe;
use image::ImageOutputFormat;
use log::debug;
use rayon::prelude::*;
use std::fs;
use std::io::Cursor;
use std::path::PathBuf;

pub const DEFAULT_JPEG_QUALITY: u8 = 70;

pub struct KeyframeWriter {
    root: PathBuf,
    quality: u8,
}

impl KeyframeWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_quality(root, DEFAULT_JPEG_QUALITY)
    }

    pub fn with_quality(root: impl Into<PathBuf>, quality: u8) -> Self {
        Self {
            root: root.into(),
            quality: quality.clamp(1, 100),
        }
    }

    pub fn frames_dir(&self, video_id: &str) -> PathBuf {
        self.root.join(video_id).join("frames")
    }

    pub fn frame_path(&self, video_id: &str, keyframe: &Keyframe) -> PathBuf {
        self.frames_dir(video_id)
            .join(format!("{}.jpeg", keyframe.frame_id()))
    }

    pub fn encode(&self, keyframe: &Keyframe) -> Result<Vec<u8>, IndexError> {
        let mut buffer = Cursor::new(Vec::new());
        keyframe
            .image
            .write_to(&mut buffer, ImageOutputFormat::Jpeg(self.quality))
            .map_err(|e| IndexError::Encode(format!("{}: {}", keyframe.frame_id(), e)))?;
        Ok(buffer.into_inner())
    }

    /// Existing files of the same name are overwritten.
    pub fn write_all(&self, video_id: &str, keyframes: &[Keyframe]) -> Result<Vec<PathBuf>, IndexError> {
        fs::create_dir_all(self.frames_dir(video_id))?;
        let paths = keyframes
            .par_iter()
            .map(|k| {
                let path = self.frame_path(video_id, k);
                fs::write(&path, self.encode(k)?)?;
                Ok(path)
            })
            .collect::<Result<Vec<_>, IndexError>>()?;
        debug!(
            "💾 {}: wrote {} keyframes to {}",
            video_id,
            paths.len(),
            self.frames_dir(video_id).display()
        );
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn keyframe(ordinal: u32) -> Keyframe {
        Keyframe {
            ordinal,
            target_ts: 1.0,
            timestamp: 1.04,
            frame_number: 25,
            image: RgbImage::from_pixel(8, 8, Rgb([200, 10, 10])),
        }
    }

    #[test]
    fn test_layout() {
        let writer = KeyframeWriter::new("/data");
        assert_eq!(
            writer.frame_path("00182", &keyframe(3)),
            PathBuf::from("/data/00182/frames/frame_3.jpeg")
        );
    }

    #[test]
    fn test_encode_is_jpeg() {
        let bytes = KeyframeWriter::with_quality("/unused", 0).encode(&keyframe(1)).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.width(), 8);
    }

    #[test]
    fn test_write_all() {
        let root = std::env::temp_dir().join(format!("frame_search_snap_{}", std::process::id()));
        let writer = KeyframeWriter::new(&root);

        let paths = writer.write_all("v", &[keyframe(1), keyframe(2)]).unwrap();
        assert_eq!(paths.len(), 2);
        assert!(paths.iter().all(|p| p.exists()));

        // second run overwrites
        writer.write_all("v", &[keyframe(1)]).unwrap();
        let _ = fs::remove_dir_all(&root);
    }
}
