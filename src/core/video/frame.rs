use crate::core::index::IndexError;
use image::RgbImage;
use std::time::Duration;

/// 解码后的视频帧（packed RGB24）
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    /// decoder position, frame number over container fps
    pub elapsed: Duration,
    pub frame_number: u64,
}

impl DecodedFrame {
    pub fn new(width: u32, height: u32, data: Vec<u8>, elapsed_ms: u64, frame_number: u64) -> Self {
        Self {
            width,
            height,
            data,
            elapsed: Duration::from_millis(elapsed_ms),
            frame_number,
        }
    }

    pub fn byte_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * 3
    }

    pub fn into_image(self) -> Result<RgbImage, IndexError> {
        let (width, height, frame_number) = (self.width, self.height, self.frame_number);
        RgbImage::from_raw(width, height, self.data).ok_or_else(|| {
            IndexError::Decode(format!(
                "frame {} buffer does not match {}x{} RGB24",
                frame_number, width, height
            ))
        })
    }
}

/// 被采样选中的关键帧
#[derive(Debug, Clone)]
pub struct Keyframe {
    /// 1-based position in sampling order
    pub ordinal: u32,
    pub target_ts: f64,
    /// sampler clock when the frame was emitted
    pub timestamp: f64,
    pub frame_number: u64,
    pub image: RgbImage,
}

impl Keyframe {
    pub fn frame_id(&self) -> String {
        format!("frame_{}", self.ordinal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_creation() {
        let frame = DecodedFrame::new(100, 100, vec![255u8; 100 * 100 * 3], 1000, 30);

        assert_eq!(frame.elapsed.as_millis(), 1000);
        assert_eq!(frame.frame_number, 30);
        assert_eq!(frame.data.len(), DecodedFrame::byte_len(100, 100));
    }

    #[test]
    fn test_into_image_rejects_short_buffer() {
        let frame = DecodedFrame::new(4, 4, vec![0u8; 10], 0, 7);
        assert!(matches!(frame.into_image(), Err(IndexError::Decode(_))));
    }

    #[test]
    fn test_into_image() {
        let frame = DecodedFrame::new(2, 2, vec![9u8; 12], 0, 0);
        let image = frame.into_image().unwrap();
        assert_eq!(image.dimensions(), (2, 2));
        assert_eq!(image.get_pixel(1, 1).0, [9, 9, 9]);
    }
}
