pub mod ffmpeg;
pub mod frame;
pub mod sampler;
pub mod shots;
pub mod snapshot;
pub mod source;

pub use ffmpeg::{compress_for_playback, compressed_path, FfmpegFrames, ShotScan, VideoProbe, DEFAULT_SCDET_THRESHOLD};
pub use frame::{DecodedFrame, Keyframe};
pub use sampler::{KeyframeSampler, SampleAction, SampleOutcome, SamplerCursor};
pub use shots::{sampling_timestamps, DegeneratePolicy, Shot};
pub use snapshot::{KeyframeWriter, DEFAULT_JPEG_QUALITY};
pub use source::{FileVideo, FrameStream, OpenedVideo, VideoSource};
