//! 关键帧采样 - single forward pass over a decode stream
//!
//! The sampler keeps its own clock (`current_ts`, advanced by one frame
//! period per decoded frame) and an index cursor into the sorted sampling
//! timestamps. A frame is emitted when the clock first exceeds the target
//! under the cursor; at most one frame is emitted per decoded frame.

use crate::core::index::IndexError;
use crate::core::video::frame::{DecodedFrame, Keyframe};
use log::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleAction {
    Skip,
    Emit { target: f64, timestamp: f64 },
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SamplerCursor {
    /// index of the next unserved target
    pub next: usize,
    pub current_ts: f64,
}

impl SamplerCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_done(&self, targets: &[f64]) -> bool {
        self.next >= targets.len()
    }

    /// Accounts for one decoded frame and returns the next cursor.
    pub fn advance(&self, period: f64, targets: &[f64]) -> (SamplerCursor, SampleAction) {
        let Some(&target) = targets.get(self.next) else {
            return (*self, SampleAction::Done);
        };

        let current_ts = self.current_ts + period;
        if current_ts > target {
            (
                SamplerCursor {
                    next: self.next + 1,
                    current_ts,
                },
                SampleAction::Emit {
                    target,
                    timestamp: current_ts,
                },
            )
        } else {
            (
                SamplerCursor {
                    next: self.next,
                    current_ts,
                },
                SampleAction::Skip,
            )
        }
    }
}

#[derive(Debug)]
pub struct SampleOutcome {
    pub keyframes: Vec<Keyframe>,
    pub frames_read: u64,
    pub expected: usize,
    /// decode stream ended before every target was served
    pub exhausted: bool,
}

pub struct KeyframeSampler {
    period: f64,
}

impl KeyframeSampler {
    pub fn new(period: f64) -> Result<Self, IndexError> {
        if !period.is_finite() || period <= 0.0 {
            return Err(IndexError::InvalidFrameRate(1.0 / period));
        }
        Ok(Self { period })
    }

    pub fn from_fps(fps: f64) -> Result<Self, IndexError> {
        if !fps.is_finite() || fps <= 0.0 {
            return Err(IndexError::InvalidFrameRate(fps));
        }
        Self::new(1.0 / fps)
    }

    pub fn period(&self) -> f64 {
        self.period
    }

    /// Walks `frames` once. Stops pulling frames as soon as the last target
    /// has been served.
    pub fn sample<I>(&self, frames: I, targets: &[f64]) -> Result<SampleOutcome, IndexError>
    where
        I: IntoIterator<Item = Result<DecodedFrame, IndexError>>,
    {
        let mut frames = frames.into_iter();
        let mut cursor = SamplerCursor::new();
        let mut keyframes = Vec::with_capacity(targets.len());
        let mut frames_read = 0u64;

        while !cursor.is_done(targets) {
            let Some(frame) = frames.next() else {
                warn!(
                    "⚠️ {} (clock at {:.3}s)",
                    IndexError::DecodeExhausted {
                        emitted: keyframes.len(),
                        expected: targets.len(),
                    },
                    cursor.current_ts
                );
                return Ok(SampleOutcome {
                    keyframes,
                    frames_read,
                    expected: targets.len(),
                    exhausted: true,
                });
            };
            let frame = frame?;
            frames_read += 1;

            let (next, action) = cursor.advance(self.period, targets);
            cursor = next;

            if let SampleAction::Emit { target, timestamp } = action {
                let ordinal = keyframes.len() as u32 + 1;
                debug!(
                    "🎯 keyframe {} at {:.3}s (target {:.3}s, frame #{} decoded at {:?})",
                    ordinal, timestamp, target, frame.frame_number, frame.elapsed
                );
                let frame_number = frame.frame_number;
                keyframes.push(Keyframe {
                    ordinal,
                    target_ts: target,
                    timestamp,
                    frame_number,
                    image: frame.into_image()?,
                });
            }
        }

        Ok(SampleOutcome {
            keyframes,
            frames_read,
            expected: targets.len(),
            exhausted: false,
        })
    }
}
