//! 镜头分段 - shot boundaries to keyframe sampling timestamps
//!
//! The detector only reports cut times. `0` and the video duration are added
//! as sentinel boundaries, and every shot is sampled at its midpoint.

use crate::core::index::IndexError;
use serde::{Deserialize, Serialize};

/// What to do with zero-length shots (two equal boundaries).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegeneratePolicy {
    /// Fail the video with `MalformedBoundaries`.
    #[default]
    Reject,
    /// Silently merge equal boundaries.
    Drop,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shot {
    pub start: f64,
    pub end: f64,
}

impl Shot {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn midpoint(&self) -> f64 {
        (self.start + self.end) / 2.0
    }
}

/// Returns `[0, detected..., duration]` after validation.
pub fn full_boundaries(
    detected: &[f64],
    duration: f64,
    policy: DegeneratePolicy,
) -> Result<Vec<f64>, IndexError> {
    if !duration.is_finite() || duration < 0.0 {
        return Err(IndexError::MalformedBoundaries(format!(
            "invalid duration {}",
            duration
        )));
    }

    let mut prev = 0.0;
    for &t in detected {
        if !t.is_finite() || t < 0.0 {
            return Err(IndexError::MalformedBoundaries(format!(
                "invalid boundary {}",
                t
            )));
        }
        if t < prev {
            return Err(IndexError::MalformedBoundaries(format!(
                "boundaries decrease: {} then {}",
                prev, t
            )));
        }
        prev = t;
    }

    if duration < prev {
        return Err(IndexError::MalformedBoundaries(format!(
            "duration {} precedes boundary {}",
            duration, prev
        )));
    }

    let mut boundaries = Vec::with_capacity(detected.len() + 2);
    boundaries.push(0.0);
    boundaries.extend_from_slice(detected);
    boundaries.push(duration);

    match policy {
        DegeneratePolicy::Reject => {
            if let Some(w) = boundaries.windows(2).find(|w| w[0] == w[1]) {
                return Err(IndexError::MalformedBoundaries(format!(
                    "zero-length shot at {}s",
                    w[0]
                )));
            }
        }
        // non-decreasing, so equal values are always adjacent
        DegeneratePolicy::Drop => boundaries.dedup(),
    }

    Ok(boundaries)
}

pub fn shots_from_boundaries(boundaries: &[f64]) -> Vec<Shot> {
    boundaries
        .windows(2)
        .map(|w| Shot {
            start: w[0],
            end: w[1],
        })
        .collect()
}

/// Midpoint of every shot, in boundary order.
pub fn sampling_timestamps(
    detected: &[f64],
    duration: f64,
    policy: DegeneratePolicy,
) -> Result<Vec<f64>, IndexError> {
    let boundaries = full_boundaries(detected, duration, policy)?;
    Ok(shots_from_boundaries(&boundaries)
        .iter()
        .map(Shot::midpoint)
        .collect())
}
