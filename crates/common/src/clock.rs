//! Frame clock and pacing utilities for the export timeline.
//!
//! Exports are not wall-clock real-time: every frame sits at an exact
//! position `index / frame_rate` on the output timeline, regardless of how
//! long it took to composite. This module provides:
//! - Frame counting from a duration and frame rate
//! - Presentation timestamps derived from frame indices (no accumulated drift)
//! - Progress throttling so observers are not flooded with updates

use std::time::Duration;

/// Presentation timestamp of one output frame.
///
/// Stored as an index on a fixed-rate timeline so that consecutive
/// timestamps form an exact arithmetic sequence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PresentationTime {
    /// Zero-based frame index.
    pub frame_index: u64,

    /// Timeline rate in frames per second.
    pub frame_rate: f64,
}

impl PresentationTime {
    /// Timestamp in seconds.
    pub fn secs(&self) -> f64 {
        self.frame_index as f64 / self.frame_rate
    }

    /// Timestamp as a [`Duration`].
    pub fn as_duration(&self) -> Duration {
        Duration::from_secs_f64(self.secs().max(0.0))
    }

    /// Whether `self` is the frame immediately after `previous`.
    pub fn follows(&self, previous: &PresentationTime) -> bool {
        self.frame_rate == previous.frame_rate && self.frame_index == previous.frame_index + 1
    }
}

/// Fixed-rate clock for the export timeline.
#[derive(Debug, Clone, Copy)]
pub struct FrameClock {
    frame_rate: f64,
}

impl FrameClock {
    /// Create a clock ticking at `frame_rate` frames per second.
    pub fn new(frame_rate: f64) -> Self {
        Self { frame_rate }
    }

    pub fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    /// Duration of one frame in seconds.
    pub fn frame_duration_secs(&self) -> f64 {
        1.0 / self.frame_rate
    }

    /// Number of frames covering `duration_secs`, rounded to the nearest frame.
    pub fn frame_count(&self, duration_secs: f64) -> u64 {
        let frames = (duration_secs * self.frame_rate).round();
        if frames.is_finite() && frames > 0.0 {
            frames as u64
        } else {
            0
        }
    }

    /// Scene time sampled for the given frame.
    pub fn time_at(&self, frame_index: u64) -> f64 {
        frame_index as f64 / self.frame_rate
    }

    /// Presentation timestamp of the given frame.
    pub fn presentation_time(&self, frame_index: u64) -> PresentationTime {
        PresentationTime {
            frame_index,
            frame_rate: self.frame_rate,
        }
    }
}

/// Limits progress reports to a fixed number of steps per job.
///
/// The final frame always reports, so observers are guaranteed to see 100%.
#[derive(Debug)]
pub struct ProgressThrottle {
    total: u64,
    interval: u64,
    last_reported: Option<u64>,
}

impl ProgressThrottle {
    /// Create a throttle for `total` units reporting at most about `steps` times.
    pub fn new(total: u64, steps: u32) -> Self {
        let steps = u64::from(steps.max(1));
        Self {
            total,
            interval: (total / steps).max(1),
            last_reported: None,
        }
    }

    /// Check whether `done` units warrant a report.
    /// Returns true and updates internal state if so.
    pub fn should_report(&mut self, done: u64) -> bool {
        if done >= self.total {
            if self.last_reported == Some(self.total) {
                return false;
            }
            self.last_reported = Some(self.total);
            return true;
        }
        match self.last_reported {
            Some(last) if done < last + self.interval => false,
            _ => {
                self.last_reported = Some(done);
                true
            }
        }
    }

    /// Units between two consecutive reports.
    pub fn interval(&self) -> u64 {
        self.interval
    }
}
