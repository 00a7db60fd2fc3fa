//! Audio layers placed on the output timeline.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One audio source mixed into the export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioLayer {
    /// Media file providing the audio.
    pub asset: PathBuf,

    /// Offset into the output timeline where the layer starts.
    #[serde(default)]
    pub start_time_secs: f64,

    /// Length of source audio to play, from the start of the source.
    pub duration_secs: f64,

    /// Linear gain in `[0.0, 1.0]`.
    #[serde(default = "default_volume")]
    pub volume: f64,

    #[serde(default)]
    pub muted: bool,
}

fn default_volume() -> f64 {
    1.0
}

impl AudioLayer {
    pub fn new(asset: impl Into<PathBuf>, start_time_secs: f64, duration_secs: f64) -> Self {
        Self {
            asset: asset.into(),
            start_time_secs,
            duration_secs,
            volume: 1.0,
            muted: false,
        }
    }

    /// Gain applied in the mixer, clamped to `[0.0, 1.0]`.
    pub fn gain(&self) -> f64 {
        if self.volume.is_finite() {
            self.volume.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// Seconds skipped at the start of the source when the layer begins
    /// before the output timeline does.
    pub fn source_offset(&self) -> f64 {
        if self.start_time_secs.is_finite() {
            (-self.start_time_secs).max(0.0)
        } else {
            0.0
        }
    }

    /// Length of this layer that lands inside `[0, video_duration_secs)`,
    /// or `None` when nothing of it does.
    pub fn clamped_duration(&self, video_duration_secs: f64) -> Option<f64> {
        let clamped = self
            .duration_secs
            .min(video_duration_secs - self.start_time_secs)
            - self.source_offset();
        (clamped.is_finite() && clamped > 0.0).then_some(clamped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamped_duration_trims_tail() {
        let layer = AudioLayer::new("music.m4a", 4.0, 3.0);
        let clamped = layer.clamped_duration(5.0).unwrap();
        assert!((clamped - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_negative_start_skips_source_head() {
        let layer = AudioLayer::new("music.m4a", -2.0, 3.0);
        assert!((layer.source_offset() - 2.0).abs() < 1e-12);
        assert!((layer.clamped_duration(5.0).unwrap() - 1.0).abs() < 1e-12);
        assert!(AudioLayer::new("a.wav", -3.0, 3.0).clamped_duration(5.0).is_none());
        assert_eq!(AudioLayer::new("a.wav", 1.0, 3.0).source_offset(), 0.0);
    }

    #[test]
    fn test_clamped_duration_skips_late_layers() {
        assert!(AudioLayer::new("a.wav", 5.0, 3.0).clamped_duration(5.0).is_none());
        assert!(AudioLayer::new("a.wav", 6.0, 3.0).clamped_duration(5.0).is_none());
        assert!(AudioLayer::new("a.wav", 0.0, 0.0).clamped_duration(5.0).is_none());
    }

    #[test]
    fn test_gain_clamps() {
        let mut layer = AudioLayer::new("a.wav", 0.0, 1.0);
        layer.volume = 1.7;
        assert_eq!(layer.gain(), 1.0);
        layer.volume = f64::NAN;
        assert_eq!(layer.gain(), 0.0);
    }
}
