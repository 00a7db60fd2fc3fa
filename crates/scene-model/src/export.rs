//! Export configuration.
//!
//! An [`ExportConfiguration`] describes a single export job and is
//! immutable for the duration of that job.

use std::path::PathBuf;

use framecast_common::clock::FrameClock;
use framecast_common::error::{FramecastError, FramecastResult};
use serde::{Deserialize, Serialize};

/// Output kind of an export job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    /// H.264 (or any codec profile) in an MP4/MOV container.
    Video,
    /// ProRes in a MOV container.
    VideoProRes,
    /// Animated GIF.
    Gif,
    /// Numbered still images in a directory.
    ImageSequence(ImageFormat),
    /// Saving the project document; handled by the document layer.
    ProjectFile,
    /// Several exports in a row; expressed as repeated single-job exports.
    BatchExport,
}

/// Still image encoding for image sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageFormat {
    Png,
    Jpeg,
}

impl ImageFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
        }
    }

    /// Name of frame `index` in a sequence prefixed with `base`.
    pub fn frame_file_name(self, base: &str, index: u64) -> String {
        format!("{base}_{index:05}.{}", self.extension())
    }
}

/// Codec and profile for video exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodecProfile {
    H264,
    ProRes422Proxy,
    ProRes422Lt,
    ProRes422,
    ProRes422Hq,
    ProRes4444,
    ProRes4444Xq,
}

impl CodecProfile {
    /// `prores_ks` profile number, for ProRes variants.
    pub fn prores_profile(self) -> Option<u8> {
        match self {
            CodecProfile::H264 => None,
            CodecProfile::ProRes422Proxy => Some(0),
            CodecProfile::ProRes422Lt => Some(1),
            CodecProfile::ProRes422 => Some(2),
            CodecProfile::ProRes422Hq => Some(3),
            CodecProfile::ProRes4444 => Some(4),
            CodecProfile::ProRes4444Xq => Some(5),
        }
    }

    pub fn is_prores(self) -> bool {
        self.prores_profile().is_some()
    }

    /// Whether the profile carries an alpha channel.
    pub fn has_alpha(self) -> bool {
        matches!(self, CodecProfile::ProRes4444 | CodecProfile::ProRes4444Xq)
    }

    /// Container file extension.
    pub fn container_extension(self) -> &'static str {
        if self.is_prores() {
            "mov"
        } else {
            "mp4"
        }
    }
}

/// Immutable configuration of one export job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportConfiguration {
    pub format: ExportFormat,

    /// Output resolution in pixels.
    pub width: u32,
    pub height: u32,

    /// Output frames per second.
    pub frame_rate: f64,

    /// Length of the exported timeline in seconds.
    pub duration_secs: f64,

    /// Directory receiving the output.
    pub output: PathBuf,

    /// Codec selection; defaults by format when absent.
    #[serde(default)]
    pub codec_profile: Option<CodecProfile>,

    /// Whether to mix and mux the scene's audio layers.
    #[serde(default)]
    pub include_audio: bool,

    /// File name (without extension) of the output, or the prefix of
    /// numbered image files.
    pub base_filename: String,

    /// JPEG quality in `[0.0, 1.0]` for lossy image sequences.
    #[serde(default)]
    pub image_quality: Option<f64>,
}

const DEFAULT_JPEG_QUALITY: f64 = 0.9;

impl ExportConfiguration {
    /// H.264 video export with defaults.
    pub fn video(
        output: impl Into<PathBuf>,
        base_filename: impl Into<String>,
        width: u32,
        height: u32,
        frame_rate: f64,
        duration_secs: f64,
    ) -> Self {
        Self {
            format: ExportFormat::Video,
            width,
            height,
            frame_rate,
            duration_secs,
            output: output.into(),
            codec_profile: None,
            include_audio: false,
            base_filename: base_filename.into(),
            image_quality: None,
        }
    }

    /// Frames in the export: `round(duration × frame_rate)`.
    pub fn frame_count(&self) -> u64 {
        if !self.frame_rate.is_finite() || self.frame_rate <= 0.0 {
            return 0;
        }
        FrameClock::new(self.frame_rate).frame_count(self.duration_secs)
    }

    /// Clock for this job's output timeline.
    pub fn clock(&self) -> FrameClock {
        FrameClock::new(self.frame_rate)
    }

    /// Codec used for video formats.
    pub fn effective_codec(&self) -> CodecProfile {
        match (self.format, self.codec_profile) {
            (_, Some(profile)) => profile,
            (ExportFormat::VideoProRes, None) => CodecProfile::ProRes422Hq,
            _ => CodecProfile::H264,
        }
    }

    /// Whether the job produces a video container that can carry audio.
    pub fn is_video(&self) -> bool {
        matches!(self.format, ExportFormat::Video | ExportFormat::VideoProRes)
    }

    /// Final output location: a file for containers and GIFs, a directory
    /// for image sequences.
    pub fn output_path(&self) -> PathBuf {
        match self.format {
            ExportFormat::Video | ExportFormat::VideoProRes => self.output.join(format!(
                "{}.{}",
                self.base_filename,
                self.effective_codec().container_extension()
            )),
            ExportFormat::Gif => self.output.join(format!("{}.gif", self.base_filename)),
            ExportFormat::ImageSequence(_)
            | ExportFormat::ProjectFile
            | ExportFormat::BatchExport => self.output.join(&self.base_filename),
        }
    }

    /// File name of frame `index` in an image sequence.
    pub fn sequence_file_name(&self, index: u64) -> Option<String> {
        match self.format {
            ExportFormat::ImageSequence(image) => {
                Some(image.frame_file_name(&self.base_filename, index))
            }
            _ => None,
        }
    }

    /// JPEG quality on the encoder's 1–100 scale.
    pub fn jpeg_quality(&self) -> u8 {
        let q = self
            .image_quality
            .filter(|q| q.is_finite())
            .unwrap_or(DEFAULT_JPEG_QUALITY)
            .clamp(0.0, 1.0);
        ((q * 100.0).round() as u8).max(1)
    }

    /// Reject configurations that cannot produce output, before any work
    /// starts.
    pub fn validate(&self) -> FramecastResult<()> {
        if matches!(
            self.format,
            ExportFormat::ProjectFile | ExportFormat::BatchExport
        ) {
            return Err(FramecastError::invalid_config(format!(
                "{:?} is not a renderable format; project files are saved by the document layer and batches run as separate exports",
                self.format
            )));
        }
        if self.width == 0 || self.height == 0 {
            return Err(FramecastError::invalid_config(format!(
                "output size must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        if !self.frame_rate.is_finite() || self.frame_rate <= 0.0 {
            return Err(FramecastError::invalid_config(format!(
                "frame rate must be positive, got {}",
                self.frame_rate
            )));
        }
        if !self.duration_secs.is_finite() || self.duration_secs <= 0.0 {
            return Err(FramecastError::invalid_config(format!(
                "duration must be positive, got {}s",
                self.duration_secs
            )));
        }
        if self.frame_count() == 0 {
            return Err(FramecastError::invalid_config(format!(
                "{}s at {} fps yields no frames",
                self.duration_secs, self.frame_rate
            )));
        }
        if let Some(q) = self.image_quality {
            if !(0.0..=1.0).contains(&q) {
                return Err(FramecastError::invalid_config(format!(
                    "image quality must be within 0.0-1.0, got {q}"
                )));
            }
        }
        if matches!(self.base_filename.trim(), "" | "." | "..")
            || self.base_filename.contains(['/', '\\', '\0'])
        {
            return Err(FramecastError::invalid_config(format!(
                "base filename `{}` must be a non-empty name without path separators",
                self.base_filename
            )));
        }
        if self.is_video() {
            let codec = self.effective_codec();
            if self.format == ExportFormat::VideoProRes && !codec.is_prores() {
                return Err(FramecastError::invalid_config(format!(
                    "ProRes export cannot use the {codec:?} codec profile"
                )));
            }
            if codec == CodecProfile::H264 && (self.width % 2 != 0 || self.height % 2 != 0) {
                return Err(FramecastError::invalid_config(format!(
                    "H.264 requires even output dimensions, got {}x{}",
                    self.width, self.height
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framecast_common::error::ErrorKind;

    fn base() -> ExportConfiguration {
        ExportConfiguration::video("/tmp/out", "scene", 1920, 1080, 30.0, 5.0)
    }

    #[test]
    fn test_frame_count() {
        assert_eq!(base().frame_count(), 150);
        let mut config = base();
        config.duration_secs = 1.0;
        assert_eq!(config.frame_count(), 30);
    }

    #[test]
    fn test_zero_duration_is_invalid() {
        let mut config = base();
        config.duration_secs = 0.0;
        let err = config.validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);
        assert!(err.to_string().contains("duration"));
    }

    #[test]
    fn test_invalid_dimensions_and_rates() {
        let mut config = base();
        config.width = 0;
        assert!(config.validate().is_err());

        let mut config = base();
        config.frame_rate = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = base();
        config.width = 1919;
        assert!(config.validate().is_err());

        let mut config = base();
        config.duration_secs = 0.001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_renderable_formats_are_rejected() {
        let mut config = base();
        config.format = ExportFormat::ProjectFile;
        assert!(config.validate().is_err());
        config.format = ExportFormat::BatchExport;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_base_filename_must_name_a_file() {
        for name in ["", "  ", ".", "..", " .. ", "a/b", "a\\b", "a\0b"] {
            let mut config = base();
            config.base_filename = name.to_string();
            let err = config.validate().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidConfiguration, "{name:?}");
        }
        let mut config = base();
        config.base_filename = "..scene".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_output_paths() {
        let config = base();
        assert_eq!(config.output_path(), PathBuf::from("/tmp/out/scene.mp4"));

        let mut prores = base();
        prores.format = ExportFormat::VideoProRes;
        assert_eq!(prores.effective_codec(), CodecProfile::ProRes422Hq);
        assert_eq!(prores.output_path(), PathBuf::from("/tmp/out/scene.mov"));

        let mut seq = base();
        seq.format = ExportFormat::ImageSequence(ImageFormat::Jpeg);
        assert_eq!(seq.output_path(), PathBuf::from("/tmp/out/scene"));
        assert_eq!(seq.sequence_file_name(7).unwrap(), "scene_00007.jpg");
    }

    #[test]
    fn test_prores_with_h264_profile_is_invalid() {
        let mut config = base();
        config.format = ExportFormat::VideoProRes;
        config.codec_profile = Some(CodecProfile::H264);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_jpeg_quality_mapping() {
        let mut config = base();
        assert_eq!(config.jpeg_quality(), 90);
        config.image_quality = Some(0.0);
        assert_eq!(config.jpeg_quality(), 1);
        config.image_quality = Some(0.55);
        assert_eq!(config.jpeg_quality(), 55);
    }

    #[test]
    fn test_format_serde() {
        let f: ExportFormat = serde_json::from_str(r#"{"image_sequence": "png"}"#).unwrap();
        assert_eq!(f, ExportFormat::ImageSequence(ImageFormat::Png));
        let v: ExportFormat = serde_json::from_str(r#""video_pro_res""#).unwrap();
        assert_eq!(v, ExportFormat::VideoProRes);
    }
}
