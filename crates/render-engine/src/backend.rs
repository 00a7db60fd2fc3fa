//! Render backends: where frames, probes, and muxing actually go.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

use framecast_common::config::RenderDefaults;
use framecast_common::error::{FramecastError, FramecastResult};
use framecast_scene_model::export::CodecProfile;

use crate::assets::{FfmpegFrameExtractor, VideoFrameSource};
use crate::audio::{mux_args, AudioComposition, AudioEncoding, AudioSourceProbe, FfprobeAudioProbe};
use crate::encoder::{FrameWriter, WriterKind, WriterTarget};
use crate::writers::{FfmpegVideoWriter, GifWriter, ImageSequenceWriter};

/// Trait for render backends.
pub trait RenderBackend: Send + Sync {
    /// Backend name.
    fn name(&self) -> &str;

    /// Check if this backend is available on the system.
    fn is_available(&self) -> bool;

    /// Open a writer for `target`. Failure means no video input could be
    /// attached.
    fn open_writer(&self, target: &WriterTarget) -> FramecastResult<Box<dyn FrameWriter>>;

    /// Source of still frames for video elements.
    fn video_frames(&self) -> Arc<dyn VideoFrameSource>;

    /// Probe used to vet audio layers.
    fn audio_probe(&self) -> Arc<dyn AudioSourceProbe>;

    /// Mix `composition` into the finished video at `video`, replacing it.
    fn mux_audio(
        &self,
        video: &Path,
        composition: &AudioComposition,
        codec: CodecProfile,
    ) -> FramecastResult<()>;
}

/// ffmpeg/ffprobe subprocess backend. GIF and image sequences are encoded
/// in-process and do not need ffmpeg.
#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    defaults: RenderDefaults,
}

impl FfmpegBackend {
    pub fn new(defaults: RenderDefaults) -> Self {
        Self { defaults }
    }

    pub fn defaults(&self) -> &RenderDefaults {
        &self.defaults
    }
}

impl RenderBackend for FfmpegBackend {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn is_available(&self) -> bool {
        command_exists(&self.defaults.ffmpeg_path)
    }

    fn open_writer(&self, target: &WriterTarget) -> FramecastResult<Box<dyn FrameWriter>> {
        Ok(match target.kind {
            WriterKind::Video(_) => Box::new(FfmpegVideoWriter::open(&self.defaults, target)?),
            WriterKind::Gif => Box::new(GifWriter::create(target)?),
            WriterKind::ImageSequence { .. } => Box::new(ImageSequenceWriter::create(target)?),
        })
    }

    fn video_frames(&self) -> Arc<dyn VideoFrameSource> {
        Arc::new(FfmpegFrameExtractor::new(self.defaults.ffmpeg_path.clone()))
    }

    fn audio_probe(&self) -> Arc<dyn AudioSourceProbe> {
        Arc::new(FfprobeAudioProbe::new(self.defaults.ffprobe_path.clone()))
    }

    fn mux_audio(
        &self,
        video: &Path,
        composition: &AudioComposition,
        codec: CodecProfile,
    ) -> FramecastResult<()> {
        if composition.is_silent() {
            return Ok(());
        }
        let muxed = mux_temp_path(video);
        let args = mux_args(
            video,
            composition,
            AudioEncoding {
                codec,
                sample_rate: self.defaults.audio_sample_rate,
                bitrate_kbps: self.defaults.audio_bitrate_kbps,
            },
            &muxed,
        );
        tracing::debug!(args = ?args, "Running ffmpeg audio mux");

        let output = Command::new(&self.defaults.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                FramecastError::Other(anyhow::anyhow!(
                    "failed to start {}: {e}",
                    self.defaults.ffmpeg_path
                ))
            })?;
        if !output.status.success() {
            let _ = std::fs::remove_file(&muxed);
            return Err(FramecastError::Other(anyhow::anyhow!(
                "audio mux failed (status {}): {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        std::fs::rename(&muxed, video)?;
        tracing::info!(
            output = %video.display(),
            segments = composition.segments.len(),
            "Audio muxed"
        );
        Ok(())
    }
}

/// Sibling path used while muxing; keeps the container extension last so
/// ffmpeg picks the right muxer.
pub fn mux_temp_path(video: &Path) -> PathBuf {
    let stem = video
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let name = match video.extension() {
        Some(ext) => format!("{stem}.mux.{}", ext.to_string_lossy()),
        None => format!("{stem}.mux"),
    };
    video.with_file_name(name)
}

pub fn command_exists(binary: &str) -> bool {
    Command::new(binary)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// First line of `binary -version`, if it runs.
pub fn probe_version(binary: &str) -> Option<String> {
    let output = Command::new(binary)
        .arg("-version")
        .stdin(Stdio::null())
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let raw = String::from_utf8(output.stdout).ok()?;
    raw.lines().next().map(|line| line.trim().to_string())
}
