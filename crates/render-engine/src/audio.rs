//! Audio layer mixing.
//!
//! [`AudioComposer::compose`] turns the scene's audio layers into an
//! [`AudioComposition`]: which source clips land where on the output
//! timeline and at what gain. Rendering that plan into the container is the
//! backend's job (see [`mux_args`] for the ffmpeg form).

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use framecast_common::error::{FramecastError, FramecastResult};
use framecast_scene_model::audio::AudioLayer;
use framecast_scene_model::export::CodecProfile;
use serde::Deserialize;

/// Answers whether a media file carries an audio stream.
pub trait AudioSourceProbe: Send + Sync {
    fn has_audio_track(&self, path: &Path) -> FramecastResult<bool>;
}

/// `ffprobe`-backed [`AudioSourceProbe`].
#[derive(Debug, Clone)]
pub struct FfprobeAudioProbe {
    ffprobe_path: String,
}

impl FfprobeAudioProbe {
    pub fn new(ffprobe_path: impl Into<String>) -> Self {
        Self {
            ffprobe_path: ffprobe_path.into(),
        }
    }
}

impl AudioSourceProbe for FfprobeAudioProbe {
    fn has_audio_track(&self, path: &Path) -> FramecastResult<bool> {
        if !path.exists() {
            return Err(FramecastError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let output = Command::new(&self.ffprobe_path)
            .args([
                "-v",
                "error",
                "-select_streams",
                "a",
                "-show_entries",
                "stream=index,codec_type",
                "-of",
                "json",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                FramecastError::asset_decode(path, format!("failed to start ffprobe: {e}"))
            })?;
        if !output.status.success() {
            return Err(FramecastError::asset_decode(
                path,
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        parse_probe_output(&output.stdout)
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
}

/// Whether ffprobe's JSON stream listing contains an audio stream.
fn parse_probe_output(stdout: &[u8]) -> FramecastResult<bool> {
    let probe: ProbeOutput = serde_json::from_slice(stdout)?;
    Ok(probe
        .streams
        .iter()
        .any(|stream| stream.codec_type.as_deref() == Some("audio")))
}

/// One clip placed on the output timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSegment {
    pub source: PathBuf,

    /// Output time at which the clip starts.
    pub insert_at_secs: f64,

    /// Position in the source where the clip starts.
    pub source_offset_secs: f64,

    /// Length taken from the source, starting at `source_offset_secs`.
    pub clip_duration_secs: f64,

    /// Linear gain in `[0, 1]`.
    pub gain: f64,
}

/// Why a layer contributes nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    Muted,
    /// Starts at or after the end of the video, or ends before it starts.
    OutsideVideo,
    NoAudioTrack,
    Unreadable(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedLayer {
    pub asset: PathBuf,
    pub reason: SkipReason,
}

/// The mixing plan for one export.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AudioComposition {
    pub segments: Vec<AudioSegment>,
    pub skipped: Vec<SkippedLayer>,
    pub video_duration_secs: f64,
}

impl AudioComposition {
    /// True when no layer made it into the mix.
    pub fn is_silent(&self) -> bool {
        self.segments.is_empty()
    }

    /// Layers that were wanted but could not be used (not muted, not
    /// simply out of range).
    pub fn unusable(&self) -> impl Iterator<Item = &SkippedLayer> {
        self.skipped.iter().filter(|s| {
            matches!(
                s.reason,
                SkipReason::NoAudioTrack | SkipReason::Unreadable(_)
            )
        })
    }
}

/// Builds [`AudioComposition`]s, checking sources through a probe.
pub struct AudioComposer<'a> {
    probe: &'a dyn AudioSourceProbe,
}

impl<'a> AudioComposer<'a> {
    pub fn new(probe: &'a dyn AudioSourceProbe) -> Self {
        Self { probe }
    }

    /// Plan the mix of `layers` over a video of `video_duration_secs`.
    ///
    /// Never fails: unusable layers are logged and listed in
    /// [`AudioComposition::skipped`].
    pub fn compose(&self, layers: &[AudioLayer], video_duration_secs: f64) -> AudioComposition {
        let mut composition = AudioComposition {
            video_duration_secs,
            ..AudioComposition::default()
        };

        for layer in layers {
            let skip = |reason: SkipReason| SkippedLayer {
                asset: layer.asset.clone(),
                reason,
            };
            if layer.muted {
                composition.skipped.push(skip(SkipReason::Muted));
                continue;
            }
            let Some(clip) = layer.clamped_duration(video_duration_secs) else {
                tracing::debug!(
                    asset = %layer.asset.display(),
                    start = layer.start_time_secs,
                    "Audio layer lies outside the video"
                );
                composition.skipped.push(skip(SkipReason::OutsideVideo));
                continue;
            };
            match self.probe.has_audio_track(&layer.asset) {
                Ok(true) => composition.segments.push(AudioSegment {
                    source: layer.asset.clone(),
                    insert_at_secs: layer.start_time_secs.max(0.0),
                    source_offset_secs: layer.source_offset(),
                    clip_duration_secs: clip,
                    gain: layer.gain(),
                }),
                Ok(false) => {
                    tracing::warn!(asset = %layer.asset.display(), "Audio layer has no audio track, skipping");
                    composition.skipped.push(skip(SkipReason::NoAudioTrack));
                }
                Err(err) => {
                    tracing::warn!(asset = %layer.asset.display(), error = %err, "Audio layer unreadable, skipping");
                    composition
                        .skipped
                        .push(skip(SkipReason::Unreadable(err.to_string())));
                }
            }
        }

        tracing::info!(
            segments = composition.segments.len(),
            skipped = composition.skipped.len(),
            "Audio composition planned"
        );
        composition
    }
}

/// Audio encoding settings for [`mux_args`].
#[derive(Debug, Clone, Copy)]
pub struct AudioEncoding {
    pub codec: CodecProfile,
    pub sample_rate: u32,
    pub bitrate_kbps: u32,
}

/// ffmpeg arguments that mix `composition` under the video stream of
/// `video`, writing `output`. The video stream is copied, not re-encoded.
pub fn mux_args(
    video: &Path,
    composition: &AudioComposition,
    encoding: AudioEncoding,
    output: &Path,
) -> Vec<String> {
    let mut args = vec![
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-i".to_string(),
        video.to_string_lossy().into_owned(),
    ];
    for segment in &composition.segments {
        args.push("-i".to_string());
        args.push(segment.source.to_string_lossy().into_owned());
    }
    args.push("-filter_complex".to_string());
    args.push(filter_graph(composition));
    args.extend(
        ["-map", "0:v", "-map", "[aout]", "-c:v", "copy"]
            .iter()
            .map(|s| s.to_string()),
    );
    if encoding.codec.is_prores() {
        args.extend(["-c:a".to_string(), "pcm_s16le".to_string()]);
    } else {
        args.extend([
            "-c:a".to_string(),
            "aac".to_string(),
            "-b:a".to_string(),
            format!("{}k", encoding.bitrate_kbps.max(64)),
        ]);
    }
    args.extend([
        "-ar".to_string(),
        encoding.sample_rate.to_string(),
        output.to_string_lossy().into_owned(),
    ]);
    args
}

/// `atrim → adelay → volume` per segment, summed without normalization and
/// cut to the video length.
fn filter_graph(composition: &AudioComposition) -> String {
    let mut chains = Vec::with_capacity(composition.segments.len() + 1);
    let mut labels = String::new();
    for (i, segment) in composition.segments.iter().enumerate() {
        let delay_ms = (segment.insert_at_secs * 1000.0).round() as u64;
        chains.push(format!(
            "[{input}:a]atrim=start={start:.6}:end={end:.6},asetpts=PTS-STARTPTS,adelay=delays={delay_ms}:all=1,volume={gain:.4}[a{i}]",
            input = i + 1,
            start = segment.source_offset_secs,
            end = segment.source_offset_secs + segment.clip_duration_secs,
            gain = segment.gain,
        ));
        labels.push_str(&format!("[a{i}]"));
    }
    chains.push(format!(
        "{labels}amix=inputs={n}:duration=longest:normalize=0,atrim=end={end:.6}[aout]",
        n = composition.segments.len(),
        end = composition.video_duration_secs,
    ));
    chains.join(";")
}
