//! H.264 and ProRes output through an `ffmpeg` child process.
//!
//! Frames are streamed as raw RGBA on the child's stdin by a dedicated pump
//! thread, so compositing the next frame overlaps with ffmpeg consuming the
//! previous one. The writer is ready while fewer than `max_frames_in_flight`
//! frames are queued for the pump.

use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;

use framecast_common::clock::PresentationTime;
use framecast_common::config::RenderDefaults;
use framecast_common::error::{FramecastError, FramecastResult};
use framecast_scene_model::export::CodecProfile;

use crate::encoder::{FrameWriter, WriterKind, WriterStatus, WriterTarget};
use crate::raster::PixelBuffer;

const STDERR_TAIL_LINES: usize = 12;

/// Streams frames into an ffmpeg encoder.
pub struct FfmpegVideoWriter {
    output: PathBuf,
    child: Child,
    frames: Option<mpsc::Sender<Vec<u8>>>,
    pump: Option<JoinHandle<std::io::Result<()>>>,
    stderr: Option<JoinHandle<String>>,
    in_flight: Arc<AtomicUsize>,
    broken: Arc<AtomicBool>,
    max_in_flight: usize,
    frame_bytes: usize,
    frames_sent: u64,
    status: WriterStatus,
}

impl std::fmt::Debug for FfmpegVideoWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FfmpegVideoWriter")
            .field("output", &self.output)
            .field("pid", &self.child.id())
            .field("status", &self.status)
            .finish()
    }
}

impl FfmpegVideoWriter {
    /// Spawn ffmpeg for `target`, which must be a video target.
    pub fn open(defaults: &RenderDefaults, target: &WriterTarget) -> FramecastResult<Self> {
        let WriterKind::Video(codec) = target.kind else {
            return Err(FramecastError::writer_setup(format!(
                "ffmpeg writer cannot produce {:?}",
                target.kind
            )));
        };
        let args = video_encoder_args(defaults, target, codec);
        tracing::debug!(args = ?args, "Starting ffmpeg encoder");

        let mut child = Command::new(&defaults.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                FramecastError::writer_setup(format!(
                    "failed to start {}: {e}",
                    defaults.ffmpeg_path
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| FramecastError::writer_setup("failed to capture ffmpeg stdin"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| FramecastError::writer_setup("failed to capture ffmpeg stderr"))?;

        // Drain stderr concurrently so ffmpeg never blocks on a full pipe.
        let stderr_task = std::thread::spawn(move || -> String {
            let mut output = String::new();
            let mut stderr = stderr;
            match stderr.read_to_string(&mut output) {
                Ok(_) => output,
                Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
            }
        });

        let (tx, rx) = mpsc::channel::<Vec<u8>>();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let broken = Arc::new(AtomicBool::new(false));
        let pump = {
            let in_flight = in_flight.clone();
            let broken = broken.clone();
            std::thread::Builder::new()
                .name("ffmpeg-pump".to_string())
                .spawn(move || -> std::io::Result<()> {
                    let mut stdin = stdin;
                    for frame in rx {
                        let written = stdin.write_all(&frame);
                        in_flight.fetch_sub(1, Ordering::AcqRel);
                        if let Err(err) = written {
                            broken.store(true, Ordering::Release);
                            return Err(err);
                        }
                    }
                    stdin.flush()
                })
                .map_err(|e| {
                    FramecastError::writer_setup(format!("failed to start frame pump: {e}"))
                })?
        };

        tracing::info!(
            pid = child.id(),
            output = %target.output.display(),
            codec = ?codec,
            "ffmpeg encoder started"
        );

        Ok(Self {
            output: target.output.clone(),
            child,
            frames: Some(tx),
            pump: Some(pump),
            stderr: Some(stderr_task),
            in_flight,
            broken,
            max_in_flight: defaults.max_frames_in_flight.max(1),
            frame_bytes: target.width as usize * target.height as usize * 4,
            frames_sent: 0,
            status: WriterStatus::Writing,
        })
    }

    /// Kill the child and collect what it printed.
    fn teardown(&mut self) -> String {
        self.frames = None;
        if let Err(err) = self.child.kill() {
            tracing::debug!(error = %err, "ffmpeg already exited");
        }
        let _ = self.child.wait();
        if let Some(pump) = self.pump.take() {
            let _ = pump.join();
        }
        self.stderr_tail()
    }

    fn stderr_tail(&mut self) -> String {
        let full = self
            .stderr
            .take()
            .map(|task| {
                task.join()
                    .unwrap_or_else(|_| "<failed to join stderr reader>".to_string())
            })
            .unwrap_or_default();
        let lines: Vec<&str> = full.lines().collect();
        let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
        lines[start..].join("\n")
    }

    fn refuse(&mut self, frame_index: u64, reason: &str) -> FramecastError {
        let tail = self.teardown();
        self.status = WriterStatus::Failed;
        FramecastError::encode_rejection(frame_index, format!("{reason}: {}", tail.trim()))
    }
}

impl FrameWriter for FfmpegVideoWriter {
    fn is_ready_for_more_data(&self) -> bool {
        self.broken.load(Ordering::Acquire)
            || self.in_flight.load(Ordering::Acquire) < self.max_in_flight
    }

    fn append(&mut self, frame: PixelBuffer, pts: PresentationTime) -> FramecastResult<()> {
        if self.status != WriterStatus::Writing {
            return Err(FramecastError::encode_rejection(
                pts.frame_index,
                format!("writer is {:?}", self.status),
            ));
        }
        if self.broken.load(Ordering::Acquire) {
            return Err(self.refuse(pts.frame_index, "ffmpeg stopped reading frames"));
        }
        let bytes = frame.into_rgba();
        if bytes.len() != self.frame_bytes {
            return Err(FramecastError::encode_rejection(
                pts.frame_index,
                format!(
                    "frame has {} bytes, encoder expects {}",
                    bytes.len(),
                    self.frame_bytes
                ),
            ));
        }

        self.in_flight.fetch_add(1, Ordering::AcqRel);
        let sent = self.frames.as_ref().map(|tx| tx.send(bytes).is_ok());
        if sent != Some(true) {
            self.in_flight.fetch_sub(1, Ordering::AcqRel);
            return Err(self.refuse(pts.frame_index, "frame pump is gone"));
        }
        self.frames_sent += 1;
        Ok(())
    }

    fn finish(&mut self) -> FramecastResult<()> {
        if self.status != WriterStatus::Writing {
            return Err(FramecastError::writer_setup(format!(
                "cannot finish a writer that is {:?}",
                self.status
            )));
        }
        // Closing the channel ends the pump, which closes stdin.
        self.frames = None;
        let pumped = match self.pump.take() {
            Some(pump) => pump
                .join()
                .unwrap_or_else(|_| Err(std::io::Error::other("frame pump panicked"))),
            None => Ok(()),
        };
        let exit = self.child.wait();
        let tail = self.stderr_tail();

        let failure = match (pumped, exit) {
            (_, Err(err)) => Some(format!("failed to wait on ffmpeg: {err}")),
            (_, Ok(status)) if !status.success() => {
                Some(format!("ffmpeg exited with {status}: {}", tail.trim()))
            }
            (Err(err), _) => Some(format!("failed writing frames to ffmpeg: {err}")),
            _ => None,
        };
        if let Some(message) = failure {
            self.status = WriterStatus::Failed;
            return Err(FramecastError::encode_rejection(
                self.frames_sent.saturating_sub(1),
                format!("encoding {} failed: {message}", self.output.display()),
            ));
        }

        self.status = WriterStatus::Finished;
        tracing::info!(output = %self.output.display(), "ffmpeg encoder finished");
        Ok(())
    }

    fn cancel(&mut self) {
        if self.status == WriterStatus::Writing {
            self.teardown();
            self.status = WriterStatus::Cancelled;
        }
    }

    fn status(&self) -> WriterStatus {
        self.status
    }
}

impl Drop for FfmpegVideoWriter {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Arguments for encoding raw RGBA from stdin into `target.output`.
pub fn video_encoder_args(
    defaults: &RenderDefaults,
    target: &WriterTarget,
    codec: CodecProfile,
) -> Vec<String> {
    let mut args: Vec<String> = [
        "-y",
        "-hide_banner",
        "-loglevel",
        "error",
        "-f",
        "rawvideo",
        "-pix_fmt",
        "rgba",
        "-s",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    args.push(format!("{}x{}", target.width, target.height));
    args.push("-r".to_string());
    args.push(format!("{}", target.frame_rate));
    args.extend(["-i", "-", "-an"].iter().map(|s| s.to_string()));

    match codec.prores_profile() {
        None => args.extend([
            "-c:v".to_string(),
            "libx264".to_string(),
            "-preset".to_string(),
            defaults.h264_preset.clone(),
            "-crf".to_string(),
            defaults.h264_crf.to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            "-movflags".to_string(),
            "+faststart".to_string(),
        ]),
        Some(profile) => args.extend([
            "-c:v".to_string(),
            "prores_ks".to_string(),
            "-profile:v".to_string(),
            profile.to_string(),
            "-pix_fmt".to_string(),
            if codec.has_alpha() {
                "yuva444p10le".to_string()
            } else {
                "yuv422p10le".to_string()
            },
            "-vendor".to_string(),
            "apl0".to_string(),
        ]),
    }

    args.push(target.output.to_string_lossy().into_owned());
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(codec: CodecProfile) -> WriterTarget {
        WriterTarget {
            output: PathBuf::from("/tmp/out.mp4"),
            width: 1920,
            height: 1080,
            frame_rate: 30.0,
            kind: WriterKind::Video(codec),
        }
    }

    fn pair(args: &[String], flag: &str) -> Option<String> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1).cloned())
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_encoder_exit_is_encode_rejection() {
        let defaults = RenderDefaults {
            ffmpeg_path: "false".to_string(),
            ..RenderDefaults::default()
        };
        let mut writer = FfmpegVideoWriter::open(&defaults, &target(CodecProfile::H264)).unwrap();
        let err = writer.finish().unwrap_err();
        assert!(matches!(err, FramecastError::EncodeRejection { frame_index: 0, .. }));
        assert!(err.to_string().contains("exited with"));
        assert_eq!(writer.status(), WriterStatus::Failed);
    }

    #[test]
    fn test_h264_args() {
        let args = video_encoder_args(
            &RenderDefaults::default(),
            &target(CodecProfile::H264),
            CodecProfile::H264,
        );
        assert_eq!(pair(&args, "-s").as_deref(), Some("1920x1080"));
        assert_eq!(pair(&args, "-r").as_deref(), Some("30"));
        assert_eq!(pair(&args, "-c:v").as_deref(), Some("libx264"));
        assert_eq!(pair(&args, "-crf").as_deref(), Some("18"));
        assert_eq!(pair(&args, "-movflags").as_deref(), Some("+faststart"));
        assert_eq!(args.last().map(String::as_str), Some("/tmp/out.mp4"));
        // Input and output pixel formats.
        assert_eq!(args.iter().filter(|a| *a == "-pix_fmt").count(), 2);
        assert!(args.contains(&"yuv420p".to_string()));
    }

    #[test]
    fn test_prores_profiles() {
        let defaults = RenderDefaults::default();
        let proxy = CodecProfile::ProRes422Proxy;
        let proxy = video_encoder_args(&defaults, &target(proxy), proxy);
        assert_eq!(pair(&proxy, "-c:v").as_deref(), Some("prores_ks"));
        assert_eq!(pair(&proxy, "-profile:v").as_deref(), Some("0"));
        assert!(proxy.contains(&"yuv422p10le".to_string()));

        let xq = CodecProfile::ProRes4444Xq;
        let xq = video_encoder_args(&defaults, &target(xq), xq);
        assert_eq!(pair(&xq, "-profile:v").as_deref(), Some("5"));
        assert!(xq.contains(&"yuva444p10le".to_string()));
    }

    #[test]
    fn test_fractional_rate_is_preserved() {
        let mut t = target(CodecProfile::H264);
        t.frame_rate = 29.97;
        let args = video_encoder_args(&RenderDefaults::default(), &t, CodecProfile::H264);
        assert_eq!(pair(&args, "-r").as_deref(), Some("29.97"));
    }

    #[test]
    fn test_non_video_target_is_refused() {
        let mut t = target(CodecProfile::H264);
        t.kind = WriterKind::Gif;
        let err = FfmpegVideoWriter::open(&RenderDefaults::default(), &t).unwrap_err();
        assert!(matches!(err, FramecastError::WriterSetup { .. }));
    }

    #[test]
    fn test_missing_binary_is_a_setup_failure() {
        let defaults = RenderDefaults {
            ffmpeg_path: "/nonexistent/ffmpeg-binary".to_string(),
            ..RenderDefaults::default()
        };
        let err = FfmpegVideoWriter::open(&defaults, &target(CodecProfile::H264)).unwrap_err();
        assert!(err.to_string().contains("failed to start"));
    }
}
