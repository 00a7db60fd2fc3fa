//! Video encoder sink: the ordered, paced hand-off from rendered frames to
//! an output writer.
//!
//! ```text
//! idle ──start──▶ writing ──finish──▶ finished
//!                    │  └──cancel───▶ cancelled
//!                    └──rejection──▶ failed
//! ```

use std::path::PathBuf;
use std::time::{Duration, Instant};

use framecast_common::clock::{FrameClock, PresentationTime, ProgressThrottle};
use framecast_common::error::{ErrorKind, FramecastError, FramecastResult};
use framecast_scene_model::export::{CodecProfile, ExportConfiguration, ExportFormat, ImageFormat};

use crate::backend::RenderBackend;
use crate::export::{ExportProgress, ExportStage, ProgressCallback};
use crate::raster::PixelBuffer;

/// What a writer produces.
#[derive(Debug, Clone, PartialEq)]
pub enum WriterKind {
    Video(CodecProfile),
    Gif,
    ImageSequence {
        format: ImageFormat,
        base_filename: String,
        /// 1–100, used for JPEG only.
        jpeg_quality: u8,
    },
}

/// Everything needed to open a writer.
#[derive(Debug, Clone, PartialEq)]
pub struct WriterTarget {
    /// Output file, or directory for image sequences.
    pub output: PathBuf,
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    pub kind: WriterKind,
}

impl WriterTarget {
    pub fn from_config(config: &ExportConfiguration) -> FramecastResult<Self> {
        let kind = match config.format {
            ExportFormat::Video | ExportFormat::VideoProRes => {
                WriterKind::Video(config.effective_codec())
            }
            ExportFormat::Gif => WriterKind::Gif,
            ExportFormat::ImageSequence(format) => WriterKind::ImageSequence {
                format,
                base_filename: config.base_filename.clone(),
                jpeg_quality: config.jpeg_quality(),
            },
            ExportFormat::ProjectFile | ExportFormat::BatchExport => {
                return Err(FramecastError::invalid_config(format!(
                    "{:?} has no frame writer",
                    config.format
                )))
            }
        };
        Ok(Self {
            output: config.output_path(),
            width: config.width,
            height: config.height,
            frame_rate: config.frame_rate,
            kind,
        })
    }
}

/// Lifecycle of a writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterStatus {
    Writing,
    Finished,
    Failed,
    Cancelled,
}

/// A container or image writer accepting frames in presentation order.
pub trait FrameWriter: Send {
    /// Whether [`FrameWriter::append`] can take another frame now.
    fn is_ready_for_more_data(&self) -> bool;

    /// Append one frame. An error means the frame was refused.
    fn append(&mut self, frame: PixelBuffer, pts: PresentationTime) -> FramecastResult<()>;

    /// Signal end of input and block until everything is flushed.
    fn finish(&mut self) -> FramecastResult<()>;

    /// Abandon the output.
    fn cancel(&mut self);

    fn status(&self) -> WriterStatus;
}

/// State of a [`VideoEncoderSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    Idle,
    Writing,
    Finished,
    Failed,
    Cancelled,
}

/// Sink parameters.
#[derive(Debug, Clone)]
pub struct SinkOptions {
    pub total_frames: u64,
    pub frame_rate: f64,

    /// Upper bound on progress reports for the job.
    pub progress_steps: u32,

    /// Sleep between readiness checks while the writer is busy.
    pub readiness_poll: Duration,
}

impl SinkOptions {
    pub fn new(total_frames: u64, frame_rate: f64) -> Self {
        Self {
            total_frames,
            frame_rate,
            progress_steps: 100,
            readiness_poll: Duration::from_millis(2),
        }
    }
}

/// Owns a [`FrameWriter`] and enforces ordering, pacing, and progress.
pub struct VideoEncoderSink {
    state: SinkState,
    options: SinkOptions,
    clock: FrameClock,
    writer: Option<Box<dyn FrameWriter>>,
    frames_written: u64,
    throttle: ProgressThrottle,
    progress: Option<ProgressCallback>,
    started: Instant,
}

impl VideoEncoderSink {
    pub fn new(options: SinkOptions, progress: Option<ProgressCallback>) -> Self {
        Self {
            state: SinkState::Idle,
            clock: FrameClock::new(options.frame_rate),
            throttle: ProgressThrottle::new(options.total_frames, options.progress_steps),
            options,
            writer: None,
            frames_written: 0,
            progress,
            started: Instant::now(),
        }
    }

    pub fn state(&self) -> SinkState {
        self.state
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Open a writer for `target` through `backend`.
    pub fn start(&mut self, backend: &dyn RenderBackend, target: &WriterTarget) -> FramecastResult<()> {
        if self.state != SinkState::Idle {
            return Err(FramecastError::writer_setup(format!(
                "sink already started ({:?})",
                self.state
            )));
        }
        match backend.open_writer(target) {
            Ok(writer) => self.start_with_writer(writer),
            Err(err) => {
                self.state = SinkState::Failed;
                Err(match err {
                    FramecastError::WriterSetup { .. } => err,
                    other => FramecastError::writer_setup(format!(
                        "{} writer for {}: {other}",
                        backend.name(),
                        target.output.display()
                    )),
                })
            }
        }
    }

    /// Begin writing into an already opened writer.
    pub fn start_with_writer(&mut self, writer: Box<dyn FrameWriter>) -> FramecastResult<()> {
        if self.state != SinkState::Idle {
            return Err(FramecastError::writer_setup(format!(
                "sink already started ({:?})",
                self.state
            )));
        }
        if writer.status() != WriterStatus::Writing {
            self.state = SinkState::Failed;
            return Err(FramecastError::writer_setup(format!(
                "writer is not accepting input ({:?})",
                writer.status()
            )));
        }
        self.writer = Some(writer);
        self.state = SinkState::Writing;
        self.started = Instant::now();
        tracing::debug!(total_frames = self.options.total_frames, "Encoder sink writing");
        Ok(())
    }

    /// Append the next frame.
    ///
    /// `pts` must be exactly the frame after the previous one, starting at
    /// frame zero. Blocks while the writer is not ready. Any refusal moves
    /// the sink to `failed`.
    pub fn push_frame(&mut self, frame: PixelBuffer, pts: PresentationTime) -> FramecastResult<()> {
        if self.state != SinkState::Writing {
            return Err(FramecastError::encode_rejection(
                pts.frame_index,
                format!("sink is {:?}, not writing", self.state),
            ));
        }
        let expected = self.clock.presentation_time(self.frames_written);
        if pts != expected {
            return Err(self.reject(
                pts.frame_index,
                format!(
                    "out-of-order presentation time {:.6}s, expected frame {} at {:.6}s",
                    pts.secs(),
                    expected.frame_index,
                    expected.secs()
                ),
            ));
        }
        if self.frames_written >= self.options.total_frames {
            return Err(self.reject(
                pts.frame_index,
                format!("all {} frames were already written", self.options.total_frames),
            ));
        }

        let Some(writer) = self.writer.as_mut() else {
            return Err(self.reject(pts.frame_index, "no writer attached".to_string()));
        };
        while !writer.is_ready_for_more_data() {
            if writer.status() != WriterStatus::Writing {
                let status = writer.status();
                return Err(self.reject(
                    pts.frame_index,
                    format!("writer stopped while waiting for readiness ({status:?})"),
                ));
            }
            std::thread::sleep(self.options.readiness_poll);
        }

        if let Err(err) = writer.append(frame, pts) {
            let message = match err {
                FramecastError::EncodeRejection { message, .. } => message,
                other => other.to_string(),
            };
            return Err(self.reject(pts.frame_index, message));
        }

        self.frames_written += 1;
        self.report_progress();
        Ok(())
    }

    /// Flush and close the writer. Resolves once it has left `writing`.
    pub fn finish(&mut self) -> FramecastResult<()> {
        if self.state != SinkState::Writing {
            return Err(FramecastError::writer_setup(format!(
                "cannot finish a sink that is {:?}",
                self.state
            )));
        }
        let Some(writer) = self.writer.as_mut() else {
            self.state = SinkState::Failed;
            return Err(FramecastError::writer_setup("no writer attached"));
        };
        match writer.finish() {
            Ok(()) if writer.status() == WriterStatus::Finished => {
                self.state = SinkState::Finished;
                tracing::debug!(
                    frames = self.frames_written,
                    elapsed_ms = self.started.elapsed().as_millis(),
                    "Encoder sink finished"
                );
                Ok(())
            }
            Ok(()) => {
                self.state = SinkState::Failed;
                Err(FramecastError::writer_setup(format!(
                    "writer reported {:?} after finishing",
                    writer.status()
                )))
            }
            Err(err) => {
                self.state = SinkState::Failed;
                Err(self.finalization_error(err))
            }
        }
    }

    /// Writers report finalization failures in their own terms; anything
    /// outside the pipeline's error kinds becomes a rejection of the last
    /// frame.
    fn finalization_error(&self, err: FramecastError) -> FramecastError {
        match err.kind() {
            ErrorKind::Io | ErrorKind::Internal => FramecastError::encode_rejection(
                self.frames_written.saturating_sub(1),
                format!("writer failed to finalize: {err}"),
            ),
            _ => err,
        }
    }

    /// Stop accepting frames and discard the writer's output.
    pub fn cancel(&mut self) {
        if matches!(self.state, SinkState::Idle | SinkState::Writing) {
            if let Some(writer) = self.writer.as_mut() {
                writer.cancel();
            }
            self.state = SinkState::Cancelled;
        }
    }

    fn reject(&mut self, frame_index: u64, message: String) -> FramecastError {
        tracing::error!(frame_index, reason = %message, "Frame rejected");
        if let Some(writer) = self.writer.as_mut() {
            writer.cancel();
        }
        self.state = SinkState::Failed;
        FramecastError::encode_rejection(frame_index, message)
    }

    fn report_progress(&mut self) {
        if !self.throttle.should_report(self.frames_written) {
            return;
        }
        let Some(callback) = &self.progress else {
            return;
        };
        let total = self.options.total_frames;
        let progress = (self.frames_written as f64 / total as f64).clamp(0.0, 1.0);
        let elapsed = self.started.elapsed().as_secs_f64();
        let eta_secs = if progress > 0.0 {
            (elapsed / progress - elapsed).max(0.0)
        } else {
            0.0
        };
        callback(ExportProgress {
            progress,
            frames_rendered: self.frames_written,
            total_frames: total,
            eta_secs,
            stage: if self.frames_written >= total {
                ExportStage::Encoding
            } else {
                ExportStage::Rendering
            },
        });
    }
}

impl Drop for VideoEncoderSink {
    fn drop(&mut self) {
        if self.state == SinkState::Writing {
            self.cancel();
        }
    }
}
