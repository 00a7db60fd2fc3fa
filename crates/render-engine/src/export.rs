//! Export orchestration.
//!
//! [`ExportCoordinator::start`] runs one job on a blocking worker (the
//! driving context) and hands back an [`ExportHandle`] for the caller (the
//! control context). Inside the job a producer thread samples and
//! composites frames into a bounded channel; the driving thread drains it
//! in order into the [`VideoEncoderSink`]. Progress, warnings, and the
//! final outcome travel back over an unbounded channel.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use framecast_common::config::{AppConfig, RenderDefaults};
use framecast_common::error::{ErrorKind, FramecastError, FramecastResult};
use framecast_processing_core::snapshot::SnapshotBuilder;
use framecast_scene_model::color::Color;
use framecast_scene_model::export::{ExportConfiguration, ExportFormat};
use framecast_scene_model::manifest::RenderManifest;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::audio::AudioComposer;
use crate::backend::{mux_temp_path, FfmpegBackend, RenderBackend};
use crate::compositor::FrameCompositor;
use crate::encoder::{SinkOptions, VideoEncoderSink, WriterTarget};
use crate::raster::PixelBuffer;

/// Progress callback for export rendering.
pub type ProgressCallback = Box<dyn Fn(ExportProgress) + Send>;

/// Export progress report.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportProgress {
    /// Current progress [0.0, 1.0].
    pub progress: f64,

    /// Frames accepted by the encoder so far.
    pub frames_rendered: u64,

    /// Total frames to render.
    pub total_frames: u64,

    /// Estimated time remaining in seconds.
    pub eta_secs: f64,

    /// Current stage.
    pub stage: ExportStage,
}

/// Stages of the export process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportStage {
    Preparing,
    Rendering,
    /// All frames handed over; the writer is flushing.
    Encoding,
}

/// One export job: what to render and how.
///
/// The scene is shared read-only for the whole job; callers pass a copy of
/// their editable document, never the live one.
#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub config: ExportConfiguration,
    pub scene: Arc<RenderManifest>,
}

impl ExportRequest {
    pub fn new(config: ExportConfiguration, scene: impl Into<Arc<RenderManifest>>) -> Self {
        Self {
            config,
            scene: scene.into(),
        }
    }
}

/// Result details of a completed export.
#[derive(Debug, Clone, Serialize)]
pub struct ExportSummary {
    /// Output file, or directory for image sequences.
    pub output: PathBuf,
    pub frames_written: u64,
    pub audio_segments: usize,
    pub elapsed_secs: f64,
    pub finished_at: DateTime<Utc>,
}

/// Terminal state of an export.
#[derive(Debug)]
pub enum ExportOutcome {
    Completed(ExportSummary),
    Failed(FramecastError),
    Cancelled,
}

impl ExportOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, ExportOutcome::Completed(_))
    }

    /// Error kind for failures and cancellation.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            ExportOutcome::Completed(_) => None,
            ExportOutcome::Failed(err) => Some(err.kind()),
            ExportOutcome::Cancelled => Some(ErrorKind::Cancelled),
        }
    }

    pub fn into_result(self) -> FramecastResult<ExportSummary> {
        match self {
            ExportOutcome::Completed(summary) => Ok(summary),
            ExportOutcome::Failed(err) => Err(err),
            ExportOutcome::Cancelled => Err(FramecastError::Cancelled),
        }
    }
}

/// Messages from a running export.
#[derive(Debug)]
pub enum ExportEvent {
    Progress(ExportProgress),
    /// A non-fatal problem, such as an unusable asset or audio layer.
    Warning(String),
    Finished(ExportOutcome),
}

/// Cooperative cancellation flag, checked once per frame.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Caller-side handle of a running export.
#[derive(Debug)]
pub struct ExportHandle {
    events: mpsc::UnboundedReceiver<ExportEvent>,
    cancel: CancelToken,
    task: Option<JoinHandle<()>>,
    output: PathBuf,
}

impl ExportHandle {
    /// Where the output is being written.
    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Request cancellation. The current frame completes; no further frames
    /// are pushed.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Next event, or `None` once the job has finished and all events have
    /// been received.
    pub async fn next_event(&mut self) -> Option<ExportEvent> {
        self.events.recv().await
    }

    /// Wait for the outcome, discarding progress.
    pub async fn wait(self) -> ExportOutcome {
        self.wait_with_progress(|_| {}).await
    }

    /// Wait for the outcome, calling `on_progress` for each progress report.
    pub async fn wait_with_progress(mut self, mut on_progress: impl FnMut(f64)) -> ExportOutcome {
        while let Some(event) = self.events.recv().await {
            match event {
                ExportEvent::Progress(p) => on_progress(p.progress),
                ExportEvent::Warning(message) => {
                    tracing::debug!(warning = %message, "Export warning");
                }
                ExportEvent::Finished(outcome) => return outcome,
            }
        }

        // The channel closed without an outcome: the driving task died.
        let reason = match self.task.take() {
            Some(task) => match task.await {
                Err(err) if err.is_panic() => "export task panicked".to_string(),
                Err(err) => format!("export task failed: {err}"),
                Ok(()) => "export task ended without an outcome".to_string(),
            },
            None => "export task ended without an outcome".to_string(),
        };
        ExportOutcome::Failed(FramecastError::Other(anyhow::anyhow!(reason)))
    }
}

/// Runs export jobs against a render backend.
#[derive(Clone)]
pub struct ExportCoordinator {
    backend: Arc<dyn RenderBackend>,
    defaults: RenderDefaults,
}

impl std::fmt::Debug for ExportCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportCoordinator")
            .field("backend", &self.backend.name())
            .field("defaults", &self.defaults)
            .finish()
    }
}

impl ExportCoordinator {
    /// Coordinator using the ffmpeg backend configured by `config`.
    pub fn new(config: AppConfig) -> Self {
        let backend = Arc::new(FfmpegBackend::new(config.render.clone()));
        Self::with_backend(backend, config.render)
    }

    pub fn with_backend(backend: Arc<dyn RenderBackend>, defaults: RenderDefaults) -> Self {
        Self { backend, defaults }
    }

    pub fn backend(&self) -> &Arc<dyn RenderBackend> {
        &self.backend
    }

    /// Start an export. Must be called from within a Tokio runtime.
    pub fn start(&self, request: ExportRequest) -> ExportHandle {
        self.start_with_token(request, CancelToken::new())
    }

    /// Start an export observing an existing cancellation token.
    pub fn start_with_token(&self, request: ExportRequest, cancel: CancelToken) -> ExportHandle {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let output = request.config.output_path();
        let backend = self.backend.clone();
        let defaults = self.defaults.clone();
        let token = cancel.clone();

        let task = tokio::task::spawn_blocking(move || {
            let outcome = run_export(backend.as_ref(), &defaults, &request, &events_tx, &token);
            match &outcome {
                ExportOutcome::Completed(summary) => tracing::info!(
                    output = %summary.output.display(),
                    frames = summary.frames_written,
                    elapsed_secs = summary.elapsed_secs,
                    "Export finished"
                ),
                ExportOutcome::Failed(err) => {
                    tracing::error!(kind = ?err.kind(), error = %err, "Export failed")
                }
                ExportOutcome::Cancelled => tracing::info!("Export cancelled"),
            }
            let _ = events_tx.send(ExportEvent::Finished(outcome));
        });

        ExportHandle {
            events: events_rx,
            cancel,
            task: Some(task),
            output,
        }
    }

    /// Run one export to completion.
    pub async fn export(&self, request: ExportRequest) -> ExportOutcome {
        self.start(request).wait().await
    }

    /// Run `requests` one after another. Stops after the first cancelled
    /// job; failures do not stop the batch.
    pub async fn export_batch(
        &self,
        requests: Vec<ExportRequest>,
        cancel: &CancelToken,
    ) -> Vec<ExportOutcome> {
        let total = requests.len();
        let mut outcomes = Vec::with_capacity(total);
        for (index, request) in requests.into_iter().enumerate() {
            tracing::info!(job = index + 1, of = total, "Starting batch job");
            let outcome = self.start_with_token(request, cancel.clone()).wait().await;
            let cancelled = matches!(outcome, ExportOutcome::Cancelled);
            outcomes.push(outcome);
            if cancelled {
                tracing::info!(remaining = total - index - 1, "Batch cancelled");
                break;
            }
        }
        outcomes
    }
}

fn run_export(
    backend: &dyn RenderBackend,
    defaults: &RenderDefaults,
    request: &ExportRequest,
    events: &mpsc::UnboundedSender<ExportEvent>,
    cancel: &CancelToken,
) -> ExportOutcome {
    let config = &request.config;
    let span = tracing::info_span!("export", output = %config.output_path().display());
    let _enter = span.enter();

    if let Err(err) = config.validate().and_then(|_| request.scene.validate()) {
        return ExportOutcome::Failed(err);
    }
    if config.is_video() && !backend.is_available() {
        return ExportOutcome::Failed(FramecastError::unsupported(format!(
            "render backend `{}` is not available (is ffmpeg installed at `{}`?)",
            backend.name(),
            defaults.ffmpeg_path
        )));
    }
    if cancel.is_cancelled() {
        return ExportOutcome::Cancelled;
    }

    let started = Instant::now();
    let mut output_claimed = false;
    match render_job(backend, defaults, request, events, cancel, &span, &mut output_claimed) {
        Ok((frames_written, audio_segments)) => ExportOutcome::Completed(ExportSummary {
            output: config.output_path(),
            frames_written,
            audio_segments,
            elapsed_secs: started.elapsed().as_secs_f64(),
            finished_at: Utc::now(),
        }),
        Err(FramecastError::Cancelled) => {
            if output_claimed {
                discard_partial_output(config);
            }
            ExportOutcome::Cancelled
        }
        Err(err) => {
            if output_claimed {
                discard_partial_output(config);
            }
            ExportOutcome::Failed(err)
        }
    }
}

type FrameItem = FramecastResult<(u64, PixelBuffer)>;

/// Render, encode, and mux one validated job. Returns frames written and
/// muxed audio segments.
///
/// `output_claimed` is set once a writer has opened the output, so files that
/// existed before a failed setup are left alone.
fn render_job(
    backend: &dyn RenderBackend,
    defaults: &RenderDefaults,
    request: &ExportRequest,
    events: &mpsc::UnboundedSender<ExportEvent>,
    cancel: &CancelToken,
    span: &tracing::Span,
    output_claimed: &mut bool,
) -> FramecastResult<(u64, usize)> {
    let config = &request.config;
    let scene = request.scene.as_ref();
    let total = config.frame_count();
    let clock = config.clock();

    let target = WriterTarget::from_config(config)?;
    std::fs::create_dir_all(&config.output).map_err(|e| {
        FramecastError::writer_setup(format!(
            "cannot create output directory {}: {e}",
            config.output.display()
        ))
    })?;

    let _ = events.send(ExportEvent::Progress(ExportProgress {
        progress: 0.0,
        frames_rendered: 0,
        total_frames: total,
        eta_secs: 0.0,
        stage: ExportStage::Preparing,
    }));

    let progress_tx = events.clone();
    let mut sink = VideoEncoderSink::new(
        SinkOptions {
            total_frames: total,
            frame_rate: config.frame_rate,
            progress_steps: defaults.progress_steps,
            readiness_poll: Duration::from_millis(2),
        },
        Some(Box::new(move |progress| {
            let _ = progress_tx.send(ExportEvent::Progress(progress));
        })),
    );
    sink.start(backend, &target)?;
    *output_claimed = true;

    tracing::info!(
        frames = total,
        width = config.width,
        height = config.height,
        fps = config.frame_rate,
        format = ?config.format,
        backend = backend.name(),
        "Rendering frames"
    );

    let placeholder = Color::from_hex(&defaults.placeholder_color).unwrap_or_else(|err| {
        tracing::warn!(error = %err, "Invalid placeholder color, using neutral gray");
        Color::NEUTRAL_GRAY
    });
    let mut compositor = FrameCompositor::new(backend.video_frames(), placeholder);
    let (frame_tx, frame_rx) = mpsc::channel::<FrameItem>(defaults.frame_queue_capacity.max(1));

    let pushed = std::thread::scope(|s| {
        let producer_span = span.clone();
        let warnings = events.clone();
        s.spawn(move || {
            let _enter = producer_span.enter();
            let builder = SnapshotBuilder::new(&scene.elements, &scene.tracks);
            tracing::debug!(bound = builder.bound_property_count(), "Animation bindings resolved");
            for index in 0..total {
                if cancel.is_cancelled() {
                    break;
                }
                let snapshot = builder.build(clock.time_at(index));
                let frame = compositor.render(
                    &snapshot,
                    config.width,
                    config.height,
                    scene.canvas.width,
                    scene.canvas.height,
                    scene.background,
                );
                for warning in compositor.take_warnings() {
                    let _ = warnings.send(ExportEvent::Warning(warning));
                }
                let failed = frame.is_err();
                if frame_tx.blocking_send(frame.map(|f| (index, f))).is_err() || failed {
                    break;
                }
            }
        });

        // Owned here so that returning early closes the channel and
        // unblocks the producer before the scope joins it.
        let mut frame_rx = frame_rx;
        while let Some(item) = frame_rx.blocking_recv() {
            if cancel.is_cancelled() {
                return Err(FramecastError::Cancelled);
            }
            let (index, frame) = item?;
            sink.push_frame(frame, clock.presentation_time(index))?;
        }
        Ok(())
    });

    if let Err(err) = pushed {
        sink.cancel();
        return Err(err);
    }
    if cancel.is_cancelled() {
        sink.cancel();
        return Err(FramecastError::Cancelled);
    }
    if sink.frames_written() != total {
        sink.cancel();
        return Err(FramecastError::encode_rejection(
            sink.frames_written(),
            format!(
                "frame production stopped after {} of {total} frames",
                sink.frames_written()
            ),
        ));
    }
    sink.finish()?;

    let audio_segments = mix_audio(backend, request, events, cancel, clock.time_at(total))?;

    verify_output(config, total)?;
    Ok((total, audio_segments))
}

/// Mix and mux audio layers when the job asks for it. Audio problems are
/// warnings; only cancellation is an error here.
fn mix_audio(
    backend: &dyn RenderBackend,
    request: &ExportRequest,
    events: &mpsc::UnboundedSender<ExportEvent>,
    cancel: &CancelToken,
    video_duration_secs: f64,
) -> FramecastResult<usize> {
    let config = &request.config;
    let layers = &request.scene.audio_layers;
    if !config.include_audio || layers.is_empty() {
        return Ok(0);
    }
    if !config.is_video() {
        tracing::info!(format = ?config.format, "Format carries no audio, ignoring audio layers");
        return Ok(0);
    }
    if layers.iter().all(|layer| layer.muted) {
        tracing::info!("All audio layers are muted, exporting video only");
        return Ok(0);
    }
    if cancel.is_cancelled() {
        return Err(FramecastError::Cancelled);
    }

    let probe = backend.audio_probe();
    let composition = AudioComposer::new(probe.as_ref()).compose(layers, video_duration_secs);
    for skipped in composition.unusable() {
        let _ = events.send(ExportEvent::Warning(format!(
            "Audio layer {} skipped: {:?}",
            skipped.asset.display(),
            skipped.reason
        )));
    }
    if composition.is_silent() {
        let _ = events.send(ExportEvent::Warning(
            "No audio layer could be mixed; the export has no audio".to_string(),
        ));
        return Ok(0);
    }

    let output = config.output_path();
    match backend.mux_audio(&output, &composition, config.effective_codec()) {
        Ok(()) => Ok(composition.segments.len()),
        Err(err) => {
            tracing::warn!(error = %err, "Audio mux failed, keeping video-only output");
            let _ = events.send(ExportEvent::Warning(format!(
                "Audio could not be added, the export has no audio: {err}"
            )));
            Ok(0)
        }
    }
}

/// Check that the writer left what it claimed: a non-empty file, or every
/// numbered frame of a sequence.
pub fn verify_output(config: &ExportConfiguration, frames: u64) -> FramecastResult<()> {
    let path = config.output_path();
    if let ExportFormat::ImageSequence(_) = config.format {
        for index in 0..frames {
            let Some(name) = config.sequence_file_name(index) else {
                continue;
            };
            let frame = path.join(name);
            if !frame.is_file() {
                return Err(FramecastError::output_verification(
                    &frame,
                    format!("frame {index} of {frames} is missing"),
                ));
            }
        }
        return Ok(());
    }

    let metadata = std::fs::metadata(&path).map_err(|_| {
        FramecastError::output_verification(&path, "writer reported success but no file exists")
    })?;
    if metadata.len() == 0 {
        return Err(FramecastError::output_verification(
            &path,
            "writer reported success but the file is empty",
        ));
    }
    Ok(())
}

/// Remove whatever this job wrote.
fn discard_partial_output(config: &ExportConfiguration) {
    let path = config.output_path();
    let removed = match config.format {
        ExportFormat::ImageSequence(_) => {
            let mut removed = 0usize;
            for index in 0..config.frame_count() {
                if let Some(name) = config.sequence_file_name(index) {
                    if std::fs::remove_file(path.join(name)).is_ok() {
                        removed += 1;
                    }
                }
            }
            // Only succeeds if the directory is now empty.
            let _ = std::fs::remove_dir(&path);
            removed
        }
        _ => {
            let _ = std::fs::remove_file(mux_temp_path(&path));
            usize::from(std::fs::remove_file(&path).is_ok())
        }
    };
    if removed > 0 {
        tracing::info!(path = %path.display(), files = removed, "Discarded partial output");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framecast_scene_model::export::ImageFormat;

    #[test]
    fn test_verify_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExportConfiguration::video(dir.path(), "nothing", 64, 64, 30.0, 1.0);
        let err = verify_output(&config, 30).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutputVerificationFailure);
    }

    #[test]
    fn test_verify_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExportConfiguration::video(dir.path(), "empty", 64, 64, 30.0, 1.0);
        std::fs::write(config.output_path(), b"").unwrap();
        assert!(verify_output(&config, 30).is_err());
        std::fs::write(config.output_path(), b"data").unwrap();
        assert!(verify_output(&config, 30).is_ok());
    }

    #[test]
    fn test_verify_sequence_needs_every_frame() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ExportConfiguration::video(dir.path(), "seq", 64, 64, 10.0, 0.3);
        config.format = ExportFormat::ImageSequence(ImageFormat::Png);
        let seq_dir = config.output_path();
        std::fs::create_dir_all(&seq_dir).unwrap();
        std::fs::write(seq_dir.join("seq_00000.png"), b"x").unwrap();
        std::fs::write(seq_dir.join("seq_00002.png"), b"x").unwrap();
        let err = verify_output(&config, 3).unwrap_err();
        assert!(err.to_string().contains("frame 1 of 3"));
    }

    #[test]
    fn test_discard_removes_sequence_and_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ExportConfiguration::video(dir.path(), "seq", 64, 64, 10.0, 0.2);
        config.format = ExportFormat::ImageSequence(ImageFormat::Jpeg);
        let seq_dir = config.output_path();
        std::fs::create_dir_all(&seq_dir).unwrap();
        std::fs::write(seq_dir.join("seq_00000.jpg"), b"x").unwrap();
        discard_partial_output(&config);
        assert!(!seq_dir.exists());
    }

    #[test]
    fn test_discard_keeps_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ExportConfiguration::video(dir.path(), "seq", 64, 64, 10.0, 0.2);
        config.format = ExportFormat::ImageSequence(ImageFormat::Png);
        let seq_dir = config.output_path();
        std::fs::create_dir_all(&seq_dir).unwrap();
        std::fs::write(seq_dir.join("seq_00001.png"), b"x").unwrap();
        std::fs::write(seq_dir.join("notes.txt"), b"keep").unwrap();
        discard_partial_output(&config);
        assert!(seq_dir.join("notes.txt").exists());
        assert!(!seq_dir.join("seq_00001.png").exists());
    }

    #[test]
    fn test_outcome_kinds() {
        assert_eq!(
            ExportOutcome::Cancelled.error_kind(),
            Some(ErrorKind::Cancelled)
        );
        let failed = ExportOutcome::Failed(FramecastError::invalid_config("x"));
        assert_eq!(failed.error_kind(), Some(ErrorKind::InvalidConfiguration));
        assert!(matches!(
            ExportOutcome::Cancelled.into_result(),
            Err(FramecastError::Cancelled)
        ));
    }

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
