//! Render one manifest.

use std::path::PathBuf;

use framecast_common::config::AppConfig;
use framecast_common::error::FramecastError;
use framecast_render_engine::{ExportCoordinator, ExportOutcome};

use super::{build_request, print_event, stem_of, RenderOptions};

pub async fn run(
    manifest: PathBuf,
    output: Option<PathBuf>,
    options: RenderOptions,
    json: bool,
    config: AppConfig,
) -> anyhow::Result<()> {
    println!("Rendering manifest: {}", manifest.display());

    let (output_dir, base_filename) = match &output {
        Some(path) => (
            path.parent()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            stem_of(path, "output"),
        ),
        None => (
            manifest
                .parent()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            stem_of(&manifest, "output"),
        ),
    };

    let request = build_request(&manifest, output_dir, base_filename, &options)?;
    println!("  Output: {}", request.config.output_path().display());
    println!("  Format: {:?}", request.config.format);
    println!(
        "  Resolution: {}x{} @ {} fps, {}s ({} frames)",
        request.config.width,
        request.config.height,
        request.config.frame_rate,
        request.config.duration_secs,
        request.config.frame_count()
    );

    let coordinator = ExportCoordinator::new(config);
    let mut handle = coordinator.start(request);
    let cancel = handle.cancel_token();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut cancel_requested = false;

    let outcome = loop {
        tokio::select! {
            event = handle.next_event() => match event {
                Some(event) => {
                    if let Some(outcome) = print_event(event) {
                        break outcome;
                    }
                }
                None => {
                    break ExportOutcome::Failed(FramecastError::Other(anyhow::anyhow!(
                        "export task ended without an outcome"
                    )));
                }
            },
            _ = &mut ctrl_c, if !cancel_requested => {
                cancel_requested = true;
                println!("\n  Cancelling...");
                cancel.cancel();
            }
        }
    };

    match outcome {
        ExportOutcome::Completed(summary) => {
            println!(
                "\nExport complete: {} ({} frames, {} audio segment(s), {:.1}s)",
                summary.output.display(),
                summary.frames_written,
                summary.audio_segments,
                summary.elapsed_secs
            );
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            }
            Ok(())
        }
        ExportOutcome::Cancelled => {
            println!("\nExport cancelled. Partial output was removed.");
            Ok(())
        }
        ExportOutcome::Failed(err) => {
            tracing::debug!(error = ?err, "Export failed");
            Err(anyhow::anyhow!("Export failed ({:?}): {err}", err.kind()))
        }
    }
}
