//! Render several manifests in sequence.

use std::path::PathBuf;

use framecast_common::config::AppConfig;
use framecast_render_engine::{CancelToken, ExportCoordinator, ExportOutcome};

use super::{build_request, stem_of, RenderOptions};

pub async fn run(
    manifests: Vec<PathBuf>,
    output_dir: PathBuf,
    options: RenderOptions,
    config: AppConfig,
) -> anyhow::Result<()> {
    println!(
        "Batch rendering {} manifest(s) into {}",
        manifests.len(),
        output_dir.display()
    );

    let mut requests = Vec::with_capacity(manifests.len());
    for (index, manifest) in manifests.iter().enumerate() {
        let base = stem_of(manifest, &format!("job{}", index + 1));
        requests.push(build_request(manifest, output_dir.clone(), base, &options)?);
    }

    let cancel = CancelToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("\n  Cancelling batch...");
            on_ctrl_c.cancel();
        }
    });

    let coordinator = ExportCoordinator::new(config);
    let outcomes = coordinator.export_batch(requests, &cancel).await;

    let mut failures = 0usize;
    for (manifest, outcome) in manifests.iter().zip(&outcomes) {
        match outcome {
            ExportOutcome::Completed(summary) => println!(
                "  [OK]     {} -> {} ({} frames)",
                manifest.display(),
                summary.output.display(),
                summary.frames_written
            ),
            ExportOutcome::Failed(err) => {
                failures += 1;
                println!("  [FAILED] {}: {err}", manifest.display());
            }
            ExportOutcome::Cancelled => println!("  [CANCEL] {}", manifest.display()),
        }
    }
    let skipped = manifests.len() - outcomes.len();
    if skipped > 0 {
        println!("  {skipped} job(s) skipped after cancellation");
    }

    if failures > 0 {
        return Err(anyhow::anyhow!("{failures} of {} export(s) failed", manifests.len()));
    }
    Ok(())
}
