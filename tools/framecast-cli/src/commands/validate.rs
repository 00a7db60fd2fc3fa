//! Validate a render manifest.

use std::path::PathBuf;

use framecast_scene_model::manifest::RenderManifest;

pub fn run(path: PathBuf) -> anyhow::Result<()> {
    println!("Validating manifest at: {}", path.display());

    let manifest = RenderManifest::load(&path)
        .map_err(|e| anyhow::anyhow!("Failed to load manifest: {e}"))?;

    println!(
        "  Canvas: {}x{}",
        manifest.canvas.width, manifest.canvas.height
    );
    println!("  Duration: {}s", manifest.duration_secs);
    println!("  Elements: {}", manifest.elements.len());
    println!("  Tracks: {}", manifest.tracks.len());
    println!(
        "  Audio layers: {} ({} muted)",
        manifest.audio_layers.len(),
        manifest.audio_layers.iter().filter(|l| l.muted).count()
    );

    manifest
        .validate()
        .map_err(|e| anyhow::anyhow!("Manifest is not renderable: {e}"))?;

    let issues = manifest.issues();
    if issues.is_empty() {
        println!("\nManifest is valid.");
    } else {
        println!("\nIssues:");
        for issue in &issues {
            println!("  - {}: {}", issue.key, issue.message);
        }
        println!(
            "\n{} issue(s) found. Affected tracks will not animate anything.",
            issues.len()
        );
    }

    Ok(())
}
