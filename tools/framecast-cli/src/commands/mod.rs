pub mod batch;
pub mod check;
pub mod render;
pub mod validate;

use std::io::Write;
use std::path::{Path, PathBuf};

use clap::Args;
use framecast_render_engine::{ExportEvent, ExportOutcome, ExportProgress, ExportRequest};
use framecast_scene_model::export::{CodecProfile, ExportConfiguration, ExportFormat, ImageFormat};
use framecast_scene_model::manifest::RenderManifest;

/// Output settings shared by `render` and `batch`.
#[derive(Args, Debug, Clone)]
pub struct RenderOptions {
    /// Output format: mp4, prores, prores-proxy, prores-lt, prores-hq,
    /// prores-4444, prores-4444xq, gif, png, jpeg
    #[arg(long, default_value = "mp4")]
    pub format: String,

    /// Output width (defaults to the canvas width)
    #[arg(long)]
    pub width: Option<u32>,

    /// Output height (defaults to the canvas height)
    #[arg(long)]
    pub height: Option<u32>,

    /// Frames per second
    #[arg(long, default_value = "30")]
    pub fps: f64,

    /// Duration in seconds (defaults to the scene duration)
    #[arg(long)]
    pub duration: Option<f64>,

    /// Skip audio layers
    #[arg(long)]
    pub no_audio: bool,

    /// JPEG quality [0.0, 1.0]
    #[arg(long)]
    pub quality: Option<f64>,
}

/// Map a `--format` name to an export format and codec.
pub fn parse_format(name: &str) -> anyhow::Result<(ExportFormat, Option<CodecProfile>)> {
    let parsed = match name {
        "mp4" | "h264" => (ExportFormat::Video, Some(CodecProfile::H264)),
        "prores" => (ExportFormat::VideoProRes, Some(CodecProfile::ProRes422)),
        "prores-proxy" => (ExportFormat::VideoProRes, Some(CodecProfile::ProRes422Proxy)),
        "prores-lt" => (ExportFormat::VideoProRes, Some(CodecProfile::ProRes422Lt)),
        "prores-hq" => (ExportFormat::VideoProRes, Some(CodecProfile::ProRes422Hq)),
        "prores-4444" => (ExportFormat::VideoProRes, Some(CodecProfile::ProRes4444)),
        "prores-4444xq" => (ExportFormat::VideoProRes, Some(CodecProfile::ProRes4444Xq)),
        "gif" => (ExportFormat::Gif, None),
        "png" => (ExportFormat::ImageSequence(ImageFormat::Png), None),
        "jpeg" | "jpg" => (ExportFormat::ImageSequence(ImageFormat::Jpeg), None),
        _ => {
            return Err(anyhow::anyhow!(
                "Unknown format: {name}. Use: mp4, prores, prores-proxy, prores-lt, prores-hq, prores-4444, prores-4444xq, gif, png, jpeg"
            ));
        }
    };
    Ok(parsed)
}

/// Load `manifest` and build a request writing to `output_dir/base_filename`.
pub fn build_request(
    manifest_path: &Path,
    output_dir: PathBuf,
    base_filename: String,
    options: &RenderOptions,
) -> anyhow::Result<ExportRequest> {
    let manifest = RenderManifest::load(manifest_path).map_err(|e| {
        anyhow::anyhow!("Failed to load manifest {}: {e}", manifest_path.display())
    })?;
    manifest
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid manifest {}: {e}", manifest_path.display()))?;
    let (format, codec_profile) = parse_format(&options.format)?;

    let width = match options.width {
        Some(width) => width,
        None => canvas_pixels(manifest.canvas.width, "width")?,
    };
    let height = match options.height {
        Some(height) => height,
        None => canvas_pixels(manifest.canvas.height, "height")?,
    };
    let config = ExportConfiguration {
        format,
        width,
        height,
        frame_rate: options.fps,
        duration_secs: options.duration.unwrap_or(manifest.duration_secs),
        output: output_dir,
        codec_profile,
        include_audio: !options.no_audio,
        base_filename,
        image_quality: options.quality,
    };
    Ok(ExportRequest::new(config, manifest))
}

/// Canvas extent as a whole pixel count for the default output size.
fn canvas_pixels(extent: f64, axis: &str) -> anyhow::Result<u32> {
    let pixels = extent.round();
    if !pixels.is_finite() || pixels < 1.0 || pixels > f64::from(u32::MAX) {
        anyhow::bail!("Canvas {axis} {extent} cannot be used as an output size; pass --{axis}");
    }
    Ok(pixels as u32)
}

/// File stem of `path`, or `fallback`.
pub fn stem_of(path: &Path, fallback: &str) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| fallback.to_string())
}

pub fn print_progress(p: &ExportProgress) {
    print!(
        "\r  Progress: {:.1}% ({}/{} frames, ETA: {:.0}s)  ",
        p.progress * 100.0,
        p.frames_rendered,
        p.total_frames,
        p.eta_secs,
    );
    let _ = std::io::stdout().flush();
}

/// Print one event. Returns the outcome when the job has finished.
pub fn print_event(event: ExportEvent) -> Option<ExportOutcome> {
    match event {
        ExportEvent::Progress(p) => {
            print_progress(&p);
            None
        }
        ExportEvent::Warning(message) => {
            println!("\n  Warning: {message}");
            None
        }
        ExportEvent::Finished(outcome) => Some(outcome),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_format_names() {
        assert_eq!(
            parse_format("prores-4444").unwrap(),
            (ExportFormat::VideoProRes, Some(CodecProfile::ProRes4444))
        );
        assert_eq!(
            parse_format("jpg").unwrap(),
            (ExportFormat::ImageSequence(ImageFormat::Jpeg), None)
        );
        assert!(parse_format("webm").is_err());
    }

    #[test]
    fn test_build_request_defaults_from_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("intro.json");
        std::fs::write(
            &manifest,
            r#"{"canvas":{"width":1280,"height":720},"duration_secs":2.5,"elements":[]}"#,
        )
        .unwrap();
        let options = RenderOptions {
            format: "gif".to_string(),
            width: None,
            height: Some(360),
            fps: 12.0,
            duration: None,
            no_audio: false,
            quality: None,
        };

        let request =
            build_request(&manifest, dir.path().to_path_buf(), "intro".into(), &options).unwrap();
        assert_eq!(request.config.width, 1280);
        assert_eq!(request.config.height, 360);
        assert!((request.config.duration_secs - 2.5).abs() < 1e-9);
        assert_eq!(request.config.output_path(), dir.path().join("intro.gif"));
        assert_eq!(stem_of(&manifest, "out"), "intro");
    }

    #[test]
    fn test_build_request_rejects_unusable_canvas() {
        let dir = tempfile::tempdir().unwrap();
        let options = RenderOptions {
            format: "mp4".to_string(),
            width: None,
            height: None,
            fps: 30.0,
            duration: None,
            no_audio: true,
            quality: None,
        };
        for canvas in [
            r#"{"width":-1920,"height":1080}"#,
            r#"{"width":1920,"height":1e12}"#,
            r#"{"width":0.2,"height":1080}"#,
        ] {
            let manifest = dir.path().join("bad.json");
            std::fs::write(
                &manifest,
                format!(r#"{{"canvas":{canvas},"duration_secs":1.0,"elements":[]}}"#),
            )
            .unwrap();
            let result = build_request(&manifest, dir.path().to_path_buf(), "bad".into(), &options);
            assert!(result.is_err(), "{canvas}");
        }
    }

    #[test]
    fn test_canvas_pixels_rounds() {
        assert_eq!(canvas_pixels(1079.6, "height").unwrap(), 1080);
        assert!(canvas_pixels(f64::from(u32::MAX) + 1.0, "width").is_err());
        assert!(canvas_pixels(0.4, "width").is_err());
    }
}
