//! Check system capabilities.

use framecast_common::config::{config_file_path, AppConfig};
use framecast_render_engine::backend::{command_exists, probe_version};
use framecast_render_engine::text::TextRasterizer;

pub fn run(config: &AppConfig, init_config: bool) -> anyhow::Result<()> {
    println!("Framecast System Check");
    println!("{}", "=".repeat(50));

    let mut video_ok = true;
    for (label, binary) in [
        ("ffmpeg", &config.render.ffmpeg_path),
        ("ffprobe", &config.render.ffprobe_path),
    ] {
        if command_exists(binary) {
            let version = probe_version(binary).unwrap_or_else(|| "unknown version".to_string());
            println!("[OK]   {label}: {version}");
        } else {
            video_ok = false;
            println!("[FAIL] {label}: `{binary}` not found");
        }
    }

    match TextRasterizer::from_system_fonts() {
        Ok(_) => println!("[OK]   System font for text elements"),
        Err(e) => println!("[WARN] No usable system font, text renders as placeholders: {e}"),
    }

    let path = config_file_path();
    if path.exists() {
        println!("[OK]   Config: {}", path.display());
    } else if init_config {
        config.save()?;
        println!("[OK]   Config written: {}", path.display());
    } else {
        println!("[INFO] No config at {}, using defaults", path.display());
    }

    println!();
    if video_ok {
        println!("Video export is available. GIF and image sequences need no external tools.");
    } else {
        println!("Video export needs ffmpeg and ffprobe. GIF and image sequences still work.");
    }

    Ok(())
}
