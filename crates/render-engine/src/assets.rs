//! Decoded media for image and video elements.
//!
//! Every asset is decoded at most once per export. Failed decodes are
//! remembered as well, so a broken file costs one attempt and one warning
//! rather than one per frame.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

use framecast_common::error::{FramecastError, FramecastResult};
use tiny_skia::{IntSize, Pixmap};

use crate::color::premultiply_rgba_in_place;

/// Extracts still frames from video files.
pub trait VideoFrameSource: Send + Sync {
    /// Decode the frame shown at `time_secs` into the video.
    fn extract_frame(&self, asset: &Path, time_secs: f64) -> FramecastResult<image::RgbaImage>;
}

/// Frame extraction through an `ffmpeg` subprocess.
#[derive(Debug, Clone)]
pub struct FfmpegFrameExtractor {
    ffmpeg_path: String,
}

impl FfmpegFrameExtractor {
    pub fn new(ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }
}

impl VideoFrameSource for FfmpegFrameExtractor {
    fn extract_frame(&self, asset: &Path, time_secs: f64) -> FramecastResult<image::RgbaImage> {
        if !asset.exists() {
            return Err(FramecastError::FileNotFound {
                path: asset.to_path_buf(),
            });
        }

        let output = Command::new(&self.ffmpeg_path)
            .args(["-v", "error", "-ss"])
            .arg(format!("{:.3}", time_secs.max(0.0)))
            .arg("-i")
            .arg(asset)
            .args(["-frames:v", "1", "-f", "image2pipe", "-vcodec", "png", "-"])
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                FramecastError::asset_decode(asset, format!("failed to start ffmpeg: {e}"))
            })?;

        if !output.status.success() || output.stdout.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FramecastError::asset_decode(
                asset,
                format!(
                    "ffmpeg could not extract a frame at {time_secs:.3}s (status {}): {}",
                    output.status,
                    stderr.trim()
                ),
            ));
        }

        image::load_from_memory_with_format(&output.stdout, image::ImageFormat::Png)
            .map(|img| img.to_rgba8())
            .map_err(|e| FramecastError::asset_decode(asset, e.to_string()))
    }
}

/// Per-export cache of decoded images and video frames.
pub struct AssetCache {
    images: HashMap<PathBuf, Option<Arc<Pixmap>>>,
    frames: HashMap<(PathBuf, u64), Option<Arc<Pixmap>>>,
    video: Arc<dyn VideoFrameSource>,
    failures: Vec<String>,
    fatal: Option<FramecastError>,
}

impl std::fmt::Debug for AssetCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetCache")
            .field("images", &self.images.len())
            .field("frames", &self.frames.len())
            .field("failures", &self.failures.len())
            .finish()
    }
}

impl AssetCache {
    pub fn new(video: Arc<dyn VideoFrameSource>) -> Self {
        Self {
            images: HashMap::new(),
            frames: HashMap::new(),
            video,
            failures: Vec::new(),
            fatal: None,
        }
    }

    /// Decoded image at `path`, or `None` if it cannot be decoded.
    pub fn image(&mut self, path: &Path) -> Option<Arc<Pixmap>> {
        if let Some(cached) = self.images.get(path) {
            return cached.clone();
        }
        let loaded = load_image(path).and_then(pixmap_from_rgba);
        let entry = self.remember(path, loaded);
        self.images.insert(path.to_path_buf(), entry.clone());
        entry
    }

    /// Video frame at `time_secs`, or `None` if it cannot be extracted.
    pub fn video_frame(&mut self, path: &Path, time_secs: f64) -> Option<Arc<Pixmap>> {
        let key = (path.to_path_buf(), (time_secs.max(0.0) * 1000.0).round() as u64);
        if let Some(cached) = self.frames.get(&key) {
            return cached.clone();
        }
        let loaded = self
            .video
            .extract_frame(path, time_secs)
            .and_then(pixmap_from_rgba);
        let entry = self.remember(path, loaded);
        self.frames.insert(key, entry.clone());
        entry
    }

    /// Failure messages recorded since the last call.
    pub fn take_failures(&mut self) -> Vec<String> {
        std::mem::take(&mut self.failures)
    }

    /// First failure that must abort the export rather than degrade to a
    /// placeholder.
    pub fn take_fatal(&mut self) -> Option<FramecastError> {
        self.fatal.take()
    }

    fn remember(&mut self, path: &Path, loaded: FramecastResult<Pixmap>) -> Option<Arc<Pixmap>> {
        match loaded {
            Ok(pixmap) => Some(Arc::new(pixmap)),
            Err(err) if err.is_fatal() => {
                tracing::error!(asset = %path.display(), error = %err, "Asset access failed");
                if self.fatal.is_none() {
                    self.fatal = Some(err);
                }
                None
            }
            Err(err) => {
                tracing::warn!(
                    asset = %path.display(),
                    error = %err,
                    "Asset unusable, drawing placeholder"
                );
                self.failures.push(err.to_string());
                None
            }
        }
    }
}

fn load_image(path: &Path) -> FramecastResult<image::RgbaImage> {
    if !path.exists() {
        return Err(FramecastError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let unreadable = |e: std::io::Error| FramecastError::asset_decode(path, e.to_string());
    let decoded = image::ImageReader::open(path)
        .map_err(unreadable)?
        .with_guessed_format()
        .map_err(unreadable)?
        .decode()
        .map_err(|e| FramecastError::asset_decode(path, e.to_string()))?;
    Ok(decoded.to_rgba8())
}

/// Premultiply a straight-alpha sRGB image into a drawable pixmap.
pub fn pixmap_from_rgba(image: image::RgbaImage) -> FramecastResult<Pixmap> {
    let (width, height) = image.dimensions();
    let size = IntSize::from_wh(width, height).ok_or_else(|| {
        FramecastError::asset_decode("<image>", format!("invalid image size {width}x{height}"))
    })?;
    let mut rgba = image.into_raw();
    premultiply_rgba_in_place(&mut rgba);
    Pixmap::from_vec(rgba, size).ok_or_else(|| {
        FramecastError::asset_decode("<image>", "pixel data does not match image size")
    })
}
