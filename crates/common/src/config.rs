//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Global application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Default render and encode settings.
    #[serde(default)]
    pub render: RenderDefaults,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Render pipeline tuning shared by every export job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderDefaults {
    /// ffmpeg binary used for encoding, muxing, and video frame extraction.
    pub ffmpeg_path: String,

    /// ffprobe binary used to inspect audio sources.
    pub ffprobe_path: String,

    /// Capacity of the bounded channel between the frame producer and the
    /// encoder consumer.
    pub frame_queue_capacity: usize,

    /// Frames a writer may hold before it stops reporting readiness.
    pub max_frames_in_flight: usize,

    /// Upper bound on progress updates emitted per job.
    pub progress_steps: u32,

    /// H.264 constant rate factor.
    pub h264_crf: u32,

    /// H.264 encoder preset.
    pub h264_preset: String,

    /// Sample rate of the mixed audio track.
    pub audio_sample_rate: u32,

    /// AAC bitrate in kbps.
    pub audio_bitrate_kbps: u32,

    /// Fill used when an element cannot be drawn (hex string).
    pub placeholder_color: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "framecast=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for RenderDefaults {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            frame_queue_capacity: 4,
            max_frames_in_flight: 3,
            progress_steps: 100,
            h264_crf: 18,
            h264_preset: "medium".to_string(),
            audio_sample_rate: 48000,
            audio_bitrate_kbps: 192,
            placeholder_color: "#808080".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("framecast").join("config.json")
}
