//! Render manifests: the renderer's input boundary.
//!
//! A manifest bundles everything one export needs from the document layer:
//! canvas geometry, the base element list, animation tracks, and audio
//! layers. It is a render request, not a project save format.

use std::collections::HashSet;
use std::path::Path;

use framecast_common::error::{FramecastError, FramecastResult};
use serde::{Deserialize, Serialize};

use crate::audio::AudioLayer;
use crate::color::Color;
use crate::element::{Element, ElementKind};
use crate::track::{Property, TrackRegistry};

/// Size of the design canvas the scene was authored on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CanvasSize {
    pub width: f64,
    pub height: f64,
}

/// A complete, self-contained render request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderManifest {
    pub canvas: CanvasSize,

    #[serde(default)]
    pub background: Color,

    /// Scene length in seconds.
    pub duration_secs: f64,

    /// Elements in z-order (later elements paint over earlier ones).
    pub elements: Vec<Element>,

    #[serde(default)]
    pub tracks: TrackRegistry,

    #[serde(default)]
    pub audio_layers: Vec<AudioLayer>,
}

/// A non-fatal problem found while validating a manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestIssue {
    pub key: String,
    pub message: String,
}

impl RenderManifest {
    /// Load a manifest from a JSON file.
    pub fn load(path: &Path) -> FramecastResult<Self> {
        if !path.exists() {
            return Err(FramecastError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        let manifest: RenderManifest = serde_json::from_str(&content)?;
        tracing::debug!(
            path = %path.display(),
            elements = manifest.elements.len(),
            tracks = manifest.tracks.len(),
            audio_layers = manifest.audio_layers.len(),
            "Loaded render manifest"
        );
        Ok(manifest)
    }

    /// Check structural requirements that would make rendering meaningless.
    pub fn validate(&self) -> FramecastResult<()> {
        if !(self.canvas.width.is_finite() && self.canvas.width > 0.0)
            || !(self.canvas.height.is_finite() && self.canvas.height > 0.0)
        {
            return Err(FramecastError::invalid_config(format!(
                "canvas size must be positive, got {}x{}",
                self.canvas.width, self.canvas.height
            )));
        }
        if !self.duration_secs.is_finite() || self.duration_secs <= 0.0 {
            return Err(FramecastError::invalid_config(format!(
                "scene duration must be positive, got {}s",
                self.duration_secs
            )));
        }
        let mut seen = HashSet::new();
        for element in &self.elements {
            if !seen.insert(element.id.as_str()) {
                return Err(FramecastError::invalid_config(format!(
                    "duplicate element id `{}`",
                    element.id
                )));
            }
        }
        for (key, track) in self.tracks.iter() {
            if !track.has_finite_times() {
                return Err(FramecastError::invalid_config(format!(
                    "track `{key}` has a non-finite keyframe time"
                )));
            }
        }
        Ok(())
    }

    /// Problems that do not block rendering but silently change nothing:
    /// tracks for unknown elements or properties, and tracks whose value
    /// kind does not fit their property.
    pub fn issues(&self) -> Vec<ManifestIssue> {
        let mut issues = Vec::new();
        for (key, track) in self.tracks.iter() {
            let target = self.elements.iter().find_map(|element| {
                Property::ALL.iter().copied().find_map(|property| {
                    let expected = format!("{}_{}", element.id, property.as_str());
                    (expected == key).then_some((element, property))
                })
            });
            let Some((element, property)) = target else {
                issues.push(ManifestIssue {
                    key: key.to_string(),
                    message: "does not match any element property".to_string(),
                });
                continue;
            };
            if !property.accepts(track.kind()) {
                issues.push(ManifestIssue {
                    key: key.to_string(),
                    message: format!("{} track cannot drive `{property}`", track.kind()),
                });
            }
            let text_only = matches!(property, Property::Text | Property::FontSize);
            if text_only && !matches!(element.kind, ElementKind::Text { .. }) {
                issues.push(ManifestIssue {
                    key: key.to_string(),
                    message: format!("`{property}` only applies to text elements"),
                });
            }
            if track.is_empty() {
                issues.push(ManifestIssue {
                    key: key.to_string(),
                    message: "has no keyframes".to_string(),
                });
            }
        }
        issues
    }
}
