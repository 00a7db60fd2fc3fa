//! Visual elements placed on the scene canvas.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::color::Color;
use crate::geometry::{Point, Size};

/// A positioned, styled visual item.
///
/// Elements are owned by the document layer; the renderer only ever sees
/// read-only copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    /// Stable identifier, also the prefix of this element's track keys.
    pub id: String,

    /// Center of the element in canvas pixels.
    pub position: Point,

    /// Bounding box size in canvas pixels.
    pub size: Size,

    /// Clockwise rotation about the center, in degrees.
    #[serde(default)]
    pub rotation_deg: f64,

    /// Opacity in `[0.0, 1.0]`.
    #[serde(default = "default_opacity")]
    pub opacity: f64,

    /// Fill color for shapes, text color for text.
    #[serde(default)]
    pub color: Color,

    /// Keep width:height fixed when only the width is animated.
    #[serde(default)]
    pub aspect_locked: bool,

    /// Custom outline for shapes: a closed polygon in unit-box coordinates
    /// (`0..1` on each axis of the bounding box). Replaces the rectangle or
    /// ellipse geometry when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outline: Option<Vec<Point>>,

    /// Variant-specific attributes.
    pub kind: ElementKind,
}

fn default_opacity() -> f64 {
    1.0
}

/// The closed set of element variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ElementKind {
    Rectangle,
    Ellipse,
    Text {
        text: String,
        font_size: f64,
        #[serde(default)]
        alignment: TextAlignment,
    },
    Image {
        asset: PathBuf,
    },
    Video {
        asset: PathBuf,
        /// Offset into the source video of the displayed frame.
        #[serde(default)]
        start_time_secs: f64,
    },
}

/// Horizontal text alignment within the element's bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextAlignment {
    #[default]
    Leading,
    Center,
    Trailing,
}

impl Element {
    /// A rectangle with default styling.
    pub fn rectangle(id: impl Into<String>, position: Point, size: Size, color: Color) -> Self {
        Self::with_kind(id, position, size, color, ElementKind::Rectangle)
    }

    /// An ellipse with default styling.
    pub fn ellipse(id: impl Into<String>, position: Point, size: Size, color: Color) -> Self {
        Self::with_kind(id, position, size, color, ElementKind::Ellipse)
    }

    pub fn with_kind(
        id: impl Into<String>,
        position: Point,
        size: Size,
        color: Color,
        kind: ElementKind,
    ) -> Self {
        Self {
            id: id.into(),
            position,
            size,
            rotation_deg: 0.0,
            opacity: 1.0,
            color,
            aspect_locked: false,
            outline: None,
            kind,
        }
    }

    /// Short name of the variant, for logs.
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            ElementKind::Rectangle => "rectangle",
            ElementKind::Ellipse => "ellipse",
            ElementKind::Text { .. } => "text",
            ElementKind::Image { .. } => "image",
            ElementKind::Video { .. } => "video",
        }
    }

    /// Referenced media file, for image and video elements.
    pub fn asset(&self) -> Option<&PathBuf> {
        match &self.kind {
            ElementKind::Image { asset } | ElementKind::Video { asset, .. } => Some(asset),
            _ => None,
        }
    }
}
