//! Text layout and glyph rasterization.
//!
//! Glyphs are laid out with `fontdue` in a top-left, Y-down box, the same
//! convention as the frame itself, so a rasterized text box can be placed
//! with the element's transform directly.

use fontdue::layout::{
    CoordinateSystem, HorizontalAlign, Layout, LayoutSettings, TextStyle, VerticalAlign,
};
use fontdue::{Font, FontSettings};
use framecast_common::error::{FramecastError, FramecastResult};
use framecast_scene_model::color::Color;
use framecast_scene_model::element::TextAlignment;
use tiny_skia::Pixmap;

use crate::color::to_skia;

/// Rasterizes single-font text boxes.
pub struct TextRasterizer {
    font: Font,
}

impl std::fmt::Debug for TextRasterizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextRasterizer")
            .field("font", &self.font.name())
            .finish()
    }
}

impl TextRasterizer {
    pub fn from_bytes(bytes: &[u8], collection_index: u32) -> FramecastResult<Self> {
        let settings = FontSettings {
            collection_index,
            ..FontSettings::default()
        };
        let font = Font::from_bytes(bytes, settings)
            .map_err(|e| FramecastError::asset_decode("<font>", e.to_string()))?;
        Ok(Self { font })
    }

    /// Load a sans-serif system font discovered through `fontdb`.
    pub fn from_system_fonts() -> FramecastResult<Self> {
        use fontdb::{Database, Family, Query, Source, Stretch, Style, Weight};

        let mut db = Database::new();
        db.load_system_fonts();

        let id = db
            .query(&Query {
                families: &[
                    Family::SansSerif,
                    Family::Name("DejaVu Sans"),
                    Family::Name("Helvetica"),
                    Family::Name("Arial"),
                ],
                weight: Weight::NORMAL,
                stretch: Stretch::Normal,
                style: Style::Normal,
            })
            .ok_or_else(|| {
                FramecastError::asset_decode("<system fonts>", "no sans-serif system font found")
            })?;
        let face = db.face(id).ok_or_else(|| {
            FramecastError::asset_decode("<system fonts>", "font database lost the queried face")
        })?;

        let bytes: Vec<u8> = match &face.source {
            Source::File(path) => std::fs::read(path)
                .map_err(|e| FramecastError::asset_decode(path, e.to_string()))?,
            Source::Binary(data) => data.as_ref().as_ref().to_vec(),
            Source::SharedFile(_, data) => data.as_ref().as_ref().to_vec(),
        };

        tracing::debug!(family = ?face.families.first(), "Loaded system font");
        Self::from_bytes(&bytes, face.index)
    }

    /// Rasterize `text` into a transparent `width`×`height` pixmap, aligned
    /// horizontally per `alignment` and centered vertically.
    ///
    /// Returns `None` when the box is empty.
    pub fn rasterize(
        &self,
        text: &str,
        font_size_px: f32,
        width: f32,
        height: f32,
        alignment: TextAlignment,
        color: Color,
    ) -> Option<Pixmap> {
        let mut pixmap = Pixmap::new(width.ceil() as u32, height.ceil() as u32)?;
        if text.is_empty() || font_size_px.is_nan() || font_size_px <= 0.0 {
            return Some(pixmap);
        }

        let mut layout = Layout::new(CoordinateSystem::PositiveYDown);
        layout.reset(&LayoutSettings {
            max_width: Some(width),
            max_height: Some(height),
            horizontal_align: match alignment {
                TextAlignment::Leading => HorizontalAlign::Left,
                TextAlignment::Center => HorizontalAlign::Center,
                TextAlignment::Trailing => HorizontalAlign::Right,
            },
            vertical_align: VerticalAlign::Middle,
            ..LayoutSettings::default()
        });
        layout.append(&[&self.font], &TextStyle::new(text, font_size_px, 0));

        let ink = to_skia(color, 1.0).premultiply().to_color_u8();
        let (pw, ph) = (pixmap.width() as i64, pixmap.height() as i64);
        let data = pixmap.data_mut();

        for glyph in layout.glyphs() {
            if glyph.width == 0 || glyph.height == 0 {
                continue;
            }
            let (metrics, coverage) = self.font.rasterize_config(glyph.key);
            let gx = glyph.x.round() as i64;
            let gy = glyph.y.round() as i64;
            for row in 0..metrics.height {
                let y = gy + row as i64;
                if y < 0 || y >= ph {
                    continue;
                }
                for col in 0..metrics.width {
                    let x = gx + col as i64;
                    if x < 0 || x >= pw {
                        continue;
                    }
                    let cov = coverage[row * metrics.width + col] as u16;
                    if cov == 0 {
                        continue;
                    }
                    let idx = ((y * pw + x) * 4) as usize;
                    let src = [
                        scale(ink.red(), cov),
                        scale(ink.green(), cov),
                        scale(ink.blue(), cov),
                        scale(ink.alpha(), cov),
                    ];
                    // Source-over, premultiplied.
                    let inv = 255 - src[3] as u16;
                    for (dst, s) in data[idx..idx + 4].iter_mut().zip(src) {
                        *dst = (s as u16 + scale(*dst, inv) as u16).min(255) as u8;
                    }
                }
            }
        }

        Some(pixmap)
    }
}

fn scale(value: u8, factor: u16) -> u8 {
    ((value as u16 * factor + 127) / 255) as u8
}
