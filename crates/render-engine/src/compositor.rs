//! Frame compositor: draws a scene snapshot into an output-sized frame.
//!
//! The canvas is scaled uniformly into the target and centered, so content
//! is letterboxed or pillarboxed rather than distorted. Elements paint in
//! list order. A single element failing to draw degrades to a placeholder
//! fill; it never fails the frame.

use std::sync::Arc;

use framecast_common::error::FramecastResult;
use framecast_processing_core::snapshot::SceneSnapshot;
use framecast_scene_model::color::Color;
use framecast_scene_model::element::{Element, ElementKind};
use framecast_scene_model::geometry::Point;
use tiny_skia::{
    FillRule, FilterQuality, Paint, PathBuilder, Pixmap, PixmapPaint, Rect, Transform,
};

use crate::assets::{AssetCache, VideoFrameSource};
use crate::color::{opaque_over_black, to_skia};
use crate::raster::PixelBuffer;
use crate::text::TextRasterizer;

/// Uniform canvas-to-target mapping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

impl Letterbox {
    /// Fit a `canvas_width`×`canvas_height` canvas into the target.
    pub fn fit(target_width: u32, target_height: u32, canvas_width: f64, canvas_height: f64) -> Self {
        let (tw, th) = (target_width as f64, target_height as f64);
        if !(canvas_width > 0.0 && canvas_height > 0.0) {
            return Self {
                scale: 1.0,
                offset_x: 0.0,
                offset_y: 0.0,
            };
        }
        let scale = (tw / canvas_width).min(th / canvas_height);
        Self {
            scale,
            offset_x: (tw - canvas_width * scale) / 2.0,
            offset_y: (th - canvas_height * scale) / 2.0,
        }
    }

    /// Target-space position of a canvas point.
    pub fn map(&self, point: Point) -> Point {
        Point::new(
            self.offset_x + point.x * self.scale,
            self.offset_y + point.y * self.scale,
        )
    }

    fn transform(&self) -> Transform {
        Transform::from_row(
            self.scale as f32,
            0.0,
            0.0,
            self.scale as f32,
            self.offset_x as f32,
            self.offset_y as f32,
        )
    }
}

enum Fonts {
    Unloaded,
    Loaded(TextRasterizer),
    Missing,
}

/// Renders snapshots to pixel buffers. Holds per-export caches, so one
/// compositor serves one export.
pub struct FrameCompositor {
    assets: AssetCache,
    fonts: Fonts,
    placeholder: Color,
    warnings: Vec<String>,
}

impl FrameCompositor {
    pub fn new(video: Arc<dyn VideoFrameSource>, placeholder: Color) -> Self {
        Self {
            assets: AssetCache::new(video),
            fonts: Fonts::Unloaded,
            placeholder,
            warnings: Vec::new(),
        }
    }

    /// Use `text` instead of discovering a system font on first use.
    pub fn with_text_rasterizer(mut self, text: TextRasterizer) -> Self {
        self.fonts = Fonts::Loaded(text);
        self
    }

    /// Element-level problems recorded since the last call.
    pub fn take_warnings(&mut self) -> Vec<String> {
        let mut warnings = std::mem::take(&mut self.warnings);
        warnings.extend(self.assets.take_failures());
        warnings
    }

    /// Draw `snapshot` into a new `target_width`×`target_height` frame.
    ///
    /// The result is opaque: a translucent background is composited over
    /// black, and the letterbox bars are black.
    pub fn render(
        &mut self,
        snapshot: &SceneSnapshot,
        target_width: u32,
        target_height: u32,
        canvas_width: f64,
        canvas_height: f64,
        background: Color,
    ) -> FramecastResult<PixelBuffer> {
        let mut frame = PixelBuffer::new(target_width, target_height)?;
        let fit = Letterbox::fit(target_width, target_height, canvas_width, canvas_height);
        let base = fit.transform();

        let pixmap = frame.pixmap_mut();
        pixmap.fill(tiny_skia::Color::BLACK);
        if let Some(canvas) = Rect::from_xywh(0.0, 0.0, canvas_width as f32, canvas_height as f32) {
            let mut paint = Paint::default();
            paint.set_color(to_skia(opaque_over_black(background), 1.0));
            pixmap.fill_rect(canvas, &paint, base, None);
        }

        for element in &snapshot.elements {
            self.draw_element(pixmap, element, &fit, base);
        }
        if let Some(err) = self.assets.take_fatal() {
            return Err(err);
        }

        Ok(frame)
    }

    fn draw_element(&mut self, pixmap: &mut Pixmap, element: &Element, fit: &Letterbox, base: Transform) {
        let opacity = element.opacity.clamp(0.0, 1.0);
        let (w, h) = (element.size.width, element.size.height);
        if opacity <= 0.0 || !(w > 0.0 && h > 0.0) || !w.is_finite() || !h.is_finite() {
            return;
        }
        if !element.position.x.is_finite() || !element.position.y.is_finite() {
            return;
        }

        // Element-local space: origin at the element's center, rotated.
        let local = base
            .pre_translate(element.position.x as f32, element.position.y as f32)
            .pre_rotate(element.rotation_deg as f32);

        match &element.kind {
            ElementKind::Rectangle | ElementKind::Ellipse => {
                if !fill_shape(pixmap, element, opacity, local) {
                    self.placeholder(pixmap, element, opacity, local);
                }
            }
            ElementKind::Image { asset } => match self.assets.image(asset) {
                Some(image) => draw_image(pixmap, &image, w, h, opacity, local),
                None => self.placeholder(pixmap, element, opacity, local),
            },
            ElementKind::Video {
                asset,
                start_time_secs,
            } => match self.assets.video_frame(asset, start_time_secs.max(0.0)) {
                Some(frame) => draw_image(pixmap, &frame, w, h, opacity, local),
                None => self.placeholder(pixmap, element, opacity, local),
            },
            ElementKind::Text {
                text,
                font_size,
                alignment,
            } => {
                let Some(fonts) = self.fonts() else {
                    self.placeholder(pixmap, element, opacity, local);
                    return;
                };
                // Rasterize at output resolution so glyphs stay sharp.
                let center = fit.map(element.position);
                let (sw, sh) = ((w * fit.scale) as f32, (h * fit.scale) as f32);
                let Some(glyphs) = fonts.rasterize(
                    text,
                    (*font_size * fit.scale) as f32,
                    sw,
                    sh,
                    *alignment,
                    element.color,
                ) else {
                    return;
                };
                let placed = Transform::from_translate(center.x as f32, center.y as f32)
                    .pre_rotate(element.rotation_deg as f32)
                    .pre_translate(-sw / 2.0, -sh / 2.0);
                pixmap.draw_pixmap(
                    0,
                    0,
                    glyphs.as_ref(),
                    &PixmapPaint {
                        opacity: opacity as f32,
                        quality: FilterQuality::Bilinear,
                        ..PixmapPaint::default()
                    },
                    placed,
                    None,
                );
            }
        }
    }

    fn fonts(&mut self) -> Option<&TextRasterizer> {
        if matches!(self.fonts, Fonts::Unloaded) {
            self.fonts = match TextRasterizer::from_system_fonts() {
                Ok(text) => Fonts::Loaded(text),
                Err(err) => {
                    tracing::warn!(error = %err, "No usable font, text elements render as placeholders");
                    self.warnings.push(err.to_string());
                    Fonts::Missing
                }
            };
        }
        match &self.fonts {
            Fonts::Loaded(text) => Some(text),
            _ => None,
        }
    }

    fn placeholder(&self, pixmap: &mut Pixmap, element: &Element, opacity: f64, local: Transform) {
        let (w, h) = (element.size.width as f32, element.size.height as f32);
        if let Some(rect) = Rect::from_xywh(-w / 2.0, -h / 2.0, w, h) {
            let mut paint = Paint::default();
            paint.set_color(to_skia(self.placeholder, opacity));
            pixmap.fill_rect(rect, &paint, local, None);
        }
    }
}

/// Fill a rectangle, ellipse, or custom outline. Returns false if the
/// geometry is degenerate.
fn fill_shape(pixmap: &mut Pixmap, element: &Element, opacity: f64, local: Transform) -> bool {
    let (w, h) = (element.size.width as f32, element.size.height as f32);
    let Some(rect) = Rect::from_xywh(-w / 2.0, -h / 2.0, w, h) else {
        return false;
    };

    let path = match (&element.outline, &element.kind) {
        (Some(outline), _) => outline_path(outline, w, h),
        (None, ElementKind::Ellipse) => PathBuilder::from_oval(rect),
        _ => Some(PathBuilder::from_rect(rect)),
    };
    let Some(path) = path else {
        return false;
    };

    let mut paint = Paint::default();
    paint.set_color(to_skia(element.color, opacity));
    paint.anti_alias = true;
    pixmap.fill_path(&path, &paint, FillRule::Winding, local, None);
    true
}

/// Closed polygon from unit-box points, centered on the origin.
fn outline_path(points: &[Point], w: f32, h: f32) -> Option<tiny_skia::Path> {
    let mut pb = PathBuilder::new();
    let mut points = points
        .iter()
        .map(|p| (p.x as f32 * w - w / 2.0, p.y as f32 * h - h / 2.0));
    let (x, y) = points.next()?;
    pb.move_to(x, y);
    for (x, y) in points {
        pb.line_to(x, y);
    }
    pb.close();
    pb.finish()
}

fn draw_image(pixmap: &mut Pixmap, image: &Pixmap, w: f64, h: f64, opacity: f64, local: Transform) {
    let sx = (w / image.width() as f64) as f32;
    let sy = (h / image.height() as f64) as f32;
    let placed = local
        .pre_translate(-(w / 2.0) as f32, -(h / 2.0) as f32)
        .pre_scale(sx, sy);
    pixmap.draw_pixmap(
        0,
        0,
        image.as_ref(),
        &PixmapPaint {
            opacity: opacity as f32,
            quality: FilterQuality::Bilinear,
            ..PixmapPaint::default()
        },
        placed,
        None,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use framecast_common::error::FramecastError;
    use framecast_scene_model::geometry::Size;
    use std::path::Path;

    struct NoVideo;

    impl VideoFrameSource for NoVideo {
        fn extract_frame(&self, asset: &Path, _t: f64) -> FramecastResult<image::RgbaImage> {
            Err(FramecastError::asset_decode(asset, "video disabled in tests"))
        }
    }

    fn compositor() -> FrameCompositor {
        FrameCompositor::new(Arc::new(NoVideo), Color::NEUTRAL_GRAY)
    }

    fn snapshot(elements: Vec<Element>) -> SceneSnapshot {
        SceneSnapshot {
            time_secs: 0.0,
            elements,
        }
    }

    fn rgb(frame: &PixelBuffer, x: u32, y: u32) -> [u8; 3] {
        let [r, g, b, _] = frame.pixel(x, y).unwrap();
        [r, g, b]
    }

    #[test]
    fn test_letterbox_pillarboxes_square_canvas() {
        let fit = Letterbox::fit(1920, 1080, 1000.0, 1000.0);
        assert!((fit.scale - 1.08).abs() < 1e-9);
        assert!((fit.offset_x - 420.0).abs() < 1e-9);
        assert!(fit.offset_y.abs() < 1e-9);
    }

    #[test]
    fn test_letterbox_identity_for_matching_size() {
        let fit = Letterbox::fit(640, 360, 640.0, 360.0);
        assert_eq!(
            fit,
            Letterbox {
                scale: 1.0,
                offset_x: 0.0,
                offset_y: 0.0
            }
        );
    }

    #[test]
    fn test_background_and_bars() {
        let mut c = compositor();
        let frame = c
            .render(&snapshot(vec![]), 200, 100, 100.0, 100.0, Color::WHITE)
            .unwrap();
        assert_eq!(rgb(&frame, 100, 50), [255, 255, 255]);
        // Pillarbox bars.
        assert_eq!(rgb(&frame, 10, 50), [0, 0, 0]);
        assert_eq!(rgb(&frame, 190, 50), [0, 0, 0]);
    }

    #[test]
    fn test_translucent_background_is_flattened() {
        let mut c = compositor();
        let frame = c
            .render(
                &snapshot(vec![]),
                10,
                10,
                10.0,
                10.0,
                Color::new(1.0, 1.0, 1.0, 0.0),
            )
            .unwrap();
        assert_eq!(frame.pixel(5, 5), Some([0, 0, 0, 255]));
    }

    #[test]
    fn test_later_elements_paint_over_earlier() {
        let red = Element::rectangle(
            "a",
            Point::new(50.0, 50.0),
            Size::new(40.0, 40.0),
            Color::rgb(1.0, 0.0, 0.0),
        );
        let blue = Element::rectangle(
            "b",
            Point::new(50.0, 50.0),
            Size::new(20.0, 20.0),
            Color::rgb(0.0, 0.0, 1.0),
        );
        let mut c = compositor();
        let frame = c
            .render(&snapshot(vec![red, blue]), 100, 100, 100.0, 100.0, Color::BLACK)
            .unwrap();
        assert_eq!(rgb(&frame, 50, 50), [0, 0, 255]);
        assert_eq!(rgb(&frame, 35, 50), [255, 0, 0]);
    }

    #[test]
    fn test_rotation_about_center() {
        let mut bar = Element::rectangle(
            "bar",
            Point::new(50.0, 50.0),
            Size::new(80.0, 10.0),
            Color::WHITE,
        );
        bar.rotation_deg = 90.0;
        let mut c = compositor();
        let frame = c
            .render(&snapshot(vec![bar]), 100, 100, 100.0, 100.0, Color::BLACK)
            .unwrap();
        assert_eq!(rgb(&frame, 50, 15), [255, 255, 255]);
        assert_eq!(rgb(&frame, 15, 50), [0, 0, 0]);
    }

    #[test]
    fn test_opacity_blends() {
        let mut half = Element::rectangle(
            "half",
            Point::new(5.0, 5.0),
            Size::new(10.0, 10.0),
            Color::WHITE,
        );
        half.opacity = 0.5;
        let mut c = compositor();
        let frame = c
            .render(&snapshot(vec![half]), 10, 10, 10.0, 10.0, Color::BLACK)
            .unwrap();
        let [r, _, _] = rgb(&frame, 5, 5);
        assert!((126..=129).contains(&r), "got {r}");
    }

    #[test]
    fn test_ellipse_leaves_corners_empty() {
        let ellipse = Element::ellipse(
            "e",
            Point::new(50.0, 50.0),
            Size::new(100.0, 100.0),
            Color::WHITE,
        );
        let mut c = compositor();
        let frame = c
            .render(&snapshot(vec![ellipse]), 100, 100, 100.0, 100.0, Color::BLACK)
            .unwrap();
        assert_eq!(rgb(&frame, 50, 50), [255, 255, 255]);
        assert_eq!(rgb(&frame, 2, 2), [0, 0, 0]);
    }

    #[test]
    fn test_outline_replaces_rectangle_geometry() {
        let mut tri = Element::rectangle(
            "tri",
            Point::new(50.0, 50.0),
            Size::new(100.0, 100.0),
            Color::WHITE,
        );
        tri.outline = Some(vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(0.0, 1.0),
        ]);
        let mut c = compositor();
        let frame = c
            .render(&snapshot(vec![tri]), 100, 100, 100.0, 100.0, Color::BLACK)
            .unwrap();
        assert_eq!(rgb(&frame, 10, 10), [255, 255, 255]);
        assert_eq!(rgb(&frame, 90, 90), [0, 0, 0]);
    }

    #[test]
    fn test_broken_image_draws_placeholder() {
        let image = Element::with_kind(
            "img",
            Point::new(50.0, 50.0),
            Size::new(20.0, 20.0),
            Color::WHITE,
            ElementKind::Image {
                asset: "/missing/image.png".into(),
            },
        );
        let mut c = compositor();
        let frame = c
            .render(&snapshot(vec![image]), 100, 100, 100.0, 100.0, Color::BLACK)
            .unwrap();
        assert_eq!(rgb(&frame, 50, 50), [128, 128, 128]);
        assert_eq!(c.take_warnings().len(), 1);
    }

    #[test]
    fn test_broken_video_draws_placeholder() {
        let video = Element::with_kind(
            "vid",
            Point::new(50.0, 50.0),
            Size::new(20.0, 20.0),
            Color::WHITE,
            ElementKind::Video {
                asset: "clip.mov".into(),
                start_time_secs: -2.0,
            },
        );
        let mut c = compositor();
        let frame = c
            .render(&snapshot(vec![video]), 100, 100, 100.0, 100.0, Color::BLACK)
            .unwrap();
        assert_eq!(rgb(&frame, 50, 50), [128, 128, 128]);
    }

    struct FailingVideo;

    impl VideoFrameSource for FailingVideo {
        fn extract_frame(&self, _asset: &Path, _t: f64) -> FramecastResult<image::RgbaImage> {
            Err(std::io::Error::other("device removed").into())
        }
    }

    #[test]
    fn test_fatal_asset_error_fails_render() {
        let video = Element::with_kind(
            "vid",
            Point::new(50.0, 50.0),
            Size::new(20.0, 20.0),
            Color::WHITE,
            ElementKind::Video {
                asset: "clip.mov".into(),
                start_time_secs: 0.0,
            },
        );
        let mut c = FrameCompositor::new(Arc::new(FailingVideo), Color::NEUTRAL_GRAY);
        let err = c
            .render(&snapshot(vec![video]), 100, 100, 100.0, 100.0, Color::BLACK)
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(c.take_warnings().is_empty());
    }

    #[test]
    fn test_image_is_scaled_into_element_rect() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("green.png");
        image::RgbaImage::from_pixel(2, 2, image::Rgba([0, 255, 0, 255]))
            .save(&path)
            .unwrap();
        let element = Element::with_kind(
            "img",
            Point::new(50.0, 50.0),
            Size::new(40.0, 40.0),
            Color::WHITE,
            ElementKind::Image { asset: path },
        );
        let mut c = compositor();
        let frame = c
            .render(&snapshot(vec![element]), 100, 100, 100.0, 100.0, Color::BLACK)
            .unwrap();
        assert_eq!(rgb(&frame, 40, 60), [0, 255, 0]);
        assert_eq!(rgb(&frame, 80, 50), [0, 0, 0]);
        assert!(c.take_warnings().is_empty());
    }
}
