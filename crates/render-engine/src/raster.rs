//! Rendered frame storage.

use framecast_common::error::{FramecastError, FramecastResult};
use tiny_skia::Pixmap;

use crate::color::unpremultiply_rgba_in_place;

/// One rendered output frame.
///
/// Premultiplied RGBA8, row-major, origin at the top-left with Y growing
/// downward. Frames produced by the compositor are fully opaque, so the
/// premultiplied bytes equal straight RGBA.
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    pixmap: Pixmap,
}

impl PixelBuffer {
    /// Allocate a transparent buffer.
    pub fn new(width: u32, height: u32) -> FramecastResult<Self> {
        let pixmap = Pixmap::new(width, height).ok_or_else(|| {
            FramecastError::invalid_config(format!(
                "cannot allocate a {width}x{height} frame buffer"
            ))
        })?;
        Ok(Self { pixmap })
    }

    pub fn from_pixmap(pixmap: Pixmap) -> Self {
        Self { pixmap }
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    /// Premultiplied RGBA of one pixel, `None` outside the buffer.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        let p = self.pixmap.pixel(x, y)?;
        Some([p.red(), p.green(), p.blue(), p.alpha()])
    }

    /// Raw premultiplied RGBA bytes.
    pub fn as_rgba(&self) -> &[u8] {
        self.pixmap.data()
    }

    /// Consume the buffer, keeping its premultiplied RGBA bytes.
    pub fn into_rgba(self) -> Vec<u8> {
        self.pixmap.take()
    }

    /// Straight-alpha copy for image encoders.
    pub fn to_rgba_image(&self) -> image::RgbaImage {
        let mut data = self.pixmap.data().to_vec();
        unpremultiply_rgba_in_place(&mut data);
        image::RgbaImage::from_raw(self.width(), self.height(), data)
            .unwrap_or_else(|| image::RgbaImage::new(self.width(), self.height()))
    }

    pub(crate) fn pixmap_mut(&mut self) -> &mut Pixmap {
        &mut self.pixmap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_size_is_rejected() {
        assert!(PixelBuffer::new(0, 10).is_err());
    }

    #[test]
    fn test_pixel_lookup() {
        let mut buffer = PixelBuffer::new(4, 2).unwrap();
        buffer
            .pixmap_mut()
            .fill(tiny_skia::Color::from_rgba8(10, 20, 30, 255));
        assert_eq!(buffer.pixel(3, 1), Some([10, 20, 30, 255]));
        assert_eq!(buffer.pixel(4, 0), None);
        assert_eq!(buffer.as_rgba().len(), 4 * 2 * 4);
        assert_eq!(buffer.to_rgba_image().get_pixel(0, 0).0, [10, 20, 30, 255]);
    }
}
