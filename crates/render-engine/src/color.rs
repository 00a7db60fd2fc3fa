//! The one place scene colors become pixel colors.
//!
//! Backgrounds, shapes, text, and placeholders all convert through
//! [`to_skia`], so a given [`Color`] quantizes to the same 8-bit sRGB value
//! no matter which primitive draws it.

use framecast_scene_model::color::Color;

/// Convert a straight-alpha sRGB color to a drawing color, with `opacity`
/// folded into alpha.
pub fn to_skia(color: Color, opacity: f64) -> tiny_skia::Color {
    let [r, g, b, a] = color.with_alpha_factor(opacity as f32).to_rgba8();
    tiny_skia::Color::from_rgba8(r, g, b, a)
}

/// Flatten `color` over opaque black. Encoded frames carry no alpha.
pub fn opaque_over_black(color: Color) -> Color {
    let a = if color.a.is_finite() {
        color.a.clamp(0.0, 1.0)
    } else {
        0.0
    };
    Color::rgb(color.r * a, color.g * a, color.b * a)
}

/// Premultiply straight RGBA8 pixels in place.
pub fn premultiply_rgba_in_place(bytes: &mut [u8]) {
    for pixel in bytes.chunks_exact_mut(4) {
        let alpha = pixel[3] as u16;
        pixel[0] = ((pixel[0] as u16 * alpha + 127) / 255) as u8;
        pixel[1] = ((pixel[1] as u16 * alpha + 127) / 255) as u8;
        pixel[2] = ((pixel[2] as u16 * alpha + 127) / 255) as u8;
    }
}

/// Undo [`premultiply_rgba_in_place`].
pub fn unpremultiply_rgba_in_place(bytes: &mut [u8]) {
    for pixel in bytes.chunks_exact_mut(4) {
        let alpha = pixel[3] as u16;
        if alpha == 0 {
            pixel[0] = 0;
            pixel[1] = 0;
            pixel[2] = 0;
            continue;
        }
        for channel in &mut pixel[..3] {
            *channel = ((*channel as u16 * 255 + alpha / 2) / alpha).min(255) as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_skia_folds_opacity_into_alpha() {
        let c = to_skia(Color::rgb(1.0, 0.0, 0.0), 0.5);
        let u8c = c.to_color_u8();
        assert_eq!((u8c.red(), u8c.green(), u8c.blue()), (255, 0, 0));
        assert_eq!(u8c.alpha(), 128);
    }

    #[test]
    fn test_same_color_quantizes_identically() {
        let color = Color::from_hex("#3a7bd5").unwrap();
        assert_eq!(
            to_skia(color, 1.0).to_color_u8(),
            to_skia(color, 1.0).to_color_u8()
        );
        assert_eq!(to_skia(color, 1.0).to_color_u8().red(), 0x3a);
    }

    #[test]
    fn test_opaque_over_black() {
        let flat = opaque_over_black(Color::new(1.0, 1.0, 1.0, 0.25));
        assert_eq!(flat.a, 1.0);
        assert!((flat.r - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_premultiply_roundtrip_for_opaque_pixels() {
        let mut px = vec![10, 20, 30, 255, 0, 0, 0, 0];
        premultiply_rgba_in_place(&mut px);
        assert_eq!(&px[..4], &[10, 20, 30, 255]);
        unpremultiply_rgba_in_place(&mut px);
        assert_eq!(px, vec![10, 20, 30, 255, 0, 0, 0, 0]);
    }
}
