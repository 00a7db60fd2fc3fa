//! sRGB colors.
//!
//! Every color in the scene model is non-linear sRGB with straight
//! (non-premultiplied) alpha. Conversion to pixel formats happens in exactly
//! one place in the renderer so previews and exports agree.

use std::str::FromStr;

use palette::Srgb;
use serde::{Deserialize, Serialize};

/// An sRGB color with straight alpha, each channel in `[0.0, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ColorRepr", into = "ColorRepr")]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

/// Failure to parse a hex color string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid color `{input}`: {reason}")]
pub struct ColorParseError {
    pub input: String,
    pub reason: String,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0.0, 0.0, 0.0);
    pub const WHITE: Color = Color::rgb(1.0, 1.0, 1.0);
    pub const TRANSPARENT: Color = Color::new(0.0, 0.0, 0.0, 0.0);
    pub const NEUTRAL_GRAY: Color = Color::rgb(0.5, 0.5, 0.5);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self::new(r, g, b, 1.0)
    }

    /// Build from 8-bit sRGB channels.
    pub fn from_rgba8(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self::new(
            r as f32 / 255.0,
            g as f32 / 255.0,
            b as f32 / 255.0,
            a as f32 / 255.0,
        )
    }

    /// Parse `#rgb`, `#rrggbb`, or `#rrggbbaa` (the `#` is optional).
    pub fn from_hex(input: &str) -> Result<Self, ColorParseError> {
        let err = |reason: &str| ColorParseError {
            input: input.to_string(),
            reason: reason.to_string(),
        };
        let hex = input.trim().trim_start_matches('#');
        if !hex.is_ascii() {
            return Err(err("expected hex digits"));
        }
        let (rgb_part, alpha) = match hex.len() {
            3 | 6 => (hex, 255u8),
            8 => {
                let alpha = u8::from_str_radix(&hex[6..], 16)
                    .map_err(|_| err("alpha channel is not hexadecimal"))?;
                (&hex[..6], alpha)
            }
            _ => return Err(err("expected 3, 6, or 8 hex digits")),
        };
        let rgb: Srgb<u8> = Srgb::<u8>::from_str(rgb_part).map_err(|e| err(&e.to_string()))?;
        Ok(Self::from_rgba8(rgb.red, rgb.green, rgb.blue, alpha))
    }

    /// Format as `#rrggbbaa`.
    pub fn to_hex(&self) -> String {
        let [r, g, b, a] = self.to_rgba8();
        format!("#{r:02x}{g:02x}{b:02x}{a:02x}")
    }

    /// Quantize to 8-bit sRGB channels, clamping out-of-range values.
    pub fn to_rgba8(&self) -> [u8; 4] {
        let rgb: Srgb<u8> = Srgb::new(
            self.r.clamp(0.0, 1.0),
            self.g.clamp(0.0, 1.0),
            self.b.clamp(0.0, 1.0),
        )
        .into_format();
        let a = (self.a.clamp(0.0, 1.0) * 255.0).round() as u8;
        [rgb.red, rgb.green, rgb.blue, a]
    }

    /// Same color with the alpha channel multiplied by `factor`.
    pub fn with_alpha_factor(&self, factor: f32) -> Self {
        Self {
            a: (self.a * factor).clamp(0.0, 1.0),
            ..*self
        }
    }

    /// Whether every channel is a finite number.
    pub fn is_finite(&self) -> bool {
        self.r.is_finite() && self.g.is_finite() && self.b.is_finite() && self.a.is_finite()
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::BLACK
    }
}

impl FromStr for Color {
    type Err = ColorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Color::from_hex(s)
    }
}

/// Serialized forms accepted for colors: a hex string or explicit channels.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ColorRepr {
    Hex(String),
    Channels {
        r: f32,
        g: f32,
        b: f32,
        #[serde(default = "opaque")]
        a: f32,
    },
}

fn opaque() -> f32 {
    1.0
}

impl TryFrom<ColorRepr> for Color {
    type Error = ColorParseError;

    fn try_from(repr: ColorRepr) -> Result<Self, Self::Error> {
        match repr {
            ColorRepr::Hex(hex) => Color::from_hex(&hex),
            ColorRepr::Channels { r, g, b, a } => Ok(Color::new(r, g, b, a)),
        }
    }
}

impl From<Color> for ColorRepr {
    fn from(c: Color) -> Self {
        ColorRepr::Channels {
            r: c.r,
            g: c.g,
            b: c.b,
            a: c.a,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_forms() {
        assert_eq!(Color::from_hex("#ff0000").unwrap(), Color::rgb(1.0, 0.0, 0.0));
        assert_eq!(Color::from_hex("00f").unwrap(), Color::rgb(0.0, 0.0, 1.0));
        let translucent = Color::from_hex("#ffffff80").unwrap();
        assert!((translucent.a - 128.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Color::from_hex("#12345").is_err());
        assert!(Color::from_hex("#gggggg").is_err());
    }

    #[test]
    fn test_parse_rejects_non_ascii() {
        let err = Color::from_hex("#ff00€a").unwrap_err();
        assert_eq!(err.reason, "expected hex digits");
        assert!(Color::from_hex("ééé").is_err());
        let parsed: Result<Color, _> = serde_json::from_str("\"#ff00€a\"");
        assert!(parsed.is_err());
    }

    #[test]
    fn test_hex_roundtrip_is_stable() {
        let c = Color::from_hex("#1a2b3c4d").unwrap();
        assert_eq!(c.to_hex(), "#1a2b3c4d");
    }

    #[test]
    fn test_deserialize_hex_and_channels() {
        let hex: Color = serde_json::from_str("\"#00ff00\"").unwrap();
        assert_eq!(hex, Color::rgb(0.0, 1.0, 0.0));
        let channels: Color = serde_json::from_str(r#"{"r": 0.25, "g": 0.5, "b": 1.0}"#).unwrap();
        assert_eq!(channels, Color::rgb(0.25, 0.5, 1.0));
    }

    #[test]
    fn test_quantize_clamps() {
        assert_eq!(Color::new(1.5, -0.2, 0.5, 2.0).to_rgba8(), [255, 0, 128, 255]);
    }
}
