//! Points and sizes in canvas space.

use serde::{Deserialize, Serialize};

/// A 2D point in canvas pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const ZERO: Point = Point { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance_to(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Width and height of an element in canvas pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Width-to-height ratio, or `None` for a degenerate height.
    pub fn aspect_ratio(&self) -> Option<f64> {
        if self.height.abs() < f64::EPSILON {
            None
        } else {
            Some(self.width / self.height)
        }
    }

    /// Size with the given width and the height implied by this size's
    /// aspect ratio. Degenerate sizes keep their current height.
    pub fn with_locked_width(&self, width: f64) -> Size {
        match self.aspect_ratio() {
            Some(ratio) if ratio.abs() > f64::EPSILON => Size::new(width, width / ratio),
            _ => Size::new(width, self.height),
        }
    }
}

impl From<Point> for Size {
    fn from(p: Point) -> Self {
        Size::new(p.x, p.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_distance() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert!((a.distance_to(&b) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_locked_width_preserves_ratio() {
        let size = Size::new(200.0, 100.0);
        let scaled = size.with_locked_width(50.0);
        assert!((scaled.height - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_locked_width_on_degenerate_size() {
        let size = Size::new(200.0, 0.0);
        assert_eq!(size.with_locked_width(50.0), Size::new(50.0, 0.0));
    }
}
