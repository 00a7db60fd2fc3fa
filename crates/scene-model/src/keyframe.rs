//! Keyframes and typed animation tracks.

use serde::{Deserialize, Deserializer, Serialize};

use crate::color::Color;
use crate::easing::Easing;
use crate::geometry::Point;

/// One control point of an animated property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyframe<T> {
    /// Scene time in seconds.
    pub time_secs: f64,

    /// Property value at `time_secs`.
    pub value: T,

    /// Curve used when blending from this keyframe towards the next one.
    #[serde(default)]
    pub easing: Easing,
}

impl<T> Keyframe<T> {
    pub fn new(time_secs: f64, value: T, easing: Easing) -> Self {
        Self {
            time_secs,
            value,
            easing,
        }
    }

    /// Keyframe with linear easing.
    pub fn linear(time_secs: f64, value: T) -> Self {
        Self::new(time_secs, value, Easing::Linear)
    }
}

/// A time-ordered sequence of keyframes for one property.
///
/// Keyframes are kept sorted by time at all times (equal times keep their
/// insertion order), so sampling can binary-search without re-sorting.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AnimationTrack<T> {
    keyframes: Vec<Keyframe<T>>,
}

impl<T> AnimationTrack<T> {
    /// Build a track from keyframes in any order.
    pub fn new(mut keyframes: Vec<Keyframe<T>>) -> Self {
        keyframes.sort_by(|a, b| a.time_secs.total_cmp(&b.time_secs));
        Self { keyframes }
    }

    /// Insert a keyframe, keeping time order. A keyframe at an existing
    /// time is placed after the ones already there.
    pub fn insert(&mut self, keyframe: Keyframe<T>) {
        let idx = self
            .keyframes
            .partition_point(|k| k.time_secs <= keyframe.time_secs);
        self.keyframes.insert(idx, keyframe);
    }

    /// Keyframes in time order.
    pub fn keyframes(&self) -> &[Keyframe<T>] {
        &self.keyframes
    }

    pub fn len(&self) -> usize {
        self.keyframes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keyframes.is_empty()
    }

    /// Time of the first keyframe.
    pub fn start_secs(&self) -> Option<f64> {
        self.keyframes.first().map(|k| k.time_secs)
    }

    /// Time of the last keyframe.
    pub fn end_secs(&self) -> Option<f64> {
        self.keyframes.last().map(|k| k.time_secs)
    }

    /// Whether every keyframe time is a finite number.
    pub fn has_finite_times(&self) -> bool {
        self.keyframes.iter().all(|k| k.time_secs.is_finite())
    }
}

impl<T> Default for AnimationTrack<T> {
    fn default() -> Self {
        Self {
            keyframes: Vec::new(),
        }
    }
}

impl<T> FromIterator<Keyframe<T>> for AnimationTrack<T> {
    fn from_iter<I: IntoIterator<Item = Keyframe<T>>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for AnimationTrack<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::<Keyframe<T>>::deserialize(deserializer).map(Self::new)
    }
}

/// Values that can be blended between two keyframes.
///
/// `interpolate(a, b, 0.0)` must return exactly `a`.
pub trait Interpolate: Clone {
    fn interpolate(a: &Self, b: &Self, t: f64) -> Self;
}

impl Interpolate for f64 {
    fn interpolate(a: &Self, b: &Self, t: f64) -> Self {
        a + (b - a) * t
    }
}

impl Interpolate for Point {
    fn interpolate(a: &Self, b: &Self, t: f64) -> Self {
        Point::new(f64::interpolate(&a.x, &b.x, t), f64::interpolate(&a.y, &b.y, t))
    }
}

impl Interpolate for Color {
    fn interpolate(a: &Self, b: &Self, t: f64) -> Self {
        let t = t as f32;
        Color::new(
            a.r + (b.r - a.r) * t,
            a.g + (b.g - a.g) * t,
            a.b + (b.b - a.b) * t,
            a.a + (b.a - a.a) * t,
        )
    }
}

/// Paths blend point-wise when both have the same number of points and
/// switch discretely at the next keyframe otherwise.
impl Interpolate for Vec<Point> {
    fn interpolate(a: &Self, b: &Self, t: f64) -> Self {
        if a.len() != b.len() {
            return a.clone();
        }
        a.iter()
            .zip(b)
            .map(|(pa, pb)| Point::interpolate(pa, pb, t))
            .collect()
    }
}

/// Strings hold the earlier keyframe's value until the next keyframe.
impl Interpolate for String {
    fn interpolate(a: &Self, _b: &Self, _t: f64) -> Self {
        a.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_sorts_by_time() {
        let track = AnimationTrack::new(vec![
            Keyframe::linear(2.0, 20.0),
            Keyframe::linear(0.0, 0.0),
            Keyframe::linear(1.0, 10.0),
        ]);
        let times: Vec<f64> = track.keyframes().iter().map(|k| k.time_secs).collect();
        assert_eq!(times, vec![0.0, 1.0, 2.0]);
        assert_eq!(track.start_secs(), Some(0.0));
        assert_eq!(track.end_secs(), Some(2.0));
    }

    #[test]
    fn test_insert_keeps_order_and_places_duplicates_last() {
        let mut track = AnimationTrack::new(vec![
            Keyframe::linear(0.0, 0.0),
            Keyframe::linear(1.0, 10.0),
        ]);
        track.insert(Keyframe::linear(1.0, 99.0));
        track.insert(Keyframe::linear(0.5, 5.0));
        let values: Vec<f64> = track.keyframes().iter().map(|k| k.value).collect();
        assert_eq!(values, vec![0.0, 5.0, 10.0, 99.0]);
    }

    #[test]
    fn test_deserialize_sorts() {
        let json = r#"[
            {"time_secs": 1.0, "value": 5.0},
            {"time_secs": 0.0, "value": 1.0, "easing": {"type": "ease_in"}}
        ]"#;
        let track: AnimationTrack<f64> = serde_json::from_str(json).unwrap();
        assert_eq!(track.keyframes()[0].value, 1.0);
        assert_eq!(track.keyframes()[0].easing, Easing::EaseIn);
        assert_eq!(track.keyframes()[1].easing, Easing::Linear);
    }

    #[test]
    fn test_interpolate_at_zero_is_exact() {
        let a = Color::new(0.1, 0.2, 0.3, 0.4);
        let b = Color::new(0.9, 0.8, 0.7, 0.6);
        assert_eq!(Color::interpolate(&a, &b, 0.0), a);
        let pa = Point::new(0.1, 1e9);
        assert_eq!(Point::interpolate(&pa, &Point::new(-3.0, 7.0), 0.0), pa);
    }

    #[test]
    fn test_path_interpolation() {
        let a = vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0)];
        let b = vec![Point::new(0.0, 1.0), Point::new(1.0, 1.0)];
        let mid = Vec::<Point>::interpolate(&a, &b, 0.5);
        assert_eq!(mid, vec![Point::new(0.0, 0.5), Point::new(1.0, 0.5)]);

        let c = vec![Point::new(0.5, 0.5)];
        assert_eq!(Vec::<Point>::interpolate(&a, &c, 0.9), a);
    }

    #[test]
    fn test_string_steps() {
        let a = "Hello".to_string();
        let b = "World".to_string();
        assert_eq!(String::interpolate(&a, &b, 0.99), "Hello");
    }
}
