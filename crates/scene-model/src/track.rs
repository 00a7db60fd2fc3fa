//! The animation track registry.
//!
//! Tracks of different value types share one string key space
//! (`{elementId}_{property}`). Instead of type-erased storage, each entry is
//! a closed [`Track`] variant, and sampling yields the matching
//! [`TrackValue`] variant, so consumers pattern-match on the kind they
//! expect rather than down-casting.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::color::Color;
use crate::geometry::Point;
use crate::keyframe::AnimationTrack;

/// Animatable element properties and the suffixes used in track keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Property {
    Position,
    Size,
    Rotation,
    Opacity,
    Color,
    Path,
    Text,
    FontSize,
}

impl Property {
    pub const ALL: [Property; 8] = [
        Property::Position,
        Property::Size,
        Property::Rotation,
        Property::Opacity,
        Property::Color,
        Property::Path,
        Property::Text,
        Property::FontSize,
    ];

    /// Key suffix for this property.
    pub fn as_str(self) -> &'static str {
        match self {
            Property::Position => "position",
            Property::Size => "size",
            Property::Rotation => "rotation",
            Property::Opacity => "opacity",
            Property::Color => "color",
            Property::Path => "path",
            Property::Text => "text",
            Property::FontSize => "fontSize",
        }
    }

    /// Whether a track of `kind` can drive this property.
    pub fn accepts(self, kind: TrackKind) -> bool {
        match self {
            Property::Position => kind == TrackKind::Point,
            Property::Size => matches!(kind, TrackKind::Point | TrackKind::Scalar),
            Property::Rotation | Property::Opacity | Property::FontSize => {
                kind == TrackKind::Scalar
            }
            Property::Color => kind == TrackKind::Color,
            Property::Path => kind == TrackKind::Path,
            Property::Text => kind == TrackKind::Text,
        }
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registry key for an element's property track.
pub fn track_key(element_id: &str, property: Property) -> String {
    format!("{element_id}_{}", property.as_str())
}

/// Value type carried by a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Point,
    Scalar,
    Color,
    Path,
    Text,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TrackKind::Point => "point",
            TrackKind::Scalar => "scalar",
            TrackKind::Color => "color",
            TrackKind::Path => "path",
            TrackKind::Text => "text",
        };
        f.write_str(name)
    }
}

/// A keyframe track of one of the supported value kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "keyframes", rename_all = "snake_case")]
pub enum Track {
    Point(AnimationTrack<Point>),
    Scalar(AnimationTrack<f64>),
    Color(AnimationTrack<Color>),
    Path(AnimationTrack<Vec<Point>>),
    Text(AnimationTrack<String>),
}

impl Track {
    pub fn kind(&self) -> TrackKind {
        match self {
            Track::Point(_) => TrackKind::Point,
            Track::Scalar(_) => TrackKind::Scalar,
            Track::Color(_) => TrackKind::Color,
            Track::Path(_) => TrackKind::Path,
            Track::Text(_) => TrackKind::Text,
        }
    }

    /// Number of keyframes.
    pub fn len(&self) -> usize {
        match self {
            Track::Point(t) => t.len(),
            Track::Scalar(t) => t.len(),
            Track::Color(t) => t.len(),
            Track::Path(t) => t.len(),
            Track::Text(t) => t.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether every keyframe time is finite.
    pub fn has_finite_times(&self) -> bool {
        match self {
            Track::Point(t) => t.has_finite_times(),
            Track::Scalar(t) => t.has_finite_times(),
            Track::Color(t) => t.has_finite_times(),
            Track::Path(t) => t.has_finite_times(),
            Track::Text(t) => t.has_finite_times(),
        }
    }
}

impl From<AnimationTrack<Point>> for Track {
    fn from(t: AnimationTrack<Point>) -> Self {
        Track::Point(t)
    }
}

impl From<AnimationTrack<f64>> for Track {
    fn from(t: AnimationTrack<f64>) -> Self {
        Track::Scalar(t)
    }
}

impl From<AnimationTrack<Color>> for Track {
    fn from(t: AnimationTrack<Color>) -> Self {
        Track::Color(t)
    }
}

impl From<AnimationTrack<Vec<Point>>> for Track {
    fn from(t: AnimationTrack<Vec<Point>>) -> Self {
        Track::Path(t)
    }
}

impl From<AnimationTrack<String>> for Track {
    fn from(t: AnimationTrack<String>) -> Self {
        Track::Text(t)
    }
}

/// A sampled track value.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackValue {
    Point(Point),
    Scalar(f64),
    Color(Color),
    Path(Vec<Point>),
    Text(String),
}

impl TrackValue {
    pub fn kind(&self) -> TrackKind {
        match self {
            TrackValue::Point(_) => TrackKind::Point,
            TrackValue::Scalar(_) => TrackKind::Scalar,
            TrackValue::Color(_) => TrackKind::Color,
            TrackValue::Path(_) => TrackKind::Path,
            TrackValue::Text(_) => TrackKind::Text,
        }
    }
}

/// All animation tracks of a scene, keyed by `{elementId}_{property}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackRegistry {
    tracks: BTreeMap<String, Track>,
}

impl TrackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the track stored under `key`.
    pub fn insert(&mut self, key: impl Into<String>, track: impl Into<Track>) -> Option<Track> {
        self.tracks.insert(key.into(), track.into())
    }

    /// Insert or replace an element's property track.
    pub fn insert_for(
        &mut self,
        element_id: &str,
        property: Property,
        track: impl Into<Track>,
    ) -> Option<Track> {
        self.insert(track_key(element_id, property), track)
    }

    pub fn get(&self, key: &str) -> Option<&Track> {
        self.tracks.get(key)
    }

    /// Track driving `property` of `element_id`, if any.
    pub fn get_for(&self, element_id: &str, property: Property) -> Option<&Track> {
        self.tracks.get(&track_key(element_id, property))
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Track)> {
        self.tracks.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyframe::Keyframe;

    #[test]
    fn test_track_key_format() {
        assert_eq!(track_key("rect-1", Property::Position), "rect-1_position");
        assert_eq!(track_key("title", Property::FontSize), "title_fontSize");
    }

    #[test]
    fn test_property_kind_acceptance() {
        assert!(Property::Size.accepts(TrackKind::Scalar));
        assert!(Property::Size.accepts(TrackKind::Point));
        assert!(!Property::Position.accepts(TrackKind::Scalar));
        assert!(!Property::Opacity.accepts(TrackKind::Color));
    }

    #[test]
    fn test_registry_lookup_returns_variant() {
        let mut registry = TrackRegistry::new();
        registry.insert_for(
            "rect",
            Property::Opacity,
            AnimationTrack::new(vec![Keyframe::linear(0.0, 0.0), Keyframe::linear(1.0, 1.0)]),
        );
        let track = registry.get("rect_opacity").unwrap();
        assert_eq!(track.kind(), TrackKind::Scalar);
        assert_eq!(track.len(), 2);
        assert!(registry.get_for("rect", Property::Position).is_none());
    }

    #[test]
    fn test_registry_serde() {
        let json = r##"{
            "rect_position": {"kind": "point", "keyframes": [
                {"time_secs": 1.0, "value": {"x": 200.0, "y": 200.0}},
                {"time_secs": 0.0, "value": {"x": 0.0, "y": 0.0}}
            ]},
            "rect_color": {"kind": "color", "keyframes": [
                {"time_secs": 0.0, "value": "#ff0000"}
            ]}
        }"##;
        let registry: TrackRegistry = serde_json::from_str(json).unwrap();
        assert_eq!(registry.len(), 2);
        match registry.get_for("rect", Property::Position) {
            Some(Track::Point(track)) => {
                assert_eq!(track.keyframes()[0].value, Point::new(0.0, 0.0));
            }
            other => panic!("unexpected track: {other:?}"),
        }
    }
}
