//! Per-frame scene snapshots.
//!
//! A [`SceneSnapshot`] is the fully-resolved state of every element at one
//! instant: all animated properties are substituted with sampled values, so
//! nothing downstream needs to know about tracks. Snapshots live for one
//! frame and are never written back to the base elements.

use framecast_scene_model::element::{Element, ElementKind};
use framecast_scene_model::geometry::Size;
use framecast_scene_model::track::{Property, Track, TrackRegistry, TrackValue};

use crate::sampler::AnimationSampler;

/// Animation-free scene state for one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneSnapshot {
    /// Scene time this snapshot was resolved at.
    pub time_secs: f64,

    /// Elements in z-order with all animated properties applied.
    pub elements: Vec<Element>,
}

/// Resolves snapshots for a fixed element list and track registry.
///
/// Track lookups and kind checks happen once, at construction; building a
/// snapshot afterwards only samples.
#[derive(Debug)]
pub struct SnapshotBuilder<'a> {
    base: &'a [Element],
    bindings: Vec<Vec<(Property, &'a Track)>>,
}

impl<'a> SnapshotBuilder<'a> {
    pub fn new(base: &'a [Element], registry: &'a TrackRegistry) -> Self {
        let bindings = base
            .iter()
            .map(|element| bind_element(element, registry))
            .collect();
        Self { base, bindings }
    }

    /// Number of element properties driven by a track.
    pub fn bound_property_count(&self) -> usize {
        self.bindings.iter().map(Vec::len).sum()
    }

    /// Resolve the scene at `time_secs`. The base elements are not touched.
    pub fn build(&self, time_secs: f64) -> SceneSnapshot {
        let elements = self
            .base
            .iter()
            .zip(&self.bindings)
            .map(|(element, bindings)| resolve_element(element, bindings, time_secs))
            .collect();
        SceneSnapshot {
            time_secs,
            elements,
        }
    }
}

/// One-shot snapshot of `base` at `time_secs`.
pub fn build_snapshot(base: &[Element], registry: &TrackRegistry, time_secs: f64) -> SceneSnapshot {
    SnapshotBuilder::new(base, registry).build(time_secs)
}

fn bind_element<'a>(element: &Element, registry: &'a TrackRegistry) -> Vec<(Property, &'a Track)> {
    let is_text = matches!(element.kind, ElementKind::Text { .. });
    Property::ALL
        .iter()
        .copied()
        .filter_map(|property| {
            let track = registry.get_for(&element.id, property)?;
            if !property.accepts(track.kind()) {
                tracing::warn!(
                    element = %element.id,
                    property = %property,
                    kind = %track.kind(),
                    "Ignoring track whose value kind does not fit its property"
                );
                return None;
            }
            if matches!(property, Property::Text | Property::FontSize) && !is_text {
                tracing::warn!(
                    element = %element.id,
                    property = %property,
                    element_kind = element.kind_name(),
                    "Ignoring text track on a non-text element"
                );
                return None;
            }
            Some((property, track))
        })
        .collect()
}

fn resolve_element(base: &Element, bindings: &[(Property, &Track)], time_secs: f64) -> Element {
    let mut element = base.clone();
    for (property, track) in bindings {
        let Some(value) = AnimationSampler::sample_track(track, time_secs) else {
            continue;
        };
        apply(&mut element, base, *property, value);
    }
    element
}

fn apply(element: &mut Element, base: &Element, property: Property, value: TrackValue) {
    match (property, value) {
        (Property::Position, TrackValue::Point(p)) => element.position = p,
        (Property::Size, TrackValue::Point(p)) => element.size = Size::from(p),
        (Property::Size, TrackValue::Scalar(width)) => {
            element.size = if base.aspect_locked {
                base.size.with_locked_width(width)
            } else {
                Size::new(width, base.size.height)
            };
        }
        (Property::Rotation, TrackValue::Scalar(deg)) => element.rotation_deg = deg,
        (Property::Opacity, TrackValue::Scalar(o)) => element.opacity = o.clamp(0.0, 1.0),
        (Property::Color, TrackValue::Color(c)) => element.color = c,
        (Property::Path, TrackValue::Path(points)) => element.outline = Some(points),
        (Property::Text, TrackValue::Text(s)) => {
            if let ElementKind::Text { text, .. } = &mut element.kind {
                *text = s;
            }
        }
        (Property::FontSize, TrackValue::Scalar(size)) => {
            if let ElementKind::Text { font_size, .. } = &mut element.kind {
                *font_size = size.max(0.0);
            }
        }
        // Kinds were checked when binding.
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framecast_scene_model::color::Color;
    use framecast_scene_model::element::TextAlignment;
    use framecast_scene_model::geometry::Point;
    use framecast_scene_model::keyframe::{AnimationTrack, Keyframe};

    fn rect() -> Element {
        Element::rectangle(
            "rect",
            Point::new(100.0, 100.0),
            Size::new(200.0, 100.0),
            Color::rgb(1.0, 0.0, 0.0),
        )
    }

    #[test]
    fn test_unanimated_element_is_unchanged() {
        let base = vec![rect()];
        let snapshot = build_snapshot(&base, &TrackRegistry::new(), 0.5);
        assert_eq!(snapshot.elements, base);
        assert_eq!(snapshot.time_secs, 0.5);
    }

    #[test]
    fn test_position_track_overrides_base() {
        let base = vec![rect()];
        let mut registry = TrackRegistry::new();
        registry.insert_for(
            "rect",
            Property::Position,
            AnimationTrack::new(vec![
                Keyframe::linear(0.0, Point::new(0.0, 0.0)),
                Keyframe::linear(1.0, Point::new(200.0, 200.0)),
            ]),
        );
        let builder = SnapshotBuilder::new(&base, &registry);
        assert_eq!(builder.bound_property_count(), 1);
        assert_eq!(builder.build(0.0).elements[0].position, Point::new(0.0, 0.0));
        assert_eq!(builder.build(0.5).elements[0].position, Point::new(100.0, 100.0));
        assert_eq!(builder.build(1.0).elements[0].position, Point::new(200.0, 200.0));
        // Base list untouched.
        assert_eq!(base[0].position, Point::new(100.0, 100.0));
    }

    #[test]
    fn test_scalar_size_respects_aspect_lock() {
        let mut locked = rect();
        locked.aspect_locked = true;
        let mut free = rect();
        free.id = "free".to_string();
        let base = vec![locked, free];

        let mut registry = TrackRegistry::new();
        let width = AnimationTrack::new(vec![Keyframe::linear(0.0, 100.0)]);
        registry.insert_for("rect", Property::Size, width.clone());
        registry.insert_for("free", Property::Size, width);

        let snapshot = build_snapshot(&base, &registry, 0.0);
        assert_eq!(snapshot.elements[0].size, Size::new(100.0, 50.0));
        assert_eq!(snapshot.elements[1].size, Size::new(100.0, 100.0));
    }

    #[test]
    fn test_point_size_sets_both_axes() {
        let mut locked = rect();
        locked.aspect_locked = true;
        let mut registry = TrackRegistry::new();
        registry.insert_for(
            "rect",
            Property::Size,
            AnimationTrack::new(vec![Keyframe::linear(0.0, Point::new(30.0, 90.0))]),
        );
        let snapshot = build_snapshot(&[locked], &registry, 0.0);
        assert_eq!(snapshot.elements[0].size, Size::new(30.0, 90.0));
    }

    #[test]
    fn test_opacity_is_clamped() {
        let mut registry = TrackRegistry::new();
        registry.insert_for(
            "rect",
            Property::Opacity,
            AnimationTrack::new(vec![Keyframe::linear(0.0, 1.8)]),
        );
        let snapshot = build_snapshot(&[rect()], &registry, 0.0);
        assert_eq!(snapshot.elements[0].opacity, 1.0);
    }

    #[test]
    fn test_mismatched_kind_is_ignored() {
        let mut registry = TrackRegistry::new();
        registry.insert_for(
            "rect",
            Property::Rotation,
            AnimationTrack::new(vec![Keyframe::linear(0.0, Color::WHITE)]),
        );
        let base = vec![rect()];
        let builder = SnapshotBuilder::new(&base, &registry);
        assert_eq!(builder.bound_property_count(), 0);
    }

    #[test]
    fn test_text_tracks_apply_to_text_elements() {
        let text = Element::with_kind(
            "title",
            Point::new(0.0, 0.0),
            Size::new(400.0, 80.0),
            Color::WHITE,
            ElementKind::Text {
                text: "3".to_string(),
                font_size: 32.0,
                alignment: TextAlignment::Center,
            },
        );
        let mut registry = TrackRegistry::new();
        registry.insert_for(
            "title",
            Property::Text,
            AnimationTrack::new(vec![
                Keyframe::linear(0.0, "3".to_string()),
                Keyframe::linear(1.0, "2".to_string()),
            ]),
        );
        registry.insert_for(
            "title",
            Property::FontSize,
            AnimationTrack::new(vec![
                Keyframe::linear(0.0, 32.0),
                Keyframe::linear(1.0, 64.0),
            ]),
        );
        let snapshot = build_snapshot(&[text], &registry, 1.0);
        match &snapshot.elements[0].kind {
            ElementKind::Text {
                text, font_size, ..
            } => {
                assert_eq!(text, "2");
                assert_eq!(*font_size, 64.0);
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn test_path_track_sets_outline() {
        let mut registry = TrackRegistry::new();
        let triangle = vec![
            Point::new(0.5, 0.0),
            Point::new(1.0, 1.0),
            Point::new(0.0, 1.0),
        ];
        registry.insert_for(
            "rect",
            Property::Path,
            AnimationTrack::new(vec![Keyframe::linear(0.0, triangle.clone())]),
        );
        let snapshot = build_snapshot(&[rect()], &registry, 0.3);
        assert_eq!(snapshot.elements[0].outline.as_ref(), Some(&triangle));
    }
}
