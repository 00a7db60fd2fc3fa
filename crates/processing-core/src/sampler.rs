//! Keyframe track sampling.
//!
//! Sampling is a pure function of a track and a time: it never mutates
//! shared state, so tracks can be sampled concurrently from any thread.

use framecast_scene_model::keyframe::{AnimationTrack, Interpolate};
use framecast_scene_model::track::{Track, TrackRegistry, TrackValue};

/// Evaluate `track` at `time_secs`.
///
/// - Before the first keyframe: the first keyframe's value.
/// - At or after the last keyframe: the last keyframe's value.
/// - Otherwise: the bracketing pair `k0.time <= t < k1.time` is blended with
///   `k0`'s easing applied to the normalized progress.
///
/// Returns `None` for a track without keyframes; callers keep the static
/// base value in that case.
pub fn sample<T: Interpolate>(track: &AnimationTrack<T>, time_secs: f64) -> Option<T> {
    let keyframes = track.keyframes();
    let first = keyframes.first()?;
    let last = keyframes.last()?;

    if time_secs.is_nan() || time_secs < first.time_secs {
        return Some(first.value.clone());
    }
    if time_secs >= last.time_secs {
        return Some(last.value.clone());
    }

    // first.time <= t < last.time, so 1 <= idx < len.
    let idx = keyframes.partition_point(|k| k.time_secs <= time_secs);
    let k0 = &keyframes[idx - 1];
    let k1 = &keyframes[idx];

    let progress = (time_secs - k0.time_secs) / (k1.time_secs - k0.time_secs);
    let eased = k0.easing.apply(progress);
    Some(T::interpolate(&k0.value, &k1.value, eased))
}

/// Samples tracks of any kind, preserving the kind in the result.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnimationSampler;

impl AnimationSampler {
    /// Sample a track, yielding the value variant matching its kind.
    pub fn sample_track(track: &Track, time_secs: f64) -> Option<TrackValue> {
        match track {
            Track::Point(t) => sample(t, time_secs).map(TrackValue::Point),
            Track::Scalar(t) => sample(t, time_secs).map(TrackValue::Scalar),
            Track::Color(t) => sample(t, time_secs).map(TrackValue::Color),
            Track::Path(t) => sample(t, time_secs).map(TrackValue::Path),
            Track::Text(t) => sample(t, time_secs).map(TrackValue::Text),
        }
    }

    /// Sample the track registered under `key`, if any.
    pub fn sample_key(registry: &TrackRegistry, key: &str, time_secs: f64) -> Option<TrackValue> {
        registry
            .get(key)
            .and_then(|track| Self::sample_track(track, time_secs))
    }
}
