//! Easing curves applied between two keyframes.

use serde::{Deserialize, Serialize};

/// Progress-remapping function attached to a keyframe.
///
/// The easing of the *earlier* keyframe of a pair shapes the transition
/// towards the later one.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Easing {
    #[default]
    Linear,
    EaseIn,
    EaseOut,
    EaseInOut,
    Bounce,
    Elastic,
    Spring,
    Sine,
    CustomCubicBezier { x1: f64, y1: f64, x2: f64, y2: f64 },
}

const SPRING_DAMPING: f64 = 6.0;
const SPRING_OSCILLATIONS: f64 = 1.5;

impl Easing {
    /// Map normalized progress in `[0, 1]` to eased progress.
    ///
    /// Input is clamped; `apply(0.0) == 0.0` and `apply(1.0) == 1.0` for
    /// every variant. Overshooting curves (elastic, spring, custom beziers
    /// with `y` outside `[0, 1]`) may leave that range in between.
    pub fn apply(&self, progress: f64) -> f64 {
        let p = if progress.is_nan() {
            0.0
        } else {
            progress.clamp(0.0, 1.0)
        };
        if p == 0.0 {
            return 0.0;
        }
        if p == 1.0 {
            return 1.0;
        }

        match *self {
            Easing::Linear => p,
            Easing::EaseIn => p * p,
            Easing::EaseOut => 1.0 - (1.0 - p) * (1.0 - p),
            Easing::EaseInOut => {
                if p < 0.5 {
                    2.0 * p * p
                } else {
                    1.0 - (-2.0 * p + 2.0).powi(2) / 2.0
                }
            }
            Easing::Sine => -((std::f64::consts::PI * p).cos() - 1.0) / 2.0,
            Easing::Bounce => bounce_out(p),
            Easing::Elastic => {
                let c4 = (2.0 * std::f64::consts::PI) / 3.0;
                2f64.powf(-10.0 * p) * ((p * 10.0 - 0.75) * c4).sin() + 1.0
            }
            Easing::Spring => {
                let omega = 2.0 * std::f64::consts::PI * SPRING_OSCILLATIONS;
                1.0 - (-SPRING_DAMPING * p).exp() * (omega * p).cos()
            }
            Easing::CustomCubicBezier { x1, y1, x2, y2 } => cubic_bezier_ease(p, x1, y1, x2, y2),
        }
    }
}

fn bounce_out(p: f64) -> f64 {
    const N1: f64 = 7.5625;
    const D1: f64 = 2.75;

    if p < 1.0 / D1 {
        N1 * p * p
    } else if p < 2.0 / D1 {
        let p = p - 1.5 / D1;
        N1 * p * p + 0.75
    } else if p < 2.5 / D1 {
        let p = p - 2.25 / D1;
        N1 * p * p + 0.9375
    } else {
        let p = p - 2.625 / D1;
        N1 * p * p + 0.984375
    }
}

/// One axis of a cubic bezier anchored at 0 and 1.
fn bezier_axis(c1: f64, c2: f64, t: f64) -> f64 {
    let u = 1.0 - t;
    3.0 * u * u * t * c1 + 3.0 * u * t * t * c2 + t * t * t
}

/// Solve the bezier's x(t) = p by bisection, then evaluate y(t).
///
/// Control x values are clamped to `[0, 1]` so x(t) stays monotonic.
fn cubic_bezier_ease(p: f64, x1: f64, y1: f64, x2: f64, y2: f64) -> f64 {
    let x1 = x1.clamp(0.0, 1.0);
    let x2 = x2.clamp(0.0, 1.0);

    let mut lo = 0.0f64;
    let mut hi = 1.0f64;
    let mut t = p;
    for _ in 0..48 {
        let x = bezier_axis(x1, x2, t);
        if (x - p).abs() < 1e-9 {
            break;
        }
        if x < p {
            lo = t;
        } else {
            hi = t;
        }
        t = 0.5 * (lo + hi);
    }
    bezier_axis(y1, y2, t)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Easing; 9] = [
        Easing::Linear,
        Easing::EaseIn,
        Easing::EaseOut,
        Easing::EaseInOut,
        Easing::Bounce,
        Easing::Elastic,
        Easing::Spring,
        Easing::Sine,
        Easing::CustomCubicBezier {
            x1: 0.42,
            y1: 0.0,
            x2: 0.58,
            y2: 1.0,
        },
    ];

    #[test]
    fn test_endpoints_are_exact() {
        for easing in ALL {
            assert_eq!(easing.apply(0.0), 0.0, "{easing:?} at 0");
            assert_eq!(easing.apply(1.0), 1.0, "{easing:?} at 1");
        }
    }

    #[test]
    fn test_input_is_clamped() {
        for easing in ALL {
            assert_eq!(easing.apply(-3.0), 0.0);
            assert_eq!(easing.apply(7.0), 1.0);
            assert_eq!(easing.apply(f64::NAN), 0.0);
        }
    }

    #[test]
    fn test_ease_in_out_is_symmetric() {
        let e = Easing::EaseInOut;
        assert!((e.apply(0.5) - 0.5).abs() < 1e-12);
        assert!((e.apply(0.25) + e.apply(0.75) - 1.0).abs() < 1e-12);
        assert!((Easing::Sine.apply(0.5) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_linear_bezier_is_identity() {
        let e = Easing::CustomCubicBezier {
            x1: 0.0,
            y1: 0.0,
            x2: 1.0,
            y2: 1.0,
        };
        for i in 1..10 {
            let p = i as f64 / 10.0;
            assert!((e.apply(p) - p).abs() < 1e-6);
        }
    }

    #[test]
    fn test_ease_in_lags_ease_out_leads() {
        assert!(Easing::EaseIn.apply(0.3) < 0.3);
        assert!(Easing::EaseOut.apply(0.3) > 0.3);
    }

    #[test]
    fn test_bounce_stays_in_range() {
        for i in 0..=100 {
            let v = Easing::Bounce.apply(i as f64 / 100.0);
            assert!((0.0..=1.0 + 1e-9).contains(&v));
        }
    }

    #[test]
    fn test_serde_tagging() {
        let e: Easing = serde_json::from_str(r#"{"type": "ease_in_out"}"#).unwrap();
        assert_eq!(e, Easing::EaseInOut);
        let b: Easing = serde_json::from_str(
            r#"{"type": "custom_cubic_bezier", "x1": 0.1, "y1": 0.2, "x2": 0.3, "y2": 0.4}"#,
        )
        .unwrap();
        assert!(matches!(b, Easing::CustomCubicBezier { .. }));
    }
}
