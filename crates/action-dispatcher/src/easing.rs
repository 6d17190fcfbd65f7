use gamepilot_core_types::Point;
use serde::{Deserialize, Serialize};

/// Timing curve mapping elapsed fraction `t ∈ [0, 1]` to progress.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Easing {
    Linear,
    EaseInOut,
    /// CSS-style cubic bezier through (0,0), `cp1`, `cp2`, (1,1).
    Bezier { cp1: (f64, f64), cp2: (f64, f64) },
}

impl Default for Easing {
    fn default() -> Self {
        Easing::EaseInOut
    }
}

impl Easing {
    pub fn apply(&self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match *self {
            Easing::Linear => t,
            Easing::EaseInOut => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
                }
            }
            Easing::Bezier { cp1, cp2 } => cubic_bezier(t, cp1, cp2),
        }
    }
}

fn bezier_component(s: f64, p1: f64, p2: f64) -> f64 {
    let inv = 1.0 - s;
    3.0 * inv * inv * s * p1 + 3.0 * inv * s * s * p2 + s * s * s
}

/// Solves x(s) = t by bisection (x is monotonic for control x in [0, 1]),
/// then returns y(s).
fn cubic_bezier(t: f64, cp1: (f64, f64), cp2: (f64, f64)) -> f64 {
    let (x1, x2) = (cp1.0.clamp(0.0, 1.0), cp2.0.clamp(0.0, 1.0));
    let (mut lo, mut hi) = (0.0_f64, 1.0_f64);
    let mut s = t;
    for _ in 0..48 {
        s = (lo + hi) / 2.0;
        let x = bezier_component(s, x1, x2);
        if (x - t).abs() < 1e-7 {
            break;
        }
        if x < t {
            lo = s;
        } else {
            hi = s;
        }
    }
    bezier_component(s, cp1.1, cp2.1).clamp(0.0, 1.0)
}

/// `steps` points from just after `from` up to exactly `to`, never moving
/// backwards along the path.
pub fn waypoints(from: Point, to: Point, steps: u32, easing: &Easing) -> Vec<Point> {
    let steps = steps.max(1);
    let (dx, dy) = ((to.x - from.x) as f64, (to.y - from.y) as f64);
    let mut progress = 0.0_f64;
    (1..=steps)
        .map(|i| {
            if i == steps {
                return to;
            }
            progress = progress.max(easing.apply(i as f64 / steps as f64));
            Point::new(
                from.x + (dx * progress).round() as i32,
                from.y + (dy * progress).round() as i32,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn curves_start_at_zero_and_end_at_one() {
        let curves = [
            Easing::Linear,
            Easing::EaseInOut,
            Easing::Bezier {
                cp1: (0.42, 0.0),
                cp2: (0.58, 1.0),
            },
        ];
        for curve in curves {
            assert!(curve.apply(0.0).abs() < 1e-6, "{curve:?}");
            assert!((curve.apply(1.0) - 1.0).abs() < 1e-6, "{curve:?}");
            assert!((curve.apply(0.5) - 0.5).abs() < 1e-3, "{curve:?}");
        }
    }

    #[test]
    fn ease_in_out_is_slow_at_the_edges() {
        let ease = Easing::EaseInOut;
        assert!(ease.apply(0.1) < 0.1);
        assert!(ease.apply(0.9) > 0.9);
    }

    #[test]
    fn waypoints_are_monotonic_and_end_on_target() {
        let from = Point::new(10, 200);
        let to = Point::new(110, 150);
        let points = waypoints(from, to, 8, &Easing::EaseInOut);
        assert_eq!(points.len(), 8);
        assert_eq!(*points.last().unwrap(), to);
        for pair in points.windows(2) {
            assert!(pair[1].x >= pair[0].x);
            assert!(pair[1].y <= pair[0].y);
        }
    }
}
