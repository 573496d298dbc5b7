//! # Cubic Bezier spline

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

// Internal
use super::Pose;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Number of samples used for the coarse closest point search.
const CLOSEST_POINT_SAMPLES: usize = 100;

/// Maximum number of Newton iterations refining the closest point.
const CLOSEST_POINT_NEWTON_ITERS: usize = 10;

/// Number of chords summed when estimating the arc length.
const LENGTH_CHORDS: usize = 100;

/// Parameter step used when walking along the curve for a given distance.
const WALK_STEP: f64 = 0.005;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A cubic Bezier curve parameterised by `t` in [0, 1].
///
/// The curve may be evaluated outside of [0, 1], in which case the polynomial is extrapolated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spline {
    pub start: Point2<f64>,
    pub control1: Point2<f64>,
    pub control2: Point2<f64>,
    pub end: Point2<f64>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Spline {
    pub fn new(
        start: Point2<f64>,
        control1: Point2<f64>,
        control2: Point2<f64>,
        end: Point2<f64>,
    ) -> Self {
        Self {
            start,
            control1,
            control2,
            end,
        }
    }

    /// Build a spline connecting two poses.
    ///
    /// The control points sit half of the start-end distance along the start and end headings, so
    /// the curve leaves and enters the poses tangentially. When `backward` is set they are
    /// mirrored, which keeps the curve's tangent pointing in the direction of travel.
    pub fn from_poses(start: &Pose, end: &Pose, backward: bool) -> Self {
        let mut control_dist = start.distance(end) / 2.0;
        if backward {
            control_dist = -control_dist;
        }

        Self {
            start: start.point(),
            control1: start.point() + start.heading_vector() * control_dist,
            control2: end.point() - end.heading_vector() * control_dist,
            end: end.point(),
        }
    }

    /// Position on the curve at `t`.
    pub fn point(&self, t: f64) -> Point2<f64> {
        let mt = 1.0 - t;

        Point2::from(
            self.start.coords * (mt * mt * mt)
                + self.control1.coords * (3.0 * mt * mt * t)
                + self.control2.coords * (3.0 * mt * t * t)
                + self.end.coords * (t * t * t),
        )
    }

    /// First derivative of the curve with respect to `t`.
    pub fn gradient(&self, t: f64) -> Vector2<f64> {
        let mt = 1.0 - t;

        (self.control1 - self.start) * (3.0 * mt * mt)
            + (self.control2 - self.control1) * (6.0 * mt * t)
            + (self.end - self.control2) * (3.0 * t * t)
    }

    /// Second derivative of the curve with respect to `t`.
    fn second_gradient(&self, t: f64) -> Vector2<f64> {
        let a = self.control2.coords - self.control1.coords * 2.0 + self.start.coords;
        let b = self.end.coords - self.control2.coords * 2.0 + self.control1.coords;

        a * (6.0 * (1.0 - t)) + b * (6.0 * t)
    }

    /// Heading of the curve at `t`.
    pub fn yaw(&self, t: f64) -> f64 {
        let g = self.tangent(t);
        g.y.atan2(g.x)
    }

    /// Pose on the curve at `t`, heading along the gradient.
    pub fn pose(&self, t: f64) -> Pose {
        Pose::from_point(self.point(t), self.yaw(t))
    }

    /// The parameter of the curve point closest to `point`, searched within [0, 1].
    pub fn closest_point(&self, point: &Point2<f64>) -> f64 {
        self.closest_point_within(point, 0.0, 1.0)
    }

    /// The parameter of the curve point closest to `point`, searched within [t_min, t_max].
    ///
    /// If the minimum lies on a bound the bound itself is returned exactly, so callers may compare
    /// the result against the bounds with `==`.
    pub fn closest_point_within(&self, point: &Point2<f64>, t_min: f64, t_max: f64) -> f64 {
        let dist_sq = |t: f64| (self.point(t) - point).norm_squared();

        // Coarse search, the last sample is t_max itself
        let mut best_t = t_min;
        let mut best_dist_sq = dist_sq(t_min);
        for i in 1..=CLOSEST_POINT_SAMPLES {
            let t = if i == CLOSEST_POINT_SAMPLES {
                t_max
            } else {
                t_min + (t_max - t_min) * (i as f64) / (CLOSEST_POINT_SAMPLES as f64)
            };

            let d = dist_sq(t);
            if d < best_dist_sq {
                best_t = t;
                best_dist_sq = d;
            }
        }

        // Newton refinement of (P(t) - Q) . P'(t) = 0
        let mut t = best_t;
        for _ in 0..CLOSEST_POINT_NEWTON_ITERS {
            let diff = self.point(t) - point;
            let grad = self.gradient(t);
            let f = diff.dot(&grad);
            let df = grad.dot(&grad) + diff.dot(&self.second_gradient(t));

            if df.abs() < 1e-12 {
                break;
            }

            let next = (t - f / df).max(t_min).min(t_max);
            let converged = (next - t).abs() < 1e-12;
            t = next;
            if converged {
                break;
            }
        }

        if dist_sq(t) <= best_dist_sq {
            t
        } else {
            best_t
        }
    }

    /// Arc length estimated by summing chords.
    pub fn estimated_length(&self) -> f64 {
        let mut length = 0.0;
        let mut prev = self.start;

        for i in 1..=LENGTH_CHORDS {
            let p = self.point(i as f64 / LENGTH_CHORDS as f64);
            length += (p - prev).norm();
            prev = p;
        }

        length
    }

    /// The point `distance` meters further along the curve from `t`.
    ///
    /// Beyond the end of the curve the walk continues straight along the end tangent.
    pub fn point_ahead(&self, t: f64, distance: f64) -> Point2<f64> {
        let mut t = t;
        let mut prev = self.point(t);
        let mut remaining = distance;

        if remaining <= 0.0 {
            return prev;
        }

        while t < 1.0 {
            let next_t = (t + WALK_STEP).min(1.0);
            let p = self.point(next_t);
            let chord = (p - prev).norm();

            if chord >= remaining {
                return prev + (p - prev) * (remaining / chord);
            }

            remaining -= chord;
            prev = p;
            t = next_t;
        }

        prev + self.tangent(1.0) * remaining
    }

    /// Split the curve at `t` (de Casteljau), returning the curves covering [0, t] and [t, 1].
    pub fn split(&self, t: f64) -> (Spline, Spline) {
        let q0 = interpolate(&self.start, &self.control1, t);
        let q1 = interpolate(&self.control1, &self.control2, t);
        let q2 = interpolate(&self.control2, &self.end, t);
        let r0 = interpolate(&q0, &q1, t);
        let r1 = interpolate(&q1, &q2, t);
        let s0 = interpolate(&r0, &r1, t);

        (
            Spline::new(self.start, q0, r0, s0),
            Spline::new(s0, r1, q2, self.end),
        )
    }

    /// Unit tangent at `t`.
    ///
    /// Where the gradient vanishes (a control point coincides with an endpoint) the chord between
    /// the endpoints is used instead. A curve collapsed to a single point has a zero tangent.
    fn tangent(&self, t: f64) -> Vector2<f64> {
        let g = self.gradient(t);
        if g.norm() > 1e-12 {
            return g.normalize();
        }

        let chord = self.end - self.start;
        if chord.norm() > 1e-12 {
            chord.normalize()
        } else {
            Vector2::zeros()
        }
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Linear interpolation between two points, exact at t = 0 and t = 1.
fn interpolate(a: &Point2<f64>, b: &Point2<f64>, t: f64) -> Point2<f64> {
    Point2::from(a.coords * (1.0 - t) + b.coords * t)
}
