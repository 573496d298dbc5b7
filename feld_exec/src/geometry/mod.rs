//! # Geometry
//!
//! Planar poses and the cubic splines paths are built from. All positions are in the local field
//! frame, in meters, with yaw measured anticlockwise from the +x axis in radians.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod spline;

pub use spline::Spline;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::{Point2, Rotation2, Vector2};
use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign};

// Internal
use util::maths::wrap_pi;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Position and heading of the robot (or any other frame) in the field.
#[derive(Debug, Copy, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// Units: meters
    pub x: f64,

    /// Units: meters
    pub y: f64,

    /// Heading, not wrapped.
    ///
    /// Units: radians
    pub yaw: f64,
}

/// A pose delta as produced by odometry.
///
/// The linear part is applied along the heading the pose had before the step, then the angular
/// part rotates the pose.
#[derive(Debug, Copy, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoseStep {
    /// Units: meters
    pub linear: f64,

    /// Units: radians
    pub angular: f64,

    /// Time covered by the step.
    ///
    /// Units: seconds
    pub time: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Pose {
    pub fn new(x: f64, y: f64, yaw: f64) -> Self {
        Self { x, y, yaw }
    }

    /// Build a pose from a point and a heading.
    pub fn from_point(point: Point2<f64>, yaw: f64) -> Self {
        Self {
            x: point.x,
            y: point.y,
            yaw,
        }
    }

    pub fn point(&self) -> Point2<f64> {
        Point2::new(self.x, self.y)
    }

    /// Heading in degrees, for logging.
    pub fn yaw_deg(&self) -> f64 {
        self.yaw.to_degrees()
    }

    /// Unit vector pointing along the pose's heading.
    pub fn heading_vector(&self) -> Vector2<f64> {
        Vector2::new(self.yaw.cos(), self.yaw.sin())
    }

    /// Straight-line distance between the positions of two poses.
    pub fn distance(&self, other: &Pose) -> f64 {
        self.distance_to_point(&other.point())
    }

    pub fn distance_to_point(&self, point: &Point2<f64>) -> f64 {
        (point - self.point()).norm()
    }

    /// Direction (absolute bearing) from this pose's position to another pose's position.
    pub fn direction(&self, other: &Pose) -> f64 {
        let d = other.point() - self.point();
        d.y.atan2(d.x)
    }

    /// Bearing to another pose relative to this pose's heading, wrapped into (-pi, pi].
    pub fn relative_direction(&self, other: &Pose) -> f64 {
        wrap_pi(self.direction(other) - self.yaw)
    }

    /// Express a point given in this pose's frame in the parent frame.
    pub fn transform_point(&self, local: &Point2<f64>) -> Point2<f64> {
        self.point() + Rotation2::new(self.yaw) * local.coords
    }

    /// Express a pose given in this pose's frame in the parent frame.
    pub fn transform_pose(&self, local: &Pose) -> Pose {
        Pose::from_point(self.transform_point(&local.point()), self.yaw + local.yaw)
    }

    /// Express a parent-frame point in this pose's frame.
    pub fn relative_point(&self, point: &Point2<f64>) -> Point2<f64> {
        Point2::from(Rotation2::new(-self.yaw) * (point - self.point()))
    }

    /// Express a parent-frame pose in this pose's frame.
    pub fn relative_pose(&self, other: &Pose) -> Pose {
        Pose::from_point(self.relative_point(&other.point()), other.yaw - self.yaw)
    }
}

impl PoseStep {
    /// A purely linear step, used to move a pose along its heading.
    pub fn linear(distance_m: f64) -> Self {
        Self {
            linear: distance_m,
            ..Default::default()
        }
    }
}

impl Add<PoseStep> for Pose {
    type Output = Pose;

    fn add(self, step: PoseStep) -> Pose {
        Pose {
            x: self.x + step.linear * self.yaw.cos(),
            y: self.y + step.linear * self.yaw.sin(),
            yaw: self.yaw + step.angular,
        }
    }
}

impl AddAssign<PoseStep> for Pose {
    fn add_assign(&mut self, step: PoseStep) {
        *self = *self + step;
    }
}

impl std::fmt::Display for Pose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "(x={:.3}, y={:.3}, yaw={:.1} deg)",
            self.x,
            self.y,
            self.yaw_deg()
        )
    }
}
