//! # Drive segment

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

// Internal
use crate::geometry::{Pose, Spline};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// One unit of travel: a spline and how to drive it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriveSegment {
    pub spline: Spline,

    /// Drive the spline in reverse. The spline's tangent points along the direction of travel.
    pub backward: bool,

    /// The implement may supply targets while this segment is driven.
    pub use_implement: bool,

    /// Throttle down and stop at the end of the segment.
    pub stop_at_end: bool,
}

/// Optional flags for building a segment.
#[derive(Debug, Clone, Copy)]
pub struct SegmentFlags {
    pub backward: bool,
    pub use_implement: bool,
    pub stop_at_end: bool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for SegmentFlags {
    fn default() -> Self {
        Self {
            backward: false,
            use_implement: false,
            stop_at_end: true,
        }
    }
}

impl DriveSegment {
    /// Segment following a spline between two poses.
    pub fn from_poses(start: &Pose, end: &Pose, flags: SegmentFlags) -> Self {
        Self {
            spline: Spline::from_poses(start, end, flags.backward),
            backward: flags.backward,
            use_implement: flags.use_implement,
            stop_at_end: flags.stop_at_end,
        }
    }

    /// Straight segment between two points, both poses facing from `start` to `end`.
    pub fn from_points(start: &Point2<f64>, end: &Point2<f64>, flags: SegmentFlags) -> Self {
        let d = end - start;
        let yaw = d.y.atan2(d.x);

        Self::from_poses(
            &Pose::from_point(*start, yaw),
            &Pose::from_point(*end, yaw),
            flags,
        )
    }

    pub fn start(&self) -> Pose {
        self.spline.pose(0.0)
    }

    pub fn end(&self) -> Pose {
        self.spline.pose(1.0)
    }
}

impl std::fmt::Display for DriveSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "DriveSegment(start={}, end={}, backward={}, use_implement={}, stop_at_end={})",
            self.start(),
            self.end(),
            self.backward,
            self.use_implement,
            self.stop_at_end
        )
    }
}
