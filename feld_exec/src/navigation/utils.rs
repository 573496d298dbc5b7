//! # Path geometry helpers

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::Point2;
use serde::Deserialize;

// Internal
use super::{DriveSegment, SegmentFlags};
use crate::geometry::{Pose, Spline};
use util::maths::sign;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Bounds used when looking for the first segment not yet behind the robot.
const TRIM_T_BOUNDS: (f64, f64) = (-0.1, 1.1);

/// Segments whose closest parameter to the robot exceeds this are considered driven.
const TRIM_T_DONE: f64 = 0.99;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Shape of a three point turn.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct TurnParams {
    /// Units: meters
    pub radius_m: f64,

    /// Row ends closer than this to the next row's start are treated as the same point.
    ///
    /// Units: meters
    pub same_row_threshold_m: f64,
}

impl Default for TurnParams {
    fn default() -> Self {
        Self {
            radius_m: 1.5,
            same_row_threshold_m: 0.01,
        }
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Extract the part of `spline` between `t_min` and `t_max` as a new spline.
///
/// The bounds may lie outside of [0, 1], the result then covers the extrapolated curve.
pub fn sub_spline(spline: &Spline, t_min: f64, t_max: f64) -> Spline {
    let (_, tail) = spline.split(t_min);

    // Rescale t_max into the tail's own parameterisation
    let s = if t_min != 1.0 {
        (t_max - t_min) / (1.0 - t_min)
    } else {
        0.0
    };

    let (head, _) = tail.split(s);
    head
}

/// Generate the three segments turning from the end of one row into the start of the next.
///
/// The first segment arcs out towards the next row, the second backs up (if required) to line
/// up with it, and the third drives into the row's start pose.
pub fn generate_three_point_turn(
    end_pose_current_row: &Pose,
    start_pose_next_row: &Pose,
    params: &TurnParams,
) -> Vec<DriveSegment> {
    let mut direction_to_start = end_pose_current_row.relative_direction(start_pose_next_row);
    if end_pose_current_row.distance(start_pose_next_row) < params.same_row_threshold_m {
        direction_to_start = std::f64::consts::FRAC_PI_2;
    }

    let radius = params.radius_m;
    let side = sign(direction_to_start);

    let first_turn_pose = end_pose_current_row.transform_pose(&Pose::new(
        radius,
        radius * side,
        direction_to_start,
    ));
    let back_up_pose = start_pose_next_row.transform_pose(&Pose::new(
        -radius,
        radius * side,
        -direction_to_start,
    ));

    let backward = first_turn_pose.relative_pose(&back_up_pose).x < 0.0;

    vec![
        DriveSegment::from_poses(
            end_pose_current_row,
            &first_turn_pose,
            SegmentFlags {
                stop_at_end: backward,
                ..Default::default()
            },
        ),
        DriveSegment::from_poses(
            &first_turn_pose,
            &back_up_pose,
            SegmentFlags {
                backward,
                stop_at_end: backward,
                ..Default::default()
            },
        ),
        DriveSegment::from_poses(&back_up_pose, start_pose_next_row, SegmentFlags::default()),
    ]
}

/// Drop the leading segments the robot has already driven past.
///
/// Returns the segments starting at the first one whose closest parameter to `robot` is not
/// essentially at its end.
pub fn remove_segments_behind_robot(segments: Vec<DriveSegment>, robot: &Pose) -> Vec<DriveSegment> {
    let robot_point: Point2<f64> = robot.point();

    let start_index = segments
        .iter()
        .position(|segment| {
            let t = segment.spline.closest_point_within(
                &robot_point,
                TRIM_T_BOUNDS.0,
                TRIM_T_BOUNDS.1,
            );
            t <= TRIM_T_DONE
        })
        .unwrap_or(0);

    segments.into_iter().skip(start_index).collect()
}
