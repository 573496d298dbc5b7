//! # Spline follower
//!
//! The driver follows a spline using pure pursuit: every control period the point `carrot_distance`
//! ahead of the robot's closest point on the spline is computed, and the robot is steered onto the
//! arc passing through it.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::trace;
use std::sync::Arc;
use std::time::Duration;

// Internal
use super::{DriveError, DriveParams, PoseProvider, Wheels};
use crate::geometry::{Pose, Spline};
use util::maths::{lin_map, sign};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Upper bound of the closest point search while following, allowing the robot to overshoot.
const FOLLOW_T_MAX: f64 = 1.2;

/// A spline is traversed once the robot's closest parameter is within this of 1.
const DONE_T_TOLERANCE: f64 = 1e-6;

/// Splines shorter than this are considered already traversed.
///
/// Units: meters
const MIN_SPLINE_LENGTH_M: f64 = 1e-9;

/// Lower bound on the control period.
///
/// Units: seconds
const MIN_CONTROL_PERIOD_S: f64 = 0.001;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Follows splines with a drive actuator, using a pose provider for feedback.
pub struct Driver {
    wheels: Arc<dyn Wheels>,
    pose_provider: Arc<dyn PoseProvider>,
    params: DriveParams,
}

/// How a single spline shall be driven.
#[derive(Debug, Clone, Copy)]
pub struct SplineDrive {
    /// Drive backwards along the spline.
    pub flip_hook: bool,

    /// Slow down when approaching the end of the spline.
    pub throttle_at_end: bool,

    /// Stop the wheels once the end is reached. Otherwise the last demand is kept.
    pub stop_at_end: bool,

    /// Units: meters/second
    pub linear_speed_limit: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SplineDrive {
    /// Forward drive, throttling and stopping at the end.
    pub fn new(linear_speed_limit: f64) -> Self {
        Self {
            flip_hook: false,
            throttle_at_end: true,
            stop_at_end: true,
            linear_speed_limit,
        }
    }
}

impl Driver {
    pub fn new(
        wheels: Arc<dyn Wheels>,
        pose_provider: Arc<dyn PoseProvider>,
        params: DriveParams,
    ) -> Self {
        Self {
            wheels,
            pose_provider,
            params,
        }
    }

    pub fn params(&self) -> &DriveParams {
        &self.params
    }

    /// Follow `spline` until the robot has passed its end.
    ///
    /// The future may be dropped at any point, in which case the wheels keep the last demand.
    pub async fn drive_spline(&self, spline: &Spline, drive: SplineDrive) -> Result<(), DriveError> {
        let speed_limit = drive
            .linear_speed_limit
            .min(self.params.linear_speed_limit_ms)
            .max(0.0);
        let period =
            Duration::from_secs_f64(self.params.control_period_s.max(MIN_CONTROL_PERIOD_S));

        trace!(
            "Driving spline from {:?} to {:?} at {:.3} m/s ({:?})",
            spline.start,
            spline.end,
            speed_limit,
            drive
        );

        if spline.estimated_length() > MIN_SPLINE_LENGTH_M {
            loop {
                let pose = self.pose_provider.pose();
                let t = spline.closest_point_within(&pose.point(), 0.0, FOLLOW_T_MAX);
                if t >= 1.0 - DONE_T_TOLERANCE {
                    break;
                }

                let (linear, angular) = self.pursuit_demand(spline, &pose, t, &drive, speed_limit);
                self.wheels.drive(linear, angular).await?;

                tokio::time::sleep(period).await;
            }
        }

        if drive.stop_at_end {
            self.wheels.stop().await?;
        }

        Ok(())
    }

    /// Stop the wheels.
    pub async fn stop(&self) -> Result<(), DriveError> {
        self.wheels.stop().await
    }

    /// Compute the (linear, angular) velocity demand steering the robot back onto the spline.
    fn pursuit_demand(
        &self,
        spline: &Spline,
        pose: &Pose,
        t: f64,
        drive: &SplineDrive,
        speed_limit: f64,
    ) -> (f64, f64) {
        let carrot = spline.point_ahead(t, self.params.carrot_distance_m);

        // Curvature in the frame facing the direction of travel
        let travel_yaw = if drive.flip_hook {
            pose.yaw + std::f64::consts::PI
        } else {
            pose.yaw
        };
        let local = Pose::new(pose.x, pose.y, travel_yaw).relative_point(&carrot);
        let lookahead_sq = local.coords.norm_squared();
        let curvature = if lookahead_sq > 1e-12 {
            2.0 * local.y / lookahead_sq
        } else {
            0.0
        };

        let mut speed = speed_limit;
        if drive.throttle_at_end {
            let throttle_dist = self.params.throttle_at_end_distance_m;
            let remaining = spline.split(t).1.estimated_length();

            if remaining < throttle_dist {
                let min_speed = self.params.throttle_at_end_min_speed_ms.min(speed_limit);
                speed = lin_map((0.0, throttle_dist), (0.0, speed_limit), remaining).max(min_speed);
            }
        }

        // Clamp the turn rate, slowing down to keep the curvature
        let mut angular = speed * curvature;
        let angular_limit = self.params.angular_speed_limit_rads;
        if angular.abs() > angular_limit {
            speed *= angular_limit / angular.abs();
            angular = angular_limit * sign(angular);
        }

        if drive.flip_hook {
            (-speed, angular)
        } else {
            (speed, angular)
        }
    }
}
