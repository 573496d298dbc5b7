//! Parameters structure for the Driver

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for spline following.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DriveParams {
    /// Upper bound on the linear speed, whatever the caller requests.
    ///
    /// Units: meters/second
    pub linear_speed_limit_ms: f64,

    /// Units: radians/second
    pub angular_speed_limit_rads: f64,

    /// Distance ahead of the robot's closest point on the spline at which the pursuit point is
    /// placed.
    ///
    /// Units: meters
    pub carrot_distance_m: f64,

    /// Distances below this cannot be resolved by the drive and are treated as reached.
    ///
    /// Units: meters
    pub minimum_drive_distance_m: f64,

    /// Distance before the end of a spline at which throttling starts.
    ///
    /// Units: meters
    pub throttle_at_end_distance_m: f64,

    /// Units: meters/second
    pub throttle_at_end_min_speed_ms: f64,

    /// Units: seconds
    pub control_period_s: f64,
}

impl Default for DriveParams {
    fn default() -> Self {
        Self {
            linear_speed_limit_ms: 0.3,
            angular_speed_limit_rads: 0.5,
            carrot_distance_m: 0.2,
            minimum_drive_distance_m: 0.005,
            throttle_at_end_distance_m: 0.1,
            throttle_at_end_min_speed_ms: 0.05,
            control_period_s: 0.01,
        }
    }
}
