//! Parameters structure for the tracks simulation

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters of the simulated tracked drive.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TracksSimParams {
    /// Distance between the tracks.
    ///
    /// Units: meters
    pub width_m: f64,

    /// Maximum rate at which the linear velocity rises towards its target. Without a limit the
    /// velocity reaches the target in a single step.
    ///
    /// Units: meters/second^2
    pub linear_acceleration_mss: Option<f64>,

    /// Maximum rate at which the linear velocity falls towards its target.
    ///
    /// Units: meters/second^2
    pub linear_deceleration_mss: Option<f64>,

    /// Fraction of the velocity lost to drag each step.
    pub friction_factor: f64,

    /// Fraction of the left track's speed lost to slip.
    pub slip_factor_left: f64,

    /// Fraction of the right track's speed lost to slip.
    pub slip_factor_right: f64,

    /// Period of the simulation steps.
    ///
    /// Units: seconds
    pub step_period_s: f64,
}

impl TracksSimParams {
    /// Parameters with instant velocity changes.
    pub fn without_acceleration() -> Self {
        Self {
            linear_acceleration_mss: None,
            linear_deceleration_mss: None,
            ..Default::default()
        }
    }
}

impl Default for TracksSimParams {
    fn default() -> Self {
        Self {
            width_m: 0.5,
            linear_acceleration_mss: Some(2.0),
            linear_deceleration_mss: Some(0.5),
            friction_factor: 0.0,
            slip_factor_left: 0.0,
            slip_factor_right: 0.0,
            step_period_s: 0.01,
        }
    }
}
