//! Parameters structure for navigation

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

use super::LINEAR_SPEED_LIMIT;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters of the waypoint navigation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NavParams {
    /// Speed limit used until a backup is restored.
    ///
    /// Units: meters/second
    pub linear_speed_limit_ms: f64,

    /// Pause between two iterations of the run loop.
    ///
    /// Units: seconds
    pub iteration_pause_s: f64,

    /// Period at which the implement is polled for a target while driving.
    ///
    /// Units: seconds
    pub target_poll_period_s: f64,
}

impl Default for NavParams {
    fn default() -> Self {
        Self {
            linear_speed_limit_ms: LINEAR_SPEED_LIMIT,
            iteration_pause_s: 0.1,
            target_poll_period_s: 0.1,
        }
    }
}
