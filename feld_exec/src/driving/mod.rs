//! # Driving
//!
//! The actuator and pose interfaces navigation depends on, and the [`Driver`] which follows
//! splines with any pair of them.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod driver;
mod params;

pub use driver::*;
pub use params::DriveParams;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use async_trait::async_trait;

use crate::geometry::Pose;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A differential drive actuator.
#[async_trait]
pub trait Wheels: Send + Sync {
    /// Command the linear (m/s) and angular (rad/s) velocity of the robot.
    async fn drive(&self, linear: f64, angular: f64) -> Result<(), DriveError>;

    /// Command zero velocity.
    async fn stop(&self) -> Result<(), DriveError> {
        self.drive(0.0, 0.0).await
    }
}

/// Provides the current pose of the robot.
pub trait PoseProvider: Send + Sync {
    fn pose(&self) -> Pose;
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum DriveError {
    #[error("Demanded velocity is not finite (linear: {0} m/s, angular: {1} rad/s)")]
    NonFiniteDemand(f64, f64),

    #[error("The drive actuator rejected the command: {0}")]
    Rejected(String),
}
