//! # Implements
//!
//! The work performing attachment of the robot, e.g. a weeding tool. During navigation the
//! implement supplies target points on the ground; the robot stops with the implement's working
//! point over each one and the implement's workflow is run.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod target_list;

pub use target_list::{TargetListImplement, WorkRecord};

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use async_trait::async_trait;
use nalgebra::Point2;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Default forward distance between the robot's reference point and the implement's working point.
///
/// Units: meters
pub const DEFAULT_WORK_X_M: f64 = 0.085;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A robot implement.
///
/// All methods take `&self` so an implement can be shared with the components feeding it targets.
#[async_trait]
pub trait Implement: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the implement can work while the robot keeps moving. The robot is then not
    /// stopped over its targets.
    fn supports_continuous_work(&self) -> bool {
        false
    }

    /// Forward offset of the working point from the robot's reference point.
    ///
    /// Units: meters
    fn work_x(&self) -> f64 {
        DEFAULT_WORK_X_M
    }

    /// Prepare for a navigation run, returning `false` if the implement cannot be used.
    async fn prepare(&self) -> Result<bool, ImplementError> {
        Ok(true)
    }

    async fn activate(&self) -> Result<(), ImplementError> {
        Ok(())
    }

    async fn deactivate(&self) -> Result<(), ImplementError> {
        Ok(())
    }

    /// Called once the navigation run is over, whatever its outcome.
    async fn finish(&self) -> Result<(), ImplementError> {
        Ok(())
    }

    /// The next point on the ground to work on, in the field frame.
    async fn get_target(&self) -> Result<Option<Point2<f64>>, ImplementError> {
        Ok(None)
    }

    /// Perform the work at the current target. The robot is stopped over it.
    async fn start_workflow(&self) -> Result<(), ImplementError> {
        Ok(())
    }

    /// Finish the work at the current target.
    async fn stop_workflow(&self) -> Result<(), ImplementError> {
        Ok(())
    }

    /// Whether the implement has work pending at the robot's position.
    fn has_plants_to_handle(&self) -> bool {
        false
    }

    /// Whether a workflow can be started. The navigation waits for this before every workflow.
    async fn is_ready(&self) -> bool;
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// An implement which does nothing, for navigating without an implement attached.
#[derive(Debug, Default)]
pub struct ImplementDummy;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ImplementError {
    #[error("The implement has no target to work on")]
    NoTarget,

    #[error("The implement's workflow failed: {0}")]
    WorkflowFailed(String),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

#[async_trait]
impl Implement for ImplementDummy {
    fn name(&self) -> &str {
        "None"
    }

    async fn is_ready(&self) -> bool {
        true
    }
}
