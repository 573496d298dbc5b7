//! # Navigation events and interruption

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::sync::Arc;
use tokio::sync::Notify;

// Internal
use super::DriveSegment;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Progress notifications of a navigation run.
///
/// Every subscriber receives every event exactly once, in the order they occured.
#[derive(Debug, Clone, PartialEq)]
pub enum NavEvent {
    /// A new path has been generated.
    PathGenerated(Vec<DriveSegment>),

    /// Driving of a segment has started.
    SegmentStarted(DriveSegment),

    /// A segment has been driven to its end and removed from the path.
    SegmentCompleted(DriveSegment),

    /// The entire path has been completed.
    PathCompleted,

    /// The run failed, with the reason.
    Failed(String),
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Handle used to interrupt a navigation run from another task.
///
/// An interrupt requested while no run is in progress ends the next run as soon as it starts.
#[derive(Clone, Debug)]
pub struct NavInterrupt {
    notify: Arc<Notify>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl NavInterrupt {
    pub(crate) fn new(notify: Arc<Notify>) -> Self {
        Self { notify }
    }

    /// Request the run to stop. The navigation's cleanup still runs.
    pub fn interrupt(&self) {
        self.notify.notify_one();
    }
}
