//! # Waypoint navigation
//!
//! Drives the robot along a path of [`DriveSegment`]s while letting the implement interrupt the
//! drive whenever it reports a target on the current segment.
//!
//! A run goes through the following states:
//!
//! ```text
//! Idle -> Preparing -> Running -> Completed
//!                  \          \-> Failed
//!                   \-----------> Failed
//! ```
//!
//! Whatever the outcome, a run ends with the cleanup sequence: stop a pending workflow, finish the
//! implement, finish the navigation, deactivate the implement and stop the wheels.
//!
//! Each iteration of the run loop either races "drive to the end of the segment" against "wait
//! for an implement target", or drives up to the target and runs the implement's workflow on it.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod drive_segment;
mod events;
mod generators;
mod params;
mod utils;

pub use drive_segment::{DriveSegment, SegmentFlags};
pub use events::{NavEvent, NavInterrupt};
pub use generators::*;
pub use params::NavParams;
pub use utils::*;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, error, info, warn};
use nalgebra::Point2;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

// Internal
use crate::driving::{DriveError, Driver, PoseProvider, SplineDrive};
use crate::geometry::{Pose, PoseStep, Spline};
use crate::implement::{Implement, ImplementError};
use util::logger;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Default linear speed limit while navigating.
///
/// Units: meters/second
pub const LINEAR_SPEED_LIMIT: f64 = 0.13;

/// Search bounds for implement targets, allowing them to lie slightly off the segment's ends.
const TARGET_T_BOUNDS: (f64, f64) = (-0.2, 1.2);

/// Increment of the advance distance when searching for a resolvable advance.
///
/// Units: meters
const ADVANCE_STEP_M: f64 = 0.00001;

/// Number of increments tried before driving the rest of the segment instead.
const MAX_ADVANCE_STEPS: usize = 20_000;

/// The robot is at the end of a segment once its closest parameter is within this of 1.
const SEGMENT_END_T_TOLERANCE: f64 = 1e-6;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Navigation along a generated path of drive segments.
pub struct WaypointNavigation {
    name: String,

    implement: Arc<dyn Implement>,

    driver: Driver,

    pose_provider: Arc<dyn PoseProvider>,

    generator: Box<dyn PathGenerator>,

    params: NavParams,

    /// The segments still to drive, the front one is the current segment.
    path: VecDeque<DriveSegment>,

    linear_speed_limit: f64,

    state: NavState,

    subscribers: Vec<mpsc::UnboundedSender<NavEvent>>,

    interrupt: Arc<Notify>,

    /// A workflow has been started but not yet stopped.
    workflow_pending: bool,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NavState {
    /// No run has been started.
    Idle,

    /// Generating the path and preparing the implement.
    Preparing,

    /// Driving the path.
    Running,

    /// All segments have been driven.
    Completed,

    /// Preparation failed, an error occured or the run was interrupted.
    Failed,
}

/// Errors ending a navigation run.
#[derive(Debug, thiserror::Error)]
pub enum NavError {
    #[error("Path generation failed")]
    PathGenerationFailed,

    #[error("Implement preparation failed")]
    ImplementPreparationFailed,

    #[error("Implement error: {0}")]
    Implement(#[from] ImplementError),

    #[error("Drive error: {0}")]
    Drive(#[from] DriveError),

    #[error("The navigation was interrupted")]
    Interrupted,

    #[error("Invalid linear speed limit: {0} m/s")]
    InvalidSpeedLimit(f64),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl NavState {
    pub fn as_str(&self) -> &'static str {
        match self {
            NavState::Idle => "idle",
            NavState::Preparing => "preparing",
            NavState::Running => "running",
            NavState::Completed => "completed",
            NavState::Failed => "failed",
        }
    }
}

impl WaypointNavigation {
    pub fn new(
        name: &str,
        implement: Arc<dyn Implement>,
        driver: Driver,
        pose_provider: Arc<dyn PoseProvider>,
        generator: Box<dyn PathGenerator>,
        params: NavParams,
    ) -> Self {
        Self {
            name: name.to_string(),
            implement,
            driver,
            pose_provider,
            generator,
            linear_speed_limit: params.linear_speed_limit_ms,
            params,
            path: VecDeque::new(),
            state: NavState::Idle,
            subscribers: Vec::new(),
            interrupt: Arc::new(Notify::new()),
            workflow_pending: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> NavState {
        self.state
    }

    /// The segments still to be driven.
    pub fn path(&self) -> &VecDeque<DriveSegment> {
        &self.path
    }

    pub fn current_segment(&self) -> Option<&DriveSegment> {
        self.path.front()
    }

    /// Whether there are segments left to drive.
    pub fn has_waypoints(&self) -> bool {
        !self.path.is_empty()
    }

    /// Units: meters/second
    pub fn linear_speed_limit(&self) -> f64 {
        self.linear_speed_limit
    }

    /// Set the linear speed limit, which must be finite and positive.
    pub fn set_linear_speed_limit(&mut self, linear_speed_limit: f64) -> Result<(), NavError> {
        if !is_valid_speed_limit(linear_speed_limit) {
            return Err(NavError::InvalidSpeedLimit(linear_speed_limit));
        }

        self.linear_speed_limit = linear_speed_limit;
        Ok(())
    }

    /// Replace the navigation strategy used by the next run.
    pub fn set_generator(&mut self, generator: Box<dyn PathGenerator>) {
        self.generator = generator;
    }

    /// Receive all events emitted from now on.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<NavEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn interrupt_handle(&self) -> NavInterrupt {
        NavInterrupt::new(self.interrupt.clone())
    }

    /// The persistent state of the navigation.
    pub fn backup(&self) -> Value {
        json!({
            "linear_speed_limit": self.linear_speed_limit,
        })
    }

    /// Restore the state saved by [`Self::backup`].
    ///
    /// Missing or invalid values fall back to [`LINEAR_SPEED_LIMIT`].
    pub fn restore(&mut self, data: &Value) {
        self.linear_speed_limit = data
            .get("linear_speed_limit")
            .and_then(Value::as_f64)
            .filter(|v| is_valid_speed_limit(*v))
            .unwrap_or_else(|| {
                warn!(
                    "No valid linear speed limit in the backup, using {} m/s",
                    LINEAR_SPEED_LIMIT
                );
                LINEAR_SPEED_LIMIT
            });
    }

    /// Generate a new path from the robot's current pose.
    pub fn prepare(&mut self) -> Result<(), NavError> {
        let pose = self.pose_provider.pose();
        self.path = self.generator.generate(&pose).into();

        if self.path.is_empty() {
            return Err(NavError::PathGenerationFailed);
        }

        debug!("Generated a path of {} segments from {}", self.path.len(), pose);
        Ok(())
    }

    /// Run the navigation until the path is completed, it fails or it is interrupted.
    ///
    /// Returns the final state, either [`NavState::Completed`] or [`NavState::Failed`].
    pub async fn start(&mut self) -> NavState {
        let interrupt = self.interrupt.clone();

        let result = tokio::select! {
            res = self.run() => res,
            _ = interrupt.notified() => Err(NavError::Interrupted),
        };

        match result {
            Ok(()) => {
                info!("{} completed", self.name);
                self.set_state(NavState::Completed);
            }
            Err(e) => {
                error!("{} failed: {}", self.name, e);
                self.set_state(NavState::Failed);
                self.emit(NavEvent::Failed(e.to_string()));
            }
        }

        self.cleanup().await;

        self.state
    }

    /// Executed after every run.
    pub fn finish(&mut self) {
        debug!("Navigation finished");
        self.path.shrink_to_fit();
    }

    /// Drop the leading segments the robot has already driven past.
    pub fn remove_segments_behind_robot(&self, segments: Vec<DriveSegment>) -> Vec<DriveSegment> {
        remove_segments_behind_robot(segments, &self.pose_provider.pose())
    }

    /// Drive along the current segment until the implement's working point is over `target`.
    ///
    /// Returns `false` if the target cannot be reached from the robot's position. The robot is
    /// then advanced by a small distance so that the caller can try again, or, with no distance
    /// left, driven to the end of the segment and stopped.
    pub async fn follow_segment_until(&self, target: &Point2<f64>) -> Result<bool, NavError> {
        let segment = match self.current_segment() {
            Some(s) => s,
            None => return Ok(false),
        };
        let spline = &segment.spline;
        let min_distance = self.driver.params().minimum_drive_distance_m;

        let pose = self.pose_provider.pose();
        let current_t = spline.closest_point(&pose.point());
        let work_pose = self.work_x_corrected_pose(segment, target);
        let distance_to_target = pose.distance(&work_pose);
        let target_t =
            spline.closest_point_within(&work_pose.point(), TARGET_T_BOUNDS.0, TARGET_T_BOUNDS.1);

        if distance_to_target.abs() < min_distance {
            debug!(
                "Target close, working without advancing ({:.6} m)",
                distance_to_target
            );
            return Ok(true);
        }

        if target_t < current_t || target_t > 1.0 {
            let (advance, drive) = match self.advance_spline(spline, &pose, current_t, segment.backward) {
                Some(advance_spline) => {
                    debug!(
                        "Target behind robot, continuing for {:.6} m",
                        advance_spline.estimated_length()
                    );
                    (
                        advance_spline,
                        SplineDrive {
                            flip_hook: segment.backward,
                            throttle_at_end: false,
                            stop_at_end: false,
                            linear_speed_limit: self.linear_speed_limit,
                        },
                    )
                }
                None => {
                    debug!("Target behind robot and no advance left, driving to the segment end");
                    (
                        sub_spline(spline, current_t.min(1.0), 1.0),
                        SplineDrive {
                            flip_hook: segment.backward,
                            ..SplineDrive::new(self.linear_speed_limit)
                        },
                    )
                }
            };

            self.driver.drive_spline(&advance, drive).await?;
            return Ok(false);
        }

        debug!(
            "Driving to {} for target ({:.3}, {:.3})",
            work_pose, target.x, target.y
        );
        let continuous = self.implement.supports_continuous_work();
        let target_spline = sub_spline(spline, current_t, target_t);
        self.driver
            .drive_spline(
                &target_spline,
                SplineDrive {
                    flip_hook: segment.backward,
                    throttle_at_end: !continuous,
                    stop_at_end: !continuous,
                    linear_speed_limit: self.linear_speed_limit,
                },
            )
            .await?;

        Ok(true)
    }

    async fn run(&mut self) -> Result<(), NavError> {
        self.set_state(NavState::Preparing);

        self.prepare()?;
        if !self.implement.prepare().await? {
            return Err(NavError::ImplementPreparationFailed);
        }
        self.implement.activate().await?;

        self.set_state(NavState::Running);
        info!(
            "{} started with implement {}",
            self.name,
            self.implement.name()
        );

        self.emit(NavEvent::PathGenerated(self.path.iter().cloned().collect()));
        if let Some(segment) = self.current_segment().cloned() {
            self.emit(NavEvent::SegmentStarted(segment));
        }

        let pause = secs(self.params.iteration_pause_s);
        while self.has_waypoints() {
            self.run_once().await?;
            tokio::time::sleep(pause).await;
        }

        self.emit(NavEvent::PathCompleted);
        Ok(())
    }

    /// One iteration of the run loop.
    async fn run_once(&mut self) -> Result<(), NavError> {
        if self.valid_implement_target().await?.is_none() {
            debug!("No implement target found, continuing along the segment");

            // The losing branch is dropped, segment bookkeeping only happens afterwards
            let segment_completed = {
                let this = &*self;
                tokio::select! {
                    biased;
                    res = this.drive_along_segment() => {
                        res?;
                        true
                    }
                    res = this.block_until_implement_has_target() => {
                        res?;
                        false
                    }
                }
            };

            if segment_completed {
                self.complete_segment();
            }
        }

        let use_implement = match self.current_segment() {
            Some(segment) => segment.use_implement,
            None => return Ok(()),
        };
        if !use_implement {
            return Ok(());
        }

        let target = match self.valid_implement_target().await? {
            Some(t) => t,
            None => {
                debug!("Implement has no target anymore, possibly overshot");
                return Ok(());
            }
        };

        if !self.follow_segment_until(&target).await? {
            // A target left behind at the very end can never be reached
            if self.robot_at_segment_end() {
                debug!("Segment end reached while advancing past a target");
                self.complete_segment();
            }
            return Ok(());
        }

        if !self.implement.supports_continuous_work() {
            self.driver.stop().await?;
        }
        debug!(
            "Implement has plants to handle: {}",
            self.implement.has_plants_to_handle()
        );
        self.wait_for_implement_ready().await;

        self.workflow_pending = true;
        self.implement.start_workflow().await?;
        self.implement.stop_workflow().await?;
        self.workflow_pending = false;

        Ok(())
    }

    /// Drive the current segment to its end.
    async fn drive_along_segment(&self) -> Result<(), NavError> {
        let segment = match self.current_segment() {
            Some(s) => s,
            None => return Ok(()),
        };

        let stop_at_end = segment.stop_at_end || self.path.len() == 1;

        self.driver
            .drive_spline(
                &segment.spline,
                SplineDrive {
                    flip_hook: segment.backward,
                    throttle_at_end: stop_at_end,
                    stop_at_end,
                    linear_speed_limit: self.linear_speed_limit,
                },
            )
            .await?;

        Ok(())
    }

    /// Pop the current segment and announce the next one.
    fn complete_segment(&mut self) {
        if let Some(segment) = self.path.pop_front() {
            debug!("Segment completed: {}", segment);
            self.emit(NavEvent::SegmentCompleted(segment));

            if let Some(next) = self.path.front().cloned() {
                self.emit(NavEvent::SegmentStarted(next));
            }
        }
    }

    async fn wait_for_implement_ready(&self) {
        let period = secs(self.params.target_poll_period_s);

        while !self.implement.is_ready().await {
            debug!("Waiting for {} to get ready", self.implement.name());
            tokio::time::sleep(period).await;
        }
    }

    /// Whether the robot is at or beyond the end of the current segment.
    fn robot_at_segment_end(&self) -> bool {
        match self.current_segment() {
            Some(segment) => {
                let pose = self.pose_provider.pose();
                segment.spline.closest_point(&pose.point()) >= 1.0 - SEGMENT_END_T_TOLERANCE
            }
            None => false,
        }
    }

    async fn block_until_implement_has_target(&self) -> Result<Point2<f64>, NavError> {
        let period = secs(self.params.target_poll_period_s);

        loop {
            if let Some(target) = self.valid_implement_target().await? {
                return Ok(target);
            }
            tokio::time::sleep(period).await;
        }
    }

    /// The implement's target, if it lies genuinely along the current segment.
    async fn valid_implement_target(&self) -> Result<Option<Point2<f64>>, NavError> {
        let segment = match self.current_segment() {
            Some(s) if s.use_implement => s,
            _ => return Ok(None),
        };

        let target = match self.implement.get_target().await? {
            Some(t) => t,
            None => return Ok(None),
        };

        // The closest point search returns the bounds exactly when the point lies beyond them
        let spline = &segment.spline;
        let t = spline.closest_point(&target);
        if t == 0.0 || t == 1.0 {
            debug!("Target is on segment end, continuing...");
            return Ok(None);
        }

        let work_pose = self.work_x_corrected_pose(segment, &target);
        let distance_to_target = self.pose_provider.pose().distance(&work_pose);
        let t = spline.closest_point(&work_pose.point());
        if (t == 0.0 || t == 1.0)
            && distance_to_target.abs() > self.driver.params().minimum_drive_distance_m
        {
            debug!("Work-x corrected target is on segment end, continuing...");
            return Ok(None);
        }

        Ok(Some(target))
    }

    /// Pose the robot must take on the segment for the implement to work on `target`.
    fn work_x_corrected_pose(&self, segment: &DriveSegment, target: &Point2<f64>) -> Pose {
        let spline = &segment.spline;
        let target_t = spline.closest_point_within(target, TARGET_T_BOUNDS.0, TARGET_T_BOUNDS.1);

        spline.pose(target_t) + PoseStep::linear(-self.implement.work_x())
    }

    /// The shortest piece of `spline` ahead of the robot which the drive can still resolve, or
    /// `None` if the rest of the segment is too short for one.
    fn advance_spline(
        &self,
        spline: &Spline,
        pose: &Pose,
        current_t: f64,
        backward: bool,
    ) -> Option<Spline> {
        let min_distance = self.driver.params().minimum_drive_distance_m;
        let direction = if backward { -1.0 } else { 1.0 };
        let mut advance_distance = min_distance;

        if current_t >= 1.0 {
            return None;
        }

        for _ in 0..MAX_ADVANCE_STEPS {
            let ahead = *pose + PoseStep::linear(direction * advance_distance);
            let ahead_t = spline.closest_point(&ahead.point());
            let candidate = sub_spline(spline, current_t, ahead_t);

            if candidate.estimated_length() > min_distance {
                return Some(candidate);
            }
            advance_distance += ADVANCE_STEP_M;
        }

        warn!("No advance within {:.3} m found", advance_distance);
        None
    }

    async fn cleanup(&mut self) {
        if self.workflow_pending {
            if let Err(e) = self.implement.stop_workflow().await {
                warn!("Could not stop the implement's workflow: {}", e);
            }
            self.workflow_pending = false;
        }

        if let Err(e) = self.implement.finish().await {
            warn!("Could not finish the implement: {}", e);
        }

        self.finish();

        if let Err(e) = self.implement.deactivate().await {
            warn!("Could not deactivate the implement: {}", e);
        }

        if let Err(e) = self.driver.stop().await {
            error!("Could not stop the wheels: {}", e);
        }
    }

    fn set_state(&mut self, state: NavState) {
        debug!("{}: {:?} -> {:?}", self.name, self.state, state);
        self.state = state;
        logger::set_phase(state.as_str());
    }

    /// Send an event to all subscribers, dropping those which have gone away.
    fn emit(&mut self, event: NavEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn is_valid_speed_limit(linear_speed_limit: f64) -> bool {
    linear_speed_limit.is_finite() && linear_speed_limit > 0.0
}

fn secs(seconds: f64) -> Duration {
    Duration::from_secs_f64(seconds.max(0.0))
}
