//! # Target list implement

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use async_trait::async_trait;
use log::{debug, info};
use nalgebra::Point2;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

// Internal
use super::{Implement, ImplementError, DEFAULT_WORK_X_M};
use crate::driving::PoseProvider;
use crate::geometry::Pose;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// How far behind the working point a target may lie and still be worked on.
///
/// Units: meters
const PASSED_TARGET_TOLERANCE_M: f64 = 0.01;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// An implement working on a fixed queue of points, e.g. known plant positions.
///
/// The head of the queue is the current target. It is removed once its workflow has been
/// stopped. With a pose provider, targets the working point has already passed are skipped.
pub struct TargetListImplement {
    name: String,

    work_x_m: f64,

    continuous_work: bool,

    pose_provider: Option<Arc<dyn PoseProvider>>,

    inner: Mutex<TargetListState>,
}

/// A workflow performed by the implement.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct WorkRecord {
    pub target: Point2<f64>,

    /// Pose of the robot when the workflow started, if a pose provider was given.
    pub robot_pose: Option<Pose>,
}

#[derive(Default)]
struct TargetListState {
    targets: VecDeque<Point2<f64>>,

    in_workflow: bool,

    active: bool,

    work_log: Vec<WorkRecord>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl TargetListImplement {
    pub fn new<I: IntoIterator<Item = Point2<f64>>>(name: &str, targets: I) -> Self {
        Self {
            name: name.to_string(),
            work_x_m: DEFAULT_WORK_X_M,
            continuous_work: false,
            pose_provider: None,
            inner: Mutex::new(TargetListState {
                targets: targets.into_iter().collect(),
                ..Default::default()
            }),
        }
    }

    /// Record the robot's pose with every workflow.
    pub fn with_pose_provider(mut self, pose_provider: Arc<dyn PoseProvider>) -> Self {
        self.pose_provider = Some(pose_provider);
        self
    }

    pub fn with_work_x(mut self, work_x_m: f64) -> Self {
        self.work_x_m = work_x_m;
        self
    }

    /// Work on targets without the robot stopping.
    pub fn with_continuous_work(mut self, continuous_work: bool) -> Self {
        self.continuous_work = continuous_work;
        self
    }

    /// Append a target to the queue.
    pub fn push_target(&self, target: Point2<f64>) {
        self.lock().targets.push_back(target);
    }

    pub fn remaining_targets(&self) -> usize {
        self.lock().targets.len()
    }

    pub fn is_active(&self) -> bool {
        self.lock().active
    }

    /// The workflows performed so far, oldest first.
    pub fn work_log(&self) -> Vec<WorkRecord> {
        self.lock().work_log.clone()
    }

    fn lock(&self) -> MutexGuard<'_, TargetListState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Implement for TargetListImplement {
    fn name(&self) -> &str {
        &self.name
    }

    fn work_x(&self) -> f64 {
        self.work_x_m
    }

    fn supports_continuous_work(&self) -> bool {
        self.continuous_work
    }

    async fn activate(&self) -> Result<(), ImplementError> {
        let mut inner = self.lock();
        inner.active = true;
        info!("{} activated with {} targets", self.name, inner.targets.len());
        Ok(())
    }

    async fn deactivate(&self) -> Result<(), ImplementError> {
        self.lock().active = false;
        info!("{} deactivated", self.name);
        Ok(())
    }

    async fn get_target(&self) -> Result<Option<Point2<f64>>, ImplementError> {
        let robot_pose = self.pose_provider.as_ref().map(|p| p.pose());

        let mut inner = self.lock();
        if let (Some(pose), false) = (robot_pose, inner.in_workflow) {
            while let Some(target) = inner.targets.front().copied() {
                if pose.relative_point(&target).x >= self.work_x_m - PASSED_TARGET_TOLERANCE_M {
                    break;
                }

                info!(
                    "{} skipping ({:.3}, {:.3}), already passed",
                    self.name, target.x, target.y
                );
                inner.targets.pop_front();
            }
        }

        Ok(inner.targets.front().copied())
    }

    async fn start_workflow(&self) -> Result<(), ImplementError> {
        let robot_pose = self.pose_provider.as_ref().map(|p| p.pose());

        let mut inner = self.lock();
        let target = inner
            .targets
            .front()
            .copied()
            .ok_or(ImplementError::NoTarget)?;

        debug!("{} working on ({:.3}, {:.3})", self.name, target.x, target.y);

        inner.in_workflow = true;
        inner.work_log.push(WorkRecord { target, robot_pose });
        Ok(())
    }

    async fn stop_workflow(&self) -> Result<(), ImplementError> {
        let mut inner = self.lock();
        if inner.in_workflow {
            inner.in_workflow = false;
            inner.targets.pop_front();
        }
        Ok(())
    }

    fn has_plants_to_handle(&self) -> bool {
        !self.lock().targets.is_empty()
    }

    async fn is_ready(&self) -> bool {
        !self.lock().in_workflow
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn test_workflow_consumes_targets() {
        let imp = TargetListImplement::new("list", vec![Point2::new(1.0, 0.0), Point2::new(2.0, 0.0)]);

        assert_eq!(imp.get_target().await.unwrap(), Some(Point2::new(1.0, 0.0)));
        assert!(imp.has_plants_to_handle());

        imp.start_workflow().await.unwrap();
        assert!(!imp.is_ready().await);
        imp.stop_workflow().await.unwrap();
        assert!(imp.is_ready().await);

        assert_eq!(imp.get_target().await.unwrap(), Some(Point2::new(2.0, 0.0)));
        assert_eq!(imp.remaining_targets(), 1);
        assert_eq!(imp.work_log().len(), 1);
        assert!(imp.work_log()[0].robot_pose.is_none());

        // Stopping without a running workflow keeps the queue
        imp.stop_workflow().await.unwrap();
        assert_eq!(imp.remaining_targets(), 1);
    }

    struct FixedPose(Pose);

    impl PoseProvider for FixedPose {
        fn pose(&self) -> Pose {
            self.0
        }
    }

    #[tokio::test]
    async fn test_skips_passed_targets() {
        let imp = TargetListImplement::new(
            "list",
            vec![
                Point2::new(0.3, 0.0),
                Point2::new(0.58, 0.0),
                Point2::new(0.9, 0.0),
            ],
        )
        .with_pose_provider(Arc::new(FixedPose(Pose::new(0.5, 0.0, 0.0))));

        // 0.3 is behind the robot, 0.58 is just within the tolerance of the working point
        assert_eq!(imp.get_target().await.unwrap(), Some(Point2::new(0.58, 0.0)));
        assert_eq!(imp.remaining_targets(), 2);
        assert!(imp.work_log().is_empty());
    }

    #[tokio::test]
    async fn test_empty_list() {
        let imp = TargetListImplement::new("list", Vec::new());

        assert_eq!(imp.get_target().await.unwrap(), None);
        assert!(!imp.has_plants_to_handle());
        assert!(matches!(
            imp.start_workflow().await,
            Err(ImplementError::NoTarget)
        ));
    }
}
