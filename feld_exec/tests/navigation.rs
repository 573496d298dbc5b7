//! Navigation runs against the simulated tracks.
//!
//! All tests run on a paused clock, so the simulated seconds pass as fast as the runtime can
//! process them.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use async_trait::async_trait;
use nalgebra::Point2;
use std::f64::consts::{FRAC_PI_2, PI};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use feld_lib::{
    driving::{DriveError, DriveParams, Driver, PoseProvider, Wheels},
    geometry::{Pose, PoseStep},
    hardware::{TracksSimParams, TracksSimulation},
    implement::{Implement, ImplementDummy, ImplementError, TargetListImplement},
    navigation::{
        DriveSegment, FixedPath, NavEvent, NavParams, NavState, PathGenerator, SegmentFlags,
        StraightLine, ThreePointTurn, TurnParams, WaypointNavigation,
    },
};

// ---------------------------------------------------------------------------
// HELPERS
// ---------------------------------------------------------------------------

struct Harness {
    nav: WaypointNavigation,
    sim: Arc<TracksSimulation>,
    events: mpsc::UnboundedReceiver<NavEvent>,
    sim_task: JoinHandle<()>,
}

impl Harness {
    fn new(
        sim_params: TracksSimParams,
        start: Pose,
        generator: Box<dyn PathGenerator>,
        implement: Arc<dyn Implement>,
    ) -> Self {
        let sim = Arc::new(TracksSimulation::new(sim_params));
        sim.set_pose(start);

        Self::with_sim(sim, generator, implement)
    }

    fn with_sim(
        sim: Arc<TracksSimulation>,
        generator: Box<dyn PathGenerator>,
        implement: Arc<dyn Implement>,
    ) -> Self {
        let sim_task = sim.spawn();

        let driver = Driver::new(sim.clone(), sim.clone(), DriveParams::default());
        let mut nav = WaypointNavigation::new(
            "test",
            implement,
            driver,
            sim.clone(),
            generator,
            NavParams::default(),
        );
        let events = nav.subscribe();

        Self {
            nav,
            sim,
            events,
            sim_task,
        }
    }

    fn instant(start: Pose, generator: Box<dyn PathGenerator>) -> Self {
        Self::new(
            TracksSimParams::without_acceleration(),
            start,
            generator,
            Arc::new(ImplementDummy),
        )
    }

    async fn run(&mut self) -> NavState {
        let state = self.nav.start().await;
        self.sim_task.abort();
        state
    }

    fn drain_events(&mut self) -> Vec<NavEvent> {
        let mut events = Vec::new();
        while let Ok(e) = self.events.try_recv() {
            events.push(e);
        }
        events
    }
}

fn straight_path(points: &[(f64, f64)]) -> Box<dyn PathGenerator> {
    let points: Vec<Point2<f64>> = points.iter().map(|&(x, y)| Point2::new(x, y)).collect();
    Box::new(FixedPath::through_points(&points))
}

fn assert_at(pose: Pose, x: f64, y: f64, tolerance: f64) {
    let error = pose.distance_to_point(&Point2::new(x, y));
    assert!(
        error < tolerance,
        "robot at {} is {:.4} m from ({}, {}), tolerance {}",
        pose,
        error,
        x,
        y,
        tolerance
    );
}

// ---------------------------------------------------------------------------
// TEST DOUBLES
// ---------------------------------------------------------------------------

/// Always offers the same target, and fails when asked to work on it.
#[derive(Default)]
struct FailingImplement {
    stop_workflow_calls: AtomicUsize,
    deactivate_calls: AtomicUsize,
}

#[async_trait]
impl Implement for FailingImplement {
    fn name(&self) -> &str {
        "failing"
    }

    async fn deactivate(&self) -> Result<(), ImplementError> {
        self.deactivate_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_target(&self) -> Result<Option<Point2<f64>>, ImplementError> {
        Ok(Some(Point2::new(0.5, 0.0)))
    }

    async fn start_workflow(&self) -> Result<(), ImplementError> {
        Err(ImplementError::WorkflowFailed("blade jammed".into()))
    }

    async fn stop_workflow(&self) -> Result<(), ImplementError> {
        self.stop_workflow_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn is_ready(&self) -> bool {
        true
    }
}

/// Offers a single target, recording the demanded speed when the work starts.
struct ObservingImplement {
    sim: Arc<TracksSimulation>,
    target: Mutex<Option<Point2<f64>>>,
    continuous: bool,
    ready_after_polls: usize,
    ready_polls: AtomicUsize,
    speed_at_work: Mutex<Option<f64>>,
}

impl ObservingImplement {
    fn new(sim: Arc<TracksSimulation>, continuous: bool, ready_after_polls: usize) -> Self {
        Self {
            sim,
            target: Mutex::new(Some(Point2::new(0.5, 0.0))),
            continuous,
            ready_after_polls,
            ready_polls: AtomicUsize::new(0),
            speed_at_work: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Implement for ObservingImplement {
    fn name(&self) -> &str {
        "observing"
    }

    fn supports_continuous_work(&self) -> bool {
        self.continuous
    }

    async fn get_target(&self) -> Result<Option<Point2<f64>>, ImplementError> {
        Ok(*self.target.lock().unwrap())
    }

    async fn start_workflow(&self) -> Result<(), ImplementError> {
        *self.speed_at_work.lock().unwrap() = Some(self.sim.state().linear_target_speed);
        Ok(())
    }

    async fn stop_workflow(&self) -> Result<(), ImplementError> {
        *self.target.lock().unwrap() = None;
        Ok(())
    }

    async fn is_ready(&self) -> bool {
        self.ready_polls.fetch_add(1, Ordering::SeqCst) + 1 >= self.ready_after_polls
    }
}

/// Wheels refusing every demand, on a robot which never moves.
struct RejectingWheels;

#[async_trait]
impl Wheels for RejectingWheels {
    async fn drive(&self, _linear: f64, _angular: f64) -> Result<(), DriveError> {
        Err(DriveError::Rejected("motors disabled".into()))
    }
}

impl PoseProvider for RejectingWheels {
    fn pose(&self) -> Pose {
        Pose::default()
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_stopping_at_different_distances() {
    for &distance in &[0.005, 0.01, 0.05, 0.1, 0.5, 1.0] {
        let mut h = Harness::instant(
            Pose::default(),
            straight_path(&[(0.0, 0.0), (distance, 0.0)]),
        );

        assert_eq!(h.run().await, NavState::Completed);
        assert_at(h.sim.pose(), distance, 0.0, 0.0015);
    }
}

#[tokio::test(start_paused = true)]
async fn test_stopping_with_acceleration() {
    for &distance in &[0.005, 0.1, 1.0] {
        let mut h = Harness::new(
            TracksSimParams::default(),
            Pose::default(),
            straight_path(&[(0.0, 0.0), (distance, 0.0)]),
            Arc::new(ImplementDummy),
        );

        assert_eq!(h.run().await, NavState::Completed);
        assert_at(h.sim.pose(), distance, 0.0, 0.005);
    }
}

#[tokio::test(start_paused = true)]
async fn test_driving_in_different_directions() {
    for &yaw in &[0.0, FRAC_PI_2, PI, -FRAC_PI_2, 0.7] {
        let start = Pose::new(1.0, -2.0, yaw);
        let end = start + PoseStep::linear(0.5);

        let mut h = Harness::instant(start, Box::new(StraightLine { length_m: 0.5 }));

        assert_eq!(h.run().await, NavState::Completed);
        assert_at(h.sim.pose(), end.x, end.y, 0.0015);
    }
}

#[tokio::test(start_paused = true)]
async fn test_start_in_between_waypoints() {
    for &offset in &[0.5, 0.2, 0.0, -0.5, -0.99] {
        let mut h = Harness::instant(
            Pose::new(offset, 0.0, 0.0),
            straight_path(&[(0.0, 0.0), (1.0, 0.0)]),
        );

        assert_eq!(h.run().await, NavState::Completed);
        assert_at(h.sim.pose(), 1.0, 0.0, 0.0015);
    }
}

#[tokio::test(start_paused = true)]
async fn test_start_on_end() {
    let end = Pose::new(1.0, 0.0, 0.0);
    let mut h = Harness::instant(end, straight_path(&[(0.0, 0.0), (1.0, 0.0)]));

    assert_eq!(h.run().await, NavState::Completed);
    assert_eq!(h.sim.pose(), end);

    let events = h.drain_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, NavEvent::SegmentStarted(_))));
    assert!(matches!(events.last(), Some(NavEvent::PathCompleted)));
}

#[tokio::test(start_paused = true)]
async fn test_skip_first_segment() {
    let points: Vec<Point2<f64>> = (0..5).map(|i| Point2::new(i as f64, 0.0)).collect();
    let generator = FixedPath::through_points(&points).trim_behind_robot(true);

    let mut h = Harness::instant(Pose::new(1.5, 0.0, 0.0), Box::new(generator));

    assert_eq!(h.run().await, NavState::Completed);
    assert_at(h.sim.pose(), 4.0, 0.0, 0.0015);

    match h.drain_events().first() {
        Some(NavEvent::PathGenerated(path)) => {
            assert_eq!(path.len(), 3);
            assert_at(path[0].end(), 2.0, 0.0, 1e-9);
        }
        e => panic!("expected the generated path first, got {:?}", e),
    }
}

#[tokio::test(start_paused = true)]
async fn test_slippage() {
    let mut h = Harness::instant(Pose::default(), Box::new(StraightLine { length_m: 2.0 }));
    h.sim.set_slip(0.0, 0.04);

    // Sample the lateral error while driving
    let sim = h.sim.clone();
    let max_error = Arc::new(Mutex::new(0.0f64));
    let max_error_writer = max_error.clone();
    let monitor = tokio::spawn(async move {
        loop {
            let y = sim.pose().y.abs();
            {
                let mut m = max_error_writer.lock().unwrap();
                *m = m.max(y);
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    });

    assert_eq!(h.run().await, NavState::Completed);
    monitor.abort();

    assert!(*max_error.lock().unwrap() < 0.05);
    assert_at(h.sim.pose(), 2.0, 0.0, 0.05);
}

#[tokio::test(start_paused = true)]
async fn test_three_point_turn() {
    let target = Pose::new(0.0, 1.0, PI);
    let mut h = Harness::instant(
        Pose::default(),
        Box::new(ThreePointTurn {
            target,
            params: TurnParams::default(),
        }),
    );

    assert_eq!(h.run().await, NavState::Completed);
    assert_at(h.sim.pose(), target.x, target.y, 0.1);

    let completed = h
        .drain_events()
        .into_iter()
        .filter(|e| matches!(e, NavEvent::SegmentCompleted(_)))
        .count();
    assert_eq!(completed, 3);
}

#[tokio::test(start_paused = true)]
async fn test_implement_workflow_along_straight_line() {
    let sim_params = TracksSimParams::without_acceleration();
    let sim = Arc::new(TracksSimulation::new(sim_params.clone()));
    let implement = Arc::new(
        TargetListImplement::new(
            "targets",
            vec![Point2::new(0.5, 0.01), Point2::new(0.8, -0.01)],
        )
        .with_pose_provider(sim.clone()),
    );

    let sim_task = sim.spawn();
    let driver = Driver::new(sim.clone(), sim.clone(), DriveParams::default());
    let mut nav = WaypointNavigation::new(
        "test",
        implement.clone(),
        driver,
        sim.clone(),
        Box::new(StraightLine { length_m: 1.0 }),
        NavParams::default(),
    );

    assert_eq!(nav.start().await, NavState::Completed);
    sim_task.abort();

    assert_eq!(implement.remaining_targets(), 0);
    assert!(!implement.is_active());

    let log = implement.work_log();
    assert_eq!(log.len(), 2);
    for (record, expected_x) in log.iter().zip(&[0.5 - 0.085, 0.8 - 0.085]) {
        let pose = record.robot_pose.unwrap();
        assert!(
            (pose.x - expected_x).abs() < 0.01,
            "worked on {:?} from {}",
            record.target,
            pose
        );
    }

    assert_at(sim.pose(), 1.0, 0.0, 0.0015);
}

#[tokio::test(start_paused = true)]
async fn test_event_order() {
    let mut h = Harness::instant(Pose::default(), Box::new(StraightLine { length_m: 0.3 }));

    assert_eq!(h.run().await, NavState::Completed);

    let events = h.drain_events();
    assert_eq!(events.len(), 4, "{:?}", events);
    assert!(matches!(&events[0], NavEvent::PathGenerated(p) if p.len() == 1));
    assert!(matches!(events[1], NavEvent::SegmentStarted(_)));
    assert!(matches!(events[2], NavEvent::SegmentCompleted(_)));
    assert!(matches!(events[3], NavEvent::PathCompleted));
}

#[tokio::test(start_paused = true)]
async fn test_faster_speed_limit_arrives_sooner() {
    let mut durations = Vec::new();

    for &limit in &[0.13, 0.26] {
        let mut h = Harness::instant(Pose::default(), Box::new(StraightLine { length_m: 1.0 }));
        h.nav.set_linear_speed_limit(limit).unwrap();

        let started = tokio::time::Instant::now();
        assert_eq!(h.run().await, NavState::Completed);
        durations.push(started.elapsed());

        assert_at(h.sim.pose(), 1.0, 0.0, 0.0015);
    }

    assert!(durations[1] < durations[0]);
}

#[tokio::test(start_paused = true)]
async fn test_failing_implement_cleans_up() {
    let implement = Arc::new(FailingImplement::default());
    let mut h = Harness::new(
        TracksSimParams::without_acceleration(),
        Pose::default(),
        Box::new(StraightLine { length_m: 1.0 }),
        implement.clone(),
    );

    assert_eq!(h.run().await, NavState::Failed);
    assert_eq!(h.nav.state(), NavState::Failed);

    assert_eq!(implement.stop_workflow_calls.load(Ordering::SeqCst), 1);
    assert_eq!(implement.deactivate_calls.load(Ordering::SeqCst), 1);

    // The robot stopped short of the target's work pose
    assert_at(h.sim.pose(), 0.5 - 0.085, 0.0, 0.01);
    assert_eq!(h.sim.state().linear_target_speed, 0.0);

    match h.drain_events().last() {
        Some(NavEvent::Failed(reason)) => assert!(reason.contains("blade jammed")),
        e => panic!("expected a failure, got {:?}", e),
    }
}

#[tokio::test(start_paused = true)]
async fn test_rejected_drive_fails() {
    let wheels = Arc::new(RejectingWheels);
    let driver = Driver::new(wheels.clone(), wheels.clone(), DriveParams::default());
    let mut nav = WaypointNavigation::new(
        "test",
        Arc::new(ImplementDummy),
        driver,
        wheels,
        Box::new(StraightLine { length_m: 1.0 }),
        NavParams::default(),
    );
    let mut events = nav.subscribe();

    assert_eq!(nav.start().await, NavState::Failed);

    let mut failure = None;
    while let Ok(e) = events.try_recv() {
        if let NavEvent::Failed(reason) = e {
            failure = Some(reason);
        }
    }
    assert!(failure.unwrap().contains("motors disabled"));
}

#[tokio::test(start_paused = true)]
async fn test_empty_path_fails() {
    let mut h = Harness::instant(Pose::default(), Box::new(StraightLine { length_m: 0.0 }));

    assert_eq!(h.run().await, NavState::Failed);
    assert!(!h.nav.has_waypoints());
    assert_eq!(h.sim.pose(), Pose::default());

    let events = h.drain_events();
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], NavEvent::Failed(r) if r.contains("Path generation failed")));
}

#[tokio::test(start_paused = true)]
async fn test_interrupt() {
    let mut h = Harness::instant(Pose::default(), Box::new(StraightLine { length_m: 1.0 }));

    let interrupt = h.nav.interrupt_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(2)).await;
        interrupt.interrupt();
    });

    assert_eq!(h.run().await, NavState::Failed);

    // Interrupted roughly 0.26 m into the line, and stopped there
    let x = h.sim.pose().x;
    assert!(x > 0.1 && x < 0.5, "interrupted at x = {}", x);
    assert_eq!(h.sim.state().linear_target_speed, 0.0);
}

#[tokio::test(start_paused = true)]
async fn test_custom_segments() {
    // An L shaped path, driving the second leg backwards
    let corner = Pose::new(1.0, 0.0, 0.0);
    let end = Pose::new(0.5, 0.0, 0.0);
    let path = vec![
        DriveSegment::from_poses(&Pose::default(), &corner, SegmentFlags::default()),
        DriveSegment::from_poses(
            &corner,
            &end,
            SegmentFlags {
                backward: true,
                ..Default::default()
            },
        ),
    ];

    let mut h = Harness::instant(Pose::default(), Box::new(FixedPath::new(path)));

    assert_eq!(h.run().await, NavState::Completed);
    assert_at(h.sim.pose(), 0.5, 0.0, 0.0015);
    assert!(h.sim.pose().yaw.abs() < 0.01);
}

#[tokio::test(start_paused = true)]
async fn test_passed_targets_are_skipped() {
    let sim = Arc::new(TracksSimulation::new(TracksSimParams::without_acceleration()));
    let implement = Arc::new(
        TargetListImplement::new("targets", vec![Point2::new(0.8, 0.0), Point2::new(0.5, 0.0)])
            .with_pose_provider(sim.clone()),
    );
    let mut h = Harness::with_sim(
        sim,
        Box::new(StraightLine { length_m: 1.0 }),
        implement.clone(),
    );

    assert_eq!(h.run().await, NavState::Completed);

    assert_eq!(implement.work_log().len(), 1);
    assert_eq!(implement.remaining_targets(), 0);
    assert_at(h.sim.pose(), 1.0, 0.0, 0.0015);
}

#[tokio::test(start_paused = true)]
async fn test_target_behind_robot_stops_at_segment_end() {
    // Without a pose provider the implement keeps offering the passed target
    let implement = Arc::new(TargetListImplement::new(
        "targets",
        vec![Point2::new(0.8, 0.0), Point2::new(0.5, 0.0)],
    ));
    let mut h = Harness::new(
        TracksSimParams::without_acceleration(),
        Pose::default(),
        Box::new(StraightLine { length_m: 1.0 }),
        implement.clone(),
    );

    let interrupt = h.nav.interrupt_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(60)).await;
        interrupt.interrupt();
    });

    assert_eq!(h.run().await, NavState::Completed);

    assert_eq!(implement.work_log().len(), 1);
    assert_eq!(implement.remaining_targets(), 1);

    let x = h.sim.pose().x;
    assert!(x > 0.99 && x < 1.03, "stopped at x = {}", x);
    assert_eq!(h.sim.state().linear_target_speed, 0.0);
}

#[tokio::test(start_paused = true)]
async fn test_workflow_waits_for_ready_implement() {
    let sim = Arc::new(TracksSimulation::new(TracksSimParams::without_acceleration()));
    let implement = Arc::new(ObservingImplement::new(sim.clone(), false, 3));
    let mut h = Harness::with_sim(
        sim,
        Box::new(StraightLine { length_m: 1.0 }),
        implement.clone(),
    );

    assert_eq!(h.run().await, NavState::Completed);

    assert_eq!(implement.ready_polls.load(Ordering::SeqCst), 3);
    assert_eq!(*implement.speed_at_work.lock().unwrap(), Some(0.0));
    assert_at(h.sim.pose(), 1.0, 0.0, 0.0015);
}

#[tokio::test(start_paused = true)]
async fn test_continuous_work_keeps_driving() {
    let sim = Arc::new(TracksSimulation::new(TracksSimParams::without_acceleration()));
    let implement = Arc::new(ObservingImplement::new(sim.clone(), true, 1));
    let mut h = Harness::with_sim(
        sim,
        Box::new(StraightLine { length_m: 1.0 }),
        implement.clone(),
    );

    assert_eq!(h.run().await, NavState::Completed);

    let speed = (*implement.speed_at_work.lock().unwrap()).unwrap();
    assert!(speed > 0.0, "stopped for the work ({} m/s)", speed);
    assert_at(h.sim.pose(), 1.0, 0.0, 0.0015);
}
