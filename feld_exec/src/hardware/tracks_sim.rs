//! # Tracks simulation
//!
//! A differential drive integrated at a fixed step. Velocities ramp towards their targets with
//! asymmetric acceleration and deceleration limits, decay with friction, and each track may slip.
//! The angular limits follow from the linear ones as `2 * a / width`.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use async_trait::async_trait;
use log::{debug, info};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

// Internal
use super::TracksSimParams;
use crate::driving::{DriveError, PoseProvider, Wheels};
use crate::geometry::{Pose, PoseStep};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Number of velocity measurements buffered for slow subscribers.
const VELOCITY_CHANNEL_CAPACITY: usize = 128;

/// Units: seconds
const MIN_STEP_PERIOD_S: f64 = 0.001;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A velocity measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Velocity {
    /// Units: meters/second
    pub linear: f64,

    /// Units: radians/second
    pub angular: f64,

    /// Simulation time of the measurement.
    ///
    /// Units: seconds
    pub time: f64,
}

/// Snapshot of the simulated drive.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct TracksState {
    pub pose: Pose,

    pub linear_velocity: f64,

    pub angular_velocity: f64,

    pub linear_target_speed: f64,

    pub angular_target_speed: f64,

    pub friction_factor: f64,

    pub slip_factor_left: f64,

    pub slip_factor_right: f64,

    /// E-stop or bumper active, all motion is prevented.
    pub is_blocking: bool,

    /// Accumulated simulation time.
    ///
    /// Units: seconds
    pub time: f64,
}

/// Simulated tracked drive, acting as both the drive actuator and the pose provider.
pub struct TracksSimulation {
    params: TracksSimParams,

    state: Mutex<TracksState>,

    velocity_tx: broadcast::Sender<Velocity>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl TracksSimulation {
    pub fn new(params: TracksSimParams) -> Self {
        let (velocity_tx, _) = broadcast::channel(VELOCITY_CHANNEL_CAPACITY);

        let state = TracksState {
            friction_factor: params.friction_factor,
            slip_factor_left: params.slip_factor_left,
            slip_factor_right: params.slip_factor_right,
            ..Default::default()
        };

        Self {
            params,
            state: Mutex::new(state),
            velocity_tx,
        }
    }

    /// Run the simulation in its own task, stepping at the configured period.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let sim = Arc::clone(self);
        let period_s = sim.params.step_period_s.max(MIN_STEP_PERIOD_S);

        info!("Tracks simulation running at {:.0} Hz", 1.0 / period_s);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs_f64(period_s));
            loop {
                interval.tick().await;
                sim.step(period_s);
            }
        })
    }

    /// Maximum angular acceleration, derived from the linear one.
    ///
    /// Units: radians/second^2
    pub fn angular_acceleration(&self) -> Option<f64> {
        self.params
            .linear_acceleration_mss
            .map(|a| 2.0 * a / self.params.width_m)
    }

    /// Maximum angular deceleration, derived from the linear one.
    ///
    /// Units: radians/second^2
    pub fn angular_deceleration(&self) -> Option<f64> {
        self.params
            .linear_deceleration_mss
            .map(|a| 2.0 * a / self.params.width_m)
    }

    /// Advance the simulation by `dt` seconds.
    pub fn step(&self, dt: f64) {
        if !(dt > 0.0) {
            return;
        }

        let width = self.params.width_m;
        let angular_acceleration = self.angular_acceleration();
        let angular_deceleration = self.angular_deceleration();

        let velocity = {
            let mut s = self.lock();

            if s.is_blocking {
                s.linear_velocity = 0.0;
                s.angular_velocity = 0.0;
                s.linear_target_speed = 0.0;
                s.angular_target_speed = 0.0;
            } else {
                s.linear_velocity = ramp(
                    s.linear_velocity,
                    s.linear_target_speed,
                    self.params.linear_acceleration_mss,
                    self.params.linear_deceleration_mss,
                    dt,
                );
                s.angular_velocity = ramp(
                    s.angular_velocity,
                    s.angular_target_speed,
                    angular_acceleration,
                    angular_deceleration,
                    dt,
                );
            }

            s.linear_velocity *= 1.0 - s.friction_factor;
            s.angular_velocity *= 1.0 - s.friction_factor;

            let left_speed =
                (s.linear_velocity - s.angular_velocity * width / 2.0) * (1.0 - s.slip_factor_left);
            let right_speed = (s.linear_velocity + s.angular_velocity * width / 2.0)
                * (1.0 - s.slip_factor_right);

            s.time += dt;
            let velocity = Velocity {
                linear: s.linear_velocity,
                angular: s.angular_velocity,
                time: s.time,
            };

            s.pose += PoseStep {
                linear: dt * (left_speed + right_speed) / 2.0,
                angular: dt * (right_speed - left_speed) / width,
                time: dt,
            };

            velocity
        };

        // Having no subscribers is not an error
        self.velocity_tx.send(velocity).ok();
    }

    pub fn state(&self) -> TracksState {
        *self.lock()
    }

    /// Place the robot at `pose`, keeping its velocities.
    pub fn set_pose(&self, pose: Pose) {
        debug!("Simulated robot moved to {}", pose);
        self.lock().pose = pose;
    }

    /// Engage or release the e-stop/bumper block.
    pub fn set_blocking(&self, blocking: bool) {
        self.lock().is_blocking = blocking;
    }

    pub fn set_slip(&self, left: f64, right: f64) {
        let mut s = self.lock();
        s.slip_factor_left = left;
        s.slip_factor_right = right;
    }

    pub fn set_friction(&self, friction_factor: f64) {
        self.lock().friction_factor = friction_factor;
    }

    /// Subscribe to the velocity measured at every step.
    pub fn subscribe_velocity(&self) -> broadcast::Receiver<Velocity> {
        self.velocity_tx.subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, TracksState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Wheels for TracksSimulation {
    async fn drive(&self, linear: f64, angular: f64) -> Result<(), DriveError> {
        if !linear.is_finite() || !angular.is_finite() {
            return Err(DriveError::NonFiniteDemand(linear, angular));
        }

        let mut s = self.lock();
        s.linear_target_speed = linear;
        s.angular_target_speed = angular;

        Ok(())
    }
}

impl PoseProvider for TracksSimulation {
    fn pose(&self) -> Pose {
        self.lock().pose
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Move `current` towards `target`, limited by the acceleration when rising and the deceleration
/// when falling. Without a limit the target is reached immediately.
fn ramp(current: f64, target: f64, accel: Option<f64>, decel: Option<f64>, dt: f64) -> f64 {
    if current < target {
        match accel {
            Some(a) => (current + a * dt).min(target),
            None => target,
        }
    } else if current > target {
        match decel {
            Some(d) => (current - d * dt).max(target),
            None => target,
        }
    } else {
        current
    }
}
