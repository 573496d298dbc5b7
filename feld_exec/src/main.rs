//! Main navigation executable entry point.
//!
//! # Architecture
//!
//! The executable runs a single navigation in simulation:
//!
//!     - Initialise the session and logging
//!     - Load the parameters
//!     - Start the tracks simulation, stepping in its own task
//!     - Build the implement, driver and navigation
//!     - Run the navigation until it completes, fails, or Ctrl-C is pressed
//!     - Save the navigation backup to the session directory

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use chrono::Utc;
use color_eyre::{
    eyre::{eyre, WrapErr},
    Report,
};
use log::{error, info, warn};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use structopt::StructOpt;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

// Internal
use feld_lib::{
    driving::{Driver, PoseProvider},
    hardware::TracksSimulation,
    implement::{Implement, ImplementDummy, TargetListImplement},
    navigation::{NavEvent, NavState, PathSpec, WaypointNavigation},
    params::ExecParams,
};
use util::{
    archive::Archiver,
    logger::{logger_init, LevelFilter},
    session::Session,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Simulated Feldfreund navigation run
#[derive(Debug, StructOpt)]
#[structopt(name = "feld_exec")]
struct Args {
    /// Parameter file, relative to the params directory of the software root
    #[structopt(long, default_value = "feld_exec.toml")]
    params: String,

    /// Navigation backup (JSON) to restore before starting
    #[structopt(long, parse(from_os_str))]
    restore: Option<PathBuf>,

    /// Override the navigation's linear speed limit (m/s)
    #[structopt(long)]
    speed_ms: Option<f64>,

    /// Implement targets as flattened (x, y) pairs in meters, replacing those in the parameters
    #[structopt(long)]
    targets_m: Vec<f64>,

    /// Minimum log level, at least INFO
    #[structopt(long, default_value = "debug")]
    log_level: LevelFilter,

    /// The path to drive, replacing the one in the parameters
    #[structopt(subcommand)]
    path: Option<PathSpec>,
}

/// One row of the velocity archive.
#[derive(Serialize)]
struct VelocityRecord {
    time_s: f64,
    linear_ms: f64,
    angular_rads: f64,
    x_m: f64,
    y_m: f64,
    yaw_rad: f64,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Report> {
    color_eyre::install()?;

    let args = Args::from_args();

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new("feld_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(args.log_level, &session).wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Feldfreund Navigation Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let params: ExecParams =
        util::params::load(&args.params).wrap_err("Could not load exec params")?;

    info!("Exec parameters loaded");

    // ---- INITIALISE SIMULATION ----

    let sim = Arc::new(TracksSimulation::new(params.tracks_sim.clone()));
    sim.set_pose(params.start_pose);
    let sim_task = sim.spawn();

    let arch_task = if params.archive_velocity {
        let archiver = Archiver::from_path(&session, "velocity.csv")
            .wrap_err("Failed to create the velocity archive")?;
        Some(spawn_velocity_archive(archiver, sim.subscribe_velocity(), sim.clone()))
    } else {
        None
    };

    info!("Simulation initialised at {}", sim.pose());

    // ---- INITIALISE NAVIGATION ----

    let targets = if args.targets_m.is_empty() {
        params.targets()
    } else {
        if args.targets_m.len() % 2 != 0 {
            return Err(eyre!(
                "Expected (x, y) pairs of targets, found {} values",
                args.targets_m.len()
            ));
        }
        args.targets_m
            .chunks_exact(2)
            .map(|c| nalgebra::Point2::new(c[0], c[1]))
            .collect()
    };

    let implement: Arc<dyn Implement> = if targets.is_empty() {
        Arc::new(ImplementDummy)
    } else {
        info!("Implement has {} targets", targets.len());
        Arc::new(TargetListImplement::new("Target list", targets).with_pose_provider(sim.clone()))
    };

    let path_spec = args
        .path
        .or(params.path.clone())
        .unwrap_or(PathSpec::StraightLine { length_m: 1.0 });
    info!("Path: {:?}", path_spec);

    let driver = Driver::new(sim.clone(), sim.clone(), params.drive.clone());
    let mut nav = WaypointNavigation::new(
        "Waypoint Navigation",
        implement,
        driver,
        sim.clone(),
        path_spec.into_generator(),
        params.navigation.clone(),
    );

    if let Some(ref path) = args.restore {
        let backup_str = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("Could not read the navigation backup {:?}", path))?;
        let backup: serde_json::Value =
            serde_json::from_str(&backup_str).wrap_err("Could not parse the navigation backup")?;
        nav.restore(&backup);
        info!("Navigation backup restored from {:?}", path);
    }

    if let Some(speed) = args.speed_ms {
        nav.set_linear_speed_limit(speed).wrap_err("Could not apply the speed override")?;
    }
    info!("Linear speed limit: {:.3} m/s", nav.linear_speed_limit());

    let event_task = tokio::spawn(log_events(nav.subscribe()));

    let interrupt = nav.interrupt_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received, interrupting the navigation");
            interrupt.interrupt();
        }
    });

    info!("Initialisation complete\n");

    // ---- RUN ----

    let run_start = Utc::now();
    let final_state = nav.start().await;
    let run_duration = Utc::now() - run_start;

    info!(
        "Navigation ended in state {:?} at {} after {:.1} s",
        final_state,
        sim.pose(),
        run_duration.num_milliseconds() as f64 / 1000.0
    );

    // ---- SHUTDOWN ----

    session.save("navigation.json", nav.backup());

    // Dropping the navigation closes the event channel
    drop(nav);
    if event_task.await.is_err() {
        warn!("Event logging task panicked");
    }

    sim_task.abort();
    if let Some(t) = arch_task {
        t.abort();
    }

    session.exit();

    match final_state {
        NavState::Completed => Ok(()),
        s => Err(eyre!("Navigation did not complete (state: {:?})", s)),
    }
}

/// Log the navigation's events until the navigation is dropped.
async fn log_events(mut events: mpsc::UnboundedReceiver<NavEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            NavEvent::PathGenerated(path) => {
                info!("Path generated with {} segments", path.len());
                for segment in path.iter() {
                    info!("    {}", segment);
                }
            }
            NavEvent::SegmentStarted(segment) => info!("Segment started: {}", segment),
            NavEvent::SegmentCompleted(segment) => info!("Segment completed: {}", segment),
            NavEvent::PathCompleted => info!("Path completed"),
            NavEvent::Failed(reason) => error!("Navigation failed: {}", reason),
        }
    }
}

/// Write every velocity measurement of the simulation, with the pose, to the archive.
fn spawn_velocity_archive(
    mut archiver: Archiver,
    mut velocities: broadcast::Receiver<feld_lib::hardware::Velocity>,
    sim: Arc<TracksSimulation>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let velocity = match velocities.recv().await {
                Ok(v) => v,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Velocity archive skipped {} measurements", n);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };

            let pose = sim.pose();
            let record = VelocityRecord {
                time_s: velocity.time,
                linear_ms: velocity.linear,
                angular_rads: velocity.angular,
                x_m: pose.x,
                y_m: pose.y,
                yaw_rad: pose.yaw,
            };

            if let Err(e) = archiver.serialise(record) {
                warn!("Could not archive velocity: {}", e);
                break;
            }
        }
    })
}
