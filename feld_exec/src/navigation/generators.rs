//! # Path generators
//!
//! A navigation strategy is expressed as a [`PathGenerator`], called at the start of every run with
//! the robot's pose. Generators are usually built from a [`PathSpec`], given either in the
//! executable's parameter file or on its command line.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::warn;
use nalgebra::Point2;
use serde::Deserialize;
use structopt::StructOpt;

// Internal
use super::{
    generate_three_point_turn, remove_segments_behind_robot, DriveSegment, SegmentFlags,
    TurnParams,
};
use crate::geometry::{Pose, PoseStep};

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Generates the path of a navigation run.
pub trait PathGenerator: Send + Sync {
    /// The ordered segments to drive, starting from the robot's current pose. An empty path means
    /// generation failed.
    fn generate(&mut self, robot: &Pose) -> Vec<DriveSegment>;
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A single implement segment straight ahead of the robot.
#[derive(Debug, Clone)]
pub struct StraightLine {
    /// Units: meters
    pub length_m: f64,
}

/// A three point turn from the robot's pose into `target`.
#[derive(Debug, Clone)]
pub struct ThreePointTurn {
    pub target: Pose,
    pub params: TurnParams,
}

/// A predefined list of segments.
#[derive(Debug, Clone)]
pub struct FixedPath {
    segments: Vec<DriveSegment>,

    /// Skip the leading segments the robot has already driven past.
    trim_behind_robot: bool,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Specification of a path generator.
#[derive(Debug, Clone, Deserialize, StructOpt)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PathSpec {
    /// Drive straight ahead, using the implement along the way.
    #[structopt(name = "straight")]
    StraightLine {
        /// Length of the line in meters
        #[structopt(default_value = "1.0")]
        length_m: f64,
    },

    /// Turn into a parallel row with a three point turn.
    #[structopt(name = "turn")]
    ThreePointTurn {
        /// X coordinate of the next row's start in meters
        x_m: f64,

        /// Y coordinate of the next row's start in meters
        y_m: f64,

        /// Heading of the next row in degrees
        yaw_deg: f64,

        /// Radius of the turn in meters
        #[structopt(long, default_value = "1.5")]
        #[serde(default = "default_turn_radius")]
        radius_m: f64,
    },

    /// Drive straight lines through a list of points, using the implement along the way.
    #[structopt(name = "waypoints")]
    Waypoints {
        /// Skip waypoints the robot has already passed
        #[structopt(long)]
        #[serde(default)]
        trim_behind_robot: bool,

        /// Flattened (x, y) pairs in meters
        #[structopt(required = true)]
        points_m: Vec<f64>,
    },
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PathSpec {
    /// Build the generator described by this spec.
    pub fn into_generator(self) -> Box<dyn PathGenerator> {
        match self {
            PathSpec::StraightLine { length_m } => Box::new(StraightLine { length_m }),
            PathSpec::ThreePointTurn {
                x_m,
                y_m,
                yaw_deg,
                radius_m,
            } => Box::new(ThreePointTurn {
                target: Pose::new(x_m, y_m, yaw_deg.to_radians()),
                params: TurnParams {
                    radius_m,
                    ..Default::default()
                },
            }),
            PathSpec::Waypoints {
                trim_behind_robot,
                points_m,
            } => {
                if points_m.len() % 2 != 0 {
                    warn!("Odd number of waypoint coordinates, the last one is ignored");
                }

                let points: Vec<Point2<f64>> = points_m
                    .chunks_exact(2)
                    .map(|c| Point2::new(c[0], c[1]))
                    .collect();

                Box::new(FixedPath::through_points(&points).trim_behind_robot(trim_behind_robot))
            }
        }
    }
}

fn default_turn_radius() -> f64 {
    TurnParams::default().radius_m
}

impl PathGenerator for StraightLine {
    fn generate(&mut self, robot: &Pose) -> Vec<DriveSegment> {
        if !(self.length_m > 0.0) {
            warn!("Cannot generate a straight line of length {} m", self.length_m);
            return Vec::new();
        }

        let end = *robot + PoseStep::linear(self.length_m);

        vec![DriveSegment::from_poses(
            robot,
            &end,
            SegmentFlags {
                use_implement: true,
                ..Default::default()
            },
        )]
    }
}

impl PathGenerator for ThreePointTurn {
    fn generate(&mut self, robot: &Pose) -> Vec<DriveSegment> {
        generate_three_point_turn(robot, &self.target, &self.params)
    }
}

impl FixedPath {
    pub fn new(segments: Vec<DriveSegment>) -> Self {
        Self {
            segments,
            trim_behind_robot: false,
        }
    }

    /// Straight implement segments through consecutive points, stopping only at the last one.
    pub fn through_points(points: &[Point2<f64>]) -> Self {
        let count = points.len().saturating_sub(1);

        let segments = points
            .windows(2)
            .enumerate()
            .map(|(i, pair)| {
                DriveSegment::from_points(
                    &pair[0],
                    &pair[1],
                    SegmentFlags {
                        use_implement: true,
                        stop_at_end: i + 1 == count,
                        ..Default::default()
                    },
                )
            })
            .collect();

        Self::new(segments)
    }

    pub fn trim_behind_robot(mut self, trim: bool) -> Self {
        self.trim_behind_robot = trim;
        self
    }
}

impl PathGenerator for FixedPath {
    fn generate(&mut self, robot: &Pose) -> Vec<DriveSegment> {
        if self.trim_behind_robot {
            remove_segments_behind_robot(self.segments.clone(), robot)
        } else {
            self.segments.clone()
        }
    }
}
