//! # Executable Parameters
//!
//! This module provides the parameters of the navigation executable, loaded from
//! `params/feld_exec.toml` by default.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use nalgebra::Point2;
use serde::Deserialize;

use crate::{
    driving::DriveParams,
    geometry::Pose,
    hardware::TracksSimParams,
    navigation::{NavParams, PathSpec},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ExecParams {
    /// Pose the simulated robot starts in
    pub start_pose: Pose,

    /// Path to drive, unless one is given on the command line
    pub path: Option<PathSpec>,

    /// Implement targets as (x, y) pairs in meters
    pub targets_m: Vec<[f64; 2]>,

    /// Archive the simulated velocity and pose
    pub archive_velocity: bool,

    pub navigation: NavParams,

    pub drive: DriveParams,

    pub tracks_sim: TracksSimParams,
}

impl ExecParams {
    /// The implement targets as points.
    pub fn targets(&self) -> Vec<Point2<f64>> {
        self.targets_m
            .iter()
            .map(|t| Point2::new(t[0], t[1]))
            .collect()
    }
}
