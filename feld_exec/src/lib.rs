//! # Feldfreund navigation library.
//!
//! This library allows the executable, tests and benchmarks to access the navigation core of the
//! robot.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Geometry - poses and cubic splines
pub mod geometry;

/// Driving - the actuator interfaces and the spline following driver
pub mod driving;

/// Hardware - the simulated tracked drive
pub mod hardware;

/// Implement - the interface of the work performing attachment
pub mod implement;

/// Navigation - drives generated paths and runs the implement's workflow on its targets
pub mod navigation;

/// Executable parameters
pub mod params;
