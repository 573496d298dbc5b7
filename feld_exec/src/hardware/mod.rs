//! # Hardware
//!
//! Only the simulated drive is provided. Real hardware plugs in by implementing
//! [`crate::driving::Wheels`] and [`crate::driving::PoseProvider`].

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;
mod tracks_sim;

pub use params::TracksSimParams;
pub use tracks_sim::*;
