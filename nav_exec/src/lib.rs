//! # Navigation executable library
//!
//! This library provides the local motion planning system used by the
//! navigation executable. The planner consumes rolling cost maps and pose
//! information and produces short reactive paths towards a commanded goal.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

/// Rolling local cost map and cost kernel evaluation
pub mod map;

/// Localisation - pose transforms between the robot and reference frames
pub mod loc;

/// Paths through the reference frame
pub mod path;

/// Grid path solvers
pub mod solver;

/// The local motion planner itself
pub mod plan;
