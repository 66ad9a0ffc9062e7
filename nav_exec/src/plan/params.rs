//! Parameters for the local motion planner

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Local motion planner parameters.
///
/// Any value missing from the parameter file falls back to the default.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlanParams {
    /// Maximum time the grid solver may spend on a single solve (milliseconds)
    pub solver_timeout_ms: f64,

    /// Interval between planner ticks (seconds)
    pub tick_interval_s: f64,

    /// X offset from the robot origin at which planned paths start (meters)
    pub path_start_offset_x_m: f64,

    /// Y offset from the robot origin at which planned paths start (meters)
    pub path_start_offset_y_m: f64,

    /// If true the planner never accepts final goals and keeps extending its
    /// current subgoal chain indefinitely
    pub infinite_travel: bool,

    /// Frame id stamped onto published paths
    pub path_frame_id: String,

    /// Cell cost at or above which terrain is considered dangerous
    pub danger_cost: i8,

    /// Maximum lateral distance from the path at which the robot still counts
    /// as following it (meters)
    pub max_lateral_track_dist_m: f64,

    /// Path progress fraction at which the robot is considered to have
    /// arrived at the subgoal
    pub subgoal_arrival_progress: f64,

    /// Age beyond which an existing path is deprecated (seconds)
    pub path_deprecation_s: f64,

    /// Distance to the final goal below which the planner holds its current
    /// path rather than replanning (meters)
    pub steady_state_distance_m: f64,

    /// Maximum range of the radial subgoal search (meters)
    pub subgoal_max_range_m: f64,

    /// Step length along each subgoal search ray (meters)
    pub subgoal_step_m: f64,

    /// Radius of the maximum cost kernel (meters)
    pub max_cost_kernel_radius_m: f64,

    /// Radius of the average cost kernel (meters)
    pub avg_cost_kernel_radius_m: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for PlanParams {
    fn default() -> Self {
        Self {
            solver_timeout_ms: 40.0,
            tick_interval_s: 0.5,
            path_start_offset_x_m: 0.44,
            path_start_offset_y_m: 0.0,
            infinite_travel: false,
            path_frame_id: String::from("odom"),
            danger_cost: 80,
            max_lateral_track_dist_m: 0.6,
            subgoal_arrival_progress: 0.7,
            path_deprecation_s: 5.0,
            steady_state_distance_m: 1.5,
            subgoal_max_range_m: 8.0,
            subgoal_step_m: 0.6,
            max_cost_kernel_radius_m: 0.6,
            avg_cost_kernel_radius_m: 1.0,
        }
    }
}
