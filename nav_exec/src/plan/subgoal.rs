//! Subgoal generation
//!
//! When the final goal lies beyond the local map the planner steers towards
//! an intermediate subgoal instead. Candidate subgoals are searched over a
//! fan of rays in front of the robot and scored on terrain cost and progress
//! towards the goal. The whole search is a pure function of its inputs, so
//! repeated evaluation over the same state picks the same subgoal.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use nalgebra::Point2;
use serde::Serialize;

// Internal imports
use super::params::PlanParams;
use crate::loc::PoseTransform;
use crate::map::{CostKernel, LocalCostMap};
use crate::path::Path;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// One scored candidate ray of the radial search, kept for visualization.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateRay {
    /// Angle index of the ray, angle from the robot's lateral axis is
    /// `PI/18 * angle_index`
    pub angle_index: i32,

    /// End point of the ray's best candidate, in the robot frame (meters)
    pub end_point_m: Point2<f64>,

    /// Best score found along the ray, zero if no safe candidate was sampled
    pub score: f64,
}

/// Visualization data for one subgoal generation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubgoalViz {
    /// The scored candidate rays, in search order. Empty when the goal was
    /// in map range and used directly.
    pub rays: Vec<CandidateRay>,

    /// The chosen subgoal in the reference frame (meters)
    pub subgoal_m: Point2<f64>,

    /// True when the goal itself was returned without a radial search
    pub direct: bool,
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Generate a subgoal for the given final goal.
///
/// If the goal's robot-frame cell lies within the map bounds the transformed
/// goal is returned directly. Otherwise a radial scored search picks a safe
/// point which makes progress towards the goal.
///
/// Returns the subgoal in the robot frame, plus the visualization data.
pub fn generate_subgoal(
    map: &LocalCostMap,
    goal_ref_m: &Point2<f64>,
    robot_to_ref: &PoseTransform,
    params: &PlanParams,
) -> (Point2<f64>, SubgoalViz) {
    let ref_to_robot = robot_to_ref.inverse();
    let goal_robot = ref_to_robot.apply(goal_ref_m);
    let dis_robot_to_goal = goal_robot.x.hypot(goal_robot.y);

    // In-range test on truncated cell coordinates
    let goal_col = ((goal_robot.x - map.origin_m.x) / map.resolution_m) as i64;
    let goal_row = ((goal_robot.y - map.origin_m.y) / map.resolution_m) as i64;

    if goal_col < map.width as i64 && goal_row < map.height as i64 {
        let viz = SubgoalViz {
            rays: Vec::new(),
            subgoal_m: *goal_ref_m,
            direct: true,
        };
        return (goal_robot, viz);
    }

    // Radial scored search. Rays are visited from the robot's left side
    // round to its right, each extended outwards until unsafe terrain or the
    // map edge stops it.
    let offset_x = params.path_start_offset_x_m;
    let offset_y = params.path_start_offset_y_m;
    let step = params.subgoal_step_m;
    let max_step_idx = (params.subgoal_max_range_m / step).round() as i64;

    let mut rays = Vec::with_capacity(15);

    for i in (2..=16).rev() {
        let theta = std::f64::consts::PI / 18.0 * i as f64;
        let mut best_score = 0.0;
        let mut best_j = 0i64;

        for j in 3..=max_step_idx {
            let dist = step * j as f64;
            let candidate = Point2::new(
                dist * theta.sin() + offset_x,
                dist * theta.cos() + offset_y,
            );

            let idx = map.index_of_point(&candidate);
            let cost = map.kernel_cost(CostKernel::Max, idx, params.max_cost_kernel_radius_m);

            // Unsafe or unknown terrain stops the whole ray
            let unknown = match map.raw(idx) {
                Some(c) => c < 0,
                None => true,
            };
            if cost > params.danger_cost as i32 || unknown {
                break;
            }

            let dis_to_goal =
                (candidate.x - goal_robot.x).hypot(candidate.y - goal_robot.y);
            let score =
                (1.0 - cost as f64 / 100.0) + (1.0 - dis_to_goal / dis_robot_to_goal / 2.0);

            if score > best_score {
                best_score = score;
                best_j = j;
            }
        }

        let best_dist = step * best_j as f64;
        rays.push(CandidateRay {
            angle_index: i,
            end_point_m: Point2::new(
                offset_x + best_dist * theta.sin(),
                offset_y + best_dist * theta.cos(),
            ),
            score: best_score,
        });
    }

    // First strictly-best ray in visit order wins
    let mut best = &rays[0];
    for ray in &rays[1..] {
        if ray.score > best.score {
            best = ray;
        }
    }

    let subgoal_robot = best.end_point_m;
    let viz = SubgoalViz {
        subgoal_m: robot_to_ref.apply(&subgoal_robot),
        rays,
        direct: false,
    };

    (subgoal_robot, viz)
}

/// Pick a safe waypoint from an existing path whose subgoal has become
/// unsafe.
///
/// Walks the waypoints in path order and returns the first (in the robot
/// frame) whose kernel cost is below the danger threshold and whose cell is
/// known, or `None` when no waypoint qualifies.
pub fn approach_unsafe_subgoal(
    map: &LocalCostMap,
    path: &Path,
    ref_to_robot: &PoseTransform,
    params: &PlanParams,
) -> Option<Point2<f64>> {
    for point in &path.points_m {
        let point_robot = ref_to_robot.apply(point);
        let idx = map.index_of_point(&point_robot);

        let known = matches!(map.raw(idx), Some(c) if c >= 0);

        if known
            && map.kernel_cost(CostKernel::Max, idx, params.max_cost_kernel_radius_m)
                < params.danger_cost as i32
        {
            return Some(point_robot);
        }
    }

    None
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use chrono::Utc;
    use nalgebra::Vector2;

    fn map_covering(half_extent_m: f64, res: f64, cost: i8) -> LocalCostMap {
        let cells = (2.0 * half_extent_m / res) as usize;
        LocalCostMap::filled(
            res,
            Vector2::new(-half_extent_m, -half_extent_m),
            cells,
            cells,
            cost,
        )
    }

    #[test]
    fn in_range_goal_is_returned_directly() {
        let map = map_covering(2.0, 0.1, 0);
        let params = PlanParams::default();
        let tf = PoseTransform::identity();
        let goal = Point2::new(1.0, 0.5);

        let (subgoal, viz) = generate_subgoal(&map, &goal, &tf, &params);

        assert!((subgoal.x - 1.0).abs() < 1e-9);
        assert!((subgoal.y - 0.5).abs() < 1e-9);
        assert!(viz.direct);
        assert!(viz.rays.is_empty());
    }

    #[test]
    fn search_is_deterministic() {
        let map = map_covering(6.0, 0.2, 10);
        let params = PlanParams::default();
        let tf = PoseTransform::identity();
        let goal = Point2::new(20.0, 0.0);

        let (a, viz_a) = generate_subgoal(&map, &goal, &tf, &params);
        let (b, viz_b) = generate_subgoal(&map, &goal, &tf, &params);

        assert_eq!(a, b);
        assert_eq!(viz_a, viz_b);
    }

    #[test]
    fn search_favours_the_goalward_ray() {
        let map = map_covering(6.0, 0.2, 0);
        let params = PlanParams::default();
        let tf = PoseTransform::identity();

        // Goal far beyond the map, straight ahead of the robot
        let goal = Point2::new(20.0, 0.0);
        let (subgoal, viz) = generate_subgoal(&map, &goal, &tf, &params);

        assert!(!viz.direct);
        assert_eq!(viz.rays.len(), 15);

        // The forward ray (angle index 9) makes the most progress
        assert!(subgoal.y.abs() < 1e-6);
        assert!(subgoal.x > 5.0);
    }

    #[test]
    fn unknown_terrain_collapses_the_search_to_the_start_offset() {
        let map = map_covering(6.0, 0.2, -1);
        let params = PlanParams::default();
        let tf = PoseTransform::identity();
        let goal = Point2::new(20.0, 0.0);

        let (subgoal, viz) = generate_subgoal(&map, &goal, &tf, &params);

        // Every ray stops immediately, so every ray scores zero and the
        // first one wins with its zero-length end point
        assert!(viz.rays.iter().all(|r| r.score == 0.0));
        assert!((subgoal.x - params.path_start_offset_x_m).abs() < 1e-9);
        assert!((subgoal.y - params.path_start_offset_y_m).abs() < 1e-9);
    }

    #[test]
    fn recovery_picks_the_first_safe_waypoint() {
        let mut map = map_covering(2.0, 0.2, 0);
        let params = PlanParams::default();
        let tf = PoseTransform::identity();

        let mut path = Path::new_empty("odom");
        path.points_m = vec![Point2::new(1.0, 0.0), Point2::new(0.2, 0.6)];
        path.stamp = Utc::now();

        // First waypoint sits on dangerous terrain
        let idx = map.index_of_point(&Point2::new(1.0, 0.0));
        map.data[idx as usize] = 95;

        let recovered = approach_unsafe_subgoal(&map, &path, &tf, &params).unwrap();
        assert!((recovered.x - 0.2).abs() < 1e-9);
        assert!((recovered.y - 0.6).abs() < 1e-9);
    }

    #[test]
    fn recovery_reports_no_candidate() {
        let map = map_covering(2.0, 0.2, 95);
        let params = PlanParams::default();
        let tf = PoseTransform::identity();

        let mut path = Path::new_empty("odom");
        path.points_m = vec![Point2::new(1.0, 0.0)];

        assert!(approach_unsafe_subgoal(&map, &path, &tf, &params).is_none());

        let empty = Path::new_empty("odom");
        assert!(approach_unsafe_subgoal(&map, &empty, &tf, &params).is_none());
    }
}
