//! Safety predicates over the map, footprint, and path state.
//!
//! All predicates are total: absent or empty inputs resolve to the
//! conservative answer (unsafe, deprecated, not following) rather than
//! erroring.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use chrono::{DateTime, Utc};
use nalgebra::Point2;

// Internal imports
use super::params::PlanParams;
use super::Footprint;
use crate::loc::PoseTransform;
use crate::map::{CostKernel, LocalCostMap};
use crate::path::Path;

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// True if every footprint point lies on a known, non-dangerous cell.
///
/// This is an exact raw cell check with no kernel smoothing, the footprint
/// already covers the robot's extent.
pub fn footprint_safe(
    map: &LocalCostMap,
    footprint: Option<&Footprint>,
    params: &PlanParams,
) -> bool {
    let footprint = match footprint {
        Some(f) => f,
        None => return false,
    };

    for point in &footprint.points_m {
        match map.raw(map.index_of_point(point)) {
            Some(cost) if cost >= params.danger_cost || cost < 0 => return false,
            Some(_) => (),
            None => return false,
        }
    }

    true
}

/// True if the path's first waypoint (the immediate tracking target) sits on
/// safe terrain under the maximum cost kernel.
pub fn subgoal_safe(
    map: &LocalCostMap,
    path: Option<&Path>,
    ref_to_robot: &PoseTransform,
    params: &PlanParams,
) -> bool {
    let path = match path {
        Some(p) if !p.is_empty() => p,
        _ => return false,
    };

    point_safe(map, &ref_to_robot.apply(&path.points_m[0]), params)
}

/// True if every waypoint of the path sits on safe terrain under the maximum
/// cost kernel.
pub fn path_safe(
    map: &LocalCostMap,
    path: Option<&Path>,
    ref_to_robot: &PoseTransform,
    params: &PlanParams,
) -> bool {
    let path = match path {
        Some(p) if !p.is_empty() => p,
        _ => return false,
    };

    path.points_m
        .iter()
        .all(|p| point_safe(map, &ref_to_robot.apply(p), params))
}

/// True if the path is absent, empty, or older than the deprecation window.
pub fn path_deprecated(path: Option<&Path>, now: DateTime<Utc>, params: &PlanParams) -> bool {
    match path {
        Some(p) if !p.is_empty() => p.age_s(now) > params.path_deprecation_s,
        _ => true,
    }
}

/// True if the robot is tracking the path.
///
/// The tracked waypoint is picked from the tail of the path in proportion to
/// the follower's progress, and the robot counts as following when that
/// waypoint's cross-track offset in the robot frame is within tolerance.
///
/// The index is clamped into the path so that out-of-range progress values
/// degrade to the nearest endpoint rather than panicking.
pub fn robot_following_path(
    path: Option<&Path>,
    progress: f64,
    ref_to_robot: &PoseTransform,
    params: &PlanParams,
) -> bool {
    let path = match path {
        Some(p) if !p.is_empty() => p,
        _ => return false,
    };

    let target_idx = (path.len() as f64 * (0.99 - progress)) as i64;
    let target_idx = target_idx.max(0).min(path.len() as i64 - 1) as usize;

    let tracked = ref_to_robot.apply(&path.points_m[target_idx]);

    tracked.y.abs() < params.max_lateral_track_dist_m
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Kernel safety check for a single robot-frame point. Out-of-map cells are
/// treated as unknown and therefore unsafe.
fn point_safe(map: &LocalCostMap, point_robot_m: &Point2<f64>, params: &PlanParams) -> bool {
    let idx = map.index_of_point(point_robot_m);

    if map.kernel_cost(CostKernel::Max, idx, params.max_cost_kernel_radius_m)
        >= params.danger_cost as i32
    {
        return false;
    }

    match map.raw(idx) {
        Some(cost) => cost >= 0,
        None => false,
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use chrono::Duration;
    use nalgebra::Vector2;

    fn free_map() -> LocalCostMap {
        LocalCostMap::filled(0.2, Vector2::new(-2.0, -2.0), 20, 20, 0)
    }

    fn path_of(points: &[(f64, f64)]) -> Path {
        let mut path = Path::new_empty("odom");
        path.points_m = points.iter().map(|&(x, y)| Point2::new(x, y)).collect();
        path
    }

    #[test]
    fn absent_or_empty_path_is_deprecated() {
        let params = PlanParams::default();
        let now = Utc::now();

        assert!(path_deprecated(None, now, &params));
        assert!(path_deprecated(Some(&path_of(&[])), now, &params));
    }

    #[test]
    fn deprecation_follows_path_age() {
        let params = PlanParams::default();
        let now = Utc::now();

        let mut fresh = path_of(&[(1.0, 0.0)]);
        fresh.stamp = now - Duration::milliseconds(4900);
        assert!(!path_deprecated(Some(&fresh), now, &params));

        let mut stale = path_of(&[(1.0, 0.0)]);
        stale.stamp = now - Duration::milliseconds(5100);
        assert!(path_deprecated(Some(&stale), now, &params));
    }

    #[test]
    fn following_is_false_without_waypoints() {
        let params = PlanParams::default();
        let tf = PoseTransform::identity();

        for &progress in &[0.0, 0.5, 1.0] {
            assert!(!robot_following_path(None, progress, &tf, &params));
            assert!(!robot_following_path(
                Some(&path_of(&[])),
                progress,
                &tf,
                &params
            ));
        }
    }

    #[test]
    fn out_of_range_progress_does_not_panic() {
        let params = PlanParams::default();
        let tf = PoseTransform::identity();
        let path = path_of(&[(0.5, 0.0), (1.0, 0.0), (1.5, 0.0)]);

        // Both extremes clamp to a valid waypoint, which lies on the x axis
        // and is therefore within the lateral tolerance
        assert!(robot_following_path(Some(&path), 2.0, &tf, &params));
        assert!(robot_following_path(Some(&path), -1.0, &tf, &params));
    }

    #[test]
    fn lateral_offset_breaks_following() {
        let params = PlanParams::default();
        let tf = PoseTransform::identity();

        let on_track = path_of(&[(1.0, 0.5)]);
        assert!(robot_following_path(Some(&on_track), 0.5, &tf, &params));

        let off_track = path_of(&[(1.0, 0.7)]);
        assert!(!robot_following_path(Some(&off_track), 0.5, &tf, &params));
    }

    #[test]
    fn footprint_unsafe_on_dangerous_or_unknown_cells() {
        let params = PlanParams::default();
        let mut map = free_map();
        let footprint = Footprint {
            points_m: vec![Point2::new(0.0, 0.0), Point2::new(0.2, 0.0)],
            stamp: Utc::now(),
        };

        assert!(footprint_safe(&map, Some(&footprint), &params));

        // Dangerous cell under the second point
        let idx = map.index_of_point(&Point2::new(0.2, 0.0));
        map.data[idx as usize] = 80;
        assert!(!footprint_safe(&map, Some(&footprint), &params));

        map.data[idx as usize] = -1;
        assert!(!footprint_safe(&map, Some(&footprint), &params));

        // Missing footprint is conservatively unsafe
        assert!(!footprint_safe(&map, None, &params));
    }

    #[test]
    fn path_safety_uses_the_max_cost_kernel() {
        let params = PlanParams::default();
        let mut map = free_map();
        let tf = PoseTransform::identity();
        let path = path_of(&[(0.0, 0.0), (1.0, 0.0)]);

        assert!(path_safe(&map, Some(&path), &tf, &params));
        assert!(subgoal_safe(&map, Some(&path), &tf, &params));

        // A dangerous cell adjacent to the second waypoint trips the kernel
        // check even though the waypoint's own cell is free
        let idx = map.index_of_point(&Point2::new(1.2, 0.0));
        map.data[idx as usize] = 90;

        assert!(!path_safe(&map, Some(&path), &tf, &params));
        // The first waypoint is far from the obstacle, so the subgoal check
        // still passes
        assert!(subgoal_safe(&map, Some(&path), &tf, &params));
    }
}
