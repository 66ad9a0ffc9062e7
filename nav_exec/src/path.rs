//! # Path structures

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use chrono::{DateTime, Utc};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A path through the reference frame.
///
/// Waypoints are ordered from the robot towards the subgoal. The stamp
/// records when the path was planned and is used to judge staleness, it is
/// deliberately not refreshed when an existing path is republished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Path {
    /// The waypoints of the path, in meters in the reference frame
    pub points_m: Vec<Point2<f64>>,

    /// The time at which this path was planned
    pub stamp: DateTime<Utc>,

    /// The frame the waypoints are expressed in
    pub frame_id: String,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Path {
    /// Create a new empty path stamped now.
    pub fn new_empty(frame_id: &str) -> Self {
        Self {
            points_m: Vec::new(),
            stamp: Utc::now(),
            frame_id: String::from(frame_id),
        }
    }

    /// Number of waypoints in the path
    pub fn len(&self) -> usize {
        self.points_m.len()
    }

    /// True if the path has no waypoints
    pub fn is_empty(&self) -> bool {
        self.points_m.is_empty()
    }

    /// Age of the path in seconds at the given time.
    ///
    /// Returns `f64::MAX` if the age cannot be represented.
    pub fn age_s(&self, now: DateTime<Utc>) -> f64 {
        util::time::duration_to_seconds(now - self.stamp).unwrap_or(std::f64::MAX)
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use chrono::Duration;

    #[test]
    fn age_is_measured_from_stamp() {
        let mut path = Path::new_empty("odom");
        let now = Utc::now();
        path.stamp = now - Duration::milliseconds(2500);

        assert!((path.age_s(now) - 2.5).abs() < 1e-6);
    }
}
