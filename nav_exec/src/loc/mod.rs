//! # Localisation
//!
//! Provides pose transforms between the robot's body frame and the fixed
//! reference frame that goals and paths are expressed in. The planner is
//! decoupled from the actual localisation source through the
//! [`TransformProvider`] trait, a lookup may fail (for example because the
//! source has not converged yet), in which case the planner skips the tick.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use nalgebra::{Isometry2, Point2, Vector2};
use std::time::Duration;
use thiserror::Error;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A rigid 2D transform between two frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseTransform(Isometry2<f64>);

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors in acquiring a pose transform.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("No transform between the robot and reference frames is available")]
    NotAvailable,

    #[error("The transform lookup did not complete within {0:?}")]
    LookupTimeout(Duration),
}

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Source of the transform from the robot's body frame to the reference frame.
pub trait TransformProvider {
    /// Get the current robot-to-reference transform, waiting at most
    /// `wait_budget` for it to become available.
    fn robot_to_reference(&self, wait_budget: Duration) -> Result<PoseTransform, TransformError>;
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PoseTransform {
    /// Build a transform from a translation (meters) and rotation (radians).
    pub fn new(translation_m: Vector2<f64>, rotation_rad: f64) -> Self {
        Self(Isometry2::new(translation_m, rotation_rad))
    }

    /// The identity transform
    pub fn identity() -> Self {
        Self(Isometry2::identity())
    }

    /// The inverse of this transform
    pub fn inverse(&self) -> Self {
        Self(self.0.inverse())
    }

    /// Apply the transform to a point
    pub fn apply(&self, point_m: &Point2<f64>) -> Point2<f64> {
        self.0.transform_point(point_m)
    }

    /// The translation component of the transform
    pub fn translation_m(&self) -> Vector2<f64> {
        self.0.translation.vector
    }
}

/// A [`TransformProvider`] returning a fixed transform, used in simulated
/// scenarios and tests.
pub struct StaticTransformProvider {
    transform: PoseTransform,
}

impl StaticTransformProvider {
    pub fn new(transform: PoseTransform) -> Self {
        Self { transform }
    }
}

impl TransformProvider for StaticTransformProvider {
    fn robot_to_reference(&self, _: Duration) -> Result<PoseTransform, TransformError> {
        Ok(self.transform)
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn inverse_round_trips_points() {
        let tf = PoseTransform::new(Vector2::new(1.0, -2.0), std::f64::consts::FRAC_PI_2);
        let p = Point2::new(0.5, 0.25);

        let q = tf.inverse().apply(&tf.apply(&p));

        assert!((q.x - p.x).abs() < 1e-9);
        assert!((q.y - p.y).abs() < 1e-9);
    }

    #[test]
    fn rotation_maps_axes() {
        // Quarter turn takes the robot's +x axis onto the reference +y axis
        let tf = PoseTransform::new(Vector2::new(0.0, 0.0), std::f64::consts::FRAC_PI_2);
        let p = tf.apply(&Point2::new(1.0, 0.0));

        assert!(p.x.abs() < 1e-9);
        assert!((p.y - 1.0).abs() < 1e-9);
    }
}
