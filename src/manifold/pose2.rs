//! SE(2) - rigid motions in the plane
//!
//! A [`Pose2`] is a rotation followed by a translation. Tangent vectors are ordered
//! `[x, y, θ]`. Retraction uses the SE(2) exponential map on the right,
//! `P · Exp(δ)`, and local coordinates the matching logarithm, `Log(P₁⁻¹ P₂)`, so the
//! two are exact inverses for rotations below π.
//!
//! With `V(θ) = [[a, −b], [b, a]]`, `a = sin θ / θ` and `b = (1 − cos θ) / θ`:
//!
//! ```text
//! Exp([u, θ]) = (V(θ) u, R(θ))
//! Log(t, R(θ)) = [V(θ)⁻¹ t, θ]
//! ```

use crate::manifold::{LieGroup, Manifold, rot2::Rot2};
use nalgebra::{DVector, Point2, Vector2, Vector3};
use std::fmt::{self, Display, Formatter};

/// Planar pose.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose2 {
    rotation: Rot2,
    translation: Vector2<f64>,
}

/// Coefficients `(a, b)` of the SE(2) left Jacobian `V(θ)`.
fn v_coefficients(theta: f64) -> (f64, f64) {
    let theta_sq = theta * theta;
    if theta_sq < f64::EPSILON {
        // Taylor expansion
        (1.0 - theta_sq / 6.0, 0.5 * theta - theta * theta_sq / 24.0)
    } else {
        (theta.sin() / theta, (1.0 - theta.cos()) / theta)
    }
}

impl Pose2 {
    /// Degrees of freedom - dimension of the tangent space
    pub const DOF: usize = 3;

    pub fn new(x: f64, y: f64, theta: f64) -> Self {
        Pose2::from_parts(Rot2::from_angle(theta), Vector2::new(x, y))
    }

    pub fn from_parts(rotation: Rot2, translation: Vector2<f64>) -> Self {
        Pose2 {
            rotation,
            translation,
        }
    }

    pub fn rotation(&self) -> &Rot2 {
        &self.rotation
    }

    pub fn translation(&self) -> &Vector2<f64> {
        &self.translation
    }

    pub fn x(&self) -> f64 {
        self.translation.x
    }

    pub fn y(&self) -> f64 {
        self.translation.y
    }

    pub fn theta(&self) -> f64 {
        self.rotation.angle()
    }

    /// Exponential map of a tangent vector `[x, y, θ]`.
    pub fn exp(xi: &Vector3<f64>) -> Self {
        let theta = xi.z;
        let (a, b) = v_coefficients(theta);
        let translation = Vector2::new(a * xi.x - b * xi.y, b * xi.x + a * xi.y);
        Pose2::from_parts(Rot2::from_angle(theta), translation)
    }

    /// Logarithm map, returning `[x, y, θ]`.
    pub fn log(&self) -> Vector3<f64> {
        let theta = self.theta();
        let (a, b) = v_coefficients(theta);
        let den = 1.0 / (a * a + b * b);
        let (a, b) = (a * den, b * den);
        Vector3::new(
            a * self.x() + b * self.y(),
            -b * self.x() + a * self.y(),
            theta,
        )
    }

    /// Map a point from the pose frame to the world frame.
    pub fn transform_from(&self, p: &Point2<f64>) -> Point2<f64> {
        self.rotation.rotate_point(p) + self.translation
    }

    /// Map a world point into the pose frame.
    pub fn transform_to(&self, p: &Point2<f64>) -> Point2<f64> {
        Point2::from(self.rotation.unrotate(&(p.coords - self.translation)))
    }
}

impl Default for Pose2 {
    fn default() -> Self {
        Pose2::identity()
    }
}

impl Display for Pose2 {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Pose2(x: {:.4}, y: {:.4}, theta: {:.4})",
            self.x(),
            self.y(),
            self.theta()
        )
    }
}

impl Manifold for Pose2 {
    fn dimension(&self) -> usize {
        Self::DOF
    }

    fn retract(&self, delta: &DVector<f64>) -> Self {
        self.compose(&Pose2::exp(&Vector3::new(delta[0], delta[1], delta[2])))
    }

    fn local_coordinates(&self, other: &Self) -> DVector<f64> {
        let xi = self.between(other).log();
        DVector::from_column_slice(xi.as_slice())
    }

    fn equals(&self, other: &Self, tolerance: f64) -> bool {
        (self.translation - other.translation).amax() <= tolerance
            && self.rotation.equals(&other.rotation, tolerance)
    }
}

impl LieGroup for Pose2 {
    fn identity() -> Self {
        Pose2::from_parts(Rot2::identity(), Vector2::zeros())
    }

    fn compose(&self, other: &Self) -> Self {
        Pose2::from_parts(
            self.rotation.compose(&other.rotation),
            self.translation + self.rotation.rotate(&other.translation),
        )
    }

    fn inverse(&self) -> Self {
        let rotation = self.rotation.inverse();
        Pose2::from_parts(rotation, -rotation.rotate(&self.translation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    const TOLERANCE: f64 = 1e-10;

    #[test]
    fn test_pose2_exp_log_inverse() {
        for xi in [
            Vector3::new(1.0, -2.0, 0.5),
            Vector3::new(0.3, 0.1, 0.0),
            Vector3::new(-0.2, 0.4, 1e-9),
            Vector3::new(2.0, 1.0, -3.0),
        ] {
            let recovered = Pose2::exp(&xi).log();
            assert!((recovered - xi).norm() < TOLERANCE, "xi = {xi:?}");
        }
    }

    #[test]
    fn test_pose2_pure_translation_retract() {
        let p = Pose2::new(1.0, 2.0, PI / 2.0);
        // body-frame step along x moves along world y
        let moved = p.retract(&DVector::from_vec(vec![1.0, 0.0, 0.0]));
        assert!(moved.equals(&Pose2::new(1.0, 3.0, PI / 2.0), TOLERANCE));
    }

    #[test]
    fn test_pose2_local_coordinates_round_trip() {
        let a = Pose2::new(0.5, -1.0, 0.3);
        let b = Pose2::new(2.0, 1.5, -1.2);
        let delta = a.local_coordinates(&b);
        assert_eq!(delta.len(), 3);
        assert!(a.retract(&delta).equals(&b, TOLERANCE));
    }

    #[test]
    fn test_pose2_compose_inverse() {
        let a = Pose2::new(1.0, 2.0, 0.7);
        assert!(a.compose(&a.inverse()).equals(&Pose2::identity(), TOLERANCE));
        assert!(a.inverse().compose(&a).equals(&Pose2::identity(), TOLERANCE));
    }

    #[test]
    fn test_pose2_between() {
        let a = Pose2::new(1.0, 0.0, PI / 2.0);
        let b = Pose2::new(1.0, 1.0, PI / 2.0);
        let rel = a.between(&b);
        assert!(rel.equals(&Pose2::new(1.0, 0.0, 0.0), TOLERANCE));
    }

    #[test]
    fn test_pose2_transform_points() {
        let p = Pose2::new(1.0, 1.0, PI / 2.0);
        let local = Point2::new(1.0, 0.0);
        let world = p.transform_from(&local);
        assert!((world - Point2::new(1.0, 2.0)).norm() < TOLERANCE);
        assert!((p.transform_to(&world) - local).norm() < TOLERANCE);
    }

    #[test]
    fn test_pose2_accessors_and_display() {
        let p = Pose2::new(3.0, -4.0, 0.5);
        assert_eq!(p.translation(), &Vector2::new(3.0, -4.0));
        assert!((p.rotation().angle() - 0.5).abs() < TOLERANCE);
        assert_eq!(p.to_string(), "Pose2(x: 3.0000, y: -4.0000, theta: 0.5000)");
    }
}
