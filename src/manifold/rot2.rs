//! SO(2) - rotations in the plane
//!
//! Elements are stored as unit complex numbers. The tangent space is a single angle in
//! radians; retraction composes on the right, `R · Exp(δ)`, and local coordinates are
//! `Log(R₁⁻¹ R₂)`, which always lies in `(−π, π]`.

use crate::manifold::{LieGroup, Manifold};
use nalgebra::{DVector, Matrix2, Point2, UnitComplex, Vector2};
use std::fmt::{self, Display, Formatter};

/// Planar rotation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rot2 {
    complex: UnitComplex<f64>,
}

impl Rot2 {
    /// Degrees of freedom - dimension of the tangent space
    pub const DOF: usize = 1;

    pub fn new(complex: UnitComplex<f64>) -> Self {
        Rot2 { complex }
    }

    /// Rotation by `angle` radians.
    pub fn from_angle(angle: f64) -> Self {
        Rot2::new(UnitComplex::new(angle))
    }

    /// Rotation with the given cosine and sine, renormalized.
    pub fn from_cos_sin(cos: f64, sin: f64) -> Self {
        let mut complex = UnitComplex::from_cos_sin_unchecked(cos, sin);
        complex.renormalize();
        Rot2::new(complex)
    }

    pub fn complex(&self) -> UnitComplex<f64> {
        self.complex
    }

    /// Angle in `(−π, π]`.
    pub fn angle(&self) -> f64 {
        self.complex.angle()
    }

    pub fn cos(&self) -> f64 {
        self.complex.cos_angle()
    }

    pub fn sin(&self) -> f64 {
        self.complex.sin_angle()
    }

    pub fn matrix(&self) -> Matrix2<f64> {
        self.complex.to_rotation_matrix().into_inner()
    }

    /// Rotate a vector.
    pub fn rotate(&self, v: &Vector2<f64>) -> Vector2<f64> {
        self.complex * *v
    }

    /// Rotate a point.
    pub fn rotate_point(&self, p: &Point2<f64>) -> Point2<f64> {
        self.complex * *p
    }

    /// Apply the inverse rotation to a vector.
    pub fn unrotate(&self, v: &Vector2<f64>) -> Vector2<f64> {
        self.complex.inverse() * *v
    }
}

impl Default for Rot2 {
    fn default() -> Self {
        Rot2::identity()
    }
}

impl Display for Rot2 {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Rot2(angle: {:.4})", self.angle())
    }
}

impl Manifold for Rot2 {
    fn dimension(&self) -> usize {
        Self::DOF
    }

    fn retract(&self, delta: &DVector<f64>) -> Self {
        Rot2::new(self.complex * UnitComplex::new(delta[0]))
    }

    fn local_coordinates(&self, other: &Self) -> DVector<f64> {
        DVector::from_element(1, self.between(other).angle())
    }

    fn equals(&self, other: &Self, tolerance: f64) -> bool {
        (self.cos() - other.cos()).abs() <= tolerance
            && (self.sin() - other.sin()).abs() <= tolerance
    }
}

impl LieGroup for Rot2 {
    fn identity() -> Self {
        Rot2::new(UnitComplex::identity())
    }

    fn compose(&self, other: &Self) -> Self {
        Rot2::new(self.complex * other.complex)
    }

    fn inverse(&self) -> Self {
        Rot2::new(self.complex.inverse())
    }
}
