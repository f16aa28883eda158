//! Plain `f64` as a one-dimensional manifold.

use crate::manifold::{LieGroup, Manifold};
use nalgebra::DVector;

impl Manifold for f64 {
    fn dimension(&self) -> usize {
        1
    }

    fn retract(&self, delta: &DVector<f64>) -> Self {
        self + delta[0]
    }

    fn local_coordinates(&self, other: &Self) -> DVector<f64> {
        DVector::from_element(1, other - self)
    }

    fn equals(&self, other: &Self, tolerance: f64) -> bool {
        (self - other).abs() <= tolerance
    }
}

impl LieGroup for f64 {
    fn identity() -> Self {
        0.0
    }

    fn compose(&self, other: &Self) -> Self {
        self + other
    }

    fn inverse(&self) -> Self {
        -self
    }
}
