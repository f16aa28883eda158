//! Rn - n-dimensional Euclidean space
//!
//! Elements are dynamic vectors and the group operation is addition, so retraction is
//! `v + δ` and local coordinates are `v₂ − v₁`. The dimension of an element is the
//! length of its vector and never changes through retraction.

use crate::manifold::{LieGroup, Manifold};
use nalgebra::DVector;
use std::fmt::{self, Display, Formatter};

/// Rⁿ element backed by a `DVector<f64>`.
#[derive(Debug, Clone, PartialEq)]
pub struct Rn {
    data: DVector<f64>,
}

impl Rn {
    pub fn new(data: DVector<f64>) -> Self {
        Self { data }
    }

    pub fn from_slice(values: &[f64]) -> Self {
        Self::new(DVector::from_column_slice(values))
    }

    pub fn zeros(dim: usize) -> Self {
        Self::new(DVector::zeros(dim))
    }

    pub fn data(&self) -> &DVector<f64> {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn norm(&self) -> f64 {
        self.data.norm()
    }
}

impl Display for Rn {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Rn(dim: {}, data: [", self.data.len())?;
        for (i, val) in self.data.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{:.4}", val)?;
        }
        write!(f, "])")
    }
}

impl From<DVector<f64>> for Rn {
    fn from(data: DVector<f64>) -> Self {
        Rn::new(data)
    }
}

impl From<Rn> for DVector<f64> {
    fn from(rn: Rn) -> Self {
        rn.data
    }
}

impl Manifold for Rn {
    fn dimension(&self) -> usize {
        self.data.len()
    }

    fn retract(&self, delta: &DVector<f64>) -> Self {
        Rn::new(&self.data + delta)
    }

    fn local_coordinates(&self, other: &Self) -> DVector<f64> {
        &other.data - &self.data
    }

    fn equals(&self, other: &Self, tolerance: f64) -> bool {
        self.data.len() == other.data.len()
            && self
                .data
                .iter()
                .zip(other.data.iter())
                .all(|(a, b)| (a - b).abs() <= tolerance)
    }
}

/// The identity has no intrinsic size; `Rn::identity()` is the empty vector and
/// composing with it is only meaningful for equally sized operands.
impl LieGroup for Rn {
    fn identity() -> Self {
        Rn::zeros(0)
    }

    fn compose(&self, other: &Self) -> Self {
        Rn::new(&self.data + &other.data)
    }

    fn inverse(&self) -> Self {
        Rn::new(-&self.data)
    }
}
