use super::{Factor, check_arity, check_sigma, downcast};
use crate::core::{CoreResult, key::Key};
use crate::manifold::{LieGroup, Value};
use nalgebra::DVector;

/// Relative measurement between two variables of the same Lie group.
///
/// Given variables `X₁`, `X₂` and a measurement `Z ≈ X₁⁻¹ X₂`, the residual is
///
/// ```text
/// r = local_coordinates(Z, X₁⁻¹ X₂) / σ
/// ```
///
/// For `Pose2` this is a planar odometry or loop-closure constraint; for `f64` and `Rn`
/// it reduces to `((x₂ − x₁) − z) / σ`.
#[derive(Debug, Clone)]
pub struct BetweenFactor<T: LieGroup> {
    keys: [Key; 2],
    measured: T,
    sigma: f64,
}

impl<T: LieGroup> BetweenFactor<T> {
    pub fn new(from: Key, to: Key, measured: T) -> Self {
        Self {
            keys: [from, to],
            measured,
            sigma: 1.0,
        }
    }

    pub fn with_sigma(from: Key, to: Key, measured: T, sigma: f64) -> CoreResult<Self> {
        Ok(Self {
            keys: [from, to],
            measured,
            sigma: check_sigma(sigma)?,
        })
    }

    pub fn measured(&self) -> &T {
        &self.measured
    }

    pub fn sigma(&self) -> f64 {
        self.sigma
    }
}

impl<T: LieGroup> Factor for BetweenFactor<T> {
    fn keys(&self) -> &[Key] {
        &self.keys
    }

    fn dimension(&self) -> usize {
        self.measured.dimension()
    }

    fn evaluate(&self, values: &[&dyn Value]) -> CoreResult<DVector<f64>> {
        check_arity(values, 2)?;
        let x1 = downcast::<T>(values[0], self.keys[0])?;
        let x2 = downcast::<T>(values[1], self.keys[1])?;
        let predicted = x1.between(x2);
        Ok(self.measured.local_coordinates(&predicted) / self.sigma)
    }
}
