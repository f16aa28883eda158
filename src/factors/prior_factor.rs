//! Prior factor for unary constraints on variables.

use super::{Factor, check_arity, check_sigma, downcast};
use crate::core::{CoreResult, key::Key};
use crate::manifold::{Manifold, Value};
use nalgebra::DVector;

/// Prior factor (unary constraint) on a single variable.
///
/// Represents a direct measurement or prior belief about a variable's value, used to
/// anchor a problem that would otherwise be free to drift.
///
/// # Mathematical Formulation
///
/// ```text
/// r = local_coordinates(x_prior, x) / σ
/// ```
///
/// which is `(x − x_prior) / σ` in a vector space.
#[derive(Debug, Clone)]
pub struct PriorFactor<T: Manifold> {
    keys: [Key; 1],
    prior: T,
    sigma: f64,
}

impl<T: Manifold> PriorFactor<T> {
    /// Prior with unit noise.
    pub fn new(key: Key, prior: T) -> Self {
        Self {
            keys: [key],
            prior,
            sigma: 1.0,
        }
    }

    /// Prior with isotropic noise `sigma`.
    pub fn with_sigma(key: Key, prior: T, sigma: f64) -> CoreResult<Self> {
        Ok(Self {
            keys: [key],
            prior,
            sigma: check_sigma(sigma)?,
        })
    }

    pub fn prior(&self) -> &T {
        &self.prior
    }

    pub fn sigma(&self) -> f64 {
        self.sigma
    }
}

impl<T: Manifold> Factor for PriorFactor<T> {
    fn keys(&self) -> &[Key] {
        &self.keys
    }

    fn dimension(&self) -> usize {
        self.prior.dimension()
    }

    fn evaluate(&self, values: &[&dyn Value]) -> CoreResult<DVector<f64>> {
        check_arity(values, 1)?;
        let x = downcast::<T>(values[0], self.keys[0])?;
        Ok(self.prior.local_coordinates(x) / self.sigma)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CoreError;
    use crate::manifold::{pose2::Pose2, rn::Rn};
    use nalgebra::DMatrix;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_prior_residual_is_whitened_difference() -> TestResult {
        let key = Key::new('x', 0);
        let factor = PriorFactor::with_sigma(key, Rn::from_slice(&[1.0, 2.0]), 0.5)?;
        let current = Rn::from_slice(&[1.5, 2.3]);

        let residual = factor.evaluate(&[&current])?;
        assert!((residual[0] - 1.0).abs() < 1e-12);
        assert!((residual[1] - 0.6).abs() < 1e-12);
        assert_eq!(factor.dimension(), 2);
        assert_eq!(factor.keys(), &[key]);
        Ok(())
    }

    #[test]
    fn test_prior_jacobian_on_vector_space_is_scaled_identity() -> TestResult {
        let factor = PriorFactor::with_sigma(Key::new('x', 0), Rn::zeros(3), 0.1)?;
        let current = Rn::from_slice(&[0.3, -0.2, 4.0]);

        let (_, blocks) = factor.linearize(&[&current])?;
        let expected = DMatrix::<f64>::identity(3, 3) * 10.0;
        assert!((&blocks[0] - expected).amax() < 1e-5);
        Ok(())
    }

    #[test]
    fn test_prior_on_pose_is_zero_at_prior() -> TestResult {
        let pose = Pose2::new(1.0, -2.0, 0.7);
        let factor = PriorFactor::new(Key::new('x', 0), pose);
        let residual = factor.evaluate(&[&pose])?;
        assert!(residual.norm() < 1e-12);
        Ok(())
    }

    #[test]
    fn test_prior_rejects_wrong_type() {
        let factor = PriorFactor::new(Key::new('x', 0), 1.0_f64);
        let current = Rn::from_slice(&[1.0]);
        assert!(matches!(
            factor.evaluate(&[&current]),
            Err(CoreError::IncorrectType { .. })
        ));
    }

    #[test]
    fn test_prior_rejects_invalid_sigma() {
        let result = PriorFactor::with_sigma(Key::new('x', 0), 0.0_f64, -1.0);
        assert!(matches!(result, Err(CoreError::Factor(_))));
    }
}
