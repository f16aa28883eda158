//! Factors and the factor graph objective.
//!
//! A factor is one term of the least-squares objective. It depends on a fixed list of
//! variable keys and maps their current values to a whitened residual `r(x)`. The
//! [`FactorGraph`] sums the terms,
//!
//! ```text
//! E(x) = ½ Σ_i ‖r_i(x)‖²
//! ```
//!
//! and implements [`NonlinearObjective`](crate::optimizer::NonlinearObjective) by
//! stacking every factor's residual and Jacobian blocks into one sparse system.
//!
//! Jacobians are taken with respect to the tangent space of each variable: column `j`
//! of a block is the derivative of the residual along `x.retract(t·e_j)` at `t = 0`.
//! Factors without analytic derivatives get a central-difference Jacobian from the
//! default [`Factor::linearize`].
//!
//! # Example
//!
//! ```
//! use manifold_lm::core::{key::Key, values::Values};
//! use manifold_lm::factors::{BetweenFactor, FactorGraph, PriorFactor};
//! use manifold_lm::manifold::pose2::Pose2;
//! use manifold_lm::optimizer::NonlinearObjective;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let x0 = Key::new('x', 0);
//! let x1 = Key::new('x', 1);
//!
//! let mut graph = FactorGraph::new();
//! graph.add(PriorFactor::new(x0, Pose2::default()));
//! graph.add(BetweenFactor::new(x0, x1, Pose2::new(1.0, 0.0, 0.0)));
//!
//! let mut values = Values::new();
//! values.insert(x0, &Pose2::default())?;
//! values.insert(x1, &Pose2::new(1.0, 0.0, 0.0))?;
//! assert!(graph.error(&values)? < 1e-12);
//! # Ok(())
//! # }
//! ```

use crate::core::{CoreError, CoreResult, key::Key};
use crate::manifold::{Manifold, Value};
use nalgebra::{DMatrix, DVector};

pub mod between_factor;
pub mod graph;
pub mod prior_factor;

pub use between_factor::BetweenFactor;
pub use graph::FactorGraph;
pub use prior_factor::PriorFactor;

/// Step used by the central-difference Jacobian.
pub const NUMERICAL_STEP: f64 = 1e-6;

/// One term of a least-squares objective.
///
/// `values` passed to [`evaluate`](Factor::evaluate) and
/// [`linearize`](Factor::linearize) are the current values of [`keys`](Factor::keys),
/// in the same order.
///
/// # Thread Safety
///
/// Factors must be `Send + Sync` to enable parallel residual/Jacobian evaluation.
pub trait Factor: Send + Sync {
    /// Variables this factor depends on.
    fn keys(&self) -> &[Key];

    /// Length of the residual vector.
    fn dimension(&self) -> usize;

    /// Whitened residual at `values`.
    fn evaluate(&self, values: &[&dyn Value]) -> CoreResult<DVector<f64>>;

    /// Residual and one Jacobian block per key, each `dimension() × dim(key)`.
    fn linearize(&self, values: &[&dyn Value]) -> CoreResult<(DVector<f64>, Vec<DMatrix<f64>>)> {
        numerical_linearize(self, values)
    }
}

/// Residual and central-difference Jacobian blocks of `factor` at `values`.
///
/// Each column costs two residual evaluations at `x.retract(±h·e_j)`.
pub fn numerical_linearize<F: Factor + ?Sized>(
    factor: &F,
    values: &[&dyn Value],
) -> CoreResult<(DVector<f64>, Vec<DMatrix<f64>>)> {
    let residual = factor.evaluate(values)?;
    let mut blocks = Vec::with_capacity(values.len());

    for (index, value) in values.iter().enumerate() {
        let dim = value.dim();
        let mut block = DMatrix::zeros(residual.len(), dim);
        let mut delta = DVector::zeros(dim);

        for col in 0..dim {
            delta[col] = NUMERICAL_STEP;
            let plus = value.retract_value(&delta)?;
            delta[col] = -NUMERICAL_STEP;
            let minus = value.retract_value(&delta)?;
            delta[col] = 0.0;

            let r_plus = evaluate_replaced(factor, values, index, plus.as_ref())?;
            let r_minus = evaluate_replaced(factor, values, index, minus.as_ref())?;
            if r_plus.len() != residual.len() || r_minus.len() != residual.len() {
                return Err(CoreError::SizeMismatch(format!(
                    "factor residual changed length from {} while differentiating",
                    residual.len()
                )));
            }
            block.set_column(col, &((r_plus - r_minus) / (2.0 * NUMERICAL_STEP)));
        }
        blocks.push(block);
    }

    Ok((residual, blocks))
}

fn evaluate_replaced<F: Factor + ?Sized>(
    factor: &F,
    values: &[&dyn Value],
    index: usize,
    replacement: &dyn Value,
) -> CoreResult<DVector<f64>> {
    let args: Vec<&dyn Value> = values
        .iter()
        .enumerate()
        .map(|(i, v)| if i == index { replacement } else { *v })
        .collect();
    factor.evaluate(&args)
}

/// Typed view of the value bound to `key`.
pub(crate) fn downcast<T: Manifold>(value: &dyn Value, key: Key) -> CoreResult<&T> {
    value
        .downcast_ref::<T>()
        .ok_or_else(|| CoreError::IncorrectType {
            key,
            stored: value.type_name(),
            requested: std::any::type_name::<T>(),
        })
}

/// Fails unless exactly `expected` values were passed.
pub(crate) fn check_arity(values: &[&dyn Value], expected: usize) -> CoreResult<()> {
    if values.len() != expected {
        return Err(CoreError::Factor(format!(
            "expected {expected} values, got {}",
            values.len()
        )));
    }
    Ok(())
}

/// Validated isotropic noise standard deviation.
pub(crate) fn check_sigma(sigma: f64) -> CoreResult<f64> {
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(CoreError::Factor(format!(
            "noise sigma must be positive and finite, got {sigma}"
        )));
    }
    Ok(sigma)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifold::rn::Rn;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    /// r = [x0² + x1, 3·x1]
    struct QuadraticFactor {
        keys: [Key; 1],
    }

    impl Factor for QuadraticFactor {
        fn keys(&self) -> &[Key] {
            &self.keys
        }

        fn dimension(&self) -> usize {
            2
        }

        fn evaluate(&self, values: &[&dyn Value]) -> CoreResult<DVector<f64>> {
            check_arity(values, 1)?;
            let x = downcast::<Rn>(values[0], self.keys[0])?.data();
            Ok(DVector::from_vec(vec![x[0] * x[0] + x[1], 3.0 * x[1]]))
        }
    }

    #[test]
    fn test_numerical_jacobian_matches_analytic() -> TestResult {
        let factor = QuadraticFactor {
            keys: [Key::new('x', 0)],
        };
        let x = Rn::from_slice(&[1.5, -2.0]);
        let (residual, blocks) = factor.linearize(&[&x])?;

        assert!((residual[0] - 0.25).abs() < 1e-12);
        assert!((residual[1] + 6.0).abs() < 1e-12);
        assert_eq!(blocks.len(), 1);

        let expected = DMatrix::from_row_slice(2, 2, &[3.0, 1.0, 0.0, 3.0]);
        assert!((&blocks[0] - expected).amax() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_downcast_reports_types() {
        let key = Key::new('x', 0);
        let value = 1.0_f64;
        let result = downcast::<Rn>(&value, key);
        assert!(matches!(
            result,
            Err(CoreError::IncorrectType { stored: "f64", .. })
        ));
    }

    #[test]
    fn test_arity_and_sigma_checks() {
        let x = 1.0_f64;
        assert!(check_arity(&[&x, &x], 1).is_err());
        assert!(check_arity(&[&x], 1).is_ok());
        assert!(check_sigma(0.0).is_err());
        assert!(check_sigma(f64::NAN).is_err());
        assert_eq!(check_sigma(0.5), Ok(0.5));
    }
}
