//! Manifold-valued variables.
//!
//! Every variable the optimizer touches implements [`Manifold`]: it knows its tangent
//! dimension, how to move along a tangent vector ([`Manifold::retract`]) and how to
//! measure the tangent vector between two elements ([`Manifold::local_coordinates`]).
//!
//! Manifold      | dim | retract(X, δ)        | local_coordinates(X₁, X₂)
//! ------------- | --- | -------------------- | -------------------------
//! scalar `f64`  | 1   | x + δ                | x₂ − x₁
//! `Rn`          | n   | v + δ                | v₂ − v₁
//! `Rot2`        | 1   | R · Exp(δ)           | Log(R₁⁻¹ R₂)
//! `Pose2`       | 3   | P · Exp(δ)           | Log(P₁⁻¹ P₂)
//!
//! The convention is `X₁.retract(X₁.local_coordinates(X₂)) == X₂`, so local coordinates
//! play the role of `b − a` and retraction the role of `a + δ`.
//!
//! The [`Values`](crate::core::values::Values) store holds variables of different
//! concrete types side by side. It does so through the object-safe [`Value`] trait,
//! which is implemented for every [`Manifold`] by a blanket impl and compares concrete
//! types through [`TypeId`] before any cross-value operation.

use nalgebra::DVector;
use std::any::{Any, TypeId};
use std::fmt::{Debug, Display};
use thiserror::Error;

pub mod pose2;
pub mod rn;
pub mod rot2;
pub mod scalar;

/// Errors that can occur during manifold operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ManifoldError {
    /// Tangent vector has the wrong length
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Two erased values of different concrete types were combined
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    /// NaN or Inf detected in a manifold element or tangent vector
    #[error("Invalid number: NaN or Inf detected")]
    InvalidNumber,
}

/// Result type for manifold operations.
pub type ManifoldResult<T> = Result<T, ManifoldError>;

/// Capability contract of an optimization variable.
///
/// Implementations must be pure and deterministic. `retract` is only called with a
/// `delta` of length [`dimension`](Manifold::dimension); the erased [`Value`] layer
/// checks this before dispatching.
pub trait Manifold: Clone + Debug + Display + Send + Sync + 'static {
    /// Tangent space dimension.
    fn dimension(&self) -> usize;

    /// Move along the tangent vector `delta`.
    fn retract(&self, delta: &DVector<f64>) -> Self;

    /// Tangent vector `δ` such that `self.retract(δ) == other`.
    fn local_coordinates(&self, other: &Self) -> DVector<f64>;

    /// Equality up to `tolerance`.
    fn equals(&self, other: &Self, tolerance: f64) -> bool;
}

/// Group structure on top of a manifold, used by relative measurements.
pub trait LieGroup: Manifold {
    fn identity() -> Self;

    fn compose(&self, other: &Self) -> Self;

    fn inverse(&self) -> Self;

    /// `self⁻¹ ∘ other`
    fn between(&self, other: &Self) -> Self {
        self.inverse().compose(other)
    }
}

/// Type-erased view of a [`Manifold`].
///
/// This is what the variable store keeps per key. Operations that combine two values
/// check [`value_type_id`](Value::value_type_id) first and report
/// [`ManifoldError::TypeMismatch`] rather than attempting a conversion.
pub trait Value: Debug + Display + Send + Sync + 'static {
    fn dim(&self) -> usize;

    fn retract_value(&self, delta: &DVector<f64>) -> ManifoldResult<Box<dyn Value>>;

    fn local_coordinates_value(&self, other: &dyn Value) -> ManifoldResult<DVector<f64>>;

    /// `false` whenever the concrete types differ.
    fn equals_value(&self, other: &dyn Value, tolerance: f64) -> bool;

    fn clone_value(&self) -> Box<dyn Value>;

    /// Runtime identity of the concrete type.
    fn value_type_id(&self) -> TypeId;

    fn type_name(&self) -> &'static str;

    fn as_any(&self) -> &dyn Any;
}

impl<T: Manifold> Value for T {
    fn dim(&self) -> usize {
        self.dimension()
    }

    fn retract_value(&self, delta: &DVector<f64>) -> ManifoldResult<Box<dyn Value>> {
        let expected = self.dimension();
        if delta.len() != expected {
            return Err(ManifoldError::DimensionMismatch {
                expected,
                actual: delta.len(),
            });
        }
        if delta.iter().any(|v| !v.is_finite()) {
            return Err(ManifoldError::InvalidNumber);
        }
        Ok(Box::new(self.retract(delta)))
    }

    fn local_coordinates_value(&self, other: &dyn Value) -> ManifoldResult<DVector<f64>> {
        match other.as_any().downcast_ref::<T>() {
            Some(other) => Ok(self.local_coordinates(other)),
            None => Err(ManifoldError::TypeMismatch {
                expected: std::any::type_name::<T>(),
                actual: other.type_name(),
            }),
        }
    }

    fn equals_value(&self, other: &dyn Value, tolerance: f64) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| self.equals(other, tolerance))
    }

    fn clone_value(&self) -> Box<dyn Value> {
        Box::new(self.clone())
    }

    fn value_type_id(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl dyn Value {
    /// Whether the erased value is a `T`.
    pub fn is<T: Manifold>(&self) -> bool {
        self.value_type_id() == TypeId::of::<T>()
    }

    pub fn downcast_ref<T: Manifold>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

impl Clone for Box<dyn Value> {
    fn clone(&self) -> Self {
        (**self).clone_value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifold::{rn::Rn, rot2::Rot2};

    #[test]
    fn test_erased_retract_checks_dimension() {
        let value: Box<dyn Value> = Box::new(Rn::from_slice(&[1.0, 2.0]));
        let result = value.retract_value(&DVector::from_vec(vec![1.0]));
        assert_eq!(
            result.err(),
            Some(ManifoldError::DimensionMismatch {
                expected: 2,
                actual: 1
            })
        );

        let moved = value
            .retract_value(&DVector::from_vec(vec![0.5, -1.0]))
            .ok()
            .and_then(|v| v.downcast_ref::<Rn>().cloned());
        assert_eq!(moved, Some(Rn::from_slice(&[1.5, 1.0])));
    }

    #[test]
    fn test_erased_retract_rejects_non_finite() {
        let value: Box<dyn Value> = Box::new(3.0_f64);
        let result = value.retract_value(&DVector::from_vec(vec![f64::NAN]));
        assert_eq!(result.err(), Some(ManifoldError::InvalidNumber));
    }

    #[test]
    fn test_erased_type_identity() {
        let rotation: Box<dyn Value> = Box::new(Rot2::from_angle(0.3));
        let scalar: Box<dyn Value> = Box::new(0.3_f64);

        assert!(rotation.is::<Rot2>());
        assert!(!rotation.is::<f64>());
        assert_ne!(rotation.value_type_id(), scalar.value_type_id());
        assert!(rotation.type_name().contains("Rot2"));

        assert!(!rotation.equals_value(scalar.as_ref(), 1e9));
        assert!(matches!(
            rotation.local_coordinates_value(scalar.as_ref()),
            Err(ManifoldError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_boxed_clone_is_deep() {
        let original: Box<dyn Value> = Box::new(Rn::from_slice(&[1.0, 2.0, 3.0]));
        let copy = original.clone();
        assert!(copy.equals_value(original.as_ref(), 0.0));
        assert!(!std::ptr::addr_eq(
            copy.as_ref() as *const dyn Value,
            original.as_ref() as *const dyn Value
        ));
    }
}
