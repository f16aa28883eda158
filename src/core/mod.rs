//! Variable storage for the optimizer.
//!
//! This module contains the pieces every optimization run is built on:
//! - [`Key`](key::Key): identifiers of variables
//! - [`Values`](values::Values): the type-erased store of manifold-valued variables
//! - [`Ordering`](ordering::Ordering): the mapping from keys to linear-system slots,
//!   together with the builders that compute one

pub mod key;
pub mod ordering;
pub mod values;

use crate::core::key::Key;
use crate::manifold::ManifoldError;
use thiserror::Error;
use tracing::error;

/// Errors raised by the variable store and orderings.
///
/// All of these are usage errors. The operation that raised one has not modified its
/// receiver.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    /// Insert with a key that is already present
    #[error("Key {key} already exists")]
    KeyAlreadyExists { key: Key },

    /// Lookup, update or erase of an absent key
    #[error("Attempting to {operation} key {key}, which does not exist")]
    KeyDoesNotExist { operation: &'static str, key: Key },

    /// Stored and requested concrete types differ
    #[error("Value stored at key {key} has type {stored}, but {requested} was requested")]
    IncorrectType {
        key: Key,
        stored: &'static str,
        requested: &'static str,
    },

    /// Key sets, orderings or tangent vectors do not line up
    #[error("Size mismatch: {0}")]
    SizeMismatch(String),

    /// Ordering is not injective or not contiguous
    #[error("Invalid ordering: {0}")]
    InvalidOrdering(String),

    /// Retraction or local coordinates failed on a stored value
    #[error(transparent)]
    Manifold(#[from] ManifoldError),

    /// A factor could not be evaluated
    #[error("Factor evaluation failed: {0}")]
    Factor(String),
}

impl CoreError {
    /// Log the error with tracing::error and return self for chaining
    ///
    /// # Example
    /// ```ignore
    /// values.erase(key).map_err(|e| e.log())?;
    /// ```
    #[must_use]
    pub fn log(self) -> Self {
        error!("{}", self);
        self
    }

    /// Log the error together with the lower-level error that caused it
    #[must_use]
    pub fn log_with_source<E: std::fmt::Debug>(self, source_error: E) -> Self {
        error!("{} | Source: {:?}", self, source_error);
        self
    }
}

/// Result type for core module operations
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_error_messages() {
        let err = CoreError::KeyDoesNotExist {
            operation: "update",
            key: Key::new('x', 4),
        };
        assert_eq!(
            err.to_string(),
            "Attempting to update key x4, which does not exist"
        );

        let err = CoreError::IncorrectType {
            key: Key::new('r', 0),
            stored: "Rot2",
            requested: "f64",
        };
        let msg = err.to_string();
        assert!(msg.contains("Rot2"));
        assert!(msg.contains("f64"));
        assert!(msg.contains("r0"));
    }

    #[test]
    fn test_log_returns_self() {
        let err = CoreError::SizeMismatch("3 != 4".to_string()).log();
        assert_eq!(err, CoreError::SizeMismatch("3 != 4".to_string()));
    }
}
