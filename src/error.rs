//! Top-level error type of the crate.
//!
//! Each module reports its own error (`CoreError`, `OptimizerError`, `LinAlgError`,
//! `ManifoldError`, `ObserverError`). [`ManifoldLmError`] wraps any of them for callers
//! that mix operations from several modules behind one `?`, keeping the source chain
//! intact:
//!
//! ```text
//! ManifoldLmError::Optimizer(
//!     OptimizerError::Core(
//!         CoreError::KeyDoesNotExist { operation: "linearize", key: x9 }
//!     )
//! )
//! ```

use crate::{
    core::CoreError, linalg::LinAlgError, manifold::ManifoldError, observers::ObserverError,
    optimizer::OptimizerError,
};
use std::error::Error as StdError;
use thiserror::Error;

pub type ManifoldLmResult<T> = Result<T, ManifoldLmError>;

/// Any error produced by this crate.
///
/// ```
/// use manifold_lm::core::{key::Key, values::Values};
/// use manifold_lm::ManifoldLmResult;
///
/// fn lookup(values: &Values) -> ManifoldLmResult<f64> {
///     Ok(*values.retrieve::<f64>(&Key::new('x', 0))?)
/// }
///
/// let err = lookup(&Values::new()).unwrap_err();
/// assert!(err.chain_compact().contains("x0"));
/// ```
#[derive(Debug, Error)]
pub enum ManifoldLmError {
    /// Variable store, ordering and factor errors
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Optimizer(#[from] OptimizerError),

    #[error(transparent)]
    LinearAlgebra(#[from] LinAlgError),

    #[error(transparent)]
    Manifold(#[from] ManifoldError),

    #[error(transparent)]
    Observer(#[from] ObserverError),
}

impl ManifoldLmError {
    /// Error and all its sources, one per line.
    pub fn chain(&self) -> String {
        self.sources()
            .enumerate()
            .map(|(i, message)| {
                if i == 0 {
                    message
                } else {
                    format!("  → {message}")
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Error and all its sources on a single line.
    pub fn chain_compact(&self) -> String {
        self.sources().collect::<Vec<_>>().join(" → ")
    }

    fn sources(&self) -> impl Iterator<Item = String> + '_ {
        // transparent variants forward source() to the wrapped error, so start there
        std::iter::successors(Some(self as &(dyn StdError + 'static)), |&e| e.source())
            .map(|e| e.to_string())
            .fold(Vec::<String>::new(), |mut acc, message| {
                if acc.last() != Some(&message) {
                    acc.push(message);
                }
                acc
            })
            .into_iter()
    }
}
