//! Linear systems and the damped solvers that consume them.
//!
//! A [`LinearSystem`] is the first-order model of the objective at one estimate: a
//! sparse Jacobian `J` whose columns follow the variable [`Ordering`](crate::core::ordering::Ordering)
//! and the stacked residual `r`. A [`LinearSolver`] turns it into a tangent step by
//! solving the damped normal equations
//!
//! ```text
//! (JᵀJ + λI) δ = −Jᵀr
//! ```
//!
//! and reports a [`LinAlgError`] when the factorization breaks down. The optimizer treats
//! such a failure as a rejected trial and retries with more damping.

pub mod cholesky;
pub mod qr;

use faer::{
    Mat,
    sparse::{SparseColMat, Triplet},
};
use nalgebra::DVector;
use std::{
    fmt,
    fmt::{Display, Formatter},
    ops::Mul,
};
use thiserror::Error;
use tracing::error;

pub use cholesky::SparseCholeskySolver;
pub use qr::SparseQRSolver;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum LinearSolverType {
    #[default]
    SparseCholesky,
    SparseQR,
}

impl LinearSolverType {
    /// Fresh solver of this type.
    pub fn create(self) -> Box<dyn LinearSolver> {
        match self {
            LinearSolverType::SparseCholesky => Box::new(SparseCholeskySolver::new()),
            LinearSolverType::SparseQR => Box::new(SparseQRSolver::new()),
        }
    }
}

impl Display for LinearSolverType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            LinearSolverType::SparseCholesky => write!(f, "Sparse Cholesky"),
            LinearSolverType::SparseQR => write!(f, "Sparse QR"),
        }
    }
}

/// Linear algebra specific error types
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LinAlgError {
    /// Matrix factorization failed (Cholesky, QR, etc.)
    #[error("Matrix factorization failed: {0}")]
    FactorizationFailed(String),

    /// Singular or near-singular matrix detected
    #[error("Singular matrix detected (matrix is not invertible)")]
    SingularMatrix,

    /// Failed to create sparse matrix from triplets
    #[error("Failed to create sparse matrix: {0}")]
    SparseMatrixCreation(String),

    /// Matrix format conversion failed
    #[error("Matrix conversion failed: {0}")]
    MatrixConversion(String),

    /// Jacobian, residual or solution shapes disagree
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),
}

impl LinAlgError {
    /// Log the error with tracing::error and return self for chaining
    #[must_use]
    pub fn log(self) -> Self {
        error!("{}", self);
        self
    }

    /// Log the error with the original source error from a third-party library
    ///
    /// # Example
    /// ```ignore
    /// SymbolicLlt::try_new(matrix.symbolic(), Side::Lower)
    ///     .map_err(|e| {
    ///         LinAlgError::FactorizationFailed(
    ///             "Symbolic Cholesky decomposition failed".to_string()
    ///         )
    ///         .log_with_source(e)
    ///     })?;
    /// ```
    #[must_use]
    pub fn log_with_source<E: std::fmt::Debug>(self, source_error: E) -> Self {
        error!("{} | Source: {:?}", self, source_error);
        self
    }
}

/// Result type for linear algebra operations
pub type LinAlgResult<T> = Result<T, LinAlgError>;

/// Jacobian and residual of the objective at one linearization point.
#[derive(Debug, Clone)]
pub struct LinearSystem {
    jacobian: SparseColMat<usize, f64>,
    residual: Mat<f64>,
}

impl LinearSystem {
    /// `residual` must be a column with one entry per Jacobian row.
    pub fn new(jacobian: SparseColMat<usize, f64>, residual: Mat<f64>) -> LinAlgResult<Self> {
        if residual.ncols() != 1 || residual.nrows() != jacobian.nrows() {
            return Err(LinAlgError::DimensionMismatch(format!(
                "jacobian is {}x{}, residual is {}x{}",
                jacobian.nrows(),
                jacobian.ncols(),
                residual.nrows(),
                residual.ncols()
            )));
        }
        Ok(Self { jacobian, residual })
    }

    /// Build from Jacobian triplets and a residual slice.
    pub fn try_from_triplets(
        nrows: usize,
        ncols: usize,
        triplets: &[Triplet<usize, usize, f64>],
        residual: &[f64],
    ) -> LinAlgResult<Self> {
        let jacobian = SparseColMat::try_new_from_triplets(nrows, ncols, triplets).map_err(|e| {
            LinAlgError::SparseMatrixCreation("Failed to assemble Jacobian".to_string())
                .log_with_source(e)
        })?;
        let residual = Mat::from_fn(residual.len(), 1, |i, _| residual[i]);
        Self::new(jacobian, residual)
    }

    pub fn jacobian(&self) -> &SparseColMat<usize, f64> {
        &self.jacobian
    }

    pub fn residual(&self) -> &Mat<f64> {
        &self.residual
    }

    /// Number of residual rows.
    pub fn nrows(&self) -> usize {
        self.jacobian.nrows()
    }

    /// Tangent dimension of the system.
    pub fn ncols(&self) -> usize {
        self.jacobian.ncols()
    }

    /// `0.5 ‖r‖²`, the objective value at the linearization point.
    pub fn error(&self) -> f64 {
        let norm = self.residual.norm_l2();
        0.5 * norm * norm
    }

    /// `Jᵀr`
    pub fn gradient(&self) -> Mat<f64> {
        self.jacobian.as_ref().transpose().mul(&self.residual)
    }
}

/// Solver for the damped normal equations of a [`LinearSystem`].
pub trait LinearSolver {
    /// Solve `(JᵀJ + λI) δ = −Jᵀr` for `δ`.
    ///
    /// # Errors
    /// Returns `LinAlgError` if the factorization fails or the system is singular at
    /// this damping.
    fn solve(&mut self, system: &LinearSystem, damping: f64) -> LinAlgResult<DVector<f64>>;

    /// Human readable solver name for logs.
    fn name(&self) -> &'static str;
}

/// Copy a single-column faer matrix into a nalgebra vector.
pub(crate) fn column_to_dvector(column: &Mat<f64>) -> DVector<f64> {
    DVector::from_fn(column.nrows(), |i, _| column[(i, 0)])
}

/// Assemble `λI` for an `n × n` system.
pub(crate) fn damping_matrix(n: usize, damping: f64) -> LinAlgResult<SparseColMat<usize, f64>> {
    let triplets: Vec<Triplet<usize, usize, f64>> =
        (0..n).map(|i| Triplet::new(i, i, damping)).collect();
    SparseColMat::try_new_from_triplets(n, n, &triplets).map_err(|e| {
        LinAlgError::SparseMatrixCreation("Failed to create lambda*I matrix".to_string())
            .log_with_source(e)
    })
}

/// `(JᵀJ, Jᵀr)` of a system.
pub(crate) fn normal_equations(
    system: &LinearSystem,
) -> LinAlgResult<(SparseColMat<usize, f64>, Mat<f64>)> {
    let jacobian = system.jacobian();
    let hessian = jacobian
        .as_ref()
        .transpose()
        .to_col_major()
        .map_err(|e| {
            LinAlgError::MatrixConversion(
                "Failed to convert transposed Jacobian to column-major format".to_string(),
            )
            .log_with_source(e)
        })?
        .mul(jacobian.as_ref());
    Ok((hessian, system.gradient()))
}

/// Column lengths and row indices of a sparse matrix, used to decide whether a cached
/// symbolic factorization still applies.
pub(crate) fn sparsity_pattern(matrix: &SparseColMat<usize, f64>) -> Vec<usize> {
    let symbolic = matrix.symbolic();
    let mut pattern = Vec::with_capacity(matrix.ncols() + matrix.compute_nnz());
    for col in 0..matrix.ncols() {
        let rows = symbolic.row_idx_of_col_raw(col);
        pattern.push(rows.len());
        pattern.extend_from_slice(rows);
    }
    pattern
}
