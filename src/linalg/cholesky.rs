use faer::{
    Mat, Side,
    linalg::solvers::Solve,
    sparse::SparseColMat,
    sparse::linalg::solvers::{Llt, SymbolicLlt},
};

use crate::linalg::{
    LinAlgError, LinAlgResult, LinearSolver, LinearSystem, column_to_dvector, damping_matrix,
    normal_equations, sparsity_pattern,
};
use nalgebra::DVector;

/// Sparse LLᵀ solver for the damped normal equations.
#[derive(Debug, Clone, Default)]
pub struct SparseCholeskySolver {
    /// Cached symbolic factorization, reused while the sparsity pattern of the
    /// augmented Hessian is unchanged. Adding `λI` never changes the pattern.
    symbolic_factorization: Option<SymbolicLlt<usize>>,

    /// Pattern the cached symbolic factorization was computed for.
    symbolic_pattern: Option<Vec<usize>>,

    /// `JᵀJ` from the last successful solve.
    hessian: Option<SparseColMat<usize, f64>>,

    /// `Jᵀr` from the last successful solve.
    gradient: Option<Mat<f64>>,
}

impl SparseCholeskySolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hessian(&self) -> Option<&SparseColMat<usize, f64>> {
        self.hessian.as_ref()
    }

    pub fn gradient(&self) -> Option<&Mat<f64>> {
        self.gradient.as_ref()
    }

    pub fn has_symbolic_factorization(&self) -> bool {
        self.symbolic_factorization.is_some()
    }

    fn symbolic_for(
        &mut self,
        augmented: &SparseColMat<usize, f64>,
    ) -> LinAlgResult<SymbolicLlt<usize>> {
        let pattern = sparsity_pattern(augmented);
        if let (Some(sym), Some(cached)) = (&self.symbolic_factorization, &self.symbolic_pattern)
            && *cached == pattern
        {
            // reference counted, clone is O(1)
            return Ok(sym.clone());
        }

        let sym = SymbolicLlt::try_new(augmented.symbolic(), Side::Lower).map_err(|e| {
            LinAlgError::FactorizationFailed(
                "Symbolic Cholesky decomposition failed for augmented system".to_string(),
            )
            .log_with_source(e)
        })?;
        self.symbolic_factorization = Some(sym.clone());
        self.symbolic_pattern = Some(pattern);
        Ok(sym)
    }
}

impl LinearSolver for SparseCholeskySolver {
    fn solve(&mut self, system: &LinearSystem, damping: f64) -> LinAlgResult<DVector<f64>> {
        let n = system.ncols();
        let (hessian, gradient) = normal_equations(system)?;

        // H_aug = H + λI
        let augmented = hessian.as_ref() + damping_matrix(n, damping)?;
        let sym = self.symbolic_for(&augmented)?;

        // a failed numeric factorization is expected at low damping, the caller retries
        let cholesky = Llt::try_new_with_symbolic(sym, augmented.as_ref(), Side::Lower)
            .map_err(|_| LinAlgError::SingularMatrix)?;

        let dx = cholesky.solve(-&gradient);
        let step = column_to_dvector(&dx);
        self.hessian = Some(hessian);
        self.gradient = Some(gradient);

        if step.iter().any(|v| !v.is_finite()) {
            return Err(LinAlgError::SingularMatrix);
        }
        Ok(step)
    }

    fn name(&self) -> &'static str {
        "Sparse Cholesky"
    }
}
