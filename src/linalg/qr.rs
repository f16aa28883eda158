use faer::{
    Mat,
    linalg::solvers::Solve,
    sparse::SparseColMat,
    sparse::linalg::solvers::{Qr, SymbolicQr},
};

use crate::linalg::{
    LinAlgError, LinAlgResult, LinearSolver, LinearSystem, column_to_dvector, damping_matrix,
    normal_equations, sparsity_pattern,
};
use nalgebra::DVector;

/// Sparse QR solver for the damped normal equations.
///
/// Slower than [`SparseCholeskySolver`](crate::linalg::SparseCholeskySolver) but more
/// tolerant of badly conditioned systems.
#[derive(Debug, Clone, Default)]
pub struct SparseQRSolver {
    /// Cached symbolic factorization and the pattern it was computed for.
    symbolic_factorization: Option<(SymbolicQr<usize>, Vec<usize>)>,

    /// `JᵀJ` from the last successful solve.
    hessian: Option<SparseColMat<usize, f64>>,

    /// `Jᵀr` from the last successful solve.
    gradient: Option<Mat<f64>>,
}

impl SparseQRSolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hessian(&self) -> Option<&SparseColMat<usize, f64>> {
        self.hessian.as_ref()
    }

    pub fn gradient(&self) -> Option<&Mat<f64>> {
        self.gradient.as_ref()
    }
}

impl LinearSolver for SparseQRSolver {
    fn solve(&mut self, system: &LinearSystem, damping: f64) -> LinAlgResult<DVector<f64>> {
        let n = system.ncols();
        let (hessian, gradient) = normal_equations(system)?;
        let augmented = hessian.as_ref() + damping_matrix(n, damping)?;

        let pattern = sparsity_pattern(&augmented);
        let sym = match &self.symbolic_factorization {
            Some((sym, cached)) if *cached == pattern => sym.clone(),
            _ => {
                let sym = SymbolicQr::try_new(augmented.symbolic()).map_err(|e| {
                    LinAlgError::FactorizationFailed(
                        "Symbolic QR decomposition failed for augmented system".to_string(),
                    )
                    .log_with_source(e)
                })?;
                self.symbolic_factorization = Some((sym.clone(), pattern));
                sym
            }
        };

        let qr = Qr::try_new_with_symbolic(sym, augmented.as_ref())
            .map_err(|_| LinAlgError::SingularMatrix)?;
        let dx = qr.solve(-&gradient);
        let step = column_to_dvector(&dx);
        self.hessian = Some(hessian);
        self.gradient = Some(gradient);

        // a rank deficient R shows up as non-finite entries
        if step.iter().any(|v| !v.is_finite()) {
            return Err(LinAlgError::SingularMatrix);
        }
        Ok(step)
    }

    fn name(&self) -> &'static str {
        "Sparse QR"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::SparseCholeskySolver;
    use faer::sparse::Triplet;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    const TOLERANCE: f64 = 1e-9;

    fn create_test_system() -> LinAlgResult<LinearSystem> {
        let triplets = vec![
            Triplet::new(0, 0, 2.0),
            Triplet::new(0, 1, 1.0),
            Triplet::new(1, 0, 1.0),
            Triplet::new(1, 1, 3.0),
            Triplet::new(1, 2, 1.0),
            Triplet::new(2, 1, 1.0),
            Triplet::new(2, 2, 2.0),
            Triplet::new(3, 0, 1.5),
            Triplet::new(3, 2, 0.5),
        ];
        LinearSystem::try_from_triplets(4, 3, &triplets, &[1.0, -2.0, 0.5, 1.2])
    }

    #[test]
    fn test_qr_agrees_with_cholesky() -> TestResult {
        let system = create_test_system()?;
        let mut qr = SparseQRSolver::new();
        let mut cholesky = SparseCholeskySolver::new();

        for damping in [1e-5, 1e-2, 10.0] {
            let a = qr.solve(&system, damping)?;
            let b = cholesky.solve(&system, damping)?;
            assert!((a - b).norm() < TOLERANCE, "damping {damping}");
        }
        assert!(qr.hessian().is_some());
        assert!(qr.gradient().is_some());
        Ok(())
    }

    #[test]
    fn test_qr_step_is_descent_direction() -> TestResult {
        let system = create_test_system()?;
        let mut qr = SparseQRSolver::new();
        let step = qr.solve(&system, 0.5)?;
        let g = column_to_dvector(&system.gradient());
        assert!(step.dot(&g) < 0.0);
        Ok(())
    }
}
