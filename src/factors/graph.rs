//! Factor graph objective.
//!
//! Rows of the assembled system follow the order factors were added in; columns follow
//! the [`Ordering`] passed to [`linearize`](NonlinearObjective::linearize). Every
//! factor contributes a dense `dimension() × dim(key)` block per key, including
//! structural zeros, so the sparsity pattern is the same at every estimate and the
//! solvers can reuse their symbolic factorization.

use crate::core::{
    CoreError, CoreResult,
    key::Key,
    ordering::{MinimumDegreeOrdering, Ordering, OrderingBuilder},
    values::Values,
};
use crate::factors::Factor;
use crate::linalg::LinearSystem;
use crate::manifold::Value;
use crate::optimizer::{NonlinearObjective, OptimizerResult};
use faer::sparse::Triplet;
use nalgebra::DVector;
use std::collections::HashSet;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Residual rows and Jacobian entries of one factor.
type FactorBlock = (DVector<f64>, Vec<Triplet<usize, usize, f64>>);

/// Collection of factors, summed into one least-squares objective.
#[derive(Default)]
pub struct FactorGraph {
    factors: Vec<Box<dyn Factor>>,
}

impl FactorGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<F: Factor + 'static>(&mut self, factor: F) {
        self.factors.push(Box::new(factor));
    }

    pub fn add_boxed(&mut self, factor: Box<dyn Factor>) {
        self.factors.push(factor);
    }

    pub fn len(&self) -> usize {
        self.factors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    pub fn factors(&self) -> &[Box<dyn Factor>] {
        &self.factors
    }

    /// Every key referenced by a factor, in order of first appearance.
    pub fn keys(&self) -> Vec<Key> {
        let mut seen = HashSet::new();
        self.factors
            .iter()
            .flat_map(|f| f.keys().iter().copied())
            .filter(|k| seen.insert(*k))
            .collect()
    }

    /// Keys of each factor, the dependency structure used by ordering builders.
    pub fn structure(&self) -> Vec<Vec<Key>> {
        self.factors.iter().map(|f| f.keys().to_vec()).collect()
    }

    /// Total number of residual rows.
    pub fn residual_dimension(&self) -> usize {
        self.factors.iter().map(|f| f.dimension()).sum()
    }

    /// Residual of every factor at `values`, in insertion order.
    pub fn residuals(&self, values: &Values) -> CoreResult<Vec<DVector<f64>>> {
        #[cfg(feature = "parallel")]
        let residuals: CoreResult<Vec<DVector<f64>>> = self
            .factors
            .par_iter()
            .map(|factor| evaluate_factor(factor.as_ref(), values))
            .collect();

        #[cfg(not(feature = "parallel"))]
        let residuals: CoreResult<Vec<DVector<f64>>> = self
            .factors
            .iter()
            .map(|factor| evaluate_factor(factor.as_ref(), values))
            .collect();

        residuals
    }
}

impl NonlinearObjective for FactorGraph {
    fn linearize(&self, values: &Values, ordering: &Ordering) -> OptimizerResult<LinearSystem> {
        let (offsets, ncols) = values.offsets(ordering)?;

        let mut row_starts = Vec::with_capacity(self.factors.len());
        let mut nrows = 0;
        for factor in &self.factors {
            row_starts.push(nrows);
            nrows += factor.dimension();
        }

        #[cfg(feature = "parallel")]
        let blocks: CoreResult<Vec<FactorBlock>> = self
            .factors
            .par_iter()
            .zip(row_starts.par_iter())
            .map(|(factor, &row)| {
                linearize_factor(factor.as_ref(), values, ordering, &offsets, row)
            })
            .collect();

        #[cfg(not(feature = "parallel"))]
        let blocks: CoreResult<Vec<FactorBlock>> = self
            .factors
            .iter()
            .zip(row_starts.iter())
            .map(|(factor, &row)| {
                linearize_factor(factor.as_ref(), values, ordering, &offsets, row)
            })
            .collect();

        let blocks = blocks?;

        let mut residual = Vec::with_capacity(nrows);
        let mut triplets = Vec::with_capacity(blocks.iter().map(|(_, t)| t.len()).sum());
        for (r, mut t) in blocks {
            residual.extend(r.iter().copied());
            triplets.append(&mut t);
        }

        Ok(LinearSystem::try_from_triplets(
            nrows, ncols, &triplets, &residual,
        )?)
    }

    fn error(&self, values: &Values) -> OptimizerResult<f64> {
        let residuals = self.residuals(values)?;
        Ok(residuals.iter().map(|r| 0.5 * r.norm_squared()).sum())
    }

    fn ordering(&self, values: &Values) -> OptimizerResult<Ordering> {
        Ok(MinimumDegreeOrdering.build(&values.keys(), &self.structure())?)
    }
}

/// Current values of the factor's keys.
fn gather<'v>(
    factor: &dyn Factor,
    values: &'v Values,
    operation: &'static str,
) -> CoreResult<Vec<&'v dyn Value>> {
    factor
        .keys()
        .iter()
        .map(|key| {
            values
                .at(key)
                .map_err(|_| CoreError::KeyDoesNotExist { operation, key: *key })
        })
        .collect()
}

fn evaluate_factor(factor: &dyn Factor, values: &Values) -> CoreResult<DVector<f64>> {
    let args = gather(factor, values, "evaluate")?;
    let residual = factor.evaluate(&args)?;
    if residual.len() != factor.dimension() {
        return Err(CoreError::SizeMismatch(format!(
            "factor declares {} residual rows but produced {}",
            factor.dimension(),
            residual.len()
        )));
    }
    Ok(residual)
}

fn linearize_factor(
    factor: &dyn Factor,
    values: &Values,
    ordering: &Ordering,
    offsets: &[usize],
    row_start: usize,
) -> CoreResult<FactorBlock> {
    let args = gather(factor, values, "linearize")?;
    let (residual, jacobians) = factor.linearize(&args)?;

    let rows = factor.dimension();
    if residual.len() != rows || jacobians.len() != args.len() {
        return Err(CoreError::SizeMismatch(format!(
            "factor returned {} residual rows and {} Jacobian blocks, expected {} and {}",
            residual.len(),
            jacobians.len(),
            rows,
            args.len()
        )));
    }

    let mut triplets = Vec::with_capacity(jacobians.iter().map(|j| j.len()).sum());
    for ((key, value), jacobian) in factor.keys().iter().zip(&args).zip(&jacobians) {
        let slot = ordering.slot(key).ok_or(CoreError::KeyDoesNotExist {
            operation: "linearize",
            key: *key,
        })?;
        if jacobian.nrows() != rows || jacobian.ncols() != value.dim() {
            return Err(CoreError::SizeMismatch(format!(
                "Jacobian block for {key} is {}x{}, expected {}x{}",
                jacobian.nrows(),
                jacobian.ncols(),
                rows,
                value.dim()
            )));
        }

        let col_start = offsets[slot];
        for col in 0..jacobian.ncols() {
            for row in 0..rows {
                triplets.push(Triplet::new(
                    row_start + row,
                    col_start + col,
                    jacobian[(row, col)],
                ));
            }
        }
    }

    Ok((residual, triplets))
}
