//! # Manifold LM
//!
//! Nonlinear least-squares optimization over variables that live on manifolds, for
//! pose-graph SLAM, calibration and similar estimation problems.
//!
//! ## Building blocks
//!
//! - **Variables**: anything implementing [`Manifold`](manifold::Manifold) (`f64`, `Rn`,
//!   `Rot2`, `Pose2`, or your own type) is stored under a [`Key`](core::key::Key) in a
//!   heterogeneous [`Values`](core::values::Values) store
//! - **Objective**: a [`FactorGraph`] of [`Factor`]s, or any type implementing
//!   [`NonlinearObjective`]
//! - **Optimizer**: the [`LevenbergMarquardt`] state machine, stepped one iteration at
//!   a time or run to completion
//! - **Linear algebra**: damped normal equations solved with sparse Cholesky or sparse
//!   QR from faer
//!
//! ## Example
//!
//! ```
//! use manifold_lm::core::{key::Key, values::Values};
//! use manifold_lm::manifold::pose2::Pose2;
//! use manifold_lm::{BetweenFactor, FactorGraph, LevenbergMarquardt, LevenbergMarquardtConfig, PriorFactor};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let keys: Vec<Key> = (0..3).map(|i| Key::new('x', i)).collect();
//!
//! let mut graph = FactorGraph::new();
//! graph.add(PriorFactor::new(keys[0], Pose2::default()));
//! graph.add(BetweenFactor::new(keys[0], keys[1], Pose2::new(1.0, 0.0, 0.0)));
//! graph.add(BetweenFactor::new(keys[1], keys[2], Pose2::new(1.0, 0.0, 0.0)));
//!
//! let mut initial = Values::new();
//! initial.insert(keys[0], &Pose2::new(0.1, -0.1, 0.05))?;
//! initial.insert(keys[1], &Pose2::new(0.9, 0.2, -0.1))?;
//! initial.insert(keys[2], &Pose2::new(2.2, -0.1, 0.1))?;
//!
//! let mut optimizer = LevenbergMarquardt::new(&graph, initial, LevenbergMarquardtConfig::new())?;
//! let result = optimizer.optimize()?;
//! assert!(result.state.is_success());
//!
//! let last = result.values.retrieve::<Pose2>(&keys[2])?;
//! assert!((last.x() - 2.0).abs() < 1e-2);
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod error;
pub mod factors;
pub mod linalg;
#[cfg(feature = "logging")]
pub mod logger;
pub mod manifold;
pub mod observers;
pub mod optimizer;

pub use core::{key::Key, ordering::Ordering, values::Values};
pub use error::{ManifoldLmError, ManifoldLmResult};

pub use factors::{BetweenFactor, Factor, FactorGraph, PriorFactor};

pub use linalg::{LinearSolver, LinearSolverType, SparseCholeskySolver, SparseQRSolver};
#[cfg(feature = "logging")]
pub use logger::{init_logger, init_logger_with_level};
pub use observers::{ErrorHistoryObserver, TracingObserver};
pub use optimizer::{
    LevenbergMarquardt, LevenbergMarquardtConfig, NonlinearObjective, NonlinearOptimizer,
    OptObserver, OptObserverVec, OptimizerState, SolverResult,
};
