//! Nonlinear least-squares optimization.
//!
//! The optimizer consumes an objective through [`NonlinearObjective`]: it asks for a
//! [`LinearSystem`] at the current estimate, hands it to a
//! [`LinearSolver`](crate::linalg::LinearSolver) with a damping parameter, retracts the
//! estimate along the returned step and compares errors. The
//! [`LevenbergMarquardt`] state machine implements that loop; [`NonlinearOptimizer`] is
//! the driving interface shared with callers that step it one iteration at a time.

use crate::core::{CoreError, ordering::Ordering, values::Values};
use crate::linalg::{LinAlgError, LinearSystem};
use std::sync::Arc;
use std::{
    fmt,
    fmt::{Display, Formatter},
};
use thiserror::Error;
use tracing::error;
use web_time as time;

pub mod levenberg_marquardt;

pub use levenberg_marquardt::{LevenbergMarquardt, LevenbergMarquardtConfig};

// Re-export observer types from the observers module
pub use crate::observers::{OptObserver, OptObserverVec};

/// Optimizer-specific error types
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OptimizerError {
    /// Invalid optimization parameters provided
    #[error("Invalid optimization parameters: {0}")]
    InvalidParameters(String),

    /// Initial estimate has no variables
    #[error("Problem has no variables to optimize")]
    EmptyProblem,

    /// NaN or Inf in the error of an accepted estimate
    #[error("Numerical instability detected: {0}")]
    NumericalInstability(String),

    /// Damping grew past its bound before a step was accepted
    #[error("Damping parameter exceeded its bound: {damping:.6e} > {max_damping:.6e}")]
    DampingBoundExceeded { damping: f64, max_damping: f64 },

    /// Variable store or ordering misuse
    #[error("Variable store error: {0}")]
    Core(#[from] CoreError),

    /// Linear system assembly failed
    #[error("Linear algebra error: {0}")]
    LinAlg(#[from] LinAlgError),
}

impl OptimizerError {
    /// Log the error with tracing::error and return self for chaining
    ///
    /// # Example
    /// ```ignore
    /// config.validate().map_err(|e| e.log())?;
    /// ```
    #[must_use]
    pub fn log(self) -> Self {
        error!("{}", self);
        self
    }

    /// Log the error with the original source error from a third-party library
    #[must_use]
    pub fn log_with_source<E: std::fmt::Debug>(self, source_error: E) -> Self {
        error!("{} | Source: {:?}", self, source_error);
        self
    }
}

/// Result type for optimizer operations
pub type OptimizerResult<T> = Result<T, OptimizerError>;

/// Lifecycle of an optimization run.
///
/// `Initialized` and `Iterating` are the only non-terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizerState {
    /// Constructed, no iteration attempted yet
    Initialized,
    /// At least one step accepted, no stopping criterion met
    Iterating,
    /// An error tolerance was met
    Converged,
    /// No acceptable step could be found before damping exceeded its bound
    Failed,
    /// Iteration budget exhausted before convergence
    MaxIterationsReached,
    /// Wall-clock budget exhausted before convergence
    TimedOut,
}

impl OptimizerState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, OptimizerState::Initialized | OptimizerState::Iterating)
    }

    /// Terminal and not a failure.
    pub fn is_success(self) -> bool {
        matches!(self, OptimizerState::Converged)
    }
}

impl Display for OptimizerState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            OptimizerState::Initialized => write!(f, "Initialized"),
            OptimizerState::Iterating => write!(f, "Iterating"),
            OptimizerState::Converged => write!(f, "Converged"),
            OptimizerState::Failed => write!(f, "Failed"),
            OptimizerState::MaxIterationsReached => write!(f, "Maximum iterations reached"),
            OptimizerState::TimedOut => write!(f, "Timeout"),
        }
    }
}

/// Objective consumed by the optimizer.
///
/// Implementations must be pure functions of their inputs: linearizing or evaluating
/// the same estimate twice gives the same answer and has no side effect visible to
/// the optimizer.
pub trait NonlinearObjective {
    /// First-order model at `values`, with Jacobian columns laid out by `ordering`.
    /// [`LinearSystem::error`] of the result is the total error at `values`.
    fn linearize(&self, values: &Values, ordering: &Ordering) -> OptimizerResult<LinearSystem>;

    /// Total error at `values`.
    fn error(&self, values: &Values) -> OptimizerResult<f64>;

    /// Ordering to use when the caller supplies none.
    fn ordering(&self, values: &Values) -> OptimizerResult<Ordering> {
        Ok(Ordering::natural(values))
    }
}

/// Step-wise driving interface of an optimizer.
pub trait NonlinearOptimizer {
    /// Perform one iteration and return the resulting state. A no-op in a terminal state.
    fn iterate(&mut self) -> OptimizerResult<OptimizerState>;

    fn state(&self) -> OptimizerState;

    /// Latest accepted estimate.
    fn values(&self) -> &Values;

    /// Error of the latest accepted estimate.
    fn error(&self) -> f64;

    /// Number of accepted iterations.
    fn iterations(&self) -> usize;

    /// Iterate until a terminal state.
    fn run(&mut self) -> OptimizerResult<OptimizerState> {
        loop {
            let state = self.iterate()?;
            if state.is_terminal() {
                return Ok(state);
            }
        }
    }
}

/// Counters collected over a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConvergenceInfo {
    /// Norm of the last accepted step
    pub final_step_norm: f64,
    /// Damping after the last iteration
    pub final_damping: f64,
    /// Error evaluations, initial evaluation included
    pub cost_evaluations: usize,
    /// Linearizations
    pub jacobian_evaluations: usize,
    /// Accepted damping trials
    pub successful_steps: usize,
    /// Rejected damping trials, solver failures included
    pub unsuccessful_steps: usize,
}

impl Display for ConvergenceInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Final step norm: {:.2e}, Final damping: {:.2e}, Cost evaluations: {}, Jacobian evaluations: {}, Steps: {} accepted / {} rejected",
            self.final_step_norm,
            self.final_damping,
            self.cost_evaluations,
            self.jacobian_evaluations,
            self.successful_steps,
            self.unsuccessful_steps
        )
    }
}

/// Outcome of a complete optimization run.
#[derive(Debug, Clone)]
pub struct SolverResult {
    /// Final estimate
    pub values: Arc<Values>,
    /// Terminal state
    pub state: OptimizerState,
    pub initial_error: f64,
    pub final_error: f64,
    /// Accepted iterations
    pub iterations: usize,
    pub elapsed_time: time::Duration,
    pub convergence_info: ConvergenceInfo,
    /// Why the run failed, when `state` is [`OptimizerState::Failed`]
    pub failure: Option<OptimizerError>,
}
