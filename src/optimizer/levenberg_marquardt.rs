//! Levenberg-Marquardt algorithm implementation.
//!
//! The Levenberg-Marquardt (LM) method minimizes objectives of the form
//!
//! ```text
//! min E(x) = ½‖r(x)‖²
//! ```
//!
//! over manifold-valued variables `x`. Each iteration linearizes the objective at the
//! current estimate and solves the damped normal equations
//!
//! ```text
//! (JᵀJ + λI)·δ = −Jᵀr
//! ```
//!
//! for a tangent step `δ`, which is applied through [`Values::retract`].
//!
//! ## Damping
//!
//! - **λ → 0**: Gauss-Newton, fast convergence near the solution
//! - **λ → ∞**: short gradient-descent steps, robust far from it
//!
//! A step is accepted only if it strictly decreases the error. After an acceptance λ is
//! divided by `damping_factor` (never below `min_damping`); after a rejection, or when
//! the linear solver fails, λ is multiplied by it and the same linearization is solved
//! again. Once λ exceeds `max_damping` the run ends in [`OptimizerState::Failed`] with
//! [`OptimizerError::DampingBoundExceeded`], keeping the last accepted estimate.
//!
//! ## Lifecycle
//!
//! ```text
//! Initialized ──▶ Iterating ──▶ Converged | Failed | MaxIterationsReached | TimedOut
//! ```
//!
//! [`LevenbergMarquardt::iterate`] performs one iteration and returns the resulting
//! [`OptimizerState`]; it is a no-op once a terminal state is reached.
//! [`LevenbergMarquardt::optimize`] iterates to a terminal state and reports a
//! [`SolverResult`].
//!
//! # Example
//!
//! ```
//! use manifold_lm::core::{key::Key, values::Values};
//! use manifold_lm::factors::{BetweenFactor, FactorGraph, PriorFactor};
//! use manifold_lm::optimizer::{LevenbergMarquardt, LevenbergMarquardtConfig, OptimizerState};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let (x1, x2) = (Key::new('x', 1), Key::new('x', 2));
//! let mut graph = FactorGraph::new();
//! graph.add(PriorFactor::with_sigma(x1, 0.0_f64, 1e-3)?);
//! graph.add(BetweenFactor::new(x1, x2, 2.0_f64));
//!
//! let mut initial = Values::new();
//! initial.insert(x1, &0.5_f64)?;
//! initial.insert(x2, &-1.0_f64)?;
//!
//! let config = LevenbergMarquardtConfig::new().with_absolute_error_tolerance(1e-6);
//! let mut solver = LevenbergMarquardt::new(&graph, initial, config)?;
//! let result = solver.optimize()?;
//!
//! assert_eq!(result.state, OptimizerState::Converged);
//! assert!((result.values.retrieve::<f64>(&x2)? - 2.0).abs() < 1e-3);
//! # Ok(())
//! # }
//! ```
//!
//! # References
//!
//! - Levenberg, K. (1944). "A Method for the Solution of Certain Non-Linear Problems in Least Squares". *Quarterly of Applied Mathematics*.
//! - Marquardt, D. W. (1963). "An Algorithm for Least-Squares Estimation of Nonlinear Parameters". *Journal of the Society for Industrial and Applied Mathematics*.
//! - Madsen, K., Nielsen, H. B., & Tingleff, O. (2004). *Methods for Non-Linear Least Squares Problems* (2nd ed.). Chapter 3.

use crate::core::{ordering::Ordering, values::Values};
use crate::linalg::{LinAlgError, LinearSolver, LinearSolverType, LinearSystem};
use crate::observers::{OptObserver, OptObserverVec};
use crate::optimizer::{
    ConvergenceInfo, NonlinearObjective, NonlinearOptimizer, OptimizerError, OptimizerResult,
    OptimizerState, SolverResult,
};

use nalgebra::DVector;
use std::sync::Arc;
use std::{
    fmt,
    fmt::{Display, Formatter},
};
use tracing::{debug, trace, warn};
use web_time::{Duration, Instant};

/// Relative slack on `max_damping`.
const DAMPING_BOUND_RTOL: f64 = 1e-12;

/// Summary statistics for the Levenberg-Marquardt optimization process.
#[derive(Debug, Clone)]
pub struct LevenbergMarquardtSummary {
    /// Error of the initial estimate
    pub initial_error: f64,
    /// Error of the final estimate
    pub final_error: f64,
    /// Accepted iterations
    pub iterations: usize,
    /// Accepted damping trials
    pub successful_steps: usize,
    /// Rejected damping trials, solver failures included
    pub unsuccessful_steps: usize,
    /// Damping parameter at termination
    pub final_damping: f64,
    /// Total time elapsed
    pub total_time: Duration,
    /// Average time per accepted iteration
    pub average_time_per_iteration: Duration,
    /// Terminal state
    pub state: OptimizerState,
    /// Recorded failure, if the run failed
    pub failure: Option<OptimizerError>,
}

impl Display for LevenbergMarquardtSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "Levenberg-Marquardt Final Result")?;

        if self.state.is_success() {
            writeln!(f, "CONVERGED ({})", self.state)?;
        } else {
            writeln!(f, "NOT CONVERGED ({})", self.state)?;
        }

        writeln!(f)?;
        writeln!(f, "Error:")?;
        writeln!(f, "  Initial:   {:.6e}", self.initial_error)?;
        writeln!(f, "  Final:     {:.6e}", self.final_error)?;
        writeln!(
            f,
            "  Reduction: {:.6e} ({:.2}%)",
            self.initial_error - self.final_error,
            100.0 * (self.initial_error - self.final_error) / self.initial_error.max(1e-12)
        )?;
        writeln!(f)?;
        writeln!(f, "Iterations:")?;
        writeln!(f, "  Total:              {}", self.iterations)?;
        let trials = (self.successful_steps + self.unsuccessful_steps).max(1) as f64;
        writeln!(
            f,
            "  Successful steps:   {} ({:.1}%)",
            self.successful_steps,
            100.0 * self.successful_steps as f64 / trials
        )?;
        writeln!(
            f,
            "  Unsuccessful steps: {} ({:.1}%)",
            self.unsuccessful_steps,
            100.0 * self.unsuccessful_steps as f64 / trials
        )?;
        writeln!(f, "  Final damping:      {:.2e}", self.final_damping)?;
        writeln!(f)?;
        writeln!(f, "Performance:")?;
        writeln!(
            f,
            "  Total time:             {:.2}ms",
            self.total_time.as_secs_f64() * 1000.0
        )?;
        write!(
            f,
            "  Average per iteration:  {:.2}ms",
            self.average_time_per_iteration.as_secs_f64() * 1000.0
        )?;

        if let Some(failure) = &self.failure {
            writeln!(f)?;
            write!(f, "Failure: {failure}")?;
        }
        Ok(())
    }
}

/// Statistics of one accepted iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct IterationStats {
    /// Iteration number, starting at 1
    pub iteration: usize,
    /// Error after the step
    pub error: f64,
    /// Decrease of the error achieved by the step
    pub error_change: f64,
    /// ‖Jᵀr‖ at the linearization point
    pub gradient_norm: f64,
    /// ‖δ‖ of the accepted step
    pub step_norm: f64,
    /// Damping the accepted step was solved with
    pub damping: f64,
    /// Damping trials needed, the accepted one included
    pub trials: usize,
    pub iter_time_ms: f64,
    /// Elapsed time since construction of the optimizer
    pub total_time_ms: f64,
}

impl IterationStats {
    pub fn print_header() {
        debug!(
            "{:>4}  {:>13}  {:>13}  {:>13}  {:>13}  {:>11}  {:>6}  {:>11}  {:>13}",
            "iter",
            "error",
            "error_change",
            "|gradient|",
            "|step|",
            "damping",
            "trials",
            "iter_time",
            "total_time"
        );
    }

    pub fn print_line(&self) {
        debug!(
            "{:>4}  {:>13.6e}  {:>13.2e}  {:>13.2e}  {:>13.2e}  {:>11.2e}  {:>6}  {:>9.2}ms  {:>11.2}ms",
            self.iteration,
            self.error,
            self.error_change,
            self.gradient_norm,
            self.step_norm,
            self.damping,
            self.trials,
            self.iter_time_ms,
            self.total_time_ms
        );
    }
}

/// Configuration parameters for the Levenberg-Marquardt optimizer.
///
/// ```
/// use manifold_lm::optimizer::LevenbergMarquardtConfig;
///
/// let config = LevenbergMarquardtConfig::new()
///     .with_max_iterations(50)
///     .with_initial_damping(1e-3)
///     .with_damping_bounds(1e-12, 1e8)
///     .with_relative_error_tolerance(1e-8);
/// assert!(config.validate().is_ok());
/// ```
///
/// # Termination
///
/// After every accepted step the optimizer stops when, in this order:
///
/// - **Absolute error**: `E_new < absolute_error_tolerance`
/// - **Relative decrease**: `(E_cur − E_new) / E_cur < relative_error_tolerance`
/// - **Absolute decrease**: `E_cur − E_new < absolute_decrease_tolerance`
/// - **Maximum iterations**: `iterations >= max_iterations`
/// - **Timeout**: `elapsed >= timeout`
#[derive(Debug, Clone)]
pub struct LevenbergMarquardtConfig {
    /// Type of linear solver for the damped systems
    pub linear_solver_type: LinearSolverType,
    /// Maximum number of accepted iterations
    pub max_iterations: usize,
    /// Damping of the first trial
    pub initial_damping: f64,
    /// Multiplier applied on rejection, divisor on acceptance
    pub damping_factor: f64,
    /// Damping above which an iteration gives up
    pub max_damping: f64,
    /// Floor applied after an acceptance
    pub min_damping: f64,
    pub absolute_error_tolerance: f64,
    pub relative_error_tolerance: f64,
    /// Disabled at 0
    pub absolute_decrease_tolerance: f64,
    /// Variable ordering. Computed by the objective when unset.
    pub ordering: Option<Ordering>,
    /// Wall-clock budget measured from construction of the optimizer
    pub timeout: Option<Duration>,
}

impl Default for LevenbergMarquardtConfig {
    fn default() -> Self {
        Self {
            linear_solver_type: LinearSolverType::default(),
            max_iterations: 100,
            initial_damping: 1e-5,
            damping_factor: 10.0,
            max_damping: 1e5,
            min_damping: 1e-12,
            absolute_error_tolerance: 1e-5,
            relative_error_tolerance: 1e-5,
            absolute_decrease_tolerance: 0.0,
            ordering: None,
            timeout: None,
        }
    }
}

impl LevenbergMarquardtConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_linear_solver_type(mut self, linear_solver_type: LinearSolverType) -> Self {
        self.linear_solver_type = linear_solver_type;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_initial_damping(mut self, damping: f64) -> Self {
        self.initial_damping = damping;
        self
    }

    pub fn with_damping_factor(mut self, factor: f64) -> Self {
        self.damping_factor = factor;
        self
    }

    /// Set the damping parameter bounds.
    pub fn with_damping_bounds(mut self, min: f64, max: f64) -> Self {
        self.min_damping = min;
        self.max_damping = max;
        self
    }

    pub fn with_absolute_error_tolerance(mut self, tolerance: f64) -> Self {
        self.absolute_error_tolerance = tolerance;
        self
    }

    pub fn with_relative_error_tolerance(mut self, tolerance: f64) -> Self {
        self.relative_error_tolerance = tolerance;
        self
    }

    pub fn with_absolute_decrease_tolerance(mut self, tolerance: f64) -> Self {
        self.absolute_decrease_tolerance = tolerance;
        self
    }

    /// Use `ordering` instead of asking the objective for one.
    pub fn with_ordering(mut self, ordering: Ordering) -> Self {
        self.ordering = Some(ordering);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Check the parameters for consistency.
    ///
    /// # Errors
    /// `OptimizerError::InvalidParameters` naming the first offending parameter.
    pub fn validate(&self) -> OptimizerResult<()> {
        let positive = |name: &str, value: f64| {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(OptimizerError::InvalidParameters(format!(
                    "{name} must be positive and finite, got {value}"
                )))
            }
        };
        let non_negative = |name: &str, value: f64| {
            if value.is_finite() && value >= 0.0 {
                Ok(())
            } else {
                Err(OptimizerError::InvalidParameters(format!(
                    "{name} must be non-negative and finite, got {value}"
                )))
            }
        };

        positive("initial_damping", self.initial_damping)?;
        positive("min_damping", self.min_damping)?;
        positive("max_damping", self.max_damping)?;
        non_negative("absolute_error_tolerance", self.absolute_error_tolerance)?;
        non_negative("relative_error_tolerance", self.relative_error_tolerance)?;
        non_negative("absolute_decrease_tolerance", self.absolute_decrease_tolerance)?;

        if !(self.damping_factor.is_finite() && self.damping_factor > 1.0) {
            return Err(OptimizerError::InvalidParameters(format!(
                "damping_factor must be greater than 1, got {}",
                self.damping_factor
            )));
        }
        if self.min_damping > self.max_damping {
            return Err(OptimizerError::InvalidParameters(format!(
                "min_damping {:e} exceeds max_damping {:e}",
                self.min_damping, self.max_damping
            )));
        }
        if self.initial_damping > self.max_damping {
            return Err(OptimizerError::InvalidParameters(format!(
                "initial_damping {:e} exceeds max_damping {:e}",
                self.initial_damping, self.max_damping
            )));
        }
        Ok(())
    }

    /// Log the configuration at debug level.
    pub fn print_configuration(&self) {
        debug!(
            "Configuration:\n  Solver:        Levenberg-Marquardt\n  Linear solver: {}\n  Convergence Criteria:\n  Max iterations:              {}\n  Absolute error tolerance:    {:.2e}\n  Relative error tolerance:    {:.2e}\n  Absolute decrease tolerance: {:.2e}\n  Timeout:                     {:?}\n  Damping Parameters:\n  Initial damping:     {:.2e}\n  Damping range:       [{:.2e}, {:.2e}]\n  Damping factor:      {:.2}\n  Ordering:            {}",
            self.linear_solver_type,
            self.max_iterations,
            self.absolute_error_tolerance,
            self.relative_error_tolerance,
            self.absolute_decrease_tolerance,
            self.timeout,
            self.initial_damping,
            self.min_damping,
            self.max_damping,
            self.damping_factor,
            if self.ordering.is_some() {
                "provided"
            } else {
                "computed by objective"
            }
        );
    }
}

/// Outcome of one damping trial.
enum Trial {
    Accepted {
        candidate: Values,
        error: f64,
        step_norm: f64,
    },
    Rejected,
    SolverFailed,
}

/// Levenberg-Marquardt optimizer over a [`NonlinearObjective`].
///
/// Owns the current estimate and the damping state; borrows the objective for the
/// duration of the run. Every accepted estimate is published as a fresh
/// `Arc<Values>` ([`snapshot`](Self::snapshot)), so readers holding an older snapshot
/// never observe a store being mutated.
pub struct LevenbergMarquardt<'a, O: NonlinearObjective + ?Sized> {
    objective: &'a O,
    config: LevenbergMarquardtConfig,
    ordering: Ordering,
    dimension: usize,
    estimate: Arc<Values>,
    error: f64,
    initial_error: f64,
    lambda: f64,
    iterations: usize,
    state: OptimizerState,
    failure: Option<OptimizerError>,
    linear_solver: Box<dyn LinearSolver>,
    observers: OptObserverVec,
    history: Vec<IterationStats>,
    info: ConvergenceInfo,
    start_time: Instant,
}

impl<'a, O: NonlinearObjective + ?Sized> LevenbergMarquardt<'a, O> {
    /// Set up a run from `initial`.
    ///
    /// # Errors
    /// - `InvalidParameters` if the configuration does not validate
    /// - `EmptyProblem` if `initial` holds no variables
    /// - `Core(SizeMismatch)` if the ordering does not cover exactly the keys of `initial`
    /// - `NumericalInstability` if the initial error is not finite
    /// - any error of `objective.ordering` or `objective.error`
    pub fn new(
        objective: &'a O,
        initial: Values,
        config: LevenbergMarquardtConfig,
    ) -> OptimizerResult<Self> {
        config.validate().map_err(|e| e.log())?;
        if initial.is_empty() {
            return Err(OptimizerError::EmptyProblem.log());
        }

        let ordering = match &config.ordering {
            Some(ordering) => ordering.clone(),
            None => objective.ordering(&initial)?,
        };
        let dimension = initial
            .total_dimension(&ordering)
            .map_err(|e| OptimizerError::from(e).log())?;

        let error = objective.error(&initial)?;
        if !error.is_finite() {
            return Err(OptimizerError::NumericalInstability(format!(
                "initial error is {error}"
            ))
            .log());
        }

        if tracing::enabled!(tracing::Level::DEBUG) {
            config.print_configuration();
        }

        let linear_solver = config.linear_solver_type.create();
        let lambda = config.initial_damping;
        Ok(Self {
            objective,
            config,
            ordering,
            dimension,
            estimate: Arc::new(initial),
            error,
            initial_error: error,
            lambda,
            iterations: 0,
            state: OptimizerState::Initialized,
            failure: None,
            linear_solver,
            observers: OptObserverVec::new(),
            history: Vec::new(),
            info: ConvergenceInfo {
                final_damping: lambda,
                cost_evaluations: 1,
                ..ConvergenceInfo::default()
            },
            start_time: Instant::now(),
        })
    }

    /// Replace the solver selected by `config.linear_solver_type`.
    pub fn with_linear_solver(mut self, linear_solver: Box<dyn LinearSolver>) -> Self {
        self.linear_solver = linear_solver;
        self
    }

    /// Register an observer notified after every accepted step.
    pub fn add_observer(&mut self, observer: impl OptObserver + 'static) {
        self.observers.add(observer);
    }

    /// Latest accepted estimate.
    pub fn values(&self) -> &Values {
        &self.estimate
    }

    /// Shared handle to the latest accepted estimate.
    pub fn snapshot(&self) -> Arc<Values> {
        Arc::clone(&self.estimate)
    }

    /// Error of the latest accepted estimate.
    pub fn error(&self) -> f64 {
        self.error
    }

    pub fn initial_error(&self) -> f64 {
        self.initial_error
    }

    /// Current damping parameter λ.
    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    /// Number of accepted iterations.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn state(&self) -> OptimizerState {
        self.state
    }

    pub fn ordering(&self) -> &Ordering {
        &self.ordering
    }

    pub fn config(&self) -> &LevenbergMarquardtConfig {
        &self.config
    }

    /// Why the run failed, once the state is [`OptimizerState::Failed`].
    pub fn failure(&self) -> Option<&OptimizerError> {
        self.failure.as_ref()
    }

    /// Statistics of every accepted iteration.
    pub fn history(&self) -> &[IterationStats] {
        &self.history
    }

    pub fn convergence_info(&self) -> &ConvergenceInfo {
        &self.info
    }

    pub fn linear_solver_name(&self) -> &'static str {
        self.linear_solver.name()
    }

    /// Perform one iteration.
    ///
    /// Linearizes once at the current estimate and retries the damped solve with
    /// growing λ until a step strictly decreases the error or λ exceeds
    /// `max_damping`. Returns the state after the iteration; in a terminal state this
    /// is a no-op.
    ///
    /// # Errors
    /// Errors of the objective and store misuse are returned unchanged and leave the
    /// estimate untouched. Numerical failures of the linear solver are not errors.
    pub fn iterate(&mut self) -> OptimizerResult<OptimizerState> {
        if self.state.is_terminal() {
            return Ok(self.state);
        }
        if self.config.max_iterations == 0 {
            return Ok(self.finish(OptimizerState::MaxIterationsReached));
        }
        if self.error < self.config.absolute_error_tolerance {
            return Ok(self.finish(OptimizerState::Converged));
        }
        if self.timed_out() {
            return Ok(self.finish(OptimizerState::TimedOut));
        }

        let iter_start = Instant::now();
        let system = self.objective.linearize(&self.estimate, &self.ordering)?;
        self.info.jacobian_evaluations += 1;
        if system.ncols() != self.dimension {
            return Err(OptimizerError::from(LinAlgError::DimensionMismatch(format!(
                "linear system has {} columns, estimate has tangent dimension {}",
                system.ncols(),
                self.dimension
            )))
            .log());
        }
        let gradient_norm = system.gradient().norm_l2();

        let mut trials = 0;
        loop {
            trials += 1;
            let damping = self.lambda;
            match self.try_damping(&system, damping)? {
                Trial::Accepted {
                    candidate,
                    error,
                    step_norm,
                } => {
                    let previous = self.error;
                    self.accept(candidate, error, step_norm);
                    self.record(IterationStats {
                        iteration: self.iterations,
                        error,
                        error_change: previous - error,
                        gradient_norm,
                        step_norm,
                        damping,
                        trials,
                        iter_time_ms: iter_start.elapsed().as_secs_f64() * 1000.0,
                        total_time_ms: self.start_time.elapsed().as_secs_f64() * 1000.0,
                    });
                    self.observers.set_iteration_metrics(damping, step_norm);
                    self.observers
                        .notify(&self.estimate, self.error, self.iterations);

                    let state = self.check_termination(previous, error);
                    return Ok(self.finish(state));
                }
                Trial::Rejected | Trial::SolverFailed => {}
            }

            self.info.unsuccessful_steps += 1;
            self.lambda *= self.config.damping_factor;
            self.info.final_damping = self.lambda;
            if self.damping_exceeds_bound() {
                return Ok(self.damping_exhausted());
            }
        }
    }

    /// Iterate until a terminal state and report the run.
    pub fn optimize(&mut self) -> OptimizerResult<SolverResult> {
        if tracing::enabled!(tracing::Level::DEBUG) && !self.state.is_terminal() {
            IterationStats::print_header();
        }

        NonlinearOptimizer::run(self)?;

        if tracing::enabled!(tracing::Level::DEBUG) {
            debug!("{}", self.summary());
        }
        Ok(self.result())
    }

    /// Result of the run so far.
    pub fn result(&self) -> SolverResult {
        SolverResult {
            values: self.snapshot(),
            state: self.state,
            initial_error: self.initial_error,
            final_error: self.error,
            iterations: self.iterations,
            elapsed_time: self.start_time.elapsed(),
            convergence_info: self.info.clone(),
            failure: self.failure.clone(),
        }
    }

    pub fn summary(&self) -> LevenbergMarquardtSummary {
        let total_time = self.start_time.elapsed();
        LevenbergMarquardtSummary {
            initial_error: self.initial_error,
            final_error: self.error,
            iterations: self.iterations,
            successful_steps: self.info.successful_steps,
            unsuccessful_steps: self.info.unsuccessful_steps,
            final_damping: self.lambda,
            total_time,
            average_time_per_iteration: if self.iterations > 0 {
                total_time / self.iterations as u32
            } else {
                Duration::from_secs(0)
            },
            state: self.state,
            failure: self.failure.clone(),
        }
    }

    fn try_damping(&mut self, system: &LinearSystem, damping: f64) -> OptimizerResult<Trial> {
        let delta: DVector<f64> = match self.linear_solver.solve(system, damping) {
            Ok(delta) => delta,
            Err(e) => {
                trace!(
                    "λ = {:.3e}: {} failed: {}",
                    damping,
                    self.linear_solver.name(),
                    e
                );
                return Ok(Trial::SolverFailed);
            }
        };
        if delta.len() != self.dimension {
            return Err(OptimizerError::from(LinAlgError::DimensionMismatch(format!(
                "solver returned {} entries, expected {}",
                delta.len(),
                self.dimension
            )))
            .log());
        }
        if delta.iter().any(|v| !v.is_finite()) {
            trace!("λ = {:.3e}: non-finite step", damping);
            return Ok(Trial::SolverFailed);
        }

        let candidate = self.estimate.retract(&delta, &self.ordering)?;
        let error = self.objective.error(&candidate)?;
        self.info.cost_evaluations += 1;

        if error.is_finite() && error < self.error {
            trace!(
                "λ = {:.3e}: accepted, error {:.6e} -> {:.6e}",
                damping, self.error, error
            );
            Ok(Trial::Accepted {
                candidate,
                error,
                step_norm: delta.norm(),
            })
        } else {
            trace!(
                "λ = {:.3e}: rejected, error {:.6e} -> {:.6e}",
                damping, self.error, error
            );
            Ok(Trial::Rejected)
        }
    }

    fn accept(&mut self, candidate: Values, error: f64, step_norm: f64) {
        self.estimate = Arc::new(candidate);
        self.error = error;
        self.lambda = (self.lambda / self.config.damping_factor).max(self.config.min_damping);
        self.iterations += 1;
        self.info.successful_steps += 1;
        self.info.final_step_norm = step_norm;
        self.info.final_damping = self.lambda;
    }

    fn record(&mut self, stats: IterationStats) {
        if tracing::enabled!(tracing::Level::DEBUG) {
            stats.print_line();
        }
        self.history.push(stats);
    }

    fn check_termination(&self, previous: f64, current: f64) -> OptimizerState {
        let decrease = previous - current;
        if current < self.config.absolute_error_tolerance {
            OptimizerState::Converged
        } else if decrease / previous < self.config.relative_error_tolerance {
            OptimizerState::Converged
        } else if decrease < self.config.absolute_decrease_tolerance {
            OptimizerState::Converged
        } else if self.iterations >= self.config.max_iterations {
            OptimizerState::MaxIterationsReached
        } else if self.timed_out() {
            OptimizerState::TimedOut
        } else {
            OptimizerState::Iterating
        }
    }

    /// Rounding of repeated multiply and divide never pushes λ past the bound.
    fn damping_exceeds_bound(&self) -> bool {
        self.lambda > self.config.max_damping * (1.0 + DAMPING_BOUND_RTOL)
    }

    /// The estimate stays at the last accepted step.
    fn damping_exhausted(&mut self) -> OptimizerState {
        let failure = OptimizerError::DampingBoundExceeded {
            damping: self.lambda,
            max_damping: self.config.max_damping,
        };
        warn!(
            "{} after {} accepted iterations, error {:.6e}",
            failure, self.iterations, self.error
        );
        self.failure = Some(failure);
        self.finish(OptimizerState::Failed)
    }

    fn finish(&mut self, state: OptimizerState) -> OptimizerState {
        self.state = state;
        state
    }

    fn timed_out(&self) -> bool {
        self.config
            .timeout
            .is_some_and(|timeout| self.start_time.elapsed() >= timeout)
    }
}

impl<O: NonlinearObjective + ?Sized> NonlinearOptimizer for LevenbergMarquardt<'_, O> {
    fn iterate(&mut self) -> OptimizerResult<OptimizerState> {
        LevenbergMarquardt::iterate(self)
    }

    fn state(&self) -> OptimizerState {
        self.state
    }

    fn values(&self) -> &Values {
        &self.estimate
    }

    fn error(&self) -> f64 {
        self.error
    }

    fn iterations(&self) -> usize {
        self.iterations
    }
}
