//! Observer pattern for optimization monitoring.
//!
//! Observers registered with an optimizer are notified after every accepted step with
//! the new estimate, its error and the iteration number. They receive immutable
//! references and cannot influence the run.
//!
//! ```text
//! ┌─────────────────────┐
//! │ LevenbergMarquardt  │
//! └──────────┬──────────┘
//!            │ observers.notify(values, error, iteration)
//!            ├─────────────────┬─────────────────┐
//!            ▼                 ▼                 ▼
//!    ┌──────────────┐  ┌───────────────┐  ┌──────────┐
//!    │   Tracing    │  │    History    │  │  Custom  │
//!    │   Observer   │  │   Observer    │  │ Observer │
//!    └──────────────┘  └───────────────┘  └──────────┘
//! ```
//!
//! # Custom Observer
//!
//! ```
//! use manifold_lm::core::values::Values;
//! use manifold_lm::observers::OptObserver;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct StepCounter {
//!     steps: AtomicUsize,
//! }
//!
//! impl OptObserver for StepCounter {
//!     fn on_step(&self, _values: &Values, _error: f64, _iteration: usize) {
//!         self.steps.fetch_add(1, Ordering::Relaxed);
//!     }
//! }
//! ```

use crate::core::values::Values;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{error, info};

/// Observer-specific error types
#[derive(Debug, Clone, Error)]
pub enum ObserverError {
    /// Mutex was poisoned (thread panicked while holding lock)
    #[error("Mutex poisoned in {context}: {reason}")]
    MutexPoisoned { context: String, reason: String },
}

impl ObserverError {
    /// Log the error with tracing::error and return self for chaining
    #[must_use]
    pub fn log(self) -> Self {
        error!("{}", self);
        self
    }

    /// Log the error with the original source error
    #[must_use]
    pub fn log_with_source<E: std::fmt::Debug>(self, source_error: E) -> Self {
        error!("{} | Source: {:?}", self, source_error);
        self
    }
}

/// Result type for observer operations
pub type ObserverResult<T> = Result<T, ObserverError>;

/// Observer trait for monitoring optimization progress.
///
/// Observers should be lightweight and must not panic; errors are handled
/// internally. Use interior mutability (`Mutex`, atomics) to record state.
pub trait OptObserver: Send {
    /// Called after each accepted step.
    ///
    /// # Arguments
    ///
    /// * `values` - Estimate after the step
    /// * `error` - Objective error of `values`
    /// * `iteration` - Number of accepted steps so far, starting at 1
    fn on_step(&self, values: &Values, error: f64, iteration: usize);

    /// Called before `on_step` with the damping used for the accepted step and the
    /// norm of that step. Does nothing by default.
    fn set_iteration_metrics(&self, _damping: f64, _step_norm: f64) {}
}

/// Collection of observers, notified in registration order.
#[derive(Default)]
pub struct OptObserverVec {
    observers: Vec<Box<dyn OptObserver>>,
}

impl OptObserverVec {
    pub fn new() -> Self {
        Self {
            observers: Vec::new(),
        }
    }

    pub fn add(&mut self, observer: impl OptObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    #[inline]
    pub fn set_iteration_metrics(&self, damping: f64, step_norm: f64) {
        for observer in &self.observers {
            observer.set_iteration_metrics(damping, step_norm);
        }
    }

    /// Call `on_step()` on each registered observer. A no-op when empty.
    #[inline]
    pub fn notify(&self, values: &Values, error: f64, iteration: usize) {
        for observer in &self.observers {
            observer.on_step(values, error, iteration);
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.observers.len()
    }
}

/// Logs every accepted step at `info` level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl OptObserver for TracingObserver {
    fn on_step(&self, values: &Values, error: f64, iteration: usize) {
        info!(
            "iteration {:>4}: error = {:.6e} over {} variables",
            iteration,
            error,
            values.len()
        );
    }
}

/// Records `(iteration, error)` of every accepted step.
///
/// Clones share the same record, so keep one clone and register the other.
#[derive(Debug, Default, Clone)]
pub struct ErrorHistoryObserver {
    record: Arc<Mutex<Vec<(usize, f64)>>>,
}

impl ErrorHistoryObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the recorded steps.
    pub fn history(&self) -> ObserverResult<Vec<(usize, f64)>> {
        let guard = self.record.lock().map_err(|e| {
            ObserverError::MutexPoisoned {
                context: "ErrorHistoryObserver::history".to_string(),
                reason: e.to_string(),
            }
            .log()
        })?;
        Ok(guard.clone())
    }
}

impl OptObserver for ErrorHistoryObserver {
    fn on_step(&self, _values: &Values, error: f64, iteration: usize) {
        match self.record.lock() {
            Ok(mut guard) => guard.push((iteration, error)),
            Err(e) => {
                let _ = ObserverError::MutexPoisoned {
                    context: "ErrorHistoryObserver::on_step".to_string(),
                    reason: e.to_string(),
                }
                .log();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_observers() {
        let observers = OptObserverVec::new();
        assert!(observers.is_empty());
        assert_eq!(observers.len(), 0);

        // Should not panic with no observers
        observers.notify(&Values::new(), 0.0, 1);
    }

    #[test]
    fn test_history_observer_records_steps() -> ObserverResult<()> {
        let history = ErrorHistoryObserver::new();
        let mut observers = OptObserverVec::new();
        observers.add(history.clone());
        observers.add(TracingObserver);
        assert_eq!(observers.len(), 2);

        let values = Values::new();
        observers.notify(&values, 4.0, 1);
        observers.notify(&values, 1.5, 2);

        assert_eq!(history.history()?, vec![(1, 4.0), (2, 1.5)]);
        Ok(())
    }

    #[test]
    fn test_multiple_observers_see_same_step() -> ObserverResult<()> {
        let first = ErrorHistoryObserver::new();
        let second = ErrorHistoryObserver::new();

        let mut observers = OptObserverVec::new();
        observers.add(first.clone());
        observers.add(second.clone());
        observers.set_iteration_metrics(1e-3, 0.2);
        observers.notify(&Values::new(), 0.25, 5);

        assert_eq!(first.history()?, vec![(5, 0.25)]);
        assert_eq!(second.history()?, vec![(5, 0.25)]);
        Ok(())
    }
}
