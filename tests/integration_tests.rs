//! End-to-end tests of the variable store, factor graph and optimizer.
//!
//! # Test Coverage
//!
//! - **Store algebra**: randomized retract / local-coordinates round trips over a store
//!   mixing every bundled manifold
//! - **Pose graphs**: a noisy planar square with a loop closure, solved with both
//!   linear solvers
//! - **Degenerate problems**: rank-deficient Jacobians and solvers that never succeed
//! - **Error reporting**: crate-level error chains for missing variables

use manifold_lm::core::{
    CoreError, CoreResult,
    key::Key,
    ordering::{MinimumDegreeOrdering, NaturalOrdering, Ordering, OrderingBuilder},
    values::Values,
};
use manifold_lm::factors::{BetweenFactor, Factor, FactorGraph, PriorFactor};
use manifold_lm::linalg::{
    LinAlgError, LinAlgResult, LinearSolver, LinearSolverType, LinearSystem, SparseCholeskySolver,
    SparseQRSolver,
};
use manifold_lm::manifold::{LieGroup, Manifold, Value, pose2::Pose2, rn::Rn, rot2::Rot2};
use manifold_lm::observers::ErrorHistoryObserver;
use manifold_lm::optimizer::{
    LevenbergMarquardt, LevenbergMarquardtConfig, NonlinearObjective, NonlinearOptimizer,
    OptimizerError, OptimizerState,
};
use manifold_lm::{ManifoldLmError, ManifoldLmResult};
use nalgebra::DVector;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::FRAC_PI_2;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn x(i: u64) -> Key {
    Key::new('x', i)
}

fn mixed_store() -> CoreResult<Values> {
    let mut values = Values::new();
    values.insert(x(0), &1.5_f64)?;
    values.insert(Key::new('v', 0), &Rn::from_slice(&[0.5, -2.0, 3.0]))?;
    values.insert(Key::new('r', 0), &Rot2::from_angle(2.5))?;
    values.insert(x(1), &Pose2::new(-1.0, 4.0, -0.7))?;
    Ok(values)
}

fn random_delta(rng: &mut StdRng, dim: usize) -> DVector<f64> {
    DVector::from_fn(dim, |_, _| rng.random_range(-0.8..0.8))
}

/// Corners of a unit square, walked counter-clockwise.
fn square_truth() -> Vec<Pose2> {
    vec![
        Pose2::new(0.0, 0.0, 0.0),
        Pose2::new(1.0, 0.0, FRAC_PI_2),
        Pose2::new(1.0, 1.0, 2.0 * FRAC_PI_2),
        Pose2::new(0.0, 1.0, -FRAC_PI_2),
    ]
}

/// Odometry around the square plus the closing edge, anchored by a prior.
fn square_graph(truth: &[Pose2]) -> CoreResult<FactorGraph> {
    let n = truth.len();
    let mut graph = FactorGraph::new();
    graph.add(PriorFactor::with_sigma(x(0), truth[0], 1e-2)?);
    for i in 0..n {
        let j = (i + 1) % n;
        graph.add(BetweenFactor::with_sigma(
            x(i as u64),
            x(j as u64),
            truth[i].between(&truth[j]),
            0.1,
        )?);
    }
    Ok(graph)
}

fn noisy_estimate(truth: &[Pose2], rng: &mut StdRng) -> CoreResult<Values> {
    let mut values = Values::new();
    for (i, pose) in truth.iter().enumerate() {
        let noise = DVector::from_vec(vec![
            rng.random_range(-0.15..0.15),
            rng.random_range(-0.15..0.15),
            rng.random_range(-0.1..0.1),
        ]);
        values.insert(x(i as u64), &pose.retract(&noise))?;
    }
    Ok(values)
}

/// r = Σ xᵢ − target over scalar variables; one row, so JᵀJ is singular for two keys.
struct SumFactor {
    keys: Vec<Key>,
    target: f64,
}

impl Factor for SumFactor {
    fn keys(&self) -> &[Key] {
        &self.keys
    }

    fn dimension(&self) -> usize {
        1
    }

    fn evaluate(&self, values: &[&dyn Value]) -> CoreResult<DVector<f64>> {
        let mut sum = 0.0;
        for (key, value) in self.keys.iter().zip(values) {
            let v = value
                .downcast_ref::<f64>()
                .ok_or_else(|| CoreError::IncorrectType {
                    key: *key,
                    stored: value.type_name(),
                    requested: "f64",
                })?;
            sum += v;
        }
        Ok(DVector::from_element(1, sum - self.target))
    }
}

struct NeverSolves;

impl LinearSolver for NeverSolves {
    fn solve(&mut self, _system: &LinearSystem, _damping: f64) -> LinAlgResult<DVector<f64>> {
        Err(LinAlgError::SingularMatrix)
    }

    fn name(&self) -> &'static str {
        "never"
    }
}

#[test]
fn test_retract_then_local_coordinates_recovers_negated_delta() -> TestResult {
    let mut rng = StdRng::seed_from_u64(7);
    let store = mixed_store()?;
    let ordering = Ordering::natural(&store);
    let dim = store.total_dimension(&ordering)?;
    assert_eq!(dim, 1 + 3 + 1 + 3);

    for _ in 0..50 {
        let delta = random_delta(&mut rng, dim);
        let moved = store.retract(&delta, &ordering)?;
        let back = moved.local_coordinates(&store, &ordering)?;
        assert!(
            (&back + &delta).amax() < 1e-9,
            "delta {delta} came back as {back}"
        );
    }
    Ok(())
}

#[test]
fn test_round_trip_under_permuted_ordering() -> TestResult {
    let mut rng = StdRng::seed_from_u64(11);
    let store = mixed_store()?;
    let mut keys = store.keys();
    keys.reverse();
    let ordering = Ordering::from_keys(keys)?;

    let delta = random_delta(&mut rng, store.total_dimension(&ordering)?);
    let moved = store.retract(&delta, &ordering)?;
    assert!((store.local_coordinates(&moved, &ordering)? - &delta).amax() < 1e-9);
    Ok(())
}

#[test]
fn test_zero_retract_is_identity() -> TestResult {
    let store = mixed_store()?;
    let ordering = Ordering::natural(&store);
    let moved = store.retract(&store.zero_vectors(&ordering)?, &ordering)?;
    assert!(moved.equals(&store, 0.0));
    Ok(())
}

#[test]
fn test_local_coordinates_requires_matching_keys() -> TestResult {
    let store = mixed_store()?;
    let mut other = store.clone();
    other.erase(&x(0))?;
    other.insert(x(5), &1.5_f64)?;
    let before = (store.clone(), other.clone());

    let ordering = Ordering::natural(&store);
    let result = store.local_coordinates(&other, &ordering);
    assert!(matches!(result, Err(CoreError::SizeMismatch(_))));
    assert!(store.equals(&before.0, 0.0));
    assert!(other.equals(&before.1, 0.0));
    Ok(())
}

#[test]
fn test_orderings_are_injective_and_covering() -> TestResult {
    let truth = square_truth();
    let graph = square_graph(&truth)?;
    let keys = graph.keys();

    for ordering in [
        NaturalOrdering.build(&keys, &graph.structure())?,
        MinimumDegreeOrdering.build(&keys, &graph.structure())?,
    ] {
        assert_eq!(ordering.len(), keys.len());
        let mut slots: Vec<usize> = keys.iter().filter_map(|k| ordering.slot(k)).collect();
        slots.sort_unstable();
        assert_eq!(slots, (0..keys.len()).collect::<Vec<_>>());
    }
    Ok(())
}

#[test]
fn test_cholesky_and_qr_agree_on_damped_system() -> TestResult {
    let truth = square_truth();
    let graph = square_graph(&truth)?;
    let values = noisy_estimate(&truth, &mut StdRng::seed_from_u64(3))?;
    let ordering = graph.ordering(&values)?;
    let system = graph.linearize(&values, &ordering)?;

    let cholesky = SparseCholeskySolver::new().solve(&system, 1e-3)?;
    let qr = SparseQRSolver::new().solve(&system, 1e-3)?;
    assert_eq!(cholesky.len(), 12);
    assert!((&cholesky - &qr).amax() < 1e-8);
    Ok(())
}

#[test]
fn test_square_pose_graph_converges_to_truth() -> TestResult {
    let truth = square_truth();
    let graph = square_graph(&truth)?;

    for (seed, solver_type) in [
        (21, LinearSolverType::SparseCholesky),
        (22, LinearSolverType::SparseQR),
    ] {
        let initial = noisy_estimate(&truth, &mut StdRng::seed_from_u64(seed))?;
        let config = LevenbergMarquardtConfig::new()
            .with_linear_solver_type(solver_type)
            .with_absolute_error_tolerance(1e-14)
            .with_relative_error_tolerance(1e-14);
        let mut optimizer = LevenbergMarquardt::new(&graph, initial, config)?;
        let history = ErrorHistoryObserver::new();
        optimizer.add_observer(history.clone());

        let result = optimizer.optimize()?;
        assert_eq!(result.state, OptimizerState::Converged, "{solver_type}");
        assert!(result.final_error < result.initial_error);
        assert!(result.iterations < 20);
        assert_eq!(history.history()?.len(), result.iterations);

        for (i, pose) in truth.iter().enumerate() {
            let estimate = result.values.retrieve::<Pose2>(&x(i as u64))?;
            assert!(
                estimate.equals(pose, 1e-5),
                "pose {i}: {estimate} vs {pose}"
            );
        }
    }
    Ok(())
}

#[test]
fn test_manual_stepping_matches_state_machine() -> TestResult {
    let truth = square_truth();
    let graph = square_graph(&truth)?;
    let initial = noisy_estimate(&truth, &mut StdRng::seed_from_u64(5))?;
    let mut optimizer = LevenbergMarquardt::new(&graph, initial, LevenbergMarquardtConfig::new())?;

    let mut previous = optimizer.error();
    let mut state = optimizer.state();
    while !state.is_terminal() {
        state = optimizer.iterate()?;
        assert!(optimizer.error() <= previous);
        previous = optimizer.error();
    }
    assert!(state.is_success());

    // further calls are no-ops
    let iterations = optimizer.iterations();
    assert_eq!(optimizer.iterate()?, state);
    assert_eq!(optimizer.iterations(), iterations);
    Ok(())
}

#[test]
fn test_optimizer_usable_through_trait_object() -> TestResult {
    let mut graph = FactorGraph::new();
    graph.add(PriorFactor::new(x(0), Rot2::from_angle(1.0)));
    let mut initial = Values::new();
    initial.insert(x(0), &Rot2::from_angle(-2.0))?;

    let mut lm = LevenbergMarquardt::new(&graph, initial, LevenbergMarquardtConfig::new())?;
    let optimizer: &mut dyn NonlinearOptimizer = &mut lm;
    assert_eq!(optimizer.run()?, OptimizerState::Converged);
    let rotation = optimizer.values().retrieve::<Rot2>(&x(0))?;
    assert!((rotation.angle() - 1.0).abs() < 1e-2);
    Ok(())
}

#[test]
fn test_rank_deficient_problem_recovers_with_damping() -> TestResult {
    let mut graph = FactorGraph::new();
    graph.add(SumFactor {
        keys: vec![x(1), x(2)],
        target: 2.0,
    });
    let mut initial = Values::new();
    initial.insert(x(1), &0.0_f64)?;
    initial.insert(x(2), &0.0_f64)?;

    let mut optimizer = LevenbergMarquardt::new(&graph, initial, LevenbergMarquardtConfig::new())?;
    let result = optimizer.optimize()?;

    assert_eq!(result.state, OptimizerState::Converged);
    let sum = result.values.retrieve::<f64>(&x(1))? + result.values.retrieve::<f64>(&x(2))?;
    assert!((sum - 2.0).abs() < 1e-2);
    Ok(())
}

#[test]
fn test_failing_solver_ends_in_failed_state() -> TestResult {
    let truth = square_truth();
    let graph = square_graph(&truth)?;
    let initial = noisy_estimate(&truth, &mut StdRng::seed_from_u64(9))?;
    let start = initial.clone();

    let mut optimizer = LevenbergMarquardt::new(&graph, initial, LevenbergMarquardtConfig::new())?
        .with_linear_solver(Box::new(NeverSolves));
    let result = optimizer.optimize()?;

    assert_eq!(result.state, OptimizerState::Failed);
    assert_eq!(result.iterations, 0);
    assert!(result.values.equals(&start, 0.0));
    assert!(matches!(
        result.failure,
        Some(OptimizerError::DampingBoundExceeded { .. })
    ));
    assert_eq!(result.convergence_info.successful_steps, 0);
    Ok(())
}

fn optimize_incomplete_estimate() -> ManifoldLmResult<()> {
    let mut graph = FactorGraph::new();
    graph.add(PriorFactor::new(x(0), 0.0_f64));
    graph.add(BetweenFactor::new(x(0), x(3), 1.0_f64));

    let mut initial = Values::new();
    initial.insert(x(0), &0.0_f64)?;
    LevenbergMarquardt::new(&graph, initial, LevenbergMarquardtConfig::new())?.optimize()?;
    Ok(())
}

#[test]
fn test_missing_variable_error_chain() {
    let Err(error) = optimize_incomplete_estimate() else {
        panic!("optimizing without x3 must fail");
    };

    assert!(matches!(
        error,
        ManifoldLmError::Optimizer(OptimizerError::Core(CoreError::KeyDoesNotExist {
            key,
            ..
        })) if key == x(3)
    ));
    let compact = error.chain_compact();
    assert!(compact.contains("x3"));
    assert!(compact.contains(" → "));
}
