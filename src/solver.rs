use core::fmt;
use std::time::Instant;

use faer_core::mul::matmul;
use faer_core::{mat, Mat, Parallelism};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::params::{ConfigError, Params};
use crate::problem::Problem;
use crate::report::{emit_line, format_duration, IterationReport, Reporter, ReporterSlot};
use crate::results::{l2_norm, RecordError, Results};
use crate::sampler::RowSampler;
use crate::scaling::{Scaling, ScalingState};
use crate::step::{StepConfig, StepRule, StepState};
use crate::threshold::soft_threshold;

/// Errors while constructing or running a solver.
#[derive(Debug, Clone, PartialEq)]
pub enum SolverError {
    /// The parameters failed validation.
    Config(ConfigError),
    /// The problem does not have the shape the parameters declare.
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    /// The results accumulator rejected a record.
    Record(RecordError),
    /// `step` was called after the last iteration.
    Terminated { max_iter: usize },
}

impl fmt::Display for SolverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(err) => write!(f, "invalid configuration: {err}"),
            Self::DimensionMismatch {
                what,
                expected,
                actual,
            } => write!(f, "problem {what} is {actual}, parameters declare {expected}"),
            Self::Record(err) => write!(f, "results error: {err}"),
            Self::Terminated { max_iter } => {
                write!(f, "solver already ran all {max_iter} iterations")
            }
        }
    }
}

impl std::error::Error for SolverError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Record(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ConfigError> for SolverError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

impl From<RecordError> for SolverError {
    fn from(err: RecordError) -> Self {
        Self::Record(err)
    }
}

/// How the step is applied to the iterate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateRule {
    /// `x -= t * d`.
    Descent,
    /// `z = x - t * d`, `x = threshold(z)` (ISTA).
    Proximal,
    /// `z -= t * d`, `x = threshold(z)` (Linearized Bregman).
    Bregman,
}

impl UpdateRule {
    /// Whether the rule keeps a pre-threshold variable `z`.
    pub fn uses_dual(self) -> bool {
        !matches!(self, Self::Descent)
    }
}

/// A step family, an update rule and a per-coordinate scaling.
///
/// Every combination runs through the same iteration in [`Solver::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Algorithm {
    pub step: StepRule,
    pub update: UpdateRule,
    pub scaling: Scaling,
}

impl Algorithm {
    pub const fn new(step: StepRule, update: UpdateRule, scaling: Scaling) -> Self {
        Self {
            step,
            update,
            scaling,
        }
    }

    /// Linearized Bregman with the scalar step.
    pub const fn lb(scaling: Scaling) -> Self {
        Self::new(StepRule::Scalar, UpdateRule::Bregman, scaling)
    }

    /// Plain ADAGRAD on `x`.
    pub const fn adagrad() -> Self {
        Self::new(StepRule::Adagrad, UpdateRule::Descent, Scaling::Classic)
    }

    /// Linearized Bregman driven by ADAGRAD steps.
    pub const fn adagrad_lb(scaling: Scaling) -> Self {
        Self::new(StepRule::Adagrad, UpdateRule::Bregman, scaling)
    }

    /// Plain ADAM on `x`.
    pub const fn adam() -> Self {
        Self::new(StepRule::Adam, UpdateRule::Descent, Scaling::Classic)
    }

    /// Linearized Bregman driven by ADAM steps.
    pub const fn adam_lb(scaling: Scaling) -> Self {
        Self::new(StepRule::Adam, UpdateRule::Bregman, scaling)
    }

    /// ISTA with the scalar step.
    pub const fn ista() -> Self {
        Self::new(StepRule::Scalar, UpdateRule::Proximal, Scaling::Classic)
    }
}

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Initialized,
    /// The last committed iteration (1-based).
    Running { iteration: usize },
    Terminated,
}

/// Mutable per-run state.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverState {
    x: Vec<f64>,
    z: Option<Vec<f64>>,
    step: StepState,
    scaling: ScalingState,
}

impl SolverState {
    fn new(algorithm: Algorithm, flipping: bool, lambda: f64, n: usize) -> Self {
        Self {
            x: vec![0.0; n],
            z: algorithm.update.uses_dual().then(|| vec![0.0; n]),
            step: StepState::new(algorithm.step, n),
            scaling: ScalingState::new(algorithm.scaling, flipping, lambda, n),
        }
    }

    /// Current iterate.
    pub fn x(&self) -> &[f64] {
        &self.x
    }

    /// Pre-threshold variable, if the update rule keeps one.
    pub fn z(&self) -> Option<&[f64]> {
        self.z.as_deref()
    }

    pub fn step_state(&self) -> &StepState {
        &self.step
    }

    pub fn scaling_state(&self) -> &ScalingState {
        &self.scaling
    }

    /// Flip mask, if flipping is enabled.
    pub fn flags(&self) -> Option<&[bool]> {
        self.scaling.flags()
    }
}

/// Iterates one algorithm on one problem for exactly `max_iter` steps.
///
/// Buffers are allocated once in [`Solver::new`] and reused.
pub struct Solver<'p> {
    problem: &'p Problem,
    algorithm: Algorithm,
    lambda: f64,
    step_config: StepConfig,
    parallelism: Parallelism,
    max_iter: usize,
    verbose: bool,
    sampler: RowSampler,
    state: SolverState,
    results: Results,
    phase: Phase,
    a_sub: Mat<f64>,
    b_sub: Vec<f64>,
    residual: Vec<f64>,
    gradient: Vec<f64>,
    t: Vec<f64>,
    step_sizes: Vec<f64>,
}

impl<'p> Solver<'p> {
    /// Validates `params` against `problem` and allocates all state.
    ///
    /// Flipping is taken from `params.flipping`.
    pub fn new(
        problem: &'p Problem,
        algorithm: Algorithm,
        params: &Params,
    ) -> Result<Self, SolverError> {
        params.validate()?;
        if problem.m() != params.m {
            return Err(SolverError::DimensionMismatch {
                what: "row count",
                expected: params.m,
                actual: problem.m(),
            });
        }
        if problem.n() != params.n {
            return Err(SolverError::DimensionMismatch {
                what: "column count",
                expected: params.n,
                actual: problem.n(),
            });
        }

        let n = params.n;
        let k = params.num_samp;
        Ok(Self {
            problem,
            algorithm,
            lambda: params.lambda,
            step_config: StepConfig {
                eta: params.eta,
                epsilon: params.epsilon,
                beta_1: params.beta_1,
                beta_2: params.beta_2,
            },
            parallelism: params.parallelism,
            max_iter: params.max_iter,
            verbose: params.verbose,
            sampler: RowSampler::new(n, k),
            state: SolverState::new(algorithm, params.flipping, params.lambda, n),
            results: Results::new(params.max_iter, n, problem.x_true())?,
            phase: Phase::Initialized,
            a_sub: Mat::zeros(k, n),
            b_sub: vec![0.0; k],
            residual: vec![0.0; k],
            gradient: vec![0.0; n],
            t: vec![0.0; n],
            step_sizes: vec![0.0; n],
        })
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn state(&self) -> &SolverState {
        &self.state
    }

    pub fn results(&self) -> &Results {
        &self.results
    }

    pub fn into_results(self) -> Results {
        self.results
    }

    /// Runs one iteration: sample, residual and gradient, step state,
    /// iterate update, record.
    pub fn step<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<Phase, SolverError> {
        let iteration = match self.phase {
            Phase::Initialized => 1,
            Phase::Running { iteration } => iteration + 1,
            Phase::Terminated => {
                return Err(SolverError::Terminated {
                    max_iter: self.max_iter,
                })
            }
        };

        let rows = self.sampler.sample(rng);
        gather_rows(self.problem, rows, &mut self.a_sub, &mut self.b_sub);

        // r = A_sub x - b_sub, g = A_sub^T r.
        let n = self.state.x.len();
        let k = self.b_sub.len();
        matmul(
            mat::from_column_major_slice_mut::<f64>(self.residual.as_mut_slice(), k, 1),
            self.a_sub.as_ref(),
            mat::from_column_major_slice::<f64>(self.state.x.as_slice(), n, 1),
            None,
            1.0,
            self.parallelism,
        );
        for (r, b) in self.residual.iter_mut().zip(&self.b_sub) {
            *r -= b;
        }
        matmul(
            mat::from_column_major_slice_mut::<f64>(self.gradient.as_mut_slice(), n, 1),
            self.a_sub.as_ref().transpose(),
            mat::from_column_major_slice::<f64>(self.residual.as_slice(), k, 1),
            None,
            1.0,
            self.parallelism,
        );

        // Flags look at the pre-threshold value from the previous iteration.
        let pre_threshold = self.state.z.as_deref().unwrap_or(self.state.x.as_slice());
        self.state.scaling.refresh_flags(pre_threshold);

        let direction = self.state.step.update(
            iteration,
            &self.residual,
            &self.gradient,
            &self.step_config,
            &mut self.t,
        );
        self.state.scaling.accumulate_signs(&self.gradient);
        self.state
            .scaling
            .apply(iteration, &self.t, &mut self.step_sizes);

        apply_update(
            self.algorithm.update,
            self.lambda,
            &mut self.state.x,
            self.state.z.as_deref_mut(),
            &self.step_sizes,
            direction,
        );

        self.results.record(
            iteration,
            &self.residual,
            &self.b_sub,
            &self.state.x,
            self.state.z.as_deref(),
            Some(self.t.as_slice()),
        )?;

        if log::log_enabled!(log::Level::Trace) {
            log::trace!(
                "iteration {iteration}: residual ratio {:.4e}, model error {:.4e}",
                self.results.residual_ratio()[iteration - 1],
                self.results.model_error()[iteration - 1],
            );
        }

        self.phase = if iteration == self.max_iter {
            Phase::Terminated
        } else {
            Phase::Running { iteration }
        };
        Ok(self.phase)
    }

    /// Summary of the latest committed iteration.
    pub fn last_report(&self) -> Option<IterationReport> {
        let i = self.results.len().checked_sub(1)?;
        let n = self.step_sizes.len().max(1) as f64;
        Some(IterationReport {
            iteration: i + 1,
            residual_ratio: self.results.residual_ratio()[i],
            one_norm: self.results.one_norm()[i],
            model_error: self.results.model_error()[i],
            step_mean: self.step_sizes.iter().sum::<f64>() / n,
            grad_norm: l2_norm(&self.gradient),
            flagged: self.state.scaling.flagged_count(),
        })
    }

    /// Runs the remaining iterations and returns the results.
    pub fn run<R: Rng + ?Sized>(
        mut self,
        rng: &mut R,
        reporter: Option<&mut dyn Reporter>,
    ) -> Result<Results, SolverError> {
        let start_time = self.verbose.then(Instant::now);
        let mut reporter = ReporterSlot::new(reporter, self.verbose);
        log::debug!(
            "running {:?} for {} iterations (m={}, n={}, num_samp={})",
            self.algorithm,
            self.max_iter,
            self.problem.m(),
            self.problem.n(),
            self.sampler.num_samp(),
        );

        while self.phase != Phase::Terminated {
            self.step(rng)?;
            if let Some(reporter) = reporter.as_mut() {
                if let Some(report) = self.last_report() {
                    reporter.on_iteration(&report);
                }
            }
        }

        if let Some(reporter) = reporter.as_mut() {
            reporter.on_finish();
        }
        if let Some(start) = start_time {
            let elapsed = format_duration(start.elapsed());
            emit_line(&format!("time: {elapsed}"));
        }
        log::debug!(
            "finished {:?}: recovered {:.3} of true nonzeros",
            self.algorithm,
            self.results.percent_nonzeros_recovered(),
        );
        Ok(self.results)
    }
}

/// Generates the problem from `params.seed`, then runs `algorithm` on it.
///
/// The sampler continues the generator's random stream.
pub fn solve(
    params: &Params,
    algorithm: Algorithm,
    reporter: Option<&mut dyn Reporter>,
) -> Result<(Problem, Results), SolverError> {
    params.validate()?;
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(params.seed);
    let problem = Problem::from_params(params, &mut rng);
    let results = Solver::new(&problem, algorithm, params)?.run(&mut rng, reporter)?;
    Ok((problem, results))
}

fn gather_rows(problem: &Problem, rows: &[usize], a_sub: &mut Mat<f64>, b_sub: &mut [f64]) {
    let a = problem.a();
    for j in 0..a.ncols() {
        for (i, &row) in rows.iter().enumerate() {
            a_sub.write(i, j, a.read(row, j));
        }
    }
    for (dst, &row) in b_sub.iter_mut().zip(rows) {
        *dst = problem.b()[row];
    }
}

fn apply_update(
    update: UpdateRule,
    lambda: f64,
    x: &mut [f64],
    z: Option<&mut [f64]>,
    step: &[f64],
    direction: &[f64],
) {
    match (update, z) {
        (UpdateRule::Bregman, Some(z)) => {
            for j in 0..x.len() {
                z[j] -= step[j] * direction[j];
                x[j] = soft_threshold(z[j], lambda);
            }
        }
        (UpdateRule::Proximal, Some(z)) => {
            for j in 0..x.len() {
                z[j] = x[j] - step[j] * direction[j];
                x[j] = soft_threshold(z[j], lambda);
            }
        }
        _ => {
            for j in 0..x.len() {
                x[j] -= step[j] * direction[j];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> Params {
        Params {
            m: 60,
            n: 20,
            num_samp: 10,
            max_iter: 5,
            ..Params::default()
        }
    }

    #[test]
    fn walks_through_phases() {
        let params = params();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0);
        let problem = Problem::from_params(&params, &mut rng);
        let mut solver = Solver::new(&problem, Algorithm::lb(Scaling::Classic), &params).unwrap();
        assert_eq!(solver.phase(), Phase::Initialized);
        assert_eq!(solver.step(&mut rng).unwrap(), Phase::Running { iteration: 1 });
        for _ in 0..3 {
            solver.step(&mut rng).unwrap();
        }
        assert_eq!(solver.step(&mut rng).unwrap(), Phase::Terminated);
        assert_eq!(
            solver.step(&mut rng),
            Err(SolverError::Terminated { max_iter: 5 })
        );
        assert!(solver.results().is_complete());
    }

    #[test]
    fn rejects_problem_of_wrong_shape() {
        let params = params();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0);
        let problem = Problem::from_params(&params, &mut rng);
        let other = Params {
            n: 30,
            ..params
        };
        assert!(matches!(
            Solver::new(&problem, Algorithm::adagrad(), &other),
            Err(SolverError::DimensionMismatch {
                what: "column count",
                ..
            })
        ));
    }

    #[test]
    fn descent_keeps_no_dual() {
        let params = params();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0);
        let problem = Problem::from_params(&params, &mut rng);
        let solver = Solver::new(&problem, Algorithm::adam(), &params).unwrap();
        assert!(solver.state().z().is_none());
        let results = solver.run(&mut rng, None).unwrap();
        assert!(results.z_history().is_none());
        assert_eq!(results.t_history().unwrap().len(), 5);
    }

    #[test]
    fn bregman_iterate_is_thresholded_dual() {
        let params = Params {
            lambda: 0.05,
            ..params()
        };
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(4);
        let problem = Problem::from_params(&params, &mut rng);
        let mut solver = Solver::new(&problem, Algorithm::adagrad_lb(Scaling::Classic), &params)
            .unwrap();
        for _ in 0..3 {
            solver.step(&mut rng).unwrap();
        }
        let state = solver.state();
        let z = state.z().unwrap();
        for (x, z) in state.x().iter().zip(z) {
            assert_eq!(*x, soft_threshold(*z, 0.05));
        }
    }
}
