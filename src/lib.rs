//! Stochastic first-order solvers for sparse linear inverse problems.
//!
//! Each run recovers a sparse or rapidly decaying `x` from `A x = b` using
//! only a random block of rows of `A` per iteration. The solvers are
//! combinations of three independent choices:
//! - a step family: the scalar step `||r||^2 / ||g||^2`, ADAGRAD or ADAM;
//! - an update rule: plain descent on `x`, ISTA, or Linearized Bregman
//!   (descent on a dual `z` with `x = threshold(z)`);
//! - a scaling: classic, or modified by the sign-agreement counter
//!   `|tau| / i`, optionally frozen per coordinate by flipping.
//!
//! How it works (high level):
//! - Sample `num_samp` rows, form `r = A_sub x - b_sub` and `g = A_sub^T r`.
//! - Advance the step family's statistics and compute per-coordinate steps.
//! - Update `x` (and `z`), then record residual, 1-norm and model error.
//!
//! Calling it:
//! - Fill in [`Params`] (or start from `Params::default()`).
//! - Call [`solve`] with an [`Algorithm`], or build a [`Problem`] and drive
//!   a [`Solver`] yourself for step-by-step access to its state.
//! - Read the [`Results`] series and histories.
//!
//! Example:
//! ```rust,no_run
//! use stochastic_lb_rs::{solve, Algorithm, Params, Scaling};
//!
//! let params = Params {
//!     m: 2000,
//!     n: 500,
//!     num_samp: 50,
//!     max_iter: 100,
//!     lambda: 0.1,
//!     ..Params::default()
//! };
//! let (_problem, results) = solve(&params, Algorithm::lb(Scaling::Modified), None).unwrap();
//! assert_eq!(results.residual_ratio().len(), 100);
//! println!("recovered {:.2}", results.percent_nonzeros_recovered());
//! ```

mod compare;
mod params;
mod problem;
mod report;
mod results;
mod sampler;
mod scaling;
mod solver;
mod step;
mod threshold;

pub use compare::{compare, print_summary, ParseVariantError, RunOutcome, Variant};
pub use params::{ConfigError, Params};
pub use problem::{
    add_awgn_noise, generate, rand_exp_decay, rand_sparse, NoiseModel, Problem, ProblemError,
};
pub use report::{CollectingReporter, IterationReport, Reporter, StdoutReporter};
pub use results::{History, RecordError, Results};
pub use sampler::{sample, RowSampler};
pub use scaling::{Scaling, ScalingState};
pub use solver::{solve, Algorithm, Phase, Solver, SolverError, SolverState, UpdateRule};
pub use step::{scalar_step, StepConfig, StepRule, StepState};
pub use threshold::{soft_threshold, threshold, threshold_into};
