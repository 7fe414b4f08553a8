//! Named solver variants and side-by-side runs on one problem instance.
//!
//! Names follow `[adagrad-|adam-]<update>[-modified][-w-flipping]`, with
//! `lb-classic` / `lb-modified` for the Bregman update, e.g.
//! `adam-lb-modified-w-flipping`. The scalar family has no prefix and
//! spells its plain descent `sgd`.

use core::fmt;
use core::str::FromStr;

use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::params::Params;
use crate::problem::Problem;
use crate::report::{emit_table, new_table, right};
use crate::results::Results;
use crate::scaling::Scaling;
use crate::solver::{Algorithm, Solver, SolverError, UpdateRule};
use crate::step::StepRule;

/// An algorithm together with its flipping toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Variant {
    pub algorithm: Algorithm,
    pub flipping: bool,
}

/// Unknown variant name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseVariantError {
    pub name: String,
}

impl fmt::Display for ParseVariantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown solver variant `{}`", self.name)
    }
}

impl std::error::Error for ParseVariantError {}

const STEPS: [StepRule; 3] = [StepRule::Scalar, StepRule::Adagrad, StepRule::Adam];
const UPDATES: [UpdateRule; 3] = [UpdateRule::Descent, UpdateRule::Proximal, UpdateRule::Bregman];
const SCALINGS: [Scaling; 2] = [Scaling::Classic, Scaling::Modified];

impl Variant {
    pub const fn new(algorithm: Algorithm, flipping: bool) -> Self {
        Self {
            algorithm,
            flipping,
        }
    }

    /// Every step/update/scaling/flipping combination.
    pub fn all() -> Vec<Variant> {
        let mut out = Vec::with_capacity(36);
        for step in STEPS {
            for update in UPDATES {
                for scaling in SCALINGS {
                    for flipping in [false, true] {
                        out.push(Variant::new(Algorithm::new(step, update, scaling), flipping));
                    }
                }
            }
        }
        out
    }

    /// The standard comparison line-up: classic, modified and
    /// modified-with-flipping Bregman for each step family, plus plain
    /// ADAGRAD and ADAM.
    pub fn standard() -> Vec<Variant> {
        vec![
            Variant::new(Algorithm::lb(Scaling::Classic), false),
            Variant::new(Algorithm::lb(Scaling::Modified), false),
            Variant::new(Algorithm::lb(Scaling::Modified), true),
            Variant::new(Algorithm::adagrad(), false),
            Variant::new(Algorithm::adagrad_lb(Scaling::Classic), false),
            Variant::new(Algorithm::adagrad_lb(Scaling::Modified), false),
            Variant::new(Algorithm::adagrad_lb(Scaling::Modified), true),
            Variant::new(Algorithm::adam(), false),
            Variant::new(Algorithm::adam_lb(Scaling::Classic), false),
            Variant::new(Algorithm::adam_lb(Scaling::Modified), false),
            Variant::new(Algorithm::adam_lb(Scaling::Modified), true),
        ]
    }

    /// Canonical name, e.g. `adagrad-lb-modified-w-flipping`.
    pub fn name(&self) -> String {
        let Algorithm {
            step,
            update,
            scaling,
        } = self.algorithm;
        let mut parts: Vec<&str> = Vec::with_capacity(4);
        match step {
            StepRule::Scalar => {}
            StepRule::Adagrad => parts.push("adagrad"),
            StepRule::Adam => parts.push("adam"),
        }
        match (update, step) {
            (UpdateRule::Descent, StepRule::Scalar) => parts.push("sgd"),
            (UpdateRule::Descent, _) => {}
            (UpdateRule::Proximal, _) => parts.push("ista"),
            (UpdateRule::Bregman, _) => parts.push("lb"),
        }
        match (scaling, update) {
            (Scaling::Classic, UpdateRule::Bregman) => parts.push("classic"),
            (Scaling::Classic, _) => {}
            (Scaling::Modified, _) => parts.push("modified"),
        }
        let mut name = parts.join("-");
        if self.flipping {
            name.push_str("-w-flipping");
        }
        name
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl FromStr for Variant {
    type Err = ParseVariantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Variant::all()
            .into_iter()
            .find(|v| v.name() == s)
            .ok_or_else(|| ParseVariantError { name: s.to_owned() })
    }
}

/// Results of one variant in a comparison.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub variant: Variant,
    pub results: Results,
}

/// Runs every variant on `problem`, each with a sampler seeded from
/// `sampling_seed`, so all variants see the same row draws.
///
/// `params.flipping` is overridden per variant.
pub fn compare(
    problem: &Problem,
    params: &Params,
    variants: &[Variant],
    sampling_seed: u64,
) -> Result<Vec<RunOutcome>, SolverError> {
    let mut outcomes = Vec::with_capacity(variants.len());
    for &variant in variants {
        let run_params = Params {
            flipping: variant.flipping,
            ..params.clone()
        };
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(sampling_seed);
        let results = Solver::new(problem, variant.algorithm, &run_params)?.run(&mut rng, None)?;
        log::debug!(
            "{variant}: final model error {:.4e}",
            results.model_error().last().copied().unwrap_or(f64::NAN)
        );
        outcomes.push(RunOutcome { variant, results });
    }
    Ok(outcomes)
}

/// Prints final-iteration metrics of each outcome as a table.
pub fn print_summary(outcomes: &[RunOutcome]) {
    let mut table = new_table();
    table.set_header(vec![
        right("variant"),
        right("residual"),
        right("1-norm"),
        right("model err"),
        right("recovered"),
    ]);
    for outcome in outcomes {
        let results = &outcome.results;
        let last = |series: &[f64]| series.last().copied().unwrap_or(f64::NAN);
        table.add_row(vec![
            right(outcome.variant),
            right(format!("{:.4e}", last(results.residual_ratio()))),
            right(format!("{:.4e}", last(results.one_norm()))),
            right(format!("{:.4e}", last(results.model_error()))),
            right(format!("{:.3}", results.percent_nonzeros_recovered())),
        ]);
    }
    emit_table(&table);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_names_match_driver_labels() {
        let names: Vec<String> = Variant::standard().iter().map(Variant::name).collect();
        assert_eq!(
            names,
            vec![
                "lb-classic",
                "lb-modified",
                "lb-modified-w-flipping",
                "adagrad",
                "adagrad-lb-classic",
                "adagrad-lb-modified",
                "adagrad-lb-modified-w-flipping",
                "adam",
                "adam-lb-classic",
                "adam-lb-modified",
                "adam-lb-modified-w-flipping",
            ]
        );
    }

    #[test]
    fn names_are_unique_and_parse_back() {
        let all = Variant::all();
        let mut names: Vec<String> = all.iter().map(Variant::name).collect();
        for (variant, name) in all.iter().zip(&names) {
            assert_eq!(name.parse::<Variant>().unwrap(), *variant);
        }
        names.sort();
        names.dedup();
        assert_eq!(names.len(), all.len());
        assert_eq!("ista".parse::<Variant>().unwrap().algorithm, Algorithm::ista());
        assert_eq!(
            "sgd".parse::<Variant>().unwrap().algorithm.update,
            UpdateRule::Descent
        );
    }

    #[test]
    fn unknown_name_is_rejected() {
        assert_eq!(
            "lbfgs".parse::<Variant>(),
            Err(ParseVariantError {
                name: "lbfgs".into()
            })
        );
    }
}
