use core::fmt;

use faer_core::Parallelism;

/// Validation errors for [`Params`].
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// `m` or `n` is zero.
    ZeroDimension { m: usize, n: usize },
    /// Asked for more rows per iteration than the sampling population holds.
    TooManySamples { num_samp: usize, n: usize },
    /// `num_samp` is zero, so no residual can be formed.
    ZeroSamples,
    /// Rows are drawn from `[0, n)`, so `A` needs at least `n` rows.
    SamplePopulationExceedsRows { n: usize, m: usize },
    /// `max_iter` is zero.
    ZeroIterations,
    /// `epsilon` must be strictly positive and finite.
    NonPositiveEpsilon { epsilon: f64 },
    /// `eta` must be strictly positive and finite.
    NonPositiveEta { eta: f64 },
    /// `lambda` must be non-negative and finite.
    NegativeLambda { lambda: f64 },
    /// `beta_1` or `beta_2` is outside `[0, 1)`.
    InvalidBeta { name: &'static str, value: f64 },
    /// `noise_snr_db` is not finite.
    InvalidNoiseLevel { snr_db: f64 },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroDimension { m, n } => {
                write!(f, "problem dimensions must be positive: m={m}, n={n}")
            }
            Self::TooManySamples { num_samp, n } => {
                write!(f, "num_samp {num_samp} exceeds sampling population n={n}")
            }
            Self::ZeroSamples => write!(f, "num_samp must be positive"),
            Self::SamplePopulationExceedsRows { n, m } => {
                write!(f, "sampling population n={n} exceeds row count m={m}")
            }
            Self::ZeroIterations => write!(f, "max_iter must be positive"),
            Self::NonPositiveEpsilon { epsilon } => {
                write!(f, "epsilon must be positive (got {epsilon})")
            }
            Self::NonPositiveEta { eta } => write!(f, "eta must be positive (got {eta})"),
            Self::NegativeLambda { lambda } => {
                write!(f, "lambda must be non-negative (got {lambda})")
            }
            Self::InvalidBeta { name, value } => {
                write!(f, "{name} must lie in [0, 1) (got {value})")
            }
            Self::InvalidNoiseLevel { snr_db } => {
                write!(f, "noise SNR must be finite (got {snr_db} dB)")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Experiment configuration shared by every solver variant.
#[derive(Debug, Clone)]
pub struct Params {
    /// Rows of `A`.
    pub m: usize,
    /// Columns of `A` (length of `x`); also the row-sampling population.
    pub n: usize,
    /// Rows of `A` and `b` drawn per iteration.
    pub num_samp: usize,
    /// Number of iterations; every run performs exactly this many.
    pub max_iter: usize,
    /// Soft-threshold level for the Bregman and proximal updates.
    pub lambda: f64,
    /// Base learning rate for ADAGRAD and ADAM.
    pub eta: f64,
    /// Guard added to adaptive step denominators.
    pub epsilon: f64,
    /// ADAM first-moment decay.
    pub beta_1: f64,
    /// ADAM second-moment decay.
    pub beta_2: f64,
    /// Sparse ground truth when true, exponentially decaying otherwise.
    pub sparse: bool,
    /// Add noise to `b`.
    pub noise: bool,
    /// Freeze the modified step rule on coordinates once they cross `lambda`.
    pub flipping: bool,
    /// When set and `noise` is on, add white Gaussian noise at this SNR
    /// instead of unit-variance noise.
    pub noise_snr_db: Option<f64>,
    /// Seed for problem generation and row sampling.
    pub seed: u64,
    /// Parallelism for the dense matrix-vector products.
    pub parallelism: Parallelism,
    /// Emit a per-iteration table and timing when no reporter is supplied.
    pub verbose: bool,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            m: 20_000,
            n: 2_000,
            num_samp: 200,
            max_iter: 300,
            lambda: 3.0,
            eta: 0.5,
            epsilon: 1e-6,
            beta_1: 0.9,
            beta_2: 0.999,
            sparse: true,
            noise: false,
            flipping: true,
            noise_snr_db: None,
            seed: 0,
            parallelism: Parallelism::None,
            verbose: false,
        }
    }
}

impl Params {
    /// Checks every field before any iteration runs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.m == 0 || self.n == 0 {
            return Err(ConfigError::ZeroDimension {
                m: self.m,
                n: self.n,
            });
        }
        if self.num_samp == 0 {
            return Err(ConfigError::ZeroSamples);
        }
        if self.num_samp > self.n {
            return Err(ConfigError::TooManySamples {
                num_samp: self.num_samp,
                n: self.n,
            });
        }
        if self.n > self.m {
            return Err(ConfigError::SamplePopulationExceedsRows {
                n: self.n,
                m: self.m,
            });
        }
        if self.max_iter == 0 {
            return Err(ConfigError::ZeroIterations);
        }
        if !(self.epsilon > 0.0 && self.epsilon.is_finite()) {
            return Err(ConfigError::NonPositiveEpsilon {
                epsilon: self.epsilon,
            });
        }
        if !(self.eta > 0.0 && self.eta.is_finite()) {
            return Err(ConfigError::NonPositiveEta { eta: self.eta });
        }
        if !(self.lambda >= 0.0 && self.lambda.is_finite()) {
            return Err(ConfigError::NegativeLambda {
                lambda: self.lambda,
            });
        }
        check_beta("beta_1", self.beta_1)?;
        check_beta("beta_2", self.beta_2)?;
        if let Some(snr_db) = self.noise_snr_db {
            if !snr_db.is_finite() {
                return Err(ConfigError::InvalidNoiseLevel { snr_db });
            }
        }
        Ok(())
    }
}

fn check_beta(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidBeta { name, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> Params {
        Params {
            m: 200,
            n: 50,
            num_samp: 20,
            max_iter: 10,
            ..Params::default()
        }
    }

    #[test]
    fn defaults_are_valid() {
        assert_eq!(Params::default().validate(), Ok(()));
        assert_eq!(small().validate(), Ok(()));
    }

    #[test]
    fn rejects_oversampling() {
        let params = Params {
            num_samp: 51,
            ..small()
        };
        assert_eq!(
            params.validate(),
            Err(ConfigError::TooManySamples { num_samp: 51, n: 50 })
        );
    }

    #[test]
    fn rejects_zero_iterations_and_bad_epsilon() {
        let params = Params {
            max_iter: 0,
            ..small()
        };
        assert_eq!(params.validate(), Err(ConfigError::ZeroIterations));

        for epsilon in [0.0, -1e-6, f64::NAN] {
            let params = Params { epsilon, ..small() };
            assert!(matches!(
                params.validate(),
                Err(ConfigError::NonPositiveEpsilon { .. })
            ));
        }
    }

    #[test]
    fn rejects_beta_of_one() {
        let params = Params {
            beta_2: 1.0,
            ..small()
        };
        assert_eq!(
            params.validate(),
            Err(ConfigError::InvalidBeta {
                name: "beta_2",
                value: 1.0
            })
        );
    }

    #[test]
    fn rejects_population_larger_than_rows() {
        let params = Params {
            m: 40,
            ..small()
        };
        assert_eq!(
            params.validate(),
            Err(ConfigError::SamplePopulationExceedsRows { n: 50, m: 40 })
        );
    }
}
