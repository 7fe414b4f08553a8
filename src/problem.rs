use core::fmt;

use faer_core::mul::matmul;
use faer_core::{mat, Mat, Parallelism};
use rand::seq::SliceRandom;
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

use crate::params::Params;

/// Fraction denominator for sparse ground truth: `n / 50` nonzeros.
pub const SPARSE_FRACTION: usize = 50;
/// Lower magnitude bound for exponentially decaying ground truth.
pub const EXP_DECAY_LOW: f64 = 1e-4;

/// Upper magnitude bound for exponentially decaying ground truth.
pub fn exp_decay_high() -> f64 {
    5.0_f64.sqrt()
}

/// Errors while assembling a problem from caller-provided data.
#[derive(Debug, Clone, PartialEq)]
pub enum ProblemError {
    /// `x_true` length does not match the columns of `A`.
    SolutionLength { expected: usize, actual: usize },
    /// `b` length does not match the rows of `A`.
    RhsLength { expected: usize, actual: usize },
    /// `A` has zero rows or columns.
    InvalidDimensions { nrows: usize, ncols: usize },
}

impl fmt::Display for ProblemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SolutionLength { expected, actual } => {
                write!(f, "x_true length {actual} does not match expected {expected}")
            }
            Self::RhsLength { expected, actual } => {
                write!(f, "b length {actual} does not match expected {expected}")
            }
            Self::InvalidDimensions { nrows, ncols } => {
                write!(f, "invalid dimensions: nrows={nrows}, ncols={ncols}")
            }
        }
    }
}

impl std::error::Error for ProblemError {}

/// How noise is added to `b = A x_true`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NoiseModel {
    /// `b = A x_true` exactly.
    None,
    /// i.i.d. standard normal noise.
    StandardNormal,
    /// White Gaussian noise scaled to the given signal-to-noise ratio.
    Awgn { snr_db: f64 },
}

impl NoiseModel {
    /// Noise model selected by `params.noise` and `params.noise_snr_db`.
    pub fn from_params(params: &Params) -> Self {
        match (params.noise, params.noise_snr_db) {
            (false, _) => Self::None,
            (true, None) => Self::StandardNormal,
            (true, Some(snr_db)) => Self::Awgn { snr_db },
        }
    }
}

/// Linear system `A x_true = b` used by every run of an experiment.
///
/// Immutable once built; solvers only read from it.
#[derive(Debug, Clone)]
pub struct Problem {
    a: Mat<f64>,
    x_true: Vec<f64>,
    b: Vec<f64>,
}

impl Problem {
    /// Wraps caller-provided data after checking dimensions.
    pub fn new(a: Mat<f64>, x_true: Vec<f64>, b: Vec<f64>) -> Result<Self, ProblemError> {
        if a.nrows() == 0 || a.ncols() == 0 {
            return Err(ProblemError::InvalidDimensions {
                nrows: a.nrows(),
                ncols: a.ncols(),
            });
        }
        if x_true.len() != a.ncols() {
            return Err(ProblemError::SolutionLength {
                expected: a.ncols(),
                actual: x_true.len(),
            });
        }
        if b.len() != a.nrows() {
            return Err(ProblemError::RhsLength {
                expected: a.nrows(),
                actual: b.len(),
            });
        }
        Ok(Self { a, x_true, b })
    }

    /// Generates the problem described by `params`.
    pub fn from_params<R: Rng + ?Sized>(params: &Params, rng: &mut R) -> Self {
        generate(
            params.n,
            params.sparse,
            NoiseModel::from_params(params),
            params.m,
            rng,
        )
    }

    /// Rows of `A`.
    pub fn m(&self) -> usize {
        self.a.nrows()
    }

    /// Columns of `A`.
    pub fn n(&self) -> usize {
        self.a.ncols()
    }

    pub fn a(&self) -> &Mat<f64> {
        &self.a
    }

    pub fn x_true(&self) -> &[f64] {
        &self.x_true
    }

    pub fn b(&self) -> &[f64] {
        &self.b
    }

    /// Indices where `x_true` is nonzero, in increasing order.
    pub fn nonzero_indices(&self) -> Vec<usize> {
        nonzero_indices(&self.x_true)
    }
}

/// Builds `(A, x_true, b)` with `A` i.i.d. standard normal.
///
/// Draw order is ground truth, then `A` (column-major), then noise, so a
/// fixed seed reproduces the same instance bit for bit.
pub fn generate<R: Rng + ?Sized>(
    n: usize,
    sparse: bool,
    noise: NoiseModel,
    m: usize,
    rng: &mut R,
) -> Problem {
    let x_true = if sparse {
        rand_sparse(n, SPARSE_FRACTION, rng)
    } else {
        rand_exp_decay(n, EXP_DECAY_LOW, exp_decay_high(), rng)
    };

    let mut entries = Vec::with_capacity(m * n);
    for _ in 0..m * n {
        let v: f64 = StandardNormal.sample(rng);
        entries.push(v);
    }
    let a = Mat::from_fn(m, n, |i, j| entries[i + j * m]);

    let mut b = vec![0.0; m];
    gemv(&mut b, &a, &x_true);

    match noise {
        NoiseModel::None => {}
        NoiseModel::StandardNormal => {
            for bi in &mut b {
                let e: f64 = StandardNormal.sample(rng);
                *bi += e;
            }
        }
        NoiseModel::Awgn { snr_db } => add_awgn_noise(&mut b, snr_db, rng),
    }

    Problem { a, x_true, b }
}

/// Sparse vector with `n / frac` nonzeros, each uniform in `[0, 1)`.
pub fn rand_sparse<R: Rng + ?Sized>(n: usize, frac: usize, rng: &mut R) -> Vec<f64> {
    let mut out = vec![0.0; n];
    let mut idx: Vec<usize> = (0..n).collect();
    idx.shuffle(rng);
    let count = if frac == 0 { 0 } else { n / frac };
    for &i in &idx[..count] {
        out[i] = rng.gen::<f64>();
    }
    out
}

/// Dense vector with magnitudes `exp(2u)`, `u` uniform in `[ln lo, ln hi]`,
/// and a random `floor(n / 2)` entries negated.
pub fn rand_exp_decay<R: Rng + ?Sized>(n: usize, lo: f64, hi: f64, rng: &mut R) -> Vec<f64> {
    let ln_lo = lo.ln();
    let ln_hi = hi.ln();
    let mut out: Vec<f64> = (0..n)
        .map(|_| {
            let u = ln_lo + (ln_hi - ln_lo) * rng.gen::<f64>();
            (2.0 * u).exp()
        })
        .collect();
    let mut idx: Vec<usize> = (0..n).collect();
    idx.shuffle(rng);
    for &i in &idx[..n / 2] {
        out[i] = -out[i];
    }
    out
}

/// Adds white Gaussian noise so that `mean(x^2) / sigma^2 = 10^(snr_db/10)`.
pub fn add_awgn_noise<R: Rng + ?Sized>(x: &mut [f64], snr_db: f64, rng: &mut R) {
    if x.is_empty() {
        return;
    }
    let snr = 10f64.powf(snr_db / 10.0);
    let energy = x.iter().map(|v| v * v).sum::<f64>() / x.len() as f64;
    let sigma = (energy / snr).sqrt();
    for v in x.iter_mut() {
        let e: f64 = StandardNormal.sample(rng);
        *v += sigma * e;
    }
}

pub(crate) fn nonzero_indices(x: &[f64]) -> Vec<usize> {
    x.iter()
        .enumerate()
        .filter(|(_, v)| **v != 0.0)
        .map(|(i, _)| i)
        .collect()
}

/// `out = A x` for a dense `A`.
fn gemv(out: &mut [f64], a: &Mat<f64>, x: &[f64]) {
    let m = a.nrows();
    let n = a.ncols();
    matmul(
        mat::from_column_major_slice_mut::<f64>(out, m, 1),
        a.as_ref(),
        mat::from_column_major_slice::<f64>(x, n, 1),
        None,
        1.0,
        Parallelism::None,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    #[test]
    fn sparse_truth_has_expected_support() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(7);
        let x = rand_sparse(500, SPARSE_FRACTION, &mut rng);
        let nz = nonzero_indices(&x);
        assert_eq!(nz.len(), 10);
        for &i in &nz {
            assert!(x[i] > 0.0 && x[i] < 1.0);
        }
    }

    #[test]
    fn exp_decay_is_dense_with_half_negative() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(7);
        let x = rand_exp_decay(101, EXP_DECAY_LOW, exp_decay_high(), &mut rng);
        assert_eq!(x.len(), 101);
        assert_eq!(x.iter().filter(|v| **v < 0.0).count(), 50);
        for v in &x {
            let mag = v.abs();
            assert!(mag >= EXP_DECAY_LOW * EXP_DECAY_LOW * (1.0 - 1e-12));
            assert!(mag <= 5.0 * (1.0 + 1e-12));
        }
    }

    #[test]
    fn rhs_matches_product_without_noise() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(3);
        let problem = generate(20, true, NoiseModel::None, 30, &mut rng);
        assert_eq!(problem.m(), 30);
        assert_eq!(problem.n(), 20);
        for i in 0..problem.m() {
            let mut sum = 0.0;
            for j in 0..problem.n() {
                sum += problem.a().read(i, j) * problem.x_true()[j];
            }
            assert!((sum - problem.b()[i]).abs() <= 1e-12);
        }
    }

    #[test]
    fn same_seed_same_instance() {
        let p1 = generate(
            40,
            false,
            NoiseModel::StandardNormal,
            60,
            &mut Xoshiro256PlusPlus::seed_from_u64(11),
        );
        let p2 = generate(
            40,
            false,
            NoiseModel::StandardNormal,
            60,
            &mut Xoshiro256PlusPlus::seed_from_u64(11),
        );
        assert_eq!(p1.x_true(), p2.x_true());
        assert_eq!(p1.b(), p2.b());
        for j in 0..40 {
            for i in 0..60 {
                assert_eq!(p1.a().read(i, j), p2.a().read(i, j));
            }
        }
    }

    #[test]
    fn awgn_scales_with_signal() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(5);
        let clean = vec![2.0; 4000];
        let mut noisy = clean.clone();
        add_awgn_noise(&mut noisy, 20.0, &mut rng);
        let var = noisy
            .iter()
            .zip(&clean)
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f64>()
            / clean.len() as f64;
        // signal power 4, SNR 100 -> noise variance 0.04
        assert!((var - 0.04).abs() < 0.01, "variance {var}");
    }

    #[test]
    fn rejects_mismatched_data() {
        let a = Mat::<f64>::zeros(3, 2);
        assert_eq!(
            Problem::new(a.clone(), vec![0.0; 3], vec![0.0; 3]).unwrap_err(),
            ProblemError::SolutionLength {
                expected: 2,
                actual: 3
            }
        );
        assert_eq!(
            Problem::new(a, vec![0.0; 2], vec![0.0; 2]).unwrap_err(),
            ProblemError::RhsLength {
                expected: 3,
                actual: 2
            }
        );
    }
}
